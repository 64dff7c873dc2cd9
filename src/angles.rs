//! Rotation offsets between the camera's reference frames.
//!
//! Each frame is described by its rotation from [`Reference::Base`], the
//! natural mount orientation of the device. Offsets between two frames are
//! the normalized difference of those absolute rotations, always one of
//! 0, 90, 180 or 270 degrees.

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::CameraError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Facing {
    Front,
    Back,
}

impl fmt::Display for Facing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Facing::Front => write!(f, "FRONT"),
            Facing::Back => write!(f, "BACK"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Reference {
    /// Natural orientation of the device.
    Base,
    /// Orientation of the sensor output.
    Sensor,
    /// Orientation of the preview view on screen.
    View,
    /// Orientation the user is holding the device in.
    Output,
}

impl Reference {
    pub const ALL: [Reference; 4] = [
        Reference::Base,
        Reference::Sensor,
        Reference::View,
        Reference::Output,
    ];
}

impl fmt::Display for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reference::Base => write!(f, "BASE"),
            Reference::Sensor => write!(f, "SENSOR"),
            Reference::View => write!(f, "VIEW"),
            Reference::Output => write!(f, "OUTPUT"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Axis {
    /// Rotation as seen from outside the device.
    Absolute,
    /// Rotation as seen by the sensor. Front sensors are mirrored, so the
    /// rotation direction is inverted.
    RelativeToSensor,
}

/// Holds the three externally supplied angles and answers offset queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Angles {
    facing: Facing,
    sensor_offset: i32,
    display_offset: i32,
    device_orientation: i32,
}

impl Default for Angles {
    fn default() -> Self {
        Self {
            facing: Facing::Back,
            sensor_offset: 0,
            display_offset: 0,
            device_orientation: 0,
        }
    }
}

impl Angles {
    /// Builds angles in one go, validating every input.
    pub fn new(
        facing: Facing,
        sensor_offset: i32,
        display_offset: i32,
        device_orientation: i32,
    ) -> Result<Self, CameraError> {
        let mut angles = Self::default();
        angles.set_sensor_offset(facing, sensor_offset)?;
        angles.set_display_offset(display_offset)?;
        angles.set_device_orientation(device_orientation)?;
        Ok(angles)
    }

    /// Sets the sensor mounting rotation, stored inverted for front sensors.
    pub fn set_sensor_offset(&mut self, facing: Facing, offset: i32) -> Result<(), CameraError> {
        let offset = sanitize_input(offset)?;
        self.facing = facing;
        self.sensor_offset = match facing {
            Facing::Front => sanitize_output(360 - offset),
            Facing::Back => offset,
        };
        debug!(%facing, input = offset, stored = self.sensor_offset, "sensor offset set");
        Ok(())
    }

    pub fn set_display_offset(&mut self, offset: i32) -> Result<(), CameraError> {
        self.display_offset = sanitize_input(offset)?;
        debug!(offset = self.display_offset, "display offset set");
        Ok(())
    }

    pub fn set_device_orientation(&mut self, orientation: i32) -> Result<(), CameraError> {
        self.device_orientation = sanitize_input(orientation)?;
        debug!(orientation = self.device_orientation, "device orientation set");
        Ok(())
    }

    pub fn facing(&self) -> Facing {
        self.facing
    }

    /// Rotation in degrees, in `[0, 360)`, mapping coordinates in `from` to `to`.
    pub fn offset(&self, from: Reference, to: Reference, axis: Axis) -> i32 {
        let offset = self.absolute_offset(from, to);
        match (axis, self.facing) {
            (Axis::RelativeToSensor, Facing::Front) => sanitize_output(360 - offset),
            _ => offset,
        }
    }

    /// Whether mapping `from` to `to` swaps width and height.
    pub fn flip(&self, from: Reference, to: Reference) -> bool {
        self.offset(from, to, Axis::Absolute) % 180 != 0
    }

    fn absolute_offset(&self, from: Reference, to: Reference) -> i32 {
        sanitize_output(self.base_offset(to) - self.base_offset(from))
    }

    fn base_offset(&self, reference: Reference) -> i32 {
        match reference {
            Reference::Base => 0,
            Reference::View => sanitize_output(360 - self.display_offset),
            Reference::Output => sanitize_output(self.device_orientation),
            Reference::Sensor => sanitize_output(360 - self.sensor_offset),
        }
    }
}

/// Accepts only right angles in `[0, 360)`.
pub fn sanitize_input(angle: i32) -> Result<i32, CameraError> {
    match angle {
        0 | 90 | 180 | 270 => Ok(angle),
        other => Err(CameraError::InvalidAngle(other)),
    }
}

fn sanitize_output(angle: i32) -> i32 {
    angle.rem_euclid(360)
}
