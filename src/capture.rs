//! The hardware capture boundary.
//!
//! Actions read and write controls on a [`CaptureRequest`], hand it to the
//! session through [`CaptureBoundary::submit`], and watch the control states
//! reported by each [`CaptureResult`].

use serde::{Deserialize, Serialize};

use crate::geometry::Rect;
use crate::state_machine::CameraState;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HardwareLevel {
    /// Most restrictive tier; 3A locks are not reliable here.
    Legacy,
    Limited,
    Full,
    Level3,
    External,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AeMode {
    Off,
    On,
    OnAutoFlash,
    OnAlwaysFlash,
    OnAutoFlashRedeye,
    OnExternalFlash,
}

impl AeMode {
    /// Whether auto-exposure is running, which is what a lock freezes.
    pub fn is_auto(self) -> bool {
        !matches!(self, AeMode::Off)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AeState {
    Inactive,
    Searching,
    Converged,
    Locked,
    FlashRequired,
    Precapture,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PrecaptureTrigger {
    Idle,
    Start,
    Cancel,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AfMode {
    Off,
    Auto,
    Macro,
    ContinuousVideo,
    ContinuousPicture,
    Edof,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AfState {
    Inactive,
    PassiveScan,
    PassiveFocused,
    ActiveScan,
    FocusedLocked,
    NotFocusedLocked,
    PassiveUnfocused,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AfTrigger {
    Idle,
    Start,
    Cancel,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AwbMode {
    Off,
    Auto,
    Incandescent,
    Fluorescent,
    Daylight,
    CloudyDaylight,
    Shade,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AwbState {
    Inactive,
    Searching,
    Converged,
    Locked,
}

/// A weighted rectangle in sensor active-array coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MeteringRectangle {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
    pub weight: i32,
}

impl MeteringRectangle {
    pub const WEIGHT_MIN: i32 = 0;
    pub const WEIGHT_MAX: i32 = 1000;

    /// Builds a rectangle from `rect`, clamping the weight into the hardware range.
    pub fn new(rect: Rect, weight: i32) -> Self {
        Self {
            x: rect.left,
            y: rect.top,
            width: rect.width(),
            height: rect.height(),
            weight: weight.clamp(Self::WEIGHT_MIN, Self::WEIGHT_MAX),
        }
    }

    pub fn rect(&self) -> Rect {
        Rect::new(self.x, self.y, self.x + self.width, self.y + self.height)
    }
}

/// Pending per-frame controls. `None` means the control is left to the session default.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CaptureRequest {
    pub ae_mode: Option<AeMode>,
    pub ae_lock: Option<bool>,
    pub ae_precapture_trigger: Option<PrecaptureTrigger>,
    pub ae_regions: Vec<MeteringRectangle>,
    pub af_mode: Option<AfMode>,
    pub af_trigger: Option<AfTrigger>,
    pub af_regions: Vec<MeteringRectangle>,
    pub awb_mode: Option<AwbMode>,
    pub awb_lock: Option<bool>,
    pub awb_regions: Vec<MeteringRectangle>,
    pub crop_region: Option<Rect>,
}

impl CaptureRequest {
    /// A preview request with every auto control running.
    pub fn preview() -> Self {
        Self {
            ae_mode: Some(AeMode::On),
            af_mode: Some(AfMode::ContinuousPicture),
            awb_mode: Some(AwbMode::Auto),
            ..Self::default()
        }
    }
}

/// Control states reported for one completed frame.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CaptureResult {
    pub frame_number: u64,
    pub ae_state: Option<AeState>,
    pub af_state: Option<AfState>,
    pub awb_state: Option<AwbState>,
}

/// Static capabilities of the opened camera.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CameraCharacteristics {
    pub hardware_level: HardwareLevel,
    pub af_modes: Vec<AfMode>,
    pub max_regions_ae: usize,
    pub max_regions_af: usize,
    pub max_regions_awb: usize,
    pub active_array: Option<Rect>,
}

impl CameraCharacteristics {
    pub fn is_legacy(&self) -> bool {
        self.hardware_level == HardwareLevel::Legacy
    }
}

impl Default for CameraCharacteristics {
    fn default() -> Self {
        Self {
            hardware_level: HardwareLevel::Full,
            af_modes: vec![AfMode::Off, AfMode::Auto, AfMode::ContinuousPicture],
            max_regions_ae: 1,
            max_regions_af: 1,
            max_regions_awb: 1,
            active_array: Some(Rect::new(0, 0, 4000, 3000)),
        }
    }
}

/// The in-flight capture session, as seen by the control plane.
pub trait CaptureBoundary: Send {
    fn characteristics(&self) -> &CameraCharacteristics;

    /// Applies `request` as the session's repeating request.
    fn submit(&mut self, request: &CaptureRequest) -> anyhow::Result<()>;

    /// Hardware work for moving between readiness states.
    fn transition(&mut self, _from: CameraState, _to: CameraState) -> anyhow::Result<()> {
        Ok(())
    }
}
