//! A software camera that answers capture requests with plausible 3A states.
//!
//! [`SimulatedCamera`] is the [`CaptureBoundary`] handed to the engine; the
//! paired [`SimulatedSensor`] produces the stream of capture results. Every
//! control converges `settle_frames` frames after the last submitted request.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use anyhow::bail;
use tracing::{debug, trace};

use crate::capture::{
    AeState, AfMode, AfState, AfTrigger, AwbState, CameraCharacteristics, CaptureBoundary,
    CaptureRequest, CaptureResult, PrecaptureTrigger,
};
use crate::state_machine::CameraState;

#[derive(Default)]
struct Session {
    request: Option<CaptureRequest>,
    frames_since_submit: u32,
    frame_number: u64,
    submitted: usize,
}

fn lock(session: &Mutex<Session>) -> MutexGuard<'_, Session> {
    session.lock().unwrap_or_else(PoisonError::into_inner)
}

pub struct SimulatedCamera {
    characteristics: CameraCharacteristics,
    session: Arc<Mutex<Session>>,
    settle_frames: u32,
    failing_transition: Option<(CameraState, CameraState)>,
}

impl SimulatedCamera {
    pub fn new(characteristics: CameraCharacteristics, settle_frames: u32) -> Self {
        Self {
            characteristics,
            session: Arc::new(Mutex::new(Session::default())),
            settle_frames,
            failing_transition: None,
        }
    }

    /// Makes the `from -> to` hardware transition fail.
    pub fn with_failing_transition(mut self, from: CameraState, to: CameraState) -> Self {
        self.failing_transition = Some((from, to));
        self
    }

    /// Handle producing capture results for requests submitted to this camera.
    pub fn sensor(&self) -> SimulatedSensor {
        SimulatedSensor {
            session: Arc::clone(&self.session),
            settle_frames: self.settle_frames,
        }
    }
}

impl CaptureBoundary for SimulatedCamera {
    fn characteristics(&self) -> &CameraCharacteristics {
        &self.characteristics
    }

    fn submit(&mut self, request: &CaptureRequest) -> anyhow::Result<()> {
        let mut session = lock(&self.session);
        session.request = Some(request.clone());
        session.frames_since_submit = 0;
        session.submitted += 1;
        trace!(submitted = session.submitted, "request submitted");
        Ok(())
    }

    fn transition(&mut self, from: CameraState, to: CameraState) -> anyhow::Result<()> {
        if self.failing_transition == Some((from, to)) {
            bail!("simulated failure moving from {from} to {to}");
        }
        if to < from {
            lock(&self.session).request = None;
        }
        debug!(%from, %to, "simulated transition");
        Ok(())
    }
}

#[derive(Clone)]
pub struct SimulatedSensor {
    session: Arc<Mutex<Session>>,
    settle_frames: u32,
}

impl SimulatedSensor {
    /// Number of requests submitted so far.
    pub fn submitted(&self) -> usize {
        lock(&self.session).submitted
    }

    /// Produces the next frame's result, or `None` while no request is streaming.
    pub fn next_result(&self) -> Option<CaptureResult> {
        let mut session = lock(&self.session);
        let request = session.request.clone()?;
        session.frame_number += 1;
        session.frames_since_submit += 1;
        let settled = session.frames_since_submit >= self.settle_frames;

        Some(CaptureResult {
            frame_number: session.frame_number,
            ae_state: Some(ae_state(&request, settled)),
            af_state: Some(af_state(&request, settled)),
            awb_state: Some(awb_state(&request, settled)),
        })
    }
}

fn ae_state(request: &CaptureRequest, settled: bool) -> AeState {
    let precapture = request.ae_precapture_trigger == Some(PrecaptureTrigger::Start);
    match (settled, request.ae_lock == Some(true)) {
        (true, true) => AeState::Locked,
        (true, false) => AeState::Converged,
        (false, _) if precapture => AeState::Precapture,
        (false, _) => AeState::Searching,
    }
}

fn af_state(request: &CaptureRequest, settled: bool) -> AfState {
    match (request.af_mode, request.af_trigger) {
        (Some(AfMode::Auto), Some(AfTrigger::Start)) if settled => AfState::FocusedLocked,
        (Some(AfMode::Auto), Some(AfTrigger::Start)) => AfState::ActiveScan,
        (Some(AfMode::ContinuousPicture), _) if settled => AfState::PassiveFocused,
        (Some(AfMode::ContinuousPicture), _) => AfState::PassiveScan,
        _ => AfState::Inactive,
    }
}

fn awb_state(request: &CaptureRequest, settled: bool) -> AwbState {
    match (settled, request.awb_lock == Some(true)) {
        (true, true) => AwbState::Locked,
        (true, false) => AwbState::Converged,
        (false, _) => AwbState::Searching,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nothing_streams_before_a_request() {
        let camera = SimulatedCamera::new(CameraCharacteristics::default(), 2);
        assert!(camera.sensor().next_result().is_none());
    }

    #[test]
    fn controls_converge_after_settle_frames() {
        let mut camera = SimulatedCamera::new(CameraCharacteristics::default(), 2);
        let sensor = camera.sensor();
        camera.submit(&CaptureRequest::preview()).unwrap();

        let first = sensor.next_result().unwrap();
        assert_eq!(first.frame_number, 1);
        assert_eq!(first.ae_state, Some(AeState::Searching));
        assert_eq!(first.af_state, Some(AfState::PassiveScan));

        let second = sensor.next_result().unwrap();
        assert_eq!(second.ae_state, Some(AeState::Converged));
        assert_eq!(second.af_state, Some(AfState::PassiveFocused));
        assert_eq!(second.awb_state, Some(AwbState::Converged));
    }

    #[test]
    fn locks_and_triggers_are_reflected() {
        let mut camera = SimulatedCamera::new(CameraCharacteristics::default(), 1);
        let sensor = camera.sensor();
        let request = CaptureRequest {
            ae_lock: Some(true),
            awb_lock: Some(true),
            af_mode: Some(AfMode::Auto),
            af_trigger: Some(AfTrigger::Start),
            ..CaptureRequest::preview()
        };
        camera.submit(&request).unwrap();
        let result = sensor.next_result().unwrap();
        assert_eq!(result.ae_state, Some(AeState::Locked));
        assert_eq!(result.af_state, Some(AfState::FocusedLocked));
        assert_eq!(result.awb_state, Some(AwbState::Locked));
        assert_eq!(sensor.submitted(), 1);
    }

    #[test]
    fn configured_transition_fails() {
        let mut camera = SimulatedCamera::new(CameraCharacteristics::default(), 1)
            .with_failing_transition(CameraState::Engine, CameraState::Bind);
        assert!(camera.transition(CameraState::Off, CameraState::Engine).is_ok());
        let err = camera
            .transition(CameraState::Engine, CameraState::Bind)
            .unwrap_err();
        assert!(err.to_string().contains("ENGINE to BIND"));
    }
}
