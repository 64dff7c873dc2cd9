//! 3A locks.
//!
//! Each lock drives one auto control (exposure, focus or white balance) into
//! a locked state. A [`Lock`] asks its [`LockControl`] whether locking is
//! possible and needed; if so it writes the control into the request and
//! waits until a capture result reports the control as locked.

use tracing::{debug, warn};

use super::{Action, ActionHolder, ActionState, Together};
use crate::capture::{AeState, AfMode, AfState, AfTrigger, AwbMode, AwbState, CaptureResult};

/// Per-control hooks plugged into [`Lock`].
pub trait LockControl: Send {
    fn name(&self) -> &'static str;

    /// Whether this hardware and request allow the control to be locked.
    fn check_is_supported(&self, holder: &ActionHolder) -> bool;

    /// Whether the last known result already shows the control locked.
    fn check_should_skip(&self, holder: &ActionHolder) -> bool;

    /// Writes the lock request into the holder's builder.
    fn on_started(&mut self, holder: &mut ActionHolder);

    /// Whether `result` shows the control in a terminal state.
    fn is_locked(&self, result: &CaptureResult) -> bool;
}

pub struct Lock<C> {
    control: C,
    state: ActionState,
}

impl<C: LockControl> Lock<C> {
    pub fn new(control: C) -> Self {
        Self {
            control,
            state: ActionState::NotStarted,
        }
    }
}

impl<C: LockControl> Action for Lock<C> {
    fn state(&self) -> ActionState {
        self.state
    }

    fn start(&mut self, holder: &mut ActionHolder) {
        let name = self.control.name();
        if !self.control.check_is_supported(holder) {
            debug!(lock = name, "lock not supported, skipping");
            self.state = ActionState::Completed;
            return;
        }
        if self.control.check_should_skip(holder) {
            debug!(lock = name, "already locked, skipping");
            self.state = ActionState::Completed;
            return;
        }

        self.control.on_started(holder);
        if let Err(err) = holder.apply_builder() {
            // The request never reached the hardware, so no result will ever lock.
            warn!(lock = name, error = %err, "failed to apply lock request");
            self.state = ActionState::Completed;
            return;
        }
        debug!(lock = name, "lock requested");
        self.state = ActionState::Started;
    }

    fn on_capture_completed(&mut self, _holder: &mut ActionHolder, result: &CaptureResult) {
        if self.control.is_locked(result) {
            debug!(lock = self.control.name(), frame = result.frame_number, "lock converged");
            self.state = ActionState::Completed;
        }
    }

    fn abort(&mut self, _holder: &mut ActionHolder) {
        self.state = ActionState::Completed;
    }
}

pub struct ExposureLock;

impl LockControl for ExposureLock {
    fn name(&self) -> &'static str {
        "exposure"
    }

    fn check_is_supported(&self, holder: &ActionHolder) -> bool {
        let auto = holder.builder().ae_mode.is_some_and(|mode| mode.is_auto());
        !holder.characteristics().is_legacy() && auto
    }

    fn check_should_skip(&self, holder: &ActionHolder) -> bool {
        holder
            .last_result()
            .is_some_and(|result| result.ae_state == Some(AeState::Locked))
    }

    fn on_started(&mut self, holder: &mut ActionHolder) {
        holder.builder_mut().ae_lock = Some(true);
    }

    fn is_locked(&self, result: &CaptureResult) -> bool {
        result.ae_state == Some(AeState::Locked)
    }
}

pub struct FocusLock;

impl LockControl for FocusLock {
    fn name(&self) -> &'static str {
        "focus"
    }

    fn check_is_supported(&self, holder: &ActionHolder) -> bool {
        let characteristics = holder.characteristics();
        !characteristics.is_legacy() && characteristics.af_modes.contains(&AfMode::Auto)
    }

    fn check_should_skip(&self, holder: &ActionHolder) -> bool {
        holder.last_result().is_some_and(|result| {
            matches!(
                result.af_state,
                Some(AfState::FocusedLocked | AfState::NotFocusedLocked)
            )
        })
    }

    fn on_started(&mut self, holder: &mut ActionHolder) {
        let builder = holder.builder_mut();
        builder.af_mode = Some(AfMode::Auto);
        builder.af_trigger = Some(AfTrigger::Cancel);
    }

    fn is_locked(&self, result: &CaptureResult) -> bool {
        matches!(
            result.af_state,
            Some(
                AfState::FocusedLocked
                    | AfState::NotFocusedLocked
                    | AfState::Inactive
                    | AfState::PassiveFocused
                    | AfState::PassiveUnfocused
            )
        )
    }
}

pub struct WhiteBalanceLock;

impl LockControl for WhiteBalanceLock {
    fn name(&self) -> &'static str {
        "white-balance"
    }

    fn check_is_supported(&self, holder: &ActionHolder) -> bool {
        let auto = holder.builder().awb_mode == Some(AwbMode::Auto);
        !holder.characteristics().is_legacy() && auto
    }

    fn check_should_skip(&self, holder: &ActionHolder) -> bool {
        holder
            .last_result()
            .is_some_and(|result| result.awb_state == Some(AwbState::Locked))
    }

    fn on_started(&mut self, holder: &mut ActionHolder) {
        holder.builder_mut().awb_lock = Some(true);
    }

    fn is_locked(&self, result: &CaptureResult) -> bool {
        result.awb_state == Some(AwbState::Locked)
    }
}

/// Exposure, focus and white-balance locks run together.
pub struct LockAction(Together);

impl LockAction {
    pub fn new() -> Self {
        Self(Together::new(vec![
            Box::new(Lock::new(ExposureLock)),
            Box::new(Lock::new(FocusLock)),
            Box::new(Lock::new(WhiteBalanceLock)),
        ]))
    }
}

impl Default for LockAction {
    fn default() -> Self {
        Self::new()
    }
}

impl Action for LockAction {
    fn state(&self) -> ActionState {
        self.0.state()
    }

    fn start(&mut self, holder: &mut ActionHolder) {
        self.0.start(holder);
    }

    fn on_capture_completed(&mut self, holder: &mut ActionHolder, result: &CaptureResult) {
        self.0.on_capture_completed(holder, result);
    }

    fn abort(&mut self, holder: &mut ActionHolder) {
        self.0.abort(holder);
    }
}
