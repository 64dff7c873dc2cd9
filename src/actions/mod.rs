//! Asynchronous state machines driven by capture results.
//!
//! An [`Action`] is started once against an [`ActionHolder`], then receives
//! every completed capture result until it reports [`ActionState::Completed`].
//! Actions never own the holder; it is lent to them for each call.

mod compose;
mod holder;
mod lock;
mod meter;

pub use compose::{Sequence, Timeout, Together};
pub use holder::{ActionCompletion, ActionHolder, ActionId};
pub use lock::{ExposureLock, FocusLock, Lock, LockAction, LockControl, WhiteBalanceLock};
pub use meter::MeterAction;

use crate::capture::CaptureResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActionState {
    NotStarted,
    Started,
    Completed,
}

pub trait Action: Send {
    fn state(&self) -> ActionState;

    /// Starts the action. Implementations either complete right away or
    /// write their controls into the holder's request and wait for results.
    fn start(&mut self, holder: &mut ActionHolder);

    /// Delivers a completed capture result while the action is started.
    fn on_capture_completed(&mut self, holder: &mut ActionHolder, result: &CaptureResult);

    /// Stops the action where it stands and marks it completed.
    fn abort(&mut self, holder: &mut ActionHolder);

    fn is_completed(&self) -> bool {
        self.state() == ActionState::Completed
    }
}
