use std::time::Duration;

use tokio::time::Instant;
use tracing::debug;

use super::{Action, ActionHolder, ActionState};
use crate::capture::CaptureResult;

/// Runs every child at once; completes when all of them have.
pub struct Together {
    actions: Vec<Box<dyn Action>>,
    state: ActionState,
}

impl Together {
    pub fn new(actions: Vec<Box<dyn Action>>) -> Self {
        Self {
            actions,
            state: ActionState::NotStarted,
        }
    }

    fn update(&mut self) {
        if self.actions.iter().all(|action| action.is_completed()) {
            self.state = ActionState::Completed;
        }
    }
}

impl Action for Together {
    fn state(&self) -> ActionState {
        self.state
    }

    fn start(&mut self, holder: &mut ActionHolder) {
        self.state = ActionState::Started;
        for action in &mut self.actions {
            if action.state() == ActionState::NotStarted {
                action.start(holder);
            }
        }
        self.update();
    }

    fn on_capture_completed(&mut self, holder: &mut ActionHolder, result: &CaptureResult) {
        for action in &mut self.actions {
            if action.state() == ActionState::Started {
                action.on_capture_completed(holder, result);
            }
        }
        self.update();
    }

    fn abort(&mut self, holder: &mut ActionHolder) {
        for action in &mut self.actions {
            if !action.is_completed() {
                action.abort(holder);
            }
        }
        self.state = ActionState::Completed;
    }
}

/// Runs children one after another, starting each as soon as the previous completes.
pub struct Sequence {
    actions: Vec<Box<dyn Action>>,
    current: usize,
    state: ActionState,
}

impl Sequence {
    pub fn new(actions: Vec<Box<dyn Action>>) -> Self {
        Self {
            actions,
            current: 0,
            state: ActionState::NotStarted,
        }
    }

    /// Starts children until one is left waiting or none remain.
    fn advance(&mut self, holder: &mut ActionHolder) {
        while let Some(action) = self.actions.get_mut(self.current) {
            if action.state() == ActionState::NotStarted {
                action.start(holder);
            }
            if !action.is_completed() {
                return;
            }
            self.current += 1;
        }
        self.state = ActionState::Completed;
    }
}

impl Action for Sequence {
    fn state(&self) -> ActionState {
        self.state
    }

    fn start(&mut self, holder: &mut ActionHolder) {
        self.state = ActionState::Started;
        self.advance(holder);
    }

    fn on_capture_completed(&mut self, holder: &mut ActionHolder, result: &CaptureResult) {
        if let Some(action) = self.actions.get_mut(self.current) {
            action.on_capture_completed(holder, result);
        }
        self.advance(holder);
    }

    fn abort(&mut self, holder: &mut ActionHolder) {
        if let Some(action) = self.actions.get_mut(self.current)
            && !action.is_completed()
        {
            action.abort(holder);
        }
        self.state = ActionState::Completed;
    }
}

/// Bounds a child action in time. Elapsed time is checked whenever a capture
/// result arrives; past the deadline the child is aborted.
pub struct Timeout {
    action: Box<dyn Action>,
    timeout: Duration,
    started_at: Option<Instant>,
    state: ActionState,
}

impl Timeout {
    pub fn new(timeout: Duration, action: Box<dyn Action>) -> Self {
        Self {
            action,
            timeout,
            started_at: None,
            state: ActionState::NotStarted,
        }
    }
}

impl Action for Timeout {
    fn state(&self) -> ActionState {
        self.state
    }

    fn start(&mut self, holder: &mut ActionHolder) {
        self.started_at = Some(Instant::now());
        self.action.start(holder);
        self.state = if self.action.is_completed() {
            ActionState::Completed
        } else {
            ActionState::Started
        };
    }

    fn on_capture_completed(&mut self, holder: &mut ActionHolder, result: &CaptureResult) {
        self.action.on_capture_completed(holder, result);
        if self.action.is_completed() {
            self.state = ActionState::Completed;
            return;
        }
        let expired = self
            .started_at
            .is_some_and(|started| started.elapsed() >= self.timeout);
        if expired {
            debug!(timeout_ms = self.timeout.as_millis() as u64, "action timed out");
            self.action.abort(holder);
            self.state = ActionState::Completed;
        }
    }

    fn abort(&mut self, holder: &mut ActionHolder) {
        if !self.action.is_completed() {
            self.action.abort(holder);
        }
        self.state = ActionState::Completed;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actions::holder::tests::{frame, CountingAction, RecordingBoundary};
    use crate::capture::CameraCharacteristics;
    use crate::error::JobError;

    fn counting(frames: usize) -> Box<dyn Action> {
        Box::new(CountingAction::new(frames))
    }

    #[tokio::test]
    async fn together_waits_for_every_child() {
        let (mut holder, _) = RecordingBoundary::holder(CameraCharacteristics::default());
        let completion = holder.run(Box::new(Together::new(vec![
            counting(0),
            counting(1),
            counting(2),
        ])));

        holder.on_capture_completed(frame(1));
        assert_eq!(holder.active_actions(), 1);
        holder.on_capture_completed(frame(2));
        assert_eq!(holder.active_actions(), 0);
        assert_eq!(completion.await, Ok(()));
    }

    #[tokio::test]
    async fn together_of_immediate_children_completes_on_start() {
        let (mut holder, _) = RecordingBoundary::holder(CameraCharacteristics::default());
        let completion = holder.run(Box::new(Together::new(vec![counting(0), counting(0)])));
        assert_eq!(holder.active_actions(), 0);
        assert_eq!(completion.await, Ok(()));
    }

    #[tokio::test]
    async fn together_stays_pending_while_a_child_never_converges() {
        let (mut holder, _) = RecordingBoundary::holder(CameraCharacteristics::default());
        let completion = holder.run(Box::new(Together::new(vec![
            counting(1),
            counting(usize::MAX),
        ])));
        for number in 0..50 {
            holder.on_capture_completed(frame(number));
        }
        assert_eq!(holder.active_actions(), 1);
        let waited = tokio::time::timeout(Duration::from_millis(20), completion).await;
        assert!(waited.is_err());
    }

    #[tokio::test]
    async fn sequence_starts_children_in_turn() {
        let (mut holder, _) = RecordingBoundary::holder(CameraCharacteristics::default());
        let completion = holder.run(Box::new(Sequence::new(vec![
            counting(0),
            counting(1),
            counting(1),
        ])));

        holder.on_capture_completed(frame(1));
        assert_eq!(holder.active_actions(), 1);
        holder.on_capture_completed(frame(2));
        assert_eq!(holder.active_actions(), 0);
        assert_eq!(completion.await, Ok(()));
    }

    #[tokio::test]
    async fn timeout_aborts_a_stuck_child() {
        let (mut holder, _) = RecordingBoundary::holder(CameraCharacteristics::default());
        let completion = holder.run(Box::new(Timeout::new(
            Duration::from_millis(50),
            counting(usize::MAX),
        )));

        holder.on_capture_completed(frame(1));
        assert_eq!(holder.active_actions(), 1);
        tokio::time::sleep(Duration::from_millis(60)).await;
        holder.on_capture_completed(frame(2));
        assert_eq!(completion.await, Ok(()));
    }

    #[tokio::test]
    async fn aborted_composite_resolves_cancelled() {
        let (mut holder, _) = RecordingBoundary::holder(CameraCharacteristics::default());
        let completion = holder.run(Box::new(Sequence::new(vec![counting(3), counting(3)])));
        holder.abort_all();
        assert_eq!(completion.await, Err(JobError::Cancelled));
    }
}
