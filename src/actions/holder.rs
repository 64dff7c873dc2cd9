use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::sync::oneshot;
use tracing::{debug, trace};

use super::{Action, ActionState};
use crate::capture::{CameraCharacteristics, CaptureBoundary, CaptureRequest, CaptureResult};
use crate::error::JobError;

pub type ActionId = u64;

struct Running {
    id: ActionId,
    action: Box<dyn Action>,
    done: oneshot::Sender<()>,
}

/// Owns the capture boundary, the request builder and the running actions.
pub struct ActionHolder {
    boundary: Box<dyn CaptureBoundary>,
    builder: CaptureRequest,
    last_result: Option<CaptureResult>,
    running: Vec<Running>,
    next_id: ActionId,
    closed: bool,
}

impl ActionHolder {
    pub fn new(boundary: Box<dyn CaptureBoundary>, builder: CaptureRequest) -> Self {
        Self {
            boundary,
            builder,
            last_result: None,
            running: Vec::new(),
            next_id: 0,
            closed: false,
        }
    }

    pub fn characteristics(&self) -> &CameraCharacteristics {
        self.boundary.characteristics()
    }

    pub fn builder(&self) -> &CaptureRequest {
        &self.builder
    }

    pub fn builder_mut(&mut self) -> &mut CaptureRequest {
        &mut self.builder
    }

    /// Most recent result seen by [`ActionHolder::on_capture_completed`].
    pub fn last_result(&self) -> Option<&CaptureResult> {
        self.last_result.as_ref()
    }

    /// Sends the current builder to the session.
    pub fn apply_builder(&mut self) -> anyhow::Result<()> {
        self.boundary.submit(&self.builder)
    }

    pub(crate) fn boundary_mut(&mut self) -> &mut dyn CaptureBoundary {
        self.boundary.as_mut()
    }

    /// Number of actions still waiting for results.
    pub fn active_actions(&self) -> usize {
        self.running.len()
    }

    /// Starts `action` and returns a future resolving once it completes.
    ///
    /// While the holder is closed the action is never started and the
    /// completion resolves as cancelled.
    pub fn run(&mut self, mut action: Box<dyn Action>) -> ActionCompletion {
        let id = self.next_id;
        self.next_id += 1;
        let (done, rx) = oneshot::channel();

        if self.closed {
            debug!(action = id, "holder closed, action dropped");
            return ActionCompletion { id, rx };
        }
        action.start(self);
        if action.is_completed() {
            trace!(action = id, "action completed on start");
            let _ = done.send(());
        } else {
            trace!(action = id, "action started");
            self.running.push(Running { id, action, done });
        }
        ActionCompletion { id, rx }
    }

    /// Records `result` and feeds it to every started action.
    pub fn on_capture_completed(&mut self, result: CaptureResult) {
        self.last_result = Some(result.clone());
        let mut running = std::mem::take(&mut self.running);
        for slot in running.iter_mut() {
            if slot.action.state() == ActionState::Started {
                slot.action.on_capture_completed(self, &result);
            }
        }

        let (finished, mut still_running): (Vec<_>, Vec<_>) = running
            .into_iter()
            .partition(|slot| slot.action.is_completed());
        // Actions run from inside a callback landed in `self.running` meanwhile.
        still_running.append(&mut self.running);
        self.running = still_running;

        for slot in finished {
            trace!(action = slot.id, frame = result.frame_number, "action completed");
            let _ = slot.done.send(());
        }
    }

    /// Aborts every running action and refuses new ones until [`ActionHolder::open`].
    pub fn close(&mut self) {
        self.closed = true;
        self.abort_all();
    }

    pub fn open(&mut self) {
        self.closed = false;
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Aborts every running action. Their completions resolve as cancelled.
    pub fn abort_all(&mut self) {
        let running = std::mem::take(&mut self.running);
        if !running.is_empty() {
            debug!(count = running.len(), "aborting running actions");
        }
        for mut slot in running {
            slot.action.abort(self);
            // Dropping `done` unsent cancels the completion.
        }
    }
}

/// Resolves when the action it was returned for completes.
#[derive(Debug)]
pub struct ActionCompletion {
    id: ActionId,
    rx: oneshot::Receiver<()>,
}

impl ActionCompletion {
    pub fn id(&self) -> ActionId {
        self.id
    }
}

impl Future for ActionCompletion {
    type Output = Result<(), JobError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match Pin::new(&mut self.rx).poll(cx) {
            Poll::Ready(Ok(())) => Poll::Ready(Ok(())),
            Poll::Ready(Err(_)) => Poll::Ready(Err(JobError::Cancelled)),
            Poll::Pending => Poll::Pending,
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::capture::AeState;
    use std::sync::{Arc, Mutex};

    /// Boundary that records submitted requests.
    pub(crate) struct RecordingBoundary {
        pub characteristics: CameraCharacteristics,
        pub submitted: Arc<Mutex<Vec<CaptureRequest>>>,
    }

    impl RecordingBoundary {
        pub(crate) fn holder(
            characteristics: CameraCharacteristics,
        ) -> (ActionHolder, Arc<Mutex<Vec<CaptureRequest>>>) {
            let submitted = Arc::new(Mutex::new(Vec::new()));
            let boundary = Self {
                characteristics,
                submitted: Arc::clone(&submitted),
            };
            (
                ActionHolder::new(Box::new(boundary), CaptureRequest::preview()),
                submitted,
            )
        }
    }

    impl CaptureBoundary for RecordingBoundary {
        fn characteristics(&self) -> &CameraCharacteristics {
            &self.characteristics
        }

        fn submit(&mut self, request: &CaptureRequest) -> anyhow::Result<()> {
            self.submitted.lock().unwrap().push(request.clone());
            Ok(())
        }
    }

    /// Completes after seeing `frames` results.
    pub(crate) struct CountingAction {
        pub frames: usize,
        pub seen: usize,
        pub state: ActionState,
    }

    impl CountingAction {
        pub(crate) fn new(frames: usize) -> Self {
            Self {
                frames,
                seen: 0,
                state: ActionState::NotStarted,
            }
        }
    }

    impl Action for CountingAction {
        fn state(&self) -> ActionState {
            self.state
        }

        fn start(&mut self, _holder: &mut ActionHolder) {
            self.state = if self.frames == 0 {
                ActionState::Completed
            } else {
                ActionState::Started
            };
        }

        fn on_capture_completed(&mut self, _holder: &mut ActionHolder, _result: &CaptureResult) {
            self.seen += 1;
            if self.seen >= self.frames {
                self.state = ActionState::Completed;
            }
        }

        fn abort(&mut self, _holder: &mut ActionHolder) {
            self.state = ActionState::Completed;
        }
    }

    pub(crate) fn frame(number: u64) -> CaptureResult {
        CaptureResult {
            frame_number: number,
            ..CaptureResult::default()
        }
    }

    #[tokio::test]
    async fn immediate_actions_resolve_on_run() {
        let (mut holder, _) = RecordingBoundary::holder(CameraCharacteristics::default());
        let completion = holder.run(Box::new(CountingAction::new(0)));
        assert_eq!(holder.active_actions(), 0);
        assert_eq!(completion.await, Ok(()));
    }

    #[tokio::test]
    async fn results_drive_actions_to_completion() {
        let (mut holder, _) = RecordingBoundary::holder(CameraCharacteristics::default());
        let quick = holder.run(Box::new(CountingAction::new(1)));
        let slow = holder.run(Box::new(CountingAction::new(3)));
        assert_ne!(quick.id(), slow.id());
        assert_eq!(holder.active_actions(), 2);

        holder.on_capture_completed(CaptureResult {
            frame_number: 1,
            ae_state: Some(AeState::Searching),
            ..CaptureResult::default()
        });
        assert_eq!(quick.await, Ok(()));
        assert_eq!(holder.active_actions(), 1);
        assert_eq!(holder.last_result().unwrap().ae_state, Some(AeState::Searching));

        holder.on_capture_completed(frame(2));
        holder.on_capture_completed(frame(3));
        assert_eq!(slow.await, Ok(()));
        assert_eq!(holder.active_actions(), 0);
    }

    #[tokio::test]
    async fn abort_all_cancels_completions() {
        let (mut holder, _) = RecordingBoundary::holder(CameraCharacteristics::default());
        let completion = holder.run(Box::new(CountingAction::new(5)));
        holder.abort_all();
        assert_eq!(holder.active_actions(), 0);
        assert_eq!(completion.await, Err(JobError::Cancelled));
    }

    #[tokio::test]
    async fn closed_holder_cancels_new_actions_until_reopened() {
        let (mut holder, submitted) = RecordingBoundary::holder(CameraCharacteristics::default());
        let running = holder.run(Box::new(CountingAction::new(5)));
        holder.close();
        assert!(holder.is_closed());
        assert_eq!(running.await, Err(JobError::Cancelled));

        let refused = holder.run(Box::new(CountingAction::new(1)));
        assert_eq!(holder.active_actions(), 0);
        assert_eq!(refused.await, Err(JobError::Cancelled));
        assert!(submitted.lock().unwrap().is_empty());

        holder.open();
        let accepted = holder.run(Box::new(CountingAction::new(1)));
        assert_eq!(holder.active_actions(), 1);
        holder.on_capture_completed(frame(1));
        assert_eq!(accepted.await, Ok(()));
    }
}
