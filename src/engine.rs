//! The camera control plane.
//!
//! [`CameraEngine`] ties the pieces together: a [`StateOrchestrator`] that
//! serializes every hardware operation, and an [`ActionHolder`] that runs 3A
//! actions against the capture session. Public methods only schedule jobs and
//! return their handles; the work itself happens on the engine's worker.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{debug, error, info};

use crate::actions::{ActionHolder, LockAction, MeterAction, Timeout};
use crate::capture::{
    AfMode, AfTrigger, CameraCharacteristics, CaptureBoundary, CaptureRequest, CaptureResult,
};
use crate::config::EngineConfig;
use crate::error::JobError;
use crate::geometry::{PointF, Size};
use crate::metering::{Camera2MeteringTransform, MeteringRegions};
use crate::orchestrator::JobCallback;
use crate::state_machine::{CameraState, JobHandle, StateOrchestrator, TransitionRecord};
use crate::worker::Worker;

const LOCK_JOB: &str = "lock";
const UNLOCK_JOB: &str = "unlock";
const METER_JOB: &str = "meter";

/// Routes every job to one worker and logs the failures that get dispatched.
pub struct SharedWorker(Worker);

impl SharedWorker {
    pub fn new(worker: Worker) -> Self {
        Self(worker)
    }
}

impl JobCallback for SharedWorker {
    fn worker(&self, _job_name: &str) -> Worker {
        self.0.clone()
    }

    fn on_job_exception(&self, job_name: &str, error: &JobError) {
        error!(job = job_name, error = %error, "camera job failed");
    }
}

type SharedHolder = Arc<Mutex<ActionHolder>>;

fn lock(holder: &Mutex<ActionHolder>) -> MutexGuard<'_, ActionHolder> {
    holder.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Clone)]
pub struct CameraEngine {
    config: Arc<EngineConfig>,
    orchestrator: StateOrchestrator,
    holder: SharedHolder,
}

impl CameraEngine {
    /// Creates an engine driving `boundary`.
    ///
    /// # Panics
    ///
    /// Panics when called outside a Tokio runtime.
    pub fn new(config: EngineConfig, boundary: Box<dyn CaptureBoundary>) -> Self {
        let worker = Worker::new(&config.worker_name);
        let orchestrator = StateOrchestrator::new(Arc::new(SharedWorker::new(worker)));
        let holder = ActionHolder::new(boundary, CaptureRequest::preview());
        Self {
            config: Arc::new(config),
            orchestrator,
            holder: Arc::new(Mutex::new(holder)),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn state(&self) -> CameraState {
        self.orchestrator.current_state()
    }

    pub fn target_state(&self) -> CameraState {
        self.orchestrator.target_state()
    }

    pub fn orchestrator(&self) -> &StateOrchestrator {
        &self.orchestrator
    }

    pub fn transitions(&self) -> Vec<TransitionRecord> {
        self.orchestrator.transitions()
    }

    pub fn characteristics(&self) -> CameraCharacteristics {
        lock(&self.holder).characteristics().clone()
    }

    /// The request currently applied to the session.
    pub fn request(&self) -> CaptureRequest {
        lock(&self.holder).builder().clone()
    }

    /// Brings the camera up to PREVIEW. The returned handle resolves with the
    /// last step; an earlier failure leaves later steps cancelled.
    pub fn start(&self) -> JobHandle<()> {
        info!("starting camera");
        self.advance(CameraState::Off, CameraState::Engine);
        self.advance(CameraState::Engine, CameraState::Bind);
        self.advance(CameraState::Bind, CameraState::Preview)
    }

    /// Brings the camera down to OFF, abandoning any 3A action, whether it is
    /// running, about to run or still queued.
    pub fn stop(&self) -> JobHandle<()> {
        info!("stopping camera");
        lock(&self.holder).close();
        let jobs = self.orchestrator.jobs();
        jobs.remove(LOCK_JOB);
        jobs.remove(METER_JOB);
        self.retreat(CameraState::Preview, CameraState::Bind);
        self.retreat(CameraState::Bind, CameraState::Engine);
        self.retreat(CameraState::Engine, CameraState::Off)
    }

    fn advance(&self, from: CameraState, to: CameraState) -> JobHandle<()> {
        let holder = Arc::clone(&self.holder);
        self.orchestrator
            .schedule_state_change(from, to, true, move || async move {
                let mut holder = lock(&holder);
                holder.boundary_mut().transition(from, to)?;
                if to == CameraState::Preview {
                    *holder.builder_mut() = CaptureRequest::preview();
                    holder.apply_builder()?;
                    holder.open();
                }
                Ok::<(), JobError>(())
            })
    }

    fn retreat(&self, from: CameraState, to: CameraState) -> JobHandle<()> {
        let holder = Arc::clone(&self.holder);
        self.orchestrator
            .schedule_state_change(from, to, false, move || async move {
                let mut holder = lock(&holder);
                if from == CameraState::Preview {
                    holder.abort_all();
                }
                holder.boundary_mut().transition(from, to)?;
                Ok::<(), JobError>(())
            })
    }

    /// Locks exposure, focus and white balance, giving up after the configured timeout.
    pub fn lock(&self) -> JobHandle<()> {
        let holder = Arc::clone(&self.holder);
        let timeout = self.config.lock_timeout();
        self.orchestrator
            .schedule_stateful(LOCK_JOB, CameraState::Preview, move || async move {
                let completion = lock(&holder).run(Box::new(Timeout::new(
                    timeout,
                    Box::new(LockAction::new()),
                )));
                completion.await
            })
    }

    /// Releases the 3A locks and returns focus to continuous mode.
    pub fn unlock(&self) -> JobHandle<()> {
        let holder = Arc::clone(&self.holder);
        self.orchestrator
            .schedule_stateful(UNLOCK_JOB, CameraState::Preview, move || async move {
                let mut holder = lock(&holder);
                let builder = holder.builder_mut();
                builder.ae_lock = Some(false);
                builder.awb_lock = Some(false);
                builder.af_mode = Some(AfMode::ContinuousPicture);
                builder.af_trigger = Some(AfTrigger::Cancel);
                holder.apply_builder()?;
                debug!("3A unlocked");
                Ok::<(), JobError>(())
            })
    }

    /// Meters around `point` of a `surface`-sized view. Only the most recent
    /// pending metering request is kept.
    pub fn meter(
        &self,
        surface: Size,
        point: PointF,
        transform: Camera2MeteringTransform,
    ) -> JobHandle<()> {
        let regions = MeteringRegions::from_point_with_blur(
            surface,
            point,
            self.config.metering_weight,
            self.config.blur_metering,
        );
        let holder = Arc::clone(&self.holder);
        let handle = self
            .orchestrator
            .schedule_stateful(METER_JOB, CameraState::Preview, move || async move {
                let completion = lock(&holder).run(Box::new(MeterAction::new(regions, transform)));
                completion.await
            });
        self.orchestrator.jobs().trim(METER_JOB, 1);
        handle
    }

    /// Number of 3A actions waiting for capture results.
    pub fn active_actions(&self) -> usize {
        lock(&self.holder).active_actions()
    }

    /// Feeds a completed frame to the running actions.
    pub fn on_capture_completed(&self, result: CaptureResult) {
        lock(&self.holder).on_capture_completed(result);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::angles::Angles;
    use crate::capture::AeState;
    use crate::metering::MeteringGeometry;
    use crate::simulator::{SimulatedCamera, SimulatedSensor};
    use crate::state_machine::TransitionOutcome;
    use std::time::Duration;
    use tokio::task::JoinHandle;

    fn engine(camera: SimulatedCamera) -> (CameraEngine, SimulatedSensor) {
        let sensor = camera.sensor();
        (CameraEngine::new(EngineConfig::default(), Box::new(camera)), sensor)
    }

    /// Streams frames from `sensor` into `engine` until aborted.
    fn stream(engine: &CameraEngine, sensor: SimulatedSensor) -> JoinHandle<()> {
        let engine = engine.clone();
        tokio::spawn(async move {
            loop {
                if let Some(result) = sensor.next_result() {
                    engine.on_capture_completed(result);
                }
                tokio::time::sleep(Duration::from_millis(2)).await;
            }
        })
    }

    fn transform() -> Camera2MeteringTransform {
        let angles = Angles::default();
        let geometry = MeteringGeometry::new(&angles, Size::new(800, 600), Size::new(800, 600), false);
        Camera2MeteringTransform::new(angles, geometry)
    }

    #[tokio::test]
    async fn start_and_stop_walk_every_state() {
        let (engine, sensor) = engine(SimulatedCamera::new(CameraCharacteristics::default(), 2));
        assert_eq!(engine.start().await, Ok(()));
        assert_eq!(engine.state(), CameraState::Preview);
        assert_eq!(engine.target_state(), CameraState::Preview);
        assert_eq!(sensor.submitted(), 1);

        assert_eq!(engine.stop().await, Ok(()));
        assert_eq!(engine.state(), CameraState::Off);
        assert!(sensor.next_result().is_none());

        let steps: Vec<String> = engine
            .transitions()
            .iter()
            .map(|record| format!("{}>{}", record.from, record.to))
            .collect();
        assert_eq!(
            steps,
            vec![
                "OFF>ENGINE",
                "ENGINE>BIND",
                "BIND>PREVIEW",
                "PREVIEW>BIND",
                "BIND>ENGINE",
                "ENGINE>OFF"
            ]
        );
    }

    #[tokio::test]
    async fn failed_step_stops_the_startup() {
        let camera = SimulatedCamera::new(CameraCharacteristics::default(), 2)
            .with_failing_transition(CameraState::Engine, CameraState::Bind);
        let (engine, _) = engine(camera);

        assert_eq!(engine.start().await, Err(JobError::Cancelled));
        assert_eq!(engine.state(), CameraState::Engine);
        let outcomes: Vec<TransitionOutcome> = engine
            .transitions()
            .into_iter()
            .map(|record| record.outcome)
            .collect();
        assert_eq!(outcomes[0], TransitionOutcome::Applied);
        assert!(matches!(outcomes[1], TransitionOutcome::Failed(_)));
        assert_eq!(outcomes[2], TransitionOutcome::Stale);
    }

    #[tokio::test]
    async fn lock_is_skipped_before_preview() {
        let (engine, sensor) = engine(SimulatedCamera::new(CameraCharacteristics::default(), 2));
        assert_eq!(engine.lock().await, Ok(()));
        assert_eq!(sensor.submitted(), 0);
    }

    #[tokio::test]
    async fn lock_resolves_once_the_sensor_converges() {
        let (engine, sensor) = engine(SimulatedCamera::new(CameraCharacteristics::default(), 3));
        engine.start().await.unwrap();
        let streaming = stream(&engine, sensor.clone());

        let locked = tokio::time::timeout(Duration::from_secs(2), engine.lock()).await;
        assert_eq!(locked.unwrap(), Ok(()));
        let request = engine.request();
        assert_eq!(request.ae_lock, Some(true));
        assert_eq!(request.awb_lock, Some(true));
        assert_eq!(request.af_mode, Some(AfMode::Auto));

        assert_eq!(engine.unlock().await, Ok(()));
        assert_eq!(engine.request().ae_lock, Some(false));
        assert_eq!(engine.request().af_mode, Some(AfMode::ContinuousPicture));
        streaming.abort();
    }

    #[tokio::test]
    async fn lock_gives_up_after_the_timeout() {
        let camera = SimulatedCamera::new(CameraCharacteristics::default(), u32::MAX);
        let sensor = camera.sensor();
        let config = EngineConfig {
            lock_timeout_ms: 30,
            ..EngineConfig::default()
        };
        let engine = CameraEngine::new(config, Box::new(camera));
        engine.start().await.unwrap();
        let streaming = stream(&engine, sensor.clone());

        let locked = tokio::time::timeout(Duration::from_secs(2), engine.lock()).await;
        assert_eq!(locked.unwrap(), Ok(()));
        assert_ne!(sensor.next_result().unwrap().ae_state, Some(AeState::Locked));
        streaming.abort();
    }

    #[tokio::test]
    async fn stop_cancels_a_pending_lock() {
        let (engine, _) = engine(SimulatedCamera::new(CameraCharacteristics::default(), u32::MAX));
        engine.start().await.unwrap();
        let locking = engine.lock();
        while engine.active_actions() == 0 {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
        let stopped = engine.stop();
        assert_eq!(locking.await, Err(JobError::Cancelled));
        assert_eq!(stopped.await, Ok(()));
        assert_eq!(engine.state(), CameraState::Off);
    }

    #[tokio::test]
    async fn stop_right_after_lock_does_not_wait_for_frames() {
        let (engine, _) = engine(SimulatedCamera::new(CameraCharacteristics::default(), u32::MAX));
        engine.start().await.unwrap();
        let locking = engine.lock();
        let metering = engine.meter(Size::new(800, 600), PointF::new(400.0, 300.0), transform());
        let stopped = engine.stop();

        let stopped = tokio::time::timeout(Duration::from_secs(2), stopped).await;
        assert_eq!(stopped.unwrap(), Ok(()));
        assert_eq!(locking.await, Err(JobError::Cancelled));
        assert_eq!(metering.await, Err(JobError::Cancelled));
        assert_eq!(engine.active_actions(), 0);
        assert_eq!(engine.state(), CameraState::Off);
    }

    #[tokio::test]
    async fn restart_after_stop_accepts_actions_again() {
        let (engine, sensor) = engine(SimulatedCamera::new(CameraCharacteristics::default(), 2));
        engine.start().await.unwrap();
        engine.stop().await.unwrap();
        engine.start().await.unwrap();
        let streaming = stream(&engine, sensor);

        let locked = tokio::time::timeout(Duration::from_secs(2), engine.lock()).await;
        assert_eq!(locked.unwrap(), Ok(()));
        assert_eq!(engine.request().ae_lock, Some(true));
        streaming.abort();
    }

    #[tokio::test]
    async fn meter_writes_regions_and_keeps_only_the_latest_request() {
        let (engine, sensor) = engine(SimulatedCamera::new(CameraCharacteristics::default(), 2));
        engine.start().await.unwrap();
        let streaming = stream(&engine, sensor);

        let first = engine.meter(Size::new(800, 600), PointF::new(100.0, 100.0), transform());
        let second = engine.meter(Size::new(800, 600), PointF::new(400.0, 300.0), transform());
        assert_eq!(first.await, Err(JobError::Cancelled));
        assert_eq!(
            tokio::time::timeout(Duration::from_secs(2), second).await.unwrap(),
            Ok(())
        );

        let request = engine.request();
        assert_eq!(request.af_regions.len(), 1);
        assert_eq!(request.af_regions[0].weight, 1000);
        assert_eq!(request.af_trigger, Some(AfTrigger::Idle));
        streaming.abort();
    }
}
