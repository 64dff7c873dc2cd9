mod job;
mod state;

pub use job::{JobHandle, TransitionOutcome, TransitionRecord};
pub use state::{CameraState, StateOrchestrator};
