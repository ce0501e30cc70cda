//! Background worker that serializes every manifest and token mutation.

mod runner;
mod state;

pub use runner::{SyncWorker, WorkerHandle, WorkerMessage, WorkerStopped};
pub use state::{LastSync, WorkerState};
