//! Job dispatcher: file-watching ingress plus a queue-backed launch worker

pub mod context;
pub mod handlers;
pub mod runtime;
pub mod types;
pub mod watcher;

pub use context::DispatchContext;
pub use runtime::DispatchRuntime;
pub use types::LaunchProcessJob;
pub use watcher::JobWatcher;
