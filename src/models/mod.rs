//! Typed records shared across processes

pub mod candle;
pub mod control;
pub mod job;
pub mod status;

pub use candle::PriceCandle;
pub use control::{ControlRecord, ControlState, EntityId};
pub use job::{JobDescriptor, ProcessKind};
pub use status::{TrainingJobStatus, TrainingState};
