//! Event plumbing
//!
//! - [`Fifo`]: the bounded queue between the network thread and the engine
//! - [`EngineEvent`]: what the engine reports back to the application

mod fifo;
mod notification;

pub use fifo::{Fifo, FifoState};
pub use notification::{DialogNotification, EngineEvent, NotificationKind};
