//! Engine Module
//!
//! The [`Engine`] replaces process-wide signaling state with one object that
//! owns the transaction arena, the calls and subscriptions, the event fifo and
//! the transport. Its behaviour is split across focused submodules:
//!
//! - `engine`: construction, transaction and aggregation operations
//! - `dispatch`: fifo draining, matching, FSM actions, stray ACK/2xx, reaping
//! - `response_lifecycle`: dialogs created and confirmed by responses
//! - `timers`: polling timer evaluation and 200 OK retransmission
//! - [`runner`]: the async loop that drives an engine
//!
//! ```text
//! network thread ──pump_incoming──▶ Fifo ──execute──▶ FSM ──▶ Transport
//!                                    ▲                 │
//!                    timers_execute ─┘                 └──▶ EngineEvent channel
//! ```

mod dispatch;
mod engine;
mod response_lifecycle;
pub mod runner;
mod timers;

pub use engine::Engine;
pub use runner::run_engine_loop;
