//! # sipstate-dialog-core - RFC 3261 signaling engine
//!
//! This crate implements the core of a SIP user agent's signaling layer:
//! the four transaction state machines, dialogs, call and subscription
//! aggregates, the event fifo that feeds them and the timer evaluator that
//! drives retransmissions.
//!
//! ## Overview
//!
//! - [`transaction`]: ICT, NICT, IST and NIST as pure `transition` functions,
//!   timers, ACK construction and destination resolution
//! - [`dialog`]: dialog state, sequence numbers, route set, 200 OK reliability
//! - [`call`]: [`Call`](call::Call) / [`Subscribe`](call::Subscribe)
//!   aggregates and the transaction lookups used for forking, glare and CANCEL
//! - [`events`]: the bounded [`Fifo`](events::Fifo) and the notifications
//!   reported to the application
//! - [`transport`]: the pluggable [`Transport`](transport::Transport)
//!   collaborator and its default UDP implementation
//! - [`manager`]: the [`Engine`](manager::Engine) that ties everything together
//!   and its async runner
//! - [`config`]: [`EngineConfig`](config::EngineConfig), loadable from TOML
//!
//! The SIP parser is an external collaborator: [`message`] only models the
//! decoded message the engine correlates on.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use sipstate_dialog_core::prelude::*;
//!
//! # fn demo() -> DialogResult<()> {
//! let config = EngineConfig::default().with_bind_address("127.0.0.1:0");
//! sipstate_infra_common::init_logging(&config.logging)?;
//! let (mut engine, mut events) = Engine::new(config)?;
//!
//! let invite = SipMessage::request(Method::Invite, "sip:bob@biloxi.com".parse()?)
//!     .with_via(Via::new("UDP", "pc33.atlanta.com", None, &generate_branch()))
//!     .with_from(NameAddr::new("sip:alice@atlanta.com".parse()?).with_tag(&generate_tag()))
//!     .with_to(NameAddr::new("sip:bob@biloxi.com".parse()?))
//!     .with_call_id(generate_call_id("pc33.atlanta.com"))
//!     .with_cseq(1, Method::Invite);
//!
//! let tx = engine.create_client_transaction(invite)?;
//! let call = engine.new_call(tx)?;
//! engine.send_request(tx)?;
//! engine.execute();
//!
//! while let Ok(event) = events.try_recv() {
//!     println!("{call}: {event:?}");
//! }
//! # Ok(())
//! # }
//! ```

pub mod call;
pub mod config;
pub mod dialog;
pub mod errors;
pub mod events;
pub mod manager;
pub mod message;
pub mod transaction;
pub mod transport;

pub use errors::{DialogError, DialogResult};

/// Common imports for applications driving an engine
pub mod prelude {
    pub use crate::call::{Call, CallId, Direction, OwnerRef, Subscribe, SubscribeId};
    pub use crate::config::EngineConfig;
    pub use crate::dialog::{Dialog, DialogId, DialogState};
    pub use crate::errors::{DialogError, DialogResult};
    pub use crate::events::{DialogNotification, EngineEvent, Fifo, NotificationKind};
    pub use crate::manager::{run_engine_loop, Engine};
    pub use crate::message::{
        generate_branch, generate_call_id, generate_tag, Method, NameAddr, SipMessage, Uri, Via,
    };
    pub use crate::transaction::{SipEvent, TransactionId, TransactionKind, TransactionState};
    pub use crate::transport::{Destination, MessageParser, Transport, TransportHooks, UdpTransport};
}
