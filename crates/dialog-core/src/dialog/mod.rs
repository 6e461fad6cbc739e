//! Dialogs (RFC 3261 section 12)
//!
//! - [`DialogId`]: engine-assigned handle, `-1` until the dialog joins a call
//! - [`Dialog`]: tags, sequence numbers, route set, 200 OK reliability state
//!   and the transactions scoped to the dialog
//! - [`DialogState`]: lifecycle states
//!
//! ## Dialog Lifecycle
//!
//! ```text
//! Empty → Early → Confirmed → Closing → Terminated
//!          18x      2xx        BYE       freed
//! ```

mod dialog_id;
mod dialog_impl;
mod dialog_state;
mod request_template;

pub use dialog_id::DialogId;
pub use dialog_impl::{Dialog, OkRetransmit};
pub use dialog_state::DialogState;
pub use request_template::DialogRequestTemplate;
