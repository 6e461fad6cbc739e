//! Error types for dialog-core
//!
//! Every public operation returns an explicit [`DialogResult`]. Transport and
//! timeout failures never surface here: they terminate the transaction and are
//! reported through the notification channel instead.

pub mod dialog_errors;

pub use dialog_errors::{DialogError, DialogResult};
