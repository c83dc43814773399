//! Operator alert channels.
//!
//! The watchdog raises alerts through a [`Notifier`]; deliveries are
//! best-effort and never fail the caller when fanned out through the
//! [`AlertDispatcher`].

pub mod dispatcher;
pub mod email;
pub mod traits;
pub mod webhook;

pub use dispatcher::AlertDispatcher;
pub use email::EmailNotifier;
pub use traits::{DispatchResult, Notification, Notifier, NotifyError};
pub use webhook::WebhookNotifier;
