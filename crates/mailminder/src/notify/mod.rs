//! Client-facing reminder delivery: polling and acknowledgment.

pub mod dispatcher;

pub use dispatcher::{AckOutcome, DeliveryView, DispatchError, NotificationDispatcher};
