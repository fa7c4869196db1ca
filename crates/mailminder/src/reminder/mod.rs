//! Reminder scheduling.

pub mod scheduler;

pub use scheduler::{make_delivery_id, ReminderDelivery, ReminderOffset, ReminderScheduler};
