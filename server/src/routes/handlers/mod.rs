pub mod health;
pub mod messages;
pub mod notifications;
pub mod tasks;
