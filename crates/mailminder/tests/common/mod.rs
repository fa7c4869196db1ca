//! Shared test utilities for mailminder integration tests.
//!
//! This module provides:
//! - `TestHarness` wiring an orchestrator to an in-memory store and fakes
//! - Builders for raw messages, model replies and test configurations
//! - Scripted fake collaborators for mail, model and archive

pub mod builders;
pub mod fakes;
pub mod harness;

pub use builders::*;
pub use fakes::*;
pub use harness::TestHarness;
