//! Common test utilities
//!
//! This module is shared across all integration tests

pub mod fixtures;
pub mod transport;

#[allow(unused_imports)]
pub use fixtures::{
    chat_of, settings, FailingLedger, FlakyStaff, PanickingStats, TestBot, ADMIN, BARISTA, GUEST, MANAGER,
};
#[allow(unused_imports)]
pub use transport::RecordingTransport;
