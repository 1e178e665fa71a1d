//! Shared error plumbing and small utilities used across the wxhook crates.

pub mod error;
pub mod panic;

pub use {error::FromMessage, panic::panic_message};
