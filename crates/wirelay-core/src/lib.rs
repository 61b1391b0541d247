//! wirelay-core: Shared library for the wirelay relay hub.
//!
//! This crate provides:
//! - Control-channel message definitions and the newline-delimited JSON codec
//! - Subsystem-name parsing for channel classification
//! - The crate-wide error type
//! - Logging setup
//! - Protocol and configuration constants

pub mod constants;
pub mod error;
pub mod logging;
pub mod protocol;

pub use error::{Error, Result};
pub use logging::{init_logging, LogFormat};
