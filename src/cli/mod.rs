//! Command-line interface module.
//!
//! This module provides the CLI functionality for:
//! - Batch fill, paced stream and clean replays
//! - Detection runs over stored metrics
//! - Logging setup

pub mod commands;
pub mod handlers;

pub use handlers::{handle_clean, handle_detect, handle_fill, handle_stream, init_logging};
