//! Core types and error handling shared across bpm.
//!
//! This module re-exports the error machinery used everywhere else:
//! [`BpmError`] for typed failures, [`ErrorContext`] for CLI-facing
//! rendering, and [`user_friendly_error`] for the conversion at the binary
//! boundary.

pub mod error;

pub use error::{BpmError, ErrorContext, user_friendly_error};
