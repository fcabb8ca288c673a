//! Common utilities and types shared across the minichat relay crates.

#![warn(clippy::pedantic)]

/// Module for secret types that prevent accidental logging
pub mod secret;

/// Module for common data types
pub mod types;
