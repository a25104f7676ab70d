//! Configuration module for StockPull
//!
//! Provides configuration management including CLI arguments,
//! JSON config files, and runtime settings.

mod settings;

pub use settings::*;
