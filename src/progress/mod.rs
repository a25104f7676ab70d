//! Progress reporting module
//!
//! Provides a live ticker bar for download and clean passes, with
//! success/failure counters and a final summary.

mod reporter;

pub use reporter::*;
