//! Dataset storage
//!
//! Directory layout, ticker lists, raw daily histories and the
//! numeric helpers used while consolidating them.

mod history;
mod interpolate;
mod layout;

pub use history::*;
pub use interpolate::interpolate_missing;
pub use layout::*;
