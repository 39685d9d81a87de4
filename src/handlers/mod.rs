//! HTTP handlers for path-addressed content.

pub mod content;
pub use content::*;
