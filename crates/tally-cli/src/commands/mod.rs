//! CLI command implementations
//!
//! Commands are organized by domain:
//! - `core` - Config resolution, store opening and `apply`
//! - `reference` - Reference data listings (categories, vendors)
//! - `status` - Status and migration listings

pub mod core;
pub mod reference;
pub mod status;

// Re-export command functions for main.rs
pub use core::*;
pub use reference::*;
pub use status::*;
