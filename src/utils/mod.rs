//! Shared utilities

pub mod display;
pub mod health;
pub mod logging;

pub use display::*;
pub use health::*;
pub use logging::*;
