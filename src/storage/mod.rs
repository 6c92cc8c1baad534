//! Data persistence and file operations

pub mod executions;
pub mod signals;

pub use executions::*;
pub use signals::*;
