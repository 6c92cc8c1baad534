//! Recovery plane: circuit breaker, replay protection, admission facade

pub mod breaker;
pub mod manager;
pub mod replay;

pub use breaker::*;
pub use manager::*;
pub use replay::*;
