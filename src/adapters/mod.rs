//! Venue adapter contracts and simulated implementations

pub mod cex;
pub mod dex;
pub mod sim;

pub use cex::*;
pub use dex::*;
pub use sim::*;
