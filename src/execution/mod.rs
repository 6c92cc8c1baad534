//! Trade execution: the two-leg engine and the simulated environment

pub mod engine;
pub mod simulation;

pub use engine::*;
pub use simulation::*;
