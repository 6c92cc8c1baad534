//! Signal pipeline: fee model, generation, scoring, routing, queueing

pub mod fees;
pub mod generator;
pub mod queue;
pub mod route;
pub mod scorer;

pub use fees::*;
pub use generator::*;
pub use queue::*;
pub use route::*;
pub use scorer::*;
