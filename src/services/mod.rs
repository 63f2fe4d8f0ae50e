mod coordinator;
pub use coordinator::*;

mod registry;
pub use registry::*;

pub mod engines;
pub mod extract;
pub mod metrics;
pub mod refine;
