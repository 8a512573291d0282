pub mod case;
pub mod orchestrator;
pub mod priority;
pub mod validate;

pub use case::*;
pub use orchestrator::*;
pub use priority::*;
pub use validate::*;
