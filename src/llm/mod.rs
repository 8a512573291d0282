pub mod client;
pub mod fallback;
pub mod parse;

pub use client::*;
pub use fallback::*;
pub use parse::*;
