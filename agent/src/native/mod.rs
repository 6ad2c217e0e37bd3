//! Native symbol lookup in the host process.

mod symbol;

pub use symbol::*;
