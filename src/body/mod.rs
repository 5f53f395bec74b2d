// body/mod.rs
// Re-exports for the body module

mod pool;
mod types;

pub use pool::*;
pub use types::*;
