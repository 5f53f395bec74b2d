// simulation/mod.rs
// Re-exports and module declarations for simulation submodules

pub mod bonds;
pub mod boundary;
pub mod forces;
pub mod fracture;
pub mod integrate;
pub mod simulation;

pub use bonds::{Bond, BondId, BondedNetwork};
pub use boundary::{BoundaryId, BoundaryKind, BoundarySpec};
pub use forces::Binding;
pub use simulation::*;

#[cfg(test)]
mod tests;
