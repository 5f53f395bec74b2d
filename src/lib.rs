pub mod body;
pub mod cell_list;
pub mod config;
pub mod diagnostics;
pub mod error;
pub mod lattice;
pub mod potential;
pub mod profiler;
pub mod simulation;
pub mod species;
pub mod utils;

pub use config::SimConfig;
pub use error::{Result, SimError};
pub use simulation::{Binding, BoundaryKind, BoundarySpec, SimEvent, Simulation};

#[cfg(feature = "profiling")]
use once_cell::sync::Lazy;
#[cfg(feature = "profiling")]
use parking_lot::Mutex;

#[cfg(feature = "profiling")]
pub static PROFILER: Lazy<Mutex<profiler::Profiler>> =
    Lazy::new(|| Mutex::new(profiler::Profiler::new()));
