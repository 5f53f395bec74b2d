use thiserror::Error;

use crate::body::ParticleId;
use crate::simulation::bonds::BondId;
use crate::species::TypeId;

/// Crate-wide result type alias.
pub type Result<T> = std::result::Result<T, SimError>;

/// Errors surfaced by the simulation core.
///
/// Setup errors (unknown ids, bad lattice definitions, bad boundary specs) are
/// raised before any step runs. `Diverged` is the only runtime failure; once it
/// is returned the context refuses to step again.
#[derive(Debug, Error)]
pub enum SimError {
    #[error("invalid parameter: {0}")]
    InvalidParam(String),

    #[error("unknown particle type {0}")]
    UnknownType(TypeId),

    #[error("unknown particle {0}")]
    UnknownParticle(ParticleId),

    #[error("type {type_id} has no species named '{name}'")]
    UnknownSpecies { type_id: TypeId, name: String },

    #[error("bond rule {rule} references basis index {index}, unit cell has {basis_len} basis particles")]
    InvalidBasisIndex {
        rule: usize,
        index: usize,
        basis_len: usize,
    },

    #[error("lattice vectors are not invertible (determinant {det})")]
    SingularLattice { det: f32 },

    #[error("invalid boundary specification: {0}")]
    InvalidBoundary(String),

    #[error("numerical divergence at step {step}: particles {particles:?}, bonds {bonds:?}")]
    Diverged {
        step: u64,
        particles: Vec<ParticleId>,
        bonds: Vec<BondId>,
    },

    #[error("simulation halted after divergence")]
    Halted,

    #[error("config parse error: {0}")]
    Config(#[from] toml::de::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
