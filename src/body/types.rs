// body/types.rs
// The Particle struct: one live instance in the simulation's particle pool.

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use ultraviolet::Vec3;

use crate::species::{ParticleType, TypeId};

/// Stable particle identifier, never reused within one simulation.
pub type ParticleId = u64;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Particle {
    pub id: ParticleId,
    /// Owning type. Changed only through `ParticlePool::reassign` so the
    /// per-type membership index stays in sync.
    pub type_id: TypeId,
    pub pos: Vec3,
    pub vel: Vec3,
    /// Per-species concentration, in the owning type's declaration order.
    pub concentrations: SmallVec<[f32; 4]>,
    /// Inactive particles are skipped by neighbor search, forces and integration.
    pub active: bool,
}

impl Particle {
    pub fn new(id: ParticleId, type_id: TypeId, ty: &ParticleType, pos: Vec3, vel: Vec3) -> Self {
        Self {
            id,
            type_id,
            pos,
            vel,
            concentrations: ty.initial_concentrations(),
            active: true,
        }
    }

    /// Restore every species to the type's registered initial value.
    pub fn reset_species(&mut self, ty: &ParticleType) {
        self.concentrations = ty.initial_concentrations();
    }

    pub fn concentration(&self, ty: &ParticleType, species: &str) -> Option<f32> {
        ty.species_index(species)
            .and_then(|i| self.concentrations.get(i).copied())
    }

    pub fn momentum(&self, ty: &ParticleType) -> Vec3 {
        self.vel * ty.mass
    }

    pub fn is_finite(&self) -> bool {
        self.pos.x.is_finite()
            && self.pos.y.is_finite()
            && self.pos.z.is_finite()
            && self.vel.x.is_finite()
            && self.vel.y.is_finite()
            && self.vel.z.is_finite()
            && self.concentrations.iter().all(|c| c.is_finite())
    }
}
