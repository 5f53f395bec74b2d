// diagnostics.rs
// Whole-system observables: momentum, kinetic energy, potential energy of the
// last step and per-type centroids.

use std::fmt;

use ultraviolet::Vec3;

use crate::body::Particle;
use crate::species::{ParticleType, TypeId};

/// Sum of `m v` over active particles.
pub fn total_momentum(particles: &[Particle], types: &[ParticleType]) -> Vec3 {
    particles
        .iter()
        .filter(|p| p.active)
        .fold(Vec3::zero(), |acc, p| acc + p.momentum(&types[p.type_id]))
}

pub fn kinetic_energy(particles: &[Particle], types: &[ParticleType]) -> f32 {
    particles
        .iter()
        .filter(|p| p.active)
        .map(|p| 0.5 * types[p.type_id].mass * p.vel.mag_sq())
        .sum()
}

/// Arithmetic mean position of the active particles of one type. Periodic
/// images are not unwrapped.
pub fn centroid_of_type(particles: &[Particle], type_id: TypeId) -> Option<Vec3> {
    let (sum, count) = particles
        .iter()
        .filter(|p| p.active && p.type_id == type_id)
        .fold((Vec3::zero(), 0usize), |(s, n), p| (s + p.pos, n + 1));
    (count > 0).then(|| sum / count as f32)
}

/// Snapshot of the observables after a step.
#[derive(Clone, Debug, Default)]
pub struct Diagnostics {
    pub step: u64,
    pub time: f64,
    pub active_particles: usize,
    pub bonds: usize,
    pub momentum: Vec3,
    pub kinetic_energy: f32,
    pub pair_energy: f32,
    pub bond_energy: f32,
    pub centroids: Vec<(TypeId, Vec3)>,
}

impl Diagnostics {
    pub fn collect(
        particles: &[Particle],
        types: &[ParticleType],
        step: u64,
        time: f64,
        bonds: usize,
        pair_energy: f32,
        bond_energy: f32,
    ) -> Self {
        let centroids = (0..types.len())
            .filter_map(|t| centroid_of_type(particles, t).map(|c| (t, c)))
            .collect();
        Self {
            step,
            time,
            active_particles: particles.iter().filter(|p| p.active).count(),
            bonds,
            momentum: total_momentum(particles, types),
            kinetic_energy: kinetic_energy(particles, types),
            pair_energy,
            bond_energy,
            centroids,
        }
    }

    pub fn total_energy(&self) -> f32 {
        self.kinetic_energy + self.pair_energy + self.bond_energy
    }
}

impl fmt::Display for Diagnostics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "step {} t={:.4} particles={} bonds={} KE={:.5} PE(pair)={:.5} PE(bond)={:.5} |p|={:.3e}",
            self.step,
            self.time,
            self.active_particles,
            self.bonds,
            self.kinetic_energy,
            self.pair_energy,
            self.bond_energy,
            self.momentum.mag()
        )
    }
}

/// Returned by `Simulation::finalize`.
#[derive(Clone, Debug)]
pub struct RunSummary {
    pub steps: u64,
    pub time: f64,
    pub fractures: usize,
    pub halted: bool,
    pub last: Diagnostics,
}
