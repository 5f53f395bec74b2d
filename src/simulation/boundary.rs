// simulation/boundary.rs
// Boundary conditions per side of the domain `[0, extent)`.
// Side ids: 0 = -x, 1 = +x, 2 = -y, 3 = +y, 4 = -z, 5 = +z.
// Boundary potentials add forces before integration; crossings are resolved
// right after the position update of the same step.

use std::sync::Arc;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use ultraviolet::Vec3;

use crate::body::Particle;
use crate::error::{Result, SimError};
use crate::potential::{PairSample, Potential};
use crate::species::{ParticleType, TypeId};
use crate::utils::{component, component_mut, particle_rng, stable_sum_vec3};
use rand::Rng;
use rand_distr::StandardNormal;

/// Index of a domain side.
pub type BoundaryId = usize;

pub const LEFT: BoundaryId = 0;
pub const RIGHT: BoundaryId = 1;
pub const BOTTOM: BoundaryId = 2;
pub const TOP: BoundaryId = 3;
pub const BACK: BoundaryId = 4;
pub const FRONT: BoundaryId = 5;

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BoundaryKind {
    Periodic,
    /// Mirror the normal velocity component.
    FreeSlip,
    /// Bounce back every velocity component; a stationary `Velocity` wall.
    NoSlip,
    /// Wrap like periodic and restore the particle's initial species.
    Reset,
    /// No-slip wall moving at a fixed velocity. Crossing particles bounce back
    /// relative to the wall and boundary potentials drag along it.
    Velocity([f32; 3]),
}

impl BoundaryKind {
    pub fn wraps(&self) -> bool {
        matches!(self, BoundaryKind::Periodic | BoundaryKind::Reset)
    }

    /// Walls that hold on to tangential motion.
    pub fn grips(&self) -> bool {
        matches!(self, BoundaryKind::NoSlip | BoundaryKind::Velocity(_))
    }

    pub fn wall_velocity(&self) -> Vec3 {
        match self {
            BoundaryKind::Velocity(v) => Vec3::from(*v),
            _ => Vec3::zero(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BoundarySpec {
    pub sides: [BoundaryKind; 6],
}

impl Default for BoundarySpec {
    fn default() -> Self {
        Self::periodic()
    }
}

impl BoundarySpec {
    pub fn periodic() -> Self {
        Self {
            sides: [BoundaryKind::Periodic; 6],
        }
    }

    pub fn walls(kind: BoundaryKind) -> Self {
        Self { sides: [kind; 6] }
    }

    /// Set both sides of `axis`.
    pub fn with_axis(mut self, axis: usize, kind: BoundaryKind) -> Self {
        self.sides[2 * axis] = kind;
        self.sides[2 * axis + 1] = kind;
        self
    }

    pub fn with_side(mut self, side: BoundaryId, kind: BoundaryKind) -> Self {
        self.sides[side] = kind;
        self
    }

    /// Axes whose sides wrap (periodic or reset).
    pub fn periodic_axes(&self) -> [bool; 3] {
        std::array::from_fn(|axis| self.sides[2 * axis].wraps())
    }

    pub fn validate(&self) -> Result<()> {
        for axis in 0..3 {
            let (lo, hi) = (self.sides[2 * axis], self.sides[2 * axis + 1]);
            if lo.wraps() != hi.wraps() {
                return Err(SimError::InvalidBoundary(format!(
                    "axis {} mixes a wrapping side ({:?}) with a wall ({:?})",
                    axis, lo, hi
                )));
            }
            for kind in [lo, hi] {
                if let BoundaryKind::Velocity(v) = kind {
                    if !v.iter().all(|c| c.is_finite()) {
                        return Err(SimError::InvalidBoundary(format!(
                            "axis {} wall velocity must be finite",
                            axis
                        )));
                    }
                }
            }
        }
        Ok(())
    }
}

/// Outcome of one crossing pass.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CrossingStats {
    pub wrapped: usize,
    pub reflected: usize,
    pub reset: usize,
}

pub struct BoundaryConditionManager {
    spec: BoundarySpec,
    extent: [f32; 3],
    /// Per side, potentials bound against it and the type they apply to.
    potentials: [Vec<(TypeId, Arc<Potential>)>; 6],
}

impl BoundaryConditionManager {
    pub fn new(spec: BoundarySpec, extent: [f32; 3]) -> Result<Self> {
        spec.validate()?;
        Ok(Self {
            spec,
            extent,
            potentials: Default::default(),
        })
    }

    pub fn periodic_axes(&self) -> [bool; 3] {
        self.spec.periodic_axes()
    }

    pub fn bind_potential(&mut self, side: BoundaryId, type_id: TypeId, potential: Arc<Potential>) -> Result<()> {
        if side >= 6 {
            return Err(SimError::InvalidBoundary(format!("no boundary with id {}", side)));
        }
        if self.spec.sides[side].wraps() {
            log::warn!(
                "potential {} bound to wrapping boundary {}; it will act at the domain face",
                potential.label(),
                side
            );
        }
        let list = &mut self.potentials[side];
        let key = (type_id, potential.canonical_key());
        let at = list.partition_point(|(t, p)| (*t, p.canonical_key()) <= key);
        list.insert(at, (type_id, potential));
        Ok(())
    }

    pub fn has_potentials(&self) -> bool {
        self.potentials.iter().any(|p| !p.is_empty())
    }

    /// Add boundary-potential forces. Each wall acts as a virtual partner at
    /// the particle's projection onto the wall, moving with the wall velocity.
    /// Gripping walls also drag the particle along their tangential velocity.
    pub fn apply_forces(
        &self,
        particles: &[Particle],
        types: &[ParticleType],
        forces: &mut [Vec3],
        step: u64,
        seed: u64,
        dt: f32,
    ) {
        if !self.has_potentials() {
            return;
        }
        forces
            .par_iter_mut()
            .zip(particles.par_iter())
            .for_each(|(force, p)| {
                if !p.active {
                    return;
                }
                let ty = &types[p.type_id];
                let mut terms: SmallVec<[Vec3; 4]> = SmallVec::new();
                for side in 0..6 {
                    let axis = side / 2;
                    let x = component(p.pos, axis);
                    let dist = if side % 2 == 0 { x } else { self.extent[axis] - x };
                    let mut r_vec = Vec3::zero();
                    *component_mut(&mut r_vec, axis) = if side % 2 == 0 { -dist } else { dist };
                    let kind = self.spec.sides[side];
                    let rel_vel = p.vel - kind.wall_velocity();
                    let mut tangential = rel_vel;
                    *component_mut(&mut tangential, axis) = 0.0;
                    for (type_id, potential) in &self.potentials[side] {
                        if *type_id != p.type_id || !potential.in_range(dist) {
                            continue;
                        }
                        let noise = if potential.needs_noise() {
                            particle_rng(seed ^ (side as u64 + 1).rotate_left(32), step, p.id)
                                .sample::<f32, _>(StandardNormal)
                        } else {
                            0.0
                        };
                        let sample = PairSample {
                            r_vec,
                            r: dist,
                            rel_vel,
                            radius_sum: ty.radius,
                            noise,
                            dt,
                        };
                        terms.push(potential.force_on_a(&sample));
                        if kind.grips() {
                            terms.push(potential.wall_drag(dist, tangential));
                        }
                    }
                }
                if !terms.is_empty() {
                    *force += stable_sum_vec3(&terms);
                }
            });
    }

    /// Resolve particles that left the domain during the last position
    /// update. Frozen axes are never modified.
    pub fn enforce(&self, particles: &mut [Particle], types: &[ParticleType]) -> CrossingStats {
        particles
            .par_iter_mut()
            .map(|p| {
                let mut stats = CrossingStats::default();
                if !p.active {
                    return stats;
                }
                let ty = &types[p.type_id];
                for axis in 0..3 {
                    if ty.is_frozen(axis) {
                        continue;
                    }
                    let l = self.extent[axis];
                    let x = component(p.pos, axis);
                    let side = if x < 0.0 {
                        2 * axis
                    } else if x >= l {
                        2 * axis + 1
                    } else {
                        continue;
                    };
                    match self.spec.sides[side] {
                        BoundaryKind::Periodic => {
                            *component_mut(&mut p.pos, axis) = wrap(x, l);
                            stats.wrapped += 1;
                        }
                        BoundaryKind::Reset => {
                            *component_mut(&mut p.pos, axis) = wrap(x, l);
                            p.reset_species(ty);
                            stats.wrapped += 1;
                            stats.reset += 1;
                        }
                        BoundaryKind::FreeSlip => {
                            *component_mut(&mut p.pos, axis) = reflect(x, l);
                            let v = component_mut(&mut p.vel, axis);
                            *v = -*v;
                            stats.reflected += 1;
                        }
                        BoundaryKind::NoSlip => {
                            *component_mut(&mut p.pos, axis) = reflect(x, l);
                            bounce_back(&mut p.vel, [0.0; 3], ty);
                            stats.reflected += 1;
                        }
                        BoundaryKind::Velocity(wall) => {
                            *component_mut(&mut p.pos, axis) = reflect(x, l);
                            bounce_back(&mut p.vel, wall, ty);
                            stats.reflected += 1;
                        }
                    }
                }
                stats
            })
            .reduce(CrossingStats::default, |a, b| CrossingStats {
                wrapped: a.wrapped + b.wrapped,
                reflected: a.reflected + b.reflected,
                reset: a.reset + b.reset,
            })
    }
}

// Reverse the velocity relative to the wall on every non-frozen axis.
fn bounce_back(vel: &mut Vec3, wall: [f32; 3], ty: &ParticleType) {
    for (k, w) in wall.iter().enumerate() {
        if !ty.is_frozen(k) {
            let v = component_mut(vel, k);
            *v = 2.0 * w - *v;
        }
    }
}

fn wrap(x: f32, l: f32) -> f32 {
    let w = x.rem_euclid(l);
    if w >= l {
        w - l
    } else {
        w
    }
}

/// Mirror `x` back into `[0, l)`.
fn reflect(x: f32, l: f32) -> f32 {
    let inside = if x < 0.0 { -x } else { 2.0 * l - x };
    inside.clamp(0.0, l * (1.0 - f32::EPSILON))
}
