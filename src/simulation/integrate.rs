// simulation/integrate.rs
// Advances velocity, position and species of every active particle.

use rayon::prelude::*;
use smallvec::SmallVec;
use ultraviolet::Vec3;

use crate::body::Particle;
use crate::profile_scope;
use crate::species::{Dynamics, ParticleType};
use crate::utils::{component, component_mut};

fn zero_frozen(v: &mut Vec3, ty: &ParticleType) {
    for axis in 0..3 {
        if ty.is_frozen(axis) {
            *component_mut(v, axis) = 0.0;
        }
    }
}

/// Newtonian types use symplectic Euler (`v += F/m dt`, then `x += v dt`);
/// overdamped types set `v = F/m` with the mass acting as a drag coefficient.
/// Frozen axes keep their coordinate bit-for-bit.
pub fn advance(
    particles: &mut [Particle],
    types: &[ParticleType],
    forces: &mut [Vec3],
    flux: &[SmallVec<[f32; 4]>],
    dt: f32,
) {
    profile_scope!("integrate");
    particles
        .par_iter_mut()
        .zip(forces.par_iter_mut())
        .zip(flux.par_iter())
        .for_each(|((p, force), delta)| {
            if !p.active {
                return;
            }
            let ty = &types[p.type_id];
            let frozen_coords: [f32; 3] = std::array::from_fn(|axis| component(p.pos, axis));

            zero_frozen(force, ty);
            zero_frozen(&mut p.vel, ty);
            match ty.dynamics {
                Dynamics::Newtonian => p.vel += *force / ty.mass * dt,
                Dynamics::Overdamped => p.vel = *force / ty.mass,
            }
            zero_frozen(&mut p.vel, ty);
            p.pos += p.vel * dt;
            for axis in 0..3 {
                if ty.is_frozen(axis) {
                    *component_mut(&mut p.pos, axis) = frozen_coords[axis];
                }
            }

            for ((c, d), spec) in p.concentrations.iter_mut().zip(delta).zip(&ty.species) {
                if !spec.constant {
                    *c += d;
                }
            }
        });
}
