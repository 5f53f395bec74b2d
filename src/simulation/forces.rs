// simulation/forces.rs
// Force, energy and flux accumulation for one step.
//
// Pair dispatch: an explicit binding for the unordered type pair wins,
// otherwise the generic bindings of both types apply, and with neither the
// pair does not interact. Each particle's accumulators are written only by the
// task that owns it. Bond forces are computed in parallel and scattered
// serially in bond-creation order.

use std::collections::HashMap;
use std::sync::Arc;

use rand::Rng;
use rand_distr::StandardNormal;
use rayon::prelude::*;
use smallvec::SmallVec;
use ultraviolet::Vec3;

use crate::body::{Particle, ParticlePool};
use crate::cell_list::{CellList, Neighbor};
use crate::error::{Result, SimError};
use crate::potential::{Force, PairSample, Potential};
use crate::profile_scope;
use crate::species::{ParticleType, TypeId};
use crate::utils::{pair_rng, particle_rng, stable_sum, stable_sum_vec3};

use super::bonds::BondedNetwork;

// Independent RNG streams per interaction family.
const BOND_STREAM: u64 = 0xB0DD;
const FORCE_STREAM: u64 = 0xF0CE;

/// What a pair potential is bound to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Binding {
    /// Applies to every pair involving this type, unless the pair has an
    /// explicit binding.
    Type(TypeId),
    Pair(TypeId, TypeId),
}

impl Binding {
    pub fn types(&self) -> SmallVec<[TypeId; 2]> {
        match *self {
            Binding::Type(t) => smallvec::smallvec![t],
            Binding::Pair(a, b) => smallvec::smallvec![a, b],
        }
    }
}

/// Species exchange between neighbors of two types.
#[derive(Clone, Debug)]
pub struct FluxRule {
    pub type_a: TypeId,
    pub type_b: TypeId,
    pub species: String,
    pub rate: f32,
}

impl FluxRule {
    fn matches(&self, ta: TypeId, tb: TypeId) -> bool {
        (self.type_a == ta && self.type_b == tb) || (self.type_a == tb && self.type_b == ta)
    }
}

/// Per-step accumulators, indexed like the particle pool.
#[derive(Debug, Default)]
pub struct StepBuffers {
    pub forces: Vec<Vec3>,
    /// Concentration change per particle and species.
    pub flux: Vec<SmallVec<[f32; 4]>>,
    pub pair_energy: f32,
    pub bond_energy: f32,
}

/// Read-only inputs of one evaluation.
pub struct EvalContext<'a> {
    pub pool: &'a ParticlePool,
    pub types: &'a [ParticleType],
    pub cell_list: &'a CellList,
    pub step: u64,
    pub seed: u64,
    pub dt: f32,
}

fn sorted_pair(a: TypeId, b: TypeId) -> (TypeId, TypeId) {
    if a <= b {
        (a, b)
    } else {
        (b, a)
    }
}

// Potentials within one binding are kept sorted by their full key, so noise
// draws are handed out independently of binding order.
fn insert_canonical(list: &mut Vec<Arc<Potential>>, potential: Arc<Potential>) {
    let key = potential.canonical_key();
    let at = list.partition_point(|p| p.canonical_key() <= key);
    list.insert(at, potential);
}

#[derive(Default)]
pub struct PotentialEvaluator {
    cutoff: f32,
    generic: Vec<Vec<Arc<Potential>>>,
    pairs: HashMap<(TypeId, TypeId), Vec<Arc<Potential>>>,
    forces: Vec<Vec<Force>>,
    flux: Vec<FluxRule>,
}

impl PotentialEvaluator {
    pub fn new(cutoff: f32) -> Self {
        Self {
            cutoff,
            ..Default::default()
        }
    }

    pub fn bind_potential(&mut self, potential: Arc<Potential>, binding: Binding) {
        match binding {
            Binding::Type(t) => {
                if self.generic.len() <= t {
                    self.generic.resize_with(t + 1, Vec::new);
                }
                insert_canonical(&mut self.generic[t], potential);
            }
            Binding::Pair(a, b) => {
                insert_canonical(self.pairs.entry(sorted_pair(a, b)).or_default(), potential);
            }
        }
    }

    pub fn bind_force(&mut self, force: Force, type_id: TypeId) {
        if self.forces.len() <= type_id {
            self.forces.resize_with(type_id + 1, Vec::new);
        }
        let list = &mut self.forces[type_id];
        let key = format!("{:?}", force);
        let at = list.partition_point(|f| format!("{:?}", f) <= key);
        list.insert(at, force);
    }

    pub fn bind_flux(&mut self, rule: FluxRule, types: &[ParticleType]) -> Result<()> {
        for t in [rule.type_a, rule.type_b] {
            let ty = types.get(t).ok_or(SimError::UnknownType(t))?;
            if ty.species_index(&rule.species).is_none() {
                return Err(SimError::UnknownSpecies {
                    type_id: t,
                    name: rule.species.clone(),
                });
            }
        }
        self.flux.push(rule);
        Ok(())
    }

    /// Potentials acting between types `a` and `b`, in a deterministic order
    /// that is the same for `(a, b)` and `(b, a)`.
    pub fn potentials_for(&self, a: TypeId, b: TypeId) -> SmallVec<[&Arc<Potential>; 4]> {
        let key = sorted_pair(a, b);
        if let Some(explicit) = self.pairs.get(&key) {
            return explicit.iter().collect();
        }
        let mut out: SmallVec<[&Arc<Potential>; 4]> = SmallVec::new();
        let generic = |t: TypeId| self.generic.get(t).into_iter().flatten();
        out.extend(generic(key.0));
        if key.1 != key.0 {
            out.extend(generic(key.1));
        }
        out
    }

    pub fn forces_of(&self, type_id: TypeId) -> &[Force] {
        self.forces.get(type_id).map(|f| f.as_slice()).unwrap_or(&[])
    }

    fn has_pair_work(&self) -> bool {
        !self.pairs.is_empty() || self.generic.iter().any(|g| !g.is_empty()) || !self.flux.is_empty()
    }

    /// Evaluate every interaction of the current committed state. Bond
    /// energies are written into `bonds`; nothing else is mutated.
    pub fn evaluate(&self, ctx: &EvalContext<'_>, bonds: &mut BondedNetwork) -> StepBuffers {
        profile_scope!("evaluate");
        let particles = ctx.pool.as_slice();
        let mut buffers = StepBuffers {
            forces: vec![Vec3::zero(); particles.len()],
            flux: particles
                .iter()
                .map(|p| SmallVec::from_elem(0.0, p.concentrations.len()))
                .collect(),
            pair_energy: 0.0,
            bond_energy: 0.0,
        };

        if self.has_pair_work() {
            self.accumulate_pairs(ctx, &mut buffers);
        }
        self.accumulate_single(ctx, &mut buffers.forces);
        buffers.bond_energy = self.accumulate_bonds(ctx, bonds, &mut buffers.forces);
        buffers
    }

    fn accumulate_pairs(&self, ctx: &EvalContext<'_>, buffers: &mut StepBuffers) {
        profile_scope!("pair_forces");
        let particles = ctx.pool.as_slice();
        let neighbors = ctx.cell_list.neighbor_lists(particles, self.cutoff);

        let energies: Vec<f32> = buffers
            .forces
            .par_iter_mut()
            .zip(buffers.flux.par_iter_mut())
            .zip(neighbors.par_iter())
            .enumerate()
            .map(|(i, ((force, flux), list))| {
                let p = &particles[i];
                let mut energy = 0.0;
                for n in list {
                    let q = &particles[n.index];
                    let (f, e) = self.pair_interaction(ctx, p, q, n);
                    *force += f;
                    energy += 0.5 * e;
                    self.pair_flux(ctx, p, q, flux);
                }
                energy
            })
            .collect();
        buffers.pair_energy = energies.iter().sum();
    }

    // Evaluated with the lower particle id as `a` and negated for the other
    // member, so both owners see exactly opposite forces. Contributions are
    // summed by value, which makes the total independent of binding order.
    fn pair_interaction(&self, ctx: &EvalContext<'_>, p: &Particle, q: &Particle, n: &Neighbor) -> (Vec3, f32) {
        let potentials = self.potentials_for(p.type_id, q.type_id);
        if potentials.is_empty() {
            return (Vec3::zero(), 0.0);
        }
        let flipped = p.id > q.id;
        let (a, b, r_vec) = if flipped { (q, p, -n.r_vec) } else { (p, q, n.r_vec) };
        let radius_sum = ctx.types[a.type_id].radius + ctx.types[b.type_id].radius;
        let mut rng = None;
        let mut forces: SmallVec<[Vec3; 4]> = SmallVec::new();
        let mut energies: SmallVec<[f32; 4]> = SmallVec::new();
        for pot in potentials {
            let noise = if pot.needs_noise() {
                rng.get_or_insert_with(|| pair_rng(ctx.seed, ctx.step, a.id, b.id))
                    .sample::<f32, _>(StandardNormal)
            } else {
                0.0
            };
            let sample = PairSample {
                r_vec,
                r: n.r,
                rel_vel: a.vel - b.vel,
                radius_sum,
                noise,
                dt: ctx.dt,
            };
            forces.push(pot.force_on_a(&sample));
            energies.push(pot.energy(n.r, radius_sum));
        }
        let force = stable_sum_vec3(&forces);
        (if flipped { -force } else { force }, stable_sum(&mut energies))
    }

    fn pair_flux(&self, ctx: &EvalContext<'_>, p: &Particle, q: &Particle, delta: &mut SmallVec<[f32; 4]>) {
        for rule in &self.flux {
            if !rule.matches(p.type_id, q.type_id) {
                continue;
            }
            let own = ctx.types[p.type_id].species_index(&rule.species);
            let other = ctx.types[q.type_id].species_index(&rule.species);
            if let (Some(i), Some(j)) = (own, other) {
                if let (Some(ci), Some(cj)) = (p.concentrations.get(i), q.concentrations.get(j)) {
                    delta[i] += rule.rate * (cj - ci) * ctx.dt;
                }
            }
        }
    }

    fn accumulate_single(&self, ctx: &EvalContext<'_>, forces: &mut [Vec3]) {
        if self.forces.iter().all(|f| f.is_empty()) {
            return;
        }
        profile_scope!("single_forces");
        let particles = ctx.pool.as_slice();
        forces
            .par_iter_mut()
            .zip(particles.par_iter())
            .for_each(|(force, p)| {
                if !p.active {
                    return;
                }
                let bound = self.forces_of(p.type_id);
                if bound.is_empty() {
                    return;
                }
                let mut rng = particle_rng(ctx.seed ^ FORCE_STREAM, ctx.step, p.id);
                for f in bound {
                    *force += f.evaluate(p, &mut rng);
                }
            });
    }

    fn accumulate_bonds(&self, ctx: &EvalContext<'_>, bonds: &mut BondedNetwork, forces: &mut [Vec3]) -> f32 {
        if bonds.is_empty() {
            return 0.0;
        }
        profile_scope!("bond_forces");
        let particles = ctx.pool.as_slice();
        let contributions: Vec<Option<(usize, usize, Vec3, f32)>> = bonds
            .as_slice()
            .par_iter()
            .map(|bond| {
                let ia = ctx.pool.index_of(bond.a)?;
                let ib = ctx.pool.index_of(bond.b)?;
                let (pa, pb) = (&particles[ia], &particles[ib]);
                if !pa.active || !pb.active {
                    return None;
                }
                let r_vec = ctx.cell_list.separation(pa.pos, pb.pos);
                let r = r_vec.mag();
                let radius_sum = ctx.types[pa.type_id].radius + ctx.types[pb.type_id].radius;
                let noise = if bond.potential.needs_noise() {
                    pair_rng(ctx.seed ^ BOND_STREAM, ctx.step, pa.id, pb.id).sample::<f32, _>(StandardNormal)
                } else {
                    0.0
                };
                let sample = PairSample {
                    r_vec,
                    r,
                    rel_vel: pa.vel - pb.vel,
                    radius_sum,
                    noise,
                    dt: ctx.dt,
                };
                Some((ia, ib, bond.potential.force_on_a(&sample), bond.potential.energy(r, radius_sum)))
            })
            .collect();

        let mut total = 0.0;
        for (bond, contribution) in bonds.as_mut_slice().iter_mut().zip(contributions) {
            match contribution {
                Some((ia, ib, f, e)) => {
                    forces[ia] += f;
                    forces[ib] -= f;
                    bond.energy = e;
                    total += e;
                }
                None => bond.energy = 0.0,
            }
        }
        total
    }
}
