// body/pool.rs
// Particle storage with an id index and a per-type membership index.

use std::collections::{BTreeSet, HashMap};

use smallvec::SmallVec;
use ultraviolet::Vec3;

use super::types::{Particle, ParticleId};
use crate::error::{Result, SimError};
use crate::species::{TypeId, TypeRegistry};

/// Exclusive owner of every particle.
///
/// Storage order is creation order; destroying a particle shifts later
/// particles down and re-indexes them, so dense per-step buffers can be
/// indexed by storage position.
#[derive(Clone, Debug, Default)]
pub struct ParticlePool {
    particles: Vec<Particle>,
    index: HashMap<ParticleId, usize>,
    members: Vec<BTreeSet<ParticleId>>,
    next_id: ParticleId,
}

impl ParticlePool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(
        &mut self,
        types: &TypeRegistry,
        type_id: TypeId,
        pos: Vec3,
        vel: Vec3,
    ) -> Result<ParticleId> {
        let ty = types.get(type_id)?;
        if !(pos.x.is_finite() && pos.y.is_finite() && pos.z.is_finite()) {
            return Err(SimError::InvalidParam(format!(
                "particle position must be finite, got {:?}",
                pos
            )));
        }
        if !(vel.x.is_finite() && vel.y.is_finite() && vel.z.is_finite()) {
            return Err(SimError::InvalidParam(format!(
                "particle velocity must be finite, got {:?}",
                vel
            )));
        }
        let id = self.next_id;
        self.next_id += 1;
        self.index.insert(id, self.particles.len());
        self.particles.push(Particle::new(id, type_id, ty, pos, vel));
        self.membership_mut(type_id).insert(id);
        Ok(id)
    }

    /// Remove a particle from storage and from every index. Returns `None`
    /// when the id is not live.
    pub fn remove(&mut self, id: ParticleId) -> Option<Particle> {
        let idx = self.index.remove(&id)?;
        let particle = self.particles.remove(idx);
        for (offset, p) in self.particles[idx..].iter().enumerate() {
            self.index.insert(p.id, idx + offset);
        }
        if let Some(set) = self.members.get_mut(particle.type_id) {
            set.remove(&id);
        }
        Some(particle)
    }

    /// Move a particle to another type. Species shared by name keep their
    /// current value; species new to the particle start at the new type's
    /// initial value.
    pub fn reassign(&mut self, types: &TypeRegistry, id: ParticleId, new_type: TypeId) -> Result<()> {
        let new_ty = types.get(new_type)?;
        let idx = *self.index.get(&id).ok_or(SimError::UnknownParticle(id))?;
        let old_type = self.particles[idx].type_id;
        if old_type == new_type {
            return Ok(());
        }
        let old_ty = types.get(old_type)?;
        let particle = &mut self.particles[idx];
        let remapped: SmallVec<[f32; 4]> = new_ty
            .species
            .iter()
            .map(|s| {
                old_ty
                    .species_index(&s.name)
                    .and_then(|i| particle.concentrations.get(i).copied())
                    .unwrap_or(s.initial)
            })
            .collect();
        particle.concentrations = remapped;
        particle.type_id = new_type;

        if let Some(set) = self.members.get_mut(old_type) {
            set.remove(&id);
        }
        self.membership_mut(new_type).insert(id);
        log::debug!("particle {} moved from type {} to {}", id, old_type, new_type);
        Ok(())
    }

    fn membership_mut(&mut self, type_id: TypeId) -> &mut BTreeSet<ParticleId> {
        if self.members.len() <= type_id {
            self.members.resize_with(type_id + 1, BTreeSet::new);
        }
        &mut self.members[type_id]
    }

    /// Ids of all particles of `type_id`, ascending.
    pub fn members_of(&self, type_id: TypeId) -> impl Iterator<Item = ParticleId> + '_ {
        self.members
            .get(type_id)
            .into_iter()
            .flat_map(|set| set.iter().copied())
    }

    pub fn count_of(&self, type_id: TypeId) -> usize {
        self.members.get(type_id).map_or(0, |s| s.len())
    }

    pub fn get(&self, id: ParticleId) -> Option<&Particle> {
        self.index.get(&id).map(|&i| &self.particles[i])
    }

    pub fn get_mut(&mut self, id: ParticleId) -> Option<&mut Particle> {
        match self.index.get(&id) {
            Some(&i) => Some(&mut self.particles[i]),
            None => None,
        }
    }

    pub fn index_of(&self, id: ParticleId) -> Option<usize> {
        self.index.get(&id).copied()
    }

    pub fn contains(&self, id: ParticleId) -> bool {
        self.index.contains_key(&id)
    }

    pub fn as_slice(&self) -> &[Particle] {
        &self.particles
    }

    pub fn as_mut_slice(&mut self) -> &mut [Particle] {
        &mut self.particles
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Particle> {
        self.particles.iter()
    }

    pub fn len(&self) -> usize {
        self.particles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.particles.is_empty()
    }
}
