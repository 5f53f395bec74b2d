// simulation/bonds.rs
// Bond storage. Bonds are kept sorted by id, which is also creation order.

use std::collections::HashMap;
use std::sync::Arc;

use smallvec::SmallVec;

use crate::body::ParticleId;
use crate::potential::Potential;

pub type BondId = u64;

#[derive(Clone, Debug)]
pub struct Bond {
    pub id: BondId,
    pub a: ParticleId,
    pub b: ParticleId,
    pub potential: Arc<Potential>,
    /// Minimum-image separation of the two particles when the bond was
    /// created. Informational only: forces and energies come from the
    /// potential's own parameters.
    pub rest_length: f32,
    /// `None` means the bond never fractures.
    pub dissociation_energy: Option<f32>,
    /// Potential energy from the most recent evaluation.
    pub energy: f32,
}

impl Bond {
    pub fn exceeds_threshold(&self) -> bool {
        matches!(self.dissociation_energy, Some(e) if self.energy > e)
    }
}

#[derive(Default)]
pub struct BondedNetwork {
    bonds: Vec<Bond>,
    incident: HashMap<ParticleId, SmallVec<[BondId; 8]>>,
    next_id: BondId,
}

impl BondedNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(
        &mut self,
        a: ParticleId,
        b: ParticleId,
        potential: Arc<Potential>,
        rest_length: f32,
        dissociation_energy: Option<f32>,
    ) -> BondId {
        let id = self.next_id;
        self.next_id += 1;
        self.bonds.push(Bond {
            id,
            a,
            b,
            potential,
            rest_length,
            dissociation_energy,
            energy: 0.0,
        });
        self.incident.entry(a).or_default().push(id);
        if b != a {
            self.incident.entry(b).or_default().push(id);
        }
        id
    }

    fn position(&self, id: BondId) -> Option<usize> {
        self.bonds.binary_search_by_key(&id, |b| b.id).ok()
    }

    fn unlink(&mut self, bond: &Bond) {
        for p in [bond.a, bond.b] {
            if let Some(list) = self.incident.get_mut(&p) {
                list.retain(|id| *id != bond.id);
                if list.is_empty() {
                    self.incident.remove(&p);
                }
            }
        }
    }

    pub fn remove(&mut self, id: BondId) -> Option<Bond> {
        let idx = self.position(id)?;
        let bond = self.bonds.remove(idx);
        self.unlink(&bond);
        Some(bond)
    }

    /// Remove several bonds in one pass; returned in ascending id order.
    /// Unknown ids are ignored.
    pub fn remove_batch(&mut self, ids: &[BondId]) -> Vec<Bond> {
        if ids.is_empty() {
            return Vec::new();
        }
        let mut sorted = ids.to_vec();
        sorted.sort_unstable();
        sorted.dedup();
        let mut removed = Vec::with_capacity(sorted.len());
        let mut kept = Vec::with_capacity(self.bonds.len());
        for bond in self.bonds.drain(..) {
            if sorted.binary_search(&bond.id).is_ok() {
                removed.push(bond);
            } else {
                kept.push(bond);
            }
        }
        self.bonds = kept;
        for bond in &removed {
            self.unlink(bond);
        }
        removed
    }

    /// Drop every bond touching `p`.
    pub fn remove_incident(&mut self, p: ParticleId) -> Vec<Bond> {
        let ids: Vec<BondId> = self.incident_to(p).to_vec();
        self.remove_batch(&ids)
    }

    /// Ids of bonds touching `p`, in creation order.
    pub fn incident_to(&self, p: ParticleId) -> &[BondId] {
        self.incident.get(&p).map(|l| l.as_slice()).unwrap_or(&[])
    }

    pub fn get(&self, id: BondId) -> Option<&Bond> {
        self.position(id).map(|i| &self.bonds[i])
    }

    pub fn contains(&self, id: BondId) -> bool {
        self.position(id).is_some()
    }

    /// All bonds in creation order.
    pub fn iter(&self) -> impl Iterator<Item = &Bond> {
        self.bonds.iter()
    }

    pub fn as_slice(&self) -> &[Bond] {
        &self.bonds
    }

    pub fn as_mut_slice(&mut self) -> &mut [Bond] {
        &mut self.bonds
    }

    pub fn len(&self) -> usize {
        self.bonds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bonds.is_empty()
    }

    pub fn total_energy(&self) -> f32 {
        self.bonds.iter().map(|b| b.energy).sum()
    }
}
