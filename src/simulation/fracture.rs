// simulation/fracture.rs
// Energy-driven bond removal, applied as one batch after evaluation.

use crate::body::ParticleId;

use super::bonds::{BondId, BondedNetwork};

/// A bond removed because its energy exceeded its dissociation energy.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Fracture {
    pub bond: BondId,
    pub particles: (ParticleId, ParticleId),
    pub energy: f32,
    pub threshold: f32,
}

#[derive(Default)]
pub struct FractureMonitor {
    total: usize,
}

impl FractureMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bonds whose last evaluated energy is above their threshold, ascending id.
    pub fn scan(network: &BondedNetwork) -> Vec<BondId> {
        network
            .iter()
            .filter(|b| b.exceeds_threshold())
            .map(|b| b.id)
            .collect()
    }

    /// Remove every bond over threshold. Must run after the whole evaluation
    /// pass so no energy of this step depends on the removal.
    pub fn apply(&mut self, network: &mut BondedNetwork) -> Vec<Fracture> {
        let doomed = Self::scan(network);
        if doomed.is_empty() {
            return Vec::new();
        }
        let fractures: Vec<Fracture> = network
            .remove_batch(&doomed)
            .into_iter()
            .map(|b| Fracture {
                bond: b.id,
                particles: (b.a, b.b),
                energy: b.energy,
                threshold: b.dissociation_energy.unwrap_or(f32::INFINITY),
            })
            .collect();
        self.total += fractures.len();
        fractures
    }

    /// Fractures over the lifetime of the monitor.
    pub fn total(&self) -> usize {
        self.total
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::potential::Potential;
    use std::sync::Arc;

    #[test]
    fn only_bonds_over_threshold_are_removed() {
        let mut net = BondedNetwork::new();
        let p = Arc::new(Potential::harmonic(1.0, 0.0));
        let weak = net.add(0, 1, p.clone(), 0.0, Some(0.5));
        let strong = net.add(1, 2, p.clone(), 0.0, Some(5.0));
        let eternal = net.add(2, 3, p, 0.0, None);
        for b in net.as_mut_slice() {
            b.energy = 1.0;
        }
        let mut monitor = FractureMonitor::new();
        let broken = monitor.apply(&mut net);
        assert_eq!(broken.len(), 1);
        assert_eq!(broken[0].bond, weak);
        assert_eq!(broken[0].particles, (0, 1));
        assert!(net.contains(strong) && net.contains(eternal));
        assert!(monitor.apply(&mut net).is_empty());
        assert_eq!(monitor.total(), 1);
    }

    #[test]
    fn equal_energy_does_not_fracture() {
        let mut net = BondedNetwork::new();
        net.add(0, 1, Arc::new(Potential::harmonic(1.0, 0.0)), 0.0, Some(1.0));
        net.as_mut_slice()[0].energy = 1.0;
        assert!(FractureMonitor::scan(&net).is_empty());
    }

    #[test]
    fn batch_is_reported_in_ascending_id_order() {
        let mut net = BondedNetwork::new();
        let p = Arc::new(Potential::harmonic(1.0, 0.0));
        for i in 0..5 {
            net.add(i, i + 1, p.clone(), 0.0, Some(0.1));
        }
        for b in net.as_mut_slice() {
            b.energy = 1.0;
        }
        let ids: Vec<_> = FractureMonitor::new().apply(&mut net).iter().map(|f| f.bond).collect();
        assert_eq!(ids, vec![0, 1, 2, 3, 4]);
        assert!(net.is_empty());
    }
}
