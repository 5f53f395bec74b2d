// simulation/simulation.rs
// The simulation context: owns every component and drives the step pipeline.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crossbeam::channel::{unbounded, Receiver, Sender};
use ultraviolet::Vec3;

use crate::body::{Particle, ParticleId, ParticlePool};
use crate::cell_list::CellList;
use crate::config::{SimConfig, DIVERGENCE_REPORT_LIMIT};
use crate::diagnostics::{Diagnostics, RunSummary};
use crate::error::{Result, SimError};
use crate::lattice::{BondRule, BondTemplate, LatticeBuilder, UnitCell};
use crate::potential::{Force, Potential};
use crate::profile_scope;
use crate::species::{ParticleType, TypeId, TypeRegistry};
use crate::utils::{component, component_mut};

use super::bonds::{Bond, BondId, BondedNetwork};
use super::boundary::{BoundaryConditionManager, BoundaryId, CrossingStats};
use super::forces::{Binding, EvalContext, FluxRule, PotentialEvaluator, StepBuffers};
use super::fracture::FractureMonitor;
use super::integrate;

/// Notifications published to subscribers.
#[derive(Clone, Debug, PartialEq)]
pub enum SimEvent {
    BondFractured {
        bond: BondId,
        particles: (ParticleId, ParticleId),
        energy: f32,
        step: u64,
    },
    Diverged {
        step: u64,
        particles: Vec<ParticleId>,
        bonds: Vec<BondId>,
    },
}

/// A running simulation. Every core operation goes through this context;
/// there is no ambient global state.
pub struct Simulation {
    config: SimConfig,
    types: TypeRegistry,
    pool: ParticlePool,
    bonds: BondedNetwork,
    evaluator: PotentialEvaluator,
    boundary: BoundaryConditionManager,
    fracture: FractureMonitor,
    cell_list: CellList,
    step: u64,
    time: f64,
    halted: bool,
    cancel: Arc<AtomicBool>,
    subscribers: Vec<Sender<SimEvent>>,
    last_pair_energy: f32,
}

impl Simulation {
    pub fn initialize(config: SimConfig) -> Result<Self> {
        config.validate()?;
        let boundary = BoundaryConditionManager::new(config.boundary.clone(), config.domain_extent)?;
        let cell_list = CellList::new(
            config.domain_extent,
            config.effective_cell_size(),
            boundary.periodic_axes(),
        );
        log::info!(
            "simulation initialized: extent {:?}, cutoff {}, cell size {}, dt {}, boundary {:?}",
            config.domain_extent,
            config.effective_cutoff(),
            config.effective_cell_size(),
            config.dt,
            config.boundary.sides
        );
        Ok(Self {
            evaluator: PotentialEvaluator::new(config.effective_cutoff()),
            types: TypeRegistry::new(),
            pool: ParticlePool::new(),
            bonds: BondedNetwork::new(),
            boundary,
            fracture: FractureMonitor::new(),
            cell_list,
            step: 0,
            time: 0.0,
            halted: false,
            cancel: Arc::new(AtomicBool::new(false)),
            subscribers: Vec::new(),
            last_pair_energy: 0.0,
            config,
        })
    }

    /// Tear down the context and report what happened.
    pub fn finalize(self) -> RunSummary {
        let summary = RunSummary {
            steps: self.step,
            time: self.time,
            fractures: self.fracture.total(),
            halted: self.halted,
            last: self.diagnostics(),
        };
        log::info!(
            "simulation finalized after {} steps ({} fractures{})",
            summary.steps,
            summary.fractures,
            if summary.halted { ", halted" } else { "" }
        );
        summary
    }

    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    // ---- types and bindings ----

    pub fn register_type(&mut self, ty: ParticleType) -> Result<TypeId> {
        self.types.register(ty)
    }

    pub fn particle_type(&self, id: TypeId) -> Result<&ParticleType> {
        self.types.get(id)
    }

    pub fn find_type(&self, name: &str) -> Option<TypeId> {
        self.types.find(name)
    }

    pub fn bind_potential(&mut self, potential: Potential, binding: Binding) -> Result<()> {
        potential.validate()?;
        for t in binding.types() {
            self.types.ensure(t)?;
        }
        log::debug!("bound {} to {:?}", potential.label(), binding);
        self.evaluator.bind_potential(Arc::new(potential), binding);
        Ok(())
    }

    pub fn bind_force(&mut self, force: Force, type_id: TypeId) -> Result<()> {
        force.validate()?;
        self.types.ensure(type_id)?;
        log::debug!("bound force {:?} to type {}", force, type_id);
        self.evaluator.bind_force(force, type_id);
        Ok(())
    }

    pub fn bind_boundary_potential(&mut self, potential: Potential, side: BoundaryId, type_id: TypeId) -> Result<()> {
        potential.validate()?;
        self.types.ensure(type_id)?;
        self.boundary.bind_potential(side, type_id, Arc::new(potential))
    }

    pub fn bind_flux(&mut self, type_a: TypeId, type_b: TypeId, species: &str, rate: f32) -> Result<()> {
        if !rate.is_finite() {
            return Err(SimError::InvalidParam(format!("flux rate must be finite, got {}", rate)));
        }
        let rule = FluxRule {
            type_a,
            type_b,
            species: species.to_string(),
            rate,
        };
        self.evaluator.bind_flux(rule, self.types.as_slice())
    }

    // ---- particles ----

    /// Map `pos` into the domain: wrapping axes wrap, wall axes must already
    /// contain it.
    fn place(&self, mut pos: Vec3) -> Result<Vec3> {
        let periodic = self.boundary.periodic_axes();
        for axis in 0..3 {
            let l = self.config.domain_extent[axis];
            let x = component(pos, axis);
            if !x.is_finite() {
                return Err(SimError::InvalidParam(format!("position must be finite, got {:?}", pos)));
            }
            if periodic[axis] {
                let w = x.rem_euclid(l);
                *component_mut(&mut pos, axis) = if w >= l { w - l } else { w };
            } else if !(0.0..l).contains(&x) {
                return Err(SimError::InvalidParam(format!(
                    "position {:?} lies outside the domain on axis {}",
                    pos, axis
                )));
            }
        }
        Ok(pos)
    }

    pub fn create_particle(&mut self, type_id: TypeId, pos: Vec3, vel: Vec3) -> Result<ParticleId> {
        let pos = self.place(pos)?;
        self.pool.insert(&self.types, type_id, pos, vel)
    }

    pub fn query_particle(&self, id: ParticleId) -> Option<&Particle> {
        self.pool.get(id)
    }

    pub fn particles(&self) -> &[Particle] {
        self.pool.as_slice()
    }

    pub fn particles_of_type(&self, type_id: TypeId) -> Vec<ParticleId> {
        self.pool.members_of(type_id).collect()
    }

    /// Remove a particle and every bond touching it. Destroying an unknown
    /// particle only logs a warning.
    pub fn destroy_particle(&mut self, id: ParticleId) -> bool {
        if self.pool.remove(id).is_none() {
            log::warn!("destroy_particle: particle {} does not exist", id);
            return false;
        }
        let dropped = self.bonds.remove_incident(id);
        log::debug!("destroyed particle {} and {} bonds", id, dropped.len());
        true
    }

    pub fn reassign_type(&mut self, id: ParticleId, new_type: TypeId) -> Result<()> {
        self.pool.reassign(&self.types, id, new_type)
    }

    pub fn set_active(&mut self, id: ParticleId, active: bool) -> Result<()> {
        let p = self.pool.get_mut(id).ok_or(SimError::UnknownParticle(id))?;
        p.active = active;
        Ok(())
    }

    pub fn set_velocity(&mut self, id: ParticleId, vel: Vec3) -> Result<()> {
        if !(vel.x.is_finite() && vel.y.is_finite() && vel.z.is_finite()) {
            return Err(SimError::InvalidParam(format!("velocity must be finite, got {:?}", vel)));
        }
        let p = self.pool.get_mut(id).ok_or(SimError::UnknownParticle(id))?;
        p.vel = vel;
        Ok(())
    }

    // ---- bonds ----

    pub fn create_bond(
        &mut self,
        potential: Potential,
        a: ParticleId,
        b: ParticleId,
        dissociation_energy: Option<f32>,
    ) -> Result<BondId> {
        potential.validate()?;
        self.create_shared_bond(Arc::new(potential), a, b, dissociation_energy)
    }

    /// Bond two particles with a potential that may be shared by other bonds.
    pub fn create_shared_bond(
        &mut self,
        potential: Arc<Potential>,
        a: ParticleId,
        b: ParticleId,
        dissociation_energy: Option<f32>,
    ) -> Result<BondId> {
        if a == b {
            return Err(SimError::InvalidParam(format!("cannot bond particle {} to itself", a)));
        }
        if let Some(e) = dissociation_energy {
            if e.is_nan() {
                return Err(SimError::InvalidParam("dissociation energy must not be NaN".into()));
            }
        }
        let pa = self.pool.get(a).ok_or(SimError::UnknownParticle(a))?;
        let pb = self.pool.get(b).ok_or(SimError::UnknownParticle(b))?;
        let rest_length = self.cell_list.separation(pa.pos, pb.pos).mag();
        Ok(self.bonds.add(a, b, potential, rest_length, dissociation_energy))
    }

    /// Remove a bond. Removing an unknown or already removed bond only logs
    /// a warning.
    pub fn remove_bond(&mut self, id: BondId) -> bool {
        if self.bonds.remove(id).is_none() {
            log::warn!("remove_bond: bond {} does not exist", id);
            return false;
        }
        true
    }

    pub fn bond(&self, id: BondId) -> Option<&Bond> {
        self.bonds.get(id)
    }

    /// Bonds touching `id`, in creation order.
    pub fn query_bonds_of(&self, id: ParticleId) -> Vec<&Bond> {
        self.bonds
            .incident_to(id)
            .iter()
            .filter_map(|b| self.bonds.get(*b))
            .collect()
    }

    pub fn bonds(&self) -> impl Iterator<Item = &Bond> {
        self.bonds.iter()
    }

    pub fn bond_count(&self) -> usize {
        self.bonds.len()
    }

    // ---- lattices ----

    pub fn build_unit_cell(
        &self,
        vectors: [Vec3; 3],
        basis_positions: Vec<Vec3>,
        basis_types: Vec<TypeId>,
        rules: Vec<BondRule>,
        dimensionality: usize,
    ) -> Result<UnitCell> {
        for t in &basis_types {
            self.types.ensure(*t)?;
        }
        UnitCell::new(vectors, basis_positions, basis_types, rules, dimensionality)
    }

    /// Replicate `cell` from the domain origin. Returns the created particle
    /// ids in row-major `(i, j, k)`, then basis order.
    pub fn instantiate_lattice(&mut self, cell: &UnitCell, counts: [usize; 3]) -> Result<Vec<ParticleId>> {
        self.instantiate_lattice_at(cell, counts, Vec3::zero())
    }

    /// Like [`Simulation::instantiate_lattice`] with an explicit origin.
    /// Everything is validated before the first particle is created.
    pub fn instantiate_lattice_at(
        &mut self,
        cell: &UnitCell,
        counts: [usize; 3],
        origin: Vec3,
    ) -> Result<Vec<ParticleId>> {
        profile_scope!("instantiate_lattice");
        for t in cell.basis_types() {
            self.types.ensure(*t)?;
        }
        let plan = LatticeBuilder::new(cell, counts)
            .with_periodic(self.boundary.periodic_axes())
            .with_origin(origin)
            .plan()?;

        let basis_types = cell.basis_types();
        let templates: Vec<BondTemplate> = cell
            .rules()
            .iter()
            .map(|rule| (rule.factory)(basis_types[rule.basis.0], basis_types[rule.basis.1]))
            .collect();
        for template in &templates {
            template.potential.validate()?;
            if matches!(template.dissociation_energy, Some(e) if e.is_nan()) {
                return Err(SimError::InvalidParam("dissociation energy must not be NaN".into()));
            }
        }
        let positions = plan
            .sites
            .iter()
            .map(|site| self.place(site.pos))
            .collect::<Result<Vec<_>>>()?;

        let mut ids = Vec::with_capacity(plan.sites.len());
        for (site, pos) in plan.sites.iter().zip(&positions) {
            ids.push(self.pool.insert(&self.types, site.type_id, *pos, Vec3::zero())?);
        }
        for bond in &plan.bonds {
            let template = &templates[bond.rule];
            let rest_length = self.cell_list.separation(positions[bond.a], positions[bond.b]).mag();
            self.bonds.add(
                ids[bond.a],
                ids[bond.b],
                template.potential.clone(),
                rest_length,
                template.dissociation_energy,
            );
        }
        log::info!(
            "lattice {:?} instantiated: {} particles, {} bonds",
            counts,
            ids.len(),
            plan.bonds.len()
        );
        Ok(ids)
    }

    // ---- stepping ----

    pub fn time(&self) -> f64 {
        self.time
    }

    pub fn step_count(&self) -> u64 {
        self.step
    }

    pub fn is_halted(&self) -> bool {
        self.halted
    }

    /// Setting the returned flag stops a running `step(n)` after the current
    /// step completes. The flag is cleared when the stop is honored.
    pub fn cancel_handle(&self) -> Arc<AtomicBool> {
        self.cancel.clone()
    }

    pub fn subscribe(&mut self) -> Receiver<SimEvent> {
        let (tx, rx) = unbounded();
        self.subscribers.push(tx);
        rx
    }

    fn publish(&mut self, event: SimEvent) {
        self.subscribers.retain(|tx| tx.send(event.clone()).is_ok());
    }

    /// Advance up to `n` steps. Returns the number of steps completed, which
    /// is less than `n` only when cancelled.
    pub fn step(&mut self, n: usize) -> Result<usize> {
        for done in 0..n {
            if self.cancel.swap(false, Ordering::AcqRel) {
                log::info!("stepping cancelled after {} of {} steps", done, n);
                return Ok(done);
            }
            self.step_once()?;
        }
        Ok(n)
    }

    fn step_once(&mut self) -> Result<()> {
        if self.halted {
            return Err(SimError::Halted);
        }
        profile_scope!("step");
        let dt = self.config.dt;

        self.cell_list.rebuild(self.pool.as_slice());
        let ctx = EvalContext {
            pool: &self.pool,
            types: self.types.as_slice(),
            cell_list: &self.cell_list,
            step: self.step,
            seed: self.config.seed,
            dt,
        };
        let mut buffers = self.evaluator.evaluate(&ctx, &mut self.bonds);
        self.boundary.apply_forces(
            self.pool.as_slice(),
            self.types.as_slice(),
            &mut buffers.forces,
            self.step,
            self.config.seed,
            dt,
        );
        self.check_forces(&buffers)?;

        let fractures = self.fracture.apply(&mut self.bonds);
        for f in fractures {
            log::info!(
                "step {}: bond {} between {} and {} fractured (energy {:.4} > {:.4})",
                self.step,
                f.bond,
                f.particles.0,
                f.particles.1,
                f.energy,
                f.threshold
            );
            self.publish(SimEvent::BondFractured {
                bond: f.bond,
                particles: f.particles,
                energy: f.energy,
                step: self.step,
            });
        }

        integrate::advance(
            self.pool.as_mut_slice(),
            self.types.as_slice(),
            &mut buffers.forces,
            &buffers.flux,
            dt,
        );
        let crossings = self.boundary.enforce(self.pool.as_mut_slice(), self.types.as_slice());
        if crossings != CrossingStats::default() {
            log::trace!("step {}: boundary crossings {:?}", self.step, crossings);
        }
        self.check_state()?;

        self.last_pair_energy = buffers.pair_energy;
        self.step += 1;
        self.time += dt as f64;
        Ok(())
    }

    fn check_forces(&mut self, buffers: &StepBuffers) -> Result<()> {
        let bad: Vec<usize> = buffers
            .forces
            .iter()
            .enumerate()
            .filter(|(_, f)| !(f.x.is_finite() && f.y.is_finite() && f.z.is_finite()))
            .map(|(i, _)| i)
            .collect();
        let bad_bonds = self.bonds.iter().any(|b| !b.energy.is_finite());
        if bad.is_empty() && !bad_bonds {
            return Ok(());
        }
        Err(self.halt(bad))
    }

    fn check_state(&mut self) -> Result<()> {
        let bad: Vec<usize> = self
            .pool
            .iter()
            .enumerate()
            .filter(|(_, p)| !p.is_finite())
            .map(|(i, _)| i)
            .collect();
        if bad.is_empty() {
            return Ok(());
        }
        Err(self.halt(bad))
    }

    /// Stop the loop and build the divergence error for the particles at
    /// storage indices `bad`.
    fn halt(&mut self, bad: Vec<usize>) -> SimError {
        self.halted = true;
        let particles: Vec<ParticleId> = bad
            .iter()
            .map(|&i| self.pool.as_slice()[i].id)
            .take(DIVERGENCE_REPORT_LIMIT)
            .collect();
        let bonds: Vec<BondId> = self
            .bonds
            .iter()
            .filter(|b| !b.energy.is_finite() || particles.contains(&b.a) || particles.contains(&b.b))
            .map(|b| b.id)
            .take(DIVERGENCE_REPORT_LIMIT)
            .collect();
        log::error!(
            "step {}: numerical divergence in {} particles (first {:?}), bonds {:?}",
            self.step,
            bad.len(),
            particles,
            bonds
        );
        self.publish(SimEvent::Diverged {
            step: self.step,
            particles: particles.clone(),
            bonds: bonds.clone(),
        });
        SimError::Diverged {
            step: self.step,
            particles,
            bonds,
        }
    }

    pub fn diagnostics(&self) -> Diagnostics {
        Diagnostics::collect(
            self.pool.as_slice(),
            self.types.as_slice(),
            self.step,
            self.time,
            self.bonds.len(),
            self.last_pair_energy,
            self.bonds.total_energy(),
        )
    }
}
