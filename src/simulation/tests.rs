// End-to-end tests of the simulation context

use super::*;
use crate::config::SimConfig;
use crate::error::SimError;
use crate::lattice::{BondRule, BondTemplate};
use crate::potential::{Force, Potential};
use crate::species::{ParticleType, SpeciesSpec};
use std::sync::atomic::Ordering;
use ultraviolet::Vec3;

fn spring(_: usize, _: usize) -> BondTemplate {
    BondTemplate::new(Potential::harmonic(100.0, 0.3))
}

fn sim_with(extent: [f32; 3], boundary: BoundarySpec) -> Simulation {
    Simulation::initialize(SimConfig::default().with_extent(extent).with_boundary(boundary)).unwrap()
}

fn two_basis_sheet(boundary: BoundarySpec) -> (Simulation, Vec<u64>) {
    let mut sim = sim_with([10.0, 10.0, 1.0], boundary);
    let a = sim.register_type(ParticleType::new("A", 0.1, 1.0)).unwrap();
    let b = sim.register_type(ParticleType::new("B", 0.1, 1.0)).unwrap();
    let cell = sim
        .build_unit_cell(
            [Vec3::unit_x(), Vec3::unit_y(), Vec3::unit_z()],
            vec![Vec3::new(0.25, 0.5, 0.0), Vec3::new(0.55, 0.5, 0.0)],
            vec![a, b],
            vec![
                BondRule::new(spring, (0, 1), [0, 0, 0]),
                BondRule::new(spring, (1, 0), [1, 0, 0]),
            ],
            2,
        )
        .unwrap();
    let ids = sim.instantiate_lattice(&cell, [10, 10, 1]).unwrap();
    (sim, ids)
}

mod lattice {
    use super::*;

    #[test]
    fn periodic_sheet_has_two_bonds_per_cell() {
        let (sim, ids) = two_basis_sheet(BoundarySpec::periodic());
        assert_eq!(ids.len(), 200);
        assert_eq!(sim.bond_count(), 200);
        // every particle sits on exactly two bonds
        assert!(ids.iter().all(|id| sim.query_bonds_of(*id).len() == 2));
    }

    #[test]
    fn open_axis_drops_one_row_of_wrap_bonds() {
        let spec = BoundarySpec::periodic().with_axis(0, BoundaryKind::FreeSlip);
        let (sim, ids) = two_basis_sheet(spec);
        assert_eq!(sim.bond_count(), 190);
        // last cell of the first row keeps only its internal bond
        let edge = ids[(9 * 10) * 2 + 1];
        assert_eq!(sim.query_bonds_of(edge).len(), 1);
    }

    #[test]
    fn wrap_bonds_use_minimum_image_rest_length() {
        let (sim, _) = two_basis_sheet(BoundarySpec::periodic());
        for bond in sim.bonds() {
            assert!(bond.rest_length < 0.71, "rest length {}", bond.rest_length);
        }
    }

    #[test]
    fn simple_cubic_counts() {
        let n = 4usize;
        let build = |boundary: BoundarySpec| {
            let mut sim = sim_with([n as f32; 3], boundary);
            let t = sim.register_type(ParticleType::new("atom", 0.2, 1.0)).unwrap();
            let rules = (0..3)
                .map(|axis| {
                    let mut offset = [0; 3];
                    offset[axis] = 1;
                    BondRule::new(spring, (0, 0), offset)
                })
                .collect();
            let cell = sim
                .build_unit_cell([Vec3::unit_x(), Vec3::unit_y(), Vec3::unit_z()], vec![Vec3::zero()], vec![t], rules, 3)
                .unwrap();
            sim.instantiate_lattice(&cell, [n; 3]).unwrap();
            sim.bond_count()
        };
        assert_eq!(build(BoundarySpec::periodic()), 3 * n * n * n);
        assert_eq!(build(BoundarySpec::walls(BoundaryKind::FreeSlip)), 3 * n * n * (n - 1));
    }

    #[test]
    fn invalid_lattice_creates_nothing() {
        let mut sim = sim_with([4.0; 3], BoundarySpec::walls(BoundaryKind::NoSlip));
        let t = sim.register_type(ParticleType::new("atom", 0.2, 1.0)).unwrap();
        let bad_rule = sim.build_unit_cell(
            [Vec3::unit_x(), Vec3::unit_y(), Vec3::unit_z()],
            vec![Vec3::zero()],
            vec![t],
            vec![BondRule::new(spring, (0, 2), [1, 0, 0])],
            3,
        );
        assert!(matches!(bad_rule, Err(SimError::InvalidBasisIndex { .. })));

        let unknown_type = sim.build_unit_cell(
            [Vec3::unit_x(), Vec3::unit_y(), Vec3::unit_z()],
            vec![Vec3::zero()],
            vec![7],
            vec![],
            3,
        );
        assert!(matches!(unknown_type, Err(SimError::UnknownType(7))));

        // fits the first 4 cells but not a fifth
        let cell = sim
            .build_unit_cell([Vec3::unit_x(), Vec3::unit_y(), Vec3::unit_z()], vec![Vec3::zero()], vec![t], vec![], 3)
            .unwrap();
        assert!(sim.instantiate_lattice(&cell, [5, 1, 1]).is_err());
        assert!(sim.particles().is_empty());
        assert_eq!(sim.bond_count(), 0);
    }
}

mod fracture {
    use super::*;

    fn stretched_pair() -> (Simulation, u64, u64, BondId) {
        let mut sim = Simulation::initialize(SimConfig::default().with_dt(0.001)).unwrap();
        let t = sim.register_type(ParticleType::new("atom", 0.05, 1.0)).unwrap();
        let a = sim.create_particle(t, Vec3::new(4.85, 5.0, 5.0), Vec3::new(-2.0, 0.0, 0.0)).unwrap();
        let b = sim.create_particle(t, Vec3::new(5.15, 5.0, 5.0), Vec3::new(2.0, 0.0, 0.0)).unwrap();
        let bond = sim.create_bond(Potential::harmonic(100.0, 0.3), a, b, Some(1.0)).unwrap();
        (sim, a, b, bond)
    }

    #[test]
    fn bond_breaks_once_and_never_returns() {
        let (mut sim, a, b, bond) = stretched_pair();
        let events = sim.subscribe();
        let mut broke_at = None;
        for _ in 0..400 {
            sim.step(1).unwrap();
            match sim.bond(bond) {
                Some(live) => {
                    assert!(broke_at.is_none(), "bond reappeared");
                    assert!(live.energy <= 1.0);
                }
                None => {
                    broke_at.get_or_insert(sim.step_count() - 1);
                }
            }
        }
        let step = broke_at.expect("bond never fractured");
        let fractured: Vec<SimEvent> = events.try_iter().collect();
        assert_eq!(fractured.len(), 1);
        match &fractured[0] {
            SimEvent::BondFractured { bond: id, particles, energy, step: s } => {
                assert_eq!(*id, bond);
                assert_eq!(*particles, (a, b));
                assert!(*energy > 1.0);
                assert_eq!(*s, step);
            }
            other => panic!("unexpected event {:?}", other),
        }
        // isolated particles stay ordinary free particles
        assert!(sim.query_particle(a).unwrap().active);
        assert!(sim.query_bonds_of(a).is_empty());
        assert_eq!(sim.finalize().fractures, 1);
    }

    #[test]
    fn bonds_without_threshold_never_break() {
        let (mut sim, a, b, bond) = stretched_pair();
        assert!(sim.remove_bond(bond));
        let eternal = sim.create_bond(Potential::harmonic(100.0, 0.3), a, b, None).unwrap();
        sim.step(400).unwrap();
        assert!(sim.bond(eternal).is_some());
    }

    #[test]
    fn double_removal_is_a_noop() {
        let (mut sim, a, _, bond) = stretched_pair();
        assert!(sim.remove_bond(bond));
        assert!(!sim.remove_bond(bond));
        assert!(sim.destroy_particle(a));
        assert!(!sim.destroy_particle(a));
    }

    #[test]
    fn destroying_a_particle_cascades_to_its_bonds() {
        let (mut sim, a, b, bond) = stretched_pair();
        assert!(sim.destroy_particle(b));
        assert!(sim.bond(bond).is_none());
        assert!(sim.query_bonds_of(a).is_empty());
        sim.step(5).unwrap();
    }

    #[test]
    fn self_bonds_and_unknown_particles_are_rejected() {
        let (mut sim, a, _, _) = stretched_pair();
        assert!(sim.create_bond(Potential::harmonic(1.0, 0.0), a, a, None).is_err());
        assert!(matches!(
            sim.create_bond(Potential::harmonic(1.0, 0.0), a, 99, None),
            Err(SimError::UnknownParticle(99))
        ));
    }
}

mod dynamics {
    use super::*;

    #[test]
    fn closed_periodic_system_conserves_momentum() {
        let mut sim = sim_with([4.0; 3], BoundarySpec::periodic());
        let t = sim.register_type(ParticleType::new("bead", 0.1, 1.0)).unwrap();
        let rules = vec![
            BondRule::new(|_, _| BondTemplate::new(Potential::harmonic(10.0, 1.0)), (0, 0), [1, 0, 0]),
            BondRule::new(|_, _| BondTemplate::new(Potential::harmonic(10.0, 1.0)), (0, 0), [0, 1, 0]),
        ];
        let cell = sim
            .build_unit_cell(
                [Vec3::unit_x(), Vec3::unit_y(), Vec3::unit_z()],
                vec![Vec3::new(0.5, 0.5, 0.5)],
                vec![t],
                rules,
                3,
            )
            .unwrap();
        let ids = sim.instantiate_lattice(&cell, [4, 4, 4]).unwrap();
        sim.bind_potential(Potential::dpd(25.0, 4.5, 3.0, 1.2), Binding::Type(t)).unwrap();
        for (i, id) in ids.iter().enumerate() {
            let x = i as f32;
            sim.set_velocity(*id, Vec3::new(x.sin(), (1.3 * x).cos(), (0.7 * x).sin()) * 0.5)
                .unwrap();
        }
        let p0 = sim.diagnostics().momentum;
        sim.step(200).unwrap();
        let p1 = sim.diagnostics().momentum;
        assert!((p1 - p0).mag() < 1e-2, "momentum drifted from {:?} to {:?}", p0, p1);
    }

    #[test]
    fn frozen_axis_is_bit_for_bit_stable() {
        let mut sim = sim_with([5.0; 3], BoundarySpec::walls(BoundaryKind::NoSlip));
        let slider = sim
            .register_type(ParticleType::new("slider", 0.1, 1.0).with_frozen([false, true, false]))
            .unwrap();
        let y0 = 2.0f32 + 0.1 + 0.2;
        let id = sim.create_particle(slider, Vec3::new(1.0, y0, 2.5), Vec3::zero()).unwrap();
        let other = sim.create_particle(slider, Vec3::new(1.3, 2.5, 2.5), Vec3::zero()).unwrap();
        sim.bind_force(Force::Constant(Vec3::new(0.5, -50.0, 0.0)), slider).unwrap();
        sim.bind_potential(Potential::coulomb(0.05).with_range(0.01, 1.0), Binding::Type(slider))
            .unwrap();
        sim.step(150).unwrap();
        assert_eq!(sim.query_particle(id).unwrap().pos.y.to_bits(), y0.to_bits());
        assert_eq!(sim.query_particle(other).unwrap().pos.y.to_bits(), 2.5f32.to_bits());
        assert!(sim.query_particle(id).unwrap().pos.x != 1.0);
    }

    #[test]
    fn binding_order_gives_identical_trajectories() {
        let run = |flip: bool| {
            let mut sim = sim_with([6.0; 3], BoundarySpec::periodic());
            let a = sim.register_type(ParticleType::new("a", 0.1, 1.0)).unwrap();
            let b = sim.register_type(ParticleType::new("b", 0.1, 2.0)).unwrap();
            let mut bindings = vec![
                (Potential::morse(0.5, 3.0, 0.6), Binding::Type(a)),
                (Potential::harmonic(2.0, 0.7).with_range(0.0, 1.0), Binding::Type(b)),
                (Potential::power_law(0.1, 0.5, 2.0).with_range(0.0, 1.0), Binding::Type(a)),
            ];
            if flip {
                bindings.reverse();
            }
            for (p, binding) in bindings {
                sim.bind_potential(p, binding).unwrap();
            }
            let forces = [Force::Friction { coef: 0.1 }, Force::Constant(Vec3::new(0.0, 0.0, 0.3))];
            for f in if flip { forces.iter().rev().collect::<Vec<_>>() } else { forces.iter().collect() } {
                sim.bind_force(f.clone(), a).unwrap();
            }
            for i in 0..4 {
                let t = if i % 2 == 0 { a } else { b };
                sim.create_particle(t, Vec3::new(2.0 + 0.6 * i as f32, 3.0, 3.0 + 0.1 * i as f32), Vec3::zero())
                    .unwrap();
            }
            sim.step(30).unwrap();
            sim.particles().iter().map(|p| p.pos).collect::<Vec<_>>()
        };
        assert_eq!(run(false), run(true));
    }

    #[test]
    fn stochastic_runs_are_reproducible() {
        let run = || {
            let mut sim = sim_with([3.0; 3], BoundarySpec::periodic());
            let t = sim.register_type(ParticleType::new("fluid", 0.1, 1.0)).unwrap();
            sim.bind_potential(Potential::dpd(10.0, 4.5, 3.0, 1.0), Binding::Type(t)).unwrap();
            sim.bind_force(Force::Random { std: 0.5, mean: 0.0 }, t).unwrap();
            for i in 0..8 {
                let x = i as f32 * 0.37;
                sim.create_particle(t, Vec3::new(x, 1.5, 1.0 + 0.2 * i as f32), Vec3::zero()).unwrap();
            }
            sim.step(25).unwrap();
            sim.particles().iter().map(|p| (p.pos, p.vel)).collect::<Vec<_>>()
        };
        assert_eq!(run(), run());
    }

    #[test]
    fn overdamped_particles_stop_without_force() {
        let mut sim = sim_with([5.0; 3], BoundarySpec::periodic());
        let cell = sim
            .register_type(ParticleType::new("cell", 0.5, 2.0).with_dynamics(crate::species::Dynamics::Overdamped))
            .unwrap();
        let id = sim.create_particle(cell, Vec3::new(1.0, 1.0, 1.0), Vec3::new(3.0, 0.0, 0.0)).unwrap();
        sim.step(1).unwrap();
        let p = sim.query_particle(id).unwrap();
        assert_eq!(p.vel, Vec3::zero());
        assert_eq!(p.pos, Vec3::new(1.0, 1.0, 1.0));
    }
}

mod species_and_boundaries {
    use super::*;

    #[test]
    fn reset_boundary_restores_initial_concentrations() {
        let spec = BoundarySpec::periodic().with_axis(0, BoundaryKind::Reset);
        let mut sim = sim_with([10.0; 3], spec);
        let fluid = sim
            .register_type(ParticleType::new("fluid", 0.1, 1.0).with_species(SpeciesSpec::new("S", 1.0)))
            .unwrap();
        let sink = sim
            .register_type(ParticleType::new("sink", 0.1, 1.0).with_species(SpeciesSpec::constant("S", 0.0)))
            .unwrap();
        sim.bind_flux(fluid, sink, "S", 1.0).unwrap();
        let v = Vec3::new(5.0, 0.0, 0.0);
        let id = sim.create_particle(fluid, Vec3::new(9.0, 5.0, 5.0), v).unwrap();
        sim.create_particle(sink, Vec3::new(9.3, 5.0, 5.0), v).unwrap();

        let mut crossed = false;
        let mut last_x = 9.0;
        for _ in 0..30 {
            sim.step(1).unwrap();
            let p = sim.query_particle(id).unwrap();
            if p.pos.x < last_x {
                assert_eq!(p.concentrations[0], 1.0);
                crossed = true;
                break;
            }
            assert!(p.concentrations[0] < 1.0);
            last_x = p.pos.x;
        }
        assert!(crossed);
    }

    #[test]
    fn flux_is_independent_of_creation_order() {
        let run = |reverse: bool| {
            let mut sim = sim_with([6.0; 3], BoundarySpec::periodic());
            let a = sim
                .register_type(ParticleType::new("a", 0.1, 1.0).with_species(SpeciesSpec::new("S", 1.0)))
                .unwrap();
            let b = sim
                .register_type(ParticleType::new("b", 0.1, 1.0).with_species(SpeciesSpec::new("S", 0.0)))
                .unwrap();
            sim.bind_flux(a, b, "S", 0.7).unwrap();
            let mut placements = vec![(a, 1.0f32), (b, 1.4), (a, 1.8), (b, 2.2)];
            if reverse {
                placements.reverse();
            }
            for (t, x) in placements {
                sim.create_particle(t, Vec3::new(x, 3.0, 3.0), Vec3::zero()).unwrap();
            }
            sim.step(3).unwrap();
            let mut out: Vec<(u32, f32)> = sim
                .particles()
                .iter()
                .map(|p| (p.pos.x.to_bits(), p.concentrations[0]))
                .collect();
            out.sort_by_key(|(x, _)| *x);
            out
        };
        let forward = run(false);
        assert_eq!(forward, run(true));
        let total: f32 = forward.iter().map(|(_, c)| c).sum();
        assert!((total - 2.0).abs() < 1e-5);
    }

    #[test]
    fn flux_needs_the_species_on_both_types() {
        let mut sim = sim_with([6.0; 3], BoundarySpec::periodic());
        let a = sim
            .register_type(ParticleType::new("a", 0.1, 1.0).with_species(SpeciesSpec::new("S", 1.0)))
            .unwrap();
        let b = sim.register_type(ParticleType::new("b", 0.1, 1.0)).unwrap();
        assert!(matches!(sim.bind_flux(a, b, "S", 1.0), Err(SimError::UnknownSpecies { .. })));
        assert!(matches!(sim.bind_flux(a, 9, "S", 1.0), Err(SimError::UnknownType(9))));
    }

    #[test]
    fn reassignment_moves_particles_between_type_sets() {
        let mut sim = sim_with([6.0; 3], BoundarySpec::periodic());
        let stem = sim
            .register_type(ParticleType::new("stem", 0.2, 1.0).with_species(SpeciesSpec::new("S", 0.4)))
            .unwrap();
        let grip = sim
            .register_type(
                ParticleType::new("grip", 0.2, 1.0)
                    .with_species(SpeciesSpec::new("T", 2.0))
                    .with_species(SpeciesSpec::new("S", 9.0)),
            )
            .unwrap();
        sim.bind_force(Force::Constant(Vec3::new(1.0, 0.0, 0.0)), grip).unwrap();
        let ids: Vec<_> = (0..3)
            .map(|i| sim.create_particle(stem, Vec3::new(1.0 + i as f32, 1.0, 1.0), Vec3::zero()).unwrap())
            .collect();
        sim.reassign_type(ids[1], grip).unwrap();
        assert_eq!(sim.particles_of_type(stem), vec![ids[0], ids[2]]);
        assert_eq!(sim.particles_of_type(grip), vec![ids[1]]);
        let moved = sim.query_particle(ids[1]).unwrap();
        assert_eq!(moved.concentrations.as_slice(), &[2.0, 0.4]);

        sim.step(1).unwrap();
        assert!(sim.query_particle(ids[1]).unwrap().vel.x > 0.0);
        assert_eq!(sim.query_particle(ids[0]).unwrap().vel.x, 0.0);
        assert!(matches!(sim.reassign_type(ids[0], 42), Err(SimError::UnknownType(42))));
    }

    #[test]
    fn moving_wall_shears_nearby_fluid() {
        let spec = BoundarySpec::periodic()
            .with_axis(1, BoundaryKind::NoSlip)
            .with_side(boundary::TOP, BoundaryKind::Velocity([1.5, 0.0, 0.0]));
        let mut sim = sim_with([4.0; 3], spec);
        let fluid = sim.register_type(ParticleType::new("fluid", 0.1, 1.0)).unwrap();
        sim.bind_boundary_potential(Potential::dpd(30.0, 4.5, 0.0, 1.0), boundary::TOP, fluid)
            .unwrap();
        let near = sim.create_particle(fluid, Vec3::new(2.0, 3.6, 2.0), Vec3::zero()).unwrap();
        let far = sim.create_particle(fluid, Vec3::new(2.0, 1.0, 2.0), Vec3::zero()).unwrap();
        sim.step(1).unwrap();
        // the wall pushes the near particle away and drags it along +x
        let v = sim.query_particle(near).unwrap().vel;
        assert!(v.y < 0.0);
        assert!(v.x > 0.0 && v.x < 1.5);
        assert_eq!(sim.query_particle(far).unwrap().vel, Vec3::zero());
    }

    #[test]
    fn particles_crossing_a_moving_wall_pick_up_its_velocity() {
        let spec = BoundarySpec::periodic()
            .with_axis(1, BoundaryKind::NoSlip)
            .with_side(boundary::TOP, BoundaryKind::Velocity([1.5, 0.0, 0.0]));
        let mut sim = sim_with([4.0; 3], spec);
        let t = sim.register_type(ParticleType::new("p", 0.1, 1.0)).unwrap();
        let id = sim.create_particle(t, Vec3::new(2.0, 3.995, 2.0), Vec3::new(0.0, 1.0, 0.0)).unwrap();
        sim.step(1).unwrap();
        let p = sim.query_particle(id).unwrap();
        assert!(p.pos.y < 4.0);
        assert_eq!(p.vel, Vec3::new(3.0, -1.0, 0.0));
    }

    #[test]
    fn particles_outside_walls_are_rejected_and_periodic_ones_wrap() {
        let spec = BoundarySpec::periodic().with_axis(2, BoundaryKind::FreeSlip);
        let mut sim = sim_with([4.0; 3], spec);
        let t = sim.register_type(ParticleType::new("p", 0.1, 1.0)).unwrap();
        assert!(sim.create_particle(t, Vec3::new(1.0, 1.0, 4.5), Vec3::zero()).is_err());
        let id = sim.create_particle(t, Vec3::new(-0.5, 5.0, 1.0), Vec3::zero()).unwrap();
        let p = sim.query_particle(id).unwrap();
        assert_eq!(p.pos, Vec3::new(3.5, 1.0, 1.0));
    }
}

mod control {
    use super::*;

    fn exploding() -> (Simulation, u64, u64, BondId) {
        let mut sim = sim_with([4.0; 3], BoundarySpec::periodic());
        let t = sim.register_type(ParticleType::new("p", 0.1, 1.0)).unwrap();
        let a = sim.create_particle(t, Vec3::new(1.0, 1.0, 1.0), Vec3::zero()).unwrap();
        let b = sim.create_particle(t, Vec3::new(1.5, 1.0, 1.0), Vec3::zero()).unwrap();
        let bond = sim.create_bond(Potential::custom(|_| f32::NAN), a, b, Some(1.0)).unwrap();
        (sim, a, b, bond)
    }

    #[test]
    fn divergence_halts_and_reports_ids() {
        let (mut sim, a, b, bond) = exploding();
        let events = sim.subscribe();
        let start = sim.query_particle(a).unwrap().pos;
        match sim.step(10) {
            Err(SimError::Diverged { step, particles, bonds }) => {
                assert_eq!(step, 0);
                assert_eq!(particles, vec![a, b]);
                assert_eq!(bonds, vec![bond]);
            }
            other => panic!("expected divergence, got {:?}", other),
        }
        // nothing was integrated with the corrupted forces
        assert_eq!(sim.query_particle(a).unwrap().pos, start);
        assert!(sim.is_halted());
        assert!(matches!(sim.step(1), Err(SimError::Halted)));
        assert!(matches!(events.try_recv(), Ok(SimEvent::Diverged { .. })));
        assert!(sim.finalize().halted);
    }

    #[test]
    fn cancellation_stops_between_steps() {
        let mut sim = sim_with([4.0; 3], BoundarySpec::periodic());
        let t = sim.register_type(ParticleType::new("p", 0.1, 1.0)).unwrap();
        sim.create_particle(t, Vec3::new(1.0, 1.0, 1.0), Vec3::new(1.0, 0.0, 0.0)).unwrap();
        let cancel = sim.cancel_handle();
        cancel.store(true, Ordering::Release);
        assert_eq!(sim.step(10).unwrap(), 0);
        assert!(!cancel.load(Ordering::Acquire));
        assert_eq!(sim.step(3).unwrap(), 3);
        assert_eq!(sim.step_count(), 3);
        assert!((sim.time() - 0.03).abs() < 1e-6);
    }

    #[test]
    fn bindings_reject_unknown_types() {
        let mut sim = sim_with([4.0; 3], BoundarySpec::periodic());
        let t = sim.register_type(ParticleType::new("p", 0.1, 1.0)).unwrap();
        assert!(matches!(
            sim.bind_potential(Potential::harmonic(1.0, 0.0), Binding::Pair(t, 3)),
            Err(SimError::UnknownType(3))
        ));
        assert!(sim.bind_force(Force::Friction { coef: 1.0 }, 2).is_err());
        assert!(sim
            .bind_boundary_potential(Potential::harmonic(1.0, 0.0), 6, t)
            .is_err());
        assert!(sim
            .bind_potential(Potential::harmonic(1.0, 0.0).with_range(2.0, 1.0), Binding::Type(t))
            .is_err());
    }

    #[test]
    fn toml_config_drives_initialization() {
        let cfg = SimConfig::from_toml_str(
            r#"
            domain_extent = [8.0, 8.0, 2.0]
            dt = 0.002
            [boundary]
            sides = ["periodic", "periodic", "free_slip", "free_slip", "periodic", "periodic"]
            "#,
        )
        .unwrap();
        let sim = Simulation::initialize(cfg).unwrap();
        assert_eq!(sim.config().dt, 0.002);
        let bad = SimConfig::default().with_boundary(BoundarySpec::periodic().with_side(0, BoundaryKind::NoSlip));
        assert!(matches!(Simulation::initialize(bad), Err(SimError::InvalidBoundary(_))));
    }

    #[test]
    fn oversized_spatial_grid_fails_at_initialization() {
        let mut cfg = SimConfig::default().with_extent([100.0; 3]);
        cfg.cell_size = Some(0.001);
        assert!(matches!(Simulation::initialize(cfg), Err(SimError::InvalidParam(_))));
    }
}
