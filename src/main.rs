//! Headless runner: builds a bonded two-basis sheet, pulls its x faces apart
//! and logs fractures and diagnostics.
//!
//! Usage: `lattice_sim [config.toml] [steps]`

use std::env;

use lattice_sim::config::{SimConfig, MIN_THREADS, REPORT_INTERVAL, THREADS_LEAVE_FREE};
use lattice_sim::lattice::{BondRule, BondTemplate};
use lattice_sim::potential::{Force, Potential};
use lattice_sim::species::ParticleType;
use lattice_sim::{BoundaryKind, BoundarySpec, Result, SimEvent, Simulation};
use ultraviolet::Vec3;

const SHEET: [usize; 3] = [10, 10, 1];
const DEFAULT_STEPS: usize = 2000;
const GRIP_FORCE: f32 = 20.0;

fn default_config() -> SimConfig {
    SimConfig::default()
        .with_extent([14.0, 10.0, 1.0])
        .with_boundary(BoundarySpec::periodic().with_axis(0, BoundaryKind::FreeSlip))
        .with_dt(0.005)
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    // Global rayon pool with threads = max(3, total cores) - 2
    let threads = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(MIN_THREADS)
        .max(MIN_THREADS)
        - THREADS_LEAVE_FREE;
    if let Err(e) = rayon::ThreadPoolBuilder::new().num_threads(threads).build_global() {
        log::warn!("could not size the thread pool: {}", e);
    }

    if let Err(e) = run() {
        log::error!("{}", e);
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let mut args = env::args().skip(1);
    let config = match args.next() {
        Some(path) => {
            log::info!("loading config from {}", path);
            SimConfig::load_from_file(&path)?
        }
        None => default_config(),
    };
    let steps = args
        .next()
        .and_then(|s| s.parse().ok())
        .unwrap_or(DEFAULT_STEPS);

    let mut sim = Simulation::initialize(config)?;
    let a = sim.register_type(ParticleType::new("A", 0.1, 1.0))?;
    let b = sim.register_type(ParticleType::new("B", 0.1, 1.0))?;
    let left = sim.register_type(ParticleType::new("grip_left", 0.1, 1.0))?;
    let right = sim.register_type(ParticleType::new("grip_right", 0.1, 1.0))?;

    let cell = sim.build_unit_cell(
        [Vec3::unit_x(), Vec3::unit_y(), Vec3::unit_z()],
        vec![Vec3::new(0.25, 0.5, 0.0), Vec3::new(0.55, 0.5, 0.0)],
        vec![a, b],
        vec![
            BondRule::new(
                |_, _| BondTemplate::new(Potential::harmonic(100.0, 0.3)).with_dissociation(0.5),
                (0, 1),
                [0, 0, 0],
            ),
            BondRule::new(
                |_, _| BondTemplate::new(Potential::harmonic(100.0, 0.7)).with_dissociation(0.5),
                (1, 0),
                [1, 0, 0],
            ),
        ],
        2,
    )?;
    let extent = sim.config().domain_extent;
    let origin = Vec3::new((extent[0] - SHEET[0] as f32) * 0.5, 0.0, 0.0);
    let ids = sim.instantiate_lattice_at(&cell, SHEET, origin)?;

    // First column of A particles and last column of B particles become grips.
    for j in 0..SHEET[1] {
        sim.reassign_type(ids[j * 2], left)?;
        sim.reassign_type(ids[((SHEET[0] - 1) * SHEET[1] + j) * 2 + 1], right)?;
    }
    for t in [a, b, left, right] {
        sim.bind_force(Force::Friction { coef: 0.5 }, t)?;
    }
    sim.bind_force(Force::Constant(Vec3::new(-GRIP_FORCE, 0.0, 0.0)), left)?;
    sim.bind_force(Force::Constant(Vec3::new(GRIP_FORCE, 0.0, 0.0)), right)?;

    let events = sim.subscribe();
    log::info!("{}", sim.diagnostics());
    let mut done = 0;
    while done < steps {
        let chunk = REPORT_INTERVAL.min(steps - done);
        done += sim.step(chunk)?;
        for event in events.try_iter() {
            if let SimEvent::BondFractured { bond, step, .. } = event {
                log::debug!("fracture event: bond {} at step {}", bond, step);
            }
        }
        log::info!("{}", sim.diagnostics());
        #[cfg(feature = "profiling")]
        lattice_sim::PROFILER.lock().log_and_clear();
    }

    for (t, name) in [(left, "left grip"), (right, "right grip")] {
        if let Some(c) = lattice_sim::diagnostics::centroid_of_type(sim.particles(), t) {
            log::info!("{} centroid at x = {:.3}", name, c.x);
        }
    }
    let summary = sim.finalize();
    log::info!(
        "done: {} steps, t = {:.3}, {} fractures, {} bonds left",
        summary.steps,
        summary.time,
        summary.fractures,
        summary.last.bonds
    );
    Ok(())
}
