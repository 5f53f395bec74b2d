// Centralized configuration for simulation parameters

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::cell_list::grid_dims;
use crate::error::{Result, SimError};
use crate::simulation::boundary::BoundarySpec;

// ====================
// Simulation Parameters
// ====================
/// Default integration timestep.
pub const DEFAULT_DT: f32 = 0.01;
/// Default edge length of the cubic domain on every axis.
pub const DEFAULT_DOMAIN_EXTENT: f32 = 10.0;
/// Default global interaction cutoff when none is configured.
pub const DEFAULT_CUTOFF: f32 = 1.0;
/// Default seed for the counter-based RNG behind stochastic forces.
pub const DEFAULT_SEED: u64 = 0x5EED;
/// Upper bound on spatial index cells (extent / cell_size, all axes).
pub const MAX_CELLS: usize = 1 << 22;

// ====================
// Potential Parameters
// ====================
/// Central-difference step used by custom potentials without analytic derivatives.
pub const DEFAULT_FD_STEP: f32 = 1e-3;
/// Lennard-Jones truncation in units of sigma.
pub const LJ_CUTOFF_SIGMAS: f32 = 2.5;

// ====================
// Diagnostics
// ====================
/// Maximum number of offending ids listed in a divergence error.
pub const DIVERGENCE_REPORT_LIMIT: usize = 16;
/// Steps between periodic diagnostics lines in the headless runner.
pub const REPORT_INTERVAL: usize = 100;

// ====================
// Threading/Parallelism
// ====================
pub const MIN_THREADS: usize = 3; // Minimum number of threads to use
pub const THREADS_LEAVE_FREE: usize = 2; // Number of logical cores to leave free

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    /// Domain spans `[0, extent)` on each axis.
    pub domain_extent: [f32; 3],
    /// Spatial index cell edge; defaults to the cutoff.
    pub cell_size: Option<f32>,
    /// Global pair cutoff; pair potentials are truncated here.
    pub cutoff: Option<f32>,
    pub boundary: BoundarySpec,
    pub dt: f32,
    pub seed: u64,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            domain_extent: [DEFAULT_DOMAIN_EXTENT; 3],
            cell_size: None,
            cutoff: None,
            boundary: BoundarySpec::default(),
            dt: DEFAULT_DT,
            seed: DEFAULT_SEED,
        }
    }
}

impl SimConfig {
    pub fn with_extent(mut self, extent: [f32; 3]) -> Self {
        self.domain_extent = extent;
        self
    }

    pub fn with_boundary(mut self, boundary: BoundarySpec) -> Self {
        self.boundary = boundary;
        self
    }

    pub fn with_cutoff(mut self, cutoff: f32) -> Self {
        self.cutoff = Some(cutoff);
        self
    }

    pub fn with_dt(mut self, dt: f32) -> Self {
        self.dt = dt;
        self
    }

    pub fn effective_cutoff(&self) -> f32 {
        self.cutoff.unwrap_or(DEFAULT_CUTOFF)
    }

    pub fn effective_cell_size(&self) -> f32 {
        self.cell_size.unwrap_or_else(|| self.effective_cutoff())
    }

    pub fn validate(&self) -> Result<()> {
        if !self.domain_extent.iter().all(|l| l.is_finite() && *l > 0.0) {
            return Err(SimError::InvalidParam(format!(
                "domain_extent must be finite and > 0, got {:?}",
                self.domain_extent
            )));
        }
        if !(self.dt.is_finite() && self.dt > 0.0) {
            return Err(SimError::InvalidParam(format!("dt must be finite and > 0, got {}", self.dt)));
        }
        let cutoff = self.effective_cutoff();
        if !(cutoff.is_finite() && cutoff > 0.0) {
            return Err(SimError::InvalidParam(format!("cutoff must be finite and > 0, got {}", cutoff)));
        }
        let cell = self.effective_cell_size();
        if !(cell.is_finite() && cell > 0.0) {
            return Err(SimError::InvalidParam(format!("cell_size must be finite and > 0, got {}", cell)));
        }
        let dims = grid_dims(self.domain_extent, cell);
        let cells = dims
            .iter()
            .try_fold(1usize, |acc, d| acc.checked_mul(*d))
            .filter(|n| *n <= MAX_CELLS);
        if cells.is_none() {
            return Err(SimError::InvalidParam(format!(
                "cell_size {} gives a {:?} grid, more than {} cells",
                cell, dims, MAX_CELLS
            )));
        }
        self.boundary.validate()
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: SimConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }
}
