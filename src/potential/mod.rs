// potential/mod.rs
// Pairwise and bonded potentials. A potential is a function of the separation
// `r`, valid on `[min, max]` and zero outside it. The force on `a` is
// `U'(r) * r_hat` with `r_hat` pointing from `a` to `b`; DPD adds
// velocity-dependent and stochastic terms on top of its conservative part.
// Custom potentials without analytic derivatives use central differences.

use std::fmt;
use std::sync::Arc;

use ultraviolet::Vec3;

use crate::config;
use crate::error::{Result, SimError};

pub mod force;
pub use force::Force;


/// Separations below this are treated as coincident and produce no force.
pub const R_EPS: f32 = 1e-6;

/// Scalar function of the separation distance.
pub type ScalarFn = Arc<dyn Fn(f32) -> f32 + Send + Sync>;

/// User-supplied potential with optional analytic derivatives.
#[derive(Clone)]
pub struct CustomPotential {
    pub energy: ScalarFn,
    pub first: Option<ScalarFn>,
    pub second: Option<ScalarFn>,
    pub fd_step: f32,
}

impl fmt::Debug for CustomPotential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CustomPotential")
            .field("analytic_first", &self.first.is_some())
            .field("analytic_second", &self.second.is_some())
            .field("fd_step", &self.fd_step)
            .finish()
    }
}

impl CustomPotential {
    fn first_derivative(&self, r: f32) -> f32 {
        match &self.first {
            Some(d) => d(r),
            None => {
                let h = self.fd_step;
                ((self.energy)(r + h) - (self.energy)(r - h)) / (2.0 * h)
            }
        }
    }

    fn second_derivative(&self, r: f32) -> f32 {
        match (&self.second, &self.first) {
            (Some(d2), _) => d2(r),
            (None, Some(d1)) => {
                let h = self.fd_step;
                (d1(r + h) - d1(r - h)) / (2.0 * h)
            }
            (None, None) => {
                let h = self.fd_step;
                ((self.energy)(r + h) - 2.0 * (self.energy)(r) + (self.energy)(r - h)) / (h * h)
            }
        }
    }
}

#[derive(Clone, Debug)]
pub enum PotentialKind {
    /// `k (r - r0)^2`
    Harmonic { k: f32, r0: f32 },
    /// `d (e^{-2a(r-r0)} - 2 e^{-a(r-r0)})`
    Morse { d: f32, a: f32, r0: f32 },
    /// `q / r`, `q` being the charge product.
    Coulomb { q: f32 },
    /// `4 eps ((sigma/r)^12 - (sigma/r)^6)`
    LennardJones { epsilon: f32, sigma: f32 },
    /// `k |r - r0|^alpha`
    PowerLaw { k: f32, r0: f32, alpha: f32 },
    /// Dissipative particle dynamics; the cutoff is the range maximum.
    Dpd { alpha: f32, gamma: f32, sigma: f32 },
    Custom(CustomPotential),
}

/// Everything a pair evaluation needs besides the potential itself.
#[derive(Clone, Copy, Debug)]
pub struct PairSample {
    /// `pos_b - pos_a`, minimum image applied.
    pub r_vec: Vec3,
    pub r: f32,
    /// `vel_a - vel_b`.
    pub rel_vel: Vec3,
    pub radius_sum: f32,
    /// Standard normal draw shared by both members of the pair.
    pub noise: f32,
    pub dt: f32,
}

#[derive(Clone, Debug)]
pub struct Potential {
    pub kind: PotentialKind,
    pub min: f32,
    pub max: f32,
    /// Evaluate at the surface distance `r - (radius_a + radius_b)`.
    pub shifted: bool,
}

impl Potential {
    fn with_kind(kind: PotentialKind) -> Self {
        Self {
            kind,
            min: 0.0,
            max: f32::INFINITY,
            shifted: false,
        }
    }

    pub fn harmonic(k: f32, r0: f32) -> Self {
        Self::with_kind(PotentialKind::Harmonic { k, r0 })
    }

    pub fn morse(d: f32, a: f32, r0: f32) -> Self {
        Self::with_kind(PotentialKind::Morse { d, a, r0 })
    }

    pub fn coulomb(q: f32) -> Self {
        Self::with_kind(PotentialKind::Coulomb { q })
    }

    /// Lennard-Jones 12-6, truncated at `LJ_CUTOFF_SIGMAS * sigma`.
    pub fn lennard_jones(epsilon: f32, sigma: f32) -> Self {
        Self::with_kind(PotentialKind::LennardJones { epsilon, sigma })
            .with_range(0.0, config::LJ_CUTOFF_SIGMAS * sigma)
    }

    pub fn power_law(k: f32, r0: f32, alpha: f32) -> Self {
        Self::with_kind(PotentialKind::PowerLaw { k, r0, alpha })
    }

    pub fn dpd(alpha: f32, gamma: f32, sigma: f32, cutoff: f32) -> Self {
        Self::with_kind(PotentialKind::Dpd { alpha, gamma, sigma }).with_range(0.0, cutoff)
    }

    pub fn custom<F>(energy: F) -> Self
    where
        F: Fn(f32) -> f32 + Send + Sync + 'static,
    {
        Self::with_kind(PotentialKind::Custom(CustomPotential {
            energy: Arc::new(energy),
            first: None,
            second: None,
            fd_step: config::DEFAULT_FD_STEP,
        }))
    }

    /// Attach analytic derivatives to a custom potential. No-op for built-ins.
    pub fn with_derivatives(mut self, first: Option<ScalarFn>, second: Option<ScalarFn>) -> Self {
        if let PotentialKind::Custom(c) = &mut self.kind {
            c.first = first;
            c.second = second;
        }
        self
    }

    /// Finite-difference step of a custom potential. No-op for built-ins.
    pub fn with_fd_step(mut self, h: f32) -> Self {
        if let PotentialKind::Custom(c) = &mut self.kind {
            c.fd_step = h;
        }
        self
    }

    pub fn with_range(mut self, min: f32, max: f32) -> Self {
        self.min = min;
        self.max = max;
        self
    }

    pub fn shifted(mut self) -> Self {
        self.shifted = true;
        self
    }

    pub fn validate(&self) -> Result<()> {
        let bad = |msg: &str| Err(SimError::InvalidParam(format!("{}: {}", self.label(), msg)));
        if !(self.min.is_finite() && self.min >= 0.0) || self.max.is_nan() || self.max <= self.min {
            return bad("range must satisfy 0 <= min < max");
        }
        let params_finite = match &self.kind {
            PotentialKind::Harmonic { k, r0 } => k.is_finite() && r0.is_finite(),
            PotentialKind::Morse { d, a, r0 } => d.is_finite() && a.is_finite() && r0.is_finite(),
            PotentialKind::Coulomb { q } => q.is_finite(),
            PotentialKind::LennardJones { epsilon, sigma } => {
                epsilon.is_finite() && sigma.is_finite() && *sigma > 0.0
            }
            PotentialKind::PowerLaw { k, r0, alpha } => {
                k.is_finite() && r0.is_finite() && alpha.is_finite() && *alpha > 0.0
            }
            PotentialKind::Dpd { alpha, gamma, sigma } => {
                if !self.max.is_finite() {
                    return bad("DPD needs a finite cutoff");
                }
                alpha.is_finite() && gamma.is_finite() && *gamma >= 0.0 && sigma.is_finite() && *sigma >= 0.0
            }
            PotentialKind::Custom(c) => c.fd_step.is_finite() && c.fd_step > 0.0,
        };
        if !params_finite {
            return bad("parameters must be finite and in range");
        }
        Ok(())
    }

    /// Human readable identity, including the finite-difference step of
    /// custom potentials.
    pub fn label(&self) -> String {
        match &self.kind {
            PotentialKind::Harmonic { k, r0 } => format!("harmonic(k={k}, r0={r0})"),
            PotentialKind::Morse { d, a, r0 } => format!("morse(d={d}, a={a}, r0={r0})"),
            PotentialKind::Coulomb { q } => format!("coulomb(q={q})"),
            PotentialKind::LennardJones { epsilon, sigma } => format!("lj(eps={epsilon}, sigma={sigma})"),
            PotentialKind::PowerLaw { k, r0, alpha } => format!("power(k={k}, r0={r0}, alpha={alpha})"),
            PotentialKind::Dpd { alpha, gamma, sigma } => {
                format!("dpd(alpha={alpha}, gamma={gamma}, sigma={sigma}, rc={})", self.max)
            }
            PotentialKind::Custom(c) => match (&c.first, &c.second) {
                (Some(_), Some(_)) => String::from("custom(analytic)"),
                _ => format!("custom(fd_step={})", c.fd_step),
            },
        }
    }

    /// Ordering key used to keep bound potentials in a canonical order.
    /// Potentials with equal keys differ at most in their custom callables.
    pub fn canonical_key(&self) -> (String, u32, u32, bool) {
        // min >= 0 after validation, so the bit patterns order like the values
        (self.label(), self.min.to_bits(), self.max.to_bits(), self.shifted)
    }

    #[inline]
    pub fn in_range(&self, r: f32) -> bool {
        r >= self.min && r <= self.max
    }

    pub fn needs_noise(&self) -> bool {
        matches!(self.kind, PotentialKind::Dpd { sigma, .. } if sigma != 0.0)
    }

    #[inline]
    fn effective_r(&self, r: f32, radius_sum: f32) -> f32 {
        if self.shifted {
            (r - radius_sum).max(R_EPS)
        } else {
            r
        }
    }

    /// Raw function value at `r`, ignoring range and shift.
    pub fn value(&self, r: f32) -> f32 {
        match &self.kind {
            PotentialKind::Harmonic { k, r0 } => k * (r - r0) * (r - r0),
            PotentialKind::Morse { d, a, r0 } => {
                let x = (-a * (r - r0)).exp();
                d * (x * x - 2.0 * x)
            }
            PotentialKind::Coulomb { q } => q / r,
            PotentialKind::LennardJones { epsilon, sigma } => {
                let s6 = (sigma / r).powi(6);
                4.0 * epsilon * (s6 * s6 - s6)
            }
            PotentialKind::PowerLaw { k, r0, alpha } => k * (r - r0).abs().powf(*alpha),
            PotentialKind::Dpd { alpha, .. } => {
                let w = 1.0 - r / self.max;
                0.5 * alpha * self.max * w * w
            }
            PotentialKind::Custom(c) => (c.energy)(r),
        }
    }

    /// `dU/dr` at `r`, ignoring range and shift.
    pub fn derivative(&self, r: f32) -> f32 {
        match &self.kind {
            PotentialKind::Harmonic { k, r0 } => 2.0 * k * (r - r0),
            PotentialKind::Morse { d, a, r0 } => {
                let x = (-a * (r - r0)).exp();
                2.0 * a * d * (x - x * x)
            }
            PotentialKind::Coulomb { q } => -q / (r * r),
            PotentialKind::LennardJones { epsilon, sigma } => {
                let s6 = (sigma / r).powi(6);
                24.0 * epsilon * (s6 - 2.0 * s6 * s6) / r
            }
            PotentialKind::PowerLaw { k, r0, alpha } => {
                let d = r - r0;
                if d == 0.0 {
                    0.0
                } else {
                    k * alpha * d.abs().powf(alpha - 1.0) * d.signum()
                }
            }
            PotentialKind::Dpd { alpha, .. } => -alpha * (1.0 - r / self.max),
            PotentialKind::Custom(c) => c.first_derivative(r),
        }
    }

    /// `d2U/dr2` at `r`, ignoring range and shift.
    pub fn second_derivative(&self, r: f32) -> f32 {
        match &self.kind {
            PotentialKind::Harmonic { k, .. } => 2.0 * k,
            PotentialKind::Morse { d, a, r0 } => {
                let x = (-a * (r - r0)).exp();
                2.0 * a * a * d * (2.0 * x * x - x)
            }
            PotentialKind::Coulomb { q } => 2.0 * q / (r * r * r),
            PotentialKind::LennardJones { epsilon, sigma } => {
                let s6 = (sigma / r).powi(6);
                24.0 * epsilon * (26.0 * s6 * s6 - 7.0 * s6) / (r * r)
            }
            PotentialKind::PowerLaw { k, r0, alpha } => {
                let d = (r - r0).abs();
                if d == 0.0 {
                    0.0
                } else {
                    k * alpha * (alpha - 1.0) * d.powf(alpha - 2.0)
                }
            }
            PotentialKind::Dpd { alpha, .. } => alpha / self.max,
            PotentialKind::Custom(c) => c.second_derivative(r),
        }
    }

    /// Potential energy of a pair at center distance `r`; zero out of range.
    pub fn energy(&self, r: f32, radius_sum: f32) -> f32 {
        if !self.in_range(r) || r < R_EPS {
            return 0.0;
        }
        self.value(self.effective_r(r, radius_sum))
    }

    /// Drag parallel to a no-slip or moving wall. `tangential` is the particle's
    /// velocity relative to the wall with the normal component removed. Only
    /// DPD has a dissipative term; every other kind returns zero.
    pub fn wall_drag(&self, r: f32, tangential: Vec3) -> Vec3 {
        match &self.kind {
            PotentialKind::Dpd { gamma, .. } if self.in_range(r) && r >= R_EPS => {
                let w = 1.0 - r / self.max;
                -(gamma * w * w) * tangential
            }
            _ => Vec3::zero(),
        }
    }

    /// Force on particle `a` of the pair described by `s`; zero out of range.
    /// The force on `b` is the exact negation.
    pub fn force_on_a(&self, s: &PairSample) -> Vec3 {
        if !self.in_range(s.r) || s.r < R_EPS {
            return Vec3::zero();
        }
        let r_hat = s.r_vec / s.r;
        match &self.kind {
            PotentialKind::Dpd { alpha, gamma, sigma } => {
                let w = 1.0 - s.r / self.max;
                let conservative = alpha * w;
                let dissipative = gamma * w * w * r_hat.dot(s.rel_vel);
                let random = if *sigma != 0.0 && s.dt > 0.0 {
                    sigma * w * s.noise / s.dt.sqrt()
                } else {
                    0.0
                };
                -(conservative + dissipative + random) * r_hat
            }
            _ => {
                let r_eff = self.effective_r(s.r, s.radius_sum);
                self.derivative(r_eff) * r_hat
            }
        }
    }
}
