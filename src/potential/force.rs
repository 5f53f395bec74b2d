// potential/force.rs
// Single-particle forces bound to a type. Several forces bound to one type are
// evaluated independently and summed.

use rand::Rng;
use rand_distr::StandardNormal;
use serde::{Deserialize, Serialize};
use ultraviolet::Vec3;

use crate::body::Particle;
use crate::error::{Result, SimError};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Force {
    /// Uniform force, e.g. gravity or an applied load.
    Constant(Vec3),
    /// Linear drag `-coef * v`.
    Friction { coef: f32 },
    /// Gaussian noise per component.
    Random { std: f32, mean: f32 },
}

impl Force {
    pub fn validate(&self) -> Result<()> {
        let ok = match self {
            Force::Constant(f) => f.x.is_finite() && f.y.is_finite() && f.z.is_finite(),
            Force::Friction { coef } => coef.is_finite() && *coef >= 0.0,
            Force::Random { std, mean } => std.is_finite() && *std >= 0.0 && mean.is_finite(),
        };
        if ok {
            Ok(())
        } else {
            Err(SimError::InvalidParam(format!("invalid force {:?}", self)))
        }
    }

    pub fn is_stochastic(&self) -> bool {
        matches!(self, Force::Random { .. })
    }

    /// Force on `p`. `rng` is only drawn from by stochastic forces.
    pub fn evaluate<R: Rng>(&self, p: &Particle, rng: &mut R) -> Vec3 {
        match self {
            Force::Constant(f) => *f,
            Force::Friction { coef } => -*coef * p.vel,
            Force::Random { std, mean } => {
                let mut draw = || mean + std * rng.sample::<f32, _>(StandardNormal);
                Vec3::new(draw(), draw(), draw())
            }
        }
    }
}
