// species.rs
// Particle type templates and the registry that owns them.

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::error::{Result, SimError};

/// Dense index of a registered [`ParticleType`].
pub type TypeId = usize;

/// Equation of motion used for particles of a type.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Dynamics {
    /// Second-order motion, force changes velocity through mass.
    #[default]
    Newtonian,
    /// First-order motion, velocity follows force directly.
    Overdamped,
}

/// A chemical species carried by every particle of a type.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SpeciesSpec {
    pub name: String,
    pub initial: f32,
    /// Constant species ignore flux and keep their value.
    #[serde(default)]
    pub constant: bool,
}

impl SpeciesSpec {
    pub fn new(name: impl Into<String>, initial: f32) -> Self {
        Self {
            name: name.into(),
            initial,
            constant: false,
        }
    }

    pub fn constant(name: impl Into<String>, initial: f32) -> Self {
        Self {
            constant: true,
            ..Self::new(name, initial)
        }
    }
}

/// Template shared by all particles of one type. Immutable once registered.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ParticleType {
    pub name: String,
    pub radius: f32,
    pub mass: f32,
    /// Per-axis frozen flags (x, y, z).
    #[serde(default)]
    pub frozen: [bool; 3],
    #[serde(default)]
    pub dynamics: Dynamics,
    #[serde(default)]
    pub species: Vec<SpeciesSpec>,
    /// Render style, carried for the caller and never read by the core.
    #[serde(default = "default_color")]
    pub color: [u8; 4],
}

fn default_color() -> [u8; 4] {
    [192, 192, 192, 255]
}

impl Default for ParticleType {
    fn default() -> Self {
        Self {
            name: String::from("particle"),
            radius: 0.5,
            mass: 1.0,
            frozen: [false; 3],
            dynamics: Dynamics::Newtonian,
            species: Vec::new(),
            color: default_color(),
        }
    }
}

impl ParticleType {
    pub fn new(name: impl Into<String>, radius: f32, mass: f32) -> Self {
        Self {
            name: name.into(),
            radius,
            mass,
            ..Default::default()
        }
    }

    pub fn with_dynamics(mut self, dynamics: Dynamics) -> Self {
        self.dynamics = dynamics;
        self
    }

    pub fn with_frozen(mut self, frozen: [bool; 3]) -> Self {
        self.frozen = frozen;
        self
    }

    pub fn with_species(mut self, species: SpeciesSpec) -> Self {
        self.species.push(species);
        self
    }

    /// Position of the species named `name`, if this type carries it.
    pub fn species_index(&self, name: &str) -> Option<usize> {
        self.species.iter().position(|s| s.name == name)
    }

    /// Initial concentration vector for a new particle of this type.
    pub fn initial_concentrations(&self) -> SmallVec<[f32; 4]> {
        self.species.iter().map(|s| s.initial).collect()
    }

    pub fn is_frozen(&self, axis: usize) -> bool {
        self.frozen[axis]
    }

    fn validate(&self) -> Result<()> {
        if !(self.radius.is_finite() && self.radius > 0.0) {
            return Err(SimError::InvalidParam(format!(
                "type '{}': radius must be finite and > 0",
                self.name
            )));
        }
        if !(self.mass.is_finite() && self.mass > 0.0) {
            return Err(SimError::InvalidParam(format!(
                "type '{}': mass must be finite and > 0",
                self.name
            )));
        }
        for (i, s) in self.species.iter().enumerate() {
            if !s.initial.is_finite() {
                return Err(SimError::InvalidParam(format!(
                    "type '{}': species '{}' has a non-finite initial value",
                    self.name, s.name
                )));
            }
            if self.species[..i].iter().any(|o| o.name == s.name) {
                return Err(SimError::InvalidParam(format!(
                    "type '{}': species '{}' declared twice",
                    self.name, s.name
                )));
            }
        }
        Ok(())
    }
}

/// Owns every registered type. Types are never removed.
#[derive(Clone, Debug, Default)]
pub struct TypeRegistry {
    types: Vec<ParticleType>,
}

impl TypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, ty: ParticleType) -> Result<TypeId> {
        ty.validate()?;
        let id = self.types.len();
        log::debug!("registered type {} '{}'", id, ty.name);
        self.types.push(ty);
        Ok(id)
    }

    pub fn get(&self, id: TypeId) -> Result<&ParticleType> {
        self.types.get(id).ok_or(SimError::UnknownType(id))
    }

    pub fn ensure(&self, id: TypeId) -> Result<()> {
        self.get(id).map(|_| ())
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    /// Direct slice access, indexed by `TypeId`.
    pub fn as_slice(&self) -> &[ParticleType] {
        &self.types
    }

    pub fn find(&self, name: &str) -> Option<TypeId> {
        self.types.iter().position(|t| t.name == name)
    }
}
