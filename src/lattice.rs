// lattice.rs
// Unit cells and their replication over an integer grid. Sites are produced
// row-major over (i, j, k) with the basis index innermost, so site
// `((i * ny + j) * nz + k) * N + b` is basis particle `b` of cell (i, j, k).
// Every bond rule yields one bond per cell whose target cell exists, directly
// or by wrapping on a periodic axis.

use std::fmt;
use std::sync::Arc;

use ultraviolet::Vec3;

use crate::error::{Result, SimError};
use crate::potential::Potential;
use crate::species::TypeId;
use crate::utils::component;

const SINGULAR_EPS: f32 = 1e-9;

/// Potential and fracture threshold handed out for one bond rule.
#[derive(Clone, Debug)]
pub struct BondTemplate {
    pub potential: Arc<Potential>,
    pub dissociation_energy: Option<f32>,
}

impl BondTemplate {
    pub fn new(potential: Potential) -> Self {
        Self {
            potential: Arc::new(potential),
            dissociation_energy: None,
        }
    }

    pub fn with_dissociation(mut self, energy: f32) -> Self {
        self.dissociation_energy = Some(energy);
        self
    }
}

/// Called with the types of the two basis particles of a rule.
pub type BondFactory = Arc<dyn Fn(TypeId, TypeId) -> BondTemplate + Send + Sync>;

#[derive(Clone)]
pub struct BondRule {
    pub factory: BondFactory,
    /// Basis indices `(i, j)`; `i` lives in the source cell, `j` in the target.
    pub basis: (usize, usize),
    /// Target cell relative to the source cell.
    pub offset: [i32; 3],
}

impl BondRule {
    pub fn new<F>(factory: F, basis: (usize, usize), offset: [i32; 3]) -> Self
    where
        F: Fn(TypeId, TypeId) -> BondTemplate + Send + Sync + 'static,
    {
        Self {
            factory: Arc::new(factory),
            basis,
            offset,
        }
    }
}

impl fmt::Debug for BondRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BondRule")
            .field("basis", &self.basis)
            .field("offset", &self.offset)
            .finish()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Dimensionality {
    /// `a3` is a flat-thickness placeholder; the lattice lies in the xy plane.
    Two,
    Three,
}

impl TryFrom<usize> for Dimensionality {
    type Error = SimError;

    fn try_from(value: usize) -> Result<Self> {
        match value {
            2 => Ok(Dimensionality::Two),
            3 => Ok(Dimensionality::Three),
            other => Err(SimError::InvalidParam(format!("dimensionality must be 2 or 3, got {}", other))),
        }
    }
}

#[derive(Clone, Debug)]
pub struct UnitCell {
    vectors: [Vec3; 3],
    /// Fractional coordinates of each basis particle.
    basis: Vec<Vec3>,
    types: Vec<TypeId>,
    rules: Vec<BondRule>,
    dims: Dimensionality,
}

fn determinant(v: &[Vec3; 3]) -> f32 {
    v[0].dot(v[1].cross(v[2]))
}

impl UnitCell {
    /// Validate and assemble a unit cell. Nothing is created in the
    /// simulation; this only checks the definition.
    pub fn new(
        vectors: [Vec3; 3],
        basis_positions: Vec<Vec3>,
        basis_types: Vec<TypeId>,
        rules: Vec<BondRule>,
        dimensionality: usize,
    ) -> Result<Self> {
        let dims = Dimensionality::try_from(dimensionality)?;
        if basis_positions.is_empty() {
            return Err(SimError::InvalidParam("unit cell needs at least one basis particle".into()));
        }
        if basis_positions.len() != basis_types.len() {
            return Err(SimError::InvalidParam(format!(
                "{} basis positions but {} basis types",
                basis_positions.len(),
                basis_types.len()
            )));
        }
        let finite = |v: &Vec3| v.x.is_finite() && v.y.is_finite() && v.z.is_finite();
        if !vectors.iter().chain(&basis_positions).all(finite) {
            return Err(SimError::InvalidParam("lattice vectors and basis positions must be finite".into()));
        }

        let spanning = match dims {
            Dimensionality::Three => vectors,
            Dimensionality::Two => [vectors[0], vectors[1], Vec3::unit_z()],
        };
        let det = determinant(&spanning);
        if det.abs() < SINGULAR_EPS {
            return Err(SimError::SingularLattice { det });
        }

        let n = basis_positions.len();
        for (r, rule) in rules.iter().enumerate() {
            for index in [rule.basis.0, rule.basis.1] {
                if index >= n {
                    return Err(SimError::InvalidBasisIndex {
                        rule: r,
                        index,
                        basis_len: n,
                    });
                }
            }
            if rule.basis.0 == rule.basis.1 && rule.offset == [0, 0, 0] {
                return Err(SimError::InvalidParam(format!(
                    "bond rule {} bonds basis particle {} to itself",
                    r, rule.basis.0
                )));
            }
            if dims == Dimensionality::Two && rule.offset[2] != 0 {
                return Err(SimError::InvalidParam(format!(
                    "bond rule {} has a z offset in a 2D unit cell",
                    r
                )));
            }
        }

        Ok(Self {
            vectors,
            basis: basis_positions,
            types: basis_types,
            rules,
            dims,
        })
    }

    pub fn basis_len(&self) -> usize {
        self.basis.len()
    }

    pub fn basis_types(&self) -> &[TypeId] {
        &self.types
    }

    pub fn rules(&self) -> &[BondRule] {
        &self.rules
    }

    pub fn dimensionality(&self) -> Dimensionality {
        self.dims
    }

    /// Position of fractional point `frac` in cell `(i, j, k)`.
    pub fn site_position(&self, cell: [usize; 3], frac: Vec3) -> Vec3 {
        let axes = match self.dims {
            Dimensionality::Three => 3,
            Dimensionality::Two => 2,
        };
        let mut pos = Vec3::zero();
        for (axis, a) in self.vectors.iter().enumerate().take(axes) {
            pos += *a * (cell[axis] as f32 + component(frac, axis));
        }
        pos
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LatticeSite {
    pub type_id: TypeId,
    pub pos: Vec3,
}

/// Bond between two sites of a plan, by site index.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PlannedBond {
    pub a: usize,
    pub b: usize,
    pub rule: usize,
}

#[derive(Clone, Debug, Default)]
pub struct LatticePlan {
    pub sites: Vec<LatticeSite>,
    pub bonds: Vec<PlannedBond>,
}

pub struct LatticeBuilder<'a> {
    cell: &'a UnitCell,
    counts: [usize; 3],
    periodic: [bool; 3],
    origin: Vec3,
}

impl<'a> LatticeBuilder<'a> {
    pub fn new(cell: &'a UnitCell, counts: [usize; 3]) -> Self {
        Self {
            cell,
            counts,
            periodic: [false; 3],
            origin: Vec3::zero(),
        }
    }

    pub fn with_periodic(mut self, periodic: [bool; 3]) -> Self {
        self.periodic = periodic;
        self
    }

    pub fn with_origin(mut self, origin: Vec3) -> Self {
        self.origin = origin;
        self
    }

    fn site_index(&self, cell: [usize; 3], basis: usize) -> usize {
        let [_, ny, nz] = self.counts;
        ((cell[0] * ny + cell[1]) * nz + cell[2]) * self.cell.basis_len() + basis
    }

    /// Target cell of `offset` from `cell`, or `None` when it falls off an
    /// open axis.
    fn target(&self, cell: [usize; 3], offset: [i32; 3]) -> Option<[usize; 3]> {
        let mut out = [0usize; 3];
        for axis in 0..3 {
            let n = self.counts[axis] as i64;
            let t = cell[axis] as i64 + offset[axis] as i64;
            out[axis] = if (0..n).contains(&t) {
                t as usize
            } else if self.periodic[axis] {
                t.rem_euclid(n) as usize
            } else {
                return None;
            };
        }
        Some(out)
    }

    /// Compute every site and bond without touching any simulation state.
    pub fn plan(&self) -> Result<LatticePlan> {
        if self.counts.iter().any(|&n| n == 0) {
            return Err(SimError::InvalidParam(format!(
                "repeat counts must be >= 1, got {:?}",
                self.counts
            )));
        }
        if self.cell.dimensionality() == Dimensionality::Two && self.counts[2] != 1 {
            return Err(SimError::InvalidParam(format!(
                "2D unit cell needs nz = 1, got {}",
                self.counts[2]
            )));
        }

        let [nx, ny, nz] = self.counts;
        let n_basis = self.cell.basis_len();
        let mut plan = LatticePlan {
            sites: Vec::with_capacity(nx * ny * nz * n_basis),
            bonds: Vec::with_capacity(nx * ny * nz * self.cell.rules().len()),
        };

        for i in 0..nx {
            for j in 0..ny {
                for k in 0..nz {
                    for b in 0..n_basis {
                        plan.sites.push(LatticeSite {
                            type_id: self.cell.types[b],
                            pos: self.origin + self.cell.site_position([i, j, k], self.cell.basis[b]),
                        });
                    }
                }
            }
        }

        for i in 0..nx {
            for j in 0..ny {
                for k in 0..nz {
                    for (r, rule) in self.cell.rules().iter().enumerate() {
                        let Some(target) = self.target([i, j, k], rule.offset) else {
                            continue;
                        };
                        let a = self.site_index([i, j, k], rule.basis.0);
                        let b = self.site_index(target, rule.basis.1);
                        // a wrap onto the same site (single repeat on a periodic axis)
                        if a == b {
                            continue;
                        }
                        plan.bonds.push(PlannedBond { a, b, rule: r });
                    }
                }
            }
        }
        log::debug!(
            "lattice plan {:?}: {} sites, {} bonds",
            self.counts,
            plan.sites.len(),
            plan.bonds.len()
        );
        Ok(plan)
    }
}
