use rayon::prelude::*;
use smallvec::SmallVec;
use ultraviolet::Vec3;

use crate::body::Particle;
use crate::utils::{component, component_mut};

/// One entry of a particle's neighbor list.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Neighbor {
    /// Storage index of the neighbor in the particle pool.
    pub index: usize,
    /// `pos_neighbor - pos_self`, minimum image applied.
    pub r_vec: Vec3,
    pub r: f32,
}

/// Apply the minimum image convention on the periodic axes of `dr`.
pub fn minimum_image(mut dr: Vec3, extent: [f32; 3], periodic: [bool; 3]) -> Vec3 {
    for axis in 0..3 {
        if periodic[axis] {
            let l = extent[axis];
            let d = component_mut(&mut dr, axis);
            *d -= l * (*d / l).round();
        }
    }
    dr
}

/// Cells per axis for a domain and cell edge. Cells are never narrower than
/// `cell_size`.
pub fn grid_dims(extent: [f32; 3], cell_size: f32) -> [usize; 3] {
    std::array::from_fn(|axis| ((extent[axis] / cell_size).floor() as usize).max(1))
}

/// Uniform grid over the domain `[0, extent)` used for bounded-radius
/// neighbor queries. Periodic axes wrap both cell lookup and separations.
pub struct CellList {
    pub extent: [f32; 3],
    pub cell_size: f32,
    pub periodic: [bool; 3],
    dims: [usize; 3],
    cells: Vec<Vec<usize>>, // indices of particles per cell
}

impl CellList {
    pub fn new(extent: [f32; 3], cell_size: f32, periodic: [bool; 3]) -> Self {
        let mut list = Self {
            extent,
            cell_size,
            periodic,
            dims: [1; 3],
            cells: Vec::new(),
        };
        list.update_dims();
        list
    }

    fn update_dims(&mut self) {
        self.dims = grid_dims(self.extent, self.cell_size);
    }

    pub fn dims(&self) -> [usize; 3] {
        self.dims
    }

    fn cell_width(&self, axis: usize) -> f32 {
        self.extent[axis] / self.dims[axis] as f32
    }

    pub fn rebuild(&mut self, particles: &[Particle]) {
        self.update_dims();
        self.cells.clear();
        self.cells
            .resize(self.dims[0] * self.dims[1] * self.dims[2], Vec::new());
        for (i, p) in particles.iter().enumerate() {
            if !p.active {
                continue;
            }
            let c = self.coord(p.pos);
            let idx = self.flat(c);
            self.cells[idx].push(i);
        }
    }

    fn flat(&self, c: [usize; 3]) -> usize {
        c[0] + self.dims[0] * (c[1] + self.dims[1] * c[2])
    }

    fn coord(&self, pos: Vec3) -> [usize; 3] {
        let mut out = [0usize; 3];
        for axis in 0..3 {
            let n = self.dims[axis] as isize;
            let x = (component(pos, axis) / self.cell_width(axis)).floor() as isize;
            out[axis] = if self.periodic[axis] {
                x.rem_euclid(n) as usize
            } else {
                x.clamp(0, n - 1) as usize
            };
        }
        out
    }

    /// Cell indices along one axis within `range` cells of `c`, each listed once.
    fn axis_span(&self, axis: usize, c: usize, range: isize) -> SmallVec<[usize; 8]> {
        let n = self.dims[axis] as isize;
        if self.periodic[axis] {
            if 2 * range + 1 >= n {
                (0..n as usize).collect()
            } else {
                (-range..=range)
                    .map(|d| (c as isize + d).rem_euclid(n) as usize)
                    .collect()
            }
        } else {
            (-range..=range)
                .map(|d| c as isize + d)
                .filter(|&x| x >= 0 && x < n)
                .map(|x| x as usize)
                .collect()
        }
    }

    /// `b - a` with the minimum image convention on periodic axes.
    pub fn separation(&self, a: Vec3, b: Vec3) -> Vec3 {
        minimum_image(b - a, self.extent, self.periodic)
    }

    /// All active particles within `cutoff` of particle `i`, excluding `i`.
    pub fn find_neighbors_within(&self, particles: &[Particle], i: usize, cutoff: f32) -> Vec<Neighbor> {
        let mut neighbors = Vec::new();
        if !particles[i].active || self.cells.is_empty() {
            return neighbors;
        }
        let pos = particles[i].pos;
        let c = self.coord(pos);
        let cutoff_sq = cutoff * cutoff;
        let spans: [SmallVec<[usize; 8]>; 3] = std::array::from_fn(|axis| {
            let range = (cutoff / self.cell_width(axis)).ceil() as isize;
            self.axis_span(axis, c[axis], range)
        });
        for &z in &spans[2] {
            for &y in &spans[1] {
                for &x in &spans[0] {
                    let cell_idx = self.flat([x, y, z]);
                    for &j in &self.cells[cell_idx] {
                        if j == i {
                            continue;
                        }
                        let r_vec = self.separation(pos, particles[j].pos);
                        let r2 = r_vec.mag_sq();
                        if r2 < cutoff_sq {
                            neighbors.push(Neighbor {
                                index: j,
                                r_vec,
                                r: r2.sqrt(),
                            });
                        }
                    }
                }
            }
        }
        neighbors
    }

    /// Full neighbor lists (both directions of every pair), built in parallel.
    pub fn neighbor_lists(&self, particles: &[Particle], cutoff: f32) -> Vec<Vec<Neighbor>> {
        (0..particles.len())
            .into_par_iter()
            .map(|i| self.find_neighbors_within(particles, i, cutoff))
            .collect()
    }
}
