use rand::rngs::StdRng;
use rand::SeedableRng;
use smallvec::SmallVec;
use ultraviolet::Vec3;

/// Read one Cartesian component of `v` (0 = x, 1 = y, 2 = z).
#[inline]
pub fn component(v: Vec3, axis: usize) -> f32 {
    match axis {
        0 => v.x,
        1 => v.y,
        _ => v.z,
    }
}

/// Mutable access to one Cartesian component of `v`.
#[inline]
pub fn component_mut(v: &mut Vec3, axis: usize) -> &mut f32 {
    match axis {
        0 => &mut v.x,
        1 => &mut v.y,
        _ => &mut v.z,
    }
}

/// Sum in ascending magnitude. The result depends only on the multiset of
/// `values`, not on the order they arrive in.
pub fn stable_sum(values: &mut [f32]) -> f32 {
    values.sort_unstable_by(|a, b| a.abs().total_cmp(&b.abs()).then(a.total_cmp(b)));
    values.iter().fold(0.0f32, |acc, v| acc + *v)
}

/// Per-component [`stable_sum`] of vector terms.
pub fn stable_sum_vec3(terms: &[Vec3]) -> Vec3 {
    let mut out = Vec3::zero();
    let mut buf: SmallVec<[f32; 8]> = SmallVec::with_capacity(terms.len());
    for axis in 0..3 {
        buf.clear();
        buf.extend(terms.iter().map(|t| component(*t, axis)));
        *component_mut(&mut out, axis) = stable_sum(&mut buf);
    }
    out
}

/// SplitMix64 finalizer.
#[inline]
fn splitmix(mut z: u64) -> u64 {
    z = z.wrapping_add(0x9E37_79B9_7F4A_7C15);
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

/// Counter-based RNG for one (step, a, b) tuple. `a` and `b` are ordered
/// before mixing so both members of a pair draw the same stream.
pub fn pair_rng(seed: u64, step: u64, a: u64, b: u64) -> StdRng {
    let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
    let key = splitmix(splitmix(splitmix(seed ^ step) ^ lo) ^ hi.rotate_left(17));
    StdRng::seed_from_u64(key)
}

/// Counter-based RNG for a single particle in a given step.
pub fn particle_rng(seed: u64, step: u64, id: u64) -> StdRng {
    StdRng::seed_from_u64(splitmix(splitmix(seed.rotate_left(7) ^ step) ^ id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::Rng;

    #[test]
    fn pair_rng_is_symmetric() {
        let a: f64 = pair_rng(9, 4, 10, 20).random();
        let b: f64 = pair_rng(9, 4, 20, 10).random();
        assert_eq!(a, b);
        let c: f64 = pair_rng(9, 5, 10, 20).random();
        assert_ne!(a, c);
    }

    #[test]
    fn stable_sum_ignores_input_order() {
        let mut a = [1.0f32, 1e8, -1e8];
        let mut b = [1e8f32, -1e8, 1.0];
        assert_eq!(stable_sum(&mut a).to_bits(), stable_sum(&mut b).to_bits());
        let terms = [Vec3::new(1e8, 0.5, 0.0), Vec3::new(1.0, 0.25, 0.0), Vec3::new(-1e8, 0.0, 3.0)];
        let mut reversed = terms;
        reversed.reverse();
        assert_eq!(stable_sum_vec3(&terms), stable_sum_vec3(&reversed));
        assert_eq!(stable_sum_vec3(&[]), Vec3::zero());
    }

    #[test]
    fn component_access_round_trips() {
        let mut v = Vec3::new(1.0, 2.0, 3.0);
        *component_mut(&mut v, 2) = 7.0;
        assert_eq!(component(v, 0), 1.0);
        assert_eq!(component(v, 2), 7.0);
        assert_eq!(component(v, 1), 2.0);
    }
}
