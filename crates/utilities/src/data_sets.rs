use rand::{rngs::StdRng, Rng, SeedableRng};

// Kept free of workspace types; sharing them from here runs into this issue:
// https://github.com/rust-lang/cargo/issues/6765

/// Values at and around the edges of the `i32` range and zero.
pub const BOUNDARY_VALUES: [i32; 5] = [i32::MIN, -1, 0, 1, i32::MAX];

/// A deterministic RNG so randomized tests are reproducible.
pub fn seeded_rng(seed: u64) -> StdRng {
    StdRng::seed_from_u64(seed)
}

/// `n` random integer (longitude, latitude) pairs inside the basemesh latitude band `[-2^30, 2^30]`.
pub fn random_int_lon_lats(rng: &mut StdRng, n: usize) -> Vec<(i32, i32)> {
    (0..n)
        .map(|_| (rng.gen::<i32>(), rng.gen_range(-(1 << 30)..=(1 << 30))))
        .collect()
}
