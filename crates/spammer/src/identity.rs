//! Device identity generation.

use iotload_types::Identity;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use tracing::info;

/// Generate `count` independent random identities.
///
/// A count of zero yields an empty list.
pub fn generate_identities(count: usize) -> Vec<Identity> {
    info!(count, "Generating device identities");
    (0..count).map(|_| Identity::generate()).collect()
}

/// Generate `count` identities reproducibly from `seed`.
pub fn generate_identities_from_seed(count: usize, seed: u64) -> Vec<Identity> {
    info!(count, seed, "Generating seeded device identities");
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    (0..count)
        .map(|_| Identity::generate_with_rng(&mut rng))
        .collect()
}
