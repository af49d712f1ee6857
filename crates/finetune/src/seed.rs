//! Process-wide randomness.
//!
//! One call to [`seed_everything`] at startup seeds the libtorch generator and
//! the crate's own [`StdRng`]. Everything that shuffles or samples goes
//! through [`with_rng`]. There is no teardown; the state lives for the
//! process.

use std::sync::{Mutex, PoisonError};

use log::debug;
use rand::rngs::StdRng;
use rand::SeedableRng;

static RNG: Mutex<Option<StdRng>> = Mutex::new(None);

pub fn seed_everything(seed: u64) {
    tch::manual_seed(seed as i64);
    let mut rng = RNG.lock().unwrap_or_else(PoisonError::into_inner);
    *rng = Some(StdRng::seed_from_u64(seed));
    debug!("Seeded all random number generators with {}", seed);
}

/// Runs `f` with the shared generator, seeding it from entropy if
/// [`seed_everything`] has not run yet.
pub fn with_rng<T>(f: impl FnOnce(&mut StdRng) -> T) -> T {
    let mut guard = RNG.lock().unwrap_or_else(PoisonError::into_inner);
    let rng = guard.get_or_insert_with(StdRng::from_entropy);
    f(rng)
}
