//! The random-bytes collaborator from spec §6.
//!
//! The core never reads environment or globals for randomness; callers (or
//! the default below) inject a byte source. `MobID::new` and
//! `Auid::new_instance` both go through this trait.

/// A source of random bytes, injected rather than read from a global RNG.
pub trait RandomSource {
    fn fill_random(&mut self, buf: &mut [u8]);
}

/// Default collaborator implementation, backed by `rand`'s thread-local CSPRNG.
#[derive(Debug, Default)]
pub struct OsRandomSource;

impl RandomSource for OsRandomSource {
    fn fill_random(&mut self, buf: &mut [u8]) {
        use rand::RngCore;
        rand::thread_rng().fill_bytes(buf);
    }
}
