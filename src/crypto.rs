//! Cryptographic subsystem.
//!
//! Only the part the lifecycle needs: a CSPRNG seeded from the OS at
//! startup (fatal if the OS source is unavailable) and released at
//! teardown. Transport ciphers live with their protocols.

use rand::rngs::{OsRng, StdRng};
use rand::{RngCore, SeedableRng};
use thiserror::Error;

#[derive(Debug, Error)]
#[error("OS entropy source unavailable: {0}")]
pub struct CryptoError(#[from] rand::Error);

/// Process-wide crypto state. Owned by the lifecycle manager.
pub struct CryptoContext {
    rng: StdRng,
}

impl CryptoContext {
    pub fn initialize() -> Result<Self, CryptoError> {
        let mut seed = [0u8; 32];
        OsRng.try_fill_bytes(&mut seed)?;
        let rng = StdRng::from_seed(seed);
        seed.fill(0);

        tracing::debug!("Crypto subsystem initialized");
        Ok(Self { rng })
    }

    /// Fill `buf` with random bytes.
    pub fn fill_random(&mut self, buf: &mut [u8]) {
        self.rng.fill_bytes(buf);
    }

    pub fn shutdown(self) {
        tracing::debug!("Crypto subsystem released");
    }
}

impl std::fmt::Debug for CryptoContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CryptoContext").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn produces_distinct_random_blocks() {
        let mut crypto = CryptoContext::initialize().unwrap();
        let mut a = [0u8; 32];
        let mut b = [0u8; 32];
        crypto.fill_random(&mut a);
        crypto.fill_random(&mut b);
        assert_ne!(a, b);
        crypto.shutdown();
    }
}
