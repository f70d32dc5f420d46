//! Packet and handshake id generation.

use rand::rngs::OsRng;
use rand::RngCore;

use crate::error::{ClientError, Result};

/// Upper bound (exclusive) of generated ids.
const ID_RANGE: u64 = 1_000_000_000;

/// Draw a fresh id from the OS random source.
pub fn generate_random_id() -> Result<u32> {
    random_id_from(&mut OsRng)
}

/// Draw an id from `rng`, scaled into `0..1_000_000_000`.
///
/// An all-zero draw means the source is broken and fails with
/// [`ClientError::Csprng`] rather than handing out a predictable id.
pub fn random_id_from<R: RngCore + ?Sized>(rng: &mut R) -> Result<u32> {
    let mut seed = [0u8; 4];
    rng.try_fill_bytes(&mut seed)
        .map_err(|e| ClientError::Csprng(e.to_string()))?;
    let seed = u32::from_le_bytes(seed);
    if seed == 0 {
        return Err(ClientError::Csprng("random source returned all zeros".into()));
    }
    Ok(((seed as u64 * ID_RANGE) >> 32) as u32)
}
