//! Double SHA-256 (SHA256d), the digest used for block, transaction, and
//! frame-checksum hashing.

use sha2::{Digest, Sha256};
use std::io;

/// A wrapper to serialize into a SHA256d digest without an intermediate
/// buffer, by implementing `io::Write`.
#[derive(Default)]
pub struct Writer {
    hash: Sha256,
}

impl Writer {
    /// Consume the writer and produce the double hash of everything written
    /// so far.
    pub fn finish(self) -> [u8; 32] {
        let result = Sha256::digest(&self.hash.finalize());
        let mut buffer = [0u8; 32];
        buffer[0..32].copy_from_slice(&result[0..32]);
        buffer
    }
}

impl io::Write for Writer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.hash.update(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Compute the SHA256d digest of `data` in one call.
pub fn digest(data: &[u8]) -> [u8; 32] {
    let once = Sha256::digest(data);
    let twice = Sha256::digest(&once);
    let mut buffer = [0u8; 32];
    buffer.copy_from_slice(&twice);
    buffer
}

/// A 4-byte checksum using truncated double-SHA256 (two rounds of SHA256).
#[derive(Copy, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub struct Checksum(pub [u8; 4]);

impl<'a> From<&'a [u8]> for Checksum {
    fn from(bytes: &'a [u8]) -> Self {
        let hash = digest(bytes);
        let mut checksum = [0u8; 4];
        checksum.copy_from_slice(&hash[0..4]);
        Self(checksum)
    }
}

impl std::fmt::Debug for Checksum {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.debug_tuple("Checksum")
            .field(&hex::encode(self.0))
            .finish()
    }
}
