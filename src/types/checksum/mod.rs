#![forbid(unsafe_code)]

/// Incremental checksum over byte slices.
pub trait Checksum {
    /// Clears all accumulated state.
    fn reset(&mut self);
    /// Feeds more bytes.
    fn update(&mut self, bytes: &[u8]);
    /// Returns the checksum of everything fed since the last reset.
    fn finalize(&self) -> u32;
}

/// CRC-32 (IEEE) backed by `crc32fast`.
pub struct Crc32Fast {
    inner: crc32fast::Hasher,
}

impl Default for Crc32Fast {
    fn default() -> Self {
        Self {
            inner: crc32fast::Hasher::new(),
        }
    }
}

impl Checksum for Crc32Fast {
    fn reset(&mut self) {
        self.inner.reset();
    }

    fn update(&mut self, bytes: &[u8]) {
        self.inner.update(bytes);
    }

    fn finalize(&self) -> u32 {
        self.inner.clone().finalize()
    }
}

/// Checksum of one archive entry. The key is mixed in so that a payload
/// copied under the wrong `(owner, field)` is detected.
pub fn entry_crc32(owner: &str, field: &str, payload: &[u8]) -> u32 {
    let mut hasher = Crc32Fast::default();
    hasher.update(owner.as_bytes());
    hasher.update(&[0]);
    hasher.update(field.as_bytes());
    hasher.update(&[0]);
    hasher.update(payload);
    hasher.finalize()
}
