//! BLAKE3 hashing with domain separation for protocol digests.

/// BLAKE3 hash (32 bytes).
pub type Hash = [u8; 32];

/// Hash arbitrary data using BLAKE3.
pub fn hash(data: &[u8]) -> Hash {
    *blake3::hash(data).as_bytes()
}

/// Incremental hasher over a fixed-width canonical encoding.
///
/// Integers are written big-endian at their full width and variable-length
/// byte strings are length-prefixed, so distinct field sequences cannot
/// collide by concatenation.
pub struct DomainHasher {
    inner: blake3::Hasher,
}

impl DomainHasher {
    pub fn new(domain: &str) -> Self {
        let mut inner = blake3::Hasher::new();
        inner.update(&(domain.len() as u32).to_be_bytes());
        inner.update(domain.as_bytes());
        Self { inner }
    }

    pub fn bytes32(&mut self, value: &[u8; 32]) -> &mut Self {
        self.inner.update(value);
        self
    }

    pub fn bytes(&mut self, value: &[u8]) -> &mut Self {
        self.inner.update(&(value.len() as u64).to_be_bytes());
        self.inner.update(value);
        self
    }

    pub fn u128(&mut self, value: u128) -> &mut Self {
        self.inner.update(&value.to_be_bytes());
        self
    }

    pub fn u64(&mut self, value: u64) -> &mut Self {
        self.inner.update(&value.to_be_bytes());
        self
    }

    pub fn u32(&mut self, value: u32) -> &mut Self {
        self.inner.update(&value.to_be_bytes());
        self
    }

    pub fn finalize(&self) -> Hash {
        *self.inner.finalize().as_bytes()
    }
}
