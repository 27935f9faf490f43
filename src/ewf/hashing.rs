//! The injected hashing interface. The core never implements MD5/SHA-1
//! itself (spec §1 Non-goal) — it only knows how to serialize whatever
//! bytes a caller-supplied digest produces into the `hash`/`digest`
//! sections, and how to parse them back out on read.

/// A streaming digest the caller feeds chunk plaintext into as it is
/// written, then finalizes once at close. `exhume_ewf` ships no
/// implementations; tests provide one backed by the `md-5`/`sha1` crates
/// to exercise the write → finalize → read round trip end to end.
pub trait MediaDigest {
    /// Stable identifier used to slot the result into the right field of
    /// the `hash`/`digest` section (`"MD5"`, `"SHA1"`, …).
    fn algorithm_name(&self) -> &'static str;

    /// Feed more plaintext into the running digest.
    fn update(&mut self, data: &[u8]);

    /// Consume the digest and return its raw output bytes (16 for MD5, 20
    /// for SHA-1).
    fn finalize(self: Box<Self>) -> Vec<u8>;
}

/// Bundles whatever digests the caller wants computed over the acquired
/// media as it streams through the writer.
#[derive(Default)]
pub struct DigestSet {
    digests: Vec<Box<dyn MediaDigest>>,
}

impl DigestSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, digest: Box<dyn MediaDigest>) {
        self.digests.push(digest);
    }

    pub fn update(&mut self, data: &[u8]) {
        for digest in &mut self.digests {
            digest.update(data);
        }
    }

    /// Consumes the set, returning `(algorithm_name, raw_bytes)` pairs.
    pub fn finalize(self) -> Vec<(&'static str, Vec<u8>)> {
        self.digests
            .into_iter()
            .map(|d| {
                let name = d.algorithm_name();
                (name, d.finalize())
            })
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.digests.is_empty()
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::MediaDigest;
    use md5::{Digest as _, Md5};
    use sha1::Sha1;

    pub struct Md5Digest(Md5);

    impl Md5Digest {
        pub fn new() -> Self {
            Self(Md5::new())
        }
    }

    impl MediaDigest for Md5Digest {
        fn algorithm_name(&self) -> &'static str {
            "MD5"
        }

        fn update(&mut self, data: &[u8]) {
            md5::Digest::update(&mut self.0, data);
        }

        fn finalize(self: Box<Self>) -> Vec<u8> {
            self.0.finalize().to_vec()
        }
    }

    pub struct Sha1Digest(Sha1);

    impl Sha1Digest {
        pub fn new() -> Self {
            Self(Sha1::new())
        }
    }

    impl MediaDigest for Sha1Digest {
        fn algorithm_name(&self) -> &'static str {
            "SHA1"
        }

        fn update(&mut self, data: &[u8]) {
            sha1::Digest::update(&mut self.0, data);
        }

        fn finalize(self: Box<Self>) -> Vec<u8> {
            self.0.finalize().to_vec()
        }
    }
}
