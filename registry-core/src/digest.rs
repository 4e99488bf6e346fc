//! Content-address codec: textual `algo:hex` digests and the compact binary
//! representation (algorithm prefix byte + raw hash bytes) persisted on disk.
//!
//! Algorithm prefixes are treated as an append-only registry: new algorithms
//! may be added but an existing prefix byte must never be reassigned, since
//! it is persisted in every blob/manifest row.

use digest::Digest as _;
use sha2::{Sha256, Sha512};

use crate::errors::Error;
use crate::Result;

/// A digest algorithm recognized by this datastore.
///
/// New variants may be appended; existing prefix bytes must never change or
/// be reused (§4.1: "treated as an append-only registry").
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Algorithm {
    Sha256,
    Sha512,
}

impl Algorithm {
    const fn prefix_byte(self) -> u8 {
        match self {
            Algorithm::Sha256 => 0x01,
            Algorithm::Sha512 => 0x02,
        }
    }

    const fn hash_len(self) -> usize {
        match self {
            Algorithm::Sha256 => 32,
            Algorithm::Sha512 => 64,
        }
    }

    fn from_prefix_byte(b: u8) -> Result<Self> {
        match b {
            0x01 => Ok(Algorithm::Sha256),
            0x02 => Ok(Algorithm::Sha512),
            _ => Err(Error::InvalidDigest(format!("unknown algorithm prefix byte {b:#04x}"))),
        }
    }

    fn from_name(name: &str) -> Result<Self> {
        match name {
            "sha256" => Ok(Algorithm::Sha256),
            "sha512" => Ok(Algorithm::Sha512),
            other => Err(Error::InvalidDigest(format!("unsupported digest algorithm: {other}"))),
        }
    }

    fn name(self) -> &'static str {
        match self {
            Algorithm::Sha256 => "sha256",
            Algorithm::Sha512 => "sha512",
        }
    }
}

/// A content address: algorithm plus raw hash bytes.
///
/// Exposed as the textual form `algo:hex` at API boundaries; persisted as a
/// tagged byte sequence (prefix byte + raw hash) for index size and equality
/// performance (§9).
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Digest {
    algorithm: Algorithm,
    hash: Vec<u8>,
}

impl Digest {
    pub fn algorithm(&self) -> Algorithm {
        self.algorithm
    }

    /// Hash `bytes` under the default algorithm (sha256) and produce a
    /// `Digest` for it. Used by ingest paths to enforce content-addressing
    /// (invariant 1): the caller compares this against the claimed digest.
    pub fn compute_sha256(bytes: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(bytes);
        Self {
            algorithm: Algorithm::Sha256,
            hash: hasher.finalize().to_vec(),
        }
    }

    /// Decode the compact binary representation (prefix byte + raw hash
    /// bytes) persisted on disk into a `Digest`.
    ///
    /// Fails with `InvalidDigest` on empty input, unknown prefix, or a hash
    /// length that doesn't match the declared algorithm.
    pub fn decode(binary: &[u8]) -> Result<Self> {
        if binary.is_empty() {
            return Err(Error::InvalidDigest("empty digest".to_string()));
        }
        let algorithm = Algorithm::from_prefix_byte(binary[0])?;
        let hash = &binary[1..];
        if hash.len() != algorithm.hash_len() {
            return Err(Error::InvalidDigest(format!(
                "expected {} hash bytes for {}, got {}",
                algorithm.hash_len(),
                algorithm.name(),
                hash.len()
            )));
        }
        Ok(Self {
            algorithm,
            hash: hash.to_vec(),
        })
    }

    /// Encode this digest into its compact binary representation.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(1 + self.hash.len());
        out.push(self.algorithm.prefix_byte());
        out.extend_from_slice(&self.hash);
        out
    }

    fn hex(&self) -> String {
        self.hash.iter().map(|b| format!("{b:02x}")).collect()
    }
}

impl TryFrom<&str> for Digest {
    type Error = Error;

    /// Parse the textual `algo:hex` form. Fails with `InvalidDigest` if the
    /// algorithm is unknown, the separator is missing, or the hex body is
    /// malformed or the wrong length for the declared algorithm.
    fn try_from(s: &str) -> Result<Self> {
        let idx = s
            .find(':')
            .ok_or_else(|| Error::InvalidDigest(s.to_string()))?;
        let (algo, rest) = (&s[..idx], &s[idx + 1..]);
        if rest.is_empty() {
            return Err(Error::InvalidDigest(s.to_string()));
        }
        let algorithm = Algorithm::from_name(algo)?;

        if rest.len() != algorithm.hash_len() * 2 {
            return Err(Error::InvalidDigest(s.to_string()));
        }
        let mut hash = Vec::with_capacity(algorithm.hash_len());
        let mut chars = rest.chars();
        while let (Some(hi), Some(lo)) = (chars.next(), chars.next()) {
            let byte = (hi.to_digit(16).ok_or_else(|| Error::InvalidDigest(s.to_string()))? << 4)
                | lo.to_digit(16).ok_or_else(|| Error::InvalidDigest(s.to_string()))?;
            hash.push(byte as u8);
        }

        tracing::trace!(digest = s, "parsed textual digest");
        Ok(Self { algorithm, hash })
    }
}

impl TryFrom<&[u8]> for Digest {
    type Error = Error;

    fn try_from(binary: &[u8]) -> Result<Self> {
        Self::decode(binary)
    }
}

impl From<&Digest> for String {
    fn from(d: &Digest) -> String {
        format!("{}:{}", d.algorithm.name(), d.hex())
    }
}

impl From<Digest> for String {
    fn from(d: Digest) -> String {
        String::from(&d)
    }
}

impl std::fmt::Display for Digest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", String::from(self))
    }
}

#[cfg(test)]
mod test {
    use rstest::*;

    use super::*;

    #[rstest]
    #[case::sha256("sha256:e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855", false)]
    #[case::sha256_ok(
        "sha256:e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b85",
        true
    )]
    #[case::sha512_ok(
        "sha512:cf83e1357eefb8bdf1542850d66d8007d620e4050b5715dc83f4a921d36ce9ce47d0d13c5d85f2b0ff8318d2877eec2f63b931bd47417a81a538327af927da3",
        true
    )]
    #[case::unknown_algorithm("sha666:deadbeef", false)]
    #[case::missing_separator("sha256deadbeef", false)]
    #[case::empty_hex("sha256:", false)]
    #[case::empty_algo(":deadbeef", false)]
    fn validate_try_from(#[case] input: &str, #[case] should_succeed: bool) {
        let actual: Result<Digest> = input.try_into();
        assert_eq!(actual.is_ok(), should_succeed, "input = {input:?}, got {actual:?}");
    }

    #[rstest]
    #[case::sha256("sha256:e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b85")]
    #[case::sha512("sha512:cf83e1357eefb8bdf1542850d66d8007d620e4050b5715dc83f4a921d36ce9ce47d0d13c5d85f2b0ff8318d2877eec2f63b931bd47417a81a538327af927da3")]
    fn round_trip(#[case] input: &str) {
        let d: Digest = input.try_into().unwrap();
        let binary = d.encode();
        let decoded = Digest::decode(&binary).unwrap();
        assert_eq!(String::from(&decoded), input);
    }

    #[test]
    fn decode_rejects_empty() {
        assert!(Digest::decode(&[]).is_err());
    }

    #[test]
    fn decode_rejects_unknown_prefix() {
        let mut binary = vec![0xffu8];
        binary.extend(std::iter::repeat(0u8).take(32));
        assert!(Digest::decode(&binary).is_err());
    }

    #[test]
    fn decode_rejects_wrong_length() {
        let mut binary = vec![Algorithm::Sha256.prefix_byte()];
        binary.extend(std::iter::repeat(0u8).take(10));
        assert!(Digest::decode(&binary).is_err());
    }

    #[test]
    fn compute_sha256_matches_known_vector() {
        let d = Digest::compute_sha256(b"");
        assert_eq!(
            String::from(&d),
            "sha256:e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b85"
        );
    }
}
