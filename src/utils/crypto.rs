// Cryptographic utilities for signing keys, MACs and random tokens

use base64::{engine::general_purpose, Engine as _};
use hmac::digest::{Key, KeyInit};
use hmac::{Hmac, Mac};
use rand::{Rng, RngCore};
use sha2::{Digest, Sha256};

type HmacSha256 = Hmac<Sha256>;

/// Size of a derived signing key (256 bits)
pub const SIGNING_KEY_SIZE: usize = 32;

/// Size of generated secrets in bytes (256 bits)
pub const SECRET_SIZE: usize = 32;

/// Derive a per-purpose signing key from a secret and a salt
///
/// The salt is length-prefixed so that `("ab", "c...")` and `("a", "bc...")`
/// never collapse onto the same key.
#[must_use]
pub fn derive_signing_key(secret: &[u8], salt: &str) -> [u8; SIGNING_KEY_SIZE] {
    let salt_len = u64::try_from(salt.len()).unwrap_or(u64::MAX);
    Sha256::new()
        .chain_update(salt_len.to_be_bytes())
        .chain_update(salt.as_bytes())
        .chain_update(b"signer")
        .chain_update(secret)
        .finalize()
        .into()
}

fn keyed_mac(key: &[u8; SIGNING_KEY_SIZE], parts: &[&[u8]]) -> HmacSha256 {
    // HMAC zero-pads short keys to the block size, so a padded block is
    // the same key as the 32 raw bytes.
    let mut block = Key::<HmacSha256>::default();
    block[..SIGNING_KEY_SIZE].copy_from_slice(key);
    let mut mac = <HmacSha256 as KeyInit>::new(&block);
    for part in parts {
        mac.update(part);
    }
    mac
}

/// Compute HMAC-SHA256 over the concatenation of `parts`
#[must_use]
pub fn hmac_sha256(key: &[u8; SIGNING_KEY_SIZE], parts: &[&[u8]]) -> Vec<u8> {
    keyed_mac(key, parts).finalize().into_bytes().to_vec()
}

/// Verify an HMAC-SHA256 signature in constant time
#[must_use]
pub fn verify_hmac_sha256(key: &[u8; SIGNING_KEY_SIZE], parts: &[&[u8]], signature: &[u8]) -> bool {
    keyed_mac(key, parts).verify_slice(signature).is_ok()
}

/// Draw `length` characters uniformly from `charset` using the thread-local CSPRNG
#[must_use]
pub fn generate_random_string(length: usize, charset: &[u8]) -> String {
    let mut rng = rand::rng();
    (0..length)
        .map(|_| char::from(charset[rng.random_range(0..charset.len())]))
        .collect()
}

/// Generate a random secret suitable for signing, base64 encoded
#[must_use]
pub fn generate_secret() -> String {
    let mut secret = [0u8; SECRET_SIZE];
    rand::rng().fill_bytes(&mut secret);
    general_purpose::STANDARD.encode(secret)
}
