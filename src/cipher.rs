//! Per-shard symmetric encryption for bucket ciphertexts.
//!
//! `Cipher` is a stateless object parameterized by a key (§4.3). Every call
//! to [`Cipher::encrypt`] draws a fresh IV from the caller's RNG and
//! prepends it to the ciphertext (Invariant E1); the core never shares an
//! encryptor between buckets.

use crate::error::OramError;
use aes::Aes256;
use cbc::cipher::{block_padding::Pkcs7, BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use rand::{CryptoRng, RngCore};

type Aes256CbcEnc = cbc::Encryptor<Aes256>;
type Aes256CbcDec = cbc::Decryptor<Aes256>;

const IV_LEN: usize = 16;

/// A symmetric cipher bound to a single shard's key.
#[derive(Clone)]
pub struct Cipher {
    key: [u8; 32],
}

impl Cipher {
    /// Builds a cipher from a 256-bit key.
    pub fn new(key: [u8; 32]) -> Self {
        Self { key }
    }

    /// Encrypts `plaintext` under a fresh IV, returning `iv || ciphertext`.
    pub fn encrypt<R: RngCore + CryptoRng>(&self, plaintext: &[u8], rng: &mut R) -> Vec<u8> {
        let mut iv = [0u8; IV_LEN];
        rng.fill_bytes(&mut iv);
        let ciphertext = Aes256CbcEnc::new(&self.key.into(), &iv.into())
            .encrypt_padded_vec_mut::<Pkcs7>(plaintext);
        let mut out = Vec::with_capacity(IV_LEN + ciphertext.len());
        out.extend_from_slice(&iv);
        out.extend_from_slice(&ciphertext);
        out
    }

    /// Decrypts an `iv || ciphertext` blob produced by [`Cipher::encrypt`].
    pub fn decrypt(&self, blob: &[u8]) -> Result<Vec<u8>, OramError> {
        if blob.len() < IV_LEN {
            return Err(OramError::Crypto("ciphertext shorter than IV".into()));
        }
        let (iv, ciphertext) = blob.split_at(IV_LEN);
        Aes256CbcDec::new(&self.key.into(), iv.into())
            .decrypt_padded_vec_mut::<Pkcs7>(ciphertext)
            .map_err(|e| OramError::Crypto(format!("bucket decryption failed: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::StdRng, SeedableRng};

    #[test]
    fn round_trips() {
        let mut rng = StdRng::seed_from_u64(0);
        let cipher = Cipher::new([7u8; 32]);
        let plaintext = b"a path oram bucket payload".to_vec();
        let ciphertext = cipher.encrypt(&plaintext, &mut rng);
        assert_eq!(cipher.decrypt(&ciphertext).unwrap(), plaintext);
    }

    #[test]
    fn fresh_iv_each_call() {
        let mut rng = StdRng::seed_from_u64(1);
        let cipher = Cipher::new([3u8; 32]);
        let plaintext = vec![0u8; 64];
        let a = cipher.encrypt(&plaintext, &mut rng);
        let b = cipher.encrypt(&plaintext, &mut rng);
        assert_ne!(a, b, "identical plaintexts must not produce identical ciphertexts");
    }

    #[test]
    fn rejects_corrupted_ciphertext() {
        let mut rng = StdRng::seed_from_u64(2);
        let cipher = Cipher::new([1u8; 32]);
        let mut ciphertext = cipher.encrypt(b"hello world blocks", &mut rng);
        let last = ciphertext.len() - 1;
        ciphertext[last] ^= 0xFF;
        assert!(cipher.decrypt(&ciphertext).is_err());
    }
}
