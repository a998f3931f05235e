//! Key derivation: Argon2id passphrase + salt → per-file key

use argon2::{Algorithm, Argon2, Params, Version};
use zeroize::Zeroize;

use crate::error::{CodecError, CodecResult};
use crate::{KEY_SIZE, SALT_SIZE};

/// A 256-bit key derived from a passphrase and a per-file salt.
///
/// Exists only for the duration of one encrypt/decrypt call and is zeroized on drop.
pub struct DerivedKey {
    bytes: [u8; KEY_SIZE],
}

impl DerivedKey {
    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.bytes
    }
}

impl Drop for DerivedKey {
    fn drop(&mut self) {
        self.bytes.zeroize();
    }
}

impl std::fmt::Debug for DerivedKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DerivedKey")
            .field("bytes", &"[REDACTED]")
            .finish()
    }
}

/// Argon2id parameters for KDF
///
/// These are not recorded in the encrypted file: the decrypting side must use
/// the same values as the encrypting side.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KdfParams {
    /// Memory cost in KiB (default: 65536 = 64 MiB)
    pub mem_cost_kib: u32,
    /// Time cost / iterations (default: 3)
    pub time_cost: u32,
    /// Parallelism (default: 4)
    pub parallelism: u32,
}

impl Default for KdfParams {
    fn default() -> Self {
        Self {
            mem_cost_kib: 65536,
            time_cost: 3,
            parallelism: 4,
        }
    }
}

impl KdfParams {
    fn to_argon2(self) -> CodecResult<Params> {
        Params::new(
            self.mem_cost_kib,
            self.time_cost,
            self.parallelism,
            Some(KEY_SIZE),
        )
        .map_err(|e| CodecError::InvalidParams(format!("Argon2id: {e}")))
    }

    /// Check that these parameters are accepted by Argon2id.
    pub fn validate(&self) -> CodecResult<()> {
        self.to_argon2().map(|_| ())
    }
}

/// Derive a 256-bit key from a passphrase and salt using Argon2id.
///
/// The salt must be freshly generated per encrypted file and stored alongside
/// the ciphertext (it does not need to be secret).
pub fn derive_key(
    passphrase: &[u8],
    salt: &[u8; SALT_SIZE],
    params: &KdfParams,
) -> CodecResult<DerivedKey> {
    let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, params.to_argon2()?);

    let mut key = DerivedKey {
        bytes: [0u8; KEY_SIZE],
    };
    argon2
        .hash_password_into(passphrase, salt, &mut key.bytes)
        .map_err(|e| CodecError::InvalidParams(format!("Argon2id KDF failed: {e}")))?;

    Ok(key)
}

#[cfg(test)]
pub(crate) fn test_params() -> KdfParams {
    KdfParams {
        mem_cost_kib: 1024,
        time_cost: 1,
        parallelism: 1,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_same_inputs_same_key() {
        let salt = [0xA5u8; SALT_SIZE];
        let first = derive_key(b"open sesame", &salt, &test_params()).unwrap();
        let again = derive_key(b"open sesame", &salt, &test_params()).unwrap();
        assert_eq!(first.as_bytes(), again.as_bytes());
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(8))]

        #[test]
        fn key_depends_on_passphrase_and_salt(
            passphrase in proptest::collection::vec(any::<u8>(), 0..32),
            salt in any::<[u8; SALT_SIZE]>(),
            flip in 0usize..SALT_SIZE,
        ) {
            let params = test_params();
            let key = derive_key(&passphrase, &salt, &params).unwrap();

            let mut other_pass = passphrase.clone();
            other_pass.push(0x01);
            let by_pass = derive_key(&other_pass, &salt, &params).unwrap();
            prop_assert_ne!(key.as_bytes(), by_pass.as_bytes());

            let mut other_salt = salt;
            other_salt[flip] ^= 0x80;
            let by_salt = derive_key(&passphrase, &other_salt, &params).unwrap();
            prop_assert_ne!(key.as_bytes(), by_salt.as_bytes());
        }
    }

    #[test]
    fn test_kdf_params_change_key() {
        let salt = [7u8; SALT_SIZE];
        let fast = test_params();
        let slower = KdfParams {
            time_cost: 2,
            ..fast
        };

        let key1 = derive_key(b"passphrase", &salt, &fast).unwrap();
        let key2 = derive_key(b"passphrase", &salt, &slower).unwrap();

        assert_ne!(key1.as_bytes(), key2.as_bytes());
    }

    #[test]
    fn test_empty_passphrase_is_accepted() {
        let key = derive_key(b"", &[3u8; SALT_SIZE], &test_params()).unwrap();
        assert_eq!(key.as_bytes().len(), KEY_SIZE);
    }

    #[test]
    fn test_invalid_params_rejected() {
        let params = KdfParams {
            mem_cost_kib: 1024,
            time_cost: 0,
            parallelism: 1,
        };
        assert!(params.validate().is_err());
        let err = derive_key(b"p", &[1u8; SALT_SIZE], &params).unwrap_err();
        assert!(matches!(err, CodecError::InvalidParams(_)));
    }

    #[test]
    fn test_default_params_validate() {
        KdfParams::default().validate().unwrap();
    }

    #[test]
    fn test_debug_redacts_key() {
        let key = derive_key(b"secret", &[1u8; SALT_SIZE], &test_params()).unwrap();
        let debug = format!("{key:?}");
        assert!(debug.contains("REDACTED"));
    }
}
