//! sealfile-crypto: passphrase-based authenticated file encryption
//!
//! Architecture: Argon2id key derivation + ChaCha20-Poly1305 framing
//!
//! Whole-file format:
//! ```text
//! "ENCv1" (5) || salt (16) || nonce (12) || ciphertext || Poly1305 tag (16)
//! ```
//!
//! Streaming format (STREAM construction, fixed-size chunks):
//! ```text
//! "ENCs1" (5) || salt (16) || base nonce (12) || chunk_size (u32 BE)
//!   || chunk 0 || chunk 1 || ... || final chunk
//! chunk_i nonce = base_nonce XOR (0u32 || i as u64 BE)
//! chunk_i AAD   = header || final_flag
//! ```
//!
//! Key lifecycle:
//! ```text
//! passphrase + fresh salt ──Argon2id──▶ DerivedKey (per file, zeroized on drop)
//!   └── AEAD: ChaCha20-Poly1305 (nonce random per file, or counter per chunk)
//! ```

pub mod codec;
pub mod error;
pub mod format;
pub mod kdf;
pub mod stream;

pub use codec::{FileCodec, Mode};
pub use error::{CodecError, CodecResult};
pub use format::{inspect, FormatKind, Header, HeaderInfo};
pub use kdf::{derive_key, DerivedKey, KdfParams};
pub use stream::{decrypt_stream, encrypt_stream, NonceSequence, StreamDecryptor, StreamEncryptor};

/// Size of a derived key in bytes (256-bit)
pub const KEY_SIZE: usize = 32;

/// Size of the per-file KDF salt
pub const SALT_SIZE: usize = 16;

/// Size of a ChaCha20-Poly1305 nonce (96-bit)
pub const NONCE_SIZE: usize = 12;

/// Size of a Poly1305 authentication tag
pub const TAG_SIZE: usize = 16;

/// Default plaintext chunk size for streaming mode
pub const DEFAULT_CHUNK_SIZE: usize = 4096;

/// Largest chunk size accepted from a stream header (16 MiB)
pub const MAX_CHUNK_SIZE: usize = 16 * 1024 * 1024;
