//! Whole-file sealing and the caller-facing `FileCodec`
//!
//! Whole-file format (binary):
//! ```text
//! ["ENCv1"][16 bytes: salt][12 bytes: random nonce][N bytes: ciphertext][16 bytes: Poly1305 tag]
//! AAD = "ENCv1" || salt || nonce
//! ```
//!
//! `FileCodec::decrypt` and `FileCodec::decrypt_file` accept either framing and
//! pick the right one from the leading tag.

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::Path;

use chacha20poly1305::{
    aead::{Aead, KeyInit, Payload},
    ChaCha20Poly1305, Nonce,
};
use tempfile::NamedTempFile;
use tracing::{debug, info};
use zeroize::Zeroizing;

use crate::error::{CodecError, CodecResult};
use crate::format::{read_full, Header, FORMAT_TAG_LEN, MIN_WHOLE_FILE_LEN, STREAM_TAG};
use crate::kdf::{derive_key, KdfParams};
use crate::stream::{decrypt_stream, encrypt_stream};
use crate::{DEFAULT_CHUNK_SIZE, TAG_SIZE};

/// Framing used when encrypting. Decryption detects the framing itself.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Mode {
    #[default]
    /// One nonce, one sealed message; the whole plaintext is held in memory.
    WholeFile,
    /// Fixed-size chunks, one counter-derived nonce per chunk.
    Stream { chunk_size: usize },
}

/// Passphrase-based file encryption.
///
/// Holds only parameters, never key material, so one codec can be shared
/// across threads and calls.
#[derive(Debug, Clone, Default)]
pub struct FileCodec {
    params: KdfParams,
    mode: Mode,
}

impl FileCodec {
    pub fn new(params: KdfParams) -> Self {
        Self {
            params,
            mode: Mode::WholeFile,
        }
    }

    pub fn with_mode(mut self, mode: Mode) -> Self {
        self.mode = mode;
        self
    }

    /// Encrypt in streaming mode with the given chunk size.
    pub fn streaming(self, chunk_size: usize) -> Self {
        self.with_mode(Mode::Stream { chunk_size })
    }

    /// Streaming mode with the default 4 KiB chunks.
    pub fn streaming_default(self) -> Self {
        self.streaming(DEFAULT_CHUNK_SIZE)
    }

    pub fn params(&self) -> &KdfParams {
        &self.params
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// Encrypt `plaintext` with a fresh salt and nonce(s).
    pub fn encrypt(&self, plaintext: &[u8], passphrase: &[u8]) -> CodecResult<Vec<u8>> {
        match self.mode {
            Mode::WholeFile => seal_whole_file(plaintext, passphrase, &self.params),
            Mode::Stream { chunk_size } => {
                let mut out = Vec::new();
                encrypt_stream(plaintext, &mut out, passphrase, &self.params, chunk_size)?;
                Ok(out)
            }
        }
    }

    /// Decrypt an encrypted file held in memory.
    pub fn decrypt(&self, data: &[u8], passphrase: &[u8]) -> CodecResult<Vec<u8>> {
        if data.starts_with(STREAM_TAG) {
            let mut out = Zeroizing::new(Vec::new());
            decrypt_stream(data, &mut *out, passphrase, &self.params)?;
            Ok(std::mem::take(&mut *out))
        } else {
            open_whole_file(data, passphrase, &self.params)
        }
    }

    /// Encrypt `input` into `output`.
    ///
    /// The ciphertext is staged in a temporary file next to `output` and
    /// renamed into place only after everything has been written and synced.
    pub fn encrypt_file(&self, input: &Path, output: &Path, passphrase: &[u8]) -> CodecResult<()> {
        info!(
            input = %input.display(),
            output = %output.display(),
            mode = ?self.mode,
            "encrypting file"
        );
        match self.mode {
            Mode::WholeFile => {
                let plaintext = Zeroizing::new(std::fs::read(input)?);
                let sealed = seal_whole_file(&plaintext, passphrase, &self.params)?;
                write_atomic(output, |file| Ok(file.write_all(&sealed)?))
            }
            Mode::Stream { chunk_size } => {
                let reader = BufReader::new(File::open(input)?);
                write_atomic(output, |file| {
                    let bytes = encrypt_stream(
                        reader,
                        BufWriter::new(file),
                        passphrase,
                        &self.params,
                        chunk_size,
                    )?;
                    debug!(bytes, "stream written");
                    Ok(())
                })
            }
        }
    }

    /// Decrypt `input` into `output`.
    ///
    /// Plaintext is staged in a temporary file and only renamed into place once
    /// every byte has authenticated; on failure nothing appears at `output`.
    pub fn decrypt_file(&self, input: &Path, output: &Path, passphrase: &[u8]) -> CodecResult<()> {
        info!(
            input = %input.display(),
            output = %output.display(),
            "decrypting file"
        );
        let mut file = File::open(input)?;
        let mut tag = [0u8; FORMAT_TAG_LEN];
        let got = read_full(&mut file, &mut tag)?;
        file.seek(SeekFrom::Start(0))?;

        if got == FORMAT_TAG_LEN && &tag == STREAM_TAG {
            let reader = BufReader::new(file);
            write_atomic(output, |out| {
                let bytes = decrypt_stream(reader, BufWriter::new(out), passphrase, &self.params)?;
                debug!(bytes, "stream decrypted");
                Ok(())
            })
        } else {
            let mut data = Vec::new();
            file.read_to_end(&mut data)?;
            let plaintext = Zeroizing::new(open_whole_file(&data, passphrase, &self.params)?);
            write_atomic(output, |out| Ok(out.write_all(&plaintext)?))
        }
    }
}

fn seal_whole_file(plaintext: &[u8], passphrase: &[u8], params: &KdfParams) -> CodecResult<Vec<u8>> {
    let header = Header::generate_whole_file()?;
    let key = derive_key(passphrase, &header.salt, params)?;
    let cipher = ChaCha20Poly1305::new(key.as_bytes().into());

    let mut out = header.to_bytes();
    let ciphertext = cipher
        .encrypt(
            Nonce::from_slice(&header.nonce),
            Payload {
                msg: plaintext,
                aad: &out,
            },
        )
        .map_err(|e| CodecError::Encrypt(format!("file encryption failed: {e}")))?;

    out.extend_from_slice(&ciphertext);
    debug!(
        plaintext = plaintext.len(),
        encrypted = out.len(),
        "sealed whole file"
    );
    Ok(out)
}

fn open_whole_file(data: &[u8], passphrase: &[u8], params: &KdfParams) -> CodecResult<Vec<u8>> {
    let header = Header::parse(data)?;
    if header.chunk_size.is_some() {
        return Err(CodecError::UnsupportedFormat);
    }
    if data.len() < MIN_WHOLE_FILE_LEN {
        return Err(CodecError::TruncatedFile {
            len: data.len(),
            min: MIN_WHOLE_FILE_LEN,
        });
    }

    let (aad, ciphertext) = data.split_at(header.encoded_len());
    let key = derive_key(passphrase, &header.salt, params)?;
    let cipher = ChaCha20Poly1305::new(key.as_bytes().into());

    let plaintext = cipher
        .decrypt(
            Nonce::from_slice(&header.nonce),
            Payload {
                msg: ciphertext,
                aad,
            },
        )
        .map_err(|_| CodecError::AuthenticationFailed)?;

    debug!(
        plaintext = plaintext.len(),
        overhead = header.encoded_len() + TAG_SIZE,
        "opened whole file"
    );
    Ok(plaintext)
}

/// Write `output` through a temporary file in the same directory, then rename.
fn write_atomic<F>(output: &Path, fill: F) -> CodecResult<()>
where
    F: FnOnce(&mut File) -> CodecResult<()>,
{
    let parent = match output.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };
    let mut tmp = NamedTempFile::new_in(parent)?;
    fill(tmp.as_file_mut())?;
    tmp.as_file_mut().sync_all()?;
    tmp.persist(output).map_err(|e| CodecError::Io(e.error))?;
    Ok(())
}
