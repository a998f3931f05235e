//! Chunked streaming encryption/decryption
//!
//! Plaintext is cut into fixed-size chunks, each sealed with ChaCha20-Poly1305:
//! ```text
//! nonce_i = base_nonce XOR (0u32 || i as u64 BE)
//! AAD_i   = header || final_flag (0x00 or 0x01)
//! ```
//!
//! Every chunk but the last carries exactly `chunk_size` plaintext bytes; the
//! last carries fewer (possibly zero). A reader therefore knows a short unit is
//! the final one, and a stream that ends on a full unit was truncated. The
//! counter in the nonce rejects reordering, the final flag rejects truncation
//! and extension, and the header in the AAD binds every chunk to its file.

use std::io::{self, Read, Write};

use chacha20poly1305::{
    aead::{Aead, KeyInit, Payload},
    ChaCha20Poly1305, Nonce,
};
use tracing::debug;
use zeroize::Zeroizing;

use crate::error::{CodecError, CodecResult};
use crate::format::{read_full, FormatKind, Header};
use crate::kdf::{derive_key, KdfParams};
use crate::{NONCE_SIZE, TAG_SIZE};

/// Per-session chunk nonce generator.
///
/// Owned by exactly one encryptor or decryptor. The counter only moves
/// forward, so no two chunks of a session share a nonce.
#[derive(Debug)]
pub struct NonceSequence {
    base: [u8; NONCE_SIZE],
    counter: u64,
}

impl NonceSequence {
    pub fn new(base: [u8; NONCE_SIZE]) -> Self {
        Self { base, counter: 0 }
    }

    /// Number of nonces handed out so far.
    pub fn position(&self) -> u64 {
        self.counter
    }

    /// The nonce for chunk `index`: the low 8 bytes of the base XOR the counter.
    pub fn nonce_at(&self, index: u64) -> [u8; NONCE_SIZE] {
        let mut nonce = self.base;
        for (byte, ctr) in nonce[NONCE_SIZE - 8..]
            .iter_mut()
            .zip(index.to_be_bytes())
        {
            *byte ^= ctr;
        }
        nonce
    }

    /// Return the nonce for the current chunk and move to the next one.
    pub fn advance(&mut self) -> CodecResult<[u8; NONCE_SIZE]> {
        let next = self
            .counter
            .checked_add(1)
            .ok_or(CodecError::CounterExhausted)?;
        let nonce = self.nonce_at(self.counter);
        self.counter = next;
        Ok(nonce)
    }

    #[cfg(test)]
    fn starting_at(base: [u8; NONCE_SIZE], counter: u64) -> Self {
        Self { base, counter }
    }
}

fn chunk_aad(header: &[u8], is_final: bool) -> Vec<u8> {
    let mut aad = Vec::with_capacity(header.len() + 1);
    aad.extend_from_slice(header);
    aad.push(u8::from(is_final));
    aad
}

/// Streaming encryptor: Open with [`StreamEncryptor::new`], feed plaintext
/// through [`Write`], Close with [`StreamEncryptor::finish`].
///
/// `finish` consumes the encryptor, so nothing can be written after Close.
/// Dropping it without `finish` leaves a stream with no final chunk, which
/// [`StreamDecryptor`] rejects as truncated. After any failed chunk every
/// further call fails with [`CodecError::StreamAborted`].
pub struct StreamEncryptor<W: Write> {
    inner: W,
    cipher: ChaCha20Poly1305,
    nonces: NonceSequence,
    header: Vec<u8>,
    chunk_size: usize,
    buffer: Zeroizing<Vec<u8>>,
    bytes_in: u64,
    failed: bool,
}

impl<W: Write> StreamEncryptor<W> {
    /// Generate a fresh salt and base nonce, derive the key, and write the header.
    pub fn new(
        mut inner: W,
        passphrase: &[u8],
        params: &KdfParams,
        chunk_size: usize,
    ) -> CodecResult<Self> {
        let header = Header::generate_stream(chunk_size)?;
        let key = derive_key(passphrase, &header.salt, params)?;
        let cipher = ChaCha20Poly1305::new(key.as_bytes().into());

        let header_bytes = header.to_bytes();
        inner.write_all(&header_bytes)?;
        debug!(chunk_size, "stream encryption started");

        Ok(Self {
            inner,
            cipher,
            nonces: NonceSequence::new(header.nonce),
            header: header_bytes,
            chunk_size,
            buffer: Zeroizing::new(Vec::with_capacity(chunk_size)),
            bytes_in: 0,
            failed: false,
        })
    }

    /// Chunks sealed so far.
    pub fn chunks_written(&self) -> u64 {
        self.nonces.position()
    }

    fn seal_buffer(&mut self, is_final: bool) -> CodecResult<()> {
        if self.failed {
            return Err(CodecError::StreamAborted);
        }
        let result = self.try_seal(is_final);
        self.failed = result.is_err();
        result
    }

    fn try_seal(&mut self, is_final: bool) -> CodecResult<()> {
        let nonce = self.nonces.advance()?;
        let aad = chunk_aad(&self.header, is_final);
        let sealed = self
            .cipher
            .encrypt(
                Nonce::from_slice(&nonce),
                Payload {
                    msg: &self.buffer,
                    aad: &aad,
                },
            )
            .map_err(|e| CodecError::Encrypt(format!("chunk encryption failed: {e}")))?;
        self.inner.write_all(&sealed)?;
        self.buffer.clear();
        Ok(())
    }

    /// Seal any pending full chunk, then the remainder as the final chunk, and return the writer.
    pub fn finish(mut self) -> CodecResult<W> {
        if self.buffer.len() == self.chunk_size {
            self.seal_buffer(false)?;
        }
        self.seal_buffer(true)?;
        self.inner.flush()?;
        debug!(
            chunks = self.nonces.position(),
            bytes = self.bytes_in,
            "stream encryption finished"
        );
        Ok(self.inner)
    }
}

impl<W: Write> Write for StreamEncryptor<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.failed {
            return Err(io::Error::other(CodecError::StreamAborted));
        }
        if buf.is_empty() {
            return Ok(0);
        }

        // A full buffer is sealed only once more input arrives: it is never
        // the final chunk, and a failed seal leaves `buf` unconsumed.
        if self.buffer.len() == self.chunk_size {
            self.seal_buffer(false).map_err(io::Error::other)?;
        }

        let room = self.chunk_size - self.buffer.len();
        let take = room.min(buf.len());
        self.buffer.extend_from_slice(&buf[..take]);
        self.bytes_in += take as u64;
        Ok(take)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DecryptState {
    Reading,
    Finished,
    Failed,
}

/// Streaming decryptor: reads the header on construction, then yields
/// authenticated plaintext one chunk at a time.
///
/// The first failed chunk ends the session; later calls return
/// [`CodecError::StreamAborted`] and never yield plaintext.
pub struct StreamDecryptor<R: Read> {
    inner: R,
    cipher: ChaCha20Poly1305,
    nonces: NonceSequence,
    header: Vec<u8>,
    unit: Vec<u8>,
    state: DecryptState,
}

impl<R: Read> StreamDecryptor<R> {
    pub fn new(mut inner: R, passphrase: &[u8], params: &KdfParams) -> CodecResult<Self> {
        let header = Header::read_from(&mut inner)?;
        let chunk_size = match (header.kind, header.chunk_size) {
            (FormatKind::Stream, Some(size)) => size as usize,
            _ => return Err(CodecError::UnsupportedFormat),
        };
        let key = derive_key(passphrase, &header.salt, params)?;
        debug!(chunk_size, "stream decryption started");

        Ok(Self {
            inner,
            cipher: ChaCha20Poly1305::new(key.as_bytes().into()),
            nonces: NonceSequence::new(header.nonce),
            header: header.to_bytes(),
            unit: vec![0u8; chunk_size + TAG_SIZE],
            state: DecryptState::Reading,
        })
    }

    /// Decrypt the next chunk. Returns `None` once the final chunk has been read.
    ///
    /// A stream that ends where a chunk is expected fails with
    /// [`CodecError::TruncatedFile`] (lengths refer to the sealed unit).
    pub fn next_chunk(&mut self) -> CodecResult<Option<Zeroizing<Vec<u8>>>> {
        match self.state {
            DecryptState::Finished => return Ok(None),
            DecryptState::Failed => return Err(CodecError::StreamAborted),
            DecryptState::Reading => {}
        }
        let result = self.open_next();
        if result.is_err() {
            self.state = DecryptState::Failed;
        }
        result
    }

    fn open_next(&mut self) -> CodecResult<Option<Zeroizing<Vec<u8>>>> {
        let got = read_full(&mut self.inner, &mut self.unit)?;
        if got < TAG_SIZE {
            return Err(CodecError::TruncatedFile {
                len: got,
                min: TAG_SIZE,
            });
        }
        let is_final = got < self.unit.len();

        let nonce = self.nonces.advance()?;
        let aad = chunk_aad(&self.header, is_final);
        let plaintext = self
            .cipher
            .decrypt(
                Nonce::from_slice(&nonce),
                Payload {
                    msg: &self.unit[..got],
                    aad: &aad,
                },
            )
            .map_err(|_| CodecError::AuthenticationFailed)?;

        if is_final {
            self.state = DecryptState::Finished;
            debug!(chunks = self.nonces.position(), "stream decryption finished");
        }
        Ok(Some(Zeroizing::new(plaintext)))
    }

    /// Decrypt every remaining chunk into `writer`; returns plaintext bytes written.
    pub fn copy_to<W: Write>(mut self, writer: &mut W) -> CodecResult<u64> {
        let mut total = 0u64;
        while let Some(chunk) = self.next_chunk()? {
            writer.write_all(&chunk)?;
            total += chunk.len() as u64;
        }
        writer.flush()?;
        Ok(total)
    }
}

/// Encrypt everything from `reader` into `writer` as a chunked stream.
///
/// Returns the number of plaintext bytes consumed.
pub fn encrypt_stream<R: Read, W: Write>(
    mut reader: R,
    writer: W,
    passphrase: &[u8],
    params: &KdfParams,
    chunk_size: usize,
) -> CodecResult<u64> {
    let mut encryptor = StreamEncryptor::new(writer, passphrase, params, chunk_size)?;
    let copied = io::copy(&mut reader, &mut encryptor).map_err(CodecError::from_io)?;
    encryptor.finish()?;
    Ok(copied)
}

/// Decrypt a chunked stream from `reader` into `writer`.
///
/// Chunks are written as soon as they authenticate, so on failure `writer` may
/// already hold a plaintext prefix. Callers writing to a final destination
/// should stage the output and discard it on error, as
/// [`crate::FileCodec::decrypt_file`] does.
pub fn decrypt_stream<R: Read, W: Write>(
    reader: R,
    mut writer: W,
    passphrase: &[u8],
    params: &KdfParams,
) -> CodecResult<u64> {
    StreamDecryptor::new(reader, passphrase, params)?.copy_to(&mut writer)
}
