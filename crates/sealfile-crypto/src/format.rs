//! On-disk header layout, format tags, and randomness for salts/nonces
//!
//! ```text
//! whole-file: "ENCv1" || salt (16) || nonce (12)
//! stream:     "ENCs1" || salt (16) || base nonce (12) || chunk_size (u32 BE)
//! ```
//!
//! The header is authenticated as AAD by every sealed unit that follows it.

use std::io::Read;

use rand::rngs::OsRng;
use rand::RngCore;

use crate::error::{CodecError, CodecResult};
use crate::{MAX_CHUNK_SIZE, NONCE_SIZE, SALT_SIZE, TAG_SIZE};

/// Format tag for whole-file encryption
pub const WHOLE_FILE_TAG: &[u8; FORMAT_TAG_LEN] = b"ENCv1";

/// Format tag for chunked streaming encryption
pub const STREAM_TAG: &[u8; FORMAT_TAG_LEN] = b"ENCs1";

pub const FORMAT_TAG_LEN: usize = 5;

/// tag || salt || nonce
pub const WHOLE_FILE_HEADER_LEN: usize = FORMAT_TAG_LEN + SALT_SIZE + NONCE_SIZE;

/// tag || salt || base nonce || chunk_size
pub const STREAM_HEADER_LEN: usize = WHOLE_FILE_HEADER_LEN + 4;

/// Smallest valid whole-file ciphertext: header plus an empty sealed message
pub const MIN_WHOLE_FILE_LEN: usize = WHOLE_FILE_HEADER_LEN + TAG_SIZE;

/// Which framing a file uses, identified by its leading tag
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormatKind {
    WholeFile,
    Stream,
}

impl FormatKind {
    pub fn tag(self) -> &'static [u8; FORMAT_TAG_LEN] {
        match self {
            Self::WholeFile => WHOLE_FILE_TAG,
            Self::Stream => STREAM_TAG,
        }
    }

    pub fn header_len(self) -> usize {
        match self {
            Self::WholeFile => WHOLE_FILE_HEADER_LEN,
            Self::Stream => STREAM_HEADER_LEN,
        }
    }

    fn from_tag(tag: &[u8]) -> CodecResult<Self> {
        if tag == WHOLE_FILE_TAG {
            Ok(Self::WholeFile)
        } else if tag == STREAM_TAG {
            Ok(Self::Stream)
        } else {
            Err(CodecError::UnsupportedFormat)
        }
    }
}

impl std::fmt::Display for FormatKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::WholeFile => write!(f, "whole-file"),
            Self::Stream => write!(f, "stream"),
        }
    }
}

/// Parsed file header
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    pub kind: FormatKind,
    pub salt: [u8; SALT_SIZE],
    /// The message nonce (whole-file) or the base nonce chunk nonces derive from (stream)
    pub nonce: [u8; NONCE_SIZE],
    /// Plaintext bytes per full chunk; `None` for whole-file
    pub chunk_size: Option<u32>,
}

impl Header {
    /// New whole-file header with a fresh salt and nonce.
    pub(crate) fn generate_whole_file() -> CodecResult<Self> {
        Self::generate(FormatKind::WholeFile, None)
    }

    /// New stream header with a fresh salt and base nonce.
    pub(crate) fn generate_stream(chunk_size: usize) -> CodecResult<Self> {
        let chunk_size = validate_chunk_size(chunk_size).map_err(CodecError::InvalidParams)?;
        Self::generate(FormatKind::Stream, Some(chunk_size))
    }

    fn generate(kind: FormatKind, chunk_size: Option<u32>) -> CodecResult<Self> {
        let mut salt = [0u8; SALT_SIZE];
        fill_random(&mut salt)?;
        let mut nonce = [0u8; NONCE_SIZE];
        fill_random(&mut nonce)?;
        Ok(Self {
            kind,
            salt,
            nonce,
            chunk_size,
        })
    }

    pub fn encoded_len(&self) -> usize {
        self.kind.header_len()
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.encoded_len());
        out.extend_from_slice(self.kind.tag());
        out.extend_from_slice(&self.salt);
        out.extend_from_slice(&self.nonce);
        if let Some(chunk_size) = self.chunk_size {
            out.extend_from_slice(&chunk_size.to_be_bytes());
        }
        out
    }

    /// Parse a header from the start of `data`.
    ///
    /// Length is checked before the tag, so any input shorter than
    /// tag + salt + nonce is reported as truncated.
    pub fn parse(data: &[u8]) -> CodecResult<Self> {
        if data.len() < WHOLE_FILE_HEADER_LEN {
            return Err(CodecError::TruncatedFile {
                len: data.len(),
                min: WHOLE_FILE_HEADER_LEN,
            });
        }
        let kind = FormatKind::from_tag(&data[..FORMAT_TAG_LEN])?;
        if data.len() < kind.header_len() {
            return Err(CodecError::TruncatedFile {
                len: data.len(),
                min: kind.header_len(),
            });
        }

        let mut salt = [0u8; SALT_SIZE];
        salt.copy_from_slice(&data[FORMAT_TAG_LEN..FORMAT_TAG_LEN + SALT_SIZE]);
        let mut nonce = [0u8; NONCE_SIZE];
        nonce.copy_from_slice(&data[FORMAT_TAG_LEN + SALT_SIZE..WHOLE_FILE_HEADER_LEN]);

        let chunk_size = match kind {
            FormatKind::WholeFile => None,
            FormatKind::Stream => {
                let mut raw = [0u8; 4];
                raw.copy_from_slice(&data[WHOLE_FILE_HEADER_LEN..STREAM_HEADER_LEN]);
                let size = u32::from_be_bytes(raw) as usize;
                Some(validate_chunk_size(size).map_err(CodecError::InvalidHeader)?)
            }
        };

        Ok(Self {
            kind,
            salt,
            nonce,
            chunk_size,
        })
    }

    /// Read and parse a header from the front of a stream.
    pub(crate) fn read_from<R: Read>(reader: &mut R) -> CodecResult<Self> {
        let mut buf = [0u8; STREAM_HEADER_LEN];
        let got = read_full(reader, &mut buf[..WHOLE_FILE_HEADER_LEN])?;
        if got < WHOLE_FILE_HEADER_LEN {
            return Self::parse(&buf[..got]);
        }
        match FormatKind::from_tag(&buf[..FORMAT_TAG_LEN])? {
            FormatKind::WholeFile => Self::parse(&buf[..WHOLE_FILE_HEADER_LEN]),
            FormatKind::Stream => {
                let rest = read_full(reader, &mut buf[WHOLE_FILE_HEADER_LEN..])?;
                Self::parse(&buf[..WHOLE_FILE_HEADER_LEN + rest])
            }
        }
    }
}

/// What `inspect` can tell about an encrypted file without the passphrase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderInfo {
    pub header: Header,
    /// Bytes following the header (ciphertext and tags)
    pub payload_len: usize,
}

/// Parse the header of an encrypted file without decrypting anything.
pub fn inspect(data: &[u8]) -> CodecResult<HeaderInfo> {
    let header = Header::parse(data)?;
    let payload_len = data.len() - header.encoded_len();
    Ok(HeaderInfo {
        header,
        payload_len,
    })
}

fn validate_chunk_size(size: usize) -> Result<u32, String> {
    if size == 0 || size > MAX_CHUNK_SIZE {
        return Err(format!(
            "chunk size {size} out of range (1..={MAX_CHUNK_SIZE})"
        ));
    }
    u32::try_from(size).map_err(|_| format!("chunk size {size} does not fit in u32"))
}

/// Fill `buf` from the OS CSPRNG. There is no fallback source.
pub(crate) fn fill_random(buf: &mut [u8]) -> CodecResult<()> {
    OsRng
        .try_fill_bytes(buf)
        .map_err(|e| CodecError::RandomSource(e.to_string()))
}

/// Read until `buf` is full or the reader is at EOF; returns bytes read.
pub(crate) fn read_full<R: Read>(reader: &mut R, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_lengths() {
        assert_eq!(WHOLE_FILE_HEADER_LEN, 33);
        assert_eq!(STREAM_HEADER_LEN, 37);
        assert_eq!(MIN_WHOLE_FILE_LEN, 49);
    }

    #[test]
    fn test_whole_file_header_parse() {
        let header = Header::generate_whole_file().unwrap();
        let bytes = header.to_bytes();
        assert_eq!(bytes.len(), WHOLE_FILE_HEADER_LEN);
        assert_eq!(&bytes[..5], b"ENCv1");
        assert_eq!(Header::parse(&bytes).unwrap(), header);
    }

    #[test]
    fn test_stream_header_parse() {
        let header = Header::generate_stream(4096).unwrap();
        let bytes = header.to_bytes();
        assert_eq!(bytes.len(), STREAM_HEADER_LEN);
        assert_eq!(&bytes[..5], b"ENCs1");
        assert_eq!(&bytes[33..], &4096u32.to_be_bytes());
        assert_eq!(Header::parse(&bytes).unwrap(), header);
    }

    #[test]
    fn test_fresh_salt_and_nonce() {
        let a = Header::generate_whole_file().unwrap();
        let b = Header::generate_whole_file().unwrap();
        assert_ne!(a.salt, b.salt);
        assert_ne!(a.nonce, b.nonce);
    }

    #[test]
    fn test_short_input_is_truncated() {
        for len in [0, 1, 4, 5, 27, 28, 32] {
            let data = vec![0u8; len];
            let err = Header::parse(&data).unwrap_err();
            assert!(
                matches!(err, CodecError::TruncatedFile { .. }),
                "len {len} should be truncated, got {err:?}"
            );
        }
    }

    #[test]
    fn test_short_stream_header_is_truncated() {
        let bytes = Header::generate_stream(64).unwrap().to_bytes();
        let err = Header::parse(&bytes[..STREAM_HEADER_LEN - 1]).unwrap_err();
        assert!(matches!(
            err,
            CodecError::TruncatedFile { len: 36, min: 37 }
        ));
    }

    #[test]
    fn test_unknown_tag_rejected() {
        let mut bytes = Header::generate_whole_file().unwrap().to_bytes();
        bytes[3] = b'x';
        assert!(matches!(
            Header::parse(&bytes),
            Err(CodecError::UnsupportedFormat)
        ));
    }

    #[test]
    fn test_bad_chunk_size_rejected() {
        let mut bytes = Header::generate_stream(64).unwrap().to_bytes();
        bytes[33..].copy_from_slice(&0u32.to_be_bytes());
        assert!(matches!(
            Header::parse(&bytes),
            Err(CodecError::InvalidHeader(_))
        ));

        bytes[33..].copy_from_slice(&u32::MAX.to_be_bytes());
        assert!(matches!(
            Header::parse(&bytes),
            Err(CodecError::InvalidHeader(_))
        ));
    }

    #[test]
    fn test_generate_stream_rejects_zero_chunk() {
        assert!(matches!(
            Header::generate_stream(0),
            Err(CodecError::InvalidParams(_))
        ));
    }

    #[test]
    fn test_read_from_stream() {
        let header = Header::generate_stream(512).unwrap();
        let mut bytes = header.to_bytes();
        bytes.extend_from_slice(b"payload");
        let mut cursor = std::io::Cursor::new(bytes);
        assert_eq!(Header::read_from(&mut cursor).unwrap(), header);
        assert_eq!(cursor.position(), STREAM_HEADER_LEN as u64);
    }

    #[test]
    fn test_read_from_short_reader() {
        let mut cursor = std::io::Cursor::new(b"ENCs1abc".to_vec());
        assert!(matches!(
            Header::read_from(&mut cursor),
            Err(CodecError::TruncatedFile { len: 8, .. })
        ));
    }

    #[test]
    fn test_inspect_reports_payload() {
        let header = Header::generate_whole_file().unwrap();
        let mut bytes = header.to_bytes();
        bytes.extend_from_slice(&[0u8; 20]);
        let info = inspect(&bytes).unwrap();
        assert_eq!(info.header.kind, FormatKind::WholeFile);
        assert_eq!(info.payload_len, 20);
    }
}
