use thiserror::Error;

pub type CodecResult<T> = Result<T, CodecError>;

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("random source unavailable: {0}")]
    RandomSource(String),

    #[error("encrypted file truncated: {len} bytes (minimum {min})")]
    TruncatedFile { len: usize, min: usize },

    /// Wrong passphrase and tampered ciphertext are reported identically.
    #[error("authentication failed: wrong passphrase or corrupted data")]
    AuthenticationFailed,

    #[error("unsupported format tag")]
    UnsupportedFormat,

    #[error("invalid header: {0}")]
    InvalidHeader(String),

    #[error("invalid parameters: {0}")]
    InvalidParams(String),

    #[error("encryption failed: {0}")]
    Encrypt(String),

    #[error("chunk counter exhausted")]
    CounterExhausted,

    /// A stream session is unusable once any chunk has failed.
    #[error("stream aborted by an earlier error")]
    StreamAborted,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl CodecError {
    /// Unwrap a codec error that was tunnelled through `std::io::Error`
    /// by the `Write` impl of the stream encryptor.
    pub(crate) fn from_io(err: std::io::Error) -> Self {
        if err.get_ref().is_some_and(|inner| inner.is::<CodecError>()) {
            match err.into_inner().map(|inner| inner.downcast::<CodecError>()) {
                Some(Ok(codec)) => *codec,
                Some(Err(other)) => Self::Io(std::io::Error::other(other)),
                None => Self::Io(std::io::Error::other("unknown I/O error")),
            }
        } else {
            Self::Io(err)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncated_display() {
        let err = CodecError::TruncatedFile { len: 3, min: 49 };
        assert_eq!(
            err.to_string(),
            "encrypted file truncated: 3 bytes (minimum 49)"
        );
    }

    #[test]
    fn test_auth_message_does_not_name_cause() {
        let msg = CodecError::AuthenticationFailed.to_string();
        assert!(msg.contains("wrong passphrase or corrupted data"));
    }

    #[test]
    fn test_from_io_unwraps_codec_error() {
        let io = std::io::Error::other(CodecError::CounterExhausted);
        assert!(matches!(
            CodecError::from_io(io),
            CodecError::CounterExhausted
        ));
    }

    #[test]
    fn test_from_io_keeps_plain_io() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        assert!(matches!(CodecError::from_io(io), CodecError::Io(_)));
    }
}
