//! Crate-wide error type, client- and configuration-facing.
//!
//! Decryption failures on the server side are deliberately *not* part of
//! this type: per the propagation rule, an AEAD mismatch is folded into
//! the `grease` outcome and never surfaces as an `Err` (see
//! [`crate::decrypt::DecryptOutcome`]).

use std::fmt;

/// Something that can go wrong building, parsing, or applying ECH state.
#[derive(Debug)]
pub enum EchError {
    /// RR bytes malformed, length prefixes inconsistent, or a recognized
    /// version's body was truncated.
    InvalidEncoding(std::io::Error),

    /// A PEM path named by `enable_from_pem` does not exist. Not fatal to
    /// the caller — reported upstream so the caller can decide whether to
    /// retry later.
    FileMissing(std::path::PathBuf),

    /// None of the offered configs had a suite this HPKE backend supports.
    NoCompatibleConfig,

    /// An HPKE `Seal`/`Open` call, or the HKDF accept-confirmation
    /// derivation, failed.
    CryptoFailed(crate::hpke_suite::HpkeError),

    /// An assertion violation: buffer overrun, or a state the builder
    /// should never be able to reach. Fatal.
    InternalInvariant(&'static str),

    /// A malformed inner extension body was found post-decompression.
    /// Maps to the TLS `decode_error` alert.
    BadExtension(&'static str),

    /// The PEM file did not contain exactly one `PRIVATE KEY` block
    /// followed by one `ECHCONFIG` block.
    MalformedPem(&'static str),
}

impl fmt::Display for EchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidEncoding(e) => write!(f, "invalid ECH encoding: {}", e),
            Self::FileMissing(path) => write!(f, "ECH key file missing: {}", path.display()),
            Self::NoCompatibleConfig => f.write_str("no offered ECHConfig has a supported suite"),
            Self::CryptoFailed(e) => write!(f, "HPKE operation failed: {}", e),
            Self::InternalInvariant(msg) => write!(f, "internal invariant violated: {}", msg),
            Self::BadExtension(msg) => write!(f, "malformed extension: {}", msg),
            Self::MalformedPem(msg) => write!(f, "malformed ECH PEM file: {}", msg),
        }
    }
}

impl std::error::Error for EchError {}

impl From<std::io::Error> for EchError {
    fn from(inner: std::io::Error) -> Self {
        Self::InvalidEncoding(inner)
    }
}

impl From<crate::hpke_suite::HpkeError> for EchError {
    fn from(inner: crate::hpke_suite::HpkeError) -> Self {
        Self::CryptoFailed(inner)
    }
}
