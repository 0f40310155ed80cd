use thiserror::Error;

use crate::codec::CodecError;

/// Recoverable failures surfaced by the library.
///
/// Shape violations (mismatched matrix dimensions, out-of-range indices) are
/// programming errors, not members of this enum; the kernels assert on them.
#[derive(Debug, Error)]
pub enum PirError {
    /// The OS entropy source could not be read.
    #[error("failed to read entropy from the operating system")]
    BadRandomness,

    /// No row of the LWE parameter table satisfies the request.
    #[error("no LWE parameters for logq={logq} supporting {m} samples")]
    NoParams { logq: u64, m: usize },

    /// The plaintext modulus does not fit in the packed-column basis.
    #[error("plaintext modulus {p} exceeds 2^{basis}; cannot squish")]
    CannotSquish { p: u64, basis: u64 },

    /// The requested database shape is outside what the LHE flavor supports.
    #[error("unsupported LHE configuration: {0}")]
    NotSupported(&'static str),

    /// Serialization failure.
    #[error(transparent)]
    Codec(#[from] CodecError),
}
