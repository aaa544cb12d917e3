//! Medical identifier codec.
//!
//! Every patient in the network is named by a single permanent 5-character
//! code shared by all tenants. This crate owns the *textual* contract for
//! that code: the alphabet, normalisation, structural validation and random
//! candidate generation. It performs no I/O and never consults the
//! uniqueness registry; availability is a separate concern.
//!
//! ## Canonical form
//! - Length: 5
//! - Characters: uppercase letters and digits, excluding the visually
//!   ambiguous `I`, `L`, `O`, `0` and `1`
//! - Example: `A3TV2`
//!
//! The alphabet has 31 symbols, giving 31^5 (about 28.6 million) possible
//! codes. Codes are written on wristbands and read over the phone, which is
//! why the ambiguous characters are excluded rather than the space being
//! maximised.
//!
//! Notes:
//! - [`MedicalId::format`] is the lenient entry point for human input: it
//!   uppercases and strips separators before checking shape.
//! - [`MedicalId::validate`] is the strict structural predicate used when a
//!   value is already expected to be canonical.

mod code;

pub use code::{MedicalId, ALPHABET, CODE_LENGTH};

/// Error type for medical identifier operations.
#[derive(Debug, thiserror::Error)]
pub enum MedicalIdError {
    /// The input could not be reduced to a canonical 5-character code
    #[error("invalid medical identifier: '{0}'")]
    InvalidFormat(String),
}

/// Result type for medical identifier operations.
pub type MedicalIdResult<T> = Result<T, MedicalIdError>;
