//! Internal implementation of the medical identifier type.

use crate::{MedicalIdError, MedicalIdResult};
use rand::Rng;
use std::{fmt, str::FromStr};

/// The restricted identifier alphabet.
///
/// Uppercase letters and digits with `I`, `L`, `O`, `0` and `1` removed.
pub const ALPHABET: &[u8] = b"ABCDEFGHJKMNPQRSTUVWXYZ23456789";

/// Canonical code length.
pub const CODE_LENGTH: usize = 5;

fn in_alphabet(byte: u8) -> bool {
    ALPHABET.contains(&byte)
}

/// A patient's permanent network-wide identifier in canonical form.
///
/// Once constructed, the contained code is guaranteed to be exactly
/// [`CODE_LENGTH`] characters drawn from [`ALPHABET`]. The type says nothing
/// about ownership: whether a code is bound to a patient is decided solely
/// by the uniqueness registry.
///
/// # Construction
/// - [`MedicalId::format`] normalises human input (case, separators).
/// - [`MedicalId::random`] draws a uniform candidate for the allocator.
///
/// # Display format
/// Always the canonical 5-character uppercase form.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MedicalId(String);

impl MedicalId {
    /// Normalises raw input into a canonical identifier.
    ///
    /// Uppercases the input and strips every character outside the
    /// identifier alphabet (separators, whitespace, and the excluded
    /// ambiguous characters all disappear). The result must be exactly
    /// [`CODE_LENGTH`] characters.
    ///
    /// Normalisation is idempotent: formatting an already-canonical code
    /// returns it unchanged.
    ///
    /// # Errors
    ///
    /// Returns [`MedicalIdError::InvalidFormat`] if anything other than
    /// exactly five alphabet characters remains.
    pub fn format(raw: &str) -> MedicalIdResult<Self> {
        let mut canonical = String::with_capacity(CODE_LENGTH);

        for ch in raw.chars() {
            let upper = ch.to_ascii_uppercase();
            if upper.is_ascii() && in_alphabet(upper as u8) {
                if canonical.len() == CODE_LENGTH {
                    // Already too long; fail with the original input intact.
                    return Err(MedicalIdError::InvalidFormat(raw.to_owned()));
                }
                canonical.push(upper);
            }
        }

        if canonical.len() != CODE_LENGTH {
            return Err(MedicalIdError::InvalidFormat(raw.to_owned()));
        }

        Ok(Self(canonical))
    }

    /// Returns true if `candidate` is already in canonical form.
    ///
    /// This is a purely structural check (length and alphabet membership)
    /// with no normalisation and no registry lookup.
    pub fn validate(candidate: &str) -> bool {
        candidate.len() == CODE_LENGTH && candidate.bytes().all(in_alphabet)
    }

    /// Draws a uniformly random candidate code.
    ///
    /// This is the allocator's candidate source. A random draw says nothing
    /// about availability; the caller must still win an atomic claim against
    /// the uniqueness registry.
    pub fn random(rng: &mut impl Rng) -> Self {
        let code = (0..CODE_LENGTH)
            .map(|_| ALPHABET[rng.gen_range(0..ALPHABET.len())] as char)
            .collect();
        Self(code)
    }

    /// Returns the canonical code as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MedicalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for MedicalId {
    type Err = MedicalIdError;

    /// Parses via [`MedicalId::format`], so CLI and API input get the same
    /// normalisation as every other entry point.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        MedicalId::format(s)
    }
}

impl AsRef<str> for MedicalId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(feature = "serde")]
impl serde::Serialize for MedicalId {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.0)
    }
}

#[cfg(feature = "serde")]
impl<'de> serde::Deserialize<'de> for MedicalId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        MedicalId::format(&s).map_err(serde::de::Error::custom)
    }
}
