//! Validated identity newtypes shared across the MedNet workspace.
//!
//! Every identifier that crosses a crate boundary (tenant keys, acting
//! users, plugin coordinates, patient record ids) is wrapped in a type that
//! validates on construction, so downstream code never re-checks shape.

use std::fmt;
use std::str::FromStr;

/// Errors that can occur when constructing validated identity types.
#[derive(Debug, thiserror::Error)]
pub enum TypeError {
    /// The input was empty or contained only whitespace
    #[error("value cannot be empty")]
    Empty,
    /// The input was not a valid slug (lowercase letters, digits, '-')
    #[error("'{0}' is not a valid slug (lowercase letters, digits and '-' only)")]
    InvalidSlug(String),
    /// The input was not a dotted numeric version
    #[error("'{0}' is not a valid version (expected MAJOR.MINOR.PATCH)")]
    InvalidVersion(String),
    /// The input was not a canonical record id
    #[error("record id must be 32 lowercase hex characters, got: '{0}'")]
    InvalidRecordId(String),
}

fn is_slug(input: &str) -> bool {
    !input.is_empty()
        && !input.starts_with('-')
        && !input.ends_with('-')
        && input
            .bytes()
            .all(|b| matches!(b, b'a'..=b'z' | b'0'..=b'9' | b'-'))
}

/// Reduce a display name to slug form: lowercase, alphanumeric runs joined
/// by single hyphens, everything else dropped.
fn slugify(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut pending_gap = false;

    for ch in name.chars() {
        if ch.is_ascii_alphanumeric() {
            if pending_gap && !out.is_empty() {
                out.push('-');
            }
            pending_gap = false;
            out.push(ch.to_ascii_lowercase());
        } else {
            pending_gap = true;
        }
    }

    out
}

/// A tenant (hospital) key in slug form.
///
/// The slug is the single indexed lookup key for tenant resolution; there is
/// deliberately no secondary lookup by display name or free-form code.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TenantId(String);

impl TenantId {
    /// Wraps an existing slug, rejecting anything not already in slug form.
    pub fn new(input: impl AsRef<str>) -> Result<Self, TypeError> {
        let input = input.as_ref();
        if is_slug(input) {
            Ok(Self(input.to_owned()))
        } else {
            Err(TypeError::InvalidSlug(input.to_owned()))
        }
    }

    /// Derives a tenant id from a human display name ("St. Mary's Hospital"
    /// becomes `st-mary-s-hospital`). Fails if nothing survives slugification.
    pub fn from_display_name(name: &str) -> Result<Self, TypeError> {
        let slug = slugify(name);
        if slug.is_empty() {
            return Err(TypeError::Empty);
        }
        Ok(Self(slug))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// The acting user on whose behalf an operation runs.
///
/// Authentication happens upstream; this is the opaque, non-empty principal
/// string the surrounding application hands us for audit attribution.
#[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ActorId(String);

impl ActorId {
    pub fn new(input: impl AsRef<str>) -> Result<Self, TypeError> {
        let trimmed = input.as_ref().trim();
        if trimmed.is_empty() {
            return Err(TypeError::Empty);
        }
        Ok(Self(trimmed.to_owned()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// A plugin's registry name, in slug form.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PluginName(String);

impl PluginName {
    pub fn new(input: impl AsRef<str>) -> Result<Self, TypeError> {
        let input = input.as_ref();
        if is_slug(input) {
            Ok(Self(input.to_owned()))
        } else {
            Err(TypeError::InvalidSlug(input.to_owned()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// A plugin's semantic version, `MAJOR.MINOR.PATCH`.
///
/// Stored as the original string; ordering compares the numeric components.
#[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PluginVersion(String);

impl PluginVersion {
    pub fn new(input: impl AsRef<str>) -> Result<Self, TypeError> {
        let input = input.as_ref();
        let mut parts = input.split('.');

        let valid = (0..3).all(|_| {
            parts
                .next()
                .is_some_and(|p| !p.is_empty() && p.bytes().all(|b| b.is_ascii_digit()))
        }) && parts.next().is_none();

        if valid {
            Ok(Self(input.to_owned()))
        } else {
            Err(TypeError::InvalidVersion(input.to_owned()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The numeric (major, minor, patch) triple.
    pub fn components(&self) -> (u64, u64, u64) {
        let mut parts = self.0.split('.').map(|p| p.parse::<u64>().unwrap_or(0));
        (
            parts.next().unwrap_or(0),
            parts.next().unwrap_or(0),
            parts.next().unwrap_or(0),
        )
    }
}

/// A patient record id in canonical form: 32 lowercase hex characters.
///
/// This names the durable patient record owned by the surrounding
/// application. MedNet treats it as opaque beyond the canonical-form check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PatientRecordId(uuid::Uuid);

impl PatientRecordId {
    /// Generates a fresh record id.
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }

    /// Validates and wraps an externally supplied record id. Only the
    /// canonical 32-character lowercase hex form is accepted.
    pub fn parse(input: &str) -> Result<Self, TypeError> {
        let canonical = input.len() == 32
            && input
                .bytes()
                .all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'));
        if !canonical {
            return Err(TypeError::InvalidRecordId(input.to_owned()));
        }
        let inner = uuid::Uuid::parse_str(input)
            .map_err(|_| TypeError::InvalidRecordId(input.to_owned()))?;
        Ok(Self(inner))
    }
}

impl Default for PatientRecordId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for PatientRecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.simple())
    }
}

impl FromStr for PatientRecordId {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl serde::Serialize for PatientRecordId {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> serde::Deserialize<'de> for PatientRecordId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        PatientRecordId::parse(&s).map_err(serde::de::Error::custom)
    }
}

macro_rules! string_newtype_conversions {
    ($($ty:ty),+) => {
        $(
            impl TryFrom<String> for $ty {
                type Error = TypeError;

                fn try_from(value: String) -> Result<Self, Self::Error> {
                    Self::new(&value)
                }
            }

            impl From<$ty> for String {
                fn from(value: $ty) -> Self {
                    value.0
                }
            }

            impl FromStr for $ty {
                type Err = TypeError;

                fn from_str(s: &str) -> Result<Self, Self::Err> {
                    Self::new(s)
                }
            }

            impl fmt::Display for $ty {
                fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                    write!(f, "{}", self.0)
                }
            }

            impl AsRef<str> for $ty {
                fn as_ref(&self) -> &str {
                    &self.0
                }
            }
        )+
    };
}

string_newtype_conversions!(TenantId, ActorId, PluginName, PluginVersion);
