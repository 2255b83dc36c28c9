use derive_more::{Deref, Display, FromStr};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error as ThisError;
use time::{OffsetDateTime, format_description::well_known::Rfc3339};
use ulid::Ulid;

///
/// RecordIdError
///

#[derive(Debug, ThisError)]
pub enum RecordIdError {
    #[error("invalid record id string: '{value}'")]
    InvalidString { value: String },
}

///
/// RecordId
///
/// Identity of a persisted backing record. ULIDs are lexicographically
/// sortable and carry their creation time, which keeps collection iteration
/// in ingest order for free.
///

#[derive(
    Clone, Copy, Debug, Deref, Display, Eq, FromStr, Hash, Ord, PartialEq, PartialOrd, Default,
)]
#[repr(transparent)]
pub struct RecordId(Ulid);

impl RecordId {
    /// Generate a fresh id with the current timestamp and random entropy.
    #[must_use]
    pub fn generate() -> Self {
        Self(Ulid::new())
    }

    #[must_use]
    pub const fn nil() -> Self {
        Self(Ulid::nil())
    }

    #[must_use]
    pub const fn is_nil(&self) -> bool {
        self.0.is_nil()
    }

    pub fn parse(encoded: &str) -> Result<Self, RecordIdError> {
        Ulid::from_string(encoded)
            .map(Self)
            .map_err(|_| RecordIdError::InvalidString {
                value: encoded.to_string(),
            })
    }
}

impl From<Ulid> for RecordId {
    fn from(ulid: Ulid) -> Self {
        Self(ulid)
    }
}

impl Serialize for RecordId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0.to_string())
    }
}

impl<'de> Deserialize<'de> for RecordId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        Self::parse(&encoded).map_err(serde::de::Error::custom)
    }
}

///
/// Timestamp
/// (seconds since the Unix epoch)
///

#[derive(
    Clone,
    Copy,
    Debug,
    Default,
    Deserialize,
    Display,
    Eq,
    Hash,
    Ord,
    PartialEq,
    PartialOrd,
    Serialize,
)]
#[repr(transparent)]
pub struct Timestamp(u64);

impl Timestamp {
    pub const EPOCH: Self = Self(u64::MIN);
    pub const MAX: Self = Self(u64::MAX);

    /// Current wall-clock time, truncated to seconds.
    #[must_use]
    pub fn now() -> Self {
        let secs = OffsetDateTime::now_utc().unix_timestamp();
        Self(u64::try_from(secs).unwrap_or(u64::MIN))
    }

    #[must_use]
    pub const fn from_seconds(secs: u64) -> Self {
        Self(secs)
    }

    #[must_use]
    pub const fn as_seconds(&self) -> u64 {
        self.0
    }

    /// RFC 3339 rendering; falls back to the raw second count for values
    /// outside the representable calendar range.
    #[must_use]
    pub fn to_rfc3339(&self) -> String {
        i64::try_from(self.0)
            .ok()
            .and_then(|secs| OffsetDateTime::from_unix_timestamp(secs).ok())
            .and_then(|dt| dt.format(&Rfc3339).ok())
            .unwrap_or_else(|| self.0.to_string())
    }
}

///
/// CollectionNameError
///

#[derive(Debug, ThisError)]
pub enum CollectionNameError {
    #[error("collection name must be non-empty")]
    Empty,

    #[error("collection name must not start with an underscore: '{name}'")]
    Reserved { name: String },
}

///
/// CollectionName
///
/// Name of a dataset's backing collection. Underscore-prefixed names are
/// reserved for internal collections.
///

#[derive(
    Clone, Debug, Deref, Deserialize, Display, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize,
)]
#[repr(transparent)]
pub struct CollectionName(String);

impl CollectionName {
    pub fn new(name: impl Into<String>) -> Result<Self, CollectionNameError> {
        let name = name.into();

        if name.is_empty() {
            return Err(CollectionNameError::Empty);
        }
        if name.starts_with('_') {
            return Err(CollectionNameError::Reserved { name });
        }

        Ok(Self(name))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

///
/// TESTS
///
