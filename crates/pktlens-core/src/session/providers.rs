//! Collaborators injected into the session store.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use super::CaptureFile;

/// Opaque identifier shared by a capture file and its session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(Uuid);

impl SessionId {
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for SessionId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// Source of upload and parse instants.
pub trait Clock: Send + Sync {
    fn now(&self) -> OffsetDateTime;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> OffsetDateTime {
        OffsetDateTime::now_utc()
    }
}

/// Source of fresh session identifiers.
pub trait IdGenerator: Send + Sync {
    fn next_id(&self) -> SessionId;
}

/// Random (v4) identifiers.
#[derive(Debug, Default, Clone, Copy)]
pub struct UuidGenerator;

impl IdGenerator for UuidGenerator {
    fn next_id(&self) -> SessionId {
        SessionId(Uuid::new_v4())
    }
}

/// File-storage collaborator told when a session's bytes may be released.
///
/// Called after the session has left the store, so no reader can observe a
/// session whose bytes are gone.
pub trait StorageRelease: Send + Sync {
    fn release(&self, file: &CaptureFile);
}

/// Release hook for callers that keep no bytes outside the store.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopRelease;

impl StorageRelease for NoopRelease {
    fn release(&self, _file: &CaptureFile) {}
}

#[cfg(test)]
mod tests {
    use super::{IdGenerator, SessionId, UuidGenerator};

    #[test]
    fn ids_round_trip_through_text() {
        let id = UuidGenerator.next_id();
        let parsed: SessionId = id.to_string().parse().unwrap();
        assert_eq!(parsed, id);
        assert!("not-a-uuid".parse::<SessionId>().is_err());
    }

    #[test]
    fn ids_serialize_as_plain_strings() {
        let id = UuidGenerator.next_id();
        let value = serde_json::to_value(id).unwrap();
        assert_eq!(value, serde_json::Value::String(id.to_string()));
    }
}
