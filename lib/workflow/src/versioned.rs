//! Versioned wrapper for published payloads.
//!
//! Everything sent to an external subscriber is wrapped as
//! `{version, payload}` so consumers can detect schema changes before
//! decoding the payload.

use serde::{Deserialize, Serialize};

/// The current payload format version.
pub const CURRENT_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Versioned<T> {
    pub version: u32,
    pub payload: T,
}

impl<T> Versioned<T> {
    /// Wraps `payload` with the current version.
    #[must_use]
    pub fn new(payload: T) -> Self {
        Self {
            version: CURRENT_VERSION,
            payload,
        }
    }

    #[must_use]
    pub fn into_payload(self) -> T {
        self.payload
    }

    #[must_use]
    pub fn is_current_version(&self) -> bool {
        self.version == CURRENT_VERSION
    }
}

impl<T: Serialize> Versioned<T> {
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_json_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }
}

impl<T: for<'de> Deserialize<'de>> Versioned<T> {
    /// # Errors
    ///
    /// Returns an error if the bytes are not a versioned `T`.
    pub fn from_json_bytes(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }
}

/// Reads only the version of a wrapped payload.
///
/// # Errors
///
/// Returns an error if the bytes carry no numeric `version` field.
pub fn peek_version(bytes: &[u8]) -> Result<u32, serde_json::Error> {
    #[derive(Deserialize)]
    struct Header {
        version: u32,
    }

    serde_json::from_slice::<Header>(bytes).map(|h| h.version)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instance::BearerRef;
    use crate::notify::{BearerEvent, Notification};
    use reportek_core::EnvelopeId;

    #[test]
    fn wraps_notification_with_version() {
        let bearer = BearerRef::Envelope(EnvelopeId::new());
        let n = Notification::new(bearer, BearerEvent::CompletedAutoQa, serde_json::json!({}));
        let wrapped = Versioned::new(n.clone());
        assert!(wrapped.is_current_version());

        let json = serde_json::to_value(&wrapped).expect("to_value");
        assert_eq!(json["version"], CURRENT_VERSION);
        assert_eq!(json["payload"]["topic"], "envelope.completed_auto_qa");

        let bytes = wrapped.to_json_bytes().expect("serialize");
        assert_eq!(peek_version(&bytes).expect("version"), CURRENT_VERSION);
        let parsed: Versioned<Notification> = Versioned::from_json_bytes(&bytes).expect("parse");
        assert_eq!(parsed.into_payload(), n);
    }

    #[test]
    fn peek_version_rejects_unversioned() {
        assert!(peek_version(br#"{"payload": 1}"#).is_err());
    }
}
