//! Message header: the envelope carrying routing and identity metadata
//!
//! Every message instance owns exactly one header. The UUID is assigned at
//! construction and stable for the lifetime of the instance; publish-time
//! fields stay unset until `stamp_for_publish`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::MessageError;

/// Reserved wire-envelope key under which the header is embedded.
pub const HEADER_KEY: &str = "_sm_header";

/// Reserved prefix; user property names may not start with this.
pub const RESERVED_PREFIX: &str = "_sm_";

/// Routing and identity metadata for one message instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Header {
    /// Unique per message instance, assigned at construction.
    pub uuid: Uuid,
    /// Fully qualified message class name.
    pub message_class: String,
    /// Schema version declared by the message class.
    pub version: u32,
    /// Set at publish time, `None` before.
    #[serde(default)]
    pub published_at: Option<DateTime<Utc>>,
    /// Publishing process id, set at publish time.
    #[serde(default)]
    pub publisher_pid: Option<u32>,
    /// Sender identity. Required to publish.
    #[serde(default)]
    pub from: Option<String>,
    /// Recipient identity. `None` denotes broadcast.
    #[serde(default)]
    pub to: Option<String>,
    /// Address for responses.
    #[serde(default)]
    pub reply_to: Option<String>,
    /// Name of the serializer used for the payload, set at publish.
    #[serde(default)]
    pub serializer: Option<String>,
}

impl Header {
    /// Creates a header with a fresh UUID and unset publish-time fields.
    #[must_use]
    pub fn new(message_class: impl Into<String>, version: u32) -> Self {
        Self {
            uuid: Uuid::new_v4(),
            message_class: message_class.into(),
            version,
            published_at: None,
            publisher_pid: None,
            from: None,
            to: None,
            reply_to: None,
            serializer: None,
        }
    }

    /// Fills the publish-time fields. A re-publish resets all three.
    pub fn stamp_for_publish(&mut self, serializer_name: &str) {
        self.published_at = Some(Utc::now());
        self.publisher_pid = Some(std::process::id());
        self.serializer = Some(serializer_name.to_string());
    }

    /// Checks the publish-time invariants.
    ///
    /// # Errors
    ///
    /// `MissingFrom` when `from` is unset or empty, `InvalidVersion` when the
    /// version is zero.
    pub fn validate(&self) -> Result<(), MessageError> {
        match self.from.as_deref() {
            Some(from) if !from.is_empty() => {}
            _ => return Err(MessageError::MissingFrom),
        }
        if self.version == 0 {
            return Err(MessageError::InvalidVersion {
                version: self.version,
            });
        }
        Ok(())
    }

    /// Whether this message is addressed to everyone.
    #[must_use]
    pub fn is_broadcast(&self) -> bool {
        self.to.is_none()
    }
}
