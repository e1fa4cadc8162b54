//! Identity data shared between gateways and the session layer.

use serde::{Deserialize, Serialize};

/// An authenticated principal as reported by the identity provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Identity {
    /// Opaque unique id (Firebase `localId`).
    pub uid: String,
    /// Display name, if the account has one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    /// Email address, if known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    /// Avatar URL, if set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub photo_url: Option<String>,
    /// Sign-in provider (`password`, `google.com`, ...).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider_id: Option<String>,
    /// Provider-specific payload, passed through untouched.
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub metadata: serde_json::Value,
}

impl Identity {
    /// Create an identity with only a uid.
    pub fn new(uid: impl Into<String>) -> Self {
        Self {
            uid: uid.into(),
            display_name: None,
            email: None,
            photo_url: None,
            provider_id: None,
            metadata: serde_json::Value::Null,
        }
    }

    /// Builder-style email setter.
    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    /// Builder-style display name setter.
    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = Some(name.into());
        self
    }

    /// Builder-style provider setter.
    pub fn with_provider(mut self, provider_id: impl Into<String>) -> Self {
        self.provider_id = Some(provider_id.into());
        self
    }

    /// Return a copy with every field present in `patch` overwritten.
    pub fn merged(&self, patch: &ProfilePatch) -> Self {
        let mut merged = self.clone();
        if let Some(name) = &patch.display_name {
            merged.display_name = Some(name.clone());
        }
        if let Some(photo) = &patch.photo_url {
            merged.photo_url = Some(photo.clone());
        }
        merged
    }
}

/// Profile fields a user may change.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfilePatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub photo_url: Option<String>,
}

impl ProfilePatch {
    /// Patch that only sets the display name.
    pub fn display_name(name: impl Into<String>) -> Self {
        Self {
            display_name: Some(name.into()),
            photo_url: None,
        }
    }

    /// True when the patch changes nothing.
    pub fn is_empty(&self) -> bool {
        self.display_name.is_none() && self.photo_url.is_none()
    }
}

/// How a federated sign-in request completed at the gateway.
///
/// Popup flows finish inside the call; redirect flows leave the page and the
/// identity arrives later via the session stream or the pending redirect check.
#[derive(Debug, Clone, PartialEq)]
pub enum FederatedCompletion {
    Immediate(Identity),
    Deferred,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merged_overwrites_only_present_fields() {
        let identity = Identity::new("u1")
            .with_email("a@example.com")
            .with_display_name("Old");
        let merged = identity.merged(&ProfilePatch::display_name("New"));

        assert_eq!(merged.display_name.as_deref(), Some("New"));
        assert_eq!(merged.email.as_deref(), Some("a@example.com"));
        assert!(merged.photo_url.is_none());
    }

    #[test]
    fn test_empty_patch() {
        assert!(ProfilePatch::default().is_empty());
        assert!(!ProfilePatch::display_name("x").is_empty());
    }

    #[test]
    fn test_identity_serializes_without_empty_fields() {
        let json = serde_json::to_value(Identity::new("u1")).unwrap();
        assert_eq!(json, serde_json::json!({ "uid": "u1" }));
    }
}
