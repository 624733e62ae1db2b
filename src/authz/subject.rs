use crate::error::StoreError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use uuid::Uuid;

/// The authenticated user being checked: roles plus explicit permission
/// grants. Built per request and dropped with it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorizationSubject {
    pub user_id: Uuid,
    /// Free-text role names, in assignment order
    #[serde(default)]
    pub roles: Vec<String>,
    /// Fine-grained capability strings such as `calls.view`
    #[serde(default)]
    pub permissions: BTreeSet<String>,
}

impl AuthorizationSubject {
    pub fn new(user_id: Uuid) -> Self {
        Self {
            user_id,
            roles: Vec::new(),
            permissions: BTreeSet::new(),
        }
    }

    pub fn with_roles<I, S>(mut self, roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.roles.extend(roles.into_iter().map(Into::into));
        self
    }

    pub fn with_permissions<I, S>(mut self, permissions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.permissions
            .extend(permissions.into_iter().map(Into::into));
        self
    }

    pub fn has_permission(&self, permission: &str) -> bool {
        self.permissions.contains(permission)
    }

    /// Decode a session payload: `{"user_id": "...", "roles": [...], "permissions": [...]}`.
    pub fn from_session_json(payload: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(payload)
    }
}

/// Resolves who is making the current request.
pub trait SubjectSource {
    /// `Ok(None)` means there is no valid session.
    fn current_subject(&self) -> Result<Option<AuthorizationSubject>, StoreError>;
}

/// A subject already resolved by the surrounding session layer.
#[derive(Debug, Clone, Default)]
pub struct StaticSubject(pub Option<AuthorizationSubject>);

impl SubjectSource for StaticSubject {
    fn current_subject(&self) -> Result<Option<AuthorizationSubject>, StoreError> {
        Ok(self.0.clone())
    }
}

/// A raw JSON session payload. An absent or undecodable payload is no
/// session at all.
#[derive(Debug, Clone, Default)]
pub struct SessionPayload(pub Option<String>);

impl SubjectSource for SessionPayload {
    fn current_subject(&self) -> Result<Option<AuthorizationSubject>, StoreError> {
        let Some(payload) = self.0.as_deref() else {
            return Ok(None);
        };
        match AuthorizationSubject::from_session_json(payload) {
            Ok(subject) => Ok(Some(subject)),
            Err(e) => {
                log::warn!("Discarding undecodable session payload: {e}");
                Ok(None)
            }
        }
    }
}
