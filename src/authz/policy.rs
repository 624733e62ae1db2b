use serde::{Deserialize, Serialize};

/// Acceptable roles and/or permissions for one operation.
///
/// A disjunction: holding any listed permission, or any listed role, is
/// enough. A policy with both lists empty admits nobody.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Policy {
    #[serde(default)]
    pub any_of_roles: Vec<String>,
    #[serde(default)]
    pub any_of_permissions: Vec<String>,
}

impl Policy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn roles<I, S>(mut self, roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.any_of_roles.extend(roles.into_iter().map(Into::into));
        self
    }

    pub fn permissions<I, S>(mut self, permissions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.any_of_permissions
            .extend(permissions.into_iter().map(Into::into));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.any_of_roles.is_empty() && self.any_of_permissions.is_empty()
    }
}
