//! Declarative operation → policy table.
//!
//! One table replaces the role/permission lists each endpoint used to carry
//! inline. [`PolicyTable::builtin`] covers the SIRTIS modules; deployments
//! extend or override it from a TOML file:
//!
//! ```toml
//! [operations."calls.view"]
//! any_of_roles = ["ADMIN", "CALL_CENTRE_AGENT"]
//! any_of_permissions = ["calls.view"]
//! ```

use super::policy::Policy;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

pub const ADMIN_USERS_VIEW: &str = "admin.users.view";
pub const ADMIN_USERS_MANAGE: &str = "admin.users.manage";
pub const ADMIN_ROLES_MANAGE: &str = "admin.roles.manage";
pub const HR_EMPLOYEES_VIEW: &str = "hr.employees.view";
pub const HR_EMPLOYEES_MANAGE: &str = "hr.employees.manage";
pub const CALLS_VIEW: &str = "calls.view";
pub const CALLS_CREATE: &str = "calls.create";
pub const CASES_VIEW: &str = "cases.view";
pub const CASES_CREATE: &str = "cases.create";
pub const CASES_ASSIGN: &str = "cases.assign";
pub const INVENTORY_VIEW: &str = "inventory.view";
pub const INVENTORY_MANAGE: &str = "inventory.manage";
pub const MEAL_FORMS_VIEW: &str = "meal.forms.view";
pub const MEAL_FORMS_SUBMIT: &str = "meal.forms.submit";
pub const MEAL_FORMS_MANAGE: &str = "meal.forms.manage";
pub const PROGRAMS_VIEW: &str = "programs.view";
pub const PROGRAMS_MANAGE: &str = "programs.manage";
pub const RISK_VIEW: &str = "risk.view";
pub const RISK_MANAGE: &str = "risk.manage";

// (operation, roles, permissions)
const BUILTIN: &[(&str, &[&str], &[&str])] = &[
    (ADMIN_USERS_VIEW, &["ADMIN", "SUPER_ADMIN"], &["admin.full_access", "admin.users.view"]),
    (ADMIN_USERS_MANAGE, &["ADMIN", "SUPER_ADMIN"], &["admin.full_access", "admin.users.manage"]),
    (ADMIN_ROLES_MANAGE, &["SUPER_ADMIN"], &["admin.full_access"]),
    (HR_EMPLOYEES_VIEW, &["ADMIN", "HR_MANAGER", "HR_OFFICER"], &["hr.full_access", "hr.view"]),
    (HR_EMPLOYEES_MANAGE, &["ADMIN", "HR_MANAGER"], &["hr.full_access", "hr.manage"]),
    (
        CALLS_VIEW,
        &["ADMIN", "CALL_CENTRE_SUPERVISOR", "CALL_CENTRE_AGENT"],
        &["calls.full_access", "calls.view"],
    ),
    (
        CALLS_CREATE,
        &["ADMIN", "CALL_CENTRE_SUPERVISOR", "CALL_CENTRE_AGENT"],
        &["calls.full_access", "calls.create"],
    ),
    (
        CASES_VIEW,
        &["ADMIN", "CALL_CENTRE_SUPERVISOR", "CASE_MANAGER"],
        &["cases.full_access", "cases.view"],
    ),
    (
        CASES_CREATE,
        &["ADMIN", "CALL_CENTRE_SUPERVISOR", "CALL_CENTRE_AGENT", "CASE_MANAGER"],
        &["cases.full_access", "cases.create"],
    ),
    (CASES_ASSIGN, &["ADMIN", "CALL_CENTRE_SUPERVISOR"], &["cases.full_access", "cases.assign"]),
    (
        INVENTORY_VIEW,
        &["ADMIN", "INVENTORY_MANAGER", "PROGRAM_MANAGER"],
        &["inventory.full_access", "inventory.view"],
    ),
    (INVENTORY_MANAGE, &["ADMIN", "INVENTORY_MANAGER"], &["inventory.full_access", "inventory.manage"]),
    (
        MEAL_FORMS_VIEW,
        &["ADMIN", "MEAL_OFFICER", "PROGRAM_MANAGER"],
        &["meal.full_access", "meal.view"],
    ),
    (MEAL_FORMS_SUBMIT, &["ADMIN", "MEAL_OFFICER"], &["meal.full_access", "meal.submit"]),
    (MEAL_FORMS_MANAGE, &["ADMIN"], &["meal.full_access"]),
    (PROGRAMS_VIEW, &["ADMIN", "PROGRAM_MANAGER"], &["programs.full_access", "programs.view"]),
    (PROGRAMS_MANAGE, &["ADMIN", "PROGRAM_MANAGER"], &["programs.full_access", "programs.manage"]),
    (RISK_VIEW, &["ADMIN", "RISK_OFFICER", "PROGRAM_MANAGER"], &["risk.full_access", "risk.view"]),
    (RISK_MANAGE, &["ADMIN", "RISK_OFFICER"], &["risk.full_access", "risk.manage"]),
];

/// Policy file error type
#[derive(Debug)]
pub enum PolicyTableError {
    Io(std::io::Error),
    Parse(toml::de::Error),
}

impl fmt::Display for PolicyTableError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PolicyTableError::Io(e) => write!(f, "failed to read policy file: {e}"),
            PolicyTableError::Parse(e) => write!(f, "invalid policy file: {e}"),
        }
    }
}

impl std::error::Error for PolicyTableError {}

/// Operation name → policy.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyTable {
    #[serde(default)]
    operations: BTreeMap<String, Policy>,
}

impl PolicyTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// The policies SIRTIS ships with.
    pub fn builtin() -> Self {
        let operations = BUILTIN
            .iter()
            .map(|(operation, roles, permissions)| {
                let policy = Policy::new()
                    .roles(roles.iter().copied())
                    .permissions(permissions.iter().copied());
                (operation.to_string(), policy)
            })
            .collect();
        Self { operations }
    }

    pub fn from_toml_str(source: &str) -> Result<Self, PolicyTableError> {
        toml::from_str(source).map_err(PolicyTableError::Parse)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, PolicyTableError> {
        let source = std::fs::read_to_string(path).map_err(PolicyTableError::Io)?;
        Self::from_toml_str(&source)
    }

    /// Builtin table with `path`'s entries layered on top.
    pub fn builtin_with_overrides(path: impl AsRef<Path>) -> Result<Self, PolicyTableError> {
        let mut table = Self::builtin();
        table.merge(Self::load(path)?);
        Ok(table)
    }

    /// Entries from `other` replace entries with the same operation name.
    pub fn merge(&mut self, other: PolicyTable) {
        self.operations.extend(other.operations);
    }

    pub fn insert(&mut self, operation: impl Into<String>, policy: Policy) {
        self.operations.insert(operation.into(), policy);
    }

    pub fn get(&self, operation: &str) -> Option<&Policy> {
        self.operations.get(operation)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Policy)> {
        self.operations.iter().map(|(op, policy)| (op.as_str(), policy))
    }

    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    pub fn to_toml_string(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_builtin_covers_every_module() {
        let table = PolicyTable::builtin();
        for operation in [
            ADMIN_USERS_MANAGE,
            HR_EMPLOYEES_VIEW,
            CALLS_VIEW,
            CASES_CREATE,
            INVENTORY_VIEW,
            MEAL_FORMS_SUBMIT,
            PROGRAMS_VIEW,
            RISK_MANAGE,
        ] {
            let policy = table.get(operation).expect(operation);
            assert!(!policy.is_empty(), "{operation}");
        }
        assert_eq!(table.len(), BUILTIN.len());
    }

    #[test]
    fn test_from_toml_str() {
        let table = PolicyTable::from_toml_str(
            r#"
            [operations."reports.export"]
            any_of_roles = ["ADMIN"]

            [operations."calls.view"]
            any_of_permissions = ["calls.read_only"]
            "#,
        )
        .unwrap();
        assert_eq!(table.len(), 2);
        assert_eq!(table.get("reports.export").unwrap().any_of_roles, vec!["ADMIN"]);
        assert!(table.get("reports.export").unwrap().any_of_permissions.is_empty());
    }

    #[test]
    fn test_overrides_replace_builtin_entries() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "[operations.\"calls.view\"]\nany_of_roles = [\"AUDITOR\"]\n"
        )
        .unwrap();

        let table = PolicyTable::builtin_with_overrides(file.path()).unwrap();
        let policy = table.get(CALLS_VIEW).unwrap();
        assert_eq!(policy.any_of_roles, vec!["AUDITOR"]);
        assert!(policy.any_of_permissions.is_empty());
        assert!(table.get(CASES_VIEW).is_some());
    }

    #[test]
    fn test_invalid_file_is_an_error() {
        assert!(matches!(
            PolicyTable::from_toml_str("[operations.\"calls.view\"]\nany_of_roles = \"ADMIN\""),
            Err(PolicyTableError::Parse(_))
        ));
        assert!(matches!(
            PolicyTable::load("/nonexistent/policies.toml"),
            Err(PolicyTableError::Io(_))
        ));
    }

    #[test]
    fn test_toml_round_trip_of_builtin() {
        let table = PolicyTable::builtin();
        let rendered = table.to_toml_string().unwrap();
        assert_eq!(PolicyTable::from_toml_str(&rendered).unwrap(), table);
    }
}
