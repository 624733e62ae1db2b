use super::normalize::RoleNormalization;
use super::policy::Policy;
use super::subject::{AuthorizationSubject, SubjectSource};
use super::table::PolicyTable;
use crate::error::StoreError;
use std::collections::HashSet;
use std::fmt;

#[cfg(feature = "metrics")]
use crate::metrics::METRICS;

/// Outcome of checking a subject against a policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allow,
    /// No session at all
    Unauthenticated,
    /// Session present, policy not satisfied
    Forbidden,
}

impl Decision {
    pub fn as_str(self) -> &'static str {
        match self {
            Decision::Allow => "allow",
            Decision::Unauthenticated => "unauthenticated",
            Decision::Forbidden => "forbidden",
        }
    }

    pub fn is_allowed(self) -> bool {
        self == Decision::Allow
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Pure decision over a subject and a policy.
///
/// A matching permission wins regardless of roles; otherwise any role shared
/// with the policy (both sides normalized the same way) is enough.
pub fn evaluate(
    subject: Option<&AuthorizationSubject>,
    policy: &Policy,
    normalization: RoleNormalization,
) -> Decision {
    let Some(subject) = subject else {
        return Decision::Unauthenticated;
    };

    if policy
        .any_of_permissions
        .iter()
        .any(|permission| subject.has_permission(permission))
    {
        return Decision::Allow;
    }

    if policy.any_of_roles.is_empty() {
        return Decision::Forbidden;
    }
    let held: HashSet<String> = subject
        .roles
        .iter()
        .map(|role| normalization.apply(role))
        .collect();
    if policy
        .any_of_roles
        .iter()
        .any(|role| held.contains(&normalization.apply(role)))
    {
        Decision::Allow
    } else {
        Decision::Forbidden
    }
}

/// Boolean form of [`evaluate`] with uppercase role normalization.
pub fn is_authorized(subject: Option<&AuthorizationSubject>, policy: &Policy) -> bool {
    evaluate(subject, policy, RoleNormalization::Upper).is_allowed()
}

/// Authorization failure
#[derive(Debug)]
pub enum AuthzError {
    Unauthenticated,
    Forbidden { operation: String },
    /// The subject could not be resolved
    Storage(StoreError),
}

impl AuthzError {
    pub fn http_status(&self) -> u16 {
        match self {
            AuthzError::Unauthenticated => 401,
            AuthzError::Forbidden { .. } => 403,
            AuthzError::Storage(_) => 500,
        }
    }
}

impl fmt::Display for AuthzError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthzError::Unauthenticated => write!(f, "authentication required"),
            AuthzError::Forbidden { operation } => {
                write!(f, "not permitted to perform {operation}")
            }
            AuthzError::Storage(e) => write!(f, "failed to resolve subject: {e}"),
        }
    }
}

impl std::error::Error for AuthzError {}

impl From<StoreError> for AuthzError {
    fn from(err: StoreError) -> Self {
        AuthzError::Storage(err)
    }
}

/// Guard consulted at the top of every externally reachable operation.
#[derive(Debug, Clone)]
pub struct Resolver {
    table: PolicyTable,
    normalization: RoleNormalization,
}

impl Default for Resolver {
    fn default() -> Self {
        Self::new(PolicyTable::builtin())
    }
}

impl Resolver {
    pub fn new(table: PolicyTable) -> Self {
        Self {
            table,
            normalization: RoleNormalization::default(),
        }
    }

    pub fn with_normalization(mut self, normalization: RoleNormalization) -> Self {
        self.normalization = normalization;
        self
    }

    pub fn table(&self) -> &PolicyTable {
        &self.table
    }

    pub fn normalization(&self) -> RoleNormalization {
        self.normalization
    }

    /// Decide `operation` for `subject`. Operations missing from the table
    /// are forbidden to everyone.
    pub fn check(&self, subject: Option<&AuthorizationSubject>, operation: &str) -> Decision {
        #[cfg(feature = "tracing")]
        let _span = crate::metrics::tracing_helpers::authorize_span(operation).entered();

        let decision = match self.table.get(operation) {
            Some(policy) => evaluate(subject, policy, self.normalization),
            None if subject.is_none() => Decision::Unauthenticated,
            None => {
                log::warn!("No policy registered for operation {operation}; denying");
                Decision::Forbidden
            }
        };

        match decision {
            Decision::Allow => log::debug!("Allowed {operation}"),
            Decision::Unauthenticated => log::debug!("Rejected {operation}: no session"),
            Decision::Forbidden => log::info!(
                "Forbidden {operation} for user {}",
                subject.map(|s| s.user_id.to_string()).unwrap_or_default()
            ),
        }

        #[cfg(feature = "metrics")]
        METRICS.record_decision(decision);

        decision
    }

    pub fn authorize(
        &self,
        subject: Option<&AuthorizationSubject>,
        operation: &str,
    ) -> Result<(), AuthzError> {
        match self.check(subject, operation) {
            Decision::Allow => Ok(()),
            Decision::Unauthenticated => Err(AuthzError::Unauthenticated),
            Decision::Forbidden => Err(AuthzError::Forbidden {
                operation: operation.to_string(),
            }),
        }
    }

    /// Resolve the caller from `source` and authorize it. Returns the subject
    /// on success so the handler can keep using it.
    pub fn authorize_current(
        &self,
        source: &dyn SubjectSource,
        operation: &str,
    ) -> Result<AuthorizationSubject, AuthzError> {
        let subject = source.current_subject()?;
        self.authorize(subject.as_ref(), operation)?;
        subject.ok_or(AuthzError::Unauthenticated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::authz::subject::StaticSubject;
    use uuid::Uuid;

    fn subject(roles: &[&str], permissions: &[&str]) -> AuthorizationSubject {
        AuthorizationSubject::new(Uuid::new_v4())
            .with_roles(roles.iter().copied())
            .with_permissions(permissions.iter().copied())
    }

    #[test]
    fn test_role_match_ignores_case() {
        let policy = Policy::new().roles(["admin"]);
        assert!(is_authorized(Some(&subject(&["ADMIN"], &[])), &policy));
        assert!(is_authorized(Some(&subject(&[" Admin "], &[])), &policy));
    }

    #[test]
    fn test_exact_normalization_is_case_sensitive() {
        let policy = Policy::new().roles(["admin"]);
        let admin = subject(&["ADMIN"], &[]);
        assert_eq!(
            evaluate(Some(&admin), &policy, RoleNormalization::Exact),
            Decision::Forbidden
        );
        assert_eq!(
            evaluate(Some(&admin), &policy, RoleNormalization::Lower),
            Decision::Allow
        );
    }

    #[test]
    fn test_permission_wins_regardless_of_roles() {
        let policy = Policy::new()
            .roles(["CALL_CENTRE_SUPERVISOR"])
            .permissions(["calls.view"]);
        let agent = subject(&["VOLUNTEER"], &["calls.view"]);
        assert!(is_authorized(Some(&agent), &policy));
    }

    #[test]
    fn test_permissions_compare_exactly() {
        let policy = Policy::new().permissions(["calls.view"]);
        assert!(!is_authorized(Some(&subject(&[], &["CALLS.VIEW"])), &policy));
    }

    #[test]
    fn test_no_session_is_unauthenticated() {
        let policy = Policy::new().roles(["ADMIN"]);
        assert_eq!(
            evaluate(None, &policy, RoleNormalization::Upper),
            Decision::Unauthenticated
        );
        assert!(!is_authorized(None, &policy));
    }

    #[test]
    fn test_empty_policy_admits_nobody() {
        let everything = subject(&["ADMIN", "SUPER_ADMIN"], &["admin.full_access"]);
        assert_eq!(
            evaluate(Some(&everything), &Policy::new(), RoleNormalization::Upper),
            Decision::Forbidden
        );
    }

    #[test]
    fn test_resolver_unknown_operation_is_forbidden() {
        let resolver = Resolver::default();
        let admin = subject(&["ADMIN"], &[]);
        assert_eq!(resolver.check(Some(&admin), "reports.unknown"), Decision::Forbidden);
        assert_eq!(resolver.check(None, "reports.unknown"), Decision::Unauthenticated);
    }

    #[test]
    fn test_authorize_maps_to_errors() {
        let resolver = Resolver::default();
        let agent = subject(&["call_centre_agent"], &[]);

        assert!(resolver.authorize(Some(&agent), "calls.view").is_ok());

        let err = resolver
            .authorize(Some(&agent), "admin.users.manage")
            .unwrap_err();
        assert_eq!(err.http_status(), 403);
        assert!(matches!(err, AuthzError::Forbidden { ref operation } if operation == "admin.users.manage"));

        let err = resolver.authorize(None, "calls.view").unwrap_err();
        assert_eq!(err.http_status(), 401);
    }

    #[test]
    fn test_authorize_current_returns_subject() {
        let resolver = Resolver::default();
        let hr = subject(&["HR_MANAGER"], &[]);
        let resolved = resolver
            .authorize_current(&StaticSubject(Some(hr.clone())), "hr.employees.manage")
            .unwrap();
        assert_eq!(resolved, hr);

        assert!(matches!(
            resolver.authorize_current(&StaticSubject(None), "hr.employees.view"),
            Err(AuthzError::Unauthenticated)
        ));
    }

    struct Unreachable;

    impl SubjectSource for Unreachable {
        fn current_subject(&self) -> Result<Option<AuthorizationSubject>, StoreError> {
            Err(StoreError::Unavailable("session store down".into()))
        }
    }

    #[test]
    fn test_authorize_current_surfaces_storage_errors() {
        let err = Resolver::default()
            .authorize_current(&Unreachable, "calls.view")
            .unwrap_err();
        assert_eq!(err.http_status(), 500);
    }
}
