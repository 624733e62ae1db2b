//! Crate-level error taxonomy and its HTTP mapping.

use crate::authz::AuthzError;
use crate::executor::DbError;
use crate::sequence::{AllocationError, MalformedIdentifier};
use serde::Serialize;
use std::fmt;

/// Failure of a storage back end (Postgres or in-process).
#[derive(Debug)]
pub enum StoreError {
    /// The back end could not be reached or refused the request
    Unavailable(String),
    /// A per-scope unique rule rejected the write
    Duplicate(String),
    /// Database error from the executor
    Database(DbError),
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::Unavailable(msg) => write!(f, "storage unavailable: {msg}"),
            StoreError::Duplicate(id) => write!(f, "identifier already recorded: {id}"),
            StoreError::Database(e) => write!(f, "database error: {e}"),
        }
    }
}

impl std::error::Error for StoreError {}

impl From<DbError> for StoreError {
    fn from(err: DbError) -> Self {
        StoreError::Database(err)
    }
}

/// Everything an operation guarded by this crate can fail with.
#[derive(Debug)]
pub enum SirtisError {
    /// No valid session
    Unauthenticated,
    /// Session present, policy not satisfied
    Forbidden { operation: String },
    /// Lookup or persist failure
    StorageUnavailable(StoreError),
    /// Highest stored identifier could not be parsed
    MalformedIdentifier(MalformedIdentifier),
    /// Identifier already recorded in its scope
    DuplicateIdentifier(String),
    /// Scope has no sequence numbers left
    SequenceExhausted(String),
    /// Configuration could not be loaded
    Config(String),
}

impl SirtisError {
    pub fn http_status(&self) -> u16 {
        match self {
            SirtisError::Unauthenticated => 401,
            SirtisError::Forbidden { .. } => 403,
            SirtisError::DuplicateIdentifier(_) => 409,
            SirtisError::StorageUnavailable(_)
            | SirtisError::MalformedIdentifier(_)
            | SirtisError::SequenceExhausted(_)
            | SirtisError::Config(_) => 500,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            SirtisError::Unauthenticated => "unauthenticated",
            SirtisError::Forbidden { .. } => "forbidden",
            SirtisError::StorageUnavailable(_) => "storage_unavailable",
            SirtisError::MalformedIdentifier(_) => "malformed_identifier",
            SirtisError::DuplicateIdentifier(_) => "duplicate_identifier",
            SirtisError::SequenceExhausted(_) => "sequence_exhausted",
            SirtisError::Config(_) => "config",
        }
    }

    /// JSON body for the response. Server-side failures get a generic
    /// message; the detail goes to the log.
    pub fn to_body(&self) -> ErrorBody {
        let message = match self.http_status() {
            500 => {
                log::error!("{self}");
                "internal error".to_string()
            }
            _ => self.to_string(),
        };
        ErrorBody {
            code: self.code(),
            message,
        }
    }
}

impl fmt::Display for SirtisError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SirtisError::Unauthenticated => write!(f, "authentication required"),
            SirtisError::Forbidden { operation } => {
                write!(f, "not permitted to perform {operation}")
            }
            SirtisError::StorageUnavailable(e) => write!(f, "{e}"),
            SirtisError::MalformedIdentifier(e) => write!(f, "{e}"),
            SirtisError::DuplicateIdentifier(id) => write!(f, "identifier already recorded: {id}"),
            SirtisError::SequenceExhausted(scope) => write!(f, "no sequence numbers left in {scope}"),
            SirtisError::Config(msg) => write!(f, "configuration error: {msg}"),
        }
    }
}

impl std::error::Error for SirtisError {}

impl From<AllocationError> for SirtisError {
    fn from(err: AllocationError) -> Self {
        match err {
            AllocationError::StorageUnavailable(e) => SirtisError::StorageUnavailable(e),
            AllocationError::MalformedIdentifier(e) => SirtisError::MalformedIdentifier(e),
            AllocationError::DuplicateIdentifier(id) => SirtisError::DuplicateIdentifier(id),
            AllocationError::SequenceExhausted(scope) => {
                SirtisError::SequenceExhausted(scope.to_string())
            }
        }
    }
}

impl From<MalformedIdentifier> for SirtisError {
    fn from(err: MalformedIdentifier) -> Self {
        SirtisError::MalformedIdentifier(err)
    }
}

impl From<AuthzError> for SirtisError {
    fn from(err: AuthzError) -> Self {
        match err {
            AuthzError::Unauthenticated => SirtisError::Unauthenticated,
            AuthzError::Forbidden { operation } => SirtisError::Forbidden { operation },
            AuthzError::Storage(e) => SirtisError::StorageUnavailable(e),
        }
    }
}

impl From<StoreError> for SirtisError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Duplicate(id) => SirtisError::DuplicateIdentifier(id),
            other => SirtisError::StorageUnavailable(other),
        }
    }
}

impl From<config::ConfigError> for SirtisError {
    fn from(err: config::ConfigError) -> Self {
        SirtisError::Config(err.to_string())
    }
}

/// Uniform JSON error shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorBody {
    pub code: &'static str,
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sequence::{AllocatedIdentifier, EntityKind, SequenceScope};

    #[test]
    fn test_http_status_mapping() {
        assert_eq!(SirtisError::Unauthenticated.http_status(), 401);
        assert_eq!(
            SirtisError::Forbidden {
                operation: "calls.view".into()
            }
            .http_status(),
            403
        );
        assert_eq!(
            SirtisError::StorageUnavailable(StoreError::Unavailable("down".into())).http_status(),
            500
        );
        assert_eq!(
            SirtisError::MalformedIdentifier(MalformedIdentifier {
                kind: EntityKind::Case,
                raw: "CASE-2025-X".into()
            })
            .http_status(),
            500
        );
        assert_eq!(
            SirtisError::DuplicateIdentifier("CASE-2025-00000001".into()).http_status(),
            409
        );
    }

    #[test]
    fn test_server_errors_hide_detail() {
        let err = SirtisError::StorageUnavailable(StoreError::Unavailable(
            "host=10.0.0.3 refused".into(),
        ));
        let body = err.to_body();
        assert_eq!(body.code, "storage_unavailable");
        assert_eq!(body.message, "internal error");

        let body = SirtisError::Forbidden {
            operation: "admin.users.manage".into(),
        }
        .to_body();
        assert!(body.message.contains("admin.users.manage"));
    }

    #[test]
    fn test_duplicate_store_error_maps_to_conflict() {
        let err: SirtisError = StoreError::Duplicate("00000001/2025".into()).into();
        assert_eq!(err.http_status(), 409);
    }

    #[test]
    fn test_unparseable_identifier_converts_with_question_mark() {
        fn parse(raw: &str) -> Result<u64, SirtisError> {
            Ok(AllocatedIdentifier::parse_any(raw)?.sequence)
        }

        assert_eq!(parse("00000012/2025").unwrap(), 12);
        let err = parse("CASE-2025-XYZ").unwrap_err();
        assert!(matches!(err, SirtisError::MalformedIdentifier(_)));
        assert_eq!(err.http_status(), 500);
        assert_eq!(err.code(), "malformed_identifier");
    }

    #[test]
    fn test_exhausted_scope_is_server_error() {
        let err: SirtisError =
            AllocationError::SequenceExhausted(SequenceScope::new(EntityKind::Case, 2025)).into();
        assert_eq!(err.http_status(), 500);
        assert_eq!(err.code(), "sequence_exhausted");
    }

    #[test]
    fn test_error_body_serializes() {
        let json = serde_json::to_value(SirtisError::Unauthenticated.to_body()).unwrap();
        assert_eq!(json["code"], "unauthenticated");
    }
}
