//! Subject lookup over Postgres.

use super::subject::{AuthorizationSubject, SubjectSource};
use crate::error::StoreError;
use crate::executor::{Executor, PgExecutor};
use sea_query::{Alias, Expr, ExprTrait, PostgresQueryBuilder, Query};
use serde::Deserialize;
use uuid::Uuid;

/// Where user roles and permission grants are stored. Both columns are
/// `text[]`; a `NULL` array reads as empty.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct SubjectColumns {
    pub table: String,
    pub id: String,
    pub roles: String,
    pub permissions: String,
}

impl Default for SubjectColumns {
    fn default() -> Self {
        Self {
            table: "users".to_string(),
            id: "id".to_string(),
            roles: "roles".to_string(),
            permissions: "permissions".to_string(),
        }
    }
}

impl SubjectColumns {
    /// `SELECT <roles>, <permissions> FROM <table> WHERE <id> = $1`
    pub fn find_subject_sql(&self) -> String {
        Query::select()
            .column(Alias::new(self.roles.clone()))
            .column(Alias::new(self.permissions.clone()))
            .from(Alias::new(self.table.clone()))
            .and_where(Expr::col(Alias::new(self.id.clone())).eq(Expr::cust("$1")))
            .to_string(PostgresQueryBuilder)
    }
}

pub struct PgSubjectStore {
    executor: PgExecutor,
    columns: SubjectColumns,
}

impl PgSubjectStore {
    pub fn new(executor: PgExecutor) -> Self {
        Self::with_columns(executor, SubjectColumns::default())
    }

    pub fn with_columns(executor: PgExecutor, columns: SubjectColumns) -> Self {
        Self { executor, columns }
    }

    /// Load roles and grants for `user_id`. `Ok(None)` when no such user.
    pub fn find_subject(&self, user_id: Uuid) -> Result<Option<AuthorizationSubject>, StoreError> {
        let sql = self.columns.find_subject_sql();
        let Some(row) = self.executor.query_first(&sql, &[&user_id])? else {
            log::debug!("No user row for {user_id}");
            return Ok(None);
        };
        let roles: Option<Vec<String>> = row.get(0);
        let permissions: Option<Vec<String>> = row.get(1);
        Ok(Some(
            AuthorizationSubject::new(user_id)
                .with_roles(roles.unwrap_or_default())
                .with_permissions(permissions.unwrap_or_default()),
        ))
    }

    /// Bind the store to the user id carried by the current session.
    pub fn for_session(&self, user_id: Option<Uuid>) -> SessionUser<'_> {
        SessionUser {
            store: self,
            user_id,
        }
    }
}

/// [`SubjectSource`] for one request: the session's user id, resolved
/// against the users table.
pub struct SessionUser<'a> {
    store: &'a PgSubjectStore,
    user_id: Option<Uuid>,
}

impl SubjectSource for SessionUser<'_> {
    fn current_subject(&self) -> Result<Option<AuthorizationSubject>, StoreError> {
        match self.user_id {
            Some(user_id) => self.store.find_subject(user_id),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_find_subject_sql() {
        let sql = SubjectColumns::default().find_subject_sql();
        assert!(sql.starts_with(r#"SELECT "roles", "permissions" FROM "users""#), "{sql}");
        assert!(sql.contains(r#""id" = $1"#), "{sql}");
    }

    #[test]
    fn test_custom_columns_deserialize_with_defaults() {
        let columns: SubjectColumns =
            serde_json::from_str(r#"{"table": "staff", "roles": "role_names"}"#).unwrap();
        assert_eq!(columns.table, "staff");
        assert_eq!(columns.roles, "role_names");
        assert_eq!(columns.id, "id");
        assert_eq!(columns.permissions, "permissions");
    }
}
