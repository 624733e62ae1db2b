//! Integration tests for resolving authorization subjects from PostgreSQL

mod common;

use common::{drop_tables, executor, unique_table, with_database};
use sirtis::authz::{AuthzError, PgSubjectStore, Resolver, SubjectColumns, SubjectSource};
use sirtis::Executor;
use uuid::Uuid;

fn create_users(url: &str) -> SubjectColumns {
    let columns = SubjectColumns {
        table: unique_table("users"),
        ..SubjectColumns::default()
    };
    executor(url)
        .execute(
            &format!(
                "CREATE TABLE \"{}\" (id UUID PRIMARY KEY, roles TEXT[], permissions TEXT[])",
                columns.table
            ),
            &[],
        )
        .expect("Failed to create users table");
    columns
}

fn insert_user(url: &str, columns: &SubjectColumns, id: Uuid, roles: &[&str], permissions: &[&str]) {
    let roles: Vec<String> = roles.iter().map(|r| r.to_string()).collect();
    let permissions: Vec<String> = permissions.iter().map(|p| p.to_string()).collect();
    executor(url)
        .execute(
            &format!(
                "INSERT INTO \"{}\" (id, roles, permissions) VALUES ($1, $2, $3)",
                columns.table
            ),
            &[&id, &roles, &permissions],
        )
        .expect("Failed to insert user");
}

#[test]
#[ignore = "requires TEST_DATABASE_URL or Docker"]
fn test_find_subject_reads_roles_and_permissions() {
    with_database(|url| {
        let columns = create_users(url);
        let agent = Uuid::new_v4();
        insert_user(url, &columns, agent, &["call_centre_agent"], &["calls.view"]);

        let store = PgSubjectStore::with_columns(executor(url), columns.clone());
        let subject = store
            .find_subject(agent)
            .expect("Lookup failed")
            .expect("User not found");
        assert_eq!(subject.roles, vec!["call_centre_agent".to_string()]);
        assert!(subject.has_permission("calls.view"));

        assert!(store
            .find_subject(Uuid::new_v4())
            .expect("Lookup failed")
            .is_none());

        drop_tables(&executor(url), &[columns.table.as_str()]);
    });
}

#[test]
#[ignore = "requires TEST_DATABASE_URL or Docker"]
fn test_null_grants_read_as_empty() {
    with_database(|url| {
        let columns = create_users(url);
        let id = Uuid::new_v4();
        executor(url)
            .execute(
                &format!("INSERT INTO \"{}\" (id) VALUES ($1)", columns.table),
                &[&id],
            )
            .expect("Failed to insert user");

        let store = PgSubjectStore::with_columns(executor(url), columns.clone());
        let subject = store
            .for_session(Some(id))
            .current_subject()
            .expect("Lookup failed")
            .expect("User not found");
        assert!(subject.roles.is_empty());
        assert!(subject.permissions.is_empty());

        drop_tables(&executor(url), &[columns.table.as_str()]);
    });
}

#[test]
#[ignore = "requires TEST_DATABASE_URL or Docker"]
fn test_resolver_over_database_subjects() {
    with_database(|url| {
        let columns = create_users(url);
        let hr = Uuid::new_v4();
        insert_user(url, &columns, hr, &["HR_MANAGER"], &[]);

        let store = PgSubjectStore::with_columns(executor(url), columns.clone());
        let resolver = Resolver::default();

        let subject = resolver
            .authorize_current(&store.for_session(Some(hr)), "hr.employees.manage")
            .expect("HR manager should be allowed");
        assert_eq!(subject.user_id, hr);

        assert!(matches!(
            resolver.authorize_current(&store.for_session(Some(hr)), "calls.create"),
            Err(AuthzError::Forbidden { .. })
        ));
        assert!(matches!(
            resolver.authorize_current(&store.for_session(None), "calls.create"),
            Err(AuthzError::Unauthenticated)
        ));
        // Unknown user ids have no session subject
        assert!(matches!(
            resolver.authorize_current(&store.for_session(Some(Uuid::new_v4())), "calls.view"),
            Err(AuthzError::Unauthenticated)
        ));

        drop_tables(&executor(url), &[columns.table.as_str()]);
    });
}
