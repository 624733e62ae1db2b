//! Role/permission authorization.
//!
//! ```
//! use sirtis::authz::{is_authorized, AuthorizationSubject, Policy};
//! use uuid::Uuid;
//!
//! let agent = AuthorizationSubject::new(Uuid::new_v4()).with_roles(["call_centre_agent"]);
//! let policy = Policy::new().roles(["CALL_CENTRE_AGENT"]).permissions(["calls.view"]);
//! assert!(is_authorized(Some(&agent), &policy));
//! assert!(!is_authorized(None, &policy));
//! ```

mod normalize;
mod policy;
pub mod postgres;
mod resolver;
mod subject;
pub mod table;

pub use normalize::RoleNormalization;
pub use policy::Policy;
pub use postgres::{PgSubjectStore, SessionUser, SubjectColumns};
pub use resolver::{evaluate, is_authorized, AuthzError, Decision, Resolver};
pub use subject::{AuthorizationSubject, SessionPayload, StaticSubject, SubjectSource};
pub use table::{PolicyTable, PolicyTableError};
