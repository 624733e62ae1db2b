use sirtis::authz::{AuthzError, PolicyTableError};
use sirtis::{ConnectionError, DbError, SirtisError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AdminError {
    #[error("failed to connect: {0}")]
    Connection(#[from] ConnectionError),

    #[error("{0}")]
    Database(#[from] DbError),

    #[error(transparent)]
    Sirtis(#[from] SirtisError),

    #[error(transparent)]
    Policy(#[from] PolicyTableError),

    #[error("{message} (HTTP {status})")]
    Denied { status: u16, message: String },
}

impl From<AuthzError> for AdminError {
    fn from(err: AuthzError) -> Self {
        match err {
            AuthzError::Storage(e) => AdminError::Sirtis(e.into()),
            other => AdminError::Denied {
                status: other.http_status(),
                message: other.to_string(),
            },
        }
    }
}
