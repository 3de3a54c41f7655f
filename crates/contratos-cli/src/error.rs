use std::io;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Core(#[from] contratos_core::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
    #[error("Invalid login or password")]
    LoginFailed,
    #[error("{kind} attachment {id} does not belong to {parent}")]
    ForeignAttachment {
        kind: String,
        id: i64,
        parent: String,
    },
}

impl CliError {
    /// Process exit code: 2 for configuration problems, 3 for conflicts, 1 otherwise.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Core(error) => match error.kind() {
                contratos_core::ErrorKind::Configuration => 2,
                contratos_core::ErrorKind::Conflict => 3,
                _ => 1,
            },
            _ => 1,
        }
    }
}
