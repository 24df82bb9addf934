use murmur_vault::VaultError;

/// Failures of the message store itself. Passed through unchanged.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error(transparent)]
    Database(#[from] sqlx::Error),

    #[error(transparent)]
    Migrate(#[from] sqlx::migrate::MigrateError),
}

#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error(transparent)]
    Vault(#[from] VaultError),

    #[error(transparent)]
    Store(#[from] StoreError),

    /// A single stored record could not be decrypted. Read paths report it and
    /// carry on with the rest of the history.
    #[error("message {id} is unreadable: {source}")]
    Record {
        id: i64,
        #[source]
        source: VaultError,
    },

    #[error(transparent)]
    Join(#[from] tokio::task::JoinError),
}

impl RepositoryError {
    /// Id of the unreadable record, for record-level failures.
    #[must_use]
    pub fn unreadable_id(&self) -> Option<i64> {
        match self {
            Self::Record { id, .. } => Some(*id),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, RepositoryError>;
