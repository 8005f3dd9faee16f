use thiserror::Error;

/// Reasons an identity is rejected before any mutation happens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// A required address field (`service_url`, `channel_id`,
    /// `conversation_id`) is empty.
    #[error("identity is missing required field `{field}`")]
    Incomplete { field: &'static str },

    /// Bot identities must carry a channel account id.
    #[error("bot identity has no channel account id")]
    MissingAccount,

    /// Aggregation identities address a whole channel, never an account.
    #[error("aggregation identity must not carry a channel account id")]
    UnexpectedAccount,
}

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),

    #[error(transparent)]
    Migrate(#[from] sqlx::migrate::MigrateError),

    #[error("{message}")]
    Message { message: String },

    /// Failure reported by a storage backend other than the bundled ones.
    #[error("{context}: {source}")]
    Backend {
        context: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

impl Error {
    #[must_use]
    pub fn message(message: impl Into<String>) -> Self {
        Self::Message {
            message: message.into(),
        }
    }

    #[must_use]
    pub fn backend(
        context: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Backend {
            context: context.into(),
            source: Box::new(source),
        }
    }

    /// True for errors raised by input validation rather than storage.
    #[must_use]
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }
}

impl parley_common::FromMessage for Error {
    fn from_message(message: String) -> Self {
        Self::Message { message }
    }
}

parley_common::impl_context!();

pub type Result<T> = std::result::Result<T, Error>;
