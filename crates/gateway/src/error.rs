use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("work pool is shut down")]
    PoolClosed,

    #[error("invalid gateway URL {url:?}: {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },

    #[error(transparent)]
    Http(#[from] reqwest::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("{message}")]
    Message { message: String },
}

impl wxhook_common::FromMessage for Error {
    fn from_message(message: String) -> Self {
        Self::Message { message }
    }
}

wxhook_common::impl_context!();

pub type Result<T> = std::result::Result<T, Error>;
