use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("unknown plugin: {name}")]
    UnknownPlugin { name: String },

    /// A lifecycle hook refused the transition.
    #[error("plugin {plugin}: {hook} hook failed: {source}")]
    Hook {
        plugin: String,
        hook: &'static str,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error("{message}")]
    Message { message: String },
}

impl Error {
    #[must_use]
    pub fn unknown_plugin(name: impl Into<String>) -> Self {
        Self::UnknownPlugin { name: name.into() }
    }

    #[must_use]
    pub fn hook(plugin: &str, hook: &'static str, source: anyhow::Error) -> Self {
        Self::Hook {
            plugin: plugin.to_string(),
            hook,
            source: source.into(),
        }
    }
}

impl wxhook_common::FromMessage for Error {
    fn from_message(message: String) -> Self {
        Self::Message { message }
    }
}

wxhook_common::impl_context!();

pub type Result<T> = std::result::Result<T, Error>;
