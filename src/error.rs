use thiserror::Error;

/// Which side of a [`crate::types::Match`] is missing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchRole {
    Audio,
    Text,
}

impl MatchRole {
    pub fn as_str(self) -> &'static str {
        match self {
            MatchRole::Audio => "audio",
            MatchRole::Text => "text",
        }
    }
}

impl std::fmt::Display for MatchRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum AlignmentError {
    #[error("I/O error while {context}: {source}")]
    Io {
        context: &'static str,
        #[source]
        source: std::io::Error,
    },
    #[error("JSON error while {context}: {source}")]
    Json {
        context: &'static str,
        #[source]
        source: serde_json::Error,
    },
    #[error("no {missing} file found for '{base_name}'")]
    Matching {
        base_name: String,
        missing: MatchRole,
    },
    #[error("text normalization failed: {message}")]
    Normalization { message: String },
    #[error("audio transcode failed: {message}")]
    Transcode { message: String },
    #[error("emission provider failed while {context}: {message}")]
    EmissionProvider {
        context: &'static str,
        message: String,
    },
    #[error("alignment infeasible: {frames} frames for {required} required states")]
    Infeasible { frames: usize, required: usize },
    #[error("configuration error: {message}")]
    Configuration { message: String },
    #[error("invalid input: {message}")]
    InvalidInput { message: String },
}

impl AlignmentError {
    pub(crate) fn io(context: &'static str, source: std::io::Error) -> Self {
        Self::Io { context, source }
    }

    pub(crate) fn json(context: &'static str, source: serde_json::Error) -> Self {
        Self::Json { context, source }
    }

    pub(crate) fn emission(context: &'static str, err: impl std::fmt::Display) -> Self {
        Self::EmissionProvider {
            context,
            message: err.to_string(),
        }
    }

    pub(crate) fn normalization(message: impl Into<String>) -> Self {
        Self::Normalization {
            message: message.into(),
        }
    }

    pub(crate) fn transcode(message: impl Into<String>) -> Self {
        Self::Transcode {
            message: message.into(),
        }
    }

    pub(crate) fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    pub(crate) fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }

    /// Configuration problems abort the whole run; everything else only
    /// aborts the current match.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Configuration { .. })
    }
}
