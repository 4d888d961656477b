use thiserror::Error;

#[derive(Debug, Error)]
pub enum ResgenError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid name pattern: {0}")]
    Pattern(#[from] glob::PatternError),
    #[error("config parse error: {0}")]
    Config(#[from] toml::de::Error),
    #[error("invalid config: {0}")]
    InvalidConfig(String),
    #[error("encode error: {0}")]
    Encode(String),
    #[error("worker error: {0}")]
    Worker(String),
    #[error("processing {name}: {source}")]
    Job {
        name: String,
        #[source]
        source: Box<ResgenError>,
    },
    #[error("{context}: {source}")]
    Context {
        context: String,
        #[source]
        source: Box<ResgenError>,
    },
    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl ResgenError {
    pub fn with_context(self, context: impl Into<String>) -> Self {
        Self::Context {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// Tags an error with the resource whose job produced it.
    pub fn for_job(self, name: impl Into<String>) -> Self {
        Self::Job {
            name: name.into(),
            source: Box::new(self),
        }
    }

    /// Name of the failed resource, if this error (or one it wraps) is a job failure.
    pub fn job_name(&self) -> Option<&str> {
        match self {
            Self::Job { name, .. } => Some(name),
            Self::Context { source, .. } => source.job_name(),
            _ => None,
        }
    }
}
