use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DvrError {
    #[error("io error: {0}")]
    Io(String),
    #[error("config parse error: {0}")]
    ConfigParse(String),
    #[error("invalid config: {0}")]
    InvalidConfig(String),
    #[error("cli error: {0}")]
    Cli(String),
    #[error("invalid url: {0}")]
    InvalidUrl(String),
    #[error("transport error: {0}")]
    Transport(String),
    #[error("fixture error: {0}")]
    Fixture(String),
    #[error("Unknown version: {0}")]
    UnsupportedVersion(u32),
    #[error("fixture setup failed: {0}")]
    Setup(Box<DvrError>),
    #[error("no matching recorded interaction for {method} {url}")]
    ReplayMiss { method: String, url: String },
}

impl DvrError {
    /// Setup failures mean the fixture cannot be trusted; callers should stop
    /// the run instead of letting individual requests fail.
    pub fn is_unrecoverable(&self) -> bool {
        matches!(self, Self::Setup(_))
    }

    pub fn is_replay_miss(&self) -> bool {
        matches!(self, Self::ReplayMiss { .. })
    }
}
