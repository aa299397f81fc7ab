use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("Invalid glob pattern: {0}")]
    GlobPattern(#[from] glob::PatternError),

    #[error("Glob traversal error: {0}")]
    GlobWalk(#[from] glob::GlobError),

    #[error("Watch error: {0}")]
    Notify(#[from] notify::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Unknown alias: {0}")]
    UnknownAlias(String),

    #[error("Compile error in {file}:{line}: {message}")]
    Compile {
        file: String,
        line: u32,
        message: String,
    },

    #[error("Lint failed with {errors} error(s)")]
    Lint { errors: usize },

    #[error("Test run failed: {0}")]
    TestRunner(String),

    #[error("Operation timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("Port {0} is already in use")]
    PortInUse(u16),

    #[error("Tool not found: {0}")]
    ToolNotFound(String),

    #[error("Filesystem error: {0}")]
    FileSystem(String),

    #[error("Task join error: {0}")]
    TaskJoin(String),

    #[error("No home directory")]
    NoHomeDir,
}

pub type Result<T> = std::result::Result<T, Error>;
