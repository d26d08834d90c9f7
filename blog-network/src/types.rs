use serde::Serialize;
// Use the interfaces crate for the loader and matcher contracts
pub use interfaces::defs::{LoaderEvent, Loader, PostRef, RawPost};
pub use interfaces::defs::{MatchError, MatchFn, PostFields, Query, QueryMatcher, Verdict};

#[derive(Debug, Clone)]
pub struct BlogConfig {
    pub default_title: String,
    /// Accepted `date` layouts besides RFC 3339, which is always accepted.
    pub date_formats: Vec<String>,
}

impl Default for BlogConfig {
    fn default() -> Self {
        Self {
            default_title: "Untitled".to_string(),
            date_formats: vec![
                "%Y-%m-%d".to_string(),
                "%Y-%m-%dT%H:%M:%S%z".to_string(),
                "%Y-%m-%d %H:%M:%S".to_string(),
                "%Y-%m-%dT%H:%M:%S".to_string(),
            ],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum BlogState {
    Loading,
    Ready,
    Failed,
}

/// Signals a blog emits towards whoever owns it.
#[derive(Debug, Clone, PartialEq)]
pub enum BlogEvent {
    Ready,
    Error(NetworkError),
}

/// Signals a network emits: its own readiness plus every member error.
#[derive(Debug, Clone, PartialEq)]
pub enum NetworkEvent {
    Ready,
    Error { blog: String, error: NetworkError },
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("post is missing an id")]
    MissingId,

    #[error("post id must be a string or a number, got {value}")]
    InvalidId { value: String },

    #[error("duplicate post id: {id}")]
    DuplicateId { id: String },

    #[error("post {id} is missing a date")]
    MissingDate { id: String },

    #[error("post {id} has an unparseable date: {value}")]
    InvalidDate { id: String, value: String },

    #[error("post {id} claims slug {slug}, which is already taken")]
    DuplicateSlug { id: String, slug: String },

    #[error("no post with id {id}")]
    UnknownPost { id: String },
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum NetworkError {
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Unknown select() option: {key}")]
    UnsupportedOption { key: String },

    #[error("Invalid value for option {key}: {reason}")]
    InvalidOption { key: String, reason: String },

    #[error("Predicate error: {0}")]
    Predicate(#[from] MatchError),

    #[error("Loader error: {0}")]
    Loader(String),

    #[error("Initial batch was already delivered")]
    AlreadyLoaded,

    #[error("Blog not found: {name}")]
    UnknownBlog { name: String },

    #[error("Blog already registered: {name}")]
    DuplicateBlog { name: String },
}

pub type Result<T> = std::result::Result<T, NetworkError>;
