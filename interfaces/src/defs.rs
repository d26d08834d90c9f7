use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;

use chrono::DateTime;
use chrono::Utc;
use serde::Deserialize;
use serde::Serialize;
use serde_json::Map;
use serde_json::Value;

/// Opaque query handed to a matcher. Its shape is the matcher's business.
pub type Query = Value;

/// Outcome of testing one post against a query.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Verdict {
    Match,
    NoMatch,
    /// Stop enumerating: the select in progress keeps what it has so far.
    Stop,
}

impl From<bool> for Verdict {
    fn from(matched: bool) -> Self {
        if matched {
            Verdict::Match
        } else {
            Verdict::NoMatch
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("match failed: {message}")]
pub struct MatchError {
    pub message: String,
}

impl MatchError {
    pub fn new(message: impl Into<String>) -> Self {
        Self { message: message.into() }
    }
}

/// Read access to an ingested post, as seen by matchers.
pub trait PostFields {
    fn id(&self) -> &str;
    fn title(&self) -> &str;
    fn slug(&self) -> &str;
    fn date(&self) -> DateTime<Utc>;
    /// Extra fields carried by the record (anything besides id/title/slug/date).
    fn field(&self, name: &str) -> Option<&Value>;
}

/// The generic "does this post match this query" capability.
pub trait QueryMatcher: Send + Sync {
    fn matches(&self, query: &Query, post: &dyn PostFields) -> Result<Verdict, MatchError>;
}

/// A match capability supplied by the post itself, invoked with the post as receiver.
pub type MatchFn = Arc<dyn Fn(&dyn PostFields, &Query) -> Result<Verdict, MatchError> + Send + Sync>;

/// A post record as a loader hands it over, before validation.
#[derive(Clone, Default, Serialize, Deserialize)]
pub struct RawPost {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slug: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<Value>,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
    #[serde(skip)]
    pub matcher: Option<MatchFn>,
}

impl RawPost {
    pub fn new(id: impl Into<Value>, title: impl Into<String>, date: impl Into<Value>) -> Self {
        Self {
            id: Some(id.into()),
            title: Some(title.into()),
            date: Some(date.into()),
            ..Default::default()
        }
    }

    pub fn with_slug(mut self, slug: impl Into<String>) -> Self {
        self.slug = Some(slug.into());
        self
    }

    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    pub fn with_matcher<F>(mut self, matcher: F) -> Self
    where
        F: Fn(&dyn PostFields, &Query) -> Result<Verdict, MatchError> + Send + Sync + 'static,
    {
        self.matcher = Some(Arc::new(matcher));
        self
    }
}

impl fmt::Debug for RawPost {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RawPost")
            .field("id", &self.id)
            .field("title", &self.title)
            .field("slug", &self.slug)
            .field("date", &self.date)
            .field("fields", &self.fields)
            .field("matcher", &self.matcher.is_some())
            .finish()
    }
}

/// Identifies the post a removal notification refers to.
#[derive(Clone, Debug)]
pub enum PostRef {
    Id(Value),
    Record(RawPost),
}

impl PostRef {
    pub fn id(&self) -> Option<&Value> {
        match self {
            PostRef::Id(id) => Some(id),
            PostRef::Record(record) => record.id.as_ref(),
        }
    }
}

impl From<RawPost> for PostRef {
    fn from(record: RawPost) -> Self {
        PostRef::Record(record)
    }
}

/// Everything a loader can tell a blog.
#[derive(Clone, Debug)]
pub enum LoaderEvent {
    Loaded(Vec<RawPost>),
    Failed(String),
    PostAdded(RawPost),
    PostUpdated(RawPost),
    PostRemoved(PostRef),
}

// Loader contract:
// exactly one `Loaded` or `Failed` for the initial batch, then any number of
// `PostAdded` / `PostUpdated` / `PostRemoved`. The receiver validates each one.

pub trait Loader {
    fn next_event(&mut self) -> Option<LoaderEvent>;
}

impl Loader for VecDeque<LoaderEvent> {
    fn next_event(&mut self) -> Option<LoaderEvent> {
        self.pop_front()
    }
}
