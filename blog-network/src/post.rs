//! A single ingested post and its position in its blog's chronological list.

use crate::types::{MatchError, MatchFn, PostFields, Query, QueryMatcher, Verdict};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value};
use std::fmt;

/// Stable handle to a post's slot inside a [`crate::Blog`].
///
/// Handles stay valid until the post is removed; a removed slot may be reused
/// by a later post.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SlotId(pub(crate) usize);

/// A validated post.
///
/// `prev` points at the next more recent post of the same blog and `next` at
/// the next older one; both are `None` at the ends of the list.
#[derive(Clone, Serialize)]
pub struct Post {
    id: String,
    title: String,
    slug: String,
    date: DateTime<Utc>,
    #[serde(flatten)]
    fields: Map<String, Value>,
    #[serde(skip)]
    matcher: Option<MatchFn>,
    #[serde(skip)]
    pub(crate) prev: Option<SlotId>,
    #[serde(skip)]
    pub(crate) next: Option<SlotId>,
}

impl Post {
    pub(crate) fn new(
        id: String,
        title: String,
        slug: String,
        date: DateTime<Utc>,
        fields: Map<String, Value>,
        matcher: Option<MatchFn>,
    ) -> Self {
        Self {
            id,
            title,
            slug,
            date,
            fields,
            matcher,
            prev: None,
            next: None,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn slug(&self) -> &str {
        &self.slug
    }

    pub fn date(&self) -> DateTime<Utc> {
        self.date
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }

    pub fn field(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    pub fn has_matcher(&self) -> bool {
        self.matcher.is_some()
    }

    pub fn prev_slot(&self) -> Option<SlotId> {
        self.prev
    }

    pub fn next_slot(&self) -> Option<SlotId> {
        self.next
    }

    /// Test this post against `query`, preferring the post's own match
    /// capability over the shared `fallback` matcher.
    pub fn matches(&self, query: &Query, fallback: &dyn QueryMatcher) -> Result<Verdict, MatchError> {
        match &self.matcher {
            Some(matcher) => matcher(self as &dyn PostFields, query),
            None => fallback.matches(query, self),
        }
    }

    pub(crate) fn set_content(
        &mut self,
        title: String,
        slug: String,
        date: DateTime<Utc>,
        fields: Map<String, Value>,
        matcher: Option<MatchFn>,
    ) {
        self.title = title;
        self.slug = slug;
        self.date = date;
        self.fields = fields;
        self.matcher = matcher;
    }
}

impl PostFields for Post {
    fn id(&self) -> &str {
        &self.id
    }

    fn title(&self) -> &str {
        &self.title
    }

    fn slug(&self) -> &str {
        &self.slug
    }

    fn date(&self) -> DateTime<Utc> {
        self.date
    }

    fn field(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }
}

impl fmt::Debug for Post {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Post")
            .field("id", &self.id)
            .field("title", &self.title)
            .field("slug", &self.slug)
            .field("date", &self.date)
            .field("fields", &self.fields)
            .field("prev", &self.prev)
            .field("next", &self.next)
            .finish()
    }
}

impl fmt::Display for Post {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{}] {} ({})", self.date.format("%Y-%m-%d"), self.id, self.title, self.slug)
    }
}
