use crate::types::{NetworkError, Query, Result};
use crate::utils::is_truthy;
use serde_json::{Map, Value};
use std::collections::HashSet;

/// Option keys accepted by `select()` and `count()`.
pub const RECOGNIZED_OPTIONS: [&str; 8] = [
    "query", "limit", "offset", "page", "random", "not", "fill", "distinct",
];

/// Options for `select()` / `count()` on a blog or a network.
///
/// `limit`, `offset` and `page` are kept signed: negative values are legal
/// input and simply select nothing.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SelectOptions {
    pub query: Option<Query>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
    pub page: Option<i64>,
    pub random: bool,
    pub not: Exclusions,
    pub fill: bool,
    pub distinct: bool,
}

impl SelectOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn query(mut self, query: impl Into<Query>) -> Self {
        self.query = Some(query.into());
        self
    }

    pub fn limit(mut self, limit: i64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: i64) -> Self {
        self.offset = Some(offset);
        self
    }

    pub fn page(mut self, page: i64) -> Self {
        self.page = Some(page);
        self
    }

    pub fn random(mut self, random: bool) -> Self {
        self.random = random;
        self
    }

    pub fn fill(mut self, fill: bool) -> Self {
        self.fill = fill;
        self
    }

    pub fn distinct(mut self, distinct: bool) -> Self {
        self.distinct = distinct;
        self
    }

    /// Exclude a blog (`"name"`) or a single post (`"name:id"`, or a bare id
    /// when selecting from a single blog).
    pub fn exclude(mut self, key: impl Into<String>) -> Self {
        self.not.insert(key);
        self
    }

    /// Parse options from an untyped JSON object. Unknown keys are rejected
    /// before any value is looked at.
    pub fn from_json(value: &Value) -> Result<Self> {
        let options = match value {
            Value::Null => return Ok(Self::default()),
            Value::Object(options) => options,
            other => {
                return Err(NetworkError::InvalidOption {
                    key: "options".to_string(),
                    reason: format!("expected an object, got {}", other),
                })
            }
        };

        if let Some(key) = options.keys().find(|key| !RECOGNIZED_OPTIONS.contains(&key.as_str())) {
            return Err(NetworkError::UnsupportedOption { key: key.clone() });
        }

        Ok(Self {
            query: options.get("query").filter(|query| !query.is_null()).cloned(),
            limit: integer_option(options, "limit")?,
            offset: integer_option(options, "offset")?,
            page: integer_option(options, "page")?,
            random: flag_option(options, "random")?,
            not: match options.get("not") {
                Some(not) => Exclusions::from_json(not)?,
                None => Exclusions::default(),
            },
            fill: flag_option(options, "fill")?,
            distinct: flag_option(options, "distinct")?,
        })
    }

    /// Resolve `page`/`offset`/`limit` into the window to collect, or `None`
    /// when the request selects nothing (negative offset or limit).
    pub(crate) fn window(&self) -> Option<Window> {
        let limit = self.limit.unwrap_or(0);
        let mut offset = self.offset.unwrap_or(0);
        if let Some(page) = self.page.filter(|page| *page != 0) {
            if limit != 0 {
                offset = page.saturating_sub(1).saturating_mul(limit);
            }
        }
        if offset < 0 || limit < 0 {
            return None;
        }
        Some(Window {
            offset: usize::try_from(offset).unwrap_or(usize::MAX),
            limit: usize::try_from(limit).ok().filter(|limit| *limit > 0),
        })
    }
}

/// How many matches to skip and how many to keep (`None` keeps everything).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Window {
    pub offset: usize,
    pub limit: Option<usize>,
}

impl Window {
    pub fn single() -> Self {
        Self { offset: 0, limit: Some(1) }
    }

    pub fn unbounded() -> Self {
        Self { offset: 0, limit: None }
    }

    pub fn is_full(&self, collected: usize) -> bool {
        self.limit.is_some_and(|limit| collected >= limit)
    }
}

/// The normalized `not` option: a set of blog names and `blog:id` keys.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Exclusions(HashSet<String>);

impl Exclusions {
    pub fn insert(&mut self, key: impl Into<String>) {
        self.0.insert(key.into());
    }

    pub fn contains(&self, key: &str) -> bool {
        self.0.contains(key)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    /// Accepts a list of keys, a key -> truthy mapping, or a single key.
    pub fn from_json(value: &Value) -> Result<Self> {
        let mut exclusions = Self::default();
        match value {
            Value::Null => {}
            Value::Array(keys) => {
                for key in keys {
                    exclusions.insert(exclusion_key(key)?);
                }
            }
            Value::Object(keys) => {
                for (key, flag) in keys {
                    if is_truthy(flag) {
                        exclusions.insert(key.clone());
                    }
                }
            }
            scalar => exclusions.insert(exclusion_key(scalar)?),
        }
        Ok(exclusions)
    }
}

impl<S: Into<String>> FromIterator<S> for Exclusions {
    fn from_iter<I: IntoIterator<Item = S>>(keys: I) -> Self {
        Self(keys.into_iter().map(Into::into).collect())
    }
}

fn exclusion_key(value: &Value) -> Result<String> {
    match value {
        Value::String(key) => Ok(key.clone()),
        Value::Number(number) => Ok(number.to_string()),
        other => Err(NetworkError::InvalidOption {
            key: "not".to_string(),
            reason: format!("cannot use {} as an exclusion key", other),
        }),
    }
}

fn integer_option(options: &Map<String, Value>, key: &str) -> Result<Option<i64>> {
    let invalid = |reason: String| NetworkError::InvalidOption {
        key: key.to_string(),
        reason,
    };
    match options.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(number)) => match number.as_i64() {
            Some(n) => Ok(Some(n)),
            None => number
                .as_f64()
                .map(|n| Some(n.trunc() as i64))
                .ok_or_else(|| invalid(format!("{} is not an integer", number))),
        },
        Some(Value::String(text)) => text
            .trim()
            .parse::<f64>()
            .ok()
            .filter(|n| n.is_finite())
            .map(|n| Some(n.trunc() as i64))
            .ok_or_else(|| invalid(format!("{:?} is not a number", text))),
        Some(other) => Err(invalid(format!("expected a number, got {}", other))),
    }
}

fn flag_option(options: &Map<String, Value>, key: &str) -> Result<bool> {
    match options.get(key) {
        None | Some(Value::Null) => Ok(false),
        Some(Value::Bool(flag)) => Ok(*flag),
        Some(other) => Err(NetworkError::InvalidOption {
            key: key.to_string(),
            reason: format!("expected a boolean, got {}", other),
        }),
    }
}
