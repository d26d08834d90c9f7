use serde_json::Value;

use crate::defs::MatchError;
use crate::defs::PostFields;
use crate::defs::Query;
use crate::defs::QueryMatcher;
use crate::defs::Verdict;

/// Field-equality matcher.
///
/// The query is an object; a post matches when every key equals the post's
/// field of that name. Array fields match when they contain the expected value.
/// `id`, `title` and `slug` are matchable like any other field. Anything other
/// than an object matches nothing.
#[derive(Clone, Copy, Debug, Default)]
pub struct BaselineQueryMatcher;

impl QueryMatcher for BaselineQueryMatcher {
    fn matches(&self, query: &Query, post: &dyn PostFields) -> Result<Verdict, MatchError> {
        let Some(conditions) = query.as_object() else {
            return Ok(Verdict::NoMatch);
        };
        let matched = conditions.iter().all(|(name, expected)| {
            field_value(post, name)
                .map(|actual| field_matches(&actual, expected))
                .unwrap_or(false)
        });
        Ok(matched.into())
    }
}

fn field_value(post: &dyn PostFields, name: &str) -> Option<Value> {
    match name {
        "id" => Some(Value::String(post.id().to_owned())),
        "title" => Some(Value::String(post.title().to_owned())),
        "slug" => Some(Value::String(post.slug().to_owned())),
        _ => post.field(name).cloned(),
    }
}

fn field_matches(actual: &Value, expected: &Value) -> bool {
    match (actual, expected) {
        (Value::Array(items), expected) if !expected.is_array() => {
            items.iter().any(|item| loosely_equal(item, expected))
        }
        _ => loosely_equal(actual, expected),
    }
}

// Ids are stored as strings, so `{"id": 1}` has to match "1".
fn loosely_equal(actual: &Value, expected: &Value) -> bool {
    match (actual, expected) {
        (Value::String(text), Value::Number(number)) | (Value::Number(number), Value::String(text)) => {
            *text == number.to_string()
        }
        _ => actual == expected,
    }
}
