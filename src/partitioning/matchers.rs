//! Classifying requests into partitions.

use std::{collections::HashMap, fmt};

/// The attribute holding a request's classification tag, read by [StringMatcher].
pub const CLASSIFICATION_KEY: &str = "classification";

/// A value attached to a [RequestContext].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttributeValue {
    /// A string, e.g. a classification tag.
    Str(String),
    /// An integer.
    Int(i64),
    /// A flag.
    Bool(bool),
}

/// Read-only attributes of a request, used to decide which partition it belongs to.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestContext {
    attributes: HashMap<String, AttributeValue>,
}

impl RequestContext {
    /// A context without any attributes. Matches nothing by default.
    pub fn new() -> Self {
        Self::default()
    }

    /// A context tagged with a classification, e.g. `"batch"` or `"live"`.
    pub fn with_classification(tag: impl Into<String>) -> Self {
        Self::new().with_attribute(CLASSIFICATION_KEY, AttributeValue::Str(tag.into()))
    }

    /// Set `key` to `value`, replacing any previous value.
    pub fn with_attribute(mut self, key: impl Into<String>, value: AttributeValue) -> Self {
        self.attributes.insert(key.into(), value);
        self
    }

    /// The value of `key`, if set.
    pub fn get(&self, key: &str) -> Option<&AttributeValue> {
        self.attributes.get(key)
    }

    /// The classification tag, if present and a string.
    pub fn classification(&self) -> Option<&str> {
        match self.get(CLASSIFICATION_KEY) {
            Some(AttributeValue::Str(tag)) => Some(tag),
            _ => None,
        }
    }
}

/// Decides whether a request belongs to a partition.
///
/// Must not panic: missing or unexpected attributes are a non-match.
pub trait Matcher: Send + Sync {
    /// Whether `ctx` belongs to the partition.
    fn matches(&self, ctx: &RequestContext) -> bool;
}

impl<F> Matcher for F
where
    F: Fn(&RequestContext) -> bool + Send + Sync,
{
    fn matches(&self, ctx: &RequestContext) -> bool {
        self(ctx)
    }
}

/// Matches requests whose classification tag equals a given string.
#[derive(Debug, Clone)]
pub struct StringMatcher {
    tag: String,
    case_insensitive: bool,
}

impl StringMatcher {
    /// Match requests classified exactly as `tag`.
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            case_insensitive: false,
        }
    }

    /// Ignore case when comparing tags.
    pub fn case_insensitive(self) -> Self {
        Self {
            case_insensitive: true,
            ..self
        }
    }
}

impl Matcher for StringMatcher {
    fn matches(&self, ctx: &RequestContext) -> bool {
        match ctx.classification() {
            Some(tag) if self.case_insensitive => tag.to_lowercase() == self.tag.to_lowercase(),
            Some(tag) => tag == self.tag,
            None => false,
        }
    }
}

impl fmt::Display for StringMatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", CLASSIFICATION_KEY, self.tag)
    }
}
