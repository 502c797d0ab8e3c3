//! Subscription filter predicates.

use crate::types::Event;
use std::collections::HashMap;

/// Matcher for a single attribute value.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AttrMatcher {
    /// Value must equal exactly.
    Exact(String),
    /// Value must start with the prefix.
    Prefix(String),
    /// Value must be one of the listed values.
    AnyOf(Vec<String>),
}

impl AttrMatcher {
    fn matches(&self, value: &str) -> bool {
        match self {
            AttrMatcher::Exact(expected) => value == expected,
            AttrMatcher::Prefix(prefix) => value.starts_with(prefix.as_str()),
            AttrMatcher::AnyOf(allowed) => allowed.iter().any(|v| v == value),
        }
    }
}

/// Conjunctive filter over an event's type and attributes.
///
/// Every matcher must pass for the predicate to fire; an absent attribute
/// never matches. The empty predicate matches every event.
#[derive(Clone, Debug, Default)]
pub struct Predicate {
    /// Matcher applied to the top-level event type.
    event_type: Option<AttrMatcher>,

    /// Matchers applied to named attributes.
    attributes: HashMap<String, AttrMatcher>,
}

impl Predicate {
    /// Matches every event.
    pub fn match_all() -> Self {
        Self::default()
    }

    /// Matches events whose type equals `value`.
    pub fn event_type_exact(value: impl Into<String>) -> Self {
        Self {
            event_type: Some(AttrMatcher::Exact(value.into())),
            ..Default::default()
        }
    }

    /// Matches events whose type starts with `prefix`.
    pub fn event_type_prefix(prefix: impl Into<String>) -> Self {
        Self {
            event_type: Some(AttrMatcher::Prefix(prefix.into())),
            ..Default::default()
        }
    }

    /// Require an attribute to equal `value`.
    pub fn attr_exact(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes
            .insert(key.into(), AttrMatcher::Exact(value.into()));
        self
    }

    /// Require an attribute to start with `prefix`.
    pub fn attr_prefix(mut self, key: impl Into<String>, prefix: impl Into<String>) -> Self {
        self.attributes
            .insert(key.into(), AttrMatcher::Prefix(prefix.into()));
        self
    }

    /// Require an attribute to be one of `values`.
    pub fn attr_any_of(mut self, key: impl Into<String>, values: Vec<String>) -> Self {
        self.attributes
            .insert(key.into(), AttrMatcher::AnyOf(values));
        self
    }

    /// Evaluate the predicate against an event.
    pub fn matches(&self, event: &Event) -> bool {
        if let Some(matcher) = &self.event_type {
            if !matcher.matches(&event.event_type) {
                return false;
            }
        }

        self.attributes.iter().all(|(key, matcher)| {
            event.attr(key).map_or(false, |value| matcher.matches(value))
        })
    }
}
