//! Provider-agnostic filter trees and their translation into directory queries.
//!
//! A [`FilterNode`] arrives with a search and lives for that one call. The
//! [`translate`] function turns it into a [`Translation`]: an optional query
//! fragment in the directory's `field:value` grammar plus a [`QueryScope`] with
//! the parameters that are not part of the query text (tenant, parent unit,
//! direct-fetch key).

pub mod grammar;
pub mod translator;

pub use translator::{QueryScope, Translation, translate};

use crate::resource::{Attribute, AttributeValue};

/// Comparison operators. The directory has no ordering queries, so these are
/// never translatable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComparisonOp {
    LessThan,
    LessOrEqual,
    GreaterThan,
    GreaterOrEqual,
}

/// A search filter.
#[derive(Debug, Clone, PartialEq)]
pub enum FilterNode {
    Equals(Attribute),
    StartsWith(Attribute),
    EndsWith(Attribute),
    Contains(Attribute),
    /// Every value must be contained.
    ContainsAll(Attribute),
    And(Vec<FilterNode>),
    Or(Vec<FilterNode>),
    Not(Box<FilterNode>),
    Comparison(ComparisonOp, Attribute),
}

fn attribute(name: impl Into<String>, value: impl Into<AttributeValue>) -> Attribute {
    Attribute::new(name, vec![value.into()])
}

impl FilterNode {
    pub fn equals(name: impl Into<String>, value: impl Into<AttributeValue>) -> Self {
        FilterNode::Equals(attribute(name, value))
    }

    pub fn starts_with(name: impl Into<String>, value: impl Into<AttributeValue>) -> Self {
        FilterNode::StartsWith(attribute(name, value))
    }

    pub fn ends_with(name: impl Into<String>, value: impl Into<AttributeValue>) -> Self {
        FilterNode::EndsWith(attribute(name, value))
    }

    pub fn contains(name: impl Into<String>, value: impl Into<AttributeValue>) -> Self {
        FilterNode::Contains(attribute(name, value))
    }

    pub fn contains_all<V: Into<AttributeValue>>(
        name: impl Into<String>,
        values: impl IntoIterator<Item = V>,
    ) -> Self {
        FilterNode::ContainsAll(Attribute::new(
            name,
            values.into_iter().map(Into::into).collect(),
        ))
    }

    pub fn and(children: impl IntoIterator<Item = FilterNode>) -> Self {
        FilterNode::And(children.into_iter().collect())
    }

    pub fn or(children: impl IntoIterator<Item = FilterNode>) -> Self {
        FilterNode::Or(children.into_iter().collect())
    }

    pub fn not(child: FilterNode) -> Self {
        FilterNode::Not(Box::new(child))
    }

    pub fn compare(op: ComparisonOp, name: impl Into<String>, value: impl Into<AttributeValue>) -> Self {
        FilterNode::Comparison(op, attribute(name, value))
    }

    /// Short name of the node kind, for error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            FilterNode::Equals(_) => "Equals",
            FilterNode::StartsWith(_) => "StartsWith",
            FilterNode::EndsWith(_) => "EndsWith",
            FilterNode::Contains(_) => "Contains",
            FilterNode::ContainsAll(_) => "ContainsAll",
            FilterNode::And(_) => "And",
            FilterNode::Or(_) => "Or",
            FilterNode::Not(_) => "Not",
            FilterNode::Comparison(..) => "Comparison",
        }
    }
}
