use crate::error::{ConnectorError, ConnectorResult};
use crate::filter::FilterNode;
use crate::filter::grammar::{Grammar, ScopeField, Target, grammar_for};
use crate::resource::{Attribute, AttributeValue, ResourceType};
use crate::schema::CustomSchemas;
use log::trace;

/// Search parameters collected from the filter.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryScope {
    pub customer: Option<String>,
    pub domain: Option<String>,
    pub user_key: Option<String>,
    pub group_key: Option<String>,
    pub member_key: Option<String>,
    pub roles: Option<String>,
    pub parent_org_unit_path: Option<String>,
    pub org_unit_type: Option<String>,
    pub product_id: Option<String>,
    pub sku_id: Option<String>,
    /// Direct-fetch key; when set the search is a single lookup.
    pub key: Option<String>,
}

impl QueryScope {
    fn slot(&mut self, field: ScopeField) -> &mut Option<String> {
        match field {
            ScopeField::Customer => &mut self.customer,
            ScopeField::Domain => &mut self.domain,
            ScopeField::UserKey => &mut self.user_key,
            ScopeField::GroupKey => &mut self.group_key,
            ScopeField::MemberKey => &mut self.member_key,
            ScopeField::Roles => &mut self.roles,
            ScopeField::ParentOrgUnitPath => &mut self.parent_org_unit_path,
            ScopeField::OrgUnitType => &mut self.org_unit_type,
            ScopeField::ProductId => &mut self.product_id,
            ScopeField::SkuId => &mut self.sku_id,
        }
    }

    fn tenant(&self) -> Option<ScopeField> {
        if self.customer.is_some() {
            Some(ScopeField::Customer)
        } else if self.domain.is_some() {
            Some(ScopeField::Domain)
        } else if self.user_key.is_some() {
            Some(ScopeField::UserKey)
        } else {
            None
        }
    }

    fn set(&mut self, field: ScopeField, attribute: &str, value: String) -> ConnectorResult<()> {
        if field.is_tenant() {
            if let Some(existing) = self.tenant().filter(|t| *t != field) {
                return Err(ConnectorError::invalid_attribute(
                    attribute,
                    format!(
                        "cannot be combined with {}; customer, domain and userKey are exclusive",
                        existing.parameter()
                    ),
                ));
            }
        }
        store(self.slot(field), attribute, value)
    }

    fn set_key(&mut self, attribute: &str, value: String) -> ConnectorResult<()> {
        store(&mut self.key, attribute, value)
    }
}

fn store(slot: &mut Option<String>, attribute: &str, value: String) -> ConnectorResult<()> {
    match slot {
        Some(existing) if *existing != value => Err(ConnectorError::invalid_attribute(
            attribute,
            format!("conflicting values '{}' and '{}'", existing, value),
        )),
        _ => {
            *slot = Some(value);
            Ok(())
        }
    }
}

/// Result of translating a filter.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Translation {
    pub query: Option<String>,
    pub scope: QueryScope,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Operator {
    Equals,
    Contains,
    StartsWith,
}

/// Translate `node` into the query grammar of `resource_type`.
///
/// `custom` supplies the flattened custom-schema names accepted for accounts.
pub fn translate(
    resource_type: ResourceType,
    node: Option<&FilterNode>,
    custom: &CustomSchemas,
) -> ConnectorResult<Translation> {
    let mut translation = Translation::default();
    let Some(node) = node else {
        return Ok(translation);
    };
    let grammar = grammar_for(resource_type);
    if resource_type == ResourceType::Membership {
        membership(grammar, node, &mut translation.scope)?;
    } else {
        let translator = Translator { grammar, custom };
        translation.query = translator.node(node, &mut translation.scope, true)?;
    }
    trace!("Translated {} filter into {:?}", resource_type, translation);
    Ok(translation)
}

struct Translator<'a> {
    grammar: &'static Grammar,
    custom: &'a CustomSchemas,
}

impl Translator<'_> {
    fn node(&self, node: &FilterNode, scope: &mut QueryScope, top_level: bool) -> ConnectorResult<Option<String>> {
        match node {
            FilterNode::Equals(a) => self.leaf(a, Operator::Equals, scope, top_level),
            FilterNode::Contains(a) => self.leaf(a, Operator::Contains, scope, top_level),
            FilterNode::StartsWith(a) => self.leaf(a, Operator::StartsWith, scope, top_level),
            FilterNode::ContainsAll(a) => {
                let field = self.query_field(a, node)?;
                let terms = a
                    .values
                    .iter()
                    .map(|v| Ok(term(field.as_str(), Operator::Contains, &scalar(a, v)?)))
                    .collect::<ConnectorResult<Vec<String>>>()?;
                Ok(join(terms))
            }
            // The directory has no disjunction; both compositions flatten to the
            // same space-joined fragment.
            FilterNode::And(children) | FilterNode::Or(children) => {
                let mut terms = Vec::new();
                for child in children {
                    if let Some(fragment) = self.node(child, scope, false)? {
                        terms.push(fragment);
                    }
                }
                Ok(join(terms))
            }
            FilterNode::Not(_) | FilterNode::EndsWith(_) | FilterNode::Comparison(..) => {
                Err(unsupported(self.grammar.resource_type, node))
            }
        }
    }

    fn resolve(&self, name: &str) -> ConnectorResult<ResolvedTarget> {
        if let Some(target) = self.grammar.lookup(name) {
            return Ok(ResolvedTarget::Grammar(target));
        }
        if self.grammar.custom_fields {
            if let Some(field) = self.custom.field(name) {
                return Ok(ResolvedTarget::Custom(field.attribute_name()));
            }
        }
        Err(ConnectorError::invalid_attribute(
            name,
            format!("cannot be used to filter {}", self.grammar.resource_type),
        ))
    }

    fn query_field(&self, attribute: &Attribute, node: &FilterNode) -> ConnectorResult<String> {
        match self.resolve(&attribute.name)? {
            ResolvedTarget::Grammar(Target::Query(field) | Target::QueryOrKey(field)) => Ok(field.to_string()),
            ResolvedTarget::Custom(field) => Ok(field),
            ResolvedTarget::Grammar(_) => Err(unsupported_on(self.grammar.resource_type, node, &attribute.name)),
        }
    }

    fn leaf(
        &self,
        attribute: &Attribute,
        op: Operator,
        scope: &mut QueryScope,
        top_level: bool,
    ) -> ConnectorResult<Option<String>> {
        let value = single_scalar(attribute)?;
        match (self.resolve(&attribute.name)?, op) {
            (ResolvedTarget::Grammar(Target::Key), Operator::Equals) => {
                scope.set_key(&attribute.name, value)?;
                Ok(None)
            }
            (ResolvedTarget::Grammar(Target::QueryOrKey(_)), Operator::Equals) if top_level => {
                scope.set_key(&attribute.name, value)?;
                Ok(None)
            }
            (ResolvedTarget::Grammar(Target::Scope(field)), Operator::Equals) => {
                scope.set(field, &attribute.name, value)?;
                Ok(None)
            }
            (ResolvedTarget::Grammar(Target::Query(field) | Target::QueryOrKey(field)), op) => {
                Ok(Some(term(field, op, &value)))
            }
            (ResolvedTarget::Custom(field), op) => Ok(Some(term(&field, op, &value))),
            (ResolvedTarget::Grammar(_), op) => Err(ConnectorError::unsupported(format!(
                "{:?} on {} for {}",
                op, attribute.name, self.grammar.resource_type
            ))),
        }
    }
}

enum ResolvedTarget {
    Grammar(Target),
    Custom(String),
}

/// Membership filters address edges: a group, a member, or one exact edge.
fn membership(grammar: &Grammar, node: &FilterNode, scope: &mut QueryScope) -> ConnectorResult<()> {
    match node {
        FilterNode::Equals(attribute) => {
            let value = single_scalar(attribute)?;
            match grammar.lookup(&attribute.name) {
                Some(Target::Key) => scope.set_key(&attribute.name, value),
                Some(Target::Scope(field)) => scope.set(field, &attribute.name, value),
                _ => Err(ConnectorError::invalid_attribute(
                    &attribute.name,
                    format!("cannot be used to filter {}", grammar.resource_type),
                )),
            }
        }
        FilterNode::And(children) => {
            let pair = match children.as_slice() {
                [FilterNode::Equals(a), FilterNode::Equals(b)] => Some((a, b)),
                _ => None,
            };
            let edge = pair.and_then(|(a, b)| {
                if a.is("group") && b.is("member") {
                    Some((a, b))
                } else if a.is("member") && b.is("group") {
                    Some((b, a))
                } else {
                    None
                }
            });
            match edge {
                Some((group, member)) => {
                    let key = format!("{}/{}", single_scalar(group)?, single_scalar(member)?);
                    scope.set_key("__UID__", key)
                }
                None => Err(ConnectorError::unsupported(
                    "Member filters combine only Equals(group) and Equals(member)",
                )),
            }
        }
        other => Err(unsupported(grammar.resource_type, other)),
    }
}

fn unsupported(resource_type: ResourceType, node: &FilterNode) -> ConnectorError {
    ConnectorError::unsupported(format!("{} filter on {}", node.kind(), resource_type))
}

fn unsupported_on(resource_type: ResourceType, node: &FilterNode, name: &str) -> ConnectorError {
    ConnectorError::unsupported(format!("{} filter on {} for {}", node.kind(), name, resource_type))
}

fn scalar(attribute: &Attribute, value: &AttributeValue) -> ConnectorResult<String> {
    match value {
        AttributeValue::String(s) => Ok(s.clone()),
        AttributeValue::Boolean(b) => Ok(b.to_string()),
        AttributeValue::Integer(i) => Ok(i.to_string()),
        other => Err(ConnectorError::invalid_attribute(
            &attribute.name,
            format!("{} values cannot be used in a filter", other.type_name()),
        )),
    }
}

fn single_scalar(attribute: &Attribute) -> ConnectorResult<String> {
    match attribute.single()? {
        Some(value) => scalar(attribute, value),
        None => Err(ConnectorError::invalid_attribute(
            &attribute.name,
            "filter requires a value",
        )),
    }
}

/// One query term. Values with whitespace are single-quoted; quotes are escaped.
fn term(field: &str, op: Operator, value: &str) -> String {
    let escaped = value.replace('\'', "\\'");
    let value = if value.chars().any(char::is_whitespace) {
        format!("'{}'", escaped)
    } else {
        escaped
    };
    match op {
        Operator::Equals => format!("{}={}", field, value),
        Operator::Contains => format!("{}:{}", field, value),
        Operator::StartsWith => format!("{}:{}*", field, value),
    }
}

fn join(terms: Vec<String>) -> Option<String> {
    if terms.is_empty() {
        None
    } else {
        Some(terms.join(" "))
    }
}
