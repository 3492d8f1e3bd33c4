//! Per-resource query grammars.
//!
//! Each table maps a connector attribute name to what a filter on it becomes.
//! Names not listed are rejected.

use crate::resource::ResourceType;
use crate::resource::names::{NAME, UID};

/// Search parameters that live outside the query text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeField {
    Customer,
    Domain,
    UserKey,
    GroupKey,
    MemberKey,
    Roles,
    ParentOrgUnitPath,
    OrgUnitType,
    ProductId,
    SkuId,
}

impl ScopeField {
    /// Tenant scopes select the population to search; at most one may be given.
    pub fn is_tenant(&self) -> bool {
        matches!(self, ScopeField::Customer | ScopeField::Domain | ScopeField::UserKey)
    }

    /// Request parameter name.
    pub fn parameter(&self) -> &'static str {
        match self {
            ScopeField::Customer => "customer",
            ScopeField::Domain => "domain",
            ScopeField::UserKey => "userKey",
            ScopeField::GroupKey => "groupKey",
            ScopeField::MemberKey => "memberKey",
            ScopeField::Roles => "roles",
            ScopeField::ParentOrgUnitPath => "orgUnitPath",
            ScopeField::OrgUnitType => "type",
            ScopeField::ProductId => "productId",
            ScopeField::SkuId => "skuId",
        }
    }
}

/// What a filter on an attribute translates into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    /// A term on this provider query field.
    Query(&'static str),
    /// A query term, except that a top-level Equals fetches the object directly.
    QueryOrKey(&'static str),
    /// Only Equals is supported, and it fetches the object directly.
    Key,
    /// Only Equals is supported, and it sets a search parameter.
    Scope(ScopeField),
}

/// Query grammar of one resource type.
#[derive(Debug)]
pub struct Grammar {
    pub resource_type: ResourceType,
    fields: &'static [(&'static str, Target)],
    /// Whether flattened custom-schema attributes are queryable.
    pub custom_fields: bool,
}

impl Grammar {
    /// Resolve a connector attribute name, ignoring case.
    pub fn lookup(&self, name: &str) -> Option<Target> {
        self.fields
            .iter()
            .find(|(field, _)| field.eq_ignore_ascii_case(name))
            .map(|(_, target)| *target)
    }

    /// Names accepted by this grammar.
    pub fn names(&self) -> impl Iterator<Item = &'static str> {
        self.fields.iter().map(|(name, _)| *name)
    }
}

static ACCOUNT: Grammar = Grammar {
    resource_type: ResourceType::Account,
    fields: &[
        (UID, Target::Key),
        (NAME, Target::QueryOrKey("email")),
        ("aliases", Target::Query("email")),
        ("givenName", Target::Query("givenName")),
        ("familyName", Target::Query("familyName")),
        ("fullName", Target::Query("name")),
        ("isAdmin", Target::Query("isAdmin")),
        ("isDelegatedAdmin", Target::Query("isDelegatedAdmin")),
        ("suspended", Target::Query("isSuspended")),
        ("orgUnitPath", Target::Query("orgUnitPath")),
        ("externalIds", Target::Query("externalId")),
        ("phones", Target::Query("phone")),
        ("organizations", Target::Query("orgName")),
        ("customer", Target::Scope(ScopeField::Customer)),
        ("domain", Target::Scope(ScopeField::Domain)),
    ],
    custom_fields: true,
};

static GROUP: Grammar = Grammar {
    resource_type: ResourceType::Group,
    fields: &[
        (UID, Target::Key),
        (NAME, Target::QueryOrKey("email")),
        ("aliases", Target::Query("email")),
        ("name", Target::Query("name")),
        ("memberKey", Target::Query("memberKey")),
        ("customer", Target::Scope(ScopeField::Customer)),
        ("domain", Target::Scope(ScopeField::Domain)),
        ("userKey", Target::Scope(ScopeField::UserKey)),
    ],
    custom_fields: false,
};

static MEMBERSHIP: Grammar = Grammar {
    resource_type: ResourceType::Membership,
    fields: &[
        (UID, Target::Key),
        ("group", Target::Scope(ScopeField::GroupKey)),
        ("member", Target::Scope(ScopeField::MemberKey)),
        ("role", Target::Scope(ScopeField::Roles)),
    ],
    custom_fields: false,
};

static ORG_UNIT: Grammar = Grammar {
    resource_type: ResourceType::OrgUnit,
    fields: &[
        (UID, Target::Key),
        ("orgUnitPath", Target::Key),
        ("parentOrgUnitPath", Target::Scope(ScopeField::ParentOrgUnitPath)),
        ("type", Target::Scope(ScopeField::OrgUnitType)),
    ],
    custom_fields: false,
};

static LICENSE_ASSIGNMENT: Grammar = Grammar {
    resource_type: ResourceType::LicenseAssignment,
    fields: &[
        (UID, Target::Key),
        ("productId", Target::Scope(ScopeField::ProductId)),
        ("skuId", Target::Scope(ScopeField::SkuId)),
        ("userId", Target::Scope(ScopeField::UserKey)),
    ],
    custom_fields: false,
};

/// The grammar of a resource type.
pub fn grammar_for(resource_type: ResourceType) -> &'static Grammar {
    match resource_type {
        ResourceType::Account => &ACCOUNT,
        ResourceType::Group => &GROUP,
        ResourceType::Membership => &MEMBERSHIP,
        ResourceType::OrgUnit => &ORG_UNIT,
        ResourceType::LicenseAssignment => &LICENSE_ASSIGNMENT,
    }
}
