use crate::storage::{CollectionShape, SectionKind};
use std::fmt;

/// Built-in collections and their backing files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CollectionKind {
    Users,
    Financial,
    Marketplace,
    FeatureFlags,
    Fields,
    Staff,
    Animals,
    Assignments,
    Messages,
    Commodities,
    Docs,
    Contacts,
    Test,
}

impl CollectionKind {
    pub const ALL: [CollectionKind; 13] = [
        Self::Users,
        Self::Financial,
        Self::Marketplace,
        Self::FeatureFlags,
        Self::Fields,
        Self::Staff,
        Self::Animals,
        Self::Assignments,
        Self::Messages,
        Self::Commodities,
        Self::Docs,
        Self::Contacts,
        Self::Test,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Self::Users => "users",
            Self::Financial => "financial",
            Self::Marketplace => "marketplace",
            Self::FeatureFlags => "featureFlags",
            Self::Fields => "fields",
            Self::Staff => "staff",
            Self::Animals => "animals",
            Self::Assignments => "assignments",
            Self::Messages => "messages",
            Self::Commodities => "commodities",
            Self::Docs => "docs",
            Self::Contacts => "contacts",
            Self::Test => "test",
        }
    }

    pub fn file_name(self) -> &'static str {
        match self {
            Self::Users => "users.json",
            Self::Financial => "financial.json",
            Self::Marketplace => "marketplace.json",
            Self::FeatureFlags => "feature-flags.json",
            Self::Fields => "fields.json",
            Self::Staff => "staff.json",
            Self::Animals => "animals.json",
            Self::Assignments => "assignments.json",
            Self::Messages => "messages.json",
            Self::Commodities => "commodities.json",
            Self::Docs => "docs.json",
            Self::Contacts => "contacts.json",
            Self::Test => "test.json",
        }
    }

    pub fn shape(self) -> CollectionShape {
        match self {
            Self::Financial => CollectionShape::aggregate(&[("accounts", SectionKind::List)]),
            Self::Marketplace => CollectionShape::aggregate(&[
                ("offers", SectionKind::List),
                ("transactions", SectionKind::List),
            ]),
            Self::Messages => CollectionShape::aggregate(&[("messages", SectionKind::List)]),
            Self::FeatureFlags => CollectionShape::aggregate(&[("flags", SectionKind::Map)]),
            Self::Commodities => CollectionShape::aggregate(&[("holdings", SectionKind::List)]),
            Self::Users
            | Self::Fields
            | Self::Staff
            | Self::Animals
            | Self::Assignments
            | Self::Docs
            | Self::Contacts
            | Self::Test => CollectionShape::Array,
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.name() == name)
    }
}

impl fmt::Display for CollectionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
