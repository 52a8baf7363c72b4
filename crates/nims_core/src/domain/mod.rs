use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The five network domains incidents are logged against.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum NetworkDomain {
    Transport,
    FileAccess,
    RadioAccess,
    Core,
    BackboneInternet,
}

impl NetworkDomain {
    pub const ALL: [NetworkDomain; 5] = [
        NetworkDomain::Transport,
        NetworkDomain::FileAccess,
        NetworkDomain::RadioAccess,
        NetworkDomain::Core,
        NetworkDomain::BackboneInternet,
    ];

    /// Stable storage/URL tag.
    pub fn as_str(&self) -> &'static str {
        match self {
            NetworkDomain::Transport => "transport",
            NetworkDomain::FileAccess => "file_access",
            NetworkDomain::RadioAccess => "radio_access",
            NetworkDomain::Core => "core",
            NetworkDomain::BackboneInternet => "backbone_internet",
        }
    }

    pub fn parse(tag: &str) -> Option<NetworkDomain> {
        match tag {
            "transport" => Some(NetworkDomain::Transport),
            "file_access" => Some(NetworkDomain::FileAccess),
            "radio_access" => Some(NetworkDomain::RadioAccess),
            "core" => Some(NetworkDomain::Core),
            "backbone_internet" => Some(NetworkDomain::BackboneInternet),
            _ => None,
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            NetworkDomain::Transport => "Transport Networks",
            NetworkDomain::FileAccess => "File Access Networks",
            NetworkDomain::RadioAccess => "Radio Access Networks",
            NetworkDomain::Core => "Core Networks",
            NetworkDomain::BackboneInternet => "Backbone Internet Networks",
        }
    }
}

/// Responsibility assignment for a transport section (extremity A, B or both).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Responsibility {
    A,
    B,
    Both,
}

impl Responsibility {
    pub fn as_str(&self) -> &'static str {
        match self {
            Responsibility::A => "A",
            Responsibility::B => "B",
            Responsibility::Both => "Both",
        }
    }

    pub fn parse(raw: &str) -> Option<Responsibility> {
        match raw {
            "A" => Some(Responsibility::A),
            "B" => Some(Responsibility::B),
            "Both" => Some(Responsibility::Both),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct TransportFields {
    pub region_loop: String,
    pub system_capacity: String,
    pub dot_extremity_a: Option<String>,
    pub extremity_a: String,
    pub dot_extremity_b: String,
    pub extremity_b: String,
    pub responsibility: Option<Responsibility>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct FileAccessFields {
    pub do_wilaya: String,
    pub zone_metro: String,
    pub site: String,
    pub ip_address: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct RadioAccessFields {
    pub do_wilaya: String,
    pub site: String,
    pub ip_address: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct CoreFields {
    pub platform: String,
    pub region_node: String,
    pub site: Option<String>,
    pub dot_extremity_a: Option<String>,
    pub extremity_a: Option<String>,
    pub dot_extremity_b: Option<String>,
    pub extremity_b: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct BackboneInternetFields {
    pub interconnect_type: String,
    pub platform_igw: String,
    pub link_label: String,
}

/// Domain-specific field bag. Lifecycle and aggregation logic never reads
/// these; they exist for search, validation and display.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "domain", rename_all = "snake_case")]
pub enum DomainFields {
    Transport(TransportFields),
    FileAccess(FileAccessFields),
    RadioAccess(RadioAccessFields),
    Core(CoreFields),
    BackboneInternet(BackboneInternetFields),
}

impl DomainFields {
    pub fn domain(&self) -> NetworkDomain {
        match self {
            DomainFields::Transport(_) => NetworkDomain::Transport,
            DomainFields::FileAccess(_) => NetworkDomain::FileAccess,
            DomainFields::RadioAccess(_) => NetworkDomain::RadioAccess,
            DomainFields::Core(_) => NetworkDomain::Core,
            DomainFields::BackboneInternet(_) => NetworkDomain::BackboneInternet,
        }
    }

    /// Human-readable location line for lists and reports.
    pub fn location_display(&self) -> String {
        match self {
            DomainFields::Transport(f) => format!("{} <-> {}", f.extremity_a, f.extremity_b),
            DomainFields::FileAccess(f) => format!("{} - {}", f.do_wilaya, f.site),
            DomainFields::RadioAccess(f) => format!("{} - {}", f.do_wilaya, f.site),
            DomainFields::Core(f) => match (&f.extremity_a, &f.extremity_b, &f.site) {
                (Some(a), Some(b), _) => format!("{a} <-> {b}"),
                (_, _, Some(site)) => format!("{} - {}", f.region_node, site),
                _ => f.region_node.clone(),
            },
            DomainFields::BackboneInternet(f) => {
                format!("{} - {}", f.platform_igw, f.link_label)
            }
        }
    }
}

/// Canonical incident record shared by all five network domains.
///
/// Timestamps are nullable RFC3339 UTC strings (see `normalize`);
/// `duration_minutes` and `is_resolved` are derived and recomputed by the
/// save glue, never authoritative on their own.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Incident {
    pub id: String,

    pub occurred_at: Option<String>,
    pub resolved_at: Option<String>,
    pub duration_minutes: Option<i64>,

    pub cause: Option<String>,
    pub cause_other: Option<String>,
    pub origin: Option<String>,
    pub origin_other: Option<String>,
    pub impact_comment: Option<String>,

    pub is_resolved: bool,
    pub is_archived: bool,
    pub archived_at: Option<String>,
    pub archived_by: Option<String>,

    pub created_by: Option<String>,
    pub updated_by: Option<String>,
    pub created_at: String,
    pub updated_at: String,

    pub fields: DomainFields,
}

impl Incident {
    /// Fresh unresolved record; the save glue stamps audit timestamps and
    /// derived fields before persisting.
    pub fn new(occurred_at: String, created_by: Option<String>, fields: DomainFields) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            occurred_at: Some(occurred_at),
            resolved_at: None,
            duration_minutes: None,
            cause: None,
            cause_other: None,
            origin: None,
            origin_other: None,
            impact_comment: None,
            is_resolved: false,
            is_archived: false,
            archived_at: None,
            archived_by: None,
            created_by,
            updated_by: None,
            created_at: String::new(),
            updated_at: String::new(),
            fields,
        }
    }

    pub fn domain(&self) -> NetworkDomain {
        self.fields.domain()
    }

    /// Truncated id for display (full UUID in storage).
    pub fn short_id(&self) -> &str {
        let end = self.id.len().min(8);
        &self.id[..end]
    }

    pub fn cause_display(&self) -> String {
        display_with_other(&self.cause, &self.cause_other)
    }

    pub fn origin_display(&self) -> String {
        display_with_other(&self.origin, &self.origin_other)
    }
}

/// Category display value: the category itself, or `Other: {detail}` when the
/// category is literally "Other" and a detail string was captured.
fn display_with_other(category: &Option<String>, other: &Option<String>) -> String {
    match category.as_deref() {
        None => "Not specified".to_string(),
        Some(c) if c.trim().is_empty() => "Not specified".to_string(),
        Some(c) if c.eq_ignore_ascii_case("other") => match other.as_deref() {
            Some(detail) if !detail.trim().is_empty() => format!("Other: {detail}"),
            _ => c.to_string(),
        },
        Some(c) => c.to_string(),
    }
}
