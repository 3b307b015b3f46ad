//! Typed semantic links and the pending-approval workflow types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Relationship classes between chunks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkType {
    /// General relatedness.
    Related,
    /// Near-duplicate or strongly overlapping content.
    Similar,
    /// One chunk references material in the other.
    References,
    /// One chunk encloses the other's topic.
    Contains,
    /// One chunk is a constituent of the other's topic.
    PartOf,
    /// The chunks take opposing positions.
    Opposite,
}

impl LinkType {
    /// Stable string form used in storage.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Related => "related",
            Self::Similar => "similar",
            Self::References => "references",
            Self::Contains => "contains",
            Self::PartOf => "part_of",
            Self::Opposite => "opposite",
        }
    }

    /// Parses the stable string form.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "related" => Some(Self::Related),
            "similar" => Some(Self::Similar),
            "references" => Some(Self::References),
            "contains" => Some(Self::Contains),
            "part_of" => Some(Self::PartOf),
            "opposite" => Some(Self::Opposite),
            _ => None,
        }
    }

    /// Derives the link type from a combined link strength.
    ///
    /// Thresholds: `>= 0.9` similar, `>= 0.8` related, `>= 0.6` references,
    /// otherwise related.
    #[must_use]
    pub fn from_strength(strength: f64) -> Self {
        if strength >= 0.9 {
            Self::Similar
        } else if strength >= 0.8 {
            Self::Related
        } else if strength >= 0.6 {
            Self::References
        } else {
            Self::Related
        }
    }
}

impl std::fmt::Display for LinkType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whether an edge was created by the linking engine or a human decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LinkProvenance {
    /// Created automatically from similarity and shared-entity evidence.
    Auto,
    /// Created by approving a pending link.
    Manual,
}

impl LinkProvenance {
    /// Stable string form used in storage.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Auto => "AUTO",
            Self::Manual => "MANUAL",
        }
    }

    /// Parses the stable string form.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "AUTO" => Some(Self::Auto),
            "MANUAL" => Some(Self::Manual),
            _ => None,
        }
    }
}

/// A typed directed edge between two chunks.
///
/// Edges are conceptually bi-directional and stored as two rows with
/// symmetric rationale. Every AUTO edge has a non-empty rationale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SemanticLink {
    /// Source chunk id.
    pub source_id: String,
    /// Target chunk id.
    pub target_id: String,
    /// Relationship class.
    pub link_type: LinkType,
    /// Strength/confidence in `[0, 1]`.
    pub strength: f64,
    /// Short textual justification for the edge.
    pub rationale: String,
    /// How the edge came to exist.
    pub provenance: LinkProvenance,
    /// Creation instant.
    pub created_at: DateTime<Utc>,
    /// Last update instant.
    pub updated_at: DateTime<Utc>,
}

/// Status of an edge proposal awaiting a decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PendingStatus {
    /// Awaiting a decision.
    Pending,
    /// Approved and materialized as an edge.
    Approved,
    /// Rejected; the decision is retained.
    Rejected,
}

impl PendingStatus {
    /// Stable string form used in storage.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
        }
    }

    /// Parses the stable string form.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "approved" => Some(Self::Approved),
            "rejected" => Some(Self::Rejected),
            _ => None,
        }
    }
}

/// An edge proposal below the auto-link threshold, held for approval.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingLink {
    /// Row id assigned by the store.
    pub id: i64,
    /// Source chunk id.
    pub source_id: String,
    /// Target chunk id.
    pub target_id: String,
    /// Relationship class the proposal would materialize as.
    pub link_type: LinkType,
    /// Combined evidence strength in `[0, 1]`.
    pub strength: f64,
    /// Evidence summary shown to the approver.
    pub rationale: String,
    /// Decision state.
    pub status: PendingStatus,
    /// Proposal instant.
    pub created_at: DateTime<Utc>,
    /// Decision instant, once decided.
    pub decided_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_link_type_from_strength() {
        assert_eq!(LinkType::from_strength(0.95), LinkType::Similar);
        assert_eq!(LinkType::from_strength(0.9), LinkType::Similar);
        assert_eq!(LinkType::from_strength(0.85), LinkType::Related);
        assert_eq!(LinkType::from_strength(0.8), LinkType::Related);
        assert_eq!(LinkType::from_strength(0.76), LinkType::References);
        assert_eq!(LinkType::from_strength(0.6), LinkType::References);
        assert_eq!(LinkType::from_strength(0.3), LinkType::Related);
    }

    #[test]
    fn test_link_type_round_trip() {
        for lt in [
            LinkType::Related,
            LinkType::Similar,
            LinkType::References,
            LinkType::Contains,
            LinkType::PartOf,
            LinkType::Opposite,
        ] {
            assert_eq!(LinkType::parse(lt.as_str()), Some(lt));
        }
        assert_eq!(LinkType::parse("bogus"), None);
    }

    #[test]
    fn test_provenance_round_trip() {
        assert_eq!(
            LinkProvenance::parse(LinkProvenance::Auto.as_str()),
            Some(LinkProvenance::Auto)
        );
        assert_eq!(
            LinkProvenance::parse(LinkProvenance::Manual.as_str()),
            Some(LinkProvenance::Manual)
        );
        assert_eq!(LinkProvenance::parse("auto"), None);
    }

    #[test]
    fn test_pending_status_round_trip() {
        for st in [
            PendingStatus::Pending,
            PendingStatus::Approved,
            PendingStatus::Rejected,
        ] {
            assert_eq!(PendingStatus::parse(st.as_str()), Some(st));
        }
    }
}
