use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Tally bucket recorded when a device marks more than one candidate.
pub const NULL_VOTE_LABEL: &str = "Voto nulo";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Candidate {
    pub name: String,
    pub slug: String,
    /// Asset references carried from the catalog document; nothing in the
    /// engine renders them but they are part of the wire format.
    #[serde(default)]
    pub photo: String,
    #[serde(default)]
    pub logo: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Consulta {
    pub title: String,
    #[serde(default)]
    pub subtitle: Option<String>,
    /// Candidate slugs in presentation order. Slugs that do not resolve in
    /// the catalog are skipped at every use site, never treated as an error.
    pub candidates: Vec<String>,
}

/// The value a device contributes to the tally: a candidate's display name,
/// or the null-vote sentinel when several candidates were marked.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteRecord {
    pub value: String,
    pub device_id: String,
    pub cast_at: DateTime<Utc>,
}

impl VoteRecord {
    pub fn new(value: String, device_id: String) -> Self {
        Self {
            value,
            device_id,
            cast_at: Utc::now(),
        }
    }

    pub fn is_null_vote(&self) -> bool {
        self.value == NULL_VOTE_LABEL
    }
}

/// Latest full read of aggregate counts from the remote tally service.
/// Replaced wholesale on every successful poll; a failed poll keeps the
/// previous snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TallySnapshot {
    pub total: u64,
    #[serde(default)]
    pub candidates: HashMap<String, u64>,
}

impl TallySnapshot {
    pub fn count_for(&self, value: &str) -> u64 {
        self.candidates.get(value).copied().unwrap_or(0)
    }
}

/// What the poller publishes: the last known snapshot plus whether the most
/// recent poll attempt failed to refresh it.
#[derive(Debug, Clone, Default)]
pub struct TallyFeed {
    pub snapshot: TallySnapshot,
    pub stale: bool,
}
