use crate::catalog::Catalog;
use crate::models::{TallySnapshot, NULL_VOTE_LABEL};

/// One displayed results row: a consulta (or the null-vote bucket) with its
/// vote count and share of the overall total.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupTally {
    pub title: String,
    pub votes: u64,
    pub percentage: u32,
}

/// The share of the value this device voted for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChosenShare {
    pub value: String,
    pub votes: u64,
    pub percentage: u32,
}

/// Everything the results panel needs, derived from one snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AggregateView {
    pub total: u64,
    pub chosen: Option<ChosenShare>,
    pub groups: Vec<GroupTally>,
    /// Present when the snapshot tracks the null-vote bucket. A row of its
    /// own, parallel to the consulta rows, never folded into one of them.
    pub null_votes: Option<GroupTally>,
}

/// Nearest-integer percentage, with the zero-total edge case defined as 0
/// rather than a division error.
pub fn percent_of(part: u64, total: u64) -> u32 {
    if total == 0 {
        return 0;
    }
    ((part as f64 / total as f64) * 100.0).round() as u32
}

/// Combines raw per-candidate counts into per-consulta rows and the chosen
/// value's share. Candidate names absent from the counts contribute 0.
/// Percentages are rounded per row and are not forced to sum to 100.
pub fn aggregate(
    snapshot: &TallySnapshot,
    catalog: &Catalog,
    chosen_value: Option<&str>,
) -> AggregateView {
    let total = snapshot.total;

    let groups = catalog
        .consultas()
        .iter()
        .map(|consulta| {
            let votes: u64 = catalog
                .members_of(consulta)
                .map(|candidate| snapshot.count_for(&candidate.name))
                .sum();
            GroupTally {
                title: consulta.title.clone(),
                votes,
                percentage: percent_of(votes, total),
            }
        })
        .collect();

    let null_votes = snapshot
        .candidates
        .contains_key(NULL_VOTE_LABEL)
        .then(|| {
            let votes = snapshot.count_for(NULL_VOTE_LABEL);
            GroupTally {
                title: NULL_VOTE_LABEL.to_string(),
                votes,
                percentage: percent_of(votes, total),
            }
        });

    let chosen = chosen_value.map(|value| {
        let votes = snapshot.count_for(value);
        ChosenShare {
            value: value.to_string(),
            votes,
            percentage: percent_of(votes, total),
        }
    });

    AggregateView {
        total,
        chosen,
        groups,
        null_votes,
    }
}
