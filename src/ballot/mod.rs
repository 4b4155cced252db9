use crate::catalog::Catalog;
use crate::models::NULL_VOTE_LABEL;

/// User-facing feedback produced by ballot interactions. Rejections here are
/// expected inputs handled by policy, not failures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    /// The device already registered a vote; nothing changed.
    AlreadyVoted,
    /// Confirm was attempted with an empty selection; nothing changed.
    NothingMarked,
    /// A vote was registered on this device.
    Registered { value: String, marked: usize },
}

impl Notice {
    pub fn message(&self) -> String {
        match self {
            Notice::AlreadyVoted => {
                "Ya registraste tu participación en este dispositivo.".to_string()
            }
            Notice::NothingMarked => "Marca al menos un candidato.".to_string(),
            Notice::Registered { value, marked } if *marked >= 2 => {
                format!("{} ({} marcados). Tu selección ha sido registrada.", value, marked)
            }
            Notice::Registered { value, .. } => {
                format!("{}. Tu selección ha sido registrada.", value)
            }
        }
    }
}

/// Set of currently marked candidate slugs. Marking order is kept for
/// display; membership is what matters. Cross-consulta marks are allowed,
/// the null-vote rule resolves them at confirm time.
#[derive(Debug, Default, Clone)]
pub struct Selection {
    marked: Vec<String>,
}

impl Selection {
    pub fn toggle(&mut self, slug: &str) -> bool {
        if let Some(pos) = self.marked.iter().position(|s| s == slug) {
            self.marked.remove(pos);
            false
        } else {
            self.marked.push(slug.to_string());
            true
        }
    }

    pub fn clear(&mut self) {
        self.marked.clear();
    }

    pub fn len(&self) -> usize {
        self.marked.len()
    }

    pub fn is_empty(&self) -> bool {
        self.marked.is_empty()
    }

    pub fn contains(&self, slug: &str) -> bool {
        self.marked.iter().any(|s| s == slug)
    }

    pub fn slugs(&self) -> &[String] {
        &self.marked
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BallotState {
    Open,
    Voted,
}

/// The value a confirm derived, before the device id is attached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfirmedVote {
    pub value: String,
    pub marked: usize,
}

/// Derives the tally value from a selection: exactly one mark yields that
/// candidate's display name, two or more yield the null-vote sentinel.
/// Empty selections derive nothing.
pub fn derive_vote_value(selection: &Selection, catalog: &Catalog) -> Option<ConfirmedVote> {
    match selection.len() {
        0 => None,
        1 => {
            let candidate = catalog.candidate(&selection.slugs()[0])?;
            Some(ConfirmedVote {
                value: candidate.name.clone(),
                marked: 1,
            })
        }
        n => Some(ConfirmedVote {
            value: NULL_VOTE_LABEL.to_string(),
            marked: n,
        }),
    }
}

/// Open → Voted state machine for one device. The terminal state is
/// reconstructed from persisted device state at startup, so the guard holds
/// across restarts regardless of the in-memory selection.
#[derive(Debug)]
pub struct Ballot {
    state: BallotState,
    selection: Selection,
}

impl Ballot {
    pub fn new(already_voted: bool) -> Self {
        Self {
            state: if already_voted {
                BallotState::Voted
            } else {
                BallotState::Open
            },
            selection: Selection::default(),
        }
    }

    pub fn state(&self) -> BallotState {
        self.state
    }

    pub fn selection(&self) -> &Selection {
        &self.selection
    }

    /// Marks or unmarks a candidate. Returns whether the slug is now marked,
    /// or the already-voted notice if the ballot is locked.
    pub fn toggle(&mut self, slug: &str) -> Result<bool, Notice> {
        if self.state == BallotState::Voted {
            return Err(Notice::AlreadyVoted);
        }
        Ok(self.selection.toggle(slug))
    }

    pub fn clear(&mut self) -> Result<(), Notice> {
        if self.state == BallotState::Voted {
            return Err(Notice::AlreadyVoted);
        }
        self.selection.clear();
        Ok(())
    }

    /// Fires the Open → Voted transition. Consumes the selection and derives
    /// the vote value; persisting the flag and submitting the record are the
    /// caller's responsibility, in that order.
    pub fn confirm(&mut self, catalog: &Catalog) -> Result<ConfirmedVote, Notice> {
        if self.state == BallotState::Voted {
            return Err(Notice::AlreadyVoted);
        }
        let confirmed = derive_vote_value(&self.selection, catalog).ok_or(Notice::NothingMarked)?;
        self.state = BallotState::Voted;
        Ok(confirmed)
    }
}
