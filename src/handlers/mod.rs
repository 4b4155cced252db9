use crate::ballot::{Ballot, BallotState, Notice};
use crate::catalog::Catalog;
use crate::models::{TallyFeed, VoteRecord};
use crate::store::DeviceIdentityStore;
use crate::tally::SubmissionChannel;
use crate::voting::{aggregate, AggregateView};
use log::info;
use std::sync::Arc;
use tokio::sync::watch;

/// One session's application state: catalog, ballot, device identity and the
/// live tally feed, owned by a single controller constructed at startup.
/// All interaction events are routed through here.
pub struct App {
    catalog: Arc<Catalog>,
    identity: Arc<DeviceIdentityStore>,
    ballot: Ballot,
    submissions: Arc<SubmissionChannel>,
    feed_rx: watch::Receiver<TallyFeed>,
    /// The value this device voted for, used to highlight its share in the
    /// results. Not persisted: after a restart the guard still holds but the
    /// chosen value is unknown, as in the original widget.
    chosen_value: Option<String>,
}

impl App {
    pub async fn new(
        catalog: Arc<Catalog>,
        identity: Arc<DeviceIdentityStore>,
        submissions: Arc<SubmissionChannel>,
        feed_rx: watch::Receiver<TallyFeed>,
    ) -> Self {
        // The terminal state survives restarts through the identity store,
        // independent of any in-memory selection.
        let already_voted = identity.has_voted().await;
        if already_voted {
            info!("device has already voted, ballot is locked");
        }
        Self {
            catalog,
            identity,
            ballot: Ballot::new(already_voted),
            submissions,
            feed_rx,
            chosen_value: None,
        }
    }

    pub fn ballot_state(&self) -> BallotState {
        self.ballot.state()
    }

    pub fn chosen_value(&self) -> Option<&str> {
        self.chosen_value.as_deref()
    }

    /// Marks or unmarks one candidate. Every outcome is a user-facing reply,
    /// never an error.
    pub fn toggle(&mut self, slug: &str) -> String {
        let Some(candidate) = self.catalog.candidate(slug) else {
            return format!("No existe el candidato '{}'.", slug);
        };
        let name = candidate.name.clone();
        match self.ballot.toggle(slug) {
            Ok(true) => format!("Marcado: {}", name),
            Ok(false) => format!("Desmarcado: {}", name),
            Err(notice) => notice.message(),
        }
    }

    pub fn clear_selection(&mut self) -> String {
        match self.ballot.clear() {
            Ok(()) => "Selección limpiada.".to_string(),
            Err(notice) => notice.message(),
        }
    }

    /// Explicit confirm action: fires the Open → Voted transition.
    ///
    /// Side-effect order is the one sequencing invariant of the session:
    /// the ballot locks and the voted flag is persisted before the network
    /// submission starts, so a lost connection can never re-open the vote.
    pub async fn confirm(&mut self) -> String {
        let confirmed = match self.ballot.confirm(&self.catalog) {
            Ok(confirmed) => confirmed,
            Err(notice) => return notice.message(),
        };

        let device_id = self.identity.get_device_id().await;
        self.identity.mark_voted().await;
        self.chosen_value = Some(confirmed.value.clone());
        info!(
            "vote registered on device {}: {} ({} marked)",
            device_id, confirmed.value, confirmed.marked
        );

        // Fire-and-forget: the submission runs on its own task and its
        // outcome never reaches the user.
        let record = VoteRecord::new(confirmed.value.clone(), device_id);
        let submissions = Arc::clone(&self.submissions);
        tokio::spawn(async move {
            submissions.submit(record).await;
        });

        Notice::Registered {
            value: confirmed.value,
            marked: confirmed.marked,
        }
        .message()
    }

    /// Current aggregate view, computed from the last known snapshot. An
    /// in-flight poll finishing after the vote still lands here.
    pub fn results(&self) -> (AggregateView, bool) {
        let feed = self.feed_rx.borrow().clone();
        let view = aggregate(&feed.snapshot, &self.catalog, self.chosen_value.as_deref());
        (view, feed.stale)
    }

    /// Results panel as display text.
    pub fn results_view(&self) -> String {
        let (view, stale) = self.results();
        let mut out = String::new();

        if stale {
            out.push_str("(Resultados no disponibles, mostrando los últimos conocidos)\n");
        }
        out.push_str(&format!("Votos totales: {}\n", view.total));

        if let Some(chosen) = &view.chosen {
            out.push_str(&format!(
                "Tu voto — {}: {} votos ({}%)\n",
                chosen.value, chosen.votes, chosen.percentage
            ));
        }

        if view.total == 0 {
            out.push_str("Aún no hay votos registrados.\n");
            return out;
        }

        for group in &view.groups {
            out.push_str(&format!(
                "{}: {} votos ({}%)\n",
                group.title, group.votes, group.percentage
            ));
        }
        if let Some(null_row) = &view.null_votes {
            out.push_str(&format!(
                "{}: {} votos ({}%)\n",
                null_row.title, null_row.votes, null_row.percentage
            ));
        }
        out
    }

    /// The ballot as display text: every consulta with its candidates and
    /// their current marks.
    pub fn selection_view(&self) -> String {
        let mut out = String::new();
        for consulta in self.catalog.consultas() {
            out.push_str(&consulta.title);
            if let Some(subtitle) = consulta.subtitle.as_deref().filter(|s| !s.is_empty()) {
                out.push_str(&format!(" — {}", subtitle));
            }
            out.push('\n');
            for candidate in self.catalog.members_of(consulta) {
                let mark = if self.ballot.selection().contains(&candidate.slug) {
                    "[X]"
                } else {
                    "[ ]"
                };
                out.push_str(&format!("  {} {} ({})\n", mark, candidate.name, candidate.slug));
            }
        }
        if self.ballot.state() == BallotState::Voted {
            out.push_str("La votación en este dispositivo ya está cerrada.\n");
        }
        out
    }
}
