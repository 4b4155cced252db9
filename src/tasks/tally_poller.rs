use crate::models::TallyFeed;
use crate::tally::TallyService;
use log::{debug, info, warn};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::interval;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(7);

/// Recurring read of the remote tally, for the lifetime of the session.
/// The first poll fires immediately, then once per interval. The task stops
/// when the shutdown signal flips, a hook the session owner controls.
pub async fn run_tally_poller(
    service: Arc<dyn TallyService>,
    feed_tx: watch::Sender<TallyFeed>,
    mut shutdown: watch::Receiver<bool>,
    poll_interval: Duration,
) {
    info!(
        "starting tally poller, interval {}s",
        poll_interval.as_secs()
    );
    let mut ticker = interval(poll_interval);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                poll_once(service.as_ref(), &feed_tx).await;
            }
            changed = shutdown.changed() => {
                // A dropped sender also ends the session.
                if changed.is_err() || *shutdown.borrow() {
                    info!("tally poller stopped");
                    return;
                }
            }
        }
    }
}

/// One poll attempt. Success replaces the snapshot wholesale; any transport
/// or shape failure keeps the previous snapshot and marks the feed stale.
/// Nothing here is ever surfaced as an error.
pub(crate) async fn poll_once(service: &dyn TallyService, feed_tx: &watch::Sender<TallyFeed>) {
    match service.metrics().await {
        Ok(snapshot) => {
            debug!("tally refreshed: {} total votes", snapshot.total);
            feed_tx.send_replace(TallyFeed {
                snapshot,
                stale: false,
            });
        }
        Err(e) => {
            warn!("tally poll failed, keeping previous snapshot: {}", e);
            let previous = feed_tx.borrow().snapshot.clone();
            feed_tx.send_replace(TallyFeed {
                snapshot: previous,
                stale: true,
            });
        }
    }
}
