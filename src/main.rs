use log::{error, info, warn};
use std::env;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::watch;

use urna_viva::store::{DeviceIdentityStore, FileSlot, IdentitySlot, SqliteSlot};
use urna_viva::tally::{HttpTallyClient, SubmissionChannel, TallyService};
use urna_viva::tasks::tally_poller::{run_tally_poller, DEFAULT_POLL_INTERVAL};
use urna_viva::{App, Catalog, TallyFeed};

#[tokio::main]
async fn main() {
    // Initialize logging
    dotenvy::dotenv().ok();
    env_logger::init();

    // Load the remote tally endpoint from the environment
    let api_url = env::var("TALLY_API_URL").expect("Expected TALLY_API_URL in the environment");

    // Catalog load is the one fatal startup path
    let catalog_path = env::var("CATALOG_PATH").unwrap_or_else(|_| "catalog.json".to_string());
    let catalog = match Catalog::load(&PathBuf::from(&catalog_path)) {
        Ok(catalog) => Arc::new(catalog),
        Err(e) => {
            error!("No se pudo iniciar la consulta: {}", e);
            eprintln!("No se pudo iniciar la consulta: {}", e);
            return;
        }
    };

    // Device identity over two independent slots; a slot that cannot be
    // opened is skipped, never fatal.
    let db_url = env::var("DATABASE_URL").unwrap_or_else(|_| "sqlite:urna_viva.db".to_string());
    let state_path =
        env::var("DEVICE_STATE_PATH").unwrap_or_else(|_| "device_state.json".to_string());
    let mut slots: Vec<Box<dyn IdentitySlot>> = Vec::new();
    match SqliteSlot::new(&db_url).await {
        Ok(slot) => slots.push(Box::new(slot)),
        Err(e) => warn!("sqlite identity slot unavailable: {}", e),
    }
    slots.push(Box::new(FileSlot::new(PathBuf::from(state_path))));
    let identity = Arc::new(DeviceIdentityStore::new(slots));

    let service: Arc<dyn TallyService> = Arc::new(HttpTallyClient::new(api_url));
    let submissions = Arc::new(SubmissionChannel::new(Arc::clone(&service)));

    // Live tally feed: first poll immediately, then on the fixed interval,
    // until the shutdown hook fires.
    let poll_interval = env::var("POLL_INTERVAL_SECONDS")
        .ok()
        .and_then(|raw| raw.parse::<u64>().ok())
        .map(Duration::from_secs)
        .unwrap_or(DEFAULT_POLL_INTERVAL);
    let (feed_tx, feed_rx) = watch::channel(TallyFeed::default());
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let poller = tokio::spawn(run_tally_poller(
        Arc::clone(&service),
        feed_tx,
        shutdown_rx,
        poll_interval,
    ));

    let mut app = App::new(catalog, identity, submissions, feed_rx).await;
    info!("urna-viva started, catalog '{}'", catalog_path);

    println!("{}", app.selection_view());
    println!("Comandos: marcar <slug> | limpiar | confirmar | resultados | papeleta | salir");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        let mut parts = line.trim().split_whitespace();
        let reply = match (parts.next(), parts.next()) {
            (Some("marcar"), Some(slug)) => app.toggle(slug),
            (Some("marcar"), None) => "Uso: marcar <slug>".to_string(),
            (Some("limpiar"), _) => app.clear_selection(),
            (Some("confirmar"), _) => app.confirm().await,
            (Some("resultados"), _) => app.results_view(),
            (Some("papeleta"), _) => app.selection_view(),
            (Some("salir"), _) => break,
            (None, _) => continue,
            _ => "Comando desconocido. Comandos: marcar <slug> | limpiar | confirmar | resultados | papeleta | salir".to_string(),
        };
        println!("{}", reply);
    }

    // Stop the recurring poll before leaving; in-flight requests finish on
    // their own.
    if shutdown_tx.send(true).is_err() {
        warn!("tally poller already stopped");
    }
    if let Err(e) = poller.await {
        error!("tally poller task failed: {}", e);
    }
    info!("urna-viva stopped");
}
