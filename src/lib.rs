//! Dining Console: restaurant admin client core.
//!
//! Talks to the restaurant REST backend for orders, menu, tables and
//! reports; drives the order status workflow and the kitchen display; and
//! renders payment slips and tabular reports as PDF files.

pub mod api;
pub mod assistant;
pub mod billing;
pub mod config;
pub mod db;
pub mod document;
pub mod error;
pub mod kitchen;
pub mod layout;
pub mod logging;
pub mod models;
pub mod orders;
pub mod pdf;
pub mod preferences;
pub mod receipt;
pub mod report;
pub mod session;
pub mod storage;

use std::sync::Arc;

use chrono::Local;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub use api::ApiClient;
pub use config::AppConfig;
pub use document::{GeneratedDocument, RestaurantIdentity};
pub use error::{ApiError, DocumentError, OrderError, SessionError, StoreError};
pub use kitchen::{KitchenMonitor, KitchenSnapshot};
pub use orders::{OrderLifecycle, TransitionPolicy};
pub use session::{RouteDecision, SessionGuard};

use crate::billing::{Bill, BillFilter, SettleOptions};
use crate::db::LocalStore;
use crate::orders::OrderSource;
use crate::session::BootstrapOutcome;
use crate::storage::{KeyringStore, LocalSessionStore, SessionStore};

/// Console entry point: restore the session, write the invoice list, then
/// keep the kitchen board live until Ctrl-C.
pub async fn run(config: AppConfig) -> anyhow::Result<()> {
    info!("Starting Dining Console v{}", env!("CARGO_PKG_VERSION"));

    let store = Arc::new(LocalStore::init(&config.data_dir)?);
    let session_store: Arc<dyn SessionStore> = if config.use_keyring {
        Arc::new(KeyringStore::default())
    } else {
        Arc::new(LocalSessionStore::new(store.clone()))
    };

    let session = Arc::new(SessionGuard::new(session_store));
    let api = Arc::new(ApiClient::new(
        &config.api_url,
        config.http_timeout,
        session.clone(),
    )?);

    let theme = preferences::load_theme(&store);
    info!(api = %api.base_url(), theme = %theme, "console configured");

    match session.bootstrap(api.as_ref()).await {
        BootstrapOutcome::Restored => {}
        outcome => {
            warn!(?outcome, "no valid session; sign in to continue");
            return Ok(());
        }
    }

    let identity = match api.settings().await {
        Ok(settings) => RestaurantIdentity::from_settings(Some(&settings)),
        Err(e) => {
            warn!(error = %e, "restaurant settings unavailable; using defaults");
            RestaurantIdentity::default()
        }
    };
    info!(restaurant = %identity.name, "restaurant identity loaded");

    let source: Arc<dyn OrderSource> = api.clone();
    let lifecycle = OrderLifecycle::new(source.clone(), TransitionPolicy::default());
    match lifecycle.refresh().await {
        Ok(orders) => {
            let counts = lifecycle.counts();
            let tables = billing::active_dining(&orders);
            info!(
                total = counts.total,
                pending = counts.pending,
                preparing = counts.preparing,
                ready = counts.ready,
                active_tables = tables.len(),
                "orders loaded"
            );

            let now = Local::now().naive_local();
            let settle = SettleOptions::from(&config);
            for table in &tables {
                let preview = Bill::from_orders(
                    &table.orders,
                    settle.tax_rate,
                    settle.discount,
                    &settle.payment_method,
                    now,
                );
                debug!(table = %table.table_label, total = preview.total, "open bill");
            }

            let invoices = report::invoice_report(
                &billing::bill_rows(&orders),
                &BillFilter::default(),
                &identity,
                now,
            );
            match invoices.save_to(&config.output_dir) {
                Ok(path) => info!(path = %path.display(), "invoice list written"),
                Err(e) => warn!(error = %e, "invoice list not written"),
            }
        }
        Err(OrderError::Api(e)) if e.is_auth_failure() => {
            warn!(error = %e, "session no longer accepted; signing out");
            session.logout()?;
            return Ok(());
        }
        Err(e) => warn!(error = %e, "initial order load failed"),
    }

    let monitor = KitchenMonitor::new(source, config.refresh_min_visible);
    if let Err(e) = monitor.refresh().await {
        warn!(error = %e, "initial kitchen refresh failed");
    }

    let cancel = CancellationToken::new();
    let poller = monitor.spawn_poller(config.poll_interval, cancel.clone());

    let mut rx = monitor.subscribe();
    let watch_cancel = cancel.clone();
    let watcher = tokio::spawn(async move {
        loop {
            tokio::select! {
                biased;
                _ = watch_cancel.cancelled() => break,
                changed = rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let snapshot = rx.borrow_and_update().clone();
                    let counts = snapshot.board.counts();
                    info!(
                        seq = snapshot.seq,
                        arrived = counts.arrived,
                        preparing = counts.preparing,
                        ready = counts.ready,
                        at = %Local::now().format("%H:%M:%S"),
                        "kitchen board updated"
                    );
                }
            }
        }
    });

    tokio::signal::ctrl_c().await?;
    info!("shutdown requested");
    cancel.cancel();
    let _ = poller.await;
    let _ = watcher.await;
    Ok(())
}
