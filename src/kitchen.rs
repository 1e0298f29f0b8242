//! Kitchen display: ticket projection and the live order poller.
//!
//! The poller runs on a `tokio` interval scoped to a `CancellationToken`.
//! Ticks are skipped while a poll fetch is still outstanding, and every
//! fetch carries a sequence number so an older response can never replace
//! a newer board.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{Local, NaiveDateTime};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::ApiResult;
use crate::models::{Order, OrderStatus};
use crate::orders::OrderSource;

/// Priority shown when the order carries none.
pub const DEFAULT_PRIORITY: &str = "medium";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KitchenStage {
    Arrived,
    Preparing,
    Ready,
}

impl KitchenStage {
    pub fn of(status: OrderStatus) -> Option<Self> {
        match status {
            OrderStatus::Pending => Some(KitchenStage::Arrived),
            OrderStatus::Preparing => Some(KitchenStage::Preparing),
            OrderStatus::Ready => Some(KitchenStage::Ready),
            OrderStatus::Completed | OrderStatus::Cancelled => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct KitchenTicket {
    pub order_id: i64,
    /// `#<id>`
    pub display_id: String,
    pub table: String,
    pub items: Vec<String>,
    pub instructions: Option<String>,
    pub elapsed_minutes: i64,
    pub priority: String,
    pub stage: KitchenStage,
    pub status: OrderStatus,
}

impl KitchenTicket {
    /// Project an active order. Terminal orders have no ticket.
    pub fn from_order(order: &Order, now: NaiveDateTime) -> Option<Self> {
        let stage = KitchenStage::of(order.status)?;
        Some(Self {
            order_id: order.id,
            display_id: format!("#{}", order.id),
            table: order.table_label(),
            items: order.items.iter().map(|i| i.menu_item.name.clone()).collect(),
            instructions: order.instructions.clone(),
            elapsed_minutes: elapsed_minutes(order.order_time, now),
            priority: order
                .priority
                .as_deref()
                .map(str::trim)
                .filter(|p| !p.is_empty())
                .unwrap_or(DEFAULT_PRIORITY)
                .to_ascii_lowercase(),
            stage,
            status: order.status,
        })
    }
}

/// Whole minutes since the order was placed. Missing or future timestamps
/// count as zero.
pub fn elapsed_minutes(order_time: Option<NaiveDateTime>, now: NaiveDateTime) -> i64 {
    order_time
        .map(|t| (now - t).num_seconds().div_euclid(60))
        .filter(|m| *m > 0)
        .unwrap_or(0)
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StageCounts {
    pub arrived: usize,
    pub preparing: usize,
    pub ready: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct KitchenBoard {
    /// Newest order first.
    pub tickets: Vec<KitchenTicket>,
    pub fetched_at: Option<NaiveDateTime>,
}

impl KitchenBoard {
    pub fn from_orders(orders: &[Order], now: NaiveDateTime) -> Self {
        let mut tickets: Vec<KitchenTicket> = orders
            .iter()
            .filter_map(|o| KitchenTicket::from_order(o, now))
            .collect();
        tickets.sort_by(|a, b| b.order_id.cmp(&a.order_id));
        Self {
            tickets,
            fetched_at: Some(now),
        }
    }

    pub fn counts(&self) -> StageCounts {
        let mut counts = StageCounts::default();
        for t in &self.tickets {
            match t.stage {
                KitchenStage::Arrived => counts.arrived += 1,
                KitchenStage::Preparing => counts.preparing += 1,
                KitchenStage::Ready => counts.ready += 1,
            }
        }
        counts
    }

    /// Tickets in `stage`, or all of them for `None`.
    pub fn filter(&self, stage: Option<KitchenStage>) -> Vec<&KitchenTicket> {
        self.tickets
            .iter()
            .filter(|t| stage.map_or(true, |s| t.stage == s))
            .collect()
    }
}

/// Published on the watch channel after every change.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct KitchenSnapshot {
    pub board: KitchenBoard,
    /// Raised by a manual refresh only; background polls are silent.
    pub loading: bool,
    /// Sequence number of the fetch that produced `board`.
    pub seq: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    Applied,
    /// An earlier tick's fetch is still running.
    Skipped,
    /// A newer fetch was applied first; this response was dropped.
    Stale,
    Failed,
}

/// Holds the in-flight flag; released on drop so a cancelled poll frees it.
struct InFlight<'a>(&'a AtomicBool);

impl<'a> InFlight<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

pub struct KitchenMonitor {
    source: Arc<dyn OrderSource>,
    tx: watch::Sender<KitchenSnapshot>,
    poll_in_flight: AtomicBool,
    next_seq: AtomicU64,
    min_visible: Duration,
}

impl KitchenMonitor {
    pub fn new(source: Arc<dyn OrderSource>, min_visible: Duration) -> Arc<Self> {
        let (tx, _rx) = watch::channel(KitchenSnapshot::default());
        Arc::new(Self {
            source,
            tx,
            poll_in_flight: AtomicBool::new(false),
            next_seq: AtomicU64::new(1),
            min_visible,
        })
    }

    pub fn subscribe(&self) -> watch::Receiver<KitchenSnapshot> {
        self.tx.subscribe()
    }

    pub fn snapshot(&self) -> KitchenSnapshot {
        self.tx.borrow().clone()
    }

    /// Fetch and publish, unless a newer fetch already landed.
    /// Returns `Ok(false)` when the response was stale.
    async fn fetch_and_apply(&self) -> ApiResult<bool> {
        let seq = self.next_seq.fetch_add(1, Ordering::SeqCst);
        let orders = self.source.fetch_orders().await?;
        let board = KitchenBoard::from_orders(&orders, Local::now().naive_local());

        let applied = self.tx.send_if_modified(|snap| {
            if seq <= snap.seq {
                return false;
            }
            snap.board = board;
            snap.seq = seq;
            true
        });
        if !applied {
            debug!(seq, "discarding stale kitchen response");
        }
        Ok(applied)
    }

    /// One background poll. Never raises the loading flag; failures are
    /// logged and swallowed.
    pub async fn poll_once(&self) -> PollOutcome {
        let Some(_guard) = InFlight::acquire(&self.poll_in_flight) else {
            debug!("kitchen poll still in flight, skipping tick");
            return PollOutcome::Skipped;
        };

        match self.fetch_and_apply().await {
            Ok(true) => PollOutcome::Applied,
            Ok(false) => PollOutcome::Stale,
            Err(e) => {
                warn!(error = %e, "kitchen poll failed");
                PollOutcome::Failed
            }
        }
    }

    /// User-triggered refresh. Keeps `loading` raised for at least the
    /// configured minimum so a fast response does not flicker. Errors are
    /// returned to the caller.
    pub async fn refresh(&self) -> ApiResult<KitchenBoard> {
        let started = Instant::now();
        self.tx.send_modify(|snap| snap.loading = true);

        let result = self.fetch_and_apply().await;

        let elapsed = started.elapsed();
        if elapsed < self.min_visible {
            time::sleep(self.min_visible - elapsed).await;
        }
        self.tx.send_modify(|snap| snap.loading = false);

        result.map(|_| self.snapshot().board)
    }

    /// Start the background poller. It stops when `cancel` fires; an
    /// outstanding fetch is dropped at that point.
    pub fn spawn_poller(self: &Arc<Self>, period: Duration, cancel: CancellationToken) -> JoinHandle<()> {
        let monitor = Arc::clone(self);
        tokio::spawn(async move {
            info!("Kitchen poller started (interval: {}s)", period.as_secs_f32());
            let mut ticker = time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        let monitor = Arc::clone(&monitor);
                        let cancel = cancel.clone();
                        tokio::spawn(async move {
                            tokio::select! {
                                biased;
                                _ = cancel.cancelled() => {}
                                _ = monitor.poll_once() => {}
                            }
                        });
                    }
                }
            }
            info!("Kitchen poller stopped");
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::NewOrderRequest;
    use crate::error::ApiError;
    use crate::orders::tests::order;
    use async_trait::async_trait;
    use chrono::NaiveDate;
    use std::sync::Mutex;

    /// Each call pops the next scripted `(delay, result)`; once the script
    /// runs out the last entry repeats.
    struct ScriptedSource {
        script: Mutex<Vec<(u64, Result<Vec<Order>, String>)>>,
        calls: AtomicU64,
    }

    impl ScriptedSource {
        fn new(script: Vec<(u64, Result<Vec<Order>, String>)>) -> Arc<Self> {
            Arc::new(Self {
                script: Mutex::new(script),
                calls: AtomicU64::new(0),
            })
        }
    }

    #[async_trait]
    impl OrderSource for ScriptedSource {
        async fn fetch_orders(&self) -> ApiResult<Vec<Order>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let (delay, result) = {
                let mut script = self.script.lock().unwrap();
                if script.len() > 1 {
                    script.remove(0)
                } else {
                    script[0].clone()
                }
            };
            time::sleep(Duration::from_millis(delay)).await;
            result.map_err(ApiError::Http)
        }

        async fn update_status(&self, _id: i64, _status: OrderStatus) -> ApiResult<Order> {
            Err(ApiError::Http("not scripted".to_string()))
        }

        async fn submit_order(&self, _request: &NewOrderRequest) -> ApiResult<Order> {
            Err(ApiError::Http("not scripted".to_string()))
        }
    }

    fn at(h: u32, m: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 3, 14)
            .unwrap()
            .and_hms_opt(h, m, s)
            .unwrap()
    }

    #[test]
    fn board_keeps_active_orders_newest_first() {
        let mut pending = order(3, OrderStatus::Pending);
        pending.order_time = Some(at(12, 0, 0));
        pending.table_number = None;
        let orders = vec![
            order(1, OrderStatus::Ready),
            order(2, OrderStatus::Completed),
            pending,
            order(4, OrderStatus::Cancelled),
            order(5, OrderStatus::Preparing),
        ];
        let board = KitchenBoard::from_orders(&orders, at(12, 7, 59));

        let ids: Vec<_> = board.tickets.iter().map(|t| t.display_id.as_str()).collect();
        assert_eq!(ids, ["#5", "#3", "#1"]);

        let arrived = &board.tickets[1];
        assert_eq!(arrived.stage, KitchenStage::Arrived);
        assert_eq!(arrived.table, "Takeaway");
        assert_eq!(arrived.elapsed_minutes, 7);
        assert_eq!(arrived.priority, "medium");

        assert_eq!(
            board.counts(),
            StageCounts {
                arrived: 1,
                preparing: 1,
                ready: 1
            }
        );
        assert_eq!(board.filter(Some(KitchenStage::Ready)).len(), 1);
        assert_eq!(board.filter(None).len(), 3);
    }

    #[test]
    fn elapsed_is_floored_and_never_negative() {
        assert_eq!(elapsed_minutes(None, at(12, 0, 0)), 0);
        assert_eq!(elapsed_minutes(Some(at(12, 0, 0)), at(12, 0, 59)), 0);
        assert_eq!(elapsed_minutes(Some(at(12, 0, 0)), at(12, 1, 0)), 1);
        assert_eq!(elapsed_minutes(Some(at(12, 30, 0)), at(12, 0, 0)), 0);
    }

    #[tokio::test]
    async fn overlapping_poll_tick_is_skipped() {
        let source = ScriptedSource::new(vec![(80, Ok(vec![order(1, OrderStatus::Pending)]))]);
        let monitor = KitchenMonitor::new(source.clone(), Duration::ZERO);

        let first = {
            let monitor = Arc::clone(&monitor);
            tokio::spawn(async move { monitor.poll_once().await })
        };
        time::sleep(Duration::from_millis(20)).await;
        assert_eq!(monitor.poll_once().await, PollOutcome::Skipped);
        assert_eq!(first.await.unwrap(), PollOutcome::Applied);
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);
        assert_eq!(monitor.snapshot().board.tickets.len(), 1);
        assert!(!monitor.snapshot().loading);
    }

    #[tokio::test]
    async fn stale_response_never_regresses_board() {
        // The poll is issued first but answers last with older data.
        let source = ScriptedSource::new(vec![
            (120, Ok(vec![order(1, OrderStatus::Pending)])),
            (5, Ok(vec![order(1, OrderStatus::Ready), order(2, OrderStatus::Pending)])),
        ]);
        let monitor = KitchenMonitor::new(source, Duration::ZERO);

        let slow_poll = {
            let monitor = Arc::clone(&monitor);
            tokio::spawn(async move { monitor.poll_once().await })
        };
        time::sleep(Duration::from_millis(20)).await;
        let board = monitor.refresh().await.unwrap();
        assert_eq!(board.tickets.len(), 2);

        assert_eq!(slow_poll.await.unwrap(), PollOutcome::Stale);
        let snap = monitor.snapshot();
        assert_eq!(snap.board.tickets.len(), 2);
        assert_eq!(snap.board.tickets[1].stage, KitchenStage::Ready);
    }

    #[tokio::test]
    async fn manual_refresh_holds_loading_for_minimum_duration() {
        let source = ScriptedSource::new(vec![(0, Ok(vec![order(1, OrderStatus::Pending)]))]);
        let monitor = KitchenMonitor::new(source, Duration::from_millis(150));
        let rx = monitor.subscribe();

        let refreshing = {
            let monitor = Arc::clone(&monitor);
            tokio::spawn(async move {
                let started = Instant::now();
                monitor.refresh().await.map(|_| started.elapsed())
            })
        };
        time::sleep(Duration::from_millis(50)).await;
        assert!(rx.borrow().loading);

        let elapsed = refreshing.await.unwrap().unwrap();
        assert!(elapsed >= Duration::from_millis(150));
        assert!(!rx.borrow().loading);
    }

    #[tokio::test]
    async fn failed_refresh_is_returned_and_failed_poll_is_swallowed() {
        let source = ScriptedSource::new(vec![(0, Err("Cannot reach the server".to_string()))]);
        let monitor = KitchenMonitor::new(source, Duration::ZERO);

        assert_eq!(monitor.poll_once().await, PollOutcome::Failed);
        let err = monitor.refresh().await.unwrap_err();
        assert_eq!(err.to_string(), "Cannot reach the server");
        assert!(!monitor.snapshot().loading);
        assert!(monitor.snapshot().board.tickets.is_empty());
    }

    #[tokio::test]
    async fn poller_stops_on_cancel() {
        let source = ScriptedSource::new(vec![(0, Ok(vec![order(7, OrderStatus::Preparing)]))]);
        let monitor = KitchenMonitor::new(source.clone(), Duration::ZERO);
        let mut rx = monitor.subscribe();
        let cancel = CancellationToken::new();

        let handle = monitor.spawn_poller(Duration::from_millis(20), cancel.clone());
        rx.changed().await.unwrap();
        assert_eq!(rx.borrow().board.tickets[0].display_id, "#7");

        time::sleep(Duration::from_millis(70)).await;
        cancel.cancel();
        handle.await.unwrap();

        let calls_at_cancel = source.calls.load(Ordering::SeqCst);
        assert!(calls_at_cancel >= 2);
        time::sleep(Duration::from_millis(60)).await;
        assert_eq!(source.calls.load(Ordering::SeqCst), calls_at_cancel);
    }
}
