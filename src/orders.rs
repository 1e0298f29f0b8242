//! Order lifecycle: status transitions, the merge-by-key order book, and
//! order placement for staff carts and the customer QR menu.

use std::collections::BTreeMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::api::{ApiClient, NewOrderRequest, OrderLineRequest};
use crate::error::{ApiResult, OrderError};
use crate::models::{MenuItem, Order, OrderStatus};

/// Guest label used for orders placed from a table QR code.
pub const QR_GUEST_NAME: &str = "Guest (QR)";
/// Waiter label used for orders placed from a table QR code.
pub const QR_WAITER_NAME: &str = "App";

// ---------------------------------------------------------------------------
// Transitions
// ---------------------------------------------------------------------------

/// User-facing actions that move an order through its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderAction {
    /// Kitchen: PENDING -> PREPARING
    StartMaking,
    /// Kitchen: PREPARING -> READY
    MarkReady,
    /// Kitchen: READY -> COMPLETED
    Complete,
    /// Billing "Generate Bill": any active order -> COMPLETED
    SettleBill,
    /// Any active order -> CANCELLED
    Cancel,
}

impl OrderAction {
    pub fn target(self) -> OrderStatus {
        match self {
            OrderAction::StartMaking => OrderStatus::Preparing,
            OrderAction::MarkReady => OrderStatus::Ready,
            OrderAction::Complete | OrderAction::SettleBill => OrderStatus::Completed,
            OrderAction::Cancel => OrderStatus::Cancelled,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            OrderAction::StartMaking => "Start Making",
            OrderAction::MarkReady => "Mark Ready",
            OrderAction::Complete => "Complete",
            OrderAction::SettleBill => "Generate Bill",
            OrderAction::Cancel => "Cancel",
        }
    }

    /// The kitchen action offered for an order in `status`, if any.
    pub fn next_kitchen_step(status: OrderStatus) -> Option<OrderAction> {
        match status {
            OrderStatus::Pending => Some(OrderAction::StartMaking),
            OrderStatus::Preparing => Some(OrderAction::MarkReady),
            OrderStatus::Ready => Some(OrderAction::Complete),
            OrderStatus::Completed | OrderStatus::Cancelled => None,
        }
    }
}

/// How strictly transitions are checked before a request is sent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransitionPolicy {
    /// No local validation; every action is forwarded to the backend.
    Lenient,
    /// Kitchen actions follow their lifecycle edge. Billing and cancel may
    /// short-circuit from any non-terminal state. Re-issuing the current
    /// status is always accepted.
    #[default]
    KitchenGuarded,
}

impl TransitionPolicy {
    pub fn allows(self, from: OrderStatus, action: OrderAction) -> bool {
        let to = action.target();
        match self {
            TransitionPolicy::Lenient => true,
            TransitionPolicy::KitchenGuarded => {
                if from == to {
                    return true;
                }
                match action {
                    OrderAction::StartMaking => from == OrderStatus::Pending,
                    OrderAction::MarkReady => from == OrderStatus::Preparing,
                    OrderAction::Complete => from == OrderStatus::Ready,
                    OrderAction::SettleBill | OrderAction::Cancel => from.is_active(),
                }
            }
        }
    }

    pub fn check(self, id: i64, from: OrderStatus, action: OrderAction) -> Result<(), OrderError> {
        if self.allows(from, action) {
            Ok(())
        } else {
            Err(OrderError::IllegalTransition {
                id,
                from,
                to: action.target(),
            })
        }
    }
}

// ---------------------------------------------------------------------------
// Order book
// ---------------------------------------------------------------------------

/// Per-status counts for the order management header.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatusCounts {
    pub pending: usize,
    pub preparing: usize,
    pub ready: usize,
    pub completed: usize,
    pub cancelled: usize,
    pub total: usize,
}

impl StatusCounts {
    pub fn of<'a>(orders: impl IntoIterator<Item = &'a Order>) -> Self {
        let mut counts = StatusCounts::default();
        for order in orders {
            match order.status {
                OrderStatus::Pending => counts.pending += 1,
                OrderStatus::Preparing => counts.preparing += 1,
                OrderStatus::Ready => counts.ready += 1,
                OrderStatus::Completed => counts.completed += 1,
                OrderStatus::Cancelled => counts.cancelled += 1,
            }
            counts.total += 1;
        }
        counts
    }

    pub fn get(&self, status: OrderStatus) -> usize {
        match status {
            OrderStatus::Pending => self.pending,
            OrderStatus::Preparing => self.preparing,
            OrderStatus::Ready => self.ready,
            OrderStatus::Completed => self.completed,
            OrderStatus::Cancelled => self.cancelled,
        }
    }
}

/// In-memory order list keyed by id. Server responses always win.
#[derive(Debug, Clone, Default)]
pub struct OrderBook {
    orders: BTreeMap<i64, Order>,
}

impl OrderBook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the whole book with a fresh server listing.
    pub fn replace_all(&mut self, orders: Vec<Order>) {
        self.orders = orders.into_iter().map(|o| (o.id, o)).collect();
    }

    /// Merge a single authoritative order, inserting it if unknown.
    pub fn merge(&mut self, order: Order) {
        self.orders.insert(order.id, order);
    }

    pub fn get(&self, id: i64) -> Option<&Order> {
        self.orders.get(&id)
    }

    pub fn len(&self) -> usize {
        self.orders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.orders.is_empty()
    }

    /// All orders, newest (highest id) first.
    pub fn newest_first(&self) -> Vec<Order> {
        self.orders.values().rev().cloned().collect()
    }

    pub fn with_status(&self, status: OrderStatus) -> Vec<Order> {
        self.orders
            .values()
            .rev()
            .filter(|o| o.status == status)
            .cloned()
            .collect()
    }

    pub fn counts(&self) -> StatusCounts {
        StatusCounts::of(self.orders.values())
    }
}

// ---------------------------------------------------------------------------
// Backend seam
// ---------------------------------------------------------------------------

/// The order endpoints the lifecycle depends on.
#[async_trait]
pub trait OrderSource: Send + Sync {
    async fn fetch_orders(&self) -> ApiResult<Vec<Order>>;
    async fn update_status(&self, id: i64, status: OrderStatus) -> ApiResult<Order>;
    async fn submit_order(&self, request: &NewOrderRequest) -> ApiResult<Order>;
}

#[async_trait]
impl OrderSource for ApiClient {
    async fn fetch_orders(&self) -> ApiResult<Vec<Order>> {
        self.orders().await
    }

    async fn update_status(&self, id: i64, status: OrderStatus) -> ApiResult<Order> {
        self.update_order_status(id, status).await
    }

    async fn submit_order(&self, request: &NewOrderRequest) -> ApiResult<Order> {
        self.create_order(request).await
    }
}

// ---------------------------------------------------------------------------
// Lifecycle service
// ---------------------------------------------------------------------------

pub struct OrderLifecycle {
    source: Arc<dyn OrderSource>,
    book: RwLock<OrderBook>,
    policy: TransitionPolicy,
}

impl OrderLifecycle {
    pub fn new(source: Arc<dyn OrderSource>, policy: TransitionPolicy) -> Self {
        Self {
            source,
            book: RwLock::new(OrderBook::new()),
            policy,
        }
    }

    pub fn policy(&self) -> TransitionPolicy {
        self.policy
    }

    fn read_book(&self) -> RwLockReadGuard<'_, OrderBook> {
        self.book.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write_book(&self) -> RwLockWriteGuard<'_, OrderBook> {
        self.book.write().unwrap_or_else(|e| e.into_inner())
    }

    /// Snapshot of the current book.
    pub fn book(&self) -> OrderBook {
        self.read_book().clone()
    }

    pub fn counts(&self) -> StatusCounts {
        self.read_book().counts()
    }

    /// Fetch the full order list and replace the book.
    pub async fn refresh(&self) -> Result<Vec<Order>, OrderError> {
        let orders = self.source.fetch_orders().await?;
        debug!(count = orders.len(), "order list refreshed");
        let mut book = self.write_book();
        book.replace_all(orders);
        Ok(book.newest_first())
    }

    /// Apply a user action to one order.
    ///
    /// The policy is checked against the locally known status before any
    /// request is sent. On success the order returned by the backend is
    /// merged into the book; on failure local state is left untouched.
    pub async fn apply(&self, id: i64, action: OrderAction) -> Result<Order, OrderError> {
        let current = self.read_book().get(id).map(|o| o.status);

        match (current, self.policy) {
            (Some(from), policy) => policy.check(id, from, action)?,
            (None, TransitionPolicy::KitchenGuarded) => return Err(OrderError::UnknownOrder(id)),
            (None, TransitionPolicy::Lenient) => {}
        }

        let target = action.target();
        let updated = match self.source.update_status(id, target).await {
            Ok(order) => order,
            Err(e) => {
                warn!(order_id = id, action = action.label(), error = %e, "status update failed");
                return Err(e.into());
            }
        };
        info!(order_id = id, from = ?current, to = %updated.status, "order status updated");

        self.write_book().merge(updated.clone());
        Ok(updated)
    }

    /// Submit a new order and merge the created record.
    pub async fn place(&self, request: NewOrderRequest) -> Result<Order, OrderError> {
        if request.items.is_empty() {
            return Err(OrderError::EmptyCart);
        }
        let created = self.source.submit_order(&request).await?;
        info!(
            order_id = created.id,
            table = ?request.table_number,
            lines = request.items.len(),
            "order placed"
        );
        self.write_book().merge(created.clone());
        Ok(created)
    }
}

// ---------------------------------------------------------------------------
// Carts
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CartLine {
    pub menu_item_id: i64,
    pub name: String,
    pub unit_price: f64,
    pub quantity: i64,
}

/// Menu cart keyed by menu item id.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Cart {
    lines: BTreeMap<i64, CartLine>,
}

impl Cart {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one unit of `item`.
    pub fn add(&mut self, item: &MenuItem) {
        self.lines
            .entry(item.id)
            .and_modify(|l| l.quantity += 1)
            .or_insert_with(|| CartLine {
                menu_item_id: item.id,
                name: item.name.clone(),
                unit_price: item.price,
                quantity: 1,
            });
    }

    /// Remove one unit; the line disappears when it reaches zero.
    pub fn remove(&mut self, menu_item_id: i64) {
        if let Some(line) = self.lines.get_mut(&menu_item_id) {
            if line.quantity > 1 {
                line.quantity -= 1;
            } else {
                self.lines.remove(&menu_item_id);
            }
        }
    }

    pub fn quantity_of(&self, menu_item_id: i64) -> i64 {
        self.lines.get(&menu_item_id).map_or(0, |l| l.quantity)
    }

    pub fn lines(&self) -> impl Iterator<Item = &CartLine> {
        self.lines.values()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn item_count(&self) -> i64 {
        self.lines.values().map(|l| l.quantity).sum()
    }

    /// Preview total at menu prices; the backend prices the real order.
    pub fn total(&self) -> f64 {
        self.lines
            .values()
            .map(|l| l.unit_price * l.quantity as f64)
            .sum()
    }

    pub fn clear(&mut self) {
        self.lines.clear();
    }

    fn request_lines(&self) -> Vec<OrderLineRequest> {
        self.lines
            .values()
            .map(|l| OrderLineRequest {
                menu_item_id: l.menu_item_id,
                quantity: l.quantity,
            })
            .collect()
    }
}

/// Order payload for a customer scanning a table QR code.
pub fn qr_order_request(
    table_number: Option<u32>,
    instructions: Option<&str>,
    cart: &Cart,
) -> Result<NewOrderRequest, OrderError> {
    if cart.is_empty() {
        return Err(OrderError::EmptyCart);
    }
    Ok(NewOrderRequest {
        customer_name: QR_GUEST_NAME.to_string(),
        table_number,
        waiter_name: QR_WAITER_NAME.to_string(),
        instructions: non_blank(instructions),
        items: cart.request_lines(),
        tax_rate: None,
    })
}

/// Order payload entered by staff on the order management screen.
#[derive(Debug, Clone, Default)]
pub struct StaffOrder<'a> {
    pub customer_name: &'a str,
    pub table_number: Option<u32>,
    pub waiter_name: &'a str,
    pub instructions: Option<&'a str>,
    pub tax_rate: Option<f64>,
}

pub fn staff_order_request(form: &StaffOrder<'_>, cart: &Cart) -> Result<NewOrderRequest, OrderError> {
    if cart.is_empty() {
        return Err(OrderError::EmptyCart);
    }
    Ok(NewOrderRequest {
        customer_name: form.customer_name.trim().to_string(),
        table_number: form.table_number,
        waiter_name: form.waiter_name.trim().to_string(),
        instructions: non_blank(form.instructions),
        items: cart.request_lines(),
        tax_rate: form.tax_rate.filter(|r| r.is_finite() && *r >= 0.0),
    })
}

fn non_blank(s: Option<&str>) -> Option<String> {
    s.map(str::trim).filter(|s| !s.is_empty()).map(str::to_string)
}
