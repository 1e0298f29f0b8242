//! Billing projections: bill totals, the bill list, active dining by table,
//! the settle-and-print flow, and counter bills created from a cart.

use std::collections::BTreeMap;

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::config::{AppConfig, DEFAULT_TAX_RATE};
use crate::document::{GeneratedDocument, RestaurantIdentity};
use crate::error::OrderError;
use crate::models::{table_label, Order, OrderItem, OrderStatus};
use crate::orders::{staff_order_request, Cart, OrderAction, OrderLifecycle, StaffOrder};
use crate::{receipt, report};

pub const DEFAULT_PAYMENT_METHOD: &str = "Cash";
/// Waiter recorded on bills raised at the billing counter.
pub const COUNTER_WAITER_NAME: &str = "Admin";

/// Clamp an amount for document output: non-finite or negative becomes 0.
pub fn normalize_amount(value: f64) -> f64 {
    if value.is_finite() && value > 0.0 {
        value
    } else {
        0.0
    }
}

/// `BILL-007`
pub fn bill_no(order_id: i64) -> String {
    format!("BILL-{order_id:03}")
}

// ---------------------------------------------------------------------------
// Totals
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BillTotals {
    pub subtotal: f64,
    pub tax_rate: f64,
    pub tax: f64,
    pub discount: f64,
    pub total: f64,
}

impl BillTotals {
    /// Tax is `subtotal × rate / 100`; the discount is a flat amount.
    pub fn compute(subtotal: f64, tax_rate: f64, discount: f64) -> Self {
        let subtotal = normalize_amount(subtotal);
        let tax_rate = normalize_amount(tax_rate);
        let discount = normalize_amount(discount);
        let tax = subtotal * (tax_rate / 100.0);
        Self {
            subtotal,
            tax_rate,
            tax,
            discount,
            total: subtotal + tax - discount,
        }
    }

    /// Central half of the single blended tax.
    pub fn cgst(&self) -> f64 {
        self.tax / 2.0
    }

    /// State half of the single blended tax.
    pub fn sgst(&self) -> f64 {
        self.tax / 2.0
    }
}

// ---------------------------------------------------------------------------
// Bill
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BillLine {
    pub name: String,
    pub unit_price: f64,
    pub quantity: i64,
}

impl BillLine {
    pub fn line_total(&self) -> f64 {
        normalize_amount(self.unit_price) * self.quantity.max(0) as f64
    }
}

/// Transient bill used to print a receipt. Never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Bill {
    pub bill_no: String,
    pub table_label: String,
    pub customer: String,
    pub payment_method: String,
    pub issued_at: Option<NaiveDateTime>,
    pub items: Vec<BillLine>,
    pub subtotal: f64,
    pub tax: f64,
    /// When absent the rate is derived from `tax / subtotal`.
    pub tax_rate: Option<f64>,
    pub discount: f64,
    pub total: f64,
}

impl Bill {
    /// Build a bill for one table from its orders. Identical lines (same
    /// name and order-time price) are merged.
    pub fn from_orders(
        orders: &[Order],
        tax_rate: f64,
        discount: f64,
        payment_method: &str,
        issued_at: NaiveDateTime,
    ) -> Self {
        let mut lines: Vec<BillLine> = Vec::new();
        for item in orders.iter().flat_map(|o| o.items.iter()) {
            let existing = lines.iter_mut().find(|l| {
                l.name == item.menu_item.name && l.unit_price == item.price_at_order
            });
            match existing {
                Some(line) => line.quantity += item.quantity,
                None => lines.push(BillLine {
                    name: item.menu_item.name.clone(),
                    unit_price: item.price_at_order,
                    quantity: item.quantity,
                }),
            }
        }

        let subtotal: f64 = lines.iter().map(BillLine::line_total).sum();
        let totals = BillTotals::compute(subtotal, tax_rate, discount);
        let first = orders.first();

        Self {
            bill_no: first.map(|o| bill_no(o.id)).unwrap_or_else(|| bill_no(0)),
            table_label: table_label(first.and_then(|o| o.table_number)),
            customer: first
                .map(|o| o.customer_name.trim())
                .filter(|c| !c.is_empty())
                .unwrap_or("Guest")
                .to_string(),
            payment_method: payment_method.to_string(),
            issued_at: Some(issued_at),
            items: lines,
            subtotal: totals.subtotal,
            tax: totals.tax,
            tax_rate: Some(totals.tax_rate),
            discount: totals.discount,
            total: totals.total,
        }
    }

    /// Copy with every amount clamped to a finite, non-negative value.
    pub fn normalized(&self) -> Self {
        let mut bill = self.clone();
        bill.subtotal = normalize_amount(bill.subtotal);
        bill.tax = normalize_amount(bill.tax);
        bill.discount = normalize_amount(bill.discount);
        bill.total = normalize_amount(bill.total);
        bill.tax_rate = bill.tax_rate.map(normalize_amount);
        for line in &mut bill.items {
            line.unit_price = normalize_amount(line.unit_price);
            line.quantity = line.quantity.max(0);
        }
        bill
    }

    /// The stated rate, or `tax / subtotal × 100` when none was given.
    pub fn effective_tax_rate(&self) -> f64 {
        match self.tax_rate {
            Some(rate) if rate.is_finite() && rate > 0.0 => rate,
            _ if self.subtotal > 0.0 => normalize_amount(self.tax) / self.subtotal * 100.0,
            _ => 0.0,
        }
    }

    pub fn cgst(&self) -> f64 {
        self.tax / 2.0
    }

    pub fn sgst(&self) -> f64 {
        self.tax / 2.0
    }
}

// ---------------------------------------------------------------------------
// Bill list
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PaymentStatus {
    Paid,
    Pending,
}

impl PaymentStatus {
    pub fn label(self) -> &'static str {
        match self {
            PaymentStatus::Paid => "Paid",
            PaymentStatus::Pending => "Pending",
        }
    }
}

/// One row of the bills table, projected from an order.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BillRow {
    pub order_id: i64,
    pub bill_no: String,
    pub customer: String,
    pub table_label: String,
    pub date_time: Option<NaiveDateTime>,
    pub items: i64,
    pub subtotal: f64,
    pub tax: f64,
    pub discount: f64,
    pub total: f64,
    pub payment_method: String,
    pub payment_status: PaymentStatus,
}

impl BillRow {
    pub fn from_order(order: &Order) -> Self {
        let total = normalize_amount(order.total_amount);
        Self {
            order_id: order.id,
            bill_no: bill_no(order.id),
            customer: order.customer_name.clone(),
            table_label: order.table_label(),
            date_time: order.order_time,
            items: order.total_items_count.max(0),
            subtotal: total,
            tax: 0.0,
            discount: 0.0,
            total,
            payment_method: DEFAULT_PAYMENT_METHOD.to_string(),
            payment_status: if order.status == OrderStatus::Completed {
                PaymentStatus::Paid
            } else {
                PaymentStatus::Pending
            },
        }
    }
}

pub fn bill_rows(orders: &[Order]) -> Vec<BillRow> {
    orders.iter().map(BillRow::from_order).collect()
}

/// Bill list filters. `None` means "all".
#[derive(Debug, Clone, Default)]
pub struct BillFilter {
    pub payment_method: Option<String>,
    pub status: Option<PaymentStatus>,
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
}

impl BillFilter {
    pub fn matches(&self, row: &BillRow) -> bool {
        if let Some(method) = &self.payment_method {
            if !row.payment_method.eq_ignore_ascii_case(method) {
                return false;
            }
        }
        if let Some(status) = self.status {
            if row.payment_status != status {
                return false;
            }
        }
        if self.from.is_some() || self.to.is_some() {
            let Some(date) = row.date_time.map(|d| d.date()) else {
                return false;
            };
            if self.from.is_some_and(|from| date < from) || self.to.is_some_and(|to| date > to) {
                return false;
            }
        }
        true
    }

    pub fn apply<'a>(&self, rows: &'a [BillRow]) -> Vec<&'a BillRow> {
        rows.iter().filter(|r| self.matches(r)).collect()
    }
}

// ---------------------------------------------------------------------------
// Active dining
// ---------------------------------------------------------------------------

/// All non-terminal orders for one table.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActiveTable {
    pub table_number: Option<u32>,
    pub table_label: String,
    pub orders: Vec<Order>,
    pub order_count: usize,
    pub total_amount: f64,
    /// Sum of each order's item count.
    pub item_count: i64,
    /// Every order line, in order id order.
    pub items: Vec<OrderItem>,
}

/// Group active orders by table. Numbered tables come first in ascending
/// order; takeaway orders are collected last.
pub fn active_dining(orders: &[Order]) -> Vec<ActiveTable> {
    let mut groups: BTreeMap<(bool, u32), Vec<&Order>> = BTreeMap::new();
    for order in orders.iter().filter(|o| o.status.is_active()) {
        let key = match order.table_number {
            Some(n) => (false, n),
            None => (true, 0),
        };
        groups.entry(key).or_default().push(order);
    }

    groups
        .into_values()
        .map(|mut group| {
            group.sort_by_key(|o| o.id);
            let table_number = group[0].table_number;
            ActiveTable {
                table_number,
                table_label: table_label(table_number),
                order_count: group.len(),
                total_amount: group.iter().map(|o| normalize_amount(o.total_amount)).sum(),
                item_count: group.iter().map(|o| o.total_items_count.max(0)).sum(),
                items: group.iter().flat_map(|o| o.items.iter().cloned()).collect(),
                orders: group.into_iter().cloned().collect(),
            }
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Settlement
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct SettleOptions {
    pub tax_rate: f64,
    pub discount: f64,
    pub payment_method: String,
}

impl Default for SettleOptions {
    fn default() -> Self {
        Self {
            tax_rate: DEFAULT_TAX_RATE,
            discount: 0.0,
            payment_method: DEFAULT_PAYMENT_METHOD.to_string(),
        }
    }
}

impl From<&AppConfig> for SettleOptions {
    fn from(config: &AppConfig) -> Self {
        Self {
            tax_rate: config.default_tax_rate,
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone)]
pub struct Settlement {
    pub bill: Bill,
    pub receipt: GeneratedDocument,
    pub settled: Vec<Order>,
}

/// "Generate Bill" for a table: complete every order, then print the
/// receipt from the completed orders.
///
/// Orders are completed one by one; the first failure stops the flow and
/// is returned. Orders completed before the failure stay completed.
pub async fn settle_table(
    lifecycle: &OrderLifecycle,
    table: &ActiveTable,
    options: &SettleOptions,
    identity: &RestaurantIdentity,
    now: NaiveDateTime,
) -> Result<Settlement, OrderError> {
    let mut settled = Vec::with_capacity(table.orders.len());
    for order in &table.orders {
        match lifecycle.apply(order.id, OrderAction::SettleBill).await {
            Ok(updated) => settled.push(updated),
            Err(e) => {
                warn!(order_id = order.id, table = %table.table_label, error = %e, "bill settlement stopped");
                return Err(e);
            }
        }
    }

    // The backend copy may omit line items; fall back to what was on screen.
    let source: Vec<Order> = settled
        .iter()
        .zip(&table.orders)
        .map(|(done, shown)| {
            if done.items.is_empty() {
                Order {
                    status: done.status,
                    ..shown.clone()
                }
            } else {
                done.clone()
            }
        })
        .collect();

    let bill = Bill::from_orders(
        &source,
        options.tax_rate,
        options.discount,
        &options.payment_method,
        now,
    );
    let receipt = receipt::render_receipt(&bill, identity);
    info!(
        bill_no = %bill.bill_no,
        table = %bill.table_label,
        orders = settled.len(),
        total = bill.total,
        "bill settled"
    );
    Ok(Settlement {
        bill,
        receipt,
        settled,
    })
}

// ---------------------------------------------------------------------------
// Counter bills
// ---------------------------------------------------------------------------

/// The "Create Bill" form on the billing screen.
#[derive(Debug, Clone)]
pub struct BillForm {
    pub customer: String,
    /// `Table 01` style label, or `Takeaway`.
    pub table: String,
    pub tax_rate: f64,
    pub discount: f64,
    pub payment_method: String,
}

impl BillForm {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            customer: String::new(),
            table: "Table 01".to_string(),
            tax_rate: config.default_tax_rate,
            discount: 0.0,
            payment_method: DEFAULT_PAYMENT_METHOD.to_string(),
        }
    }
}

/// `Table 07` → 7. Anything else (takeaway, garbage) has no table number.
pub fn parse_table_choice(label: &str) -> Option<u32> {
    label
        .trim()
        .strip_prefix("Table")
        .and_then(|n| n.trim().parse::<u32>().ok())
}

#[derive(Debug, Clone)]
pub struct CreatedBill {
    pub order: Order,
    pub bill: Bill,
    pub invoice: GeneratedDocument,
}

impl Bill {
    /// Bill for a counter order. Lines and amounts come from the cart as
    /// entered; the bill number, table and customer from the created order.
    pub fn from_cart(order: &Order, cart: &Cart, form: &BillForm, issued_at: NaiveDateTime) -> Self {
        let items: Vec<BillLine> = cart
            .lines()
            .map(|l| BillLine {
                name: l.name.clone(),
                unit_price: l.unit_price,
                quantity: l.quantity,
            })
            .collect();
        let subtotal: f64 = items.iter().map(BillLine::line_total).sum();
        let totals = BillTotals::compute(subtotal, form.tax_rate, form.discount);
        let customer = order.customer_name.trim();

        Self {
            bill_no: bill_no(order.id),
            table_label: table_label(order.table_number),
            customer: if customer.is_empty() { "Guest" } else { customer }.to_string(),
            payment_method: form.payment_method.clone(),
            issued_at: Some(issued_at),
            items,
            subtotal: totals.subtotal,
            tax: totals.tax,
            tax_rate: Some(totals.tax_rate),
            discount: totals.discount,
            total: totals.total,
        }
    }
}

/// "Create Bill": post the cart as a new order, then produce the A4
/// invoice for it. Nothing is rendered when the order is rejected.
pub async fn create_bill(
    lifecycle: &OrderLifecycle,
    form: &BillForm,
    cart: &Cart,
    identity: &RestaurantIdentity,
    now: NaiveDateTime,
) -> Result<CreatedBill, OrderError> {
    let request = staff_order_request(
        &StaffOrder {
            customer_name: &form.customer,
            table_number: parse_table_choice(&form.table),
            waiter_name: COUNTER_WAITER_NAME,
            instructions: None,
            tax_rate: Some(normalize_amount(form.tax_rate)),
        },
        cart,
    )?;
    let order = lifecycle.place(request).await?;

    let bill = Bill::from_cart(&order, cart, form, now);
    let invoice = report::bill_invoice(&bill, identity);
    info!(
        bill_no = %bill.bill_no,
        table = %bill.table_label,
        total = bill.total,
        "bill created"
    );
    Ok(CreatedBill {
        order,
        bill,
        invoice,
    })
}
