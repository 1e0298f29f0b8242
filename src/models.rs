//! Wire types returned by the console REST backend.
//!
//! The backend serializes Java entities with camelCase names and nullable
//! boxed numbers. Numeric fields are normalized to zero on the way in so the
//! billing and document layers never see a missing amount.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDateTime};
use serde::{Deserialize, Deserializer, Serialize};

// ---------------------------------------------------------------------------
// Lenient field decoders
// ---------------------------------------------------------------------------

pub(crate) fn f64_or_zero<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<f64>::deserialize(deserializer)?;
    Ok(value.filter(|v| v.is_finite()).unwrap_or(0.0))
}

pub(crate) fn i64_or_zero<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<i64>::deserialize(deserializer)?.unwrap_or(0))
}

pub(crate) fn string_or_empty<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

/// Accept `2026-01-05T12:30:00`, fractional seconds, or a full RFC 3339
/// timestamp. Anything unparseable becomes `None`.
fn lenient_datetime<'de, D>(deserializer: D) -> Result<Option<NaiveDateTime>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    Ok(raw.as_deref().and_then(parse_timestamp))
}

pub(crate) fn parse_timestamp(raw: &str) -> Option<NaiveDateTime> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%dT%H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%d %H:%M:%S"))
        .ok()
        .or_else(|| {
            DateTime::parse_from_rfc3339(trimmed)
                .ok()
                .map(|dt| dt.naive_local())
        })
}

// ---------------------------------------------------------------------------
// Orders
// ---------------------------------------------------------------------------

/// Order lifecycle status as stored by the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderStatus {
    Pending,
    Preparing,
    Ready,
    Completed,
    Cancelled,
}

impl OrderStatus {
    pub const ALL: [OrderStatus; 5] = [
        OrderStatus::Pending,
        OrderStatus::Preparing,
        OrderStatus::Ready,
        OrderStatus::Completed,
        OrderStatus::Cancelled,
    ];

    /// Wire value used in `PUT /orders/{id}/status?status=`.
    pub fn as_str(self) -> &'static str {
        match self {
            OrderStatus::Pending => "PENDING",
            OrderStatus::Preparing => "PREPARING",
            OrderStatus::Ready => "READY",
            OrderStatus::Completed => "COMPLETED",
            OrderStatus::Cancelled => "CANCELLED",
        }
    }

    /// Title-case label used by list views.
    pub fn label(self) -> &'static str {
        match self {
            OrderStatus::Pending => "Pending",
            OrderStatus::Preparing => "Preparing",
            OrderStatus::Ready => "Ready",
            OrderStatus::Completed => "Completed",
            OrderStatus::Cancelled => "Cancelled",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, OrderStatus::Completed | OrderStatus::Cancelled)
    }

    pub fn is_active(self) -> bool {
        !self.is_terminal()
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrderStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "PENDING" => Ok(OrderStatus::Pending),
            "PREPARING" => Ok(OrderStatus::Preparing),
            "READY" => Ok(OrderStatus::Ready),
            "COMPLETED" => Ok(OrderStatus::Completed),
            "CANCELLED" => Ok(OrderStatus::Cancelled),
            other => Err(format!("Invalid status: {other}")),
        }
    }
}

/// Menu item snapshot embedded in an order line.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MenuItemRef {
    #[serde(deserialize_with = "i64_or_zero")]
    pub id: i64,
    #[serde(deserialize_with = "string_or_empty")]
    pub name: String,
    #[serde(deserialize_with = "string_or_empty")]
    pub category: String,
    #[serde(deserialize_with = "f64_or_zero")]
    pub price: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct OrderItem {
    #[serde(deserialize_with = "i64_or_zero")]
    pub id: i64,
    pub menu_item: MenuItemRef,
    #[serde(deserialize_with = "i64_or_zero")]
    pub quantity: i64,
    /// Unit price captured when the order was placed.
    #[serde(deserialize_with = "f64_or_zero")]
    pub price_at_order: f64,
}

impl OrderItem {
    pub fn line_total(&self) -> f64 {
        self.price_at_order * self.quantity as f64
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub id: i64,
    #[serde(default)]
    pub table_number: Option<u32>,
    #[serde(default, deserialize_with = "string_or_empty")]
    pub customer_name: String,
    #[serde(default, deserialize_with = "string_or_empty")]
    pub waiter_name: String,
    #[serde(default)]
    pub items: Vec<OrderItem>,
    #[serde(default)]
    pub instructions: Option<String>,
    pub status: OrderStatus,
    #[serde(default)]
    pub priority: Option<String>,
    #[serde(default, deserialize_with = "lenient_datetime")]
    pub order_time: Option<NaiveDateTime>,
    #[serde(default, deserialize_with = "f64_or_zero")]
    pub total_amount: f64,
    #[serde(default, deserialize_with = "i64_or_zero")]
    pub total_items_count: i64,
    #[serde(default, deserialize_with = "f64_or_zero")]
    pub tax_rate: f64,
    #[serde(default, deserialize_with = "f64_or_zero")]
    pub tax_amount: f64,
}

impl Order {
    /// `Table 05` for dine-in orders, `Takeaway` otherwise.
    pub fn table_label(&self) -> String {
        table_label(self.table_number)
    }

    /// Sum of line totals at order-time prices.
    pub fn items_subtotal(&self) -> f64 {
        self.items.iter().map(OrderItem::line_total).sum()
    }
}

pub fn table_label(table_number: Option<u32>) -> String {
    match table_number {
        Some(n) => format!("Table {n:02}"),
        None => "Takeaway".to_string(),
    }
}

// ---------------------------------------------------------------------------
// Menu, tables, settings
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MenuItem {
    #[serde(deserialize_with = "i64_or_zero")]
    pub id: i64,
    #[serde(deserialize_with = "string_or_empty")]
    pub name: String,
    #[serde(deserialize_with = "string_or_empty")]
    pub category: String,
    #[serde(deserialize_with = "f64_or_zero")]
    pub price: f64,
    #[serde(deserialize_with = "f64_or_zero")]
    pub cost: f64,
    pub available: bool,
}

impl MenuItem {
    /// Gross margin rounded to a whole percent. Zero-priced items report 0.
    pub fn margin_percent(&self) -> i64 {
        if self.price <= 0.0 {
            return 0;
        }
        (((self.price - self.cost) / self.price) * 100.0).round() as i64
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum TableStatus {
    #[default]
    Available,
    Occupied,
    Reserved,
    Other(String),
}

impl From<String> for TableStatus {
    fn from(value: String) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "available" => TableStatus::Available,
            "occupied" => TableStatus::Occupied,
            "reserved" => TableStatus::Reserved,
            _ => TableStatus::Other(value),
        }
    }
}

impl From<TableStatus> for String {
    fn from(value: TableStatus) -> Self {
        match value {
            TableStatus::Available => "Available".to_string(),
            TableStatus::Occupied => "Occupied".to_string(),
            TableStatus::Reserved => "Reserved".to_string(),
            TableStatus::Other(raw) => raw,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DiningTable {
    #[serde(deserialize_with = "i64_or_zero")]
    pub id: i64,
    #[serde(deserialize_with = "i64_or_zero")]
    pub table_no: i64,
    #[serde(deserialize_with = "i64_or_zero")]
    pub capacity: i64,
    #[serde(deserialize_with = "string_or_empty")]
    pub location: String,
    pub status: TableStatus,
    pub waiter: Option<String>,
    pub current_order: Option<String>,
}

/// Restaurant identity and tax configuration from `GET /settings`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RestaurantSettings {
    pub restaurant_name: Option<String>,
    pub address: Option<String>,
    pub phone_number: Option<String>,
    pub website_url: Option<String>,
    pub gst_number: Option<String>,
    pub currency: Option<String>,
    #[serde(deserialize_with = "f64_or_zero")]
    pub tax_cgst: f64,
    #[serde(deserialize_with = "f64_or_zero")]
    pub tax_sgst: f64,
}

// ---------------------------------------------------------------------------
// Reports and dashboard
// ---------------------------------------------------------------------------

/// Monthly analytics aggregate from `GET /reports?year=&month=`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ReportData {
    #[serde(deserialize_with = "f64_or_zero")]
    pub total_revenue: f64,
    #[serde(deserialize_with = "f64_or_zero")]
    pub total_revenue_growth: f64,
    #[serde(deserialize_with = "f64_or_zero")]
    pub avg_order_value: f64,
    #[serde(deserialize_with = "f64_or_zero")]
    pub avg_order_growth: f64,
    #[serde(deserialize_with = "i64_or_zero")]
    pub total_customers: i64,
    #[serde(deserialize_with = "f64_or_zero")]
    pub customer_growth: f64,
    #[serde(deserialize_with = "f64_or_zero")]
    pub inventory_turnover: f64,
    pub revenue_trend: BTreeMap<String, f64>,
    pub orders_trend: BTreeMap<String, i64>,
    pub sales_by_category: BTreeMap<String, f64>,
    pub peak_dining_hours: BTreeMap<String, i64>,
    #[serde(deserialize_with = "f64_or_zero")]
    pub total_tax_collected: f64,
    #[serde(deserialize_with = "f64_or_zero")]
    pub inventory_wastage_value: f64,
    pub top_staff_name: Option<String>,
    #[serde(deserialize_with = "f64_or_zero")]
    pub top_staff_sales: f64,
}

/// Dashboard header figures from `GET /dashboard/stats`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DashboardStats {
    #[serde(deserialize_with = "i64_or_zero")]
    pub active_orders: i64,
    #[serde(deserialize_with = "i64_or_zero")]
    pub low_stock_items: i64,
    #[serde(deserialize_with = "f64_or_zero")]
    pub today_revenue: f64,
    #[serde(deserialize_with = "f64_or_zero")]
    pub total_revenue: f64,
    #[serde(deserialize_with = "i64_or_zero")]
    pub total_inventory_items: i64,
    #[serde(deserialize_with = "i64_or_zero")]
    pub total_tables: i64,
    #[serde(deserialize_with = "i64_or_zero")]
    pub occupied_tables: i64,
    #[serde(rename = "revenueLast7Days")]
    pub revenue_last_7_days: BTreeMap<String, f64>,
    pub sales_by_category: BTreeMap<String, i64>,
}

impl DashboardStats {
    /// Table occupancy rounded to a whole percent.
    pub fn occupancy_percent(&self) -> i64 {
        if self.total_tables <= 0 {
            return 0;
        }
        ((self.occupied_tables as f64 / self.total_tables as f64) * 100.0).round() as i64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn order_decodes_backend_shape_with_nulls() {
        let raw = serde_json::json!({
            "id": 7,
            "tableNumber": 5,
            "customerName": "Guest",
            "waiterName": null,
            "status": "PREPARING",
            "priority": "Normal",
            "orderTime": "2026-01-05T12:30:15.123",
            "totalAmount": null,
            "totalItemsCount": 2,
            "items": [{
                "id": 1,
                "menuItem": {"id": 3, "name": "Paneer Tikka", "category": "Starters", "price": 220.0},
                "quantity": 2,
                "priceAtOrder": 220.0
            }]
        });
        let order: Order = serde_json::from_value(raw).unwrap();
        assert_eq!(order.status, OrderStatus::Preparing);
        assert_eq!(order.total_amount, 0.0);
        assert_eq!(order.waiter_name, "");
        assert_eq!(order.items_subtotal(), 440.0);
        assert_eq!(order.table_label(), "Table 05");
        assert!(order.order_time.is_some());
    }

    #[test]
    fn takeaway_label_when_no_table() {
        assert_eq!(table_label(None), "Takeaway");
        assert_eq!(table_label(Some(12)), "Table 12");
    }

    #[test]
    fn status_parses_case_insensitively() {
        assert_eq!("ready".parse::<OrderStatus>(), Ok(OrderStatus::Ready));
        assert!("served".parse::<OrderStatus>().is_err());
        assert_eq!(OrderStatus::Cancelled.to_string(), "CANCELLED");
    }

    #[test]
    fn table_status_preserves_unknown_values() {
        let table: DiningTable =
            serde_json::from_value(serde_json::json!({"tableNo": 3, "status": "Cleaning"}))
                .unwrap();
        assert_eq!(table.status, TableStatus::Other("Cleaning".to_string()));
        let occupied: TableStatus = "occupied".to_string().into();
        assert_eq!(occupied, TableStatus::Occupied);
    }

    #[test]
    fn margin_rounds_to_whole_percent() {
        let item = MenuItem {
            price: 300.0,
            cost: 110.0,
            ..MenuItem::default()
        };
        assert_eq!(item.margin_percent(), 63);
        assert_eq!(MenuItem::default().margin_percent(), 0);
    }

    #[test]
    fn dashboard_occupancy() {
        let stats: DashboardStats = serde_json::from_value(serde_json::json!({
            "totalTables": 12,
            "occupiedTables": 5,
            "revenueLast7Days": {"Mon": 1200.0}
        }))
        .unwrap();
        assert_eq!(stats.occupancy_percent(), 42);
        assert_eq!(stats.revenue_last_7_days.len(), 1);
        assert_eq!(DashboardStats::default().occupancy_percent(), 0);
    }

    #[test]
    fn timestamps_accept_rfc3339() {
        assert!(parse_timestamp("2026-01-05T12:30:00Z").is_some());
        assert!(parse_timestamp("2026-01-05 12:30:00").is_some());
        assert!(parse_timestamp("yesterday").is_none());
    }
}
