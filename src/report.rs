//! A4 tabular reports: letterhead plus auto-sized tables.
//!
//! There is no multi-page flow. Optional tables that would run off the page
//! are skipped, a required table starting past [`SAFE_START_THRESHOLD`] is
//! moved to [`DEFAULT_TABLE_START`], and rows never cross [`PAGE_BOTTOM`].

use chrono::{NaiveDate, NaiveDateTime};
use tracing::debug;

use crate::billing::{normalize_amount, Bill, BillFilter, BillRow, PaymentStatus};
use crate::document::{percent_label, rupees, GeneratedDocument, RestaurantIdentity};
use crate::layout::{Align, Canvas, Cursor, Font, PageSize, Rgb};
use crate::models::ReportData;
use crate::pdf;

pub const MARGIN: f64 = 14.0;
pub const DEFAULT_TABLE_START: f64 = 40.0;
pub const SAFE_START_THRESHOLD: f64 = 250.0;
/// Lowest y a table row may reach.
pub const PAGE_BOTTOM: f64 = 282.0;

const BRAND: Rgb = Rgb(220, 53, 69);
const ROW_SHADE: Rgb = Rgb(245, 245, 245);
const CELL_PADDING: f64 = 2.0;
const TABLE_FONT_SIZE: f64 = 9.0;
const TABLE_GAP: f64 = 8.0;

fn printable_width() -> f64 {
    PageSize::A4.width_mm - 2.0 * MARGIN
}

// ---------------------------------------------------------------------------
// Auto table
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default)]
pub struct TableSpec {
    pub title: Option<String>,
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
    /// Columns drawn right-aligned.
    pub numeric_columns: Vec<usize>,
    /// Secondary tables are dropped when they would not fit.
    pub optional: bool,
}

impl TableSpec {
    pub fn new<S: Into<String>>(headers: impl IntoIterator<Item = S>) -> Self {
        Self {
            headers: headers.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn row<S: Into<String>>(mut self, cells: impl IntoIterator<Item = S>) -> Self {
        self.rows.push(cells.into_iter().map(Into::into).collect());
        self
    }

    pub fn numeric(mut self, columns: &[usize]) -> Self {
        self.numeric_columns = columns.to_vec();
        self
    }

    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    fn column_count(&self) -> usize {
        self.rows
            .iter()
            .map(Vec::len)
            .chain(std::iter::once(self.headers.len()))
            .max()
            .unwrap_or(0)
    }

    /// Title, header and every body row.
    pub fn estimated_height(&self) -> f64 {
        let title = if self.title.is_some() {
            Font::line_height(11.0) + 1.0
        } else {
            0.0
        };
        title + row_height() * (self.rows.len() + 1) as f64
    }
}

fn row_height() -> f64 {
    Font::line_height(TABLE_FONT_SIZE) + 2.0 * CELL_PADDING
}

/// Widths sized to content, then scaled so the table spans the printable
/// width exactly.
pub fn column_widths(spec: &TableSpec) -> Vec<f64> {
    let n = spec.column_count();
    if n == 0 {
        return Vec::new();
    }
    let mut widths = vec![0.0_f64; n];
    for (i, header) in spec.headers.iter().enumerate() {
        widths[i] = widths[i].max(Font::HelveticaBold.text_width(header, TABLE_FONT_SIZE));
    }
    for row in &spec.rows {
        for (i, cell) in row.iter().enumerate() {
            widths[i] = widths[i].max(Font::Helvetica.text_width(cell, TABLE_FONT_SIZE));
        }
    }
    for w in &mut widths {
        *w += 2.0 * CELL_PADDING;
    }
    let total: f64 = widths.iter().sum();
    let scale = printable_width() / total;
    widths.iter().map(|w| w * scale).collect()
}

/// Shorten `text` with `...` until it fits `width`.
fn fit_cell(text: &str, width: f64, font: Font) -> String {
    if font.text_width(text, TABLE_FONT_SIZE) <= width {
        return text.to_string();
    }
    let mut chars: Vec<char> = text.chars().collect();
    while !chars.is_empty() {
        chars.pop();
        let candidate: String = chars.iter().collect::<String>() + "...";
        if font.text_width(&candidate, TABLE_FONT_SIZE) <= width {
            return candidate;
        }
    }
    String::new()
}

/// Draw `spec` starting at `start_y` and return the y just below the last
/// row. A skipped table returns `start_y` unchanged.
///
/// Optional tables are skipped when they start past
/// [`SAFE_START_THRESHOLD`] or would not fit above [`PAGE_BOTTOM`]. A
/// required table starting past the threshold is moved to
/// [`DEFAULT_TABLE_START`], and rows that would cross [`PAGE_BOTTOM`] are
/// replaced by a single "more rows" line.
pub fn auto_table(canvas: &mut Canvas, start_y: f64, spec: &TableSpec) -> f64 {
    let past_threshold = !start_y.is_finite() || start_y > SAFE_START_THRESHOLD;

    if spec.optional && (past_threshold || start_y + spec.estimated_height() > PAGE_BOTTOM) {
        debug!(
            title = spec.title.as_deref().unwrap_or(""),
            start_y,
            height = spec.estimated_height(),
            "optional table skipped"
        );
        return start_y;
    }

    let start = if past_threshold {
        debug!(start_y, fallback = DEFAULT_TABLE_START, "table start reset");
        DEFAULT_TABLE_START
    } else {
        start_y
    };

    let widths = column_widths(spec);
    if widths.is_empty() {
        return start_y;
    }

    let mut cursor = Cursor::at(start);
    if let Some(title) = &spec.title {
        cursor.advance(Font::line_height(11.0));
        canvas
            .color(Rgb::BLACK)
            .font(Font::HelveticaBold, 11.0)
            .text(MARGIN, cursor.y() - 1.0, title);
        cursor.advance(1.0);
    }

    let rh = row_height();
    let baseline = |top: f64| top + CELL_PADDING + Font::line_height(TABLE_FONT_SIZE) * 0.75;

    // Header
    let top = cursor.y();
    canvas
        .fill_rect(MARGIN, top, printable_width(), rh, BRAND)
        .color(Rgb::WHITE)
        .font(Font::HelveticaBold, TABLE_FONT_SIZE);
    draw_cells(canvas, &widths, &spec.headers, baseline(top), spec, Font::HelveticaBold);
    cursor.advance(rh);

    // Body
    let room = ((PAGE_BOTTOM - cursor.y()) / rh).floor().max(0.0) as usize;
    let shown = if spec.rows.len() > room {
        room.saturating_sub(1)
    } else {
        spec.rows.len()
    };
    canvas.color(Rgb::BLACK).font(Font::Helvetica, TABLE_FONT_SIZE);
    for (i, row) in spec.rows.iter().take(shown).enumerate() {
        let top = cursor.y();
        if i % 2 == 1 {
            canvas.fill_rect(MARGIN, top, printable_width(), rh, ROW_SHADE);
        }
        draw_cells(canvas, &widths, row, baseline(top), spec, Font::Helvetica);
        cursor.advance(rh);
    }
    let hidden = spec.rows.len() - shown;
    if hidden > 0 && room > 0 {
        debug!(hidden, "table rows truncated at page bottom");
        let top = cursor.y();
        canvas
            .color(Rgb::GREY)
            .text(MARGIN + CELL_PADDING, baseline(top), &more_rows_label(hidden))
            .color(Rgb::BLACK);
        cursor.advance(rh);
    }

    canvas
        .color(Rgb::LIGHT_GREY)
        .line_width(0.2)
        .line(MARGIN, cursor.y(), MARGIN + printable_width(), cursor.y())
        .color(Rgb::BLACK);
    cursor.y()
}

fn more_rows_label(hidden: usize) -> String {
    match hidden {
        1 => "... 1 more row not shown".to_string(),
        n => format!("... {n} more rows not shown"),
    }
}

fn draw_cells(
    canvas: &mut Canvas,
    widths: &[f64],
    cells: &[String],
    baseline: f64,
    spec: &TableSpec,
    font: Font,
) {
    let mut x = MARGIN;
    for (i, width) in widths.iter().enumerate() {
        if let Some(cell) = cells.get(i) {
            let text = fit_cell(cell, width - 2.0 * CELL_PADDING, font);
            if spec.numeric_columns.contains(&i) {
                canvas.text_at(x + width - CELL_PADDING, baseline, &text, Align::Right);
            } else {
                canvas.text(x + CELL_PADDING, baseline, &text);
            }
        }
        x += width;
    }
}

// ---------------------------------------------------------------------------
// Letterhead
// ---------------------------------------------------------------------------

/// Identity, report title, generation time and filters. Returns the y
/// where the first table may start.
pub fn letterhead(
    canvas: &mut Canvas,
    identity: &RestaurantIdentity,
    title: &str,
    generated_at: NaiveDateTime,
    filters: &[(&str, String)],
) -> f64 {
    let center = PageSize::A4.width_mm / 2.0;
    let right = PageSize::A4.width_mm - MARGIN;
    let mut cursor = Cursor::at(20.0);

    canvas
        .color(BRAND)
        .font(Font::HelveticaBold, 18.0)
        .text_at(center, cursor.y(), &identity.name, Align::Center);
    cursor.advance(7.0);
    canvas
        .color(Rgb::GREY)
        .font(Font::Helvetica, 10.0)
        .text_at(center, cursor.y(), &identity.address, Align::Center);
    cursor.advance(5.0);
    canvas.text_at(center, cursor.y(), &format!("Phone: {}", identity.phone), Align::Center);
    cursor.advance(4.0);
    canvas
        .color(Rgb::LIGHT_GREY)
        .line_width(0.3)
        .line(MARGIN, cursor.y(), right, cursor.y());
    cursor.advance(8.0);

    canvas
        .color(Rgb::BLACK)
        .font(Font::HelveticaBold, 14.0)
        .text(MARGIN, cursor.y(), title)
        .font(Font::Helvetica, 9.0)
        .text_at(
            right,
            cursor.y(),
            &format!("Generated: {}", generated_at.format("%d/%m/%Y %H:%M")),
            Align::Right,
        );
    cursor.advance(6.0);

    for (label, value) in filters {
        canvas.text(MARGIN, cursor.y(), &format!("{label}: {value}"));
        cursor.advance(Font::line_height(9.0));
    }
    cursor.advance(2.0);
    cursor.y()
}

fn finish(canvas: &Canvas, file_name: String) -> GeneratedDocument {
    let out = pdf::render(canvas);
    debug!(file = %file_name, warnings = out.warnings.len(), "report rendered");
    GeneratedDocument {
        file_name,
        bytes: out.bytes,
        warnings: out.warnings,
    }
}

// ---------------------------------------------------------------------------
// Performance report
// ---------------------------------------------------------------------------

/// `2024-03`
pub fn period_key(year: i32, month: u32) -> String {
    format!("{year}-{month:02}")
}

fn period_label(year: i32, month: u32) -> String {
    NaiveDate::from_ymd_opt(year, month, 1)
        .map(|d| d.format("%B %Y").to_string())
        .unwrap_or_else(|| period_key(year, month))
}

fn growth(value: f64) -> String {
    if value.is_finite() {
        format!("{value:+.1}%")
    } else {
        "0.0%".to_string()
    }
}

/// Category rows sorted by sales, each with its share of the total
/// rounded to a whole percent.
pub fn category_shares(data: &ReportData) -> Vec<(String, f64, i64)> {
    let total: f64 = data.sales_by_category.values().copied().map(normalize_amount).sum();
    let mut rows: Vec<(String, f64, i64)> = data
        .sales_by_category
        .iter()
        .map(|(name, v)| {
            let v = normalize_amount(*v);
            let share = if total > 0.0 {
                (v / total * 100.0).round() as i64
            } else {
                0
            };
            (name.clone(), v, share)
        })
        .collect();
    rows.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    rows
}

pub fn build_performance_report(
    data: &ReportData,
    year: i32,
    month: u32,
    identity: &RestaurantIdentity,
    generated_at: NaiveDateTime,
) -> Canvas {
    let mut canvas = Canvas::new(PageSize::A4);
    let mut y = letterhead(
        &mut canvas,
        identity,
        "Performance Report",
        generated_at,
        &[("Period", period_label(year, month))],
    );

    let top_staff = match data.top_staff_name.as_deref().map(str::trim) {
        Some(name) if !name.is_empty() => format!("{name} ({})", rupees(data.top_staff_sales)),
        _ => "-".to_string(),
    };
    let metrics = TableSpec::new(["Metric", "Value"])
        .title("Key Metrics")
        .numeric(&[1])
        .row(["Total Revenue".to_string(), rupees(data.total_revenue)])
        .row(["Revenue Growth".to_string(), growth(data.total_revenue_growth)])
        .row(["Average Order Value".to_string(), rupees(data.avg_order_value)])
        .row(["Average Order Growth".to_string(), growth(data.avg_order_growth)])
        .row(["Total Customers".to_string(), data.total_customers.max(0).to_string()])
        .row(["Customer Growth".to_string(), growth(data.customer_growth)])
        .row(["Tax Collected".to_string(), rupees(data.total_tax_collected)])
        .row([
            "Inventory Turnover".to_string(),
            format!("{:.2}", normalize_amount(data.inventory_turnover)),
        ])
        .row(["Inventory Wastage".to_string(), rupees(data.inventory_wastage_value)])
        .row(["Top Staff".to_string(), top_staff]);
    y = auto_table(&mut canvas, y, &metrics);

    let shares = category_shares(data);
    if !shares.is_empty() {
        let mut table = TableSpec::new(["Category", "Sales", "Share"])
            .title("Sales by Category")
            .numeric(&[1, 2])
            .optional();
        for (name, sales, share) in &shares {
            table = table.row([name.clone(), rupees(*sales), format!("{share}%")]);
        }
        y = auto_table(&mut canvas, y + TABLE_GAP, &table);
    }

    if !data.revenue_trend.is_empty() {
        let mut table = TableSpec::new(["Period", "Revenue", "Orders"])
            .title("Revenue Trend")
            .numeric(&[1, 2])
            .optional();
        for (label, revenue) in &data.revenue_trend {
            let orders = data
                .orders_trend
                .get(label)
                .map(|n| n.to_string())
                .unwrap_or_else(|| "-".to_string());
            table = table.row([label.clone(), rupees(*revenue), orders]);
        }
        auto_table(&mut canvas, y + TABLE_GAP, &table);
    }

    canvas
}

pub fn performance_report(
    data: &ReportData,
    year: i32,
    month: u32,
    identity: &RestaurantIdentity,
    generated_at: NaiveDateTime,
) -> GeneratedDocument {
    let canvas = build_performance_report(data, year, month, identity, generated_at);
    finish(&canvas, format!("Report_{}.pdf", period_key(year, month)))
}

// ---------------------------------------------------------------------------
// Invoice list
// ---------------------------------------------------------------------------

fn date_or(date: Option<NaiveDate>, fallback: &str) -> String {
    date.map(|d| d.format("%Y-%m-%d").to_string())
        .unwrap_or_else(|| fallback.to_string())
}

pub fn invoices_file_name(filter: &BillFilter) -> String {
    format!(
        "Invoices_{}_to_{}.pdf",
        date_or(filter.from, "start"),
        date_or(filter.to, "today")
    )
}

pub fn build_invoice_report(
    rows: &[BillRow],
    filter: &BillFilter,
    identity: &RestaurantIdentity,
    generated_at: NaiveDateTime,
) -> Canvas {
    let selected = filter.apply(rows);
    let mut canvas = Canvas::new(PageSize::A4);

    let mut filters = vec![(
        "Date range",
        format!("{} to {}", date_or(filter.from, "start"), date_or(filter.to, "today")),
    )];
    if let Some(method) = &filter.payment_method {
        filters.push(("Payment method", method.clone()));
    }
    if let Some(status) = filter.status {
        filters.push(("Status", status.label().to_string()));
    }
    let mut y = letterhead(&mut canvas, identity, "Invoice List", generated_at, &filters);

    let mut table = TableSpec::new(["Bill No", "Date", "Table", "Customer", "Method", "Status", "Amount"])
        .title(format!("Invoices ({})", selected.len()))
        .numeric(&[6]);
    for row in &selected {
        let date = row
            .date_time
            .map(|d| d.format("%d/%m/%Y %H:%M").to_string())
            .unwrap_or_else(|| "-".to_string());
        let customer = if row.customer.trim().is_empty() {
            "Guest".to_string()
        } else {
            row.customer.clone()
        };
        table = table.row([
            row.bill_no.clone(),
            date,
            row.table_label.clone(),
            customer,
            row.payment_method.clone(),
            row.payment_status.label().to_string(),
            rupees(row.total),
        ]);
    }
    y = auto_table(&mut canvas, y, &table);

    let sum_by = |status: Option<PaymentStatus>| -> f64 {
        selected
            .iter()
            .filter(|r| status.map_or(true, |s| r.payment_status == s))
            .map(|r| normalize_amount(r.total))
            .sum()
    };
    let summary = TableSpec::new(["Summary", "Amount"])
        .title("Summary")
        .numeric(&[1])
        .optional()
        .row(["Paid".to_string(), rupees(sum_by(Some(PaymentStatus::Paid)))])
        .row(["Pending".to_string(), rupees(sum_by(Some(PaymentStatus::Pending)))])
        .row(["Grand Total".to_string(), rupees(sum_by(None))]);
    auto_table(&mut canvas, y + TABLE_GAP, &summary);

    canvas
}

pub fn invoice_report(
    rows: &[BillRow],
    filter: &BillFilter,
    identity: &RestaurantIdentity,
    generated_at: NaiveDateTime,
) -> GeneratedDocument {
    let canvas = build_invoice_report(rows, filter, identity, generated_at);
    finish(&canvas, invoices_file_name(filter))
}

// ---------------------------------------------------------------------------
// Single bill invoice
// ---------------------------------------------------------------------------

const INVOICE_TABLE_START: f64 = 80.0;
const TOTALS_LABEL_X: f64 = 140.0;
const TOTALS_VALUE_X: f64 = 190.0;
const FOOTER_Y: f64 = 280.0;
const FOOTER_GREY: Rgb = Rgb(150, 150, 150);

/// `Invoice_BILL-012.pdf`
pub fn bill_invoice_file_name(bill: &Bill) -> String {
    format!("Invoice_{}.pdf", bill.bill_no)
}

/// A4 invoice for one freshly created bill: identity header, bill details,
/// an item grid and the totals block. The tax line appears only for a
/// positive rate and the discount line only for a positive discount.
pub fn build_bill_invoice(bill: &Bill, identity: &RestaurantIdentity) -> Canvas {
    let bill = bill.normalized();
    let mut canvas = Canvas::new(PageSize::A4);
    let center = PageSize::A4.width_mm / 2.0;

    canvas
        .color(BRAND)
        .font(Font::HelveticaBold, 22.0)
        .text_at(center, 20.0, &identity.name, Align::Center)
        .color(Rgb::GREY)
        .font(Font::Helvetica, 12.0)
        .text_at(center, 28.0, &identity.address, Align::Center)
        .text_at(center, 34.0, &format!("Phone: {}", identity.phone), Align::Center)
        .color(Rgb::LIGHT_GREY)
        .line_width(0.3)
        .line(10.0, 38.0, 200.0, 38.0);

    let date = bill
        .issued_at
        .map(|t| t.format("%d/%m/%Y %I:%M %p").to_string())
        .unwrap_or_else(|| "-".to_string());
    canvas
        .color(Rgb::BLACK)
        .font(Font::HelveticaBold, 14.0)
        .text(15.0, 50.0, "INVOICE")
        .font(Font::Helvetica, 10.0)
        .text(15.0, 60.0, &format!("Bill No: {}", bill.bill_no))
        .text(15.0, 66.0, &format!("Date: {date}"))
        .text(130.0, 60.0, &format!("Customer: {}", non_empty_or(&bill.customer, "Guest")))
        .text(130.0, 66.0, &format!("Table: {}", non_empty_or(&bill.table_label, "N/A")))
        .text(
            130.0,
            72.0,
            &format!("Payment: {}", non_empty_or(&bill.payment_method, "Cash")),
        );

    let mut items = TableSpec::new(["Item", "Price", "Qty", "Total"]).numeric(&[1, 2, 3]);
    for line in &bill.items {
        items = items.row([
            line.name.clone(),
            rupees(line.unit_price),
            line.quantity.to_string(),
            rupees(line.line_total()),
        ]);
    }
    let mut y = auto_table(&mut canvas, INVOICE_TABLE_START, &items) + 10.0;

    canvas.font(Font::Helvetica, 10.0);
    totals_line(&mut canvas, y, "Subtotal:", &rupees(bill.subtotal));
    let rate = bill.effective_tax_rate();
    if rate > 0.0 {
        totals_line(
            &mut canvas,
            y + 6.0,
            &format!("Tax ({}%):", percent_label(rate)),
            &rupees(bill.tax),
        );
    }
    if bill.discount > 0.0 {
        totals_line(
            &mut canvas,
            y + 12.0,
            "Discount:",
            &format!("-{}", rupees(bill.discount)),
        );
    }
    y += 20.0;
    canvas
        .font(Font::HelveticaBold, 14.0)
        .text(TOTALS_LABEL_X, y, "Total:")
        .color(BRAND)
        .text_at(TOTALS_VALUE_X, y, &rupees(bill.total), Align::Right);

    canvas
        .font(Font::Helvetica, 10.0)
        .color(FOOTER_GREY)
        .text_at(center, FOOTER_Y, "Thank you for dining with us!", Align::Center);
    canvas
}

pub fn bill_invoice(bill: &Bill, identity: &RestaurantIdentity) -> GeneratedDocument {
    let canvas = build_bill_invoice(bill, identity);
    finish(&canvas, bill_invoice_file_name(bill))
}

fn totals_line(canvas: &mut Canvas, y: f64, label: &str, value: &str) {
    canvas
        .text(TOTALS_LABEL_X, y, label)
        .text_at(TOTALS_VALUE_X, y, value, Align::Right);
}

fn non_empty_or<'a>(value: &'a str, fallback: &'a str) -> &'a str {
    let value = value.trim();
    if value.is_empty() {
        fallback
    } else {
        value
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::DrawOp;

    fn at(y: i32, m: u32, d: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap()
    }

    fn fills(canvas: &Canvas) -> Vec<Rgb> {
        canvas
            .ops()
            .iter()
            .filter_map(|op| match op {
                DrawOp::Rect { fill: Some(c), .. } => Some(*c),
                _ => None,
            })
            .collect()
    }

    fn spec(rows: usize) -> TableSpec {
        let mut t = TableSpec::new(["Name", "Amount"]).numeric(&[1]);
        for i in 0..rows {
            t = t.row([format!("Row {i}"), rupees(i as f64)]);
        }
        t
    }

    #[test]
    fn columns_fill_printable_width() {
        let widths = column_widths(&spec(3));
        assert_eq!(widths.len(), 2);
        assert!((widths.iter().sum::<f64>() - printable_width()).abs() < 1e-9);

        let wide = TableSpec::new(["A", "B"]).row(["x", "a much longer cell value"]);
        let w = column_widths(&wide);
        assert!(w[1] > w[0]);
    }

    #[test]
    fn table_tracks_final_position() {
        let mut canvas = Canvas::new(PageSize::A4);
        let end = auto_table(&mut canvas, 50.0, &spec(4));
        assert!((end - (50.0 + 5.0 * row_height())).abs() < 1e-9);

        // Header fill plus shading on every other body row.
        assert_eq!(fills(&canvas), vec![BRAND, ROW_SHADE, ROW_SHADE]);
        assert!(canvas.lines().iter().any(|l| l == "Name Amount"));
        assert!(canvas.lines().iter().any(|l| l == "Row 3 ₹3.00"));
    }

    #[test]
    fn start_past_threshold_falls_back_to_default() {
        let mut canvas = Canvas::new(PageSize::A4);
        let end = auto_table(&mut canvas, SAFE_START_THRESHOLD + 10.0, &spec(1));
        assert!((end - (DEFAULT_TABLE_START + 2.0 * row_height())).abs() < 1e-9);
        assert!(canvas.baseline_of("Row 0").unwrap() < SAFE_START_THRESHOLD);
    }

    #[test]
    fn optional_table_that_does_not_fit_is_skipped() {
        let mut canvas = Canvas::new(PageSize::A4);
        let table = spec(30).optional();
        assert!(200.0 + table.estimated_height() > PAGE_BOTTOM);
        assert_eq!(auto_table(&mut canvas, 200.0, &table), 200.0);
        assert!(canvas.ops().is_empty());

        // The same table is drawn when it is not optional, cut at the page bottom.
        let end = auto_table(&mut canvas, 200.0, &spec(30));
        assert!(end <= PAGE_BOTTOM);
        assert!(canvas.baseline_of("Row 0").is_some());
        assert!(canvas.baseline_of("Row 29").is_none());
        assert!(canvas.texts().any(|t| t.starts_with("... ") && t.ends_with("more rows not shown")));
    }

    #[test]
    fn optional_table_past_threshold_is_skipped_not_moved() {
        let mut canvas = Canvas::new(PageSize::A4);
        let start = SAFE_START_THRESHOLD + 5.0;
        assert_eq!(auto_table(&mut canvas, start, &spec(1).optional()), start);
        assert!(canvas.ops().is_empty());
    }

    fn lowest_point(canvas: &Canvas) -> f64 {
        canvas
            .ops()
            .iter()
            .map(|op| match op {
                DrawOp::Text { y, .. } => *y,
                DrawOp::Line { y1, y2, .. } => y1.max(*y2),
                DrawOp::Rect { y, h, .. } => y + h,
            })
            .fold(0.0, f64::max)
    }

    #[test]
    fn long_invoice_list_stays_on_the_page() {
        let rows: Vec<BillRow> = (1..=40)
            .map(|i| bill(i, 1 + (i as u32 % 28), 100.0, PaymentStatus::Paid))
            .collect();
        let canvas = build_invoice_report(&rows, &BillFilter::default(), &RestaurantIdentity::default(), at(2024, 2, 1));

        assert!(lowest_point(&canvas) <= PAGE_BOTTOM);
        assert!(canvas.lines().iter().any(|l| l == "Invoices (40)"));
        assert!(canvas.texts().any(|t| t.ends_with("more rows not shown")));

        let last_invoice_row = canvas
            .ops()
            .iter()
            .filter_map(|op| match op {
                DrawOp::Text { y, text, .. } if text.starts_with("BILL-") => Some(*y),
                _ => None,
            })
            .fold(0.0, f64::max);
        if let Some(summary) = canvas.baseline_of("Summary") {
            assert!(summary > last_invoice_row);
        }
        assert!(canvas.baseline_of("Grand Total").is_none());
    }

    #[test]
    fn over_long_cells_are_truncated() {
        let long = "x".repeat(400);
        let table = TableSpec::new(["Note", "Value"]).row([long.as_str(), "1"]);
        let mut canvas = Canvas::new(PageSize::A4);
        auto_table(&mut canvas, 40.0, &table);
        let drawn = canvas.texts().find(|t| t.starts_with("xxx")).unwrap();
        assert!(drawn.ends_with("..."));
        assert!(drawn.len() < long.len());
    }

    #[test]
    fn category_share_is_rounded() {
        let mut data = ReportData::default();
        data.sales_by_category.insert("Starters".into(), 1.0);
        data.sales_by_category.insert("Main Course".into(), 2.0);
        data.sales_by_category.insert("Drinks".into(), f64::NAN);
        let shares = category_shares(&data);
        assert_eq!(shares[0], ("Main Course".to_string(), 2.0, 67));
        assert_eq!(shares[1], ("Starters".to_string(), 1.0, 33));
        assert_eq!(shares[2], ("Drinks".to_string(), 0.0, 0));
    }

    #[test]
    fn performance_report_layout() {
        let mut data = ReportData {
            total_revenue: 125000.0,
            total_revenue_growth: 12.5,
            total_customers: 640,
            top_staff_name: Some("Ravi".into()),
            top_staff_sales: 32000.0,
            ..Default::default()
        };
        data.sales_by_category.insert("Starters".into(), 40000.0);
        data.revenue_trend.insert("Week 1".into(), 30000.0);
        data.orders_trend.insert("Week 1".into(), 210);

        let canvas = build_performance_report(&data, 2024, 3, &RestaurantIdentity::default(), at(2024, 4, 1));
        let lines = canvas.lines();
        assert_eq!(lines[0], "RISHITHA RESTAURANT");
        assert!(lines.iter().any(|l| l == "Performance Report Generated: 01/04/2024 12:00"));
        assert!(lines.iter().any(|l| l == "Period: March 2024"));
        assert!(lines.iter().any(|l| l == "Total Revenue ₹125000.00"));
        assert!(lines.iter().any(|l| l == "Revenue Growth +12.5%"));
        assert!(lines.iter().any(|l| l == "Top Staff Ravi (₹32000.00)"));
        assert!(lines.iter().any(|l| l == "Starters ₹40000.00 100%"));
        assert!(lines.iter().any(|l| l == "Week 1 ₹30000.00 210"));

        let doc = performance_report(&data, 2024, 3, &RestaurantIdentity::default(), at(2024, 4, 1));
        assert_eq!(doc.file_name, "Report_2024-03.pdf");
        assert!(doc.bytes.starts_with(b"%PDF-1.4"));
    }

    fn bill(id: i64, day: u32, total: f64, status: PaymentStatus) -> BillRow {
        BillRow {
            order_id: id,
            bill_no: crate::billing::bill_no(id),
            customer: String::new(),
            table_label: "Table 02".into(),
            date_time: Some(at(2024, 1, day)),
            items: 2,
            subtotal: total,
            tax: 0.0,
            discount: 0.0,
            total,
            payment_method: "Cash".into(),
            payment_status: status,
        }
    }

    #[test]
    fn invoice_report_applies_filters() {
        let rows = vec![
            bill(1, 5, 100.0, PaymentStatus::Paid),
            bill(2, 10, 250.0, PaymentStatus::Pending),
            bill(3, 20, 400.0, PaymentStatus::Paid),
        ];
        let filter = BillFilter {
            from: NaiveDate::from_ymd_opt(2024, 1, 1),
            to: NaiveDate::from_ymd_opt(2024, 1, 15),
            ..Default::default()
        };
        let canvas = build_invoice_report(&rows, &filter, &RestaurantIdentity::default(), at(2024, 1, 31));
        let lines = canvas.lines();
        assert!(lines.iter().any(|l| l == "Date range: 2024-01-01 to 2024-01-15"));
        assert!(lines.iter().any(|l| l == "Invoices (2)"));
        assert!(lines.iter().any(|l| l.starts_with("BILL-001") && l.ends_with("Guest Cash Paid ₹100.00")));
        assert!(!lines.iter().any(|l| l.starts_with("BILL-003")));
        assert!(lines.iter().any(|l| l == "Paid ₹100.00"));
        assert!(lines.iter().any(|l| l == "Pending ₹250.00"));
        assert!(lines.iter().any(|l| l == "Grand Total ₹350.00"));

        assert_eq!(invoices_file_name(&filter), "Invoices_2024-01-01_to_2024-01-15.pdf");
        assert_eq!(invoices_file_name(&BillFilter::default()), "Invoices_start_to_today.pdf");
    }

    fn counter_bill(tax_rate: f64, discount: f64) -> Bill {
        let items = vec![crate::billing::BillLine {
            name: "Masala Dosa".into(),
            unit_price: 120.0,
            quantity: 2,
        }];
        let totals = crate::billing::BillTotals::compute(240.0, tax_rate, discount);
        Bill {
            bill_no: "BILL-012".into(),
            table_label: "Table 04".into(),
            customer: String::new(),
            payment_method: "Card".into(),
            issued_at: Some(at(2024, 1, 5)),
            items,
            subtotal: totals.subtotal,
            tax: totals.tax,
            tax_rate: Some(totals.tax_rate),
            discount: totals.discount,
            total: totals.total,
        }
    }

    #[test]
    fn bill_invoice_layout() {
        let canvas = build_bill_invoice(&counter_bill(5.0, 12.0), &RestaurantIdentity::default());
        let lines = canvas.lines();
        assert_eq!(lines[0], "RISHITHA RESTAURANT");
        assert!(lines.iter().any(|l| l == "INVOICE"));
        assert!(lines.iter().any(|l| l == "Bill No: BILL-012 Customer: Guest"));
        assert!(lines.iter().any(|l| l == "Date: 05/01/2024 12:00 PM Table: Table 04"));
        assert!(lines.iter().any(|l| l == "Payment: Card"));
        assert!(lines.iter().any(|l| l == "Item Price Qty Total"));
        assert!(lines.iter().any(|l| l == "Masala Dosa ₹120.00 2 ₹240.00"));
        assert!(lines.iter().any(|l| l == "Subtotal: ₹240.00"));
        assert!(lines.iter().any(|l| l == "Tax (5%): ₹12.00"));
        assert!(lines.iter().any(|l| l == "Discount: -₹12.00"));
        assert!(lines.iter().any(|l| l == "Total: ₹240.00"));
        assert_eq!(lines.last().map(String::as_str), Some("Thank you for dining with us!"));
        assert_eq!(fills(&canvas)[0], BRAND);
    }

    #[test]
    fn bill_invoice_omits_zero_tax_and_discount() {
        let bill = counter_bill(0.0, 0.0);
        let canvas = build_bill_invoice(&bill, &RestaurantIdentity::default());
        assert!(!canvas.texts().any(|t| t.starts_with("Tax (")));
        assert!(!canvas.texts().any(|t| t == "Discount:"));
        assert!(canvas.lines().iter().any(|l| l == "Total: ₹240.00"));

        let doc = bill_invoice(&bill, &RestaurantIdentity::default());
        assert_eq!(doc.file_name, "Invoice_BILL-012.pdf");
        assert_eq!(bill_invoice_file_name(&bill), doc.file_name);
        assert!(doc.bytes.starts_with(b"%PDF-1.4"));
    }
}
