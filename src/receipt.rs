//! 80 mm payment slip.
//!
//! The layout is a straight top-to-bottom pass over a [`Cursor`]. Every
//! block measures its own height before the cursor moves, so an item whose
//! name wraps onto three lines pushes the next row down by three line
//! heights. There is no page-break handling: a long bill simply runs past
//! the nominal page bottom.

use tracing::debug;

use crate::billing::Bill;
use crate::document::{percent_label, rupees, GeneratedDocument, RestaurantIdentity};
use crate::layout::{wrap_text, Align, Canvas, Cursor, Font, PageSize};
use crate::pdf;

const LEFT: f64 = 4.0;
const RIGHT: f64 = 76.0;
const CENTER: f64 = 40.0;

const BODY: Font = Font::Helvetica;
const BODY_SIZE: f64 = 8.0;

/// Width available to an item name before it wraps.
pub const ITEM_COLUMN_WIDTH: f64 = 38.0;
const QTY_X: f64 = 50.0;

const BLOCK_GAP: f64 = 2.0;

pub fn receipt_file_name(bill: &Bill) -> String {
    format!("Receipt_{}.pdf", bill.bill_no)
}

/// Baseline-to-baseline distance for body text.
pub fn body_line_height() -> f64 {
    Font::line_height(BODY_SIZE)
}

pub fn render_receipt(bill: &Bill, identity: &RestaurantIdentity) -> GeneratedDocument {
    let canvas = build_receipt(bill, identity);
    let out = pdf::render(&canvas);
    debug!(
        bill_no = %bill.bill_no,
        items = bill.items.len(),
        warnings = out.warnings.len(),
        "receipt rendered"
    );
    GeneratedDocument {
        file_name: receipt_file_name(bill),
        bytes: out.bytes,
        warnings: out.warnings,
    }
}

pub fn build_receipt(bill: &Bill, identity: &RestaurantIdentity) -> Canvas {
    let bill = bill.normalized();
    let mut canvas = Canvas::new(PageSize::receipt());
    let mut cursor = Cursor::at(8.0);

    identity_block(&mut canvas, &mut cursor, identity);
    separator(&mut canvas, &mut cursor);

    canvas
        .font(Font::HelveticaBold, 10.0)
        .text_at(CENTER, cursor.y(), "PAYMENT SLIP", Align::Center);
    cursor.advance(Font::line_height(10.0));
    cursor.advance(BLOCK_GAP / 2.0);

    metadata_block(&mut canvas, &mut cursor, &bill);
    separator(&mut canvas, &mut cursor);

    item_table(&mut canvas, &mut cursor, &bill);
    separator(&mut canvas, &mut cursor);

    totals_block(&mut canvas, &mut cursor, &bill);

    cursor.advance(BLOCK_GAP * 2.0);
    canvas
        .font(Font::Helvetica, BODY_SIZE)
        .text_at(CENTER, cursor.y(), "Thank you! Visit again.", Align::Center);

    canvas
}

fn identity_block(canvas: &mut Canvas, cursor: &mut Cursor, identity: &RestaurantIdentity) {
    let width = RIGHT - LEFT;
    for (font, size, text) in [
        (Font::HelveticaBold, 12.0, identity.name.as_str()),
        (Font::Helvetica, BODY_SIZE, identity.address.as_str()),
        (Font::Helvetica, BODY_SIZE, identity.phone.as_str()),
    ] {
        canvas.font(font, size);
        let lines = wrap_text(text, width, font, size);
        for line in &lines {
            canvas.text_at(CENTER, cursor.y(), line, Align::Center);
            cursor.advance(Font::line_height(size));
        }
    }
}

fn separator(canvas: &mut Canvas, cursor: &mut Cursor) {
    let y = cursor.y() - body_line_height() / 2.0;
    canvas.line_width(0.2).dashed_line(LEFT, y, RIGHT, y);
    cursor.advance(BLOCK_GAP + body_line_height() / 2.0);
}

fn metadata_block(canvas: &mut Canvas, cursor: &mut Cursor, bill: &Bill) {
    let (date, time) = match bill.issued_at {
        Some(at) => (
            at.format("%d/%m/%Y").to_string(),
            at.format("%I:%M %p").to_string(),
        ),
        None => ("-".to_string(), "-".to_string()),
    };
    canvas.font(BODY, BODY_SIZE);
    for (label, value) in [
        ("Bill No:", bill.bill_no.as_str()),
        ("Date:", date.as_str()),
        ("Time:", time.as_str()),
        ("Table:", bill.table_label.as_str()),
        ("Customer:", bill.customer.as_str()),
    ] {
        canvas
            .text(LEFT, cursor.y(), label)
            .text_at(RIGHT, cursor.y(), value, Align::Right);
        cursor.advance(body_line_height());
    }
}

fn item_table(canvas: &mut Canvas, cursor: &mut Cursor, bill: &Bill) {
    let lh = body_line_height();
    canvas
        .font(BODY.bold(), BODY_SIZE)
        .text(LEFT, cursor.y(), "Item")
        .text_at(QTY_X, cursor.y(), "Qty", Align::Center)
        .text_at(RIGHT, cursor.y(), "Amount", Align::Right);
    cursor.advance(lh);

    canvas.font(BODY, BODY_SIZE);
    for item in &bill.items {
        let lines = wrap_text(&item.name, ITEM_COLUMN_WIDTH, BODY, BODY_SIZE);
        let top = cursor.y();
        for (i, line) in lines.iter().enumerate() {
            canvas.text(LEFT, top + i as f64 * lh, line);
        }
        canvas
            .text_at(QTY_X, top, &item.quantity.to_string(), Align::Center)
            .text_at(RIGHT, top, &rupees(item.line_total()), Align::Right);
        cursor.advance(lines.len() as f64 * lh);
    }
}

fn totals_block(canvas: &mut Canvas, cursor: &mut Cursor, bill: &Bill) {
    let lh = body_line_height();
    let half_rate = percent_label(bill.effective_tax_rate() / 2.0);

    let mut rows = vec![
        ("Subtotal:".to_string(), rupees(bill.subtotal)),
        (format!("CGST ({half_rate}%):"), rupees(bill.cgst())),
        (format!("SGST ({half_rate}%):"), rupees(bill.sgst())),
    ];
    if bill.discount > 0.0 {
        rows.push(("Discount:".to_string(), format!("-{}", rupees(bill.discount))));
    }

    canvas.font(BODY, BODY_SIZE);
    for (label, value) in &rows {
        canvas
            .text(LEFT, cursor.y(), label)
            .text_at(RIGHT, cursor.y(), value, Align::Right);
        cursor.advance(lh);
    }

    cursor.advance(BLOCK_GAP / 2.0);
    let total = rupees(bill.total);
    canvas
        .font(Font::HelveticaBold, 10.0)
        .text(LEFT, cursor.y(), "TOTAL:")
        .text_at(RIGHT, cursor.y(), &total, Align::Right);
    cursor.advance(Font::line_height(10.0));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::billing::BillLine;

    fn line(name: &str, price: f64, qty: i64) -> BillLine {
        BillLine {
            name: name.to_string(),
            unit_price: price,
            quantity: qty,
        }
    }

    fn bill_007() -> Bill {
        Bill {
            bill_no: "BILL-007".into(),
            table_label: "Table 05".into(),
            customer: "Guest".into(),
            payment_method: "Cash".into(),
            issued_at: None,
            items: vec![line("Paneer Tikka", 220.0, 2)],
            subtotal: 440.0,
            tax: 22.0,
            tax_rate: None,
            discount: 0.0,
            total: 462.0,
        }
    }

    #[test]
    fn payment_slip_totals_block() {
        let canvas = build_receipt(&bill_007(), &RestaurantIdentity::default());
        let lines = canvas.lines();

        for expected in [
            "Subtotal: ₹440.00",
            "CGST (2.5%): ₹11.00",
            "SGST (2.5%): ₹11.00",
            "TOTAL: ₹462.00",
        ] {
            assert!(lines.iter().any(|l| l == expected), "missing {expected:?} in {lines:#?}");
        }
        assert!(!lines.iter().any(|l| l.starts_with("Discount")));

        let first = |s: &str| lines.iter().position(|l| l == s).unwrap();
        assert!(first("RISHITHA RESTAURANT") < first("PAYMENT SLIP"));
        assert!(first("PAYMENT SLIP") < first("Bill No: BILL-007"));
        assert!(first("Table: Table 05") < first("Item Qty Amount"));
        assert!(first("Subtotal: ₹440.00") < first("TOTAL: ₹462.00"));
        assert_eq!(lines.last().map(String::as_str), Some("Thank you! Visit again."));
    }

    #[test]
    fn discount_line_only_when_positive() {
        let mut bill = bill_007();
        bill.discount = 12.5;
        bill.total = 449.5;
        let lines = build_receipt(&bill, &RestaurantIdentity::default()).lines();
        assert!(lines.iter().any(|l| l == "Discount: -₹12.50"));
        assert!(lines.iter().any(|l| l == "TOTAL: ₹449.50"));

        bill.discount = -3.0;
        let lines = build_receipt(&bill, &RestaurantIdentity::default()).lines();
        assert!(!lines.iter().any(|l| l.starts_with("Discount")));
    }

    #[test]
    fn wrapped_names_advance_by_their_line_count() {
        let long = "Hyderabadi Chicken Dum Biryani with Mirchi Ka Salan and Raita";
        let mut bill = bill_007();
        bill.items = vec![
            line("Tea", 20.0, 1),
            line(long, 360.0, 1),
            line("Lassi", 60.0, 1),
        ];
        let canvas = build_receipt(&bill, &RestaurantIdentity::default());
        let lh = body_line_height();

        let wrapped = wrap_text(long, ITEM_COLUMN_WIDTH, BODY, BODY_SIZE);
        assert!(wrapped.len() >= 2);

        let tea = canvas.baseline_of("₹20.00").unwrap();
        let biryani = canvas.baseline_of("₹360.00").unwrap();
        let lassi = canvas.baseline_of("₹60.00").unwrap();
        assert!((biryani - tea - lh).abs() < 1e-9);
        assert!((lassi - biryani - wrapped.len() as f64 * lh).abs() < 1e-9);

        // Continuation lines sit under the first one.
        let last = canvas.baseline_of(wrapped.last().unwrap()).unwrap();
        assert!((last - biryani - (wrapped.len() - 1) as f64 * lh).abs() < 1e-9);
    }

    #[test]
    fn explicit_rate_and_missing_values() {
        let mut bill = bill_007();
        bill.tax_rate = Some(18.0);
        bill.tax = 79.2;
        bill.total = f64::NAN;
        let lines = build_receipt(&bill, &RestaurantIdentity::default()).lines();
        assert!(lines.iter().any(|l| l == "CGST (9%): ₹39.60"));
        assert!(lines.iter().any(|l| l == "TOTAL: ₹0.00"));

        bill.subtotal = 0.0;
        bill.tax = 0.0;
        bill.tax_rate = None;
        let lines = build_receipt(&bill, &RestaurantIdentity::default()).lines();
        assert!(lines.iter().any(|l| l == "CGST (0%): ₹0.00"));
    }

    #[test]
    fn rendered_file_is_named_after_the_bill() {
        let doc = render_receipt(&bill_007(), &RestaurantIdentity::default());
        assert_eq!(doc.file_name, "Receipt_BILL-007.pdf");
        assert!(doc.bytes.starts_with(b"%PDF-1.4"));
        assert!(doc.warnings.iter().any(|w| w.code == "rupee_sign_substituted"));
    }
}
