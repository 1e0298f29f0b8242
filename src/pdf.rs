//! Minimal PDF 1.4 writer for a single-page [`Canvas`].
//!
//! Only the four standard Type 1 fonts are referenced (no embedding), so
//! text is limited to the WinAnsi character set. `₹` is written as `Rs.`;
//! any other character outside WinAnsi becomes `?`. Both substitutions are
//! reported as warnings.

use std::collections::BTreeSet;

use crate::layout::{Canvas, DrawOp, Font, Rgb};

const PT_PER_MM: f64 = 72.0 / 25.4;

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct RenderWarning {
    pub code: String,
    pub message: String,
}

#[derive(Debug, Clone)]
pub struct PdfRender {
    pub bytes: Vec<u8>,
    pub warnings: Vec<RenderWarning>,
}

/// Serialize `canvas` to PDF bytes.
pub fn render(canvas: &Canvas) -> PdfRender {
    let size = canvas.size();
    let mut content = ContentBuilder::new(size.height_mm);
    for op in canvas.ops() {
        match op {
            DrawOp::Text {
                x,
                y,
                text,
                font,
                size,
                color,
            } => {
                content.fill_color(*color).text(*x, *y, *font, *size, text);
            }
            DrawOp::Line {
                x1,
                y1,
                x2,
                y2,
                width,
                color,
                dashed,
            } => {
                content
                    .stroke_color(*color)
                    .line_width(*width)
                    .dash(*dashed)
                    .line(*x1, *y1, *x2, *y2);
            }
            DrawOp::Rect {
                x,
                y,
                w,
                h,
                fill,
                stroke,
            } => {
                if let Some(c) = fill {
                    content.fill_color(*c);
                }
                if let Some(c) = stroke {
                    content.stroke_color(*c).dash(false);
                }
                content.rect(*x, *y, *w, *h, fill.is_some(), stroke.is_some());
            }
        }
    }

    let (stream, warnings) = content.finish();
    PdfRender {
        bytes: assemble(size.width_mm * PT_PER_MM, size.height_mm * PT_PER_MM, &stream),
        warnings,
    }
}

// ---------------------------------------------------------------------------
// Content stream
// ---------------------------------------------------------------------------

/// Builder for a page content stream. Takes top-left millimetre
/// coordinates and emits bottom-left point coordinates.
struct ContentBuilder {
    buf: Vec<u8>,
    page_height_mm: f64,
    substitutions: BTreeSet<char>,
}

impl ContentBuilder {
    fn new(page_height_mm: f64) -> Self {
        Self {
            buf: Vec::with_capacity(4096),
            page_height_mm,
            substitutions: BTreeSet::new(),
        }
    }

    fn op(&mut self, s: &str) -> &mut Self {
        self.buf.extend_from_slice(s.as_bytes());
        self.buf.push(b'\n');
        self
    }

    fn x(v: f64) -> String {
        num(v * PT_PER_MM)
    }

    fn y(&self, v: f64) -> String {
        num((self.page_height_mm - v) * PT_PER_MM)
    }

    fn fill_color(&mut self, c: Rgb) -> &mut Self {
        let s = format!("{} rg", rgb(c));
        self.op(&s)
    }

    fn stroke_color(&mut self, c: Rgb) -> &mut Self {
        let s = format!("{} RG", rgb(c));
        self.op(&s)
    }

    fn line_width(&mut self, width_mm: f64) -> &mut Self {
        let s = format!("{} w", num(width_mm * PT_PER_MM));
        self.op(&s)
    }

    fn dash(&mut self, on: bool) -> &mut Self {
        if on {
            self.op("[3 2] 0 d")
        } else {
            self.op("[] 0 d")
        }
    }

    fn line(&mut self, x1: f64, y1: f64, x2: f64, y2: f64) -> &mut Self {
        let s = format!(
            "{} {} m {} {} l S",
            Self::x(x1),
            self.y(y1),
            Self::x(x2),
            self.y(y2)
        );
        self.op(&s)
    }

    fn rect(&mut self, x: f64, y: f64, w: f64, h: f64, fill: bool, stroke: bool) -> &mut Self {
        let paint = match (fill, stroke) {
            (true, true) => "B",
            (true, false) => "f",
            (false, true) => "S",
            (false, false) => "n",
        };
        let s = format!(
            "{} {} {} {} re {paint}",
            Self::x(x),
            self.y(y + h),
            num(w * PT_PER_MM),
            num(h * PT_PER_MM)
        );
        self.op(&s)
    }

    fn text(&mut self, x: f64, y: f64, font: Font, size_pt: f64, text: &str) -> &mut Self {
        let head = format!(
            "BT /{} {} Tf {} {} Td (",
            font_resource(font),
            num(size_pt),
            Self::x(x),
            self.y(y)
        );
        self.buf.extend_from_slice(head.as_bytes());
        let encoded = encode_win_ansi(text, &mut self.substitutions);
        for b in encoded {
            if matches!(b, b'(' | b')' | b'\\') {
                self.buf.push(b'\\');
            }
            self.buf.push(b);
        }
        self.op(") Tj ET")
    }

    fn finish(self) -> (Vec<u8>, Vec<RenderWarning>) {
        let warnings = self
            .substitutions
            .into_iter()
            .map(|ch| {
                if ch == '₹' {
                    RenderWarning {
                        code: "rupee_sign_substituted".to_string(),
                        message: "₹ is not in the standard PDF fonts; written as Rs.".to_string(),
                    }
                } else {
                    RenderWarning {
                        code: "unsupported_character".to_string(),
                        message: format!("U+{:04X} ({ch}) is not in WinAnsi; written as ?", ch as u32),
                    }
                }
            })
            .collect();
        (self.buf, warnings)
    }
}

fn font_resource(font: Font) -> &'static str {
    match font {
        Font::Helvetica => "F1",
        Font::HelveticaBold => "F2",
        Font::Courier => "F3",
        Font::CourierBold => "F4",
    }
}

/// Compact decimal: at most two fractional digits, no trailing zeros.
fn num(v: f64) -> String {
    if !v.is_finite() {
        return "0".to_string();
    }
    let s = format!("{v:.2}");
    let s = s.trim_end_matches('0').trim_end_matches('.');
    if s == "-0" || s.is_empty() {
        "0".to_string()
    } else {
        s.to_string()
    }
}

fn rgb(c: Rgb) -> String {
    format!(
        "{} {} {}",
        num(f64::from(c.0) / 255.0),
        num(f64::from(c.1) / 255.0),
        num(f64::from(c.2) / 255.0)
    )
}

/// Encode text as WinAnsi (CP1252). Characters with no mapping are
/// substituted and recorded in `substituted`.
pub fn encode_win_ansi(text: &str, substituted: &mut BTreeSet<char>) -> Vec<u8> {
    let mut out = Vec::with_capacity(text.len());
    for ch in text.chars() {
        let code = ch as u32;
        match ch {
            '\u{20}'..='\u{7E}' => out.push(code as u8),
            '\u{A0}'..='\u{FF}' => out.push(code as u8),
            '₹' => {
                out.extend_from_slice(b"Rs.");
                substituted.insert(ch);
            }
            _ => match cp1252_high(ch) {
                Some(b) => out.push(b),
                None => {
                    out.push(b'?');
                    substituted.insert(ch);
                }
            },
        }
    }
    out
}

/// The CP1252 0x80..=0x9F block.
fn cp1252_high(ch: char) -> Option<u8> {
    Some(match ch {
        '€' => 0x80,
        '‚' => 0x82,
        'ƒ' => 0x83,
        '„' => 0x84,
        '…' => 0x85,
        '†' => 0x86,
        '‡' => 0x87,
        'ˆ' => 0x88,
        '‰' => 0x89,
        'Š' => 0x8A,
        '‹' => 0x8B,
        'Œ' => 0x8C,
        'Ž' => 0x8E,
        '\u{2018}' => 0x91,
        '\u{2019}' => 0x92,
        '\u{201C}' => 0x93,
        '\u{201D}' => 0x94,
        '•' => 0x95,
        '\u{2013}' => 0x96,
        '\u{2014}' => 0x97,
        '˜' => 0x98,
        '™' => 0x99,
        'š' => 0x9A,
        '›' => 0x9B,
        'œ' => 0x9C,
        'ž' => 0x9E,
        'Ÿ' => 0x9F,
        _ => return None,
    })
}

// ---------------------------------------------------------------------------
// File structure
// ---------------------------------------------------------------------------

fn assemble(width_pt: f64, height_pt: f64, content: &[u8]) -> Vec<u8> {
    let mut out: Vec<u8> = Vec::with_capacity(content.len() + 2048);
    let mut offsets: Vec<usize> = Vec::new();

    out.extend_from_slice(b"%PDF-1.4\n%\xE2\xE3\xCF\xD3\n");

    let mut object = |out: &mut Vec<u8>, body: &[u8]| {
        offsets.push(out.len());
        let n = offsets.len();
        out.extend_from_slice(format!("{n} 0 obj\n").as_bytes());
        out.extend_from_slice(body);
        out.extend_from_slice(b"\nendobj\n");
    };

    // 1: catalog, 2: page tree, 3: page, 4: content, 5..=8: fonts, 9: info
    object(&mut out, b"<< /Type /Catalog /Pages 2 0 R >>");
    object(&mut out, b"<< /Type /Pages /Kids [3 0 R] /Count 1 >>");
    let page = format!(
        "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 {} {}] \
         /Resources << /Font << /F1 5 0 R /F2 6 0 R /F3 7 0 R /F4 8 0 R >> >> \
         /Contents 4 0 R >>",
        num(width_pt),
        num(height_pt)
    );
    object(&mut out, page.as_bytes());

    let mut stream = format!("<< /Length {} >>\nstream\n", content.len()).into_bytes();
    stream.extend_from_slice(content);
    stream.extend_from_slice(b"endstream");
    object(&mut out, &stream);

    for font in Font::ALL {
        let dict = format!(
            "<< /Type /Font /Subtype /Type1 /BaseFont /{} /Encoding /WinAnsiEncoding >>",
            font.base_font()
        );
        object(&mut out, dict.as_bytes());
    }
    let info = format!(
        "<< /Producer (dining-console {}) >>",
        env!("CARGO_PKG_VERSION")
    );
    object(&mut out, info.as_bytes());

    let xref_at = out.len();
    let count = offsets.len() + 1;
    out.extend_from_slice(format!("xref\n0 {count}\n0000000000 65535 f \n").as_bytes());
    for off in &offsets {
        out.extend_from_slice(format!("{off:010} 00000 n \n").as_bytes());
    }
    out.extend_from_slice(
        format!("trailer\n<< /Size {count} /Root 1 0 R /Info {} 0 R >>\nstartxref\n{xref_at}\n%%EOF\n", count - 1)
            .as_bytes(),
    );
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::{Align, PageSize};

    fn contains(haystack: &[u8], needle: &[u8]) -> bool {
        haystack.windows(needle.len()).any(|w| w == needle)
    }

    #[test]
    fn writes_a_complete_file() {
        let mut canvas = Canvas::new(PageSize::receipt());
        canvas
            .font(Font::CourierBold, 8.0)
            .text_at(40.0, 10.0, "PAYMENT SLIP", Align::Center)
            .dashed_line(4.0, 12.0, 76.0, 12.0)
            .fill_rect(4.0, 14.0, 72.0, 5.0, Rgb::LIGHT_GREY);
        let out = render(&canvas);

        assert!(out.bytes.starts_with(b"%PDF-1.4"));
        assert!(out.bytes.ends_with(b"%%EOF\n"));
        assert!(contains(&out.bytes, b"(PAYMENT SLIP) Tj"));
        assert!(contains(&out.bytes, b"/BaseFont /Courier-Bold"));
        assert!(contains(&out.bytes, b"/MediaBox [0 0 226.77 566.93]"));
        assert!(contains(&out.bytes, b"[3 2] 0 d"));
        assert!(out.warnings.is_empty());
    }

    #[test]
    fn xref_offsets_point_at_objects() {
        let canvas = Canvas::new(PageSize::A4);
        let bytes = render(&canvas).bytes;
        let xref = bytes.windows(5).position(|w| w == b"xref\n").unwrap();
        let tail = std::str::from_utf8(&bytes[xref..]).unwrap();
        let offsets: Vec<usize> = tail
            .lines()
            .skip(3)
            .take_while(|l| l.ends_with(" n "))
            .map(|l| l[..10].parse().unwrap())
            .collect();
        assert_eq!(offsets.len(), 9);
        for (i, off) in offsets.iter().enumerate() {
            assert!(bytes[*off..].starts_with(format!("{} 0 obj", i + 1).as_bytes()));
        }
    }

    #[test]
    fn rupee_and_unknown_characters_are_substituted_with_warnings() {
        let mut seen = BTreeSet::new();
        assert_eq!(encode_win_ansi("₹462.00", &mut seen), b"Rs.462.00".to_vec());
        assert_eq!(encode_win_ansi("Café €5", &mut seen), b"Caf\xE9 \x805".to_vec());
        assert_eq!(encode_win_ansi("寿司", &mut seen), b"??".to_vec());

        let mut canvas = Canvas::new(PageSize::receipt());
        canvas.text(4.0, 10.0, "TOTAL: ₹462.00 寿");
        let out = render(&canvas);
        assert!(contains(&out.bytes, b"(TOTAL: Rs.462.00 ?) Tj"));
        let codes: Vec<_> = out.warnings.iter().map(|w| w.code.as_str()).collect();
        assert_eq!(codes.len(), 2);
        assert!(codes.contains(&"rupee_sign_substituted"));
        assert!(codes.contains(&"unsupported_character"));
    }

    #[test]
    fn parentheses_are_escaped() {
        let mut canvas = Canvas::new(PageSize::receipt());
        canvas.text(4.0, 10.0, "CGST (2.5%):");
        let out = render(&canvas);
        assert!(contains(&out.bytes, br"(CGST \(2.5%\):) Tj"));
    }

    #[test]
    fn numbers_are_compact() {
        assert_eq!(num(12.0), "12");
        assert_eq!(num(2.50), "2.5");
        assert_eq!(num(-0.001), "0");
        assert_eq!(num(f64::NAN), "0");
    }
}
