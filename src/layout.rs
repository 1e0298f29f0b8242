//! Page layout primitives shared by the receipt and report builders.
//!
//! A [`Canvas`] is a single page plus an ordered display list. Builders
//! draw onto it through a chained `&mut Self` API and keep their vertical
//! position in a [`Cursor`]. Positions are millimetres from the top-left
//! corner; font sizes are points. Text `y` is the baseline.
//!
//! ```rust,ignore
//! let mut canvas = Canvas::new(PageSize::receipt());
//! canvas
//!     .font(Font::HelveticaBold, 14.0)
//!     .text_at(40.0, 12.0, "RISHITHA RESTAURANT", Align::Center)
//!     .font(Font::Courier, 8.0)
//!     .dashed_line(4.0, 16.0, 76.0, 16.0);
//! ```

const MM_PER_PT: f64 = 25.4 / 72.0;

/// Baselines closer than this are treated as the same visual line.
const SAME_LINE_EPSILON: f64 = 0.01;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageSize {
    pub width_mm: f64,
    pub height_mm: f64,
}

impl PageSize {
    pub const A4: PageSize = PageSize {
        width_mm: 210.0,
        height_mm: 297.0,
    };

    /// 80 mm thermal roll with a nominal 200 mm page.
    pub fn receipt() -> Self {
        PageSize {
            width_mm: 80.0,
            height_mm: 200.0,
        }
    }
}

/// The four standard Type 1 faces the PDF writer embeds by name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Font {
    Helvetica,
    HelveticaBold,
    Courier,
    CourierBold,
}

impl Font {
    pub const ALL: [Font; 4] = [
        Font::Helvetica,
        Font::HelveticaBold,
        Font::Courier,
        Font::CourierBold,
    ];

    pub fn base_font(self) -> &'static str {
        match self {
            Font::Helvetica => "Helvetica",
            Font::HelveticaBold => "Helvetica-Bold",
            Font::Courier => "Courier",
            Font::CourierBold => "Courier-Bold",
        }
    }

    pub fn is_bold(self) -> bool {
        matches!(self, Font::HelveticaBold | Font::CourierBold)
    }

    pub fn bold(self) -> Font {
        match self {
            Font::Helvetica | Font::HelveticaBold => Font::HelveticaBold,
            Font::Courier | Font::CourierBold => Font::CourierBold,
        }
    }

    /// Advance width of one character in 1/1000 em.
    pub fn glyph_units(self, ch: char) -> u32 {
        match self {
            Font::Courier | Font::CourierBold => {
                // Drawn as "Rs." by the PDF writer.
                if ch == '₹' {
                    1800
                } else {
                    600
                }
            }
            Font::Helvetica => helvetica_units(ch, &HELVETICA_WIDTHS),
            Font::HelveticaBold => helvetica_units(ch, &HELVETICA_BOLD_WIDTHS),
        }
    }

    /// Rendered width of `text` in millimetres at `size_pt`.
    pub fn text_width(self, text: &str, size_pt: f64) -> f64 {
        let units: u32 = text.chars().map(|c| self.glyph_units(c)).sum();
        units as f64 / 1000.0 * size_pt * MM_PER_PT
    }

    /// Baseline-to-baseline distance in millimetres.
    pub fn line_height(size_pt: f64) -> f64 {
        size_pt * 1.2 * MM_PER_PT
    }
}

fn helvetica_units(ch: char, table: &[u16; 95]) -> u32 {
    match ch {
        ' '..='~' => u32::from(table[ch as usize - 32]),
        '₹' => {
            u32::from(table['R' as usize - 32])
                + u32::from(table['s' as usize - 32])
                + u32::from(table['.' as usize - 32])
        }
        _ => 556,
    }
}

// Adobe AFM advance widths for printable ASCII (0x20..=0x7E).
#[rustfmt::skip]
const HELVETICA_WIDTHS: [u16; 95] = [
    278, 278, 355, 556, 556, 889, 667, 191, 333, 333, 389, 584, 278, 333, 278, 278,
    556, 556, 556, 556, 556, 556, 556, 556, 556, 556, 278, 278, 584, 584, 584, 556,
    1015, 667, 667, 722, 722, 667, 611, 778, 722, 278, 500, 667, 556, 833, 722, 778,
    667, 778, 722, 667, 611, 722, 667, 944, 667, 667, 611, 278, 278, 278, 469, 556,
    333, 556, 556, 500, 556, 556, 278, 556, 556, 222, 222, 500, 222, 833, 556, 556,
    556, 556, 333, 500, 278, 556, 500, 722, 500, 500, 500, 334, 260, 334, 584,
];

#[rustfmt::skip]
const HELVETICA_BOLD_WIDTHS: [u16; 95] = [
    278, 333, 474, 556, 556, 889, 722, 238, 333, 333, 389, 584, 278, 333, 278, 278,
    556, 556, 556, 556, 556, 556, 556, 556, 556, 556, 333, 333, 584, 584, 584, 611,
    975, 722, 722, 722, 722, 667, 611, 778, 722, 278, 556, 722, 611, 833, 722, 778,
    667, 778, 722, 667, 611, 722, 667, 944, 667, 667, 611, 333, 278, 333, 584, 556,
    333, 556, 611, 556, 611, 556, 333, 611, 611, 278, 278, 556, 278, 889, 611, 611,
    611, 611, 389, 556, 333, 611, 556, 778, 556, 556, 500, 389, 280, 389, 584,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Align {
    Left,
    Center,
    Right,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rgb(pub u8, pub u8, pub u8);

impl Rgb {
    pub const BLACK: Rgb = Rgb(0, 0, 0);
    pub const WHITE: Rgb = Rgb(255, 255, 255);
    pub const GREY: Rgb = Rgb(100, 100, 100);
    pub const LIGHT_GREY: Rgb = Rgb(200, 200, 200);
}

#[derive(Debug, Clone, PartialEq)]
pub enum DrawOp {
    Text {
        /// Left edge after alignment has been resolved.
        x: f64,
        y: f64,
        text: String,
        font: Font,
        size: f64,
        color: Rgb,
    },
    Line {
        x1: f64,
        y1: f64,
        x2: f64,
        y2: f64,
        width: f64,
        color: Rgb,
        dashed: bool,
    },
    Rect {
        x: f64,
        y: f64,
        w: f64,
        h: f64,
        fill: Option<Rgb>,
        stroke: Option<Rgb>,
    },
}

/// One page and everything drawn on it, in order.
#[derive(Debug, Clone)]
pub struct Canvas {
    size: PageSize,
    ops: Vec<DrawOp>,
    font: Font,
    font_size: f64,
    color: Rgb,
    line_width: f64,
}

impl Canvas {
    pub fn new(size: PageSize) -> Self {
        Self {
            size,
            ops: Vec::with_capacity(128),
            font: Font::Helvetica,
            font_size: 10.0,
            color: Rgb::BLACK,
            line_width: 0.2,
        }
    }

    pub fn size(&self) -> PageSize {
        self.size
    }

    pub fn ops(&self) -> &[DrawOp] {
        &self.ops
    }

    pub fn current_font(&self) -> (Font, f64) {
        (self.font, self.font_size)
    }

    // -----------------------------------------------------------------------
    // Style state
    // -----------------------------------------------------------------------

    pub fn font(&mut self, font: Font, size_pt: f64) -> &mut Self {
        self.font = font;
        self.font_size = size_pt;
        self
    }

    pub fn color(&mut self, color: Rgb) -> &mut Self {
        self.color = color;
        self
    }

    pub fn line_width(&mut self, width_mm: f64) -> &mut Self {
        self.line_width = width_mm;
        self
    }

    // -----------------------------------------------------------------------
    // Drawing
    // -----------------------------------------------------------------------

    /// Draw `text` with its anchor at `x` (left edge, centre, or right edge).
    pub fn text_at(&mut self, x: f64, y: f64, text: &str, align: Align) -> &mut Self {
        let width = self.font.text_width(text, self.font_size);
        let left = match align {
            Align::Left => x,
            Align::Center => x - width / 2.0,
            Align::Right => x - width,
        };
        self.ops.push(DrawOp::Text {
            x: left,
            y,
            text: text.to_string(),
            font: self.font,
            size: self.font_size,
            color: self.color,
        });
        self
    }

    pub fn text(&mut self, x: f64, y: f64, text: &str) -> &mut Self {
        self.text_at(x, y, text, Align::Left)
    }

    pub fn line(&mut self, x1: f64, y1: f64, x2: f64, y2: f64) -> &mut Self {
        self.push_line(x1, y1, x2, y2, false)
    }

    pub fn dashed_line(&mut self, x1: f64, y1: f64, x2: f64, y2: f64) -> &mut Self {
        self.push_line(x1, y1, x2, y2, true)
    }

    fn push_line(&mut self, x1: f64, y1: f64, x2: f64, y2: f64, dashed: bool) -> &mut Self {
        self.ops.push(DrawOp::Line {
            x1,
            y1,
            x2,
            y2,
            width: self.line_width,
            color: self.color,
            dashed,
        });
        self
    }

    pub fn fill_rect(&mut self, x: f64, y: f64, w: f64, h: f64, fill: Rgb) -> &mut Self {
        self.ops.push(DrawOp::Rect {
            x,
            y,
            w,
            h,
            fill: Some(fill),
            stroke: None,
        });
        self
    }

    pub fn stroke_rect(&mut self, x: f64, y: f64, w: f64, h: f64) -> &mut Self {
        self.ops.push(DrawOp::Rect {
            x,
            y,
            w,
            h,
            fill: None,
            stroke: Some(self.color),
        });
        self
    }

    // -----------------------------------------------------------------------
    // Inspection
    // -----------------------------------------------------------------------

    /// Every text run, in drawing order.
    pub fn texts(&self) -> impl Iterator<Item = &str> {
        self.ops.iter().filter_map(|op| match op {
            DrawOp::Text { text, .. } => Some(text.as_str()),
            _ => None,
        })
    }

    /// Text runs grouped by baseline, top to bottom, each line's runs
    /// joined left to right with a single space.
    pub fn lines(&self) -> Vec<String> {
        let mut runs: Vec<(f64, f64, &str)> = self
            .ops
            .iter()
            .filter_map(|op| match op {
                DrawOp::Text { x, y, text, .. } => Some((*y, *x, text.as_str())),
                _ => None,
            })
            .collect();
        runs.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.total_cmp(&b.1)));

        let mut lines: Vec<(f64, Vec<&str>)> = Vec::new();
        for (y, _, text) in runs {
            let same_line = lines
                .last()
                .is_some_and(|(line_y, _)| (y - line_y).abs() < SAME_LINE_EPSILON);
            match lines.last_mut() {
                Some((_, parts)) if same_line => parts.push(text),
                _ => lines.push((y, vec![text])),
            }
        }
        lines.into_iter().map(|(_, parts)| parts.join(" ")).collect()
    }

    /// Baseline of the first text run equal to `text`.
    pub fn baseline_of(&self, text: &str) -> Option<f64> {
        self.ops.iter().find_map(|op| match op {
            DrawOp::Text { y, text: t, .. } if t == text => Some(*y),
            _ => None,
        })
    }
}

/// Vertical layout position. Only ever moves down the page.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Cursor {
    y: f64,
}

impl Cursor {
    pub fn at(y: f64) -> Self {
        Self { y }
    }

    pub fn y(&self) -> f64 {
        self.y
    }

    /// Move down by `height` mm. Negative or non-finite heights are ignored.
    pub fn advance(&mut self, height: f64) -> f64 {
        if height.is_finite() && height > 0.0 {
            self.y += height;
        }
        self.y
    }

    /// Jump to `y` if it lies further down the page.
    pub fn advance_to(&mut self, y: f64) -> f64 {
        if y.is_finite() && y > self.y {
            self.y = y;
        }
        self.y
    }
}

/// Greedy word wrap by rendered width. A single word wider than the line
/// is broken between characters. Always returns at least one line.
pub fn wrap_text(text: &str, max_width_mm: f64, font: Font, size_pt: f64) -> Vec<String> {
    let fits = |s: &str| font.text_width(s, size_pt) <= max_width_mm;
    let mut out = Vec::new();
    let mut line = String::new();

    for word in text.split_whitespace() {
        let candidate = if line.is_empty() {
            word.to_string()
        } else {
            format!("{line} {word}")
        };
        if fits(&candidate) {
            line = candidate;
            continue;
        }
        if !line.is_empty() {
            out.push(std::mem::take(&mut line));
        }
        if fits(word) {
            line = word.to_string();
            continue;
        }
        // Hard-break an over-long word.
        for ch in word.chars() {
            let mut next = line.clone();
            next.push(ch);
            if !line.is_empty() && !fits(&next) {
                out.push(std::mem::take(&mut line));
                line.push(ch);
            } else {
                line = next;
            }
        }
    }

    if !line.is_empty() {
        out.push(line);
    }
    if out.is_empty() {
        out.push(String::new());
    }
    out
}
