//! Generated files: the in-memory artifact, the restaurant identity printed
//! on every document, and shared number formatting.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::billing::normalize_amount;
use crate::error::DocumentError;
use crate::models::RestaurantSettings;
use crate::pdf::RenderWarning;

pub const FALLBACK_NAME: &str = "RISHITHA RESTAURANT";
pub const FALLBACK_ADDRESS: &str = "123 Food Street, Delicious City, 560001";
pub const FALLBACK_PHONE: &str = "+91 98765 43210";

/// A finished document. Has no identity; it is written out and dropped.
#[derive(Debug, Clone)]
pub struct GeneratedDocument {
    pub file_name: String,
    pub bytes: Vec<u8>,
    pub warnings: Vec<RenderWarning>,
}

impl GeneratedDocument {
    /// Write into `dir` (created if missing) and return the full path.
    pub fn save_to(&self, dir: &Path) -> Result<PathBuf, DocumentError> {
        if self.bytes.is_empty() {
            return Err(DocumentError::Empty);
        }
        fs::create_dir_all(dir).map_err(|source| DocumentError::Io {
            path: dir.display().to_string(),
            source,
        })?;
        let path = dir.join(sanitize_file_name(&self.file_name));
        fs::write(&path, &self.bytes).map_err(|source| DocumentError::Io {
            path: path.display().to_string(),
            source,
        })?;
        for w in &self.warnings {
            debug!(file = %path.display(), code = %w.code, "{}", w.message);
        }
        info!(file = %path.display(), bytes = self.bytes.len(), "document saved");
        Ok(path)
    }
}

/// Replace path separators and other characters that are unsafe in a
/// file name with `_`.
pub fn sanitize_file_name(name: &str) -> String {
    let cleaned: String = name
        .trim()
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();
    let cleaned = cleaned.trim_start_matches('.');
    if cleaned.is_empty() {
        "document.pdf".to_string()
    } else {
        cleaned.to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestaurantIdentity {
    pub name: String,
    pub address: String,
    pub phone: String,
}

impl Default for RestaurantIdentity {
    fn default() -> Self {
        Self {
            name: FALLBACK_NAME.to_string(),
            address: FALLBACK_ADDRESS.to_string(),
            phone: FALLBACK_PHONE.to_string(),
        }
    }
}

impl RestaurantIdentity {
    /// Identity from backend settings. Missing or blank fields fall back
    /// individually.
    pub fn from_settings(settings: Option<&RestaurantSettings>) -> Self {
        let pick = |value: Option<&String>, fallback: &str| {
            value
                .map(|s| s.trim())
                .filter(|s| !s.is_empty())
                .unwrap_or(fallback)
                .to_string()
        };
        Self {
            name: pick(settings.and_then(|s| s.restaurant_name.as_ref()), FALLBACK_NAME),
            address: pick(settings.and_then(|s| s.address.as_ref()), FALLBACK_ADDRESS),
            phone: pick(settings.and_then(|s| s.phone_number.as_ref()), FALLBACK_PHONE),
        }
    }
}

/// `₹1234.50`. No digit grouping; bad values print as zero.
pub fn rupees(value: f64) -> String {
    format!("₹{:.2}", normalize_amount(value))
}

/// Rate for tax labels: up to two decimals, trailing zeros dropped.
pub fn percent_label(rate: f64) -> String {
    let s = format!("{:.2}", normalize_amount(rate));
    s.trim_end_matches('0').trim_end_matches('.').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_falls_back_per_field() {
        assert_eq!(RestaurantIdentity::from_settings(None), RestaurantIdentity::default());

        let settings = RestaurantSettings {
            restaurant_name: Some("Spice Route".into()),
            address: Some("   ".into()),
            phone_number: None,
            ..Default::default()
        };
        let id = RestaurantIdentity::from_settings(Some(&settings));
        assert_eq!(id.name, "Spice Route");
        assert_eq!(id.address, FALLBACK_ADDRESS);
        assert_eq!(id.phone, FALLBACK_PHONE);
    }

    #[test]
    fn currency_and_percent_formatting() {
        assert_eq!(rupees(440.0), "₹440.00");
        assert_eq!(rupees(11.0), "₹11.00");
        assert_eq!(rupees(-5.0), "₹0.00");
        assert_eq!(rupees(f64::INFINITY), "₹0.00");
        assert_eq!(percent_label(2.5), "2.5");
        assert_eq!(percent_label(9.0), "9");
        assert_eq!(percent_label(0.0), "0");
        assert_eq!(percent_label(100.0 / 3.0), "33.33");
    }

    #[test]
    fn file_names_are_sanitized() {
        assert_eq!(sanitize_file_name("Receipt_BILL-007.pdf"), "Receipt_BILL-007.pdf");
        assert_eq!(sanitize_file_name("Invoices_2024/01/01.pdf"), "Invoices_2024_01_01.pdf");
        assert_eq!(sanitize_file_name("../x.pdf"), "_x.pdf");
        assert_eq!(sanitize_file_name("  "), "document.pdf");
    }

    #[test]
    fn save_writes_into_created_directory() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("bills");
        let doc = GeneratedDocument {
            file_name: "Receipt_BILL-001.pdf".into(),
            bytes: b"%PDF-1.4\n".to_vec(),
            warnings: Vec::new(),
        };
        let path = doc.save_to(&out).unwrap();
        assert_eq!(path, out.join("Receipt_BILL-001.pdf"));
        assert_eq!(std::fs::read(&path).unwrap(), b"%PDF-1.4\n");
    }

    #[test]
    fn empty_document_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let doc = GeneratedDocument {
            file_name: "x.pdf".into(),
            bytes: Vec::new(),
            warnings: Vec::new(),
        };
        assert!(matches!(doc.save_to(dir.path()), Err(DocumentError::Empty)));
    }
}
