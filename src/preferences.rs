//! UI preferences kept in the local store.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::db::LocalStore;
use crate::error::StoreError;

const CATEGORY: &str = "ui";
const KEY_THEME: &str = "theme";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    Light,
    Dark,
    #[default]
    System,
}

impl Theme {
    pub fn as_str(self) -> &'static str {
        match self {
            Theme::Light => "light",
            Theme::Dark => "dark",
            Theme::System => "system",
        }
    }

    /// The concrete theme to paint with. `System` follows the OS setting.
    pub fn resolve(self, system_prefers_dark: bool) -> Theme {
        match self {
            Theme::System if system_prefers_dark => Theme::Dark,
            Theme::System => Theme::Light,
            other => other,
        }
    }
}

impl fmt::Display for Theme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Theme {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "light" => Ok(Theme::Light),
            "dark" => Ok(Theme::Dark),
            "system" => Ok(Theme::System),
            other => Err(format!("unknown theme: {other}")),
        }
    }
}

/// Stored theme, or `System` when nothing (or garbage) is stored.
pub fn load_theme(store: &LocalStore) -> Theme {
    match store.get_setting(CATEGORY, KEY_THEME) {
        Ok(Some(raw)) => raw.parse::<Theme>().unwrap_or_else(|e| {
            warn!(error = %e, "ignoring stored theme");
            Theme::default()
        }),
        Ok(None) => Theme::default(),
        Err(e) => {
            warn!(error = %e, "theme preference unreadable");
            Theme::default()
        }
    }
}

pub fn save_theme(store: &LocalStore, theme: Theme) -> Result<(), StoreError> {
    store.set_setting(CATEGORY, KEY_THEME, theme.as_str())?;
    debug!(theme = %theme, "theme saved");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_theme_follows_the_os() {
        assert_eq!(Theme::System.resolve(true), Theme::Dark);
        assert_eq!(Theme::System.resolve(false), Theme::Light);
        assert_eq!(Theme::Light.resolve(true), Theme::Light);
        assert_eq!(Theme::Dark.resolve(false), Theme::Dark);
    }

    #[test]
    fn theme_round_trips_through_the_store() {
        let store = LocalStore::open_in_memory().unwrap();
        assert_eq!(load_theme(&store), Theme::System);

        save_theme(&store, Theme::Dark).unwrap();
        assert_eq!(load_theme(&store), Theme::Dark);
        assert_eq!(store.get_setting("ui", "theme").unwrap().as_deref(), Some("dark"));
    }

    #[test]
    fn unknown_stored_value_falls_back_to_system() {
        let store = LocalStore::open_in_memory().unwrap();
        store.set_setting("ui", "theme", "solarized").unwrap();
        assert_eq!(load_theme(&store), Theme::System);
        assert_eq!(" Light ".parse::<Theme>(), Ok(Theme::Light));
    }
}
