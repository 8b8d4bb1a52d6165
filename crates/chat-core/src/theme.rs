//! Light/dark theme preference.
//!
//! `Theme` is a plain value with a pure resolution rule. `ThemeManager` is the
//! boundary that owns the applied theme and writes it to the config store.

use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::ConfigStore;

const LIGHT_ICON: &str = "☀️";
const DARK_ICON: &str = "🌙";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    #[default]
    Light,
    Dark,
}

impl Theme {
    pub fn as_str(&self) -> &'static str {
        match self {
            Theme::Light => "light",
            Theme::Dark => "dark",
        }
    }

    pub fn toggled(self) -> Self {
        match self {
            Theme::Light => Theme::Dark,
            Theme::Dark => Theme::Light,
        }
    }

    /// Icon shown on the toggle control: the mode a press switches *to*.
    pub fn toggle_icon(&self) -> &'static str {
        match self {
            Theme::Dark => LIGHT_ICON,
            Theme::Light => DARK_ICON,
        }
    }

    /// Persisted choice first, then the OS/terminal preference, then light.
    pub fn resolve_initial(persisted: Option<Theme>, prefers_dark: Option<bool>) -> Theme {
        match (persisted, prefers_dark) {
            (Some(theme), _) => theme,
            (None, Some(true)) => Theme::Dark,
            _ => Theme::Light,
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("unknown theme '{0}' (expected light or dark)")]
pub struct ParseThemeError(String);

impl FromStr for Theme {
    type Err = ParseThemeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "light" => Ok(Theme::Light),
            "dark" => Ok(Theme::Dark),
            _ => Err(ParseThemeError(s.to_string())),
        }
    }
}

/// Terminal background preference from `COLORFGBG`, if the terminal sets it.
pub fn detect_prefers_dark() -> Option<bool> {
    std::env::var("COLORFGBG")
        .ok()
        .and_then(|value| prefers_dark_from_colorfgbg(&value))
}

/// `COLORFGBG` is `fg;bg` (sometimes `fg;default;bg`); only the last field matters.
pub fn prefers_dark_from_colorfgbg(value: &str) -> Option<bool> {
    let bg: u8 = value.rsplit(';').next()?.trim().parse().ok()?;
    match bg {
        0..=6 | 8 => Some(true),
        7 | 9..=15 => Some(false),
        _ => None,
    }
}

pub struct ThemeManager {
    current: Theme,
    store: Option<ConfigStore>,
}

impl ThemeManager {
    /// Resolve the startup theme and apply it once.
    pub fn initialize(store: Option<ConfigStore>, prefers_dark: Option<bool>) -> Self {
        if store.is_none() {
            warn!("no config location available; theme preference will not be saved");
        }

        let persisted = store.as_ref().and_then(|store| match store.load() {
            Ok(config) => config.theme.as_deref().and_then(|s| s.parse::<Theme>().ok()),
            Err(e) => {
                warn!(error = %e, "could not read saved theme");
                None
            }
        });

        Self::with_theme(store, Theme::resolve_initial(persisted, prefers_dark))
    }

    /// Start with an explicit theme instead of the resolved one.
    pub fn with_theme(store: Option<ConfigStore>, theme: Theme) -> Self {
        let mut manager = Self {
            current: theme,
            store,
        };
        manager.set_theme(theme);
        manager
    }

    pub fn current(&self) -> Theme {
        self.current
    }

    pub fn is_persistent(&self) -> bool {
        self.store.is_some()
    }

    pub fn set_theme(&mut self, theme: Theme) {
        self.current = theme;
        debug!(theme = theme.as_str(), "theme applied");
        self.persist(theme);
    }

    pub fn toggle(&mut self) -> Theme {
        let next = self.current.toggled();
        self.set_theme(next);
        next
    }

    fn persist(&mut self, theme: Theme) {
        let Some(store) = &self.store else {
            return;
        };

        if let Err(e) = store.update(|config| config.theme = Some(theme.as_str().to_string())) {
            warn!(
                error = %e,
                path = %store.path().display(),
                "saving theme failed; persistence disabled for this session"
            );
            self.store = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn saved_theme(store: &ConfigStore) -> Option<String> {
        store.load().unwrap().theme
    }

    #[test]
    fn test_resolve_initial_prefers_persisted() {
        assert_eq!(Theme::resolve_initial(Some(Theme::Light), Some(true)), Theme::Light);
        assert_eq!(Theme::resolve_initial(Some(Theme::Dark), Some(false)), Theme::Dark);
    }

    #[test]
    fn test_resolve_initial_falls_back_to_os_then_light() {
        assert_eq!(Theme::resolve_initial(None, Some(true)), Theme::Dark);
        assert_eq!(Theme::resolve_initial(None, Some(false)), Theme::Light);
        assert_eq!(Theme::resolve_initial(None, None), Theme::Light);
    }

    #[test]
    fn test_toggle_icon_shows_opposite_mode() {
        assert_eq!(Theme::Dark.toggle_icon(), LIGHT_ICON);
        assert_eq!(Theme::Light.toggle_icon(), DARK_ICON);
    }

    #[test]
    fn test_parse() {
        assert_eq!("dark".parse::<Theme>(), Ok(Theme::Dark));
        assert_eq!(" Light ".parse::<Theme>(), Ok(Theme::Light));
        assert_eq!(
            "sepia".parse::<Theme>(),
            Err(ParseThemeError("sepia".to_string()))
        );
    }

    #[test]
    fn test_colorfgbg() {
        assert_eq!(prefers_dark_from_colorfgbg("15;0"), Some(true));
        assert_eq!(prefers_dark_from_colorfgbg("0;15"), Some(false));
        assert_eq!(prefers_dark_from_colorfgbg("12;default;8"), Some(true));
        assert_eq!(prefers_dark_from_colorfgbg("0;7"), Some(false));
        assert_eq!(prefers_dark_from_colorfgbg("default"), None);
        assert_eq!(prefers_dark_from_colorfgbg("0;200"), None);
    }

    #[test]
    fn test_initialize_without_saved_theme_follows_os() {
        let dir = tempfile::tempdir().unwrap();
        let store = ConfigStore::new(dir.path().join("config.json"));

        let manager = ThemeManager::initialize(Some(store.clone()), Some(true));
        assert_eq!(manager.current(), Theme::Dark);
        assert_eq!(saved_theme(&store).as_deref(), Some("dark"));

        let dir = tempfile::tempdir().unwrap();
        let store = ConfigStore::new(dir.path().join("config.json"));
        let manager = ThemeManager::initialize(Some(store), Some(false));
        assert_eq!(manager.current(), Theme::Light);
    }

    #[test]
    fn test_initialize_saved_theme_overrides_os() {
        let dir = tempfile::tempdir().unwrap();
        let store = ConfigStore::new(dir.path().join("config.json"));
        store.update(|c| c.theme = Some("light".to_string())).unwrap();

        let manager = ThemeManager::initialize(Some(store), Some(true));
        assert_eq!(manager.current(), Theme::Light);
    }

    #[test]
    fn test_initialize_ignores_unknown_saved_theme() {
        let dir = tempfile::tempdir().unwrap();
        let store = ConfigStore::new(dir.path().join("config.json"));
        store.update(|c| c.theme = Some("sepia".to_string())).unwrap();

        let manager = ThemeManager::initialize(Some(store.clone()), Some(true));
        assert_eq!(manager.current(), Theme::Dark);
        assert_eq!(saved_theme(&store).as_deref(), Some("dark"));
    }

    #[test]
    fn test_double_toggle_restores_theme_and_saved_value() {
        let dir = tempfile::tempdir().unwrap();
        let store = ConfigStore::new(dir.path().join("config.json"));
        let mut manager = ThemeManager::initialize(Some(store.clone()), None);
        let original = manager.current();
        let original_saved = saved_theme(&store);

        assert_eq!(manager.toggle(), original.toggled());
        assert_eq!(saved_theme(&store).as_deref(), Some(original.toggled().as_str()));

        manager.toggle();
        assert_eq!(manager.current(), original);
        assert_eq!(saved_theme(&store), original_saved);
    }

    #[test]
    fn test_unwritable_store_disables_persistence() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("not-a-dir");
        std::fs::write(&blocker, "").unwrap();
        let store = ConfigStore::new(blocker.join("config.json"));

        let mut manager = ThemeManager::initialize(Some(store), Some(true));
        assert_eq!(manager.current(), Theme::Dark);
        assert!(!manager.is_persistent());

        manager.toggle();
        assert_eq!(manager.current(), Theme::Light);
    }

    #[test]
    fn test_with_theme_persists_explicit_choice() {
        let dir = tempfile::tempdir().unwrap();
        let store = ConfigStore::new(dir.path().join("config.json"));
        store.update(|c| c.theme = Some("light".to_string())).unwrap();

        let manager = ThemeManager::with_theme(Some(store.clone()), Theme::Dark);
        assert_eq!(manager.current(), Theme::Dark);
        assert_eq!(saved_theme(&store).as_deref(), Some("dark"));
    }

    #[test]
    fn test_no_store_still_themes() {
        let mut manager = ThemeManager::initialize(None, None);
        assert_eq!(manager.current(), Theme::Light);
        manager.toggle();
        assert_eq!(manager.current(), Theme::Dark);
    }
}
