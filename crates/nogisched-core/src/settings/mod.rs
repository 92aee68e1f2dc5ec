//! Persisted user settings: theme, favorite members, favorites auto-apply.
//!
//! Every setting lives in two places. A small JSON mirror file is read
//! synchronously at startup so the first screen can use it; the durable
//! store is authoritative and is reconciled into the mirror once its read
//! completes. After that, writes go to both.

pub mod durable;
pub mod store;

use serde::{Deserialize, Serialize};

pub use durable::{DurableStore, FileDurableStore};
pub use store::SettingsStore;

pub const THEME_KEY: &str = "nogi_theme";
pub const FAVORITES_KEY: &str = "nogi_favorite_members";
pub const AUTO_APPLY_KEY: &str = "nogi_favorite_auto_apply";

/// Color theme preference.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub enum Theme {
    Light,
    Dark,
    /// Follow the platform preference
    #[default]
    System,
}

impl Theme {
    pub fn as_str(&self) -> &'static str {
        match self {
            Theme::Light => "light",
            Theme::Dark => "dark",
            Theme::System => "system",
        }
    }

    /// The concrete theme to render, given whether the platform prefers dark.
    pub fn resolve(&self, prefers_dark: bool) -> Theme {
        match self {
            Theme::System if prefers_dark => Theme::Dark,
            Theme::System => Theme::Light,
            other => *other,
        }
    }
}

impl std::fmt::Display for Theme {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Theme {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "light" => Ok(Theme::Light),
            "dark" => Ok(Theme::Dark),
            "system" => Ok(Theme::System),
            other => Err(format!("unknown theme {:?} (expected light, dark or system)", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_theme_parse_and_resolve() {
        assert_eq!("dark".parse::<Theme>(), Ok(Theme::Dark));
        assert!("sepia".parse::<Theme>().is_err());
        assert_eq!(Theme::System.resolve(true), Theme::Dark);
        assert_eq!(Theme::System.resolve(false), Theme::Light);
        assert_eq!(Theme::Light.resolve(true), Theme::Light);
        assert_eq!(serde_json::to_string(&Theme::Dark).unwrap(), "\"dark\"");
    }
}
