pub mod backend;
pub mod prefs;
pub mod store;

pub use backend::{SettingsBackend, SqliteSettingsBackend};
pub use prefs::{DivinationMethod, FontSize, HexagramStyle, ResolvedTheme, Theme};
pub use store::{SettingsSnapshot, SettingsStore};
