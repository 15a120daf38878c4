use std::path::PathBuf;

pub const DB_PATH_ENV: &str = "WWM_DB_PATH";
pub const EXPORT_DIR_ENV: &str = "WWM_EXPORT_DIR";

const DEFAULT_DB_PATH: &str = "data/analysis.db";
const DEFAULT_EXPORT_DIR: &str = "outputs";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub db_path: PathBuf,
    pub export_dir: PathBuf,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from(DEFAULT_DB_PATH),
            export_dir: PathBuf::from(DEFAULT_EXPORT_DIR),
        }
    }
}

impl Settings {
    /// Reads `.env.local` and `.env` (if present), then the environment.
    pub fn load() -> Self {
        let _ = dotenvy::from_filename(".env.local");
        let _ = dotenvy::from_filename(".env");
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let path_var = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .map(PathBuf::from)
        };
        Self {
            db_path: path_var(DB_PATH_ENV).unwrap_or(defaults.db_path),
            export_dir: path_var(EXPORT_DIR_ENV).unwrap_or(defaults.export_dir),
        }
    }
}
