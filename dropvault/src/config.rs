use std::path::{Path, PathBuf};

use anyhow::Context;
use dropvault_core::Credentials;

const APP_DIR_NAME: &str = "dropvault";
const DEFAULT_CACHE_DIR_NAME: &str = "DropVault";
const DEFAULT_DB_FILE_NAME: &str = "index.db";

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub server_url: Option<String>,
    pub credentials: Option<Credentials>,
    pub cache_root: PathBuf,
    pub db_path: PathBuf,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let home = dirs::home_dir().context("home directory is unavailable")?;
        let data_dir = dirs::data_dir().unwrap_or_else(|| home.join(".local/share"));
        Ok(Self::from_lookup(&home, &data_dir, |name| {
            std::env::var(name).ok()
        }))
    }

    fn from_lookup(home: &Path, data_dir: &Path, lookup: impl Fn(&str) -> Option<String>) -> Self {
        let read = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());
        let app_dir = data_dir.join(APP_DIR_NAME);

        let server_url = read("DROPVAULT_SERVER_URL");
        let credentials = match (read("DROPVAULT_USERNAME"), lookup("DROPVAULT_PASSWORD")) {
            (Some(username), Some(password)) => Some(Credentials::new(username, password)),
            _ => None,
        };
        let cache_root = read("DROPVAULT_CACHE_DIR")
            .map(|value| expand_with_home(&value, home))
            .unwrap_or_else(|| app_dir.join(DEFAULT_CACHE_DIR_NAME));
        let db_path = read("DROPVAULT_DB")
            .map(|value| expand_with_home(&value, home))
            .unwrap_or_else(|| app_dir.join(DEFAULT_DB_FILE_NAME));

        Self {
            server_url,
            credentials,
            cache_root,
            db_path,
        }
    }
}

fn expand_with_home(value: &str, home: &Path) -> PathBuf {
    if value == "~" {
        return home.to_path_buf();
    }
    if let Some(rest) = value.strip_prefix("~/") {
        return home.join(rest);
    }
    PathBuf::from(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(vars: &[(&str, &str)]) -> AppConfig {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        AppConfig::from_lookup(
            Path::new("/home/alice"),
            Path::new("/home/alice/.local/share"),
            |name| vars.get(name).cloned(),
        )
    }

    #[test]
    fn defaults_live_under_data_dir() {
        let config = config_from(&[]);
        assert_eq!(config.server_url, None);
        assert!(config.credentials.is_none());
        assert_eq!(
            config.cache_root,
            PathBuf::from("/home/alice/.local/share/dropvault/DropVault")
        );
        assert_eq!(
            config.db_path,
            PathBuf::from("/home/alice/.local/share/dropvault/index.db")
        );
    }

    #[test]
    fn reads_server_and_credentials() {
        let config = config_from(&[
            ("DROPVAULT_SERVER_URL", "https://dav.example/dav/alice/"),
            ("DROPVAULT_USERNAME", "alice"),
            ("DROPVAULT_PASSWORD", "secret"),
        ]);
        assert_eq!(
            config.server_url.as_deref(),
            Some("https://dav.example/dav/alice/")
        );
        assert_eq!(config.credentials.unwrap().username(), "alice");
    }

    #[test]
    fn username_without_password_is_not_credentials() {
        let config = config_from(&[("DROPVAULT_USERNAME", "alice")]);
        assert!(config.credentials.is_none());
    }

    #[test]
    fn expands_home_in_overrides() {
        let config = config_from(&[
            ("DROPVAULT_CACHE_DIR", "~/Mirror"),
            ("DROPVAULT_DB", "/var/lib/dropvault.db"),
        ]);
        assert_eq!(config.cache_root, PathBuf::from("/home/alice/Mirror"));
        assert_eq!(config.db_path, PathBuf::from("/var/lib/dropvault.db"));
    }

    #[test]
    fn blank_values_fall_back_to_defaults() {
        let config = config_from(&[("DROPVAULT_SERVER_URL", "  "), ("DROPVAULT_CACHE_DIR", "")]);
        assert_eq!(config.server_url, None);
        assert!(config.cache_root.ends_with("dropvault/DropVault"));
    }

    #[test]
    fn expand_with_home_handles_bare_tilde() {
        let home = Path::new("/home/alice");
        assert_eq!(expand_with_home("~", home), PathBuf::from("/home/alice"));
        assert_eq!(expand_with_home("rel/dir", home), PathBuf::from("rel/dir"));
    }
}
