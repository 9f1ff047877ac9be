//! Configuration file management for indy.
//!
//! Provides a TOML-based config file at `~/.config/indy/config.toml` and a
//! resolution chain: CLI flag > env var > config file > default.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};

use indy_db::config::DbConfig;

// -----------------------------------------------------------------------
// Config file types
// -----------------------------------------------------------------------

#[derive(Debug, Serialize, Deserialize)]
pub struct ConfigFile {
    pub database: DatabaseSection,
    #[serde(default)]
    pub defaults: DefaultsSection,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DatabaseSection {
    pub url: String,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct DefaultsSection {
    /// User key every command acts as unless overridden.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
}

// -----------------------------------------------------------------------
// Paths
// -----------------------------------------------------------------------

/// Return the indy config directory: `$XDG_CONFIG_HOME/indy` or
/// `~/.config/indy`, on every platform.
pub fn config_dir() -> PathBuf {
    if let Ok(xdg) = std::env::var("XDG_CONFIG_HOME") {
        return PathBuf::from(xdg).join("indy");
    }
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".config")
        .join("indy")
}

pub fn config_path() -> PathBuf {
    config_dir().join("config.toml")
}

// -----------------------------------------------------------------------
// Read / write
// -----------------------------------------------------------------------

pub fn load_config_from(path: &Path) -> Result<ConfigFile> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config file at {}", path.display()))?;
    let config: ConfigFile = toml::from_str(&contents)
        .with_context(|| format!("failed to parse config file at {}", path.display()))?;
    Ok(config)
}

/// Serialize and write the config file, creating parent dirs as needed.
/// The file is owner-only (0600) on Unix.
pub fn save_config_to(path: &Path, config: &ConfigFile) -> Result<()> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("failed to create config directory {}", dir.display()))?;
    }

    let contents = toml::to_string_pretty(config).context("failed to serialize config")?;
    std::fs::write(path, &contents)
        .with_context(|| format!("failed to write config file at {}", path.display()))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(0o600);
        std::fs::set_permissions(path, perms)
            .with_context(|| format!("failed to set permissions on {}", path.display()))?;
    }

    Ok(())
}

// -----------------------------------------------------------------------
// Resolved config
// -----------------------------------------------------------------------

/// Fully resolved configuration, ready for use.
#[derive(Debug)]
pub struct IndyConfig {
    pub db_config: DbConfig,
    user: Option<String>,
}

impl IndyConfig {
    /// Resolve configuration from the default config file location.
    ///
    /// - DB URL: `cli_db_url` > `INDY_DATABASE_URL` > `database.url` > `DbConfig::DEFAULT_URL`
    /// - user: `cli_user` > `INDY_USER` > `defaults.user` > unset
    ///
    /// A missing or unreadable config file counts as absent.
    pub fn resolve(cli_db_url: Option<&str>, cli_user: Option<&str>) -> Self {
        let file_config = load_config_from(&config_path()).ok();
        Self::resolve_with(cli_db_url, cli_user, file_config.as_ref())
    }

    fn resolve_with(
        cli_db_url: Option<&str>,
        cli_user: Option<&str>,
        file: Option<&ConfigFile>,
    ) -> Self {
        let db_url = if let Some(url) = cli_db_url {
            url.to_owned()
        } else if let Ok(url) = std::env::var("INDY_DATABASE_URL") {
            url
        } else if let Some(cfg) = file {
            cfg.database.url.clone()
        } else {
            DbConfig::DEFAULT_URL.to_owned()
        };

        let user = cli_user
            .map(str::to_owned)
            .or_else(|| std::env::var("INDY_USER").ok())
            .or_else(|| file.and_then(|cfg| cfg.defaults.user.clone()))
            .map(|u| u.trim().to_owned())
            .filter(|u| !u.is_empty());

        Self {
            db_config: DbConfig::new(db_url),
            user,
        }
    }

    /// The user key to act as. Every data command needs one.
    pub fn user(&self) -> Result<&str> {
        match self.user.as_deref() {
            Some(user) => Ok(user),
            None => bail!(
                "no user key; pass --user, set INDY_USER, or run `indy init --user <key>`"
            ),
        }
    }
}

// -----------------------------------------------------------------------
// Tests
// -----------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn lock_env() -> std::sync::MutexGuard<'static, ()> {
        crate::test_util::lock_env()
    }

    fn file(url: &str, user: Option<&str>) -> ConfigFile {
        ConfigFile {
            database: DatabaseSection { url: url.into() },
            defaults: DefaultsSection {
                user: user.map(Into::into),
            },
        }
    }

    #[test]
    fn save_and_load_config_roundtrip() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("indy").join("config.toml");

        save_config_to(&path, &file("postgresql://testhost:5432/testdb", Some("corp-42"))).unwrap();
        let loaded = load_config_from(&path).unwrap();

        assert_eq!(loaded.database.url, "postgresql://testhost:5432/testdb");
        assert_eq!(loaded.defaults.user.as_deref(), Some("corp-42"));
    }

    #[test]
    fn defaults_section_is_optional() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("config.toml");
        std::fs::write(&path, "[database]\nurl = \"postgresql://h/db\"\n").unwrap();

        let loaded = load_config_from(&path).unwrap();
        assert!(loaded.defaults.user.is_none());
    }

    #[cfg(unix)]
    #[test]
    fn save_config_sets_permissions() {
        use std::os::unix::fs::PermissionsExt;

        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("config.toml");
        save_config_to(&path, &file("postgresql://h/db", None)).unwrap();

        let meta = std::fs::metadata(&path).unwrap();
        assert_eq!(meta.permissions().mode() & 0o777, 0o600);
    }

    #[test]
    fn cli_flags_override_everything() {
        let _lock = lock_env();
        unsafe { std::env::set_var("INDY_DATABASE_URL", "postgresql://env:5432/envdb") };
        unsafe { std::env::set_var("INDY_USER", "env-user") };

        let cfg = file("postgresql://file/db", Some("file-user"));
        let resolved = IndyConfig::resolve_with(
            Some("postgresql://cli:5432/clidb"),
            Some("cli-user"),
            Some(&cfg),
        );
        assert_eq!(resolved.db_config.database_url, "postgresql://cli:5432/clidb");
        assert_eq!(resolved.user().unwrap(), "cli-user");

        unsafe { std::env::remove_var("INDY_DATABASE_URL") };
        unsafe { std::env::remove_var("INDY_USER") };
    }

    #[test]
    fn env_overrides_config_file() {
        let _lock = lock_env();
        unsafe { std::env::set_var("INDY_DATABASE_URL", "postgresql://env:5432/envdb") };
        unsafe { std::env::set_var("INDY_USER", "env-user") };

        let cfg = file("postgresql://file/db", Some("file-user"));
        let resolved = IndyConfig::resolve_with(None, None, Some(&cfg));
        assert_eq!(resolved.db_config.database_url, "postgresql://env:5432/envdb");
        assert_eq!(resolved.user().unwrap(), "env-user");

        unsafe { std::env::remove_var("INDY_DATABASE_URL") };
        unsafe { std::env::remove_var("INDY_USER") };
    }

    #[test]
    fn config_file_then_default() {
        let _lock = lock_env();
        unsafe { std::env::remove_var("INDY_DATABASE_URL") };
        unsafe { std::env::remove_var("INDY_USER") };

        let cfg = file("postgresql://file/db", Some("file-user"));
        let resolved = IndyConfig::resolve_with(None, None, Some(&cfg));
        assert_eq!(resolved.db_config.database_url, "postgresql://file/db");
        assert_eq!(resolved.user().unwrap(), "file-user");

        let bare = IndyConfig::resolve_with(None, None, None);
        assert_eq!(bare.db_config.database_url, DbConfig::DEFAULT_URL);
        let err = bare.user().unwrap_err().to_string();
        assert!(err.contains("no user key"), "unexpected error: {err}");
    }

    #[test]
    fn blank_user_counts_as_unset() {
        let _lock = lock_env();
        unsafe { std::env::remove_var("INDY_USER") };

        let resolved = IndyConfig::resolve_with(None, Some("   "), None);
        assert!(resolved.user().is_err());
    }

    #[test]
    fn config_path_ends_with_expected_filename() {
        let path = config_path();
        assert!(
            path.ends_with("indy/config.toml"),
            "unexpected config path: {}",
            path.display()
        );
    }
}
