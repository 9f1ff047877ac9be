use std::env;

/// Database configuration.
///
/// Reads from the `INDY_DATABASE_URL` environment variable, falling back to
/// `postgresql://localhost:5432/indy` when unset.
#[derive(Debug, Clone)]
pub struct DbConfig {
    /// Full PostgreSQL connection URL.
    pub database_url: String,
}

impl DbConfig {
    /// The default connection URL used when no environment variable is set.
    pub const DEFAULT_URL: &str = "postgresql://localhost:5432/indy";

    /// Build a config from the environment.
    ///
    /// Priority: `INDY_DATABASE_URL` env var, then the compile-time default.
    pub fn from_env() -> Self {
        let database_url = env::var("INDY_DATABASE_URL")
            .unwrap_or_else(|_| Self::DEFAULT_URL.to_owned());
        Self { database_url }
    }

    /// Build a config from an explicit URL (useful for tests and CLI flags).
    pub fn new(database_url: impl Into<String>) -> Self {
        Self {
            database_url: database_url.into(),
        }
    }

    /// Extract the database name from the URL.
    ///
    /// Returns `None` if the URL cannot be parsed or has no path component.
    /// A trailing `?query` (e.g. `sslmode=require`) is not part of the name.
    pub fn database_name(&self) -> Option<&str> {
        // URLs look like: postgresql://host:port/dbname[?params]
        let (base, _) = self.split_query();
        base.rsplit('/').next().filter(|s| !s.is_empty())
    }

    /// Return a URL pointing at the `postgres` maintenance database on the
    /// same host. Used to issue `CREATE DATABASE` when the target DB does not
    /// yet exist. Connection parameters are carried over.
    pub fn maintenance_url(&self) -> String {
        let (base, query) = self.split_query();
        match base.rfind('/') {
            Some(pos) => {
                let mut url = base[..pos].to_owned();
                url.push_str("/postgres");
                if let Some(q) = query {
                    url.push('?');
                    url.push_str(q);
                }
                url
            }
            None => self.database_url.clone(),
        }
    }

    fn split_query(&self) -> (&str, Option<&str>) {
        match self.database_url.split_once('?') {
            Some((base, query)) => (base, Some(query)),
            None => (self.database_url.as_str(), None),
        }
    }
}

impl Default for DbConfig {
    fn default() -> Self {
        Self::from_env()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_url() {
        let cfg = DbConfig::new(DbConfig::DEFAULT_URL);
        assert_eq!(cfg.database_url, "postgresql://localhost:5432/indy");
    }

    #[test]
    fn database_name_extraction() {
        let cfg = DbConfig::new("postgresql://localhost:5432/mydb");
        assert_eq!(cfg.database_name(), Some("mydb"));
    }

    #[test]
    fn database_name_ignores_query_string() {
        let cfg = DbConfig::new("postgresql://user:pw@db:5432/indy_prod?sslmode=require");
        assert_eq!(cfg.database_name(), Some("indy_prod"));
    }

    #[test]
    fn maintenance_url_replaces_db() {
        let cfg = DbConfig::new("postgresql://localhost:5432/indy");
        assert_eq!(cfg.maintenance_url(), "postgresql://localhost:5432/postgres");
    }

    #[test]
    fn maintenance_url_keeps_query_string() {
        let cfg = DbConfig::new("postgresql://db:5432/indy?sslmode=require");
        assert_eq!(
            cfg.maintenance_url(),
            "postgresql://db:5432/postgres?sslmode=require"
        );
    }
}
