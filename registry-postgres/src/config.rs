//! Pool configuration and the libpq-style DSN renderer (§6).
//!
//! Mirrors `PostgresConfig` in `portfolio_postgres-s3/src/metadata/postgres.rs`,
//! generalized from a single `connection_string` field to the enumerated
//! options §4.2/§6 call for: individually settable connection fields plus
//! pool sizing, rendered to the space-separated `key=value` libpq form
//! rather than taken as an opaque string.

use std::time::Duration;

use serde::Deserialize;
use sqlx::postgres::PgPoolOptions;

use registry_core::Result;

use crate::conn::PgMetadataPool;

/// Connection parameters rendered into a libpq DSN (§6) plus the pool
/// sizing options from §4.2 (`max-open-conns`, `max-idle-conns`,
/// `max-connection-lifetime`).
#[derive(Clone, Debug, Deserialize)]
pub struct PostgresConfig {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub user: Option<String>,
    pub password: Option<String>,
    pub dbname: Option<String>,
    pub sslmode: Option<String>,
    pub sslcert: Option<String>,
    pub sslkey: Option<String>,
    pub sslrootcert: Option<String>,
    pub connect_timeout: Option<u64>,

    #[serde(default = "default_max_open_conns")]
    pub max_open_conns: u32,
    #[serde(default)]
    pub max_idle_conns: Option<u32>,
    #[serde(default)]
    pub max_connection_lifetime_secs: Option<u64>,
}

fn default_max_open_conns() -> u32 {
    10
}

impl Default for PostgresConfig {
    fn default() -> Self {
        Self {
            host: None,
            port: None,
            user: None,
            password: None,
            dbname: None,
            sslmode: None,
            sslcert: None,
            sslkey: None,
            sslrootcert: None,
            connect_timeout: None,
            max_open_conns: default_max_open_conns(),
            max_idle_conns: None,
            max_connection_lifetime_secs: None,
        }
    }
}

impl PostgresConfig {
    /// Overlay values read from the `REGISTRY_DATABASE_{HOST,PORT,USER,
    /// PASSWORD,SSLMODE}` environment variables (§6) on top of whatever was
    /// loaded from the config file. Environment variables win.
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(v) = std::env::var("REGISTRY_DATABASE_HOST") {
            self.host = Some(v);
        }
        if let Ok(v) = std::env::var("REGISTRY_DATABASE_PORT") {
            if let Ok(port) = v.parse() {
                self.port = Some(port);
            }
        }
        if let Ok(v) = std::env::var("REGISTRY_DATABASE_USER") {
            self.user = Some(v);
        }
        if let Ok(v) = std::env::var("REGISTRY_DATABASE_PASSWORD") {
            self.password = Some(v);
        }
        if let Ok(v) = std::env::var("REGISTRY_DATABASE_SSLMODE") {
            self.sslmode = Some(v);
        }
        self
    }

    /// Render the space-separated `key=value` libpq form (§6). Empty
    /// values are omitted entirely -- an empty `port` means "omit", not
    /// "zero" -- and single quotes and spaces in values are
    /// backslash-escaped.
    pub fn to_dsn(&self) -> String {
        let mut parts = Vec::new();

        let mut push = |key: &str, value: &Option<String>| {
            if let Some(v) = value {
                if !v.is_empty() {
                    parts.push(format!("{key}={}", escape_dsn_value(v)));
                }
            }
        };

        push("host", &self.host);
        push("port", &self.port.map(|p| p.to_string()));
        push("user", &self.user);
        push("password", &self.password);
        push("dbname", &self.dbname);
        push("sslmode", &self.sslmode);
        push("sslcert", &self.sslcert);
        push("sslkey", &self.sslkey);
        push("sslrootcert", &self.sslrootcert);
        push("connect_timeout", &self.connect_timeout.map(|t| t.to_string()));

        parts.join(" ")
    }

    pub async fn new_metadata(&self) -> Result<PgMetadataPool> {
        let mut opts = PgPoolOptions::new().max_connections(self.max_open_conns);
        if let Some(idle) = self.max_idle_conns {
            opts = opts.min_connections(idle);
        }
        if let Some(secs) = self.max_connection_lifetime_secs {
            opts = opts.max_lifetime(Some(Duration::from_secs(secs)));
        }

        let pool = opts.connect(&self.to_dsn()).await?;
        Ok(PgMetadataPool::from_pool(pool))
    }
}

fn escape_dsn_value(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        if c == '\'' || c == '\\' || c == ' ' {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

#[cfg(test)]
mod test {
    use rstest::*;

    use super::*;

    #[test]
    fn renders_empty_dsn_for_default_config() {
        assert_eq!(PostgresConfig::default().to_dsn(), "");
    }

    #[rstest]
    #[case::plain("jw8s0F4", "jw8s0F4")]
    #[case::space("jw8s 0F4", "jw8s\\ 0F4")]
    #[case::quote("jw8s'0F4", "jw8s\\'0F4")]
    fn escapes_password(#[case] input: &str, #[case] expected: &str) {
        assert_eq!(escape_dsn_value(input), expected);
    }

    #[test]
    fn renders_full_dsn() {
        let cfg = PostgresConfig {
            host: Some("127.0.0.1".to_string()),
            port: Some(5432),
            user: Some("registry".to_string()),
            password: Some("jw8s 0F4".to_string()),
            ..Default::default()
        };
        assert_eq!(
            cfg.to_dsn(),
            "host=127.0.0.1 port=5432 user=registry password=jw8s\\ 0F4"
        );
    }

    #[test]
    fn omits_zero_port_when_unset() {
        let cfg = PostgresConfig {
            host: Some("localhost".to_string()),
            ..Default::default()
        };
        assert_eq!(cfg.to_dsn(), "host=localhost");
    }
}
