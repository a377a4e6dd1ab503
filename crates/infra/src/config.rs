//! Process configuration, read from environment variables.
//!
//! # Environment Variables
//!
//! - `EPITRACK_BIND_ADDR`: listen address (default `0.0.0.0:8080`)
//! - `DATABASE_URL`: Postgres URL; when unset the in-memory backend is used
//! - `EPITRACK_DB_MAX_CONNECTIONS`: pool size (default 5)
//! - `EPITRACK_UTC_OFFSET_MINUTES`: business-date offset from UTC (default -180)
//! - `EPITRACK_LOG_FORMAT`: `json` or `pretty` (default `json`)

use std::net::SocketAddr;

use anyhow::{Context, Result};

use epitrack_core::BusinessCalendar;
use epitrack_core::calendar::DEFAULT_UTC_OFFSET_MINUTES;
use epitrack_observability::LogFormat;

pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8080";
pub const DEFAULT_MAX_CONNECTIONS: u32 = 5;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub bind_addr: SocketAddr,
    /// `None` selects the in-memory backend.
    pub database: Option<DatabaseConfig>,
    pub calendar: BusinessCalendar,
    pub log_format: LogFormat,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup. Blank values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let bind_addr = get("EPITRACK_BIND_ADDR")
            .unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string())
            .parse::<SocketAddr>()
            .context("EPITRACK_BIND_ADDR is not a valid socket address")?;

        let max_connections = match get("EPITRACK_DB_MAX_CONNECTIONS") {
            Some(raw) => raw
                .trim()
                .parse::<u32>()
                .context("EPITRACK_DB_MAX_CONNECTIONS must be a positive integer")?,
            None => DEFAULT_MAX_CONNECTIONS,
        };
        if max_connections == 0 {
            anyhow::bail!("EPITRACK_DB_MAX_CONNECTIONS must be at least 1");
        }

        let database = get("DATABASE_URL").map(|url| DatabaseConfig {
            url,
            max_connections,
        });

        let offset_minutes = match get("EPITRACK_UTC_OFFSET_MINUTES") {
            Some(raw) => raw
                .trim()
                .parse::<i32>()
                .context("EPITRACK_UTC_OFFSET_MINUTES must be an integer")?,
            None => DEFAULT_UTC_OFFSET_MINUTES,
        };
        let calendar = BusinessCalendar::from_offset_minutes(offset_minutes)
            .context("EPITRACK_UTC_OFFSET_MINUTES is out of range")?;

        let log_format = match get("EPITRACK_LOG_FORMAT") {
            Some(raw) => raw.parse::<LogFormat>().context("invalid EPITRACK_LOG_FORMAT")?,
            None => LogFormat::default(),
        };

        Ok(Self {
            bind_addr,
            database,
            calendar,
            log_format,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn from_pairs(pairs: &[(&str, &str)]) -> Result<AppConfig> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        AppConfig::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn defaults_select_in_memory_backend() {
        let cfg = from_pairs(&[]).unwrap();
        assert_eq!(cfg.bind_addr.to_string(), DEFAULT_BIND_ADDR);
        assert!(cfg.database.is_none());
        assert_eq!(cfg.calendar, BusinessCalendar::default());
        assert_eq!(cfg.log_format, LogFormat::Json);
    }

    #[test]
    fn database_url_enables_postgres() {
        let cfg = from_pairs(&[
            ("DATABASE_URL", "postgres://localhost/epitrack"),
            ("EPITRACK_DB_MAX_CONNECTIONS", "12"),
            ("EPITRACK_LOG_FORMAT", "pretty"),
            ("EPITRACK_UTC_OFFSET_MINUTES", "0"),
        ])
        .unwrap();
        let db = cfg.database.unwrap();
        assert_eq!(db.url, "postgres://localhost/epitrack");
        assert_eq!(db.max_connections, 12);
        assert_eq!(cfg.log_format, LogFormat::Pretty);
        assert_eq!(cfg.calendar, BusinessCalendar::utc());
    }

    #[test]
    fn blank_values_fall_back_to_defaults() {
        let cfg = from_pairs(&[("DATABASE_URL", "  "), ("EPITRACK_LOG_FORMAT", "")]).unwrap();
        assert!(cfg.database.is_none());
        assert_eq!(cfg.log_format, LogFormat::Json);
    }

    #[test]
    fn malformed_values_are_rejected() {
        assert!(from_pairs(&[("EPITRACK_BIND_ADDR", "nowhere")]).is_err());
        assert!(from_pairs(&[("EPITRACK_DB_MAX_CONNECTIONS", "0")]).is_err());
        assert!(from_pairs(&[("EPITRACK_UTC_OFFSET_MINUTES", "100000")]).is_err());
        assert!(from_pairs(&[("EPITRACK_LOG_FORMAT", "xml")]).is_err());
    }
}
