//! Backend selection: Postgres when a database is configured, otherwise the
//! in-memory store.

use std::sync::Arc;

use anyhow::Context;

use epitrack_core::BusinessCalendar;
use epitrack_infra::config::{AppConfig, DatabaseConfig};
use epitrack_infra::{InMemoryStore, LoanService, PostgresStore};

#[derive(Clone)]
pub struct AppServices {
    pub loans: LoanService,
    backend: &'static str,
}

impl AppServices {
    pub fn in_memory(calendar: BusinessCalendar) -> Self {
        Self {
            loans: LoanService::new(Arc::new(InMemoryStore::new()), calendar),
            backend: "in_memory",
        }
    }

    pub async fn postgres(db: &DatabaseConfig, calendar: BusinessCalendar) -> anyhow::Result<Self> {
        let store = PostgresStore::connect(&db.url, db.max_connections)
            .await
            .context("failed to connect to Postgres")?;
        Ok(Self {
            loans: LoanService::new(Arc::new(store), calendar),
            backend: "postgres",
        })
    }

    pub fn backend(&self) -> &'static str {
        self.backend
    }
}

pub async fn build_services(config: &AppConfig) -> anyhow::Result<AppServices> {
    match &config.database {
        Some(db) => AppServices::postgres(db, config.calendar).await,
        None => {
            tracing::warn!("DATABASE_URL not set; using the in-memory store (data is lost on exit)");
            Ok(AppServices::in_memory(config.calendar))
        }
    }
}
