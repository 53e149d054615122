use std::time::Duration;
use async_trait::async_trait;
use sqlx::{Pool, Postgres};
use tracing::info;
use crate::{config::DatabaseSettings, error::{ProvisionError, ProvisionResult}, resources::validate_name};

/// Creates one relational database per tenant.
#[async_trait]
pub trait DatabaseProvisioner: Send + Sync + 'static {
    async fn create_database(&self, tenant: &str) -> ProvisionResult<()>;
}

/// `acme-corp` -> `acme_corp_db`. Only valid tenant names reach this.
pub fn database_name(tenant: &str) -> String { format!("{}_db", tenant.replace('-', "_")) }

#[derive(Debug, Clone)]
pub struct PgDatabaseProvisioner { pool: Pool<Postgres> }

impl PgDatabaseProvisioner {
    /// Lazily connects to the `postgres` maintenance database.
    pub fn connect_lazy(settings: &DatabaseSettings) -> ProvisionResult<Self> {
        let pool = sqlx::postgres::PgPoolOptions::new()
            .max_connections(2)
            .acquire_timeout(Duration::from_secs(3))
            .connect_lazy(&settings.admin_url())
            .map_err(|e| ProvisionError::Database { tenant: "-".into(), cause: e.to_string() })?;
        Ok(Self { pool })
    }
}

#[async_trait]
impl DatabaseProvisioner for PgDatabaseProvisioner {
    async fn create_database(&self, tenant: &str) -> ProvisionResult<()> {
        validate_name(tenant)?;
        let db = database_name(tenant);
        // Identifiers cannot be bound; the name is a validated label so quoting is enough.
        match sqlx::query(&format!("CREATE DATABASE \"{db}\"")).execute(&self.pool).await {
            Ok(_) => { info!(%tenant, database=%db, "tenant database created"); Ok(()) }
            Err(sqlx::Error::Database(e)) if e.code().as_deref() == Some("42P04") => {
                info!(%tenant, database=%db, "tenant database already exists");
                Ok(())
            }
            Err(e) => Err(ProvisionError::Database { tenant: tenant.into(), cause: e.to_string() }),
        }
    }
}
