//! Upload-service database connection management, following
//! `gateway-payment::db::Database`'s shape: one `PgPool`, migrations loaded
//! via `include_str!` and run at startup.

use sqlx::PgPool;
use tracing::info;

#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    pub async fn connect(database_url: &str) -> Result<Self, sqlx::Error> {
        info!("connecting to upload_service database");
        let pool = PgPool::connect(database_url).await?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub async fn migrate(&self) -> Result<(), sqlx::Error> {
        info!("running upload_service migrations");
        sqlx::query(include_str!("../migrations/0001_upload_service.sql"))
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
