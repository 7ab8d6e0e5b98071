use std::{env, error::Error, time::Duration};

use async_trait::async_trait;
use locator::database::{
    BulkWriteResult, ConditionalWrite, Database, DatabaseError, Result, StationFilter, StationRepo,
};
use model::{document::Document, station::Station, WithId};
use queries::{station, POOL_ACQUIRE_TIMEOUT_SECS};
use sqlx::postgres::PgPoolOptions;

pub mod data_model;
pub mod queries;

pub struct DatabaseConnectionInfo {
    pub username: String,
    pub password: String,
    pub hostname: String,
    pub port: u16,
    pub database: String,
}

impl DatabaseConnectionInfo {
    pub fn from_env() -> Option<Self> {
        let username = env::var("DATABASE_USER").ok()?;
        let password = env::var("DATABASE_PASSWORD").ok()?;
        let hostname = env::var("DATABASE_HOST").ok()?;
        let port: u16 = env::var("DATABASE_PORT").ok()?.parse().ok()?;
        let database = env::var("DATABASE_NAME").ok()?;
        Some(Self {
            username,
            password,
            hostname,
            port,
            database,
        })
    }

    /// `DATABASE_URL` if set, else the url assembled from the parts.
    pub fn url_from_env() -> Option<String> {
        env::var("DATABASE_URL")
            .ok()
            .or_else(|| Self::from_env().map(Self::postgres_url))
    }

    pub(self) fn postgres_url(self) -> String {
        format!(
            "postgres://{}:{}@{}:{}/{}",
            self.username, self.password, self.hostname, self.port, self.database
        )
    }
}

#[derive(Clone)]
pub struct PgDatabase {
    connection: sqlx::PgPool,
}

pub struct PgDatabaseAutocommit {
    pool: sqlx::PgPool,
}

impl PgDatabase {
    pub async fn connect(url: &str) -> std::result::Result<Self, Box<dyn Error>> {
        let pool = PgPoolOptions::new()
            .acquire_timeout(Duration::from_secs(POOL_ACQUIRE_TIMEOUT_SECS))
            .connect(url)
            .await?;

        sqlx::migrate!("./migrations").run(&pool).await?;
        log::info!("connected to database, migrations applied");

        Ok(Self { connection: pool })
    }

    /// Waits for checked out connections and closes the pool.
    pub async fn close(&self) {
        self.connection.close().await;
    }
}

impl Database for PgDatabase {
    type Autocommit = PgDatabaseAutocommit;

    fn auto(&self) -> Self::Autocommit {
        PgDatabaseAutocommit {
            pool: self.connection.clone(),
        }
    }
}

#[async_trait]
impl StationRepo for PgDatabaseAutocommit {
    async fn find_by_filter(
        &mut self,
        filter: &StationFilter,
        limit: usize,
        skip: usize,
    ) -> Result<Vec<WithId<Station>>> {
        station::find_by_filter(&self.pool, filter, limit, skip).await
    }

    async fn find_nearest(
        &mut self,
        latitude: f64,
        longitude: f64,
        filter: &StationFilter,
        limit: usize,
        skip: usize,
    ) -> Result<Vec<WithId<Station>>> {
        if !station::has_geo_index(&self.pool).await? {
            return Err(DatabaseError::Unsupported(format!(
                "nearest query without index `{}`",
                station::GEO_INDEX
            )));
        }
        station::find_nearest(&self.pool, latitude, longitude, filter, limit, skip).await
    }

    async fn find_one(&mut self, filter: &StationFilter) -> Result<Option<Document>> {
        station::find_one(&self.pool, filter).await
    }

    async fn bulk_conditional_write(
        &mut self,
        writes: &[ConditionalWrite],
    ) -> Result<BulkWriteResult> {
        station::bulk_conditional_write(&self.pool, writes).await
    }

    async fn count(&mut self, filter: &StationFilter) -> Result<u64> {
        station::count(&self.pool, filter).await
    }

    async fn ensure_geo_index(&mut self, field: &str) -> Result<()> {
        station::ensure_geo_index(&self.pool, field).await
    }
}
