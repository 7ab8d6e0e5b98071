use std::{error, result, time::Duration};

use async_trait::async_trait;
use model::{document::Document, station::Station, WithId};
use utility::{geo::BoundingBox, id::Id};

#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("not found")]
    NotFound,
    #[error("store operation exceeded its deadline of {0:?}")]
    Timeout(Duration),
    #[error("unsupported store operation: {0}")]
    Unsupported(String),
    #[error(transparent)]
    Other(Box<dyn error::Error + Send + Sync>),
}

impl DatabaseError {
    pub fn other<T: error::Error + Send + Sync + 'static>(why: T) -> Self {
        Self::Other(Box::new(why))
    }
}

pub type Result<T> = result::Result<T, DatabaseError>;

/// Conjunction of equality and range predicates over stored stations. Unset
/// parts match everything.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StationFilter {
    pub active: Option<i64>,
    pub station_code: Option<i64>,
    pub within: Option<BoundingBox>,
}

impl StationFilter {
    pub fn active() -> Self {
        Self {
            active: Some(1),
            ..Default::default()
        }
    }

    pub fn by_station_code(station_code: i64) -> Self {
        Self {
            station_code: Some(station_code),
            ..Default::default()
        }
    }

    pub fn within(mut self, bbox: BoundingBox) -> Self {
        self.within = Some(bbox);
        self
    }

    pub fn matches(&self, station: &Station) -> bool {
        self.active.map_or(true, |active| station.active == active)
            && self
                .station_code
                .map_or(true, |code| station.station_code == code)
            && self
                .within
                .map_or(true, |bbox| bbox.contains(station.lat, station.long))
    }
}

/// One upsert of a bulk write: filter on `station_code`, set `fields`, and
/// insert a new document with `insert_id` when none matches. The id is never
/// written to an existing document.
#[derive(Debug, Clone, PartialEq)]
pub struct ConditionalWrite {
    pub station_code: i64,
    pub insert_id: Id<Station>,
    pub fields: Document,
}

impl ConditionalWrite {
    pub fn new(station_code: i64, insert_id: Id<Station>, fields: Document) -> Self {
        Self {
            station_code,
            insert_id,
            fields,
        }
    }
}

/// Counters reported by the store for a bulk write.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BulkWriteResult {
    /// upserts that created a new document
    pub inserted_count: u64,
    /// upserts that changed an existing document
    pub modified_count: u64,
}

/// The store capability consumed by search and ingestion.
#[async_trait]
pub trait StationRepo {
    /// Stations matching `filter`, in a store defined but deterministic order.
    async fn find_by_filter(
        &mut self,
        filter: &StationFilter,
        limit: usize,
        skip: usize,
    ) -> Result<Vec<WithId<Station>>>;

    /// Stations matching `filter`, nearest to the given point first. Requires
    /// a geospatial index.
    async fn find_nearest(
        &mut self,
        latitude: f64,
        longitude: f64,
        filter: &StationFilter,
        limit: usize,
        skip: usize,
    ) -> Result<Vec<WithId<Station>>>;

    /// The stored document, with every field the store holds for it.
    async fn find_one(&mut self, filter: &StationFilter) -> Result<Option<Document>>;

    /// Executes all writes as a single operation, in order. Either all of them
    /// are applied or none.
    async fn bulk_conditional_write(
        &mut self,
        writes: &[ConditionalWrite],
    ) -> Result<BulkWriteResult>;

    async fn count(&mut self, filter: &StationFilter) -> Result<u64>;

    /// Creates a geospatial index on `field` unless it already exists.
    async fn ensure_geo_index(&mut self, field: &str) -> Result<()>;
}

/// A shared handle to a station store. Cloning is cheap and every request
/// gets its own repo from [`Database::auto`].
pub trait Database: Clone + Send + Sync + Sized + 'static {
    type Autocommit: StationRepo + Send;

    fn auto(&self) -> Self::Autocommit;
}
