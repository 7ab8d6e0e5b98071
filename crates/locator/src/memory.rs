//! In-memory station store used by unit tests and by dependents that enable
//! the `test-support` feature.
//!
//! Writes follow document store upsert semantics: ordered, all or nothing,
//! the id set on insert only, and an update counted as modified only when a
//! value actually changes. Queries scan linearly and are meant for small
//! fixtures.

use std::{
    collections::BTreeSet,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use async_trait::async_trait;
use model::{
    document::{Document, FieldValue, ID_KEY, LOCATION_KEY},
    station::{Station, StationField},
    WithId,
};
use utility::{geo::haversine_distance, id::Id};

use crate::database::{
    BulkWriteResult, ConditionalWrite, Database, DatabaseError, Result, StationFilter, StationRepo,
};

#[derive(Debug, thiserror::Error)]
#[error("bulk write rejected by the in-memory store")]
pub struct InjectedWriteFailure;

#[derive(Debug, Default)]
struct MemoryState {
    documents: Vec<Document>,
    geo_indexes: BTreeSet<String>,
    fail_bulk_writes: bool,
    operations: usize,
}

#[derive(Debug, Clone, Default)]
pub struct MemoryDatabase {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store holding the given stations, each under its own id.
    pub fn with_stations<I>(stations: I) -> Self
    where
        I: IntoIterator<Item = WithId<Station>>,
    {
        let database = Self::new();
        {
            let mut state = database.lock();
            state.documents = stations.into_iter().map(stored_document).collect();
        }
        database
    }

    /// Makes every following bulk write fail without touching the documents.
    pub fn fail_bulk_writes(&self, fail: bool) {
        self.lock().fail_bulk_writes = fail;
    }

    /// Number of repository calls served so far.
    pub fn operations(&self) -> usize {
        self.lock().operations
    }

    pub fn documents(&self) -> Vec<Document> {
        self.lock().documents.clone()
    }

    pub fn has_geo_index(&self, field: &str) -> bool {
        self.lock().geo_indexes.contains(field)
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Locks the state and counts the call as one repository operation.
    fn operation(&self) -> MutexGuard<'_, MemoryState> {
        let mut state = self.lock();
        state.operations += 1;
        state
    }
}

impl Database for MemoryDatabase {
    type Autocommit = MemoryDatabase;

    fn auto(&self) -> Self::Autocommit {
        self.clone()
    }
}

fn stored_document(station: WithId<Station>) -> Document {
    let mut document = Document::new();
    document.insert(ID_KEY.to_owned(), FieldValue::Text(station.id.into_inner()));
    document.extend(station.content.to_document());
    document
}

fn station_code(document: &Document) -> Option<i64> {
    document
        .get(StationField::StationCode.key())
        .and_then(FieldValue::as_int)
}

fn to_station(document: &Document) -> WithId<Station> {
    let id = document
        .get(ID_KEY)
        .and_then(FieldValue::as_text)
        .unwrap_or_default()
        .to_owned();
    WithId::new(Id::new(id), Station::from_document(document))
}

/// Matching stations in scan order: by station code, then id.
fn scan(documents: &[Document], filter: &StationFilter) -> Vec<WithId<Station>> {
    let mut stations = documents
        .iter()
        .map(to_station)
        .filter(|station| filter.matches(&station.content))
        .collect::<Vec<_>>();
    stations.sort_by(|left, right| {
        left.content
            .station_code
            .cmp(&right.content.station_code)
            .then_with(|| left.id.raw_ref::<str>().cmp(right.id.raw_ref::<str>()))
    });
    stations
}

#[async_trait]
impl StationRepo for MemoryDatabase {
    async fn find_by_filter(
        &mut self,
        filter: &StationFilter,
        limit: usize,
        skip: usize,
    ) -> Result<Vec<WithId<Station>>> {
        let state = self.operation();
        Ok(scan(&state.documents, filter)
            .into_iter()
            .skip(skip)
            .take(limit)
            .collect())
    }

    async fn find_nearest(
        &mut self,
        latitude: f64,
        longitude: f64,
        filter: &StationFilter,
        limit: usize,
        skip: usize,
    ) -> Result<Vec<WithId<Station>>> {
        let state = self.operation();
        if !state.geo_indexes.contains(LOCATION_KEY) {
            return Err(DatabaseError::Unsupported(
                "nearest query without a geospatial index on `location`".to_owned(),
            ));
        }
        let mut stations = scan(&state.documents, filter);
        let distance = |station: &WithId<Station>| {
            haversine_distance(latitude, longitude, station.content.lat, station.content.long)
        };
        stations.sort_by(|left, right| distance(left).total_cmp(&distance(right)));
        Ok(stations.into_iter().skip(skip).take(limit).collect())
    }

    async fn find_one(&mut self, filter: &StationFilter) -> Result<Option<Document>> {
        let state = self.operation();
        Ok(state
            .documents
            .iter()
            .find(|document| filter.matches(&Station::from_document(document)))
            .cloned())
    }

    async fn bulk_conditional_write(
        &mut self,
        writes: &[ConditionalWrite],
    ) -> Result<BulkWriteResult> {
        let mut state = self.operation();
        if state.fail_bulk_writes {
            return Err(DatabaseError::other(InjectedWriteFailure));
        }

        let mut documents = state.documents.clone();
        let mut result = BulkWriteResult::default();
        for write in writes {
            match documents
                .iter_mut()
                .find(|document| station_code(document) == Some(write.station_code))
            {
                Some(document) => {
                    let mut changed = false;
                    for (key, value) in &write.fields {
                        if key != ID_KEY && document.get(key) != Some(value) {
                            document.insert(key.clone(), value.clone());
                            changed = true;
                        }
                    }
                    if changed {
                        result.modified_count += 1;
                    }
                }
                None => {
                    let mut document = Document::new();
                    document.insert(
                        ID_KEY.to_owned(),
                        FieldValue::Text(write.insert_id.raw()),
                    );
                    document.insert(
                        StationField::StationCode.key().to_owned(),
                        FieldValue::Int(write.station_code),
                    );
                    document.extend(write.fields.clone());
                    documents.push(document);
                    result.inserted_count += 1;
                }
            }
        }
        state.documents = documents;
        Ok(result)
    }

    async fn count(&mut self, filter: &StationFilter) -> Result<u64> {
        let state = self.operation();
        Ok(scan(&state.documents, filter).len() as u64)
    }

    async fn ensure_geo_index(&mut self, field: &str) -> Result<()> {
        self.operation().geo_indexes.insert(field.to_owned());
        Ok(())
    }
}
