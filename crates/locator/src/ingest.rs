use std::collections::HashMap;

use indexmap::IndexMap;
use model::{
    document::{Document, LOCATION_KEY},
    raw::RawRecord,
};
use schemars::JsonSchema;
use serde::Serialize;

use crate::{
    database::{BulkWriteResult, ConditionalWrite, DatabaseError, StationFilter, StationRepo},
    diff::diff,
    mapper::{try_map_to_station, NormalizationMode},
    normalize::NormalizationError,
    parser::{self, SourceFormat, UnsupportedFormatError},
};

/// Outcome of one ingested batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, JsonSchema)]
pub struct ImportReport {
    /// writes that created a new station
    pub inserted_count: u64,
    /// writes that changed an existing station
    pub updated_count: u64,
    /// records stored with the corruption marker
    pub corrupted_count: u64,
    /// distinct station codes a write was staged for
    pub total_considered_count: u64,
}

#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error(transparent)]
    UnsupportedFormat(#[from] UnsupportedFormatError),
    #[error(transparent)]
    Normalization(#[from] NormalizationError),
    /// The bulk write did not commit; nothing of the batch was stored.
    #[error("bulk write failed ({corrupted_count} corrupted records in batch): {source}")]
    Write {
        corrupted_count: u64,
        #[source]
        source: DatabaseError,
    },
    #[error(transparent)]
    Store(#[from] DatabaseError),
}

pub type Result<T> = std::result::Result<T, IngestError>;

/// Parses `data` in the format named by `hint` and ingests the records. The
/// hint is resolved before the store is touched.
pub async fn ingest<R>(
    repo: &mut R,
    hint: &str,
    data: &[u8],
    mode: NormalizationMode,
) -> Result<ImportReport>
where
    R: StationRepo + Send,
{
    let format = SourceFormat::from_hint(hint)?;
    ingest_format(repo, format, data, mode).await
}

pub async fn ingest_format<R>(
    repo: &mut R,
    format: SourceFormat,
    data: &[u8],
    mode: NormalizationMode,
) -> Result<ImportReport>
where
    R: StationRepo + Send,
{
    let records = parser::parse(format, data)?;
    ingest_records(repo, &records, mode).await
}

/// Maps, deduplicates and upserts `records` as one bulk write keyed by
/// station code.
///
/// Only changed fields are written. Records repeating a station code within
/// the batch are diffed against the stored document with the earlier staged
/// changes applied, and merge into the same write.
pub async fn ingest_records<R>(
    repo: &mut R,
    records: &[RawRecord],
    mode: NormalizationMode,
) -> Result<ImportReport>
where
    R: StationRepo + Send,
{
    // strict mode fails here, before any store access
    let stations = records
        .iter()
        .map(|record| try_map_to_station(record, mode))
        .collect::<std::result::Result<Vec<_>, _>>()?;

    let mut corrupted_count = 0;
    // stored document per station code, with staged changes applied
    let mut known: HashMap<i64, Option<Document>> = HashMap::new();
    let mut staged: IndexMap<i64, ConditionalWrite> = IndexMap::new();

    for station in stations {
        if station.content.is_corrupted() {
            corrupted_count += 1;
        }

        let code = station.content.station_code;
        if !known.contains_key(&code) {
            let stored = repo.find_one(&StationFilter::by_station_code(code)).await?;
            known.insert(code, stored);
        }
        let current = known.entry(code).or_default();

        let changes = diff(&station.content, current.as_ref());
        if changes.is_empty() {
            continue;
        }

        match current.as_mut() {
            Some(document) => document.extend(changes.clone()),
            None => *current = Some(changes.clone()),
        }
        staged
            .entry(code)
            .and_modify(|write| write.fields.extend(changes.clone()))
            .or_insert_with(|| ConditionalWrite::new(code, station.id, changes));
    }

    let writes = staged.into_values().collect::<Vec<_>>();
    let result = if writes.is_empty() {
        BulkWriteResult::default()
    } else {
        repo.bulk_conditional_write(&writes)
            .await
            .map_err(|source| {
                log::warn!("bulk write of {} stations failed: {}", writes.len(), source);
                IngestError::Write {
                    corrupted_count,
                    source,
                }
            })?
    };
    repo.ensure_geo_index(LOCATION_KEY).await?;

    let report = ImportReport {
        inserted_count: result.inserted_count,
        updated_count: result.modified_count,
        corrupted_count,
        total_considered_count: writes.len() as u64,
    };
    log::info!(
        "ingested {} records: {} new, {} updated, {} corrupted, {} considered",
        records.len(),
        report.inserted_count,
        report.updated_count,
        report.corrupted_count,
        report.total_considered_count
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryDatabase;
    use model::{
        document::{FieldValue, ID_KEY},
        station::Station,
        WithId,
    };
    use rstest::{fixture, rstest};
    use utility::id::Id;

    const STATIONS_JSON: &str = r#"[
        {"id": "1", "station_code": "1001", "name": "กรุงเทพ", "en_name": "Bangkok",
         "lat": "13.7466", "long": "100.5393", "active": "1"},
        {"id": "2", "station_code": "1002", "name": "บางซื่อ", "en_name": "Bang Sue",
         "lat": "13.8022", "long": "100.5399", "active": "1"},
        {"id": "3", "station_code": "1003", "name": "เชียงใหม่", "en_name": "Chiang Mai",
         "lat": "18.7840", "long": "98.9990", "active": "0"}
    ]"#;

    #[fixture]
    fn store() -> MemoryDatabase {
        MemoryDatabase::new()
    }

    fn stored(store: &MemoryDatabase, code: i64) -> Document {
        store
            .documents()
            .into_iter()
            .find(|document| document.get("station_code") == Some(&FieldValue::Int(code)))
            .unwrap()
    }

    async fn ingest_json(store: &MemoryDatabase, data: &str) -> Result<ImportReport> {
        let mut repo = store.clone();
        ingest(&mut repo, "json", data.as_bytes(), NormalizationMode::Lenient).await
    }

    #[rstest]
    #[tokio::test]
    async fn reingesting_the_same_source_is_a_no_op(store: MemoryDatabase) {
        let first = ingest_json(&store, STATIONS_JSON).await.unwrap();
        assert_eq!(
            first,
            ImportReport {
                inserted_count: 3,
                updated_count: 0,
                corrupted_count: 0,
                total_considered_count: 3,
            }
        );
        let ids = store
            .documents()
            .iter()
            .map(|document| document.get(ID_KEY).cloned())
            .collect::<Vec<_>>();

        let second = ingest_json(&store, STATIONS_JSON).await.unwrap();
        assert_eq!(second, ImportReport::default());
        let ids_after = store
            .documents()
            .iter()
            .map(|document| document.get(ID_KEY).cloned())
            .collect::<Vec<_>>();
        assert_eq!(ids, ids_after);
    }

    #[rstest]
    #[tokio::test]
    async fn repeated_codes_in_a_batch_merge_into_one_write(store: MemoryDatabase) {
        let data = r#"[
            {"station_code": 101, "name": "Old", "lat": 13.0, "long": 100.0},
            {"station_code": 102, "name": "Other", "lat": 14.0, "long": 100.0},
            {"station_code": 101, "name": "New", "lat": 13.0, "long": 100.0}
        ]"#;
        let report = ingest_json(&store, data).await.unwrap();
        assert_eq!(report.inserted_count, 2);
        assert_eq!(report.updated_count, 0);
        assert_eq!(report.total_considered_count, 2);
        assert_eq!(store.documents().len(), 2);
        assert_eq!(stored(&store, 101).get("name"), Some(&FieldValue::from("New")));
    }

    #[rstest]
    #[tokio::test]
    async fn identical_repeat_in_a_batch_stages_nothing_more(store: MemoryDatabase) {
        let data = r#"[
            {"station_code": 101, "name": "Same"},
            {"station_code": 101, "name": "Same"}
        ]"#;
        let report = ingest_json(&store, data).await.unwrap();
        assert_eq!(report.inserted_count, 1);
        assert_eq!(report.total_considered_count, 1);
    }

    #[rstest]
    #[tokio::test]
    async fn changed_station_is_updated_in_place(store: MemoryDatabase) {
        ingest_json(&store, STATIONS_JSON).await.unwrap();
        let id = stored(&store, 1002).get(ID_KEY).cloned();

        let data = r#"[{"id": "2", "station_code": "1002", "name": "กรุงเทพอภิวัฒน์",
            "en_name": "Krung Thep Aphiwat", "lat": "13.8022", "long": "100.5399",
            "active": "1"}]"#;
        let report = ingest_json(&store, data).await.unwrap();
        assert_eq!(report.inserted_count, 0);
        assert_eq!(report.updated_count, 1);
        assert_eq!(report.total_considered_count, 1);

        let document = stored(&store, 1002);
        assert_eq!(document.get(ID_KEY).cloned(), id);
        assert_eq!(
            document.get("en_name"),
            Some(&FieldValue::from("Krung Thep Aphiwat"))
        );
    }

    #[tokio::test]
    async fn existing_station_keeps_its_id() {
        let mut repo = MemoryDatabase::with_stations([WithId::new(
            Id::new("legacy-id".to_owned()),
            Station {
                station_code: 1001,
                name: "Hua Lamphong".to_owned(),
                ..Default::default()
            },
        )]);
        let report = ingest(
            &mut repo,
            "json",
            br#"[{"station_code": 1001, "name": "Krung Thep"}]"#,
            NormalizationMode::Lenient,
        )
        .await
        .unwrap();
        assert_eq!(report.updated_count, 1);
        assert_eq!(
            stored(&repo, 1001).get(ID_KEY),
            Some(&FieldValue::from("legacy-id"))
        );
    }

    #[rstest]
    #[tokio::test]
    async fn out_of_range_coordinates_are_stored_corrupted(store: MemoryDatabase) {
        let mut repo = store.clone();
        let data = "station_code,name,lat,long\n7001,Nowhere,999,100.5\n7002,Fine,13.5,100.5\n";
        let report = ingest(&mut repo, "stations.csv", data.as_bytes(), NormalizationMode::Lenient)
            .await
            .unwrap();
        assert_eq!(report.corrupted_count, 1);
        assert_eq!(report.inserted_count, 2);

        let document = stored(&store, 7001);
        assert_eq!(document.get("lat"), Some(&FieldValue::Float(0.0)));
        assert_eq!(document.get("long"), Some(&FieldValue::Float(100.5)));
        let comment = document.get("comment").and_then(FieldValue::as_text);
        assert_eq!(comment, Some("[corrupted]"));
    }

    #[rstest]
    #[tokio::test]
    async fn spreadsheet_upload_is_ingested_like_any_source(store: MemoryDatabase) {
        let mut workbook = rust_xlsxwriter::Workbook::new();
        let sheet = workbook.add_worksheet();
        for (col, header) in ["station_code", "name", "lat", "long", "active"].iter().enumerate() {
            sheet.write_string(0, col as u16, *header).unwrap();
        }
        sheet.write_number(1, 0, 1001).unwrap();
        sheet.write_string(1, 1, "Bangkok").unwrap();
        sheet.write_number(1, 2, 13.7466).unwrap();
        sheet.write_number(1, 3, 100.5393).unwrap();
        sheet.write_number(1, 4, 1).unwrap();
        let data = workbook.save_to_buffer().unwrap();

        let mut repo = store.clone();
        let report = ingest(&mut repo, "stations.xlsx", &data, NormalizationMode::Lenient)
            .await
            .unwrap();
        assert_eq!(report.inserted_count, 1);
        assert_eq!(report.corrupted_count, 0);

        let document = stored(&store, 1001);
        assert_eq!(document.get("name"), Some(&FieldValue::from("Bangkok")));
        assert_eq!(document.get("lat"), Some(&FieldValue::Float(13.7466)));
        assert_eq!(document.get("active"), Some(&FieldValue::Int(1)));

        let again = ingest(&mut repo, "stations.xlsx", &data, NormalizationMode::Lenient)
            .await
            .unwrap();
        assert_eq!(again, ImportReport::default());
    }

    #[rstest]
    #[tokio::test]
    async fn unsupported_format_never_touches_the_store(store: MemoryDatabase) {
        let mut repo = store.clone();
        let result = ingest(&mut repo, "stations.pdf", b"%PDF-1.7", NormalizationMode::Lenient).await;
        assert!(matches!(result, Err(IngestError::UnsupportedFormat(_))));
        assert_eq!(store.operations(), 0);
    }

    #[rstest]
    #[tokio::test]
    async fn parse_failure_never_touches_the_store(store: MemoryDatabase) {
        let result = ingest_json(&store, "[{\"station_code\": 1").await;
        assert!(matches!(result, Err(IngestError::Normalization(_))));
        assert_eq!(store.operations(), 0);
    }

    #[rstest]
    #[tokio::test]
    async fn strict_mode_aborts_on_bad_value(store: MemoryDatabase) {
        let mut repo = store.clone();
        let result = ingest(
            &mut repo,
            "json",
            br#"[{"station_code": 1}, {"station_code": "abc"}]"#,
            NormalizationMode::Strict,
        )
        .await;
        assert!(matches!(
            result,
            Err(IngestError::Normalization(NormalizationError::Field { .. }))
        ));
        assert_eq!(store.operations(), 0);
    }

    #[rstest]
    #[tokio::test]
    async fn failed_write_reports_corrupted_count_and_stores_nothing(store: MemoryDatabase) {
        store.fail_bulk_writes(true);
        let data = r#"[{"station_code": 1, "lat": 999}, {"station_code": 2}]"#;
        match ingest_json(&store, data).await {
            Err(IngestError::Write {
                corrupted_count, ..
            }) => assert_eq!(corrupted_count, 1),
            other => panic!("unexpected {other:?}"),
        }
        assert!(store.documents().is_empty());
        assert!(!store.has_geo_index(LOCATION_KEY));
    }

    #[rstest]
    #[tokio::test]
    async fn geo_index_is_ensured_after_every_batch(store: MemoryDatabase) {
        ingest_json(&store, "[]").await.unwrap();
        assert!(store.has_geo_index(LOCATION_KEY));
    }
}
