use locator::database::{
    BulkWriteResult, ConditionalWrite, DatabaseError, Result, StationFilter,
};
use model::{
    document::{Document, FieldValue, ID_KEY, LOCATION_KEY},
    station::{Station, StationField},
    WithId,
};
use sqlx::{types::Json, Executor, PgPool, Postgres, QueryBuilder};
use utility::let_also::LetAlso;

use crate::data_model::station::StationRow;

use super::convert_error;

const COLUMNS: &str = r#""_id", "id", "station_code", "name", "en_name", "th_short", "en_short", "chname", "controldivision", "exact_km", "exact_distance", "km", "class", "lat", "long", "active", "giveway", "dual_track", "comment", "location""#;

pub const GEO_INDEX: &str = "stations_location_earth";

// sql builders

fn bind_count(value: usize) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

fn quoted(column: &str) -> String {
    format!("\"{}\"", column)
}

fn is_column(key: &str) -> bool {
    key == LOCATION_KEY || StationField::from_key(key).is_some()
}

fn push_filter(builder: &mut QueryBuilder<'_, Postgres>, filter: &StationFilter) {
    let mut first = true;
    let mut condition = |builder: &mut QueryBuilder<'_, Postgres>| {
        builder.push(if std::mem::take(&mut first) {
            " WHERE "
        } else {
            " AND "
        });
    };

    if let Some(active) = filter.active {
        condition(builder);
        builder.push(r#""active" = "#).push_bind(active);
    }
    if let Some(station_code) = filter.station_code {
        condition(builder);
        builder.push(r#""station_code" = "#).push_bind(station_code);
    }
    if let Some(bbox) = filter.within {
        condition(builder);
        builder
            .push(r#""lat" BETWEEN "#)
            .push_bind(bbox.min_latitude)
            .push(" AND ")
            .push_bind(bbox.max_latitude);
        if !bbox.spans_all_longitudes() {
            condition(builder);
            builder
                .push(r#""long" BETWEEN "#)
                .push_bind(bbox.min_longitude)
                .push(" AND ")
                .push_bind(bbox.max_longitude);
        }
    }
}

fn push_value(builder: &mut QueryBuilder<'_, Postgres>, value: &FieldValue) {
    match value {
        FieldValue::Int(value) => builder.push_bind(*value),
        FieldValue::Float(value) => builder.push_bind(*value),
        FieldValue::Text(value) => builder.push_bind(value.clone()),
        FieldValue::Point(point) => builder.push_bind(Json(*point)),
    };
}

pub fn select_by_filter(
    filter: &StationFilter,
    limit: usize,
    skip: usize,
) -> QueryBuilder<'static, Postgres> {
    QueryBuilder::new(format!("SELECT {} FROM stations", COLUMNS)).also(|builder| {
        push_filter(builder, filter);
        builder
            .push(r#" ORDER BY "station_code", "_id" LIMIT "#)
            .push_bind(bind_count(limit))
            .push(" OFFSET ")
            .push_bind(bind_count(skip));
    })
}

pub fn select_nearest(
    latitude: f64,
    longitude: f64,
    filter: &StationFilter,
    limit: usize,
    skip: usize,
) -> QueryBuilder<'static, Postgres> {
    QueryBuilder::new(format!("SELECT {} FROM stations", COLUMNS)).also(|builder| {
        push_filter(builder, filter);
        builder
            .push(r#" ORDER BY ll_to_earth("lat", "long") <-> ll_to_earth("#)
            .push_bind(latitude)
            .push(", ")
            .push_bind(longitude)
            .push(r#"), "station_code", "_id" LIMIT "#)
            .push_bind(bind_count(limit))
            .push(" OFFSET ")
            .push_bind(bind_count(skip));
    })
}

pub fn count_by_filter(filter: &StationFilter) -> QueryBuilder<'static, Postgres> {
    QueryBuilder::new("SELECT COUNT(*) FROM stations").also(|builder| push_filter(builder, filter))
}

/// Upsert keyed on `station_code`. The id is only part of the inserted row,
/// and an update whose values equal the stored ones returns no row.
pub fn upsert(write: &ConditionalWrite) -> Result<QueryBuilder<'static, Postgres>> {
    let code_key = StationField::StationCode.key();
    let fields = write
        .fields
        .iter()
        .filter(|(key, _)| key.as_str() != ID_KEY && key.as_str() != code_key)
        .collect::<Vec<_>>();
    if let Some((key, _)) = fields.iter().find(|(key, _)| !is_column(key)) {
        return Err(DatabaseError::Unsupported(format!(
            "unknown station field `{}`",
            key
        )));
    }

    let mut builder = QueryBuilder::new(r#"INSERT INTO stations ("_id", "station_code""#);
    for (key, _) in &fields {
        builder.push(", ").push(quoted(key));
    }
    builder
        .push(") VALUES (")
        .push_bind(write.insert_id.raw())
        .push(", ")
        .push_bind(write.station_code);
    for (_, value) in &fields {
        builder.push(", ");
        push_value(&mut builder, value);
    }
    builder.push(r#") ON CONFLICT ("station_code") "#);

    if fields.is_empty() {
        builder.push("DO NOTHING");
    } else {
        let columns = fields.iter().map(|(key, _)| quoted(key)).collect::<Vec<_>>();
        let assignments = columns
            .iter()
            .map(|column| format!("{} = EXCLUDED.{}", column, column))
            .collect::<Vec<_>>();
        let stored = columns
            .iter()
            .map(|column| format!("stations.{}", column))
            .collect::<Vec<_>>();
        let excluded = columns
            .iter()
            .map(|column| format!("EXCLUDED.{}", column))
            .collect::<Vec<_>>();
        builder.push(format!(
            "DO UPDATE SET {} WHERE ({}) IS DISTINCT FROM ({})",
            assignments.join(", "),
            stored.join(", "),
            excluded.join(", ")
        ));
    }
    builder.push(" RETURNING (xmax = 0) AS inserted");
    Ok(builder)
}

// Repo

pub async fn find_by_filter<'c, E>(
    executor: E,
    filter: &StationFilter,
    limit: usize,
    skip: usize,
) -> Result<Vec<WithId<Station>>>
where
    E: Executor<'c, Database = Postgres>,
{
    select_by_filter(filter, limit, skip)
        .build_query_as::<StationRow>()
        .fetch_all(executor)
        .await
        .map_err(convert_error)?
        .let_owned(|rows| Ok(rows.into_iter().map(StationRow::to_model).collect()))
}

pub async fn find_nearest<'c, E>(
    executor: E,
    latitude: f64,
    longitude: f64,
    filter: &StationFilter,
    limit: usize,
    skip: usize,
) -> Result<Vec<WithId<Station>>>
where
    E: Executor<'c, Database = Postgres>,
{
    select_nearest(latitude, longitude, filter, limit, skip)
        .build_query_as::<StationRow>()
        .fetch_all(executor)
        .await
        .map_err(convert_error)?
        .let_owned(|rows| Ok(rows.into_iter().map(StationRow::to_model).collect()))
}

pub async fn find_one<'c, E>(executor: E, filter: &StationFilter) -> Result<Option<Document>>
where
    E: Executor<'c, Database = Postgres>,
{
    select_by_filter(filter, 1, 0)
        .build_query_as::<StationRow>()
        .fetch_optional(executor)
        .await
        .map_err(convert_error)
        .map(|row| row.map(StationRow::to_document))
}

pub async fn count<'c, E>(executor: E, filter: &StationFilter) -> Result<u64>
where
    E: Executor<'c, Database = Postgres>,
{
    count_by_filter(filter)
        .build_query_scalar::<i64>()
        .fetch_one(executor)
        .await
        .map_err(convert_error)
        .map(|count| u64::try_from(count).unwrap_or_default())
}

/// Runs all upserts in one transaction, in order.
pub async fn bulk_conditional_write(
    pool: &PgPool,
    writes: &[ConditionalWrite],
) -> Result<BulkWriteResult> {
    let statements = writes.iter().map(upsert).collect::<Result<Vec<_>>>()?;

    let mut tx = pool.begin().await.map_err(convert_error)?;
    let mut result = BulkWriteResult::default();
    for mut statement in statements {
        let inserted = statement
            .build_query_scalar::<bool>()
            .fetch_optional(&mut *tx)
            .await
            .map_err(convert_error)?;
        match inserted {
            Some(true) => result.inserted_count += 1,
            Some(false) => result.modified_count += 1,
            None => {}
        }
    }
    tx.commit().await.map_err(convert_error)?;
    Ok(result)
}

pub async fn has_geo_index<'c, E>(executor: E) -> Result<bool>
where
    E: Executor<'c, Database = Postgres>,
{
    sqlx::query_scalar::<_, bool>(
        "
        SELECT EXISTS (
            SELECT 1 FROM pg_indexes
            WHERE tablename = 'stations' AND indexname = $1
        );
        ",
    )
    .bind(GEO_INDEX)
    .fetch_one(executor)
    .await
    .map_err(convert_error)
}

pub async fn ensure_geo_index<'c, E>(executor: E, field: &str) -> Result<()>
where
    E: Executor<'c, Database = Postgres>,
{
    if field != LOCATION_KEY {
        return Err(DatabaseError::Unsupported(format!(
            "geospatial index on `{}`",
            field
        )));
    }
    sqlx::query(
        r#"
        CREATE INDEX IF NOT EXISTS stations_location_earth
        ON stations USING gist (ll_to_earth("lat", "long"));
        "#,
    )
    .execute(executor)
    .await
    .map_err(convert_error)
    .map(|_| ())
}
