use std::{convert::Infallible, fmt, str::FromStr};

use model::{
    document::FieldValue,
    raw::RawRecord,
    station::{FieldKind, Station, StationField},
    WithId,
};
use utility::id::Id;
use uuid::Uuid;

use crate::normalize::{self, NormalizationError};

/// How the mapper treats a value that can not be normalized.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum NormalizationMode {
    /// Zero the attribute and mark the record corrupted.
    #[default]
    Lenient,
    /// Fail the record, which aborts the batch.
    Strict,
}

impl FromStr for NormalizationMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "lenient" => Ok(Self::Lenient),
            "strict" => Ok(Self::Strict),
            other => Err(format!("unknown normalization mode `{}`", other)),
        }
    }
}

/// Emitted for every record whose coordinates were reset or whose values had
/// to be zeroed. Not an error: the record is still stored, with a marker.
#[derive(Debug, Clone, PartialEq)]
pub struct CorruptedRecordWarning {
    pub station_id: i64,
    pub station_code: i64,
    pub fields: Vec<&'static str>,
}

impl fmt::Display for CorruptedRecordWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "station_id={} station_code={} has corrupted fields [{}], set to 0",
            self.station_id,
            self.station_code,
            self.fields.join(", ")
        )
    }
}

/// Builds a station from a raw record with a fresh id. Never fails: missing
/// fields keep their zero value and bad values degrade to a corrupted record.
pub fn map_to_station(record: &RawRecord) -> WithId<Station> {
    map_with_warning(record).0
}

/// Lenient mapping that also hands back the warning for a corrupted record.
pub fn map_with_warning(record: &RawRecord) -> (WithId<Station>, Option<CorruptedRecordWarning>) {
    let mapped = map_record(record, |why| {
        log::warn!("{}, using 0", why);
        Ok::<_, Infallible>(())
    });
    match mapped {
        Ok(mapped) => mapped,
        Err(never) => match never {},
    }
}

/// Like [`map_to_station`], but honours the given mode.
pub fn try_map_to_station(
    record: &RawRecord,
    mode: NormalizationMode,
) -> Result<WithId<Station>, NormalizationError> {
    let mapped = match mode {
        NormalizationMode::Lenient => map_with_warning(record),
        NormalizationMode::Strict => map_record(record, Err)?,
    };
    Ok(mapped.0)
}

/// Walks the field table, not the record, so unknown input keys are ignored.
/// `on_error` decides whether a bad value is zeroed (`Ok`) or fatal (`Err`).
fn map_record<E>(
    record: &RawRecord,
    mut on_error: impl FnMut(NormalizationError) -> Result<(), E>,
) -> Result<(WithId<Station>, Option<CorruptedRecordWarning>), E> {
    let mut station = Station::default();
    let mut corrupted_fields = Vec::new();

    for field in StationField::ALL {
        let Some(raw) = record.get(field.key()) else {
            continue;
        };
        let value = match normalize::normalize(field.key(), raw, field.kind()) {
            Ok(value) => value,
            Err(why) => {
                on_error(why)?;
                corrupted_fields.push(field.key());
                zero(field.kind())
            }
        };
        station.set(field, &value);

        if let Some(range) = field.valid_range() {
            let coordinate = value.as_float().unwrap_or_default();
            if !range.contains(&coordinate) {
                station.set(field, &FieldValue::Float(0.0));
                corrupted_fields.push(field.key());
            }
        }
    }

    let warning = if corrupted_fields.is_empty() {
        None
    } else {
        station.mark_corrupted();
        let warning = CorruptedRecordWarning {
            station_id: station.station_id,
            station_code: station.station_code,
            fields: corrupted_fields,
        };
        log::warn!("{}", warning);
        Some(warning)
    };

    let id = Id::new(Uuid::new_v4().to_string());
    Ok((WithId::new(id, station), warning))
}

fn zero(kind: FieldKind) -> FieldValue {
    match kind {
        FieldKind::Int => FieldValue::Int(0),
        FieldKind::Float => FieldValue::Float(0.0),
        FieldKind::Text => FieldValue::Text(String::new()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::{fixture, rstest};
    use serde_json::{json, Value};

    fn record(fields: &[(&str, Value)]) -> RawRecord {
        fields
            .iter()
            .map(|(key, value)| (key.to_string(), value.clone()))
            .collect()
    }

    #[fixture]
    fn bangkok() -> RawRecord {
        record(&[
            ("id", json!("1")),
            ("station_code", json!("1,001")),
            ("name", json!(" กรุงเทพ ")),
            ("en_name", json!("Bangkok")),
            ("th_short", json!("กท.")),
            ("en_short", json!("BKK")),
            ("chname", json!("曼谷")),
            ("controldivision", json!("2")),
            ("exact_km", json!("0")),
            ("exact_distance", json!("")),
            ("km", json!(0)),
            ("class", json!("1")),
            ("lat", json!("13.7466")),
            ("long", json!("100.5393")),
            ("active", json!("1")),
            ("giveway", json!("0")),
            ("dual_track", json!("1")),
            ("comment", json!("")),
        ])
    }

    #[rstest]
    fn maps_every_field_of_the_table(bangkok: RawRecord) {
        let station = map_to_station(&bangkok).content;
        assert_eq!(station.station_id, 1);
        assert_eq!(station.station_code, 1001);
        assert_eq!(station.name, "กรุงเทพ");
        assert_eq!(station.short_name_local, "กท.");
        assert_eq!(station.short_name_en, "BKK");
        assert_eq!(station.name_alt, "曼谷");
        assert_eq!(station.control_division, 2);
        assert_eq!(station.class, 1);
        assert_eq!(station.dual_track, 1);
        assert_eq!(station.lat, 13.7466);
        assert_eq!(station.long, 100.5393);
        assert!(!station.is_corrupted());
        assert_eq!(station.location().coordinates, [100.5393, 13.7466]);
    }

    #[rstest]
    fn out_of_range_latitude_is_zeroed_and_marked(mut bangkok: RawRecord) {
        bangkok.insert("lat".to_owned(), json!(999));
        let station = map_to_station(&bangkok).content;
        assert_eq!(station.lat, 0.0);
        assert_eq!(station.long, 100.5393);
        assert!(station.comment.ends_with("[corrupted]"));
        assert_eq!(station.location().coordinates, [100.5393, 0.0]);
    }

    #[rstest]
    fn out_of_range_longitude_keeps_existing_comment(mut bangkok: RawRecord) {
        bangkok.insert("long".to_owned(), json!("-180.5"));
        bangkok.insert("comment".to_owned(), json!("moved 2019"));
        let station = map_to_station(&bangkok).content;
        assert_eq!(station.long, 0.0);
        assert_eq!(station.lat, 13.7466);
        assert_eq!(station.comment, "moved 2019 [corrupted]");
    }

    #[rstest]
    #[case("lat", json!(90))]
    #[case("lat", json!(-90))]
    #[case("long", json!(180))]
    #[case("long", json!(-180))]
    fn range_bounds_are_valid(
        mut bangkok: RawRecord,
        #[case] key: &str,
        #[case] value: Value,
    ) {
        bangkok.insert(key.to_owned(), value);
        assert!(!map_to_station(&bangkok).content.is_corrupted());
    }

    #[rstest]
    fn unparseable_value_degrades_in_lenient_mode(mut bangkok: RawRecord) {
        bangkok.insert("km".to_owned(), json!("twelve"));
        let station = map_to_station(&bangkok).content;
        assert_eq!(station.km, 0);
        assert!(station.is_corrupted());
    }

    #[rstest]
    fn unparseable_value_fails_in_strict_mode(mut bangkok: RawRecord) {
        bangkok.insert("km".to_owned(), json!("twelve"));
        let result = try_map_to_station(&bangkok, NormalizationMode::Strict);
        assert!(matches!(
            result,
            Err(NormalizationError::Field { ref field, .. }) if field == "km"
        ));
    }

    #[rstest]
    fn warning_names_the_offending_fields(mut bangkok: RawRecord) {
        bangkok.insert("lat".to_owned(), json!(91));
        bangkok.insert("class".to_owned(), json!({"a": 1}));
        let (_, warning) = map_with_warning(&bangkok);
        let warning = warning.unwrap();
        assert_eq!(warning.station_code, 1001);
        assert_eq!(warning.fields, vec!["class", "lat"]);
        assert!(warning.to_string().contains("[class, lat]"));
    }

    #[test]
    fn mapping_is_total_over_unknown_input() {
        let station = map_to_station(&record(&[("colour", json!("red"))]));
        assert_eq!(station.content, Station::default());
    }

    #[rstest]
    fn every_mapping_gets_a_fresh_id(bangkok: RawRecord) {
        let first = map_to_station(&bangkok);
        let second = map_to_station(&bangkok);
        assert_ne!(first.id, second.id);
        assert_eq!(first.content, second.content);
    }

    #[test]
    fn modes_parse_from_configuration() {
        assert_eq!("Strict".parse(), Ok(NormalizationMode::Strict));
        assert_eq!(" lenient".parse(), Ok(NormalizationMode::Lenient));
        assert!("loose".parse::<NormalizationMode>().is_err());
    }
}
