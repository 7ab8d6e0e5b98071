use model::{
    document::{Document, FieldValue},
    station::Station,
};

/// Absolute tolerance for comparing floating point attributes.
pub const FLOAT_TOLERANCE: f64 = 1e-9;

pub fn values_equal(left: &FieldValue, right: &FieldValue) -> bool {
    match (left, right) {
        (FieldValue::Float(left), FieldValue::Float(right)) => floats_equal(*left, *right),
        (FieldValue::Point(left), FieldValue::Point(right)) => left
            .coordinates
            .iter()
            .zip(right.coordinates.iter())
            .all(|(left, right)| floats_equal(*left, *right)),
        (left, right) => left == right,
    }
}

fn floats_equal(left: f64, right: f64) -> bool {
    (left - right).abs() <= FLOAT_TOLERANCE
}

/// The persisted attributes of `candidate` that differ from `existing`.
///
/// Without an existing document every attribute is part of the diff. Keys the
/// existing document does not hold count as changed; keys only the existing
/// document holds are left alone. The store id is never compared.
pub fn diff(candidate: &Station, existing: Option<&Document>) -> Document {
    let fields = candidate.to_document();
    let Some(existing) = existing else {
        return fields;
    };
    fields
        .into_iter()
        .filter(|(key, value)| {
            existing
                .get(key)
                .map_or(true, |current| !values_equal(value, current))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use model::document::{GeoPoint, LOCATION_KEY};
    use rstest::{fixture, rstest};

    #[fixture]
    fn station() -> Station {
        Station {
            station_id: 3,
            station_code: 1003,
            name: "บางซื่อ".to_owned(),
            en_name: "Bang Sue".to_owned(),
            lat: 13.8022,
            long: 100.5399,
            active: 1,
            ..Default::default()
        }
    }

    #[rstest]
    fn new_station_differs_in_everything(station: Station) {
        assert_eq!(diff(&station, None), station.to_document());
    }

    #[rstest]
    fn identical_document_yields_empty_diff(station: Station) {
        let stored = station.to_document();
        assert!(diff(&station, Some(&stored)).is_empty());
    }

    #[rstest]
    fn only_changed_fields_are_reported(station: Station) {
        let stored = station.to_document();
        let changed = Station {
            en_name: "Krung Thep Aphiwat".to_owned(),
            lat: 13.8040,
            ..station
        };
        let delta = diff(&changed, Some(&stored));
        let keys = delta.keys().map(String::as_str).collect::<Vec<_>>();
        assert_eq!(keys, vec!["en_name", "lat", LOCATION_KEY]);
        assert_eq!(
            delta.get(LOCATION_KEY),
            Some(&FieldValue::Point(GeoPoint::new(100.5399, 13.8040)))
        );
    }

    #[rstest]
    fn float_noise_is_not_a_change(station: Station) {
        let mut stored = station.to_document();
        stored.insert("lat".to_owned(), FieldValue::Float(station.lat + 1e-12));
        assert!(diff(&station, Some(&stored)).is_empty());
    }

    #[rstest]
    fn missing_stored_key_is_a_change(station: Station) {
        let mut stored = station.to_document();
        stored.shift_remove("giveway");
        let delta = diff(&station, Some(&stored));
        assert_eq!(delta.len(), 1);
        assert_eq!(delta.get("giveway"), Some(&FieldValue::Int(0)));
    }

    #[rstest]
    fn extra_stored_keys_are_ignored(station: Station) {
        let mut stored = station.to_document();
        stored.insert("_id".to_owned(), FieldValue::from("a-stored-id"));
        stored.insert("legacy".to_owned(), FieldValue::Int(1));
        assert!(diff(&station, Some(&stored)).is_empty());
    }

    #[rstest]
    #[case(FieldValue::Int(1), FieldValue::Float(1.0), false)]
    #[case(FieldValue::Text("1".to_owned()), FieldValue::Int(1), false)]
    #[case(FieldValue::Float(0.1 + 0.2), FieldValue::Float(0.3), true)]
    #[case(FieldValue::Int(4), FieldValue::Int(4), true)]
    fn values_compare_by_kind_and_content(
        #[case] left: FieldValue,
        #[case] right: FieldValue,
        #[case] equal: bool,
    ) {
        assert_eq!(values_equal(&left, &right), equal);
    }
}
