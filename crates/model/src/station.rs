use std::ops::RangeInclusive;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use utility::id::{HasId, Id};

use crate::document::{Document, FieldValue, GeoPoint, LOCATION_KEY};

/// Marker appended to `comment` of stations whose coordinates were reset.
pub const CORRUPTED_MARKER: &str = "[corrupted]";

/// A railway station as stored. Field names on the wire and in the store are
/// the keys of [`StationField`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Station {
    #[serde(rename = "id")]
    pub station_id: i64,
    pub station_code: i64,
    pub name: String,
    pub en_name: String,
    #[serde(rename = "th_short")]
    pub short_name_local: String,
    #[serde(rename = "en_short")]
    pub short_name_en: String,
    #[serde(rename = "chname")]
    pub name_alt: String,
    #[serde(rename = "controldivision")]
    pub control_division: i64,
    pub exact_km: i64,
    pub exact_distance: i64,
    pub km: i64,
    pub class: i64,
    pub lat: f64,
    pub long: f64,
    pub active: i64,
    pub giveway: i64,
    pub dual_track: i64,
    pub comment: String,
}

impl HasId for Station {
    type IdType = String;
}

impl Station {
    /// GeoJSON point of the current coordinates. Derived on every call, so it
    /// can never disagree with `lat`/`long`.
    pub fn location(&self) -> GeoPoint {
        GeoPoint::new(self.long, self.lat)
    }

    pub fn is_corrupted(&self) -> bool {
        self.comment.contains(CORRUPTED_MARKER)
    }

    /// Appends the corruption marker, keeping any existing comment.
    pub fn mark_corrupted(&mut self) {
        if self.comment.is_empty() {
            self.comment = CORRUPTED_MARKER.to_owned();
        } else {
            self.comment = format!("{} {}", self.comment, CORRUPTED_MARKER);
        }
    }

    pub fn get(&self, field: StationField) -> FieldValue {
        use StationField::*;
        match field {
            StationId => self.station_id.into(),
            StationCode => self.station_code.into(),
            Name => self.name.clone().into(),
            EnName => self.en_name.clone().into(),
            ShortNameLocal => self.short_name_local.clone().into(),
            ShortNameEn => self.short_name_en.clone().into(),
            NameAlt => self.name_alt.clone().into(),
            ControlDivision => self.control_division.into(),
            ExactKm => self.exact_km.into(),
            ExactDistance => self.exact_distance.into(),
            Km => self.km.into(),
            Class => self.class.into(),
            Lat => self.lat.into(),
            Long => self.long.into(),
            Active => self.active.into(),
            Giveway => self.giveway.into(),
            DualTrack => self.dual_track.into(),
            Comment => self.comment.clone().into(),
        }
    }

    /// Assigns a value to an attribute. A value of the wrong kind resets the
    /// attribute to its zero value.
    pub fn set(&mut self, field: StationField, value: &FieldValue) {
        use StationField::*;
        let int = || value.as_int().unwrap_or_default();
        let float = || value.as_float().unwrap_or_default();
        let text = || value.as_text().unwrap_or_default().to_owned();
        match field {
            StationId => self.station_id = int(),
            StationCode => self.station_code = int(),
            Name => self.name = text(),
            EnName => self.en_name = text(),
            ShortNameLocal => self.short_name_local = text(),
            ShortNameEn => self.short_name_en = text(),
            NameAlt => self.name_alt = text(),
            ControlDivision => self.control_division = int(),
            ExactKm => self.exact_km = int(),
            ExactDistance => self.exact_distance = int(),
            Km => self.km = int(),
            Class => self.class = int(),
            Lat => self.lat = float(),
            Long => self.long = float(),
            Active => self.active = int(),
            Giveway => self.giveway = int(),
            DualTrack => self.dual_track = int(),
            Comment => self.comment = text(),
        }
    }

    /// All persisted attributes, the store id excluded, `location` last.
    pub fn to_document(&self) -> Document {
        let mut document = StationField::ALL
            .iter()
            .map(|field| (field.key().to_owned(), self.get(*field)))
            .collect::<Document>();
        document.insert(LOCATION_KEY.to_owned(), self.location().into());
        document
    }

    /// Rebuilds a station from a stored document. Missing attributes keep
    /// their zero value; `location` is ignored since it is derived.
    pub fn from_document(document: &Document) -> Self {
        let mut station = Station::default();
        for field in StationField::ALL {
            if let Some(value) = document.get(field.key()) {
                station.set(field, value);
            }
        }
        station
    }
}

/// Declared type of a station attribute in raw input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Int,
    Float,
    Text,
}

/// The canonical field table: every mappable station attribute with its
/// persisted key and declared type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StationField {
    StationId,
    StationCode,
    Name,
    EnName,
    ShortNameLocal,
    ShortNameEn,
    NameAlt,
    ControlDivision,
    ExactKm,
    ExactDistance,
    Km,
    Class,
    Lat,
    Long,
    Active,
    Giveway,
    DualTrack,
    Comment,
}

impl StationField {
    pub const ALL: [StationField; 18] = [
        StationField::StationId,
        StationField::StationCode,
        StationField::Name,
        StationField::EnName,
        StationField::ShortNameLocal,
        StationField::ShortNameEn,
        StationField::NameAlt,
        StationField::ControlDivision,
        StationField::ExactKm,
        StationField::ExactDistance,
        StationField::Km,
        StationField::Class,
        StationField::Lat,
        StationField::Long,
        StationField::Active,
        StationField::Giveway,
        StationField::DualTrack,
        StationField::Comment,
    ];

    pub const fn key(self) -> &'static str {
        use StationField::*;
        match self {
            StationId => "id",
            StationCode => "station_code",
            Name => "name",
            EnName => "en_name",
            ShortNameLocal => "th_short",
            ShortNameEn => "en_short",
            NameAlt => "chname",
            ControlDivision => "controldivision",
            ExactKm => "exact_km",
            ExactDistance => "exact_distance",
            Km => "km",
            Class => "class",
            Lat => "lat",
            Long => "long",
            Active => "active",
            Giveway => "giveway",
            DualTrack => "dual_track",
            Comment => "comment",
        }
    }

    pub const fn kind(self) -> FieldKind {
        use StationField::*;
        match self {
            Name | EnName | ShortNameLocal | ShortNameEn | NameAlt | Comment => {
                FieldKind::Text
            }
            Lat | Long => FieldKind::Float,
            _ => FieldKind::Int,
        }
    }

    /// Geographically valid range, for coordinates only.
    pub fn valid_range(self) -> Option<RangeInclusive<f64>> {
        match self {
            StationField::Lat => Some(-90.0..=90.0),
            StationField::Long => Some(-180.0..=180.0),
            _ => None,
        }
    }

    pub fn from_key(key: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|field| field.key() == key)
    }
}

/// The part of a station returned by nearby searches.
#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct NearbyStation {
    pub id: Id<Station>,
    pub station_code: i64,
    pub name: String,
    pub en_name: String,
    pub lat: f64,
    pub long: f64,
}

impl NearbyStation {
    pub fn new(id: Id<Station>, station: &Station) -> Self {
        Self {
            id,
            station_code: station.station_code,
            name: station.name.clone(),
            en_name: station.en_name.clone(),
            lat: station.lat,
            long: station.long,
        }
    }
}
