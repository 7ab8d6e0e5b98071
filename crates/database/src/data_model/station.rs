use model::{
    document::{Document, FieldValue, GeoPoint, ID_KEY, LOCATION_KEY},
    station::Station,
    WithId,
};
use sqlx::{prelude::FromRow, types::Json};
use utility::id::Id;

#[derive(Debug, Clone, FromRow)]
pub struct StationRow {
    #[sqlx(rename = "_id")]
    pub store_id: String,
    #[sqlx(rename = "id")]
    pub station_id: i64,
    pub station_code: i64,
    pub name: String,
    pub en_name: String,
    pub th_short: String,
    pub en_short: String,
    pub chname: String,
    pub controldivision: i64,
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
    pub location: Json<GeoPoint>,
}

impl StationRow {
    pub fn to_model(self) -> WithId<Station> {
        WithId::new(
            Id::new(self.store_id),
            Station {
                station_id: self.station_id,
                station_code: self.station_code,
                name: self.name,
                en_name: self.en_name,
                short_name_local: self.th_short,
                short_name_en: self.en_short,
                name_alt: self.chname,
                control_division: self.controldivision,
                exact_km: self.exact_km,
                exact_distance: self.exact_distance,
                km: self.km,
                class: self.class,
                lat: self.lat,
                long: self.long,
                active: self.active,
                giveway: self.giveway,
                dual_track: self.dual_track,
                comment: self.comment,
            },
        )
    }

    /// The row as stored, `location` taken from its own column.
    pub fn to_document(self) -> Document {
        let Json(location) = self.location.clone();
        let station = self.to_model();

        let mut document = Document::new();
        document.insert(ID_KEY.to_owned(), FieldValue::Text(station.id.into_inner()));
        document.extend(station.content.to_document());
        document.insert(LOCATION_KEY.to_owned(), FieldValue::Point(location));
        document
    }
}
