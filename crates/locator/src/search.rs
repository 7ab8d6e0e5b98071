use std::{fmt, str::FromStr};

use itertools::Itertools;
use model::{station::NearbyStation, WithDistance};
use schemars::JsonSchema;
use serde::Serialize;
use utility::geo::{calculate_bounding_box, haversine_distance};

use crate::{
    database::{DatabaseError, StationFilter, StationRepo},
    radius,
};

/// Which store query serves nearby searches.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SearchStrategy {
    /// Box prefilter, exact distance filter and in-process ranking.
    #[default]
    BoundingBox,
    /// Nearest-first query on the store's geospatial index.
    GeoIndex,
}

impl FromStr for SearchStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('_', "-").as_str() {
            "bounding-box" | "bbox" => Ok(Self::BoundingBox),
            "geo-index" => Ok(Self::GeoIndex),
            other => Err(format!("unknown search strategy `{}`", other)),
        }
    }
}

impl fmt::Display for SearchStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SearchStrategy::BoundingBox => "bounding-box",
            SearchStrategy::GeoIndex => "geo-index",
        })
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValidationError {
    #[error("latitude {0} is not within [-90, 90]")]
    Latitude(f64),
    #[error("longitude {0} is not within [-180, 180]")]
    Longitude(f64),
    #[error("page must be at least 1, got {0}")]
    Page(usize),
    #[error("page size must be at least 1, got {0}")]
    PageSize(usize),
}

#[derive(Debug, thiserror::Error)]
pub enum SearchError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Store(#[from] DatabaseError),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NearbyQuery {
    pub latitude: f64,
    pub longitude: f64,
    /// 1-based
    pub page: usize,
    pub page_size: usize,
}

impl NearbyQuery {
    pub fn new(latitude: f64, longitude: f64, page: usize, page_size: usize) -> Self {
        Self {
            latitude,
            longitude,
            page,
            page_size,
        }
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if !self.latitude.is_finite() || !(-90.0..=90.0).contains(&self.latitude) {
            return Err(ValidationError::Latitude(self.latitude));
        }
        if !self.longitude.is_finite() || !(-180.0..=180.0).contains(&self.longitude) {
            return Err(ValidationError::Longitude(self.longitude));
        }
        if self.page < 1 {
            return Err(ValidationError::Page(self.page));
        }
        if self.page_size < 1 {
            return Err(ValidationError::PageSize(self.page_size));
        }
        Ok(())
    }

    /// Results to skip before this page.
    pub fn skip(&self) -> usize {
        self.page.saturating_sub(1).saturating_mul(self.page_size)
    }

    /// Ranked results needed to serve this page.
    pub fn effective_limit(&self) -> usize {
        self.page.saturating_mul(self.page_size)
    }
}

/// One page of stations ordered by ascending distance.
#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct NearbyPage {
    pub page: usize,
    pub page_size: usize,
    /// all active stations in the store
    pub total: u64,
    /// 1-based position of the first returned station
    pub start: usize,
    /// 1-based position of the last returned station
    pub end: usize,
    pub data: Vec<WithDistance<NearbyStation>>,
}

pub async fn find_nearby<R>(
    repo: &mut R,
    query: NearbyQuery,
    strategy: SearchStrategy,
) -> Result<NearbyPage, SearchError>
where
    R: StationRepo + Send,
{
    query.validate()?;
    log::debug!("nearby search {:?} using {}", query, strategy);
    match strategy {
        SearchStrategy::BoundingBox => by_bounding_box(repo, query).await,
        SearchStrategy::GeoIndex => by_geo_index(repo, query).await,
    }
}

async fn by_bounding_box<R>(repo: &mut R, query: NearbyQuery) -> Result<NearbyPage, SearchError>
where
    R: StationRepo + Send,
{
    let limit = query.effective_limit();
    let fanout = radius::fanout(limit);
    let bbox = calculate_bounding_box(query.latitude, query.longitude, fanout.radius_km);
    let filter = StationFilter::active().within(bbox);

    let candidates = repo
        .find_by_filter(&filter, fanout.candidate_limit(limit), 0)
        .await?;
    let candidate_count = candidates.len();

    let ranked = candidates
        .into_iter()
        .map(|station| {
            let distance = haversine_distance(
                query.latitude,
                query.longitude,
                station.content.lat,
                station.content.long,
            );
            WithDistance::new(distance, NearbyStation::new(station.id, &station.content))
        })
        .filter(|station| station.distance_km <= fanout.radius_km)
        .sorted_by(|left, right| left.distance_km.total_cmp(&right.distance_km))
        .collect::<Vec<_>>();
    log::debug!(
        "{} candidates in box, {} within {} km",
        candidate_count,
        ranked.len(),
        fanout.radius_km
    );

    let total = repo.count(&StationFilter::active()).await?;

    let start = query.skip().min(ranked.len());
    let end = start.saturating_add(query.page_size).min(ranked.len());
    let data = ranked
        .into_iter()
        .skip(start)
        .take(end - start)
        .collect::<Vec<_>>();

    Ok(NearbyPage {
        page: query.page,
        page_size: query.page_size,
        total,
        start: start + 1,
        end,
        data,
    })
}

async fn by_geo_index<R>(repo: &mut R, query: NearbyQuery) -> Result<NearbyPage, SearchError>
where
    R: StationRepo + Send,
{
    let skip = query.skip();
    let data = repo
        .find_nearest(
            query.latitude,
            query.longitude,
            &StationFilter::active(),
            query.page_size,
            skip,
        )
        .await?
        .into_iter()
        .map(|station| {
            let distance = haversine_distance(
                query.latitude,
                query.longitude,
                station.content.lat,
                station.content.long,
            );
            WithDistance::new(distance, NearbyStation::new(station.id, &station.content))
        })
        .collect::<Vec<_>>();

    let total = repo.count(&StationFilter::active()).await?;

    Ok(NearbyPage {
        page: query.page,
        page_size: query.page_size,
        total,
        start: skip + 1,
        end: skip + data.len(),
        data,
    })
}
