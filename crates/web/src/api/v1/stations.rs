use axum::{
    extract::{multipart::MultipartError, Multipart, OriginalUri, Query, State},
    http::{Method, Uri},
    routing::{get, on, post},
    Json, Router,
};
use locator::{
    client::Payload, database::Database, ingest::ImportReport, search::NearbyPage,
};
use serde::{Deserialize, Serialize};

use crate::{
    common::{route_not_found, schema, RouteErrorResponse, RouteResult, METHOD_FILTER_ALL},
    WebState,
};

const FILE_FIELD: &str = "file";
const DEFAULT_FORMAT: &str = "json";
const DEFAULT_PAGE_SIZE: i64 = 10;
const MIN_PAGE_SIZE: i64 = 10;
const MAX_PAGE_SIZE: i64 = 100;

pub(crate) fn routes<D: Database>(state: WebState<D>) -> Router {
    Router::new()
        .route("/nearby", get(nearby::<D>))
        .route("/nearby/schema", get(schema::<NearbyPage>))
        .route("/import/file", post(import_file::<D>))
        .route("/import/url", post(import_url::<D>))
        .with_state(state)
        .fallback_service(on(METHOD_FILTER_ALL, route_not_found))
}

fn rejected(
    why: impl Into<RouteErrorResponse>,
    method: &Method,
    uri: &Uri,
) -> RouteErrorResponse {
    why.into().with_method(method).with_uri(uri.path())
}

/// Query parameters are taken as text so that each one can be rejected with
/// its own message.
#[derive(Debug, Default, Deserialize)]
struct NearbyParams {
    lat: Option<String>,
    long: Option<String>,
    page: Option<String>,
    page_size: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct NearbyRequest {
    latitude: f64,
    longitude: f64,
    page: usize,
    page_size: usize,
}

impl NearbyParams {
    fn parse(&self) -> Result<NearbyRequest, &'static str> {
        let number = |raw: &Option<String>| raw.as_deref().and_then(|raw| raw.parse::<f64>().ok());
        let latitude = number(&self.lat).ok_or("invalid lat")?;
        let longitude = number(&self.long).ok_or("invalid long")?;

        // an unusable page is not an error, it is the first page
        let page = self
            .page
            .as_deref()
            .and_then(|page| page.parse::<usize>().ok())
            .filter(|page| *page > 0)
            .unwrap_or(1);

        let page_size = match self.page_size.as_deref().filter(|raw| !raw.is_empty()) {
            Some(raw) => raw.parse::<i64>().map_err(|_| "invalid page_size")?,
            None => DEFAULT_PAGE_SIZE,
        };
        if !(MIN_PAGE_SIZE..=MAX_PAGE_SIZE).contains(&page_size) {
            return Err("page_size must be between 10 and 100");
        }

        Ok(NearbyRequest {
            latitude,
            longitude,
            page,
            page_size: page_size as usize,
        })
    }
}

async fn nearby<D: Database>(
    OriginalUri(original_uri): OriginalUri,
    State(WebState { client }): State<WebState<D>>,
    Query(params): Query<NearbyParams>,
) -> RouteResult<Json<NearbyPage>> {
    let request = params.parse().map_err(|message| {
        rejected(
            RouteErrorResponse::bad_request(message),
            &Method::GET,
            &original_uri,
        )
    })?;

    client
        .search(
            request.latitude,
            request.longitude,
            request.page,
            request.page_size,
        )
        .await
        .map(Json)
        .map_err(|why| rejected(why, &Method::GET, &original_uri))
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
struct ImportResponse {
    status: u16,
    message: String,
    count: u64,
    total_import: u64,
    inserted_count: u64,
    updated_count: u64,
    corrupted_count: u64,
}

impl From<ImportReport> for ImportResponse {
    fn from(report: ImportReport) -> Self {
        Self {
            status: 200,
            message: format!(
                "Imported {} new, updated {} existing, {} records corrupted",
                report.inserted_count, report.updated_count, report.corrupted_count
            ),
            count: report.inserted_count + report.updated_count,
            total_import: report.total_considered_count,
            inserted_count: report.inserted_count,
            updated_count: report.updated_count,
            corrupted_count: report.corrupted_count,
        }
    }
}

/// The name and content of the first multipart field called `file`.
async fn read_file_field(
    mut multipart: Multipart,
) -> Result<Option<(String, Vec<u8>)>, MultipartError> {
    while let Some(field) = multipart.next_field().await? {
        if field.name() != Some(FILE_FIELD) {
            continue;
        }
        let file_name = field.file_name().unwrap_or_default().to_owned();
        let data = field.bytes().await?;
        return Ok(Some((file_name, data.to_vec())));
    }
    Ok(None)
}

async fn import_file<D: Database>(
    OriginalUri(original_uri): OriginalUri,
    State(WebState { client }): State<WebState<D>>,
    multipart: Multipart,
) -> RouteResult<Json<ImportResponse>> {
    let (file_name, data) = match read_file_field(multipart).await {
        Ok(Some(file)) => file,
        Ok(None) => {
            return Err(rejected(
                RouteErrorResponse::bad_request("file is required"),
                &Method::POST,
                &original_uri,
            ))
        }
        Err(why) => {
            return Err(rejected(
                RouteErrorResponse::bad_request("file is required")
                    .with_detailed_information(why.body_text()),
                &Method::POST,
                &original_uri,
            ))
        }
    };
    log::info!("importing {} ({} bytes)", file_name, data.len());

    client
        .ingest(&file_name, Payload::Bytes(data))
        .await
        .map(|report| Json(report.into()))
        .map_err(|why| rejected(why, &Method::POST, &original_uri))
}

#[derive(Debug, Default, Deserialize)]
struct ImportUrlParams {
    url: Option<String>,
    format: Option<String>,
}

async fn import_url<D: Database>(
    OriginalUri(original_uri): OriginalUri,
    State(WebState { client }): State<WebState<D>>,
    Query(params): Query<ImportUrlParams>,
) -> RouteResult<Json<ImportResponse>> {
    let Some(url) = params.url.filter(|url| !url.is_empty()) else {
        return Err(rejected(
            RouteErrorResponse::bad_request("url is required"),
            &Method::POST,
            &original_uri,
        ));
    };
    let format = params.format.unwrap_or_else(|| DEFAULT_FORMAT.to_owned());

    client
        .ingest(&format, Payload::Url(url))
        .await
        .map(|report| Json(report.into()))
        .map_err(|why| rejected(why, &Method::POST, &original_uri))
}
