use std::{future::Future, sync::Arc, time::Duration};

use crate::{
    config::LocatorConfig,
    database::{Database, DatabaseError},
    ingest::{ingest_format, ImportReport},
    parser::SourceFormat,
    search::{find_nearby, NearbyPage, NearbyQuery},
    RequestError, RequestResult,
};

/// Where the bytes of an ingestion come from.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Bytes(Vec<u8>),
    Url(String),
}

/// Entry point of the two request operations. Each call takes its own repo
/// from the shared database and runs under the configured deadline.
#[derive(Debug, Clone)]
pub struct Client<D> {
    database: D,
    config: Arc<LocatorConfig>,
    http: reqwest::Client,
}

impl<D: Database> Client<D> {
    pub fn new(database: D, config: LocatorConfig) -> Self {
        Self {
            database,
            config: Arc::new(config),
            http: reqwest::Client::new(),
        }
    }

    pub fn database(&self) -> &D {
        &self.database
    }

    pub fn config(&self) -> &LocatorConfig {
        &self.config
    }

    pub async fn search(
        &self,
        latitude: f64,
        longitude: f64,
        page: usize,
        page_size: usize,
    ) -> RequestResult<NearbyPage> {
        let query = NearbyQuery::new(latitude, longitude, page, page_size);
        query.validate()?;

        let mut repo = self.database.auto();
        with_deadline(
            self.config.search_timeout,
            find_nearby(&mut repo, query, self.config.search_strategy),
        )
        .await
    }

    /// Ingests a payload in the format named by `hint`. An unknown hint fails
    /// before anything is fetched or stored.
    pub async fn ingest(&self, hint: &str, payload: Payload) -> RequestResult<ImportReport> {
        let format = SourceFormat::from_hint(hint)?;
        let data = match payload {
            Payload::Bytes(data) => data,
            Payload::Url(url) => self.fetch(&url).await?,
        };

        let mut repo = self.database.auto();
        with_deadline(
            self.config.ingest_timeout,
            ingest_format(&mut repo, format, &data, self.config.normalization),
        )
        .await
    }

    async fn fetch(&self, url: &str) -> RequestResult<Vec<u8>> {
        log::info!("fetching stations from {}", url);
        let response = self
            .http
            .get(url)
            .timeout(self.config.fetch_timeout)
            .send()
            .await?
            .error_for_status()?;
        Ok(response.bytes().await?.to_vec())
    }
}

/// Runs `operation` to completion or drops it once `deadline` elapsed.
async fn with_deadline<T, E>(
    deadline: Duration,
    operation: impl Future<Output = Result<T, E>>,
) -> RequestResult<T>
where
    RequestError: From<E>,
{
    match tokio::time::timeout(deadline, operation).await {
        Ok(result) => result.map_err(RequestError::from),
        Err(_) => {
            log::warn!("store operation cancelled after {:?}", deadline);
            Err(DatabaseError::Timeout(deadline).into())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryDatabase;
    use rstest::{fixture, rstest};

    #[fixture]
    fn client() -> Client<MemoryDatabase> {
        Client::new(MemoryDatabase::new(), LocatorConfig::default())
    }

    #[rstest]
    #[tokio::test]
    async fn ingested_stations_are_found_nearby(client: Client<MemoryDatabase>) {
        let data = br#"[
            {"station_code": 1001, "name": "Bangkok", "lat": 13.7466, "long": 100.5393, "active": 1},
            {"station_code": 1002, "name": "Bang Sue", "lat": 13.8022, "long": 100.5399, "active": 1}
        ]"#;
        let report = client
            .ingest("json", Payload::Bytes(data.to_vec()))
            .await
            .unwrap();
        assert_eq!(report.inserted_count, 2);

        let page = client.search(13.75, 100.5, 1, 10).await.unwrap();
        assert_eq!(page.total, 2);
        assert_eq!(page.data[0].content.station_code, 1001);
    }

    #[rstest]
    #[tokio::test]
    async fn invalid_search_is_rejected_without_store_access(client: Client<MemoryDatabase>) {
        let result = client.search(13.75, 200.0, 1, 10).await;
        assert!(matches!(result, Err(RequestError::Validation(_))));
        assert_eq!(client.database().operations(), 0);
    }

    #[rstest]
    #[tokio::test]
    async fn unsupported_hint_is_rejected_before_fetching(client: Client<MemoryDatabase>) {
        let result = client
            .ingest("stations.pdf", Payload::Url("http://localhost:1/stations.pdf".to_owned()))
            .await;
        assert!(matches!(result, Err(RequestError::UnsupportedFormat(_))));
        assert_eq!(client.database().operations(), 0);
    }

    #[rstest]
    #[tokio::test]
    async fn unfetchable_url_is_a_fetch_error(client: Client<MemoryDatabase>) {
        let result = client
            .ingest("json", Payload::Url("not a url".to_owned()))
            .await;
        assert!(matches!(result, Err(RequestError::Fetch(_))));
        assert_eq!(client.database().operations(), 0);
    }

    #[tokio::test]
    async fn elapsed_deadline_is_a_store_timeout() {
        let deadline = Duration::from_millis(10);
        let slow = async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok::<_, DatabaseError>(())
        };
        match with_deadline(deadline, slow).await {
            Err(RequestError::Store(DatabaseError::Timeout(elapsed))) => {
                assert_eq!(elapsed, deadline)
            }
            other => panic!("unexpected {other:?}"),
        }
    }
}
