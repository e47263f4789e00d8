//! Where charts come from.

use crate::error::SourceError;
use chartbook_core::ChartDocument;
use futures::FutureExt as _;
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use url::Url;

pub const OWNER_ROLE: &str = "owner";

/// Supplies every chart owned by the current user.
pub trait ChartSource: Send + Sync {
    fn list_owned_charts(&self) -> BoxFuture<'_, Result<Vec<ChartDocument>, SourceError>>;
}

/// One chart in a listing page, with the caller's role on it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartEntry {
    #[serde(default)]
    pub role: String,
    #[serde(flatten)]
    pub chart: ChartDocument,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartPage {
    #[serde(default, alias = "charts")]
    pub items: Vec<ChartEntry>,
    #[serde(default)]
    pub has_more: bool,
}

pub trait PageFetcher: Send + Sync {
    fn fetch_page(
        &self,
        offset: usize,
        limit: usize,
    ) -> BoxFuture<'_, Result<ChartPage, SourceError>>;
}

/// Walks a paged listing until it is exhausted, keeping owned charts only.
pub struct PagedChartSource<F> {
    fetcher: F,
    page_size: usize,
    max_pages: usize,
}

impl<F: PageFetcher> PagedChartSource<F> {
    pub fn new(fetcher: F, page_size: usize, max_pages: usize) -> Self {
        Self {
            fetcher,
            page_size: page_size.max(1),
            max_pages: max_pages.max(1),
        }
    }

    pub async fn collect(&self) -> Result<Vec<ChartDocument>, SourceError> {
        let mut owned = Vec::new();
        let mut offset = 0usize;
        for page_no in 0..self.max_pages {
            let page = self.fetcher.fetch_page(offset, self.page_size).await?;
            let received = page.items.len();
            tracing::debug!(page = page_no, received, has_more = page.has_more, "chart page");
            owned.extend(
                page.items
                    .into_iter()
                    .filter(|e| e.role == OWNER_ROLE)
                    .map(|e| e.chart),
            );
            if !page.has_more {
                return Ok(owned);
            }
            if received == 0 {
                tracing::warn!(offset, "chart listing reported more pages but sent none");
                return Ok(owned);
            }
            offset += received;
        }
        Err(SourceError::TooManyPages {
            pages: self.max_pages,
        })
    }
}

impl<F: PageFetcher> ChartSource for PagedChartSource<F> {
    fn list_owned_charts(&self) -> BoxFuture<'_, Result<Vec<ChartDocument>, SourceError>> {
        self.collect().boxed()
    }
}

/// `GET <endpoint>?limit=..&offset=..&includeData=true` against the chart API.
#[derive(Clone)]
pub struct HttpPageFetcher {
    agent: ureq::Agent,
    endpoint: Url,
    token: Option<String>,
}

impl HttpPageFetcher {
    pub fn new(endpoint: Url, token: Option<String>) -> Self {
        Self {
            agent: ureq::Agent::new_with_defaults(),
            endpoint,
            token,
        }
    }
}

impl PageFetcher for HttpPageFetcher {
    fn fetch_page(
        &self,
        offset: usize,
        limit: usize,
    ) -> BoxFuture<'_, Result<ChartPage, SourceError>> {
        let agent = self.agent.clone();
        let endpoint = self.endpoint.clone();
        let token = self.token.clone();
        async move {
            tokio::task::spawn_blocking(move || {
                let url = endpoint.as_str();
                let mut req = agent
                    .get(url)
                    .query("limit", limit.to_string())
                    .query("offset", offset.to_string())
                    .query("includeData", "true");
                if let Some(token) = token.as_deref() {
                    req = req.header("Authorization", format!("Bearer {token}"));
                }
                let http_err = |message: String| SourceError::Http {
                    url: url.to_string(),
                    message,
                };
                let mut resp = req.call().map_err(|e| http_err(e.to_string()))?;
                let body = resp
                    .body_mut()
                    .read_to_vec()
                    .map_err(|e| http_err(e.to_string()))?;
                serde_json::from_slice::<ChartPage>(&body).map_err(|source| SourceError::Parse {
                    origin: url.to_string(),
                    source,
                })
            })
            .await
            .map_err(|err| SourceError::Task(err.to_string()))?
        }
        .boxed()
    }
}

/// Charts stored as JSON files in a directory: one chart per file, or an array per file.
/// Everything found is treated as owned.
#[derive(Debug, Clone)]
pub struct DirectoryChartSource {
    dir: PathBuf,
}

impl DirectoryChartSource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    async fn read_all(&self) -> Result<Vec<ChartDocument>, SourceError> {
        let io_err = |path: &Path, source| SourceError::Io {
            path: path.to_path_buf(),
            source,
        };

        let mut files = Vec::new();
        let mut entries = tokio::fs::read_dir(&self.dir)
            .await
            .map_err(|e| io_err(&self.dir, e))?;
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| io_err(&self.dir, e))?
        {
            let path = entry.path();
            if path.extension().is_some_and(|ext| ext == "json") {
                files.push(path);
            }
        }
        files.sort();

        let mut charts = Vec::new();
        for path in files {
            let bytes = tokio::fs::read(&path).await.map_err(|e| io_err(&path, e))?;
            let parse_err = |source| SourceError::Parse {
                origin: path.display().to_string(),
                source,
            };
            let value: serde_json::Value = serde_json::from_slice(&bytes).map_err(parse_err)?;
            if value.is_array() {
                let batch: Vec<ChartDocument> =
                    serde_json::from_value(value).map_err(parse_err)?;
                charts.extend(batch);
            } else {
                charts.push(serde_json::from_value(value).map_err(parse_err)?);
            }
        }
        tracing::debug!(dir = %self.dir.display(), charts = charts.len(), "charts read from directory");
        Ok(charts)
    }
}

impl ChartSource for DirectoryChartSource {
    fn list_owned_charts(&self) -> BoxFuture<'_, Result<Vec<ChartDocument>, SourceError>> {
        self.read_all().boxed()
    }
}

/// A fixed, in-memory chart set.
#[derive(Debug, Clone, Default)]
pub struct StaticChartSource {
    charts: Vec<ChartDocument>,
}

impl StaticChartSource {
    pub fn new(charts: Vec<ChartDocument>) -> Self {
        Self { charts }
    }
}

impl ChartSource for StaticChartSource {
    fn list_owned_charts(&self) -> BoxFuture<'_, Result<Vec<ChartDocument>, SourceError>> {
        futures::future::ready(Ok(self.charts.clone())).boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Serves `total` charts `per_page` at a time; every third chart is shared, not owned.
    struct FakeApi {
        total: usize,
        calls: Mutex<Vec<(usize, usize)>>,
    }

    impl PageFetcher for FakeApi {
        fn fetch_page(
            &self,
            offset: usize,
            limit: usize,
        ) -> BoxFuture<'_, Result<ChartPage, SourceError>> {
            self.calls.lock().unwrap().push((offset, limit));
            let end = (offset + limit).min(self.total);
            let items = (offset..end)
                .map(|i| ChartEntry {
                    role: if i % 3 == 2 { "viewer" } else { OWNER_ROLE }.to_string(),
                    chart: ChartDocument::new(format!("c{i}"), format!("Chart {i}")),
                })
                .collect();
            futures::future::ready(Ok(ChartPage {
                items,
                has_more: end < self.total,
            }))
            .boxed()
        }
    }

    /// Claims there is always another page, each holding one shared chart.
    struct Endless;

    impl PageFetcher for Endless {
        fn fetch_page(
            &self,
            offset: usize,
            _: usize,
        ) -> BoxFuture<'_, Result<ChartPage, SourceError>> {
            futures::future::ready(Ok(ChartPage {
                items: vec![ChartEntry {
                    role: "viewer".to_string(),
                    chart: ChartDocument::new(format!("v{offset}"), "Shared"),
                }],
                has_more: true,
            }))
            .boxed()
        }
    }

    struct Stalled;

    impl PageFetcher for Stalled {
        fn fetch_page(&self, _: usize, _: usize) -> BoxFuture<'_, Result<ChartPage, SourceError>> {
            futures::future::ready(Ok(ChartPage {
                items: Vec::new(),
                has_more: true,
            }))
            .boxed()
        }
    }

    #[test]
    fn empty_page_ends_listing() {
        let source = PagedChartSource::new(Stalled, 10, 5);
        let charts = futures::executor::block_on(source.list_owned_charts()).unwrap();
        assert!(charts.is_empty());
    }

    #[test]
    fn pages_until_exhausted_and_keeps_owned() {
        let api = FakeApi {
            total: 7,
            calls: Mutex::new(Vec::new()),
        };
        let source = PagedChartSource::new(api, 3, 100);
        let charts = futures::executor::block_on(source.list_owned_charts()).unwrap();
        let ids: Vec<&str> = charts.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, ["c0", "c1", "c3", "c4", "c6"]);
        assert_eq!(
            *source.fetcher.calls.lock().unwrap(),
            vec![(0, 3), (3, 3), (6, 3)]
        );
    }

    #[test]
    fn runaway_listing_is_capped() {
        let source = PagedChartSource::new(Endless, 10, 5);
        let err = futures::executor::block_on(source.list_owned_charts()).unwrap_err();
        assert!(matches!(err, SourceError::TooManyPages { pages: 5 }));
    }

    #[test]
    fn page_json_accepts_wire_shape() {
        let page: ChartPage = serde_json::from_str(
            r#"{ "charts": [ { "role": "owner", "id": "a", "name": "A", "coverId": "eng" } ], "hasMore": false }"#,
        )
        .unwrap();
        assert_eq!(page.items.len(), 1);
        assert_eq!(page.items[0].chart.cover_id.as_deref(), Some("eng"));
        assert!(!page.has_more);
    }

    #[tokio::test]
    async fn directory_source_reads_objects_and_arrays() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("b.json"),
            r#"[{ "id": "b1", "name": "B1" }, { "id": "b2", "name": "B2" }]"#,
        )
        .unwrap();
        std::fs::write(dir.path().join("a.json"), r#"{ "id": "a", "name": "A" }"#).unwrap();
        std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let charts = DirectoryChartSource::new(dir.path())
            .list_owned_charts()
            .await
            .unwrap();
        let ids: Vec<&str> = charts.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, ["a", "b1", "b2"]);
    }

    #[tokio::test]
    async fn directory_source_reports_bad_json() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("bad.json"), "{ nope").unwrap();
        let err = DirectoryChartSource::new(dir.path())
            .list_owned_charts()
            .await
            .unwrap_err();
        assert!(matches!(err, SourceError::Parse { .. }));
    }
}
