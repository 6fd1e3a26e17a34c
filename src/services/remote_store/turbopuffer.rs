//! turbopuffer HTTP backend implementation.

use std::collections::{BTreeMap, VecDeque};
use std::time::Duration;

use reqwest::Method;
use reqwest::StatusCode;
use reqwest::blocking::{Client, RequestBuilder, Response};
use reqwest::header::HeaderMap;
use serde::Deserialize;

use super::{RemoteStore, RowIter};
use crate::error::RemoteStoreError;
use crate::models::{Batch, QuerySpec, ResultRow, RowId, StoreConfig};

const APPROX_COUNT_HEADER: &str = "x-turbopuffer-approx-num-vectors";
const DIMENSIONS_HEADER: &str = "x-turbopuffer-dimensions";

/// turbopuffer namespace backend over the v1 vectors API.
pub struct TurbopufferBackend {
    client: Client,
    base_url: String,
    namespace: String,
    api_key: String,
}

impl TurbopufferBackend {
    /// Create a new backend bound to `namespace`.
    pub fn new(config: &StoreConfig, namespace: &str) -> Result<Self, RemoteStoreError> {
        let api_key = config.api_key.clone().ok_or_else(|| {
            RemoteStoreError::ClientError(
                "missing API key; set TURBOPUFFER_API_KEY or store.api_key".to_string(),
            )
        })?;

        validate_namespace(namespace)?;

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(concat!("vecload/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| RemoteStoreError::ConnectionError(e.to_string()))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            namespace: namespace.to_string(),
            api_key,
        })
    }

    fn url(&self, suffix: &str) -> String {
        namespace_url(&self.base_url, &self.namespace, suffix)
    }

    fn request(&self, method: Method, suffix: &str) -> RequestBuilder {
        self.client
            .request(method, self.url(suffix))
            .bearer_auth(&self.api_key)
    }

    fn send(&self, request: RequestBuilder) -> Result<Response, RemoteStoreError> {
        request
            .send()
            .map_err(|e| RemoteStoreError::ConnectionError(e.to_string()))
    }

    /// Namespace headers, or `None` if the namespace does not exist.
    fn head(&self) -> Result<Option<HeaderMap>, RemoteStoreError> {
        let response = self.send(self.request(Method::HEAD, ""))?;
        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => Ok(Some(response.headers().clone())),
            _ => Err(api_error(response)),
        }
    }

    fn fetch_page(&self, cursor: Option<&str>) -> Result<Option<ExportPage>, RemoteStoreError> {
        let mut request = self.request(Method::GET, "");
        if let Some(cursor) = cursor {
            request = request.query(&[("cursor", cursor)]);
        }

        let response = self.send(request)?;
        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => response
                .json::<ExportPage>()
                .map(Some)
                .map_err(|e| RemoteStoreError::DecodeError(e.to_string())),
            _ => Err(api_error(response)),
        }
    }
}

impl RemoteStore for TurbopufferBackend {
    fn namespace(&self) -> &str {
        &self.namespace
    }

    fn exists(&self) -> Result<bool, RemoteStoreError> {
        Ok(self.head()?.is_some())
    }

    fn approx_count(&self) -> Result<u64, RemoteStoreError> {
        match self.head()? {
            Some(headers) => header_value(&headers, APPROX_COUNT_HEADER),
            None => Ok(0),
        }
    }

    fn dimensions(&self) -> Result<usize, RemoteStoreError> {
        match self.head()? {
            Some(headers) => header_value(&headers, DIMENSIONS_HEADER),
            None => Ok(0),
        }
    }

    fn delete_all(&self) -> Result<(), RemoteStoreError> {
        let response = self.send(self.request(Method::DELETE, ""))?;
        match response.status() {
            StatusCode::NOT_FOUND => Ok(()),
            status if status.is_success() => Ok(()),
            _ => Err(RemoteStoreError::DeleteError(api_error(response).to_string())),
        }
    }

    fn upsert(&self, batch: &Batch) -> Result<(), RemoteStoreError> {
        if batch.is_empty() {
            return Ok(());
        }

        let response = self.send(self.request(Method::POST, "").json(batch))?;
        if response.status().is_success() {
            Ok(())
        } else {
            Err(RemoteStoreError::UpsertError(api_error(response).to_string()))
        }
    }

    fn query(&self, query: &QuerySpec) -> Result<RowIter<'_>, RemoteStoreError> {
        let response = self.send(self.request(Method::POST, "/query").json(query))?;
        if !response.status().is_success() {
            return Err(RemoteStoreError::QueryError(api_error(response).to_string()));
        }

        let rows: Vec<ResultRow> = response
            .json()
            .map_err(|e| RemoteStoreError::DecodeError(e.to_string()))?;
        Ok(Box::new(rows.into_iter().map(Ok)))
    }

    fn list_all(&self) -> Result<RowIter<'_>, RemoteStoreError> {
        Ok(Box::new(ExportIter {
            backend: self,
            buffered: VecDeque::new(),
            cursor: None,
            finished: false,
        }))
    }
}

/// One page of the paginated export endpoint, column-oriented.
#[derive(Debug, Deserialize)]
struct ExportPage {
    #[serde(default)]
    ids: Vec<RowId>,
    #[serde(default)]
    vectors: Option<Vec<Option<Vec<f32>>>>,
    #[serde(default)]
    attributes: Option<BTreeMap<String, Vec<serde_json::Value>>>,
    #[serde(default)]
    next_cursor: Option<String>,
}

impl ExportPage {
    fn into_rows(self) -> Result<Vec<ResultRow>, RemoteStoreError> {
        let len = self.ids.len();
        let mut vectors = self.vectors.unwrap_or_else(|| vec![None; len]);
        if vectors.len() != len {
            return Err(RemoteStoreError::DecodeError(format!(
                "export page has {} ids but {} vectors",
                len,
                vectors.len()
            )));
        }

        let attributes = self.attributes.unwrap_or_default();
        if let Some((name, values)) = attributes.iter().find(|(_, v)| v.len() != len) {
            return Err(RemoteStoreError::DecodeError(format!(
                "export page has {} ids but attribute '{}' has {} values",
                len,
                name,
                values.len()
            )));
        }

        let rows = self
            .ids
            .into_iter()
            .enumerate()
            .map(|(i, id)| {
                let row_attributes: BTreeMap<String, serde_json::Value> = attributes
                    .iter()
                    .filter(|(_, values)| !values[i].is_null())
                    .map(|(name, values)| (name.clone(), values[i].clone()))
                    .collect();
                ResultRow {
                    id,
                    vector: vectors[i].take(),
                    attributes: (!row_attributes.is_empty()).then_some(row_attributes),
                    dist: None,
                }
            })
            .collect();

        Ok(rows)
    }
}

/// Lazily walks the export pages of a namespace.
struct ExportIter<'a> {
    backend: &'a TurbopufferBackend,
    buffered: VecDeque<ResultRow>,
    cursor: Option<String>,
    finished: bool,
}

impl Iterator for ExportIter<'_> {
    type Item = Result<ResultRow, RemoteStoreError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(row) = self.buffered.pop_front() {
                return Some(Ok(row));
            }
            if self.finished {
                return None;
            }

            let page = match self.backend.fetch_page(self.cursor.as_deref()) {
                Ok(Some(page)) => page,
                Ok(None) => {
                    self.finished = true;
                    continue;
                }
                Err(e) => {
                    self.finished = true;
                    return Some(Err(e));
                }
            };

            self.cursor = page.next_cursor.clone();
            self.finished = self.cursor.is_none();
            match page.into_rows() {
                Ok(rows) => self.buffered.extend(rows),
                Err(e) => {
                    self.finished = true;
                    return Some(Err(e));
                }
            }
        }
    }
}

fn validate_namespace(namespace: &str) -> Result<(), RemoteStoreError> {
    let valid = !namespace.is_empty()
        && namespace
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
    if valid {
        Ok(())
    } else {
        Err(RemoteStoreError::NamespaceError(format!(
            "invalid namespace name: '{}'",
            namespace
        )))
    }
}

fn namespace_url(base_url: &str, namespace: &str, suffix: &str) -> String {
    format!("{}/v1/vectors/{}{}", base_url, namespace, suffix)
}

fn header_value<T: std::str::FromStr>(
    headers: &HeaderMap,
    name: &str,
) -> Result<T, RemoteStoreError> {
    let Some(value) = headers.get(name) else {
        return Err(RemoteStoreError::DecodeError(format!(
            "missing response header: {}",
            name
        )));
    };
    value
        .to_str()
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .ok_or_else(|| RemoteStoreError::DecodeError(format!("invalid header {}: {:?}", name, value)))
}

fn api_error(response: Response) -> RemoteStoreError {
    let status = response.status().as_u16();
    let body = response.text().unwrap_or_default();
    RemoteStoreError::ApiError {
        status,
        message: error_message(&body),
    }
}

/// Pull the `error` field out of a JSON error body, falling back to the raw text.
fn error_message(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v.get("error").and_then(|e| e.as_str()).map(str::to_string))
        .unwrap_or_else(|| body.trim().to_string())
}
