//! Raw capture producer
//!
//! Pages through an external source by offset and limit, concatenates the
//! items and persists exactly one raw capture per fetch window. Paging is
//! bounded twice: the page size is capped and the number of pages has a
//! hard ceiling, so a misbehaving source cannot loop forever.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use reqwest::Client;
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::error::{IngestError, Result};
use crate::models::RawCapture;

// ============================================================================
// Pagination Constants
// ============================================================================

/// Items requested per page unless configured otherwise
pub const DEFAULT_PAGE_SIZE: usize = 500;

/// Largest page the producer will ever request
pub const MAX_PAGE_SIZE: usize = 1000;

/// Hard ceiling on pages fetched for one window
pub const DEFAULT_MAX_PAGES: usize = 50;

/// Default payload key for captured items
pub const DEFAULT_CONTAINER: &str = "list";

/// One page of an external listing
#[async_trait]
pub trait PageSource: Send + Sync {
    async fn fetch_page(&self, offset: usize, limit: usize) -> Result<Vec<Value>>;
}

/// Destination for newly produced raw captures
#[async_trait]
pub trait CaptureSink: Send + Sync {
    /// Persist the capture and return its id
    async fn persist(&self, capture: NewRawCapture) -> Result<i64>;
}

/// A raw capture before it has an id
#[derive(Debug, Clone, PartialEq)]
pub struct NewRawCapture {
    pub tenant_id: i64,
    pub data_type: String,
    pub data_date: Option<NaiveDate>,
    pub source_payload: Value,
    pub record_count: Option<i64>,
}

impl NewRawCapture {
    pub fn new(tenant_id: i64, data_type: impl Into<String>, source_payload: Value) -> Self {
        Self {
            tenant_id,
            data_type: data_type.into(),
            data_date: None,
            source_payload,
            record_count: None,
        }
    }

    pub fn with_data_date(mut self, data_date: NaiveDate) -> Self {
        self.data_date = Some(data_date);
        self
    }

    pub fn with_record_count(mut self, record_count: usize) -> Self {
        self.record_count = i64::try_from(record_count).ok();
        self
    }

    pub fn into_raw_capture(self, id: i64, captured_at: DateTime<Utc>) -> RawCapture {
        RawCapture {
            id,
            tenant_id: self.tenant_id,
            data_type: self.data_type,
            data_date: self.data_date,
            captured_at,
            source_payload: self.source_payload,
            record_count: self.record_count,
            processed: false,
            processed_at: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PaginationLimits {
    pub page_size: usize,
    pub max_pages: usize,
}

impl Default for PaginationLimits {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            max_pages: DEFAULT_MAX_PAGES,
        }
    }
}

impl PaginationLimits {
    /// Requested page size, capped at [`MAX_PAGE_SIZE`]
    pub fn effective_page_size(&self) -> Result<usize> {
        if self.page_size == 0 || self.max_pages == 0 {
            return Err(IngestError::InvalidInput(
                "page size and page ceiling must be greater than 0".into(),
            ));
        }
        Ok(self.page_size.min(MAX_PAGE_SIZE))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CollectedPages {
    pub items: Vec<Value>,
    pub pages: usize,
    /// The page ceiling stopped paging before the source ran dry
    pub truncated: bool,
}

/// Fetch pages until a short or empty page, or the page ceiling
pub async fn collect_pages(source: &dyn PageSource, limits: PaginationLimits) -> Result<CollectedPages> {
    let page_size = limits.effective_page_size()?;
    let mut items = Vec::new();
    let mut pages = 0;

    while pages < limits.max_pages {
        let page = source.fetch_page(items.len(), page_size).await?;
        pages += 1;
        let fetched = page.len();
        items.extend(page);
        debug!(page = pages, fetched, total = items.len(), "Fetched page");

        if fetched < page_size {
            return Ok(CollectedPages {
                items,
                pages,
                truncated: false,
            });
        }
    }

    warn!(
        pages,
        items = items.len(),
        max_pages = limits.max_pages,
        "Page ceiling reached, capture may be incomplete"
    );
    Ok(CollectedPages {
        items,
        pages,
        truncated: true,
    })
}

/// Summary of one produced capture
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureReceipt {
    pub raw_capture_id: i64,
    pub record_count: usize,
    pub pages: usize,
    pub truncated: bool,
}

pub struct CaptureProducer {
    source: Arc<dyn PageSource>,
    sink: Arc<dyn CaptureSink>,
    limits: PaginationLimits,
    container: String,
}

impl CaptureProducer {
    pub fn new(source: Arc<dyn PageSource>, sink: Arc<dyn CaptureSink>) -> Self {
        Self {
            source,
            sink,
            limits: PaginationLimits::default(),
            container: DEFAULT_CONTAINER.to_string(),
        }
    }

    pub fn with_limits(mut self, limits: PaginationLimits) -> Self {
        self.limits = limits;
        self
    }

    /// Payload key the items are stored under (`list`, `items`)
    pub fn with_container(mut self, container: impl Into<String>) -> Self {
        self.container = container.into();
        self
    }

    /// Fetch one window and persist it as a single raw capture
    pub async fn capture(
        &self,
        tenant_id: i64,
        data_type: &str,
        data_date: Option<NaiveDate>,
    ) -> Result<CaptureReceipt> {
        let collected = collect_pages(self.source.as_ref(), self.limits).await?;
        let record_count = collected.items.len();
        let (pages, truncated) = (collected.pages, collected.truncated);

        let mut payload = Map::new();
        payload.insert(self.container.clone(), Value::Array(collected.items));
        let mut capture = NewRawCapture::new(tenant_id, data_type, Value::Object(payload))
            .with_record_count(record_count);
        if let Some(date) = data_date {
            capture = capture.with_data_date(date);
        }

        let raw_capture_id = self.sink.persist(capture).await?;
        info!(
            raw_capture_id,
            tenant_id,
            data_type,
            record_count,
            pages,
            truncated,
            "Raw capture stored"
        );

        Ok(CaptureReceipt {
            raw_capture_id,
            record_count,
            pages,
            truncated,
        })
    }
}

/// Offset/limit paginated JSON endpoint
///
/// Each page is either a bare JSON array or an object holding the array
/// under `items_field`.
pub struct HttpPageSource {
    client: Client,
    url: String,
    offset_param: String,
    limit_param: String,
    items_field: Option<String>,
    bearer_token: Option<String>,
}

impl HttpPageSource {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            url: url.into(),
            offset_param: "offset".to_string(),
            limit_param: "limit".to_string(),
            items_field: None,
            bearer_token: None,
        })
    }

    pub fn with_params(mut self, offset_param: &str, limit_param: &str) -> Self {
        self.offset_param = offset_param.to_string();
        self.limit_param = limit_param.to_string();
        self
    }

    pub fn with_items_field(mut self, field: impl Into<String>) -> Self {
        self.items_field = Some(field.into());
        self
    }

    pub fn with_bearer_token(mut self, token: impl Into<String>) -> Self {
        self.bearer_token = Some(token.into());
        self
    }
}

#[async_trait]
impl PageSource for HttpPageSource {
    async fn fetch_page(&self, offset: usize, limit: usize) -> Result<Vec<Value>> {
        let mut request = self.client.get(&self.url).query(&[
            (self.offset_param.as_str(), offset.to_string()),
            (self.limit_param.as_str(), limit.to_string()),
        ]);
        if let Some(token) = &self.bearer_token {
            request = request.bearer_auth(token);
        }

        let body: Value = request.send().await?.error_for_status()?.json().await?;
        let items = match &self.items_field {
            Some(field) => body.get(field).cloned().unwrap_or(Value::Null),
            None => body,
        };

        match items {
            Value::Array(items) => Ok(items),
            Value::Null => Ok(Vec::new()),
            other => Err(IngestError::InvalidInput(format!(
                "page from {} is not a list: {}",
                self.url,
                truncate_for_log(&other.to_string())
            ))),
        }
    }
}

fn truncate_for_log(s: &str) -> &str {
    match s.char_indices().nth(120) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Mutex;

    /// Serves `total` numbered items, recording requested windows
    struct FakeSource {
        total: usize,
        requests: Mutex<Vec<(usize, usize)>>,
    }

    impl FakeSource {
        fn new(total: usize) -> Self {
            Self {
                total,
                requests: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl PageSource for FakeSource {
        async fn fetch_page(&self, offset: usize, limit: usize) -> Result<Vec<Value>> {
            self.requests.lock().unwrap().push((offset, limit));
            let end = (offset + limit).min(self.total);
            Ok((offset.min(end)..end).map(|i| json!({"id": i})).collect())
        }
    }

    #[tokio::test]
    async fn test_stops_on_short_page() {
        let source = FakeSource::new(1234);
        let collected = collect_pages(&source, PaginationLimits::default()).await.unwrap();

        assert_eq!(collected.items.len(), 1234);
        assert_eq!(collected.pages, 3);
        assert!(!collected.truncated);
        assert_eq!(
            *source.requests.lock().unwrap(),
            vec![(0, 500), (500, 500), (1000, 500)]
        );
    }

    #[tokio::test]
    async fn test_exact_multiple_needs_one_empty_page() {
        let source = FakeSource::new(1000);
        let collected = collect_pages(&source, PaginationLimits::default()).await.unwrap();
        assert_eq!(collected.items.len(), 1000);
        assert_eq!(collected.pages, 3);
    }

    #[tokio::test]
    async fn test_page_ceiling_truncates() {
        let source = FakeSource::new(10_000);
        let limits = PaginationLimits {
            page_size: 5000,
            max_pages: 2,
        };
        let collected = collect_pages(&source, limits).await.unwrap();

        assert!(collected.truncated);
        assert_eq!(collected.items.len(), 2 * MAX_PAGE_SIZE);
        assert_eq!(source.requests.lock().unwrap()[1], (MAX_PAGE_SIZE, MAX_PAGE_SIZE));
    }

    #[tokio::test]
    async fn test_zero_limits_are_rejected() {
        let source = FakeSource::new(1);
        let limits = PaginationLimits {
            page_size: 0,
            max_pages: 1,
        };
        assert!(matches!(
            collect_pages(&source, limits).await,
            Err(IngestError::InvalidInput(_))
        ));
    }
}
