//! Capability traits and the gateway facade.
//!
//! A [`Gateway`] composes exactly one [`Receiver`] (inbound events) with one
//! [`Requester`] (outbound API calls). Receivers push the `d` object of every
//! event frame onto an unbounded queue; the client dispatch loop is the
//! single consumer.
//!
//! ```text
//! ┌──────────┐   Value    ┌──────────────┐
//! │ Receiver │──────────▶│ event queue  │──▶ client dispatch
//! └──────────┘            └──────────────┘
//!       ▲
//!       │ gateway/index
//! ┌──────────┐
//! │Requester │◀── Context::send / handler code
//! └──────────┘
//! ```

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value, json};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::{ApiError, ApiResult, TransportResult};

// =============================================================================
// Event Queue
// =============================================================================

/// Producer half of the raw event queue.
pub type EventSender = mpsc::UnboundedSender<Value>;

/// Consumer half of the raw event queue.
pub type EventReceiver = mpsc::UnboundedReceiver<Value>;

/// Creates a new raw event queue.
pub fn event_channel() -> (EventSender, EventReceiver) {
    mpsc::unbounded_channel()
}

// =============================================================================
// Method
// =============================================================================

/// HTTP method of an outbound API call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    /// `GET`; parameters travel in the query string.
    Get,
    /// `POST`; parameters travel as a JSON body.
    Post,
}

impl Method {
    /// Returns the upper-case method name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Capability Traits
// =============================================================================

/// Authenticated outbound API access.
#[async_trait]
pub trait Requester: Send + Sync {
    /// Performs one API call and returns the `data` field of the response envelope.
    ///
    /// A non-zero envelope `code` is reported as [`ApiError::RequestFailed`].
    async fn request(&self, method: Method, route: &str, params: Value) -> ApiResult<Value>;

    /// Performs one API call and returns the undecoded response body.
    async fn request_raw(&self, method: Method, route: &str, params: Value)
    -> ApiResult<Vec<u8>>;

    /// Uploads a file and returns its hosted URL.
    async fn upload_asset(&self, _bytes: Vec<u8>, _file_name: &str) -> ApiResult<String> {
        Err(ApiError::NotSupported)
    }
}

/// A source of inbound events.
///
/// `start` runs until `cancel` fires (or an unrecoverable error occurs) and
/// pushes the payload of every deliverable event onto `events`.
#[async_trait]
pub trait Receiver: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Runs the receive loop.
    async fn start(&self, events: EventSender, cancel: CancellationToken) -> TransportResult<()>;
}

// =============================================================================
// Gateway
// =============================================================================

/// One receiver plus one requester behind a single handle.
///
/// Message contexts hold a `Weak<Gateway>`; the gateway's lifetime is owned
/// by whoever built it (normally the bot).
pub struct Gateway {
    receiver: Arc<dyn Receiver>,
    requester: Arc<dyn Requester>,
}

impl Gateway {
    /// Composes a receiver and a requester.
    pub fn new(receiver: Arc<dyn Receiver>, requester: Arc<dyn Requester>) -> Arc<Self> {
        Arc::new(Self {
            receiver,
            requester,
        })
    }

    /// Returns the requester.
    pub fn requester(&self) -> &Arc<dyn Requester> {
        &self.requester
    }

    /// Returns the receiver's name.
    pub fn receiver_name(&self) -> &'static str {
        self.receiver.name()
    }

    /// Runs the receiver until cancelled.
    pub async fn run(&self, events: EventSender, cancel: CancellationToken) -> TransportResult<()> {
        debug!(receiver = self.receiver.name(), "Gateway receiver starting");
        self.receiver.start(events, cancel).await
    }

    /// Shorthand for [`Requester::request`].
    pub async fn request(&self, method: Method, route: &str, params: Value) -> ApiResult<Value> {
        self.requester.request(method, route, params).await
    }

    /// Shorthand for [`Requester::request_raw`].
    pub async fn request_raw(
        &self,
        method: Method,
        route: &str,
        params: Value,
    ) -> ApiResult<Vec<u8>> {
        self.requester.request_raw(method, route, params).await
    }
}

impl fmt::Debug for Gateway {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Gateway")
            .field("receiver", &self.receiver.name())
            .finish_non_exhaustive()
    }
}

// =============================================================================
// Pagination
// =============================================================================

/// Walks a paginated list route and concatenates the `items` of every page.
///
/// Pages are requested as `page=1..=meta.page_total`; `max_pages` bounds the
/// walk when set.
pub async fn paginate(
    requester: &dyn Requester,
    method: Method,
    route: &str,
    params: Value,
    page_size: u32,
    max_pages: Option<u32>,
) -> ApiResult<Vec<Value>> {
    let base = match params {
        Value::Object(map) => map,
        Value::Null => Map::new(),
        other => {
            return Err(ApiError::Other(format!(
                "pagination params must be an object, got {other}"
            )));
        }
    };

    let mut items = Vec::new();
    let mut page = 1u32;
    loop {
        let mut query = base.clone();
        query.insert("page".into(), json!(page));
        query.insert("page_size".into(), json!(page_size));

        let data = requester.request(method, route, Value::Object(query)).await?;
        if let Some(Value::Array(batch)) = data.get("items") {
            items.extend(batch.iter().cloned());
        }

        let page_total = data
            .pointer("/meta/page_total")
            .and_then(Value::as_u64)
            .unwrap_or(1);
        if u64::from(page) >= page_total || max_pages.is_some_and(|cap| page >= cap) {
            break;
        }
        page += 1;
    }
    Ok(items)
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    struct PagedRequester {
        pages: u64,
        seen: Mutex<Vec<u64>>,
    }

    #[async_trait]
    impl Requester for PagedRequester {
        async fn request(&self, _: Method, _: &str, params: Value) -> ApiResult<Value> {
            let page = params["page"].as_u64().unwrap_or_default();
            self.seen.lock().push(page);
            Ok(json!({
                "items": [{"page": page}],
                "meta": {"page": page, "page_total": self.pages}
            }))
        }

        async fn request_raw(&self, _: Method, _: &str, _: Value) -> ApiResult<Vec<u8>> {
            Err(ApiError::NotSupported)
        }
    }

    #[tokio::test]
    async fn paginate_walks_all_pages() {
        let requester = PagedRequester {
            pages: 3,
            seen: Mutex::new(Vec::new()),
        };
        let items = paginate(&requester, Method::Get, "guild/list", Value::Null, 50, None)
            .await
            .unwrap();
        assert_eq!(items.len(), 3);
        assert_eq!(*requester.seen.lock(), vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn paginate_respects_page_cap() {
        let requester = PagedRequester {
            pages: 10,
            seen: Mutex::new(Vec::new()),
        };
        let items = paginate(
            &requester,
            Method::Get,
            "guild/list",
            json!({"guild_id": "g"}),
            50,
            Some(2),
        )
        .await
        .unwrap();
        assert_eq!(items.len(), 2);
    }

    #[tokio::test]
    async fn upload_is_unsupported_by_default() {
        let requester = PagedRequester {
            pages: 1,
            seen: Mutex::new(Vec::new()),
        };
        assert!(matches!(
            requester.upload_asset(vec![1], "a.png").await,
            Err(ApiError::NotSupported)
        ));
    }

    #[test]
    fn method_display() {
        assert_eq!(Method::Get.to_string(), "GET");
        assert_eq!(Method::Post.to_string(), "POST");
    }
}
