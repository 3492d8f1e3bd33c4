//! Single-page and multi-page enumeration of list endpoints.
//!
//! With an explicit page size exactly one page is fetched starting at the caller's
//! cursor and the next cursor is handed back; the caller drives further pages.
//! Without one, every page is fetched with the default batch size until the
//! directory stops returning a `nextPageToken`. Cursors are opaque and never parsed.

use crate::client::DirectoryClient;
use crate::error::{ConnectorError, ConnectorResult};
use crate::executor::{Decode, Fetch, Fetched};
use crate::transport::ApiRequest;
use log::debug;
use serde_json::Value;

/// Largest page the directory accepts.
pub const MAX_PAGE_SIZE: u32 = 500;

/// Batch size used when the caller does not page explicitly.
pub const DEFAULT_BATCH_SIZE: u32 = 100;

/// Position in a paged enumeration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageCursor {
    pub token: String,
    pub page_size: u32,
}

/// Reject page sizes the directory would refuse.
pub fn validate_page_size(page_size: u32) -> ConnectorResult<u32> {
    if (1..=MAX_PAGE_SIZE).contains(&page_size) {
        Ok(page_size)
    } else {
        Err(ConnectorError::invalid_attribute(
            "pageSize",
            format!("must be between 1 and {}, got {}", MAX_PAGE_SIZE, page_size),
        ))
    }
}

/// Fetch one object; a missing object is `None`.
pub async fn fetch_one(client: &DirectoryClient, request: ApiRequest) -> ConnectorResult<Option<Value>> {
    let fetched = client.call(request, &Fetch::<Value>::new()).await?;
    if fetched == Fetched::NotFound {
        debug!("Direct fetch found nothing");
    }
    Ok(fetched.found())
}

/// Drives enumeration of one list endpoint.
pub struct PaginatedSearchDriver<'a> {
    client: &'a DirectoryClient,
    default_batch_size: u32,
}

impl<'a> PaginatedSearchDriver<'a> {
    pub fn new(client: &'a DirectoryClient, default_batch_size: u32) -> Self {
        Self {
            client,
            default_batch_size,
        }
    }

    /// Start an enumeration. Fails before any call when `page_size` is out of range.
    pub fn pages<F>(
        &self,
        request_factory: F,
        page_size: Option<u32>,
        cursor: Option<&str>,
        items_key: &str,
    ) -> ConnectorResult<Pages<'a, F>>
    where
        F: Fn() -> ApiRequest + Send + Sync,
    {
        let (size, single_page) = match page_size {
            Some(size) => (validate_page_size(size)?, true),
            None => (self.default_batch_size.clamp(1, MAX_PAGE_SIZE), false),
        };
        Ok(Pages {
            client: self.client,
            request_factory,
            items_key: items_key.to_string(),
            page_size: size,
            single_page,
            token: cursor.filter(|c| !c.trim().is_empty()).map(str::to_string),
            next_cursor: None,
            finished: false,
            fetches: 0,
        })
    }

    /// Enumerate items, calling `on_item` for each until it returns `false`.
    ///
    /// Returns the cursor of the next page in single-page mode when more pages exist.
    pub async fn drive<F, C>(
        &self,
        request_factory: F,
        page_size: Option<u32>,
        cursor: Option<&str>,
        items_key: &str,
        mut on_item: C,
    ) -> ConnectorResult<Option<PageCursor>>
    where
        F: Fn() -> ApiRequest + Send + Sync,
        C: FnMut(Value) -> ConnectorResult<bool> + Send,
    {
        let mut pages = self.pages(request_factory, page_size, cursor, items_key)?;
        while let Some(items) = pages.next_page().await? {
            for item in items {
                if !on_item(item)? {
                    debug!("Enumeration stopped by caller");
                    return Ok(pages.cursor());
                }
            }
        }
        Ok(pages.cursor())
    }
}

/// Page-at-a-time view of an enumeration, for callers that need to await per item.
pub struct Pages<'a, F> {
    client: &'a DirectoryClient,
    request_factory: F,
    items_key: String,
    page_size: u32,
    single_page: bool,
    token: Option<String>,
    next_cursor: Option<String>,
    finished: bool,
    fetches: u32,
}

impl<F> Pages<'_, F>
where
    F: Fn() -> ApiRequest + Send + Sync,
{
    /// Fetch the next page, or `None` when the enumeration is complete.
    pub async fn next_page(&mut self) -> ConnectorResult<Option<Vec<Value>>> {
        if self.finished {
            return Ok(None);
        }
        let mut request = (self.request_factory)();
        request.set_query("maxResults", self.page_size.to_string());
        if let Some(token) = &self.token {
            request.set_query("pageToken", token.clone());
        }

        let body: Value = self.client.call(request, &Decode::new()).await?;
        self.fetches += 1;

        let items = match body.get(&self.items_key) {
            Some(Value::Array(items)) => items.clone(),
            _ => Vec::new(),
        };
        let next = body
            .get("nextPageToken")
            .and_then(Value::as_str)
            .filter(|t| !t.trim().is_empty())
            .map(str::to_string);
        debug!(
            "Fetched page {} with {} {} (more: {})",
            self.fetches,
            items.len(),
            self.items_key,
            next.is_some()
        );

        if self.single_page {
            self.finished = true;
            self.next_cursor = next;
        } else {
            self.finished = next.is_none();
            self.token = next;
        }
        Ok(Some(items))
    }

    /// Cursor of the page after the one fetched in single-page mode.
    pub fn cursor(&self) -> Option<PageCursor> {
        self.next_cursor.as_ref().map(|token| PageCursor {
            token: token.clone(),
            page_size: self.page_size,
        })
    }

    /// Number of pages fetched so far.
    pub fn fetches(&self) -> u32 {
        self.fetches
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_size_bounds() {
        assert_eq!(validate_page_size(1).unwrap(), 1);
        assert_eq!(validate_page_size(500).unwrap(), 500);
        assert!(validate_page_size(0).is_err());
        assert!(matches!(
            validate_page_size(501),
            Err(ConnectorError::InvalidAttribute { .. })
        ));
    }
}
