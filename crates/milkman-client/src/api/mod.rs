//! Typed access to the backend's resource endpoints.
//!
//! Each family borrows the [`ApiClient`](crate::ApiClient) and inherits its
//! token handling. Payloads are generic over serde types so callers can use
//! their own models, or `serde_json::Value`.

mod customers;
mod health;
mod orders;
mod products;
mod subscriptions;

pub use customers::Customers;
pub use health::Health;
pub use orders::Orders;
pub use products::Products;
pub use subscriptions::Subscriptions;

use crate::client::ApiRequest;

/// Zero-based page request, sent as `page` and `size` query parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    /// Page index, starting at 0
    pub page: u32,
    /// Items per page
    pub size: u32,
}

impl Page {
    /// Request page `page` of `size` items.
    #[must_use]
    pub fn new(page: u32, size: u32) -> Self {
        Self { page, size }
    }

    pub(crate) fn apply(self, request: ApiRequest) -> ApiRequest {
        request.query("page", self.page).query("size", self.size)
    }
}

impl Default for Page {
    fn default() -> Self {
        Self { page: 0, size: 20 }
    }
}

pub(crate) fn paged(request: ApiRequest, page: Option<Page>) -> ApiRequest {
    match page {
        Some(page) => page.apply(request),
        None => request,
    }
}

/// Percent-encode a single path segment.
pub(crate) fn segment(id: &str) -> String {
    urlencoding::encode(id).into_owned()
}
