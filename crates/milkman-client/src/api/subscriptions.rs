use super::{paged, segment, Page};
use crate::client::{ApiClient, ApiRequest};
use crate::error::Result;
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde::Serialize;

/// `/subscribe` endpoints for recurring deliveries.
#[derive(Debug, Clone, Copy)]
pub struct Subscriptions<'a> {
    client: &'a ApiClient,
}

impl<'a> Subscriptions<'a> {
    pub(crate) fn new(client: &'a ApiClient) -> Self {
        Self { client }
    }

    /// Start a subscription.
    pub async fn create<B: Serialize + ?Sized, T: DeserializeOwned>(self, subscription: &B) -> Result<T> {
        self.client.post("/subscribe/create", subscription).await
    }

    /// List every subscription, or only `customer_id`'s.
    pub async fn list<T: DeserializeOwned>(
        self,
        customer_id: Option<&str>,
        page: Option<Page>,
    ) -> Result<Vec<T>> {
        let path = match customer_id {
            Some(id) => format!("/subscribe/getAllSubscriptions/{}", segment(id)),
            None => "/subscribe/getAllSubscriptions".to_string(),
        };
        self.client
            .execute_json(paged(ApiRequest::new(Method::GET, path), page))
            .await
    }

    /// Change quantities or schedule.
    pub async fn update<B: Serialize + ?Sized, T: DeserializeOwned>(self, subscription: &B) -> Result<T> {
        self.client.put("/subscribe/update", subscription).await
    }

    /// End a subscription.
    pub async fn delete(self, subscription_id: &str) -> Result<()> {
        self.client
            .delete(&format!("/subscribe/delete/{}", segment(subscription_id)))
            .await
    }
}
