use crate::client::ApiClient;
use crate::error::Result;
use serde_json::Value;

/// `/healthCheck` endpoints. Each returns the backend's raw status payload.
#[derive(Debug, Clone, Copy)]
pub struct Health<'a> {
    client: &'a ApiClient,
}

impl<'a> Health<'a> {
    pub(crate) fn new(client: &'a ApiClient) -> Self {
        Self { client }
    }

    /// Service liveness.
    pub async fn check(self) -> Result<Value> {
        self.client.get("/healthCheck").await
    }

    /// SMS gateway.
    pub async fn sms(self) -> Result<Value> {
        self.client.get("/healthCheck/sms").await
    }

    /// Mail gateway.
    pub async fn mail(self) -> Result<Value> {
        self.client.get("/healthCheck/mail").await
    }

    /// Encryption round trip, first half.
    pub async fn encrypt(self) -> Result<Value> {
        self.client.get("/healthCheck/encrypt").await
    }

    /// Encryption round trip, second half.
    pub async fn decrypt(self) -> Result<Value> {
        self.client.get("/healthCheck/decrypt").await
    }
}
