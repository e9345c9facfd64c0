use api_client::error::ApiError;
use api_client::{ConnectionCredentials, IngestClient};
use async_trait::async_trait;

/// The connect/disconnect half of a streaming ingest client.
///
/// Records flow through the channel receiver handed out alongside the
/// session, so the runner only needs lifecycle control here.
#[async_trait]
pub trait IngestSession: Send {
    async fn connect(&mut self, credentials: &ConnectionCredentials) -> Result<(), ApiError>;

    /// Stops ingestion. Returns `false` when nothing was connected.
    async fn disconnect(&mut self) -> bool;
}

#[async_trait]
impl IngestSession for IngestClient {
    async fn connect(&mut self, credentials: &ConnectionCredentials) -> Result<(), ApiError> {
        IngestClient::connect(self, credentials).await
    }

    async fn disconnect(&mut self) -> bool {
        IngestClient::disconnect(self).await
    }
}
