use std::sync::Arc;

use async_trait::async_trait;

use crate::error::SdkError;
use crate::publisher::Publisher;
use crate::stream::Stream;
use crate::types::{Arguments, StreamCatalogEntry, VersionRecord};

/// The sensor SDK seam (spec §1: "out of scope... the sensor SDK Core
/// itself"). Everything the server core needs from the underlying sensor
/// stack is expressed here; a real binding and the in-memory `mock` module
/// both implement it.
#[async_trait]
pub trait SensorCore: Send + Sync {
    async fn version(&self) -> VersionRecord;
    async fn stream_list(&self) -> Vec<StreamCatalogEntry>;

    /// `None` when the server config feature is not compiled in (spec §6
    /// lists `GetServerConfig` as optional).
    async fn server_config(&self) -> Option<Vec<(String, String)>>;

    async fn open_stream(
        &self,
        stream_key: &str,
        arguments: &Arguments,
    ) -> Result<Arc<dyn Stream>, SdkError>;
    async fn close_stream(&self, resource_id: u64) -> Result<(), SdkError>;

    async fn open_publisher(&self, key: &str) -> Result<Arc<dyn Publisher>, SdkError>;
    async fn close_publisher(&self, resource_id: u64) -> Result<(), SdkError>;
}
