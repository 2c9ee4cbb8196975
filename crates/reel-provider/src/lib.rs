//! Video generation provider clients.
//!
//! Both clients implement [`GenerationProvider`]: a start call that returns
//! either an immediate result or an operation handle, and a status call for
//! that handle. Polling itself lives in the engine.

pub mod error;
pub mod flow;
pub mod lro;
pub mod types;

use async_trait::async_trait;
use reel_models::{GenerationRequest, GenerationStart, OperationHandle, OperationStatus};

pub use error::{ProviderError, ProviderResult};
pub use flow::{FlowClient, FlowConfig};
pub use lro::{LroClient, LroClientConfig};

/// A provider that runs generations as long-running operations.
#[async_trait]
pub trait GenerationProvider: Send + Sync {
    /// Submit a generation.
    async fn start(&self, request: &GenerationRequest) -> ProviderResult<GenerationStart>;

    /// Query one operation. Must not block waiting for completion.
    async fn status(&self, handle: &OperationHandle) -> ProviderResult<OperationStatus>;
}
