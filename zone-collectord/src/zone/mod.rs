pub mod xfr;

use async_trait::async_trait;
use shared::types::ServiceRecord;
use crate::error::TransferError;

pub use xfr::AxfrClient;

/// Produces one snapshot of a zone's address records.
#[async_trait]
pub trait ZoneSource: Send + Sync {
    async fn transfer(&self, domain: &str) -> Result<Vec<ServiceRecord>, TransferError>;
}
