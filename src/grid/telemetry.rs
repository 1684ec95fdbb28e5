use async_trait::async_trait;

use super::types::GridStatusSnapshot;
use crate::error::TelemetryError;

/// Source of live grid connectivity and tariff figures.
#[async_trait]
pub trait GridTelemetry: Send + Sync {
    async fn snapshot(&self) -> Result<GridStatusSnapshot, TelemetryError>;
}

/// Fixed snapshot used when no grid-controller integration is configured.
#[derive(Debug, Clone, Copy)]
pub struct StaticGridTelemetry(pub GridStatusSnapshot);

#[async_trait]
impl GridTelemetry for StaticGridTelemetry {
    async fn snapshot(&self) -> Result<GridStatusSnapshot, TelemetryError> {
        Ok(self.0)
    }
}
