//! Wiring of planners, ledger, dispatcher and audit from configuration.

use std::sync::Arc;

use chrono::TimeDelta;

use crate::audit::{AuditRecorder, AuditSink};
use crate::config::{ConfigError, ServiceConfig};
use crate::devices::DeviceDirectory;
use crate::dispatch::CommandDispatcher;
use crate::grid::{GridLedger, GridTelemetry, StaticGridTelemetry};
use crate::planning::{LoadShedder, LoadShifter};
use crate::policy::PriorityPolicy;
use crate::transport::Transport;

/// Every component of the demand-response core, sharing one directory,
/// one audit recorder and one transport.
///
/// Shared by the HTTP handlers and the transport runner as `Arc<Services>`.
pub struct Services {
    pub policy: Arc<PriorityPolicy>,
    pub shedder: LoadShedder,
    pub shifter: LoadShifter,
    pub ledger: Arc<GridLedger>,
    pub dispatcher: CommandDispatcher,
    pub audit: Arc<AuditRecorder>,
    pub transport: Arc<dyn Transport>,
}

impl Services {
    /// Builds the core with the static grid telemetry described by `config`.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if the configured priority table is unusable.
    pub fn new(
        config: &ServiceConfig,
        directory: Arc<dyn DeviceDirectory>,
        sink: Arc<dyn AuditSink>,
        transport: Arc<dyn Transport>,
    ) -> Result<Self, ConfigError> {
        let telemetry = Arc::new(StaticGridTelemetry(config.grid_snapshot()));
        Self::with_telemetry(config, directory, sink, transport, telemetry)
    }

    /// Builds the core around a caller-supplied grid telemetry source.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if the configured priority table is unusable.
    pub fn with_telemetry(
        config: &ServiceConfig,
        directory: Arc<dyn DeviceDirectory>,
        sink: Arc<dyn AuditSink>,
        transport: Arc<dyn Transport>,
        telemetry: Arc<dyn GridTelemetry>,
    ) -> Result<Self, ConfigError> {
        let policy = Arc::new(config.priority_policy()?);
        let audit = Arc::new(AuditRecorder::new(
            sink,
            transport.clone(),
            config.transport.error_encoding,
        ));
        let ledger = Arc::new(GridLedger::with_retention(
            audit.clone(),
            telemetry,
            TimeDelta::minutes(i64::from(config.grid.settled_retention_minutes)),
        ));

        Ok(Self {
            shedder: LoadShedder::new(policy.clone(), directory.clone(), audit.clone()),
            shifter: LoadShifter::new(policy.clone(), directory, audit.clone()),
            dispatcher: CommandDispatcher::new(
                ledger.clone(),
                audit.clone(),
                transport.clone(),
                config.grid.default_price_per_kwh,
                config.dispatch.derived_power_kw,
            ),
            policy,
            ledger,
            audit,
            transport,
        })
    }
}
