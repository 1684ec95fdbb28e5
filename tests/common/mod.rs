//! Shared test fixtures for integration tests.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use microgrid_dr::audit::MemoryAuditLog;
use microgrid_dr::config::ServiceConfig;
use microgrid_dr::devices::{Device, DeviceType, MemoryDirectory};
use microgrid_dr::service::Services;
use microgrid_dr::transport::{LocalBus, Message, Subscription};

/// Fully wired core plus handles on its in-memory adapters.
pub struct Harness {
    pub services: Arc<Services>,
    pub directory: Arc<MemoryDirectory>,
    pub log: Arc<MemoryAuditLog>,
    pub bus: Arc<LocalBus>,
}

/// Builds the core over `devices` with otherwise default configuration.
pub fn harness(devices: impl IntoIterator<Item = Device>) -> Harness {
    harness_with(&ServiceConfig::empty(), devices)
}

/// Builds the core over `devices` with the given configuration.
pub fn harness_with(config: &ServiceConfig, devices: impl IntoIterator<Item = Device>) -> Harness {
    microgrid_dr::logging::init_test();
    let directory = Arc::new(MemoryDirectory::new(devices));
    let log = Arc::new(MemoryAuditLog::new());
    let bus = Arc::new(LocalBus::new());
    let services = Services::new(config, directory.clone(), log.clone(), bus.clone())
        .expect("configuration should build");
    Harness {
        services: Arc::new(services),
        directory,
        log,
        bus,
    }
}

/// Core with an empty device directory.
pub fn bare() -> Harness {
    harness(no_devices())
}

pub fn no_devices() -> Vec<Device> {
    Vec::new()
}

/// Controllable, running device.
pub fn device(id: &str, watts: f64, priority: u8) -> Device {
    Device::new(id, DeviceType::Other, watts, priority)
}

/// Controllable, running device of a given type.
pub fn typed(id: &str, device_type: DeviceType, watts: f64, priority: u8) -> Device {
    Device::new(id, device_type, watts, priority)
}

/// Waits up to two seconds for the next message on `sub`.
pub async fn next_message(sub: &mut Subscription) -> Message {
    tokio::time::timeout(Duration::from_secs(2), sub.recv())
        .await
        .expect("message should arrive in time")
        .expect("subscription should stay open")
}

/// Asserts that nothing arrives on `sub` within 100 ms.
pub async fn assert_silent(sub: &mut Subscription) {
    let res = tokio::time::timeout(Duration::from_millis(100), sub.recv()).await;
    assert!(res.is_err(), "unexpected message: {:?}", res.ok().flatten());
}
