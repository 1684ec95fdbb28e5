/// Device directory port and in-memory adapter.
pub mod directory;
pub mod types;

pub use directory::{DeviceDirectory, DeviceFilter, DeviceUpdate, MemoryDirectory};
pub use types::{Device, DeviceState, DeviceType};
