// Device/session registry
// Binds each username to the single device allowed to act as it

pub mod manager;
pub mod types;

pub use manager::DeviceRegistry;
pub use types::{ActiveSessionRecord, DEVICE_KEY, DeviceId, REGISTRY_KEY, RegistryTable};
