// Library exports for testing
pub mod clock;
pub mod config;
pub mod registry;
pub mod session;
pub mod storage;
