// Command handlers module
pub mod devices;
pub mod monitor;
pub mod workload;

// Re-exports for cleaner imports
pub use devices::execute as devices;
pub use monitor::execute as monitor;
pub use workload::execute as workload;
