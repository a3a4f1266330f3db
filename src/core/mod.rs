pub mod batch;
pub mod fetch;
pub mod filename;
pub mod progress;
pub mod registry;
pub mod transfer;
