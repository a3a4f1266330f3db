pub mod settings;
pub mod song;
pub mod task;
