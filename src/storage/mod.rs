pub mod library;
pub mod paths;
