pub mod config;
pub mod error;
pub mod github;
pub mod status;
pub mod store;
pub mod worker;
