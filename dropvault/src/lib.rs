pub mod config;
pub mod logging;
pub mod service;
pub mod sync;
