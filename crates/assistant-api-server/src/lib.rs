pub mod config;
pub mod handlers;
pub mod logging;
pub mod memory;
pub mod models;
pub mod payload;
pub mod routing;
pub mod services;
pub mod session;
pub mod utils;
