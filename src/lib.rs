pub mod config;
pub mod error;
pub mod hls;
pub mod model;
pub mod player;
pub mod probe;
pub mod resolver;
pub mod session;
pub mod telemetry;
