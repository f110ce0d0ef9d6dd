mod camera;
mod classify;
mod cv_utils;
mod detector;
mod events;
mod routes;
mod server;
mod session;
mod stats;
mod telemetry;
mod worker;

pub mod app;
pub mod config;

pub use app::start_app;
