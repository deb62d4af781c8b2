pub mod app;
pub mod capture;
mod config;
pub mod controller;
pub mod error;
pub mod image_data;
pub mod logging;
pub mod notification;
pub mod service;
pub mod settings;
pub mod state;
pub mod storage;
pub mod ui;
pub use error::{AppError, AppResult};

/// Entrypoint used by the binary.
pub fn run() -> AppResult<()> {
    logging::init();
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "starting Nano Imager");

    let mut app = app::App::new();
    app.start()?;

    tracing::info!(last_view = app.last_view().as_str(), "shutdown complete");
    Ok(())
}
