pub mod adapters;
pub mod config;
pub mod error;
pub mod logger;
pub mod relay;
pub mod server;
pub mod session;

use crate::error::AppResult;
use crate::relay::{client::create_client, AppState, RelayService};

fn install_panic_hook() {
    // Log panics before they take the process down
    std::panic::set_hook(Box::new(|panic_info| {
        let payload = panic_info.payload();
        let message = if let Some(s) = payload.downcast_ref::<&str>() {
            s.to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "Unknown panic payload".to_string()
        };

        let location = if let Some(location) = panic_info.location() {
            format!("{}:{}:{}", location.file(), location.line(), location.column())
        } else {
            "Unknown location".to_string()
        };

        crate::logger::error(
            "panic",
            &format!(
                "PANIC occurred: message='{}', location='{}', backtrace available via RUST_BACKTRACE=1",
                message, location
            ),
        );
    }));
}

/// Load settings, start logging and serve the relay until shutdown.
pub async fn run() -> AppResult<()> {
    install_panic_hook();

    let settings = config::load();
    logger::init(&settings.log);
    logger::info(
        "app",
        &format!(
            "Relay starting: version={}, default_backend={}, default_base_url={}",
            env!("CARGO_PKG_VERSION"),
            settings.backend.provider,
            settings.backend.base_url
        ),
    );

    let client = create_client(&settings.http)
        .map_err(|e| error::AppError::Config(e.to_string()))?;
    let state = AppState::new(RelayService::new(client), settings.backend.clone());
    server::serve(&settings.server.bind_addr(), state).await
}
