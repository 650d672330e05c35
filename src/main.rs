#![warn(clippy::pedantic)]
#![warn(clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

use std::time::Duration;

use actix_web::{middleware::Logger, web, App, HttpServer};
use anyhow::{anyhow, Context};
use satchel::{
    handlers::configure,
    session::SessionManager,
    settings::SatchelSettings,
    store::{build_store, run_sweeper},
};

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration from Settings.toml and environment variables
    // This also loads .env file and initializes the logger
    let settings = SatchelSettings::load().map_err(|e| anyhow!("Failed to load settings: {e}"))?;

    let store = build_store(&settings.session).context("Failed to initialize session store")?;
    let session_manager = SessionManager::new(settings.session.clone(), store.clone())
        .context("Failed to initialize session manager")?;

    if settings.session.sweep_interval_seconds > 0 {
        let interval = Duration::from_secs(settings.session.sweep_interval_seconds);
        actix_web::rt::spawn(run_sweeper(store, interval));
    }

    start_server(session_manager, &settings)
        .await
        .context("Server failed")
}

/// Start the demo server
///
/// # Errors
///
/// Returns an error if:
/// - Server binding fails
/// - Server fails to start
async fn start_server(
    session_manager: SessionManager,
    settings: &SatchelSettings,
) -> std::io::Result<()> {
    let bind_address = settings.get_bind_address();
    print_startup_info(&bind_address, settings);

    HttpServer::new(move || {
        App::new()
            .app_data(web::Data::new(session_manager.clone()))
            .wrap(Logger::default())
            .configure(configure)
    })
    .bind(&bind_address)?
    .run()
    .await
}

fn print_startup_info(bind_address: &str, settings: &SatchelSettings) {
    let session = &settings.session;
    println!("Starting satchel {} on http://{bind_address}", satchel::VERSION);
    println!(
        "Session backend: {:?} (cookie '{}', age {}s)",
        session.backend, session.cookie_name, session.default_age_seconds
    );
    println!();
    println!("Session endpoints:");
    println!("  GET    /session          - Show current session");
    println!("  PUT    /session/{{name}}   - Store JSON body under name");
    println!("  DELETE /session/{{name}}   - Remove name");
    println!("  POST   /session/flush    - Drop data and issue a new key");
    println!("  POST   /session/cycle    - Keep data under a new key");
    println!("  POST   /session/expiry   - Override expiry ({{\"seconds\"}} or {{\"at\"}})");
    println!("  GET    /visits           - Per-visitor request counter");
    println!();
    println!("System endpoints:");
    println!("  GET    /ping             - Health check");
}
