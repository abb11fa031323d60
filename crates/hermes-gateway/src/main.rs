//! Hermes API Gateway Server
//!
//! Process bootstrap for the Hermes gateway: reads the environment-driven
//! configuration, wires the request pipeline, starts the background tasks
//! (route refresh, heartbeat, janitor), and runs the HTTP server with
//! graceful shutdown.

use hermes_rs::logs::logger::configure_logger;
use hermes_rs::middleware::request_id::RequestIdMiddleware;
use hermes_rs::models::settings::Settings;
use hermes_rs::plugins::{create_default_plugin_chain, spawn_janitor_task, JANITOR_INTERVAL};
use hermes_rs::registry::client::{spawn_heartbeat_task, RegistryClient};
use hermes_rs::registry::route_table::{spawn_refresh_task, RouteTable};
use hermes_rs::routes::gateway::{configure_gateway, GatewayState};
use hermes_rs::routes::{health, metrics};
use hermes_rs::services::balancer::{create_balancer, ConnectionTracker};
use hermes_rs::services::metrics::MetricsCollector;
use hermes_rs::services::proxy::ProxyForwarder;
use hermes_rs::utils::route_matcher::RouteMatcher;

use actix_web::{middleware::Logger, web, App, HttpServer};
use log::{error, info, warn};
use std::sync::Arc;
use tokio::signal;
use tokio::sync::watch;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    let settings = Settings::from_env();
    configure_logger(settings.log_json_format);

    info!(
        "Starting Hermes API Gateway v{}",
        env!("CARGO_PKG_VERSION")
    );

    if let Err(e) = settings.validate() {
        error!("Configuration invalid: {}", e);
        std::process::exit(1);
    }

    // Route table: local routes first, then the initial remote pull
    let table = Arc::new(RouteTable::new(&settings));
    match table.reload_local() {
        Ok(count) => info!("Loaded {} local routes", count),
        Err(e) => warn!("Local routes unavailable: {}", e),
    }

    if settings.registry_enabled {
        if table.refresh_remote().await {
            info!("Initial remote route refresh succeeded");
        } else {
            warn!("Registry unavailable, serving local routes only");
        }
    }

    // Pipeline components
    let plugins = create_default_plugin_chain(&settings);
    let tracker = Arc::new(ConnectionTracker::new());
    let balancer = create_balancer(settings.load_balance_strategy, Arc::clone(&tracker));
    let forwarder = ProxyForwarder::new(&settings);
    let metrics_collector = Arc::new(MetricsCollector::default());
    let matcher = Arc::new(RouteMatcher::new());

    let state = web::Data::new(GatewayState {
        table: Arc::clone(&table),
        matcher,
        chain: Arc::clone(&plugins.chain),
        balancer,
        tracker,
        forwarder,
        metrics: Arc::clone(&metrics_collector),
    });

    // Background tasks share one shutdown signal
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut tasks = Vec::new();

    tasks.push(spawn_janitor_task(
        Arc::clone(&plugins.rate_limit),
        Arc::clone(&plugins.circuit_breaker),
        JANITOR_INTERVAL,
        shutdown_rx.clone(),
    ));

    let mut registry_client = None;
    if settings.registry_enabled {
        let client = RegistryClient::new(&settings);
        match client.register().await {
            Ok(()) => info!("Registered with registry at {}", settings.registry_url),
            Err(e) => warn!("Registration failed, running detached: {}", e),
        }

        tasks.push(spawn_heartbeat_task(
            client.clone(),
            settings.heartbeat_interval,
            shutdown_rx.clone(),
        ));
        tasks.push(spawn_refresh_task(
            Arc::clone(&table),
            settings.route_refresh_interval,
            shutdown_rx.clone(),
        ));

        registry_client = Some(client);
    }

    let bind_host = settings.host.clone();
    let bind_port = settings.port;
    info!("Starting server on {}:{}", bind_host, bind_port);

    let server = HttpServer::new(move || {
        App::new()
            .app_data(state.clone())
            .app_data(web::Data::new(Arc::clone(&metrics_collector)))
            .wrap(RequestIdMiddleware::new())
            .wrap(Logger::new(r#"%a "%r" %s %b %T"#))
            .configure(health::configure_health)
            .configure(metrics::configure_metrics)
            .configure(configure_gateway)
    })
    .bind((bind_host.as_str(), bind_port))?
    .run();

    let server_handle = server.handle();
    let server_task = tokio::spawn(server);

    // Graceful shutdown: stop tasks, deregister, drain the server
    tokio::select! {
        result = server_task => {
            match result {
                Ok(Ok(())) => info!("Server stopped"),
                Ok(Err(e)) => error!("Server error: {}", e),
                Err(e) => error!("Server task panicked: {}", e),
            }
        }
        _ = signal::ctrl_c() => {
            info!("Received shutdown signal, stopping");

            let _ = shutdown_tx.send(true);
            for task in tasks {
                let _ = task.await;
            }

            if let Some(client) = &registry_client {
                client.deregister().await;
            }

            server_handle.stop(true).await;
        }
    }

    info!("Hermes gateway stopped");
    Ok(())
}
