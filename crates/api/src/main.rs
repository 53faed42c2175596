//! Query service entry point.

use chrono::Utc;
use tokio::signal;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use api::config::Config;
use api::seed::SampleData;

/// Waits for a shutdown signal (SIGINT or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install SIGINT handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("received SIGINT, starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("received SIGTERM, starting graceful shutdown");
        }
    }
}

#[tokio::main]
async fn main() {
    let config = Config::from_env();

    // 1. Initialize tracing
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.log_level)),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // 2. Install Prometheus metrics recorder
    let metrics_handle = metrics_exporter_prometheus::PrometheusBuilder::new()
        .install_recorder()
        .expect("failed to install Prometheus recorder");

    // 3. Connect stores and optionally seed them
    let stores = api::connect_stores(&config)
        .await
        .expect("failed to connect stores");
    if config.seed_data {
        SampleData::new(Utc::now())
            .load(&stores)
            .await
            .expect("failed to load sample data");
    }

    // 4. Start the event consumer
    let log = api::connect_log(&config)
        .await
        .expect("failed to connect event log");
    let consumer =
        api::start_consumer(&config, &stores, log).expect("failed to start consumer");

    // 5. Build the application
    let app = api::create_app(api::create_state(stores, &config), metrics_handle);

    // 6. Start server
    let addr = config.addr();
    tracing::info!(%addr, topic = %config.events_topic, "starting query service");

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("failed to bind address");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("server error");

    // 7. Drain the consumer
    consumer.stop().await;
    tracing::info!("server shut down gracefully");
}
