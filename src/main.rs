//! CampusCam Server
//!
//! Main entry point for the streaming backend.

use campuscam_server::{
    camera_config::TopologyStore,
    detector::{Detector, DetectorConfig},
    state::{AppConfig, AppState, SystemHealth},
    stream_registry::StreamRegistry,
    video_source::FfmpegOpener,
    web_api,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "campuscam_server=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting CampusCam Server v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let config = AppConfig::default();
    tracing::info!(
        host = %config.host,
        port = config.port,
        cameras_file = %config.cameras_file.display(),
        model_dir = %config.model_dir.display(),
        stream_fps = config.stream_fps,
        "Configuration loaded"
    );

    // Load camera topology
    let topology = Arc::new(TopologyStore::open(config.cameras_file.clone()).await);

    // Load detection model; missing artifacts leave the detector
    // unavailable without blocking startup
    let detector_config = DetectorConfig {
        model_path: config.model_dir.join("person-detect.onnx"),
        labels_path: config.model_dir.join("labels.txt"),
        confidence_threshold: config.confidence_threshold,
        nms_threshold: config.nms_threshold,
        ..DetectorConfig::default()
    };
    let detector = Arc::new(Detector::load(detector_config));
    tracing::info!(available = detector.is_available(), "Detector initialized");

    // Stream worker registry
    let registry = Arc::new(StreamRegistry::with_grace_period(
        Arc::new(FfmpegOpener::new()),
        detector.clone(),
        config.start_grace,
    ));
    tracing::info!("StreamRegistry initialized");

    // Initialize system health
    let system_health = Arc::new(RwLock::new(SystemHealth::default()));

    // Create application state
    let state = AppState {
        config,
        topology,
        registry,
        detector,
        system_health,
    };

    // Start system health monitoring
    let health_monitor = state.system_health.clone();
    tokio::spawn(async move {
        use sysinfo::System;
        let mut sys = System::new_all();
        let mut interval = tokio::time::interval(Duration::from_secs(30));

        loop {
            interval.tick().await;
            sys.refresh_all();

            // Average CPU usage across all cores
            let cpu = {
                let cpus = sys.cpus();
                if cpus.is_empty() {
                    0.0
                } else {
                    cpus.iter().map(|c| c.cpu_usage()).sum::<f32>() / cpus.len() as f32
                }
            };
            let memory = if sys.total_memory() > 0 {
                (sys.used_memory() as f32 / sys.total_memory() as f32) * 100.0
            } else {
                0.0
            };

            let mut health = health_monitor.write().await;
            health.update(cpu, memory);
        }
    });

    // Create router with CORS for the frontend
    let app = web_api::create_router(state.clone())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http());

    // Start server
    let addr = format!("{}:{}", state.config.host, state.config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Listening on {}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
