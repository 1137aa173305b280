use motion_preview_common::config::Config;
use motion_preview_server::capture::{CaptureLoop, CaptureSettings};
use motion_preview_server::preview::{self, PreviewPublisher};
use motion_preview_server::routes;
use motion_preview_server::snapshot::SnapshotStore;
use motion_preview_server::source::{FrameSource, HttpSnapshotSource, TestPatternSource};
use motion_preview_server::state::{AppState, BlurKernel, PipelineStats, Shutdown};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{error, info};

struct CaptureParts {
    publisher: PreviewPublisher,
    snapshots: Option<SnapshotStore>,
    kernel: BlurKernel,
    stats: Arc<PipelineStats>,
    settings: CaptureSettings,
    shutdown: Shutdown,
}

fn spawn_capture<S: FrameSource>(source: S, parts: CaptureParts) -> JoinHandle<()> {
    let capture = CaptureLoop::new(
        source,
        parts.publisher,
        parts.snapshots,
        parts.kernel,
        parts.stats,
        parts.settings,
    );
    tokio::spawn(capture.run(parts.shutdown))
}

#[tokio::main]
async fn main() {
    let config_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("config.toml"));

    let config = match Config::load(&config_path) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load config from {}: {e}", config_path.display());
            std::process::exit(1);
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.logging.level.parse().unwrap_or_default()),
        )
        .init();

    info!(
        source = config.camera.source,
        width = config.camera.width,
        height = config.camera.height,
        bind = config.stream.bind,
        "starting motion preview server"
    );

    let snapshots = if config.snapshot.enabled {
        let store = SnapshotStore::new(&config.snapshot.dir, config.snapshot.prefix.clone());
        if config.snapshot.clear_on_start {
            if let Err(e) = store.clear_existing().await {
                error!(error = %e, "failed to clear old snapshots");
                std::process::exit(1);
            }
        }
        Some(store)
    } else {
        info!("motion snapshots disabled");
        None
    };

    // Already validated by Config::load.
    let kernel = match BlurKernel::new(config.detector.blur_kernel_size) {
        Ok(k) => k,
        Err(e) => {
            error!(error = %e, "invalid blur kernel size");
            std::process::exit(1);
        }
    };

    let (publisher, reader) = preview::channel();
    let stats = Arc::new(PipelineStats::default());
    let (trigger, shutdown) = Shutdown::new();

    let parts = CaptureParts {
        publisher,
        snapshots,
        kernel: kernel.clone(),
        stats: Arc::clone(&stats),
        settings: CaptureSettings::from_config(&config),
        shutdown: shutdown.clone(),
    };
    let capture_task = match config.camera.source.as_str() {
        "test-pattern" => spawn_capture(TestPatternSource::new(), parts),
        "http" => {
            let Some(url) = config.camera.url.clone() else {
                error!("camera.url is required for the http source");
                std::process::exit(1);
            };
            spawn_capture(HttpSnapshotSource::new(url), parts)
        }
        other => {
            error!(source = other, "unknown camera source, expected 'test-pattern' or 'http'");
            std::process::exit(1);
        }
    };

    let state = Arc::new(AppState {
        preview: reader,
        kernel,
        default_kernel: config.detector.blur_kernel_size,
        pacing: Duration::from_millis(config.stream.pacing_interval_ms),
        stats,
        shutdown: shutdown.clone(),
    });
    let app = routes::router(state);

    let addr = config.stream.bind.clone();
    let listener = tokio::net::TcpListener::bind(&addr).await.unwrap_or_else(|e| {
        eprintln!("Failed to bind to {addr}: {e}");
        std::process::exit(1);
    });
    info!(addr, "preview available at /preview");

    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("shutdown requested"),
            Err(e) => error!(error = %e, "failed to listen for ctrl-c, shutting down"),
        }
        let _ = trigger.send(true);
    });

    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown.wait())
        .await
    {
        error!(error = %e, "HTTP server failed");
        std::process::exit(1);
    }

    if let Err(e) = capture_task.await {
        error!(error = %e, "capture task panicked");
    }
    info!("motion preview server stopped");
}
