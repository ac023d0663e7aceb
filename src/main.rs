use std::path::PathBuf;
use std::sync::Arc;

use axum::{routing::get, Extension, Router};
use clap::Parser;
use ecs_service_discovery::{log_filter::LogFilter, Discovery};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use tower_http::trace::TraceLayer;
use tracing::{info, warn, Level};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, Layer};

#[derive(Parser)]
struct Opts {
    #[clap(short, long, default_value = "config.yaml")]
    config: PathBuf,

    /// Cluster view written by the ECS collector
    #[clap(short, long)]
    snapshot: PathBuf,

    #[clap(short, long, default_value = "localhost:9090")]
    address: String,

    #[clap(long, default_value = "info")]
    log_level: Level,

    /// Run a single discovery cycle and exit
    #[clap(long)]
    once: bool,
}

#[tokio::main]
async fn main() {
    let opts = Opts::parse();

    tracing_subscriber::registry()
        .with(tracing_logfmt::layer().with_filter(LogFilter::new(opts.log_level)))
        .init();

    let config = match ecs_service_discovery::config::parse(&opts.config) {
        Ok(config) => config,
        Err(err) => {
            tracing::error!("Invalid config {}: {}", opts.config.display(), err);
            std::process::exit(1);
        }
    };
    let discovery = Arc::new(Discovery::new(config));

    if opts.once {
        if let Err(err) = discovery.run_cycle(&opts.snapshot).await {
            tracing::error!("Discovery failed: {}", err);
            std::process::exit(1);
        }
        return;
    }

    let prometheus_handler = PrometheusBuilder::new()
        .install_recorder()
        .expect("failed to install recorder");
    ecs_service_discovery::init_metrics();

    tokio::spawn(poll(discovery, opts.snapshot));

    let app = Router::new()
        .route("/healthz", get(healthz))
        .route("/metrics", get(render_metrics))
        .layer(Extension(prometheus_handler))
        .layer(TraceLayer::new_for_http());

    let addr = opts.address.parse().expect("could not parse address");
    info!("Listening on {}", addr);
    axum::Server::bind(&addr)
        .serve(app.into_make_service())
        .await
        .expect("web server terminated");
}

async fn poll(discovery: Arc<Discovery>, snapshot: PathBuf) {
    let mut ticker = tokio::time::interval(discovery.config().frequency);
    loop {
        ticker.tick().await;
        match discovery.run_cycle(&snapshot).await {
            Ok(targets) => info!(
                "Wrote {} targets to {}",
                targets.len(),
                discovery.config().result_file.display()
            ),
            Err(err) => warn!("Discovery cycle failed: {}", err),
        }
    }
}

async fn healthz() -> &'static str {
    "OK"
}

async fn render_metrics(prometheus_handler: Extension<PrometheusHandle>) -> String {
    prometheus_handler.render()
}
