// Copyright 2026 The Culvert Project
// SPDX-License-Identifier: Apache-2.0

use clap::Parser;
use culvert::client::GenerationClient;
use culvert::config;
use culvert::relay;

use std::net::SocketAddr;

#[derive(Parser)]
#[command(name = "culvert", about = "Model event-stream decoder and relay")]
struct Cli {
    /// Path to the culvert.yaml config file
    #[arg(long, default_value = "culvert.yaml", env = "CULVERT_CONFIG")]
    config: String,

    /// Port to listen on
    #[arg(long, default_value_t = 9900, env = "CULVERT_PORT")]
    port: u16,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .json()
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let addr = SocketAddr::from(([127, 0, 0, 1], cli.port));
    tracing::info!(%addr, "culvert starting");

    let source = config::FileSource {
        path: std::path::PathBuf::from(cli.config),
    };
    let config = match config::load_config(&source) {
        Ok(c) => std::sync::Arc::new(c),
        Err(e) => {
            tracing::error!("failed to load config: {e}");
            std::process::exit(1);
        }
    };

    tracing::info!(
        endpoint = %config.upstream.endpoint,
        contract_hash = %config.contract_hash,
        "config loaded"
    );

    let backend: std::sync::Arc<dyn relay::GenerationBackend> =
        std::sync::Arc::new(GenerationClient::new(config));

    let app = relay::build_router(backend);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("failed to bind to address");

    tracing::info!(%addr, "culvert listening");

    axum::serve(listener, app)
        .await
        .expect("server error");
}
