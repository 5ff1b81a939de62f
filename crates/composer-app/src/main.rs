use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::routing::{get, post};
use axum::{Json, Router};
use clap::{Parser, Subcommand};
use composer::cache::open_store;
use composer::config::ComposerConfig;
use composer::crypto::SecretCipher;
use composer::telemetry::{TracingErrorReporter, init_logging};
use composer::{CompositionRequest, CompositionResponse, CompositionService};
use serde::Serialize;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "composer", version, about = "GraphQL schema composition service")]
struct Args {
	/// Path to the YAML config file; defaults apply when omitted.
	#[arg(short, long)]
	config: Option<PathBuf>,

	#[command(subcommand)]
	command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
	/// Serve the composition API (the default).
	Serve,
	/// Encrypt an external endpoint secret with the configured encryption secret.
	EncryptSecret { secret: String },
}

fn main() -> anyhow::Result<()> {
	let args = Args::parse();
	let config = match &args.config {
		Some(path) => {
			ComposerConfig::load(path).with_context(|| format!("loading config from {}", path.display()))?
		},
		None => ComposerConfig::default(),
	};

	match args.command.unwrap_or(Command::Serve) {
		Command::EncryptSecret { secret } => {
			let key = config
				.encryption_secret
				.as_ref()
				.context("encryptionSecret must be set in the config to encrypt secrets")?;
			let cipher = SecretCipher::new(key)?;
			println!("{}", cipher.encrypt(&secret)?);
			Ok(())
		},
		Command::Serve => tokio::runtime::Builder::new_multi_thread()
			.enable_all()
			.build()?
			.block_on(serve(config)),
	}
}

async fn serve(config: ComposerConfig) -> anyhow::Result<()> {
	init_logging(&config.logging);
	let store = open_store(&config.cache.store).context("opening cache store")?;
	let service = CompositionService::from_config(&config, store, Arc::new(TracingErrorReporter))?;
	let app = Router::new()
		.route("/compose", post(compose))
		.route("/healthz", get(healthz))
		.with_state(Arc::new(service));

	let listener = tokio::net::TcpListener::bind(&config.listen)
		.await
		.with_context(|| format!("binding {}", config.listen))?;
	info!(listen = %config.listen, workers = config.scheduler.workers, "composer listening");
	axum::serve(listener, app)
		.with_graceful_shutdown(async {
			let _ = tokio::signal::ctrl_c().await;
		})
		.await?;
	info!("composer stopped");
	Ok(())
}

async fn compose(
	State(service): State<Arc<CompositionService>>,
	headers: HeaderMap,
	Json(request): Json<CompositionRequest>,
) -> Json<CompositionResponse> {
	let request_id = headers
		.get("x-request-id")
		.and_then(|v| v.to_str().ok())
		.map(str::to_string)
		.unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
	Json(service.compose(request, &request_id).await)
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Health {
	workers: usize,
	idle_workers: usize,
}

async fn healthz(State(service): State<Arc<CompositionService>>) -> Json<Health> {
	let scheduler = service.scheduler();
	Json(Health {
		workers: scheduler.workers(),
		idle_workers: scheduler.idle_workers(),
	})
}
