use std::error::Error;

use clap::Parser;
use servicebox::{config::Args, service::server::ApiService, Backend, BackendFactory};
use tracing::{error, info};
use tracing_subscriber::fmt;

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
	// Before parsing, so `.env` can provide the SERVICEBOX_* variables.
	let dotenv = dotenv::dotenv();

	let args = Args::parse();

	let subscriber = fmt::Subscriber::builder().with_max_level(args.log_level).finish();
	tracing::subscriber::set_global_default(subscriber)?;

	info!(task = "tracing_setup", result = "success", "tracing successfully set up");

	match dotenv {
		Ok(path) => info!(task = "dotenv_setup", result = "success", "loaded {}", path.display()),
		Err(e) => info!(task = "dotenv_setup", result = "skipped", "no .env loaded: {}", e),
	}

	if args.provision {
		info!(backend = %args.be_type, "provisioning backend");
		let backend = BackendFactory::instantiate(&args.be_type, args.backend_options())?;
		backend.provision().await.map_err(|e| {
			error!("failed to provision backend: {}", e);
			e
		})?;
	}

	let backend =
		BackendFactory::create(&args.be_type, args.backend_options()).await.map_err(|e| {
			error!("failed to init backend: {}", e);
			e
		})?;

	let served = ApiService::serve(backend.clone(), args.port).await;

	backend.unbind().await;
	info!(task = "shutdown", backend = backend.name(), "backend unbound");

	Ok(served?)
}
