use clap::Parser;
use log::{error, info};
use std::sync::Arc;

use pocket_relay::relay::access::AccessGate;
use pocket_relay::relay::catalog::Catalog;
use pocket_relay::relay::config::Args;
use pocket_relay::relay::core::PatternCoreFactory;
use pocket_relay::relay::server::{self, AppState, ServerError};

#[tokio::main]
async fn main() {
    let args = Args::parse();

    env_logger::Builder::new()
        .filter_level(args.log_level)
        .parse_default_env()
        .init();

    if let Err(e) = run(args).await {
        error!("{}", e);
        std::process::exit(1);
    }
}

async fn run(args: Args) -> Result<(), ServerError> {
    let gate = AccessGate::new(args.access_policies()?)?;
    if gate.requires_password() {
        info!("Access control enabled");
    }

    let factory = Arc::new(PatternCoreFactory);
    let catalog = Catalog::load_dir(&args.rom_dir, factory.as_ref())?;
    if catalog.is_empty() {
        return Err(ServerError::EmptyCatalog(args.rom_dir));
    }

    server::serve(args.listen_addr(), AppState::new(catalog, gate, factory)).await
}
