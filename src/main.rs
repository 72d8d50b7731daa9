use clap::Parser;
use log::{error, info};
use std::sync::Arc;

use tutor_timetabler::config::Config;
use tutor_timetabler::jobs::JobRunner;
use tutor_timetabler::server::{self, AppState};
use tutor_timetabler::store::{MemoryStore, Records};

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = Config::parse();

    let store = Arc::new(MemoryStore::new());
    if let Some(seed) = &config.seed {
        match Records::from_file(seed).and_then(|records| store.load(records)) {
            Ok(()) => info!("Loaded records from {}", seed.display()),
            Err(e) => {
                error!("Could not load {}: {e}", seed.display());
                std::process::exit(1);
            }
        }
    }

    let state = AppState {
        runner: JobRunner::new(store, config.engine_options())
            .with_retention(config.job_retention),
        parameters: config.parameters(),
    };

    if let Err(e) = server::run_server(&config.bind, state).await {
        error!("Server error: {e}");
        std::process::exit(1);
    }
}
