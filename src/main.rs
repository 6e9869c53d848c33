use std::sync::Arc;

use actix::Actor;
use actix_cors::Cors;
use actix_web::{middleware::Logger, web, App, HttpServer};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

mod auth;
mod balance;
mod config;
mod errors;
mod format;
mod routes;
mod schemas;
mod session;
mod storage;
mod store;

use auth::SessionGate;
use config::{Config, ProviderKind};
use routes::AppState;
use session::{SessionManager, SimulatedWallet, WalletProvider};
use storage::Storage;
use store::CollectionStore;

async fn open_storage(config: &Config) -> errors::Result<Storage> {
    match &config.mongodb_uri {
        Some(uri) => Storage::mongo(uri, &config.database_name).await,
        None => Storage::file(&config.storage_dir).await,
    }
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    // Load optional .env file (ignored if missing).
    let _ = dotenvy::dotenv();

    let config = Config::from_env().map_err(|e| {
        error!("{e}");
        std::io::Error::new(std::io::ErrorKind::InvalidInput, e.to_string())
    })?;

    let storage = open_storage(&config)
        .await
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e.to_string()))?;
    let store = CollectionStore::load(storage, config.seed_demo_data)
        .await
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string()))?;

    let provider: Option<Arc<dyn WalletProvider>> = match config.wallet_provider {
        ProviderKind::Simulated => {
            Some(SimulatedWallet::new(config.wallet_seed.clone()) as Arc<dyn WalletProvider>)
        }
        ProviderKind::None => None,
    };
    let session = SessionManager::new(&config.session, provider).start();

    let state = web::Data::new(AppState {
        store,
        session,
        gate: SessionGate::new(&config.session_secret),
    });

    info!("Listening on 0.0.0.0:{}", config.port);
    HttpServer::new(move || {
        App::new()
            .wrap(Cors::permissive())
            .wrap(Logger::default())
            .app_data(state.clone())
            .configure(routes::configure)
    })
    .bind(("0.0.0.0", config.port))?
    .run()
    .await
}
