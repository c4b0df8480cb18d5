use actix_cors::Cors;
use actix_web::{middleware, web, App, HttpServer};
use dealspot::config::{AuthMode, AuthSettings, Settings};
use dealspot::core::{NearbyComposer, SearchDefaults};
use dealspot::error::{handle_json_payload_error, handle_path_error, handle_query_payload_error};
use dealspot::routes::{self, AppState};
use dealspot::services::{AuthProvider, JwtAuth, MemoryStore, PostgresStore, RemoteAuth, Storage};
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

fn build_auth(settings: &AuthSettings) -> std::io::Result<Arc<dyn AuthProvider>> {
    match settings.mode {
        AuthMode::Jwt => {
            let secret = settings.jwt_secret.as_deref().ok_or_else(|| {
                std::io::Error::new(std::io::ErrorKind::InvalidInput, "auth.jwt_secret is required in jwt mode")
            })?;
            Ok(Arc::new(JwtAuth::new(secret, settings.audience.as_deref())))
        }
        AuthMode::Remote => {
            let (url, key) = settings
                .provider_url
                .clone()
                .zip(settings.api_key.clone())
                .ok_or_else(|| {
                    std::io::Error::new(
                        std::io::ErrorKind::InvalidInput,
                        "auth.provider_url and auth.api_key are required in remote mode",
                    )
                })?;
            let auth = RemoteAuth::new(url, key).map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?;
            Ok(Arc::new(auth))
        }
    }
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    // Load .env file if present
    dotenv::dotenv().ok();

    let settings = Settings::load().map_err(|e| {
        eprintln!("Failed to load configuration: {}", e);
        std::io::Error::new(std::io::ErrorKind::InvalidInput, e)
    })?;

    // RUST_LOG wins over the configured level
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&settings.logging.level));

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_level(true);

    match settings.logging.format.as_str() {
        "pretty" => subscriber.pretty().init(),
        "compact" => subscriber.compact().init(),
        _ => subscriber.json().init(),
    }

    info!("Starting Dealspot search service...");

    let storage: Arc<dyn Storage> = if settings.database.is_memory() {
        info!("Using in-memory storage");
        Arc::new(MemoryStore::new())
    } else {
        let postgres = PostgresStore::from_settings(&settings.database).await.map_err(|e| {
            error!("Failed to connect to PostgreSQL: {}", e);
            std::io::Error::new(std::io::ErrorKind::Other, e)
        })?;
        info!("PostgreSQL storage initialized");
        Arc::new(postgres)
    };

    let auth = build_auth(&settings.auth).map_err(|e| {
        error!("Failed to initialize auth: {}", e);
        e
    })?;

    info!("Auth provider initialized ({:?} mode)", settings.auth.mode);

    let defaults = SearchDefaults::from(&settings.search);
    let composer = NearbyComposer::probe(Arc::clone(&storage), defaults).await;

    info!(
        "Nearby composer ready (geo: {}, default radius: {}m, default limit: {})",
        composer.geo_capable(),
        defaults.radius_m,
        defaults.limit
    );

    let app_state = AppState {
        storage,
        auth,
        composer,
    };

    let host = settings.server.host.clone();
    let port = settings.server.port;
    let workers = settings.server.workers.unwrap_or(4);

    info!("Starting HTTP server on {}:{}", host, port);

    HttpServer::new(move || {
        let cors = Cors::permissive();

        App::new()
            .app_data(web::Data::new(app_state.clone()))
            .app_data(web::JsonConfig::default().error_handler(handle_json_payload_error))
            .app_data(web::QueryConfig::default().error_handler(handle_query_payload_error))
            .app_data(web::PathConfig::default().error_handler(handle_path_error))
            .wrap(cors)
            .wrap(middleware::Logger::default())
            .wrap(middleware::Compress::default())
            .configure(routes::configure_routes)
    })
    .workers(workers)
    .bind((host, port))?
    .run()
    .await
}
