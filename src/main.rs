use actix_cors::Cors;
use actix_web::{middleware::Compress, web, App, HttpServer};
use std::sync::Arc;
use tracing::{info, Level};
use tracing_actix_web::TracingLogger;
use tracing_subscriber::EnvFilter;
use utoipa::OpenApi; // bring trait into scope for ApiDoc::openapi()
use utoipa_swagger_ui::SwaggerUi;

use fixlog::auth::JwtKeys;
use fixlog::config::AppConfig;
use fixlog::openapi::ApiDoc;
use fixlog::rate_limit::{InMemoryRateLimiter, RateLimiterFacade};
use fixlog::repo::Repo;
use fixlog::storage::FsImageStore;
use fixlog::{configure, AppState, SecurityHeaders};

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    // .env is a development convenience only
    if cfg!(debug_assertions) {
        let _ = dotenv::dotenv();
    }

    let cfg = match AppConfig::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("configuration error: {e}");
            eprintln!("Please copy .env.example to .env and configure it");
            std::process::exit(1);
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(Level::INFO.into()))
        .init();

    info!("Bootstrapping fixlog server");
    info!("Frontend URL: {}", cfg.frontend_url);

    let repo = build_repo(&cfg).await?;
    let image_store = Arc::new(FsImageStore::new(&cfg.upload_dir)?);
    let jwt = Arc::new(JwtKeys::new(&cfg.jwt_secret));
    let rate_limiter = cfg
        .rate_limit_enabled
        .then(|| RateLimiterFacade::new(InMemoryRateLimiter::new(true), cfg.rate_limits.clone()));
    info!(enabled = rate_limiter.is_some(), "rate limiting configured");

    let state = web::Data::new(AppState { repo, image_store, jwt, rate_limiter });
    let openapi = ApiDoc::openapi();
    let enable_hsts = cfg.enable_hsts;
    let frontend_url = cfg.frontend_url.clone();

    let server = HttpServer::new(move || {
        let cors = Cors::default()
            .allowed_origin(&frontend_url)
            .allow_any_header()
            .allowed_methods(["GET", "POST", "PUT", "DELETE", "OPTIONS"])
            .supports_credentials()
            .max_age(3600);

        App::new()
            .wrap(TracingLogger::default())
            .wrap(Compress::default())
            .wrap(SecurityHeaders::new(enable_hsts))
            .wrap(cors)
            .app_data(state.clone())
            .configure(configure)
            .service(SwaggerUi::new("/docs/{_:.*}").url("/docs/openapi.json", openapi.clone()))
    })
    .bind((cfg.bind_addr.as_str(), cfg.port))?;

    info!("Listening on http://{}:{}", cfg.bind_addr, cfg.port);
    server.run().await?;
    Ok(())
}

#[cfg(feature = "postgres-store")]
async fn build_repo(cfg: &AppConfig) -> anyhow::Result<Arc<dyn Repo>> {
    use fixlog::repo::pg::PgRepo;
    use sqlx::postgres::PgPoolOptions;

    let url = cfg
        .database_url
        .as_deref()
        .ok_or_else(|| anyhow::anyhow!("DATABASE_URL must be set for postgres-store"))?;
    let pool = PgPoolOptions::new().max_connections(5).connect(url).await?;
    let repo = PgRepo::new(pool);
    repo.migrate().await?;
    info!("Using Postgres repository backend");
    Ok(Arc::new(repo))
}

#[cfg(all(feature = "inmem-store", not(feature = "postgres-store")))]
async fn build_repo(cfg: &AppConfig) -> anyhow::Result<Arc<dyn Repo>> {
    use fixlog::repo::inmem::InMemRepo;

    let repo = match &cfg.data_dir {
        Some(dir) => {
            info!(data_dir = %dir.display(), "Using in-memory repository backend with snapshots");
            InMemRepo::with_snapshot(dir)
        }
        None => {
            info!("Using in-memory repository backend (ephemeral)");
            InMemRepo::ephemeral()
        }
    };
    Ok(Arc::new(repo))
}
