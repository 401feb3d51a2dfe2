use std::sync::Arc;
use std::time::Duration;

use actix_cors::Cors;
use actix_web::{middleware::Compress, web, App, HttpServer};
use anyhow::Context;
use tracing::{info, Level};
use tracing_actix_web::TracingLogger;
use tracing_subscriber::EnvFilter;
use utoipa::OpenApi; // bring trait into scope for ApiDoc::openapi()
use utoipa_swagger_ui::SwaggerUi;

use blog_platform::auth::JwtKeys;
use blog_platform::config::{Config, StoreKind};
use blog_platform::error::json_error_handler;
use blog_platform::openapi::ApiDoc;
use blog_platform::rate_limit::{InMemoryRateLimiter, RateLimiterFacade};
use blog_platform::repo::{inmem::InMemRepo, pg::PgRepo, Repo};
use blog_platform::storage::FsMediaStore;
use blog_platform::{config, telemetry, AppState, SecurityHeaders};

const RATE_LIMIT_SWEEP: Duration = Duration::from_secs(60);

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    // Load .env automatically only in debug builds to reduce manual setup overhead.
    if cfg!(debug_assertions) {
        let _ = dotenv::dotenv();
    }

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(Level::INFO.into()))
        .init();

    let cfg = Config::load().context("loading configuration")?;
    info!(bind = %cfg.bind_addr, store = ?cfg.store, upload_dir = %cfg.upload_dir.display(), "bootstrapping blog server");

    let repo: Arc<dyn Repo> = match cfg.store {
        StoreKind::Memory => {
            info!("Using in-memory repository backend");
            Arc::new(InMemRepo::new())
        }
        StoreKind::Postgres => {
            use sqlx::postgres::PgPoolOptions;
            let url = cfg.database_url.as_deref().context("DATABASE_URL must be set for the postgres store")?;
            let pool = PgPoolOptions::new()
                .max_connections(10)
                .connect(url)
                .await
                .context("connecting to postgres")?;
            sqlx::migrate!("./migrations").run(&pool).await.context("running migrations")?;
            info!("Using Postgres repository backend");
            Arc::new(PgRepo::new(pool))
        }
    };

    tokio::fs::create_dir_all(&cfg.upload_dir)
        .await
        .with_context(|| format!("creating upload dir {}", cfg.upload_dir.display()))?;
    let media = Arc::new(FsMediaStore::new(cfg.upload_dir.clone()));

    telemetry::install().context("installing metrics recorder")?;

    let rate_limiter = cfg.rate_limit_enabled.then(|| {
        RateLimiterFacade::new(InMemoryRateLimiter::new(true), cfg.rate_limits.clone())
    });
    if let Some(rl) = rate_limiter.clone() {
        actix_web::rt::spawn(async move {
            let mut tick = actix_web::rt::time::interval(RATE_LIMIT_SWEEP);
            loop {
                tick.tick().await;
                let dropped = rl.sweep();
                if dropped > 0 {
                    tracing::debug!(dropped, "rate limiter swept idle callers");
                }
            }
        });
    }
    let state = web::Data::new(AppState {
        repo,
        media,
        rate_limiter,
        max_upload_bytes: cfg.max_upload_bytes,
    });
    let keys = web::Data::new(JwtKeys::new(cfg.jwt_secret.as_bytes()));
    let openapi = ApiDoc::openapi();
    let frontend_url = cfg.frontend_url.clone();
    let enable_hsts = cfg.enable_hsts;

    let server = HttpServer::new(move || {
        let cors = {
            let mut c = Cors::default()
                // during local dev allow React/Vite default ports
                .allowed_origin("http://localhost:5173")
                .allowed_origin("http://127.0.0.1:5173")
                .allowed_origin("http://localhost:3000")
                .allow_any_header()
                .allowed_methods(["GET", "POST", "PUT", "DELETE", "OPTIONS"])
                .supports_credentials()
                .max_age(3600);
            if let Some(front) = frontend_url.as_deref() {
                c = c.allowed_origin(front);
            }
            c
        };

        App::new()
            .wrap(TracingLogger::default())
            .wrap(Compress::default())
            .wrap(SecurityHeaders::new(enable_hsts))
            .wrap(cors)
            .app_data(state.clone())
            .app_data(keys.clone())
            .app_data(web::JsonConfig::default().error_handler(json_error_handler))
            .configure(config)
            .service(SwaggerUi::new("/docs/{_:.*}").url("/docs/openapi.json", openapi.clone()))
    })
    .bind(cfg.bind_addr.as_str())
    .with_context(|| format!("binding {}", cfg.bind_addr))?;

    info!("Listening on http://{}", cfg.bind_addr);
    server.run().await?;
    Ok(())
}
