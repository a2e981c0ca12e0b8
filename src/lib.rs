use axum::{
    Router,
    extract::{Path, Query, State},
    http::{HeaderValue, header},
    response::IntoResponse,
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use std::{collections::HashMap, path::PathBuf, sync::Arc};
use tower::ServiceBuilder;
use tower_http::{set_header::SetResponseHeaderLayer, trace::TraceLayer};

pub mod gallery;
pub mod ingest;
pub mod slug;
pub mod startup_checks;
pub mod static_files;
pub mod store;
pub mod templating;


#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    pub server: ServerConfig,
    pub app: AppConfig,
    pub templates: TemplateConfig,
    pub static_files: StaticConfig,
    pub database: DatabaseConfig,
    pub gallery: GalleryConfig,
    #[serde(default)]
    pub admin: AdminConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AppConfig {
    pub name: String,
    #[serde(default)]
    pub base_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TemplateConfig {
    pub directory: PathBuf,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StaticConfig {
    pub directory: PathBuf,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    /// SQLite file holding the gallery.
    pub path: PathBuf,
    /// Writable directory created at startup.
    pub data_directory: PathBuf,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GalleryConfig {
    pub images_directory: PathBuf,
    /// URL prefix the images directory is served under.
    pub image_url_prefix: String,
    #[serde(default)]
    pub metadata_file: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AdminConfig {
    /// Shared secret for `/admin/ingest`. The route is disabled when unset.
    #[serde(default)]
    pub token: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 3000,
            },
            app: AppConfig {
                name: "Prompt Wall".to_string(),
                base_url: None,
            },
            templates: TemplateConfig {
                directory: PathBuf::from("templates"),
            },
            static_files: StaticConfig {
                directory: PathBuf::from("static"),
            },
            database: DatabaseConfig {
                path: PathBuf::from("gallery.db"),
                data_directory: PathBuf::from("data"),
            },
            gallery: GalleryConfig {
                images_directory: PathBuf::from("static/images"),
                image_url_prefix: "/images".to_string(),
                metadata_file: Some(PathBuf::from("data/meta.json")),
            },
            admin: AdminConfig::default(),
        }
    }
}

impl Config {
    /// Applies `DB_FILE`, `DATA_DIR` and `ADMIN_TOKEN` from the process
    /// environment on top of the file-based configuration.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|key| std::env::var(key).ok());
    }

    pub fn apply_overrides_from<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.is_empty());

        if let Some(db_file) = non_empty("DB_FILE") {
            self.database.path = PathBuf::from(db_file);
        }
        if let Some(data_dir) = non_empty("DATA_DIR") {
            self.database.data_directory = PathBuf::from(data_dir);
        }
        if let Some(token) = non_empty("ADMIN_TOKEN") {
            self.admin.token = Some(token);
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    pub template_engine: Arc<templating::TemplateEngine>,
    pub static_handler: static_files::StaticFileHandler,
    pub image_handler: static_files::StaticFileHandler,
    pub database: store::Database,
    pub config: Config,
}

async fn static_file_handler(
    State(app_state): State<AppState>,
    Path(path): Path<String>,
    Query(params): Query<HashMap<String, String>>,
) -> impl IntoResponse {
    app_state
        .static_handler
        .serve(&path, params.contains_key("v"))
        .await
}

async fn image_file_handler(
    State(app_state): State<AppState>,
    Path(path): Path<String>,
) -> impl IntoResponse {
    app_state.image_handler.serve(&path, false).await
}

pub async fn create_app(config: Config, database: store::Database) -> Router {
    let template_engine = Arc::new(templating::TemplateEngine::new(
        config.templates.directory.clone(),
    ));

    let static_handler =
        static_files::StaticFileHandler::new(config.static_files.directory.clone());
    static_handler.refresh_file_versions().await;

    let image_handler =
        static_files::StaticFileHandler::new(config.gallery.images_directory.clone());

    let image_route = format!(
        "{}/{{*path}}",
        config.gallery.image_url_prefix.trim_end_matches('/')
    );

    let app_state = AppState {
        template_engine,
        static_handler,
        image_handler,
        database,
        config,
    };

    Router::new()
        .route("/", get(gallery::gallery_handler))
        .route("/recipe/{slug}", get(gallery::recipe_handler))
        .route("/like/{id}", post(gallery::like_handler))
        .route("/admin/ingest", get(gallery::admin_ingest_handler))
        .route("/static/{*path}", get(static_file_handler))
        .route(&image_route, get(image_file_handler))
        .layer(
            ServiceBuilder::new()
                .layer(
                    TraceLayer::new_for_http()
                        .make_span_with(|request: &axum::http::Request<_>| {
                            let method = request.method();
                            let uri = request.uri();
                            let matched_path = request
                                .extensions()
                                .get::<axum::extract::MatchedPath>()
                                .map(|matched_path| matched_path.as_str());

                            tracing::info_span!(
                                "http_request",
                                method = %method,
                                uri = %uri,
                                matched_path,
                            )
                        })
                        .on_request(|request: &axum::http::Request<_>, _span: &tracing::Span| {
                            let user_agent = request
                                .headers()
                                .get("user-agent")
                                .and_then(|h| h.to_str().ok())
                                .unwrap_or("-");

                            tracing::info!(
                                target: "access_log",
                                method = %request.method(),
                                path = %request.uri().path(),
                                query = ?request.uri().query(),
                                user_agent = %user_agent,
                                "request"
                            );
                        })
                        .on_response(
                            |response: &axum::http::Response<_>,
                             latency: std::time::Duration,
                             _span: &tracing::Span| {
                                tracing::info!(
                                    target: "access_log",
                                    status = %response.status(),
                                    latency_ms = %latency.as_millis(),
                                    "response"
                                );
                            },
                        ),
                )
                // Static responses carry their own cache headers.
                .layer(SetResponseHeaderLayer::if_not_present(
                    header::CACHE_CONTROL,
                    HeaderValue::from_static("no-store"),
                )),
        )
        .with_state(app_state)
}
