use super::{GalleryError, GalleryFilter, GalleryParams, ImageView, LikeResponse};
use crate::AppState;
use crate::ingest::{IngestSource, run_ingest_blocking};
use crate::store::{Database, Session, images, tags};
use axum::{
    Json,
    extract::{Path, Query, State},
    http::HeaderMap,
    response::{Html, IntoResponse, Response},
};
use serde::Deserialize;
use tracing::{info, warn};

/// Header set by htmx on in-page partial refreshes.
const PARTIAL_REQUEST_HEADER: &str = "hx-request";

const CARDS_TEMPLATE: &str = "_cards.html.liquid";

fn is_partial_request(headers: &HeaderMap) -> bool {
    headers
        .get(PARTIAL_REQUEST_HEADER)
        .and_then(|h| h.to_str().ok())
        .is_some_and(|v| !v.is_empty())
}

/// Runs store work on the blocking pool with a session scoped to the call.
async fn with_session<F, T>(database: &Database, f: F) -> Result<T, GalleryError>
where
    F: FnOnce(&Session) -> Result<T, GalleryError> + Send + 'static,
    T: Send + 'static,
{
    let database = database.clone();
    tokio::task::spawn_blocking(move || {
        let session = database.session()?;
        f(&session)
    })
    .await
    .map_err(|e| GalleryError::Task(e.to_string()))?
}

#[axum::debug_handler]
pub async fn gallery_handler(
    State(app_state): State<AppState>,
    Query(params): Query<GalleryParams>,
    headers: HeaderMap,
) -> Result<Response, GalleryError> {
    let filter = GalleryFilter::from(&params);
    let image_url_prefix = app_state.config.gallery.image_url_prefix.clone();

    let query_filter = filter.clone();
    let (views, all_tags) = with_session(&app_state.database, move |session| {
        let found = query_filter.execute(session)?;
        let ids: Vec<_> = found.iter().map(|image| image.id).collect();
        let lookup = tags::tags_for_images(session, &ids)?;
        let views = ImageView::from_images(found, lookup, &image_url_prefix);
        Ok((views, tags::list_all(session)?))
    })
    .await?;

    tracing::debug!("Gallery query {:?} returned {} images", filter, views.len());

    let style_url = app_state
        .static_handler
        .get_versioned_url("/static/style.css")
        .await;
    let script_url = app_state
        .static_handler
        .get_versioned_url("/static/script.js")
        .await;

    let globals = liquid::object!({
        "style_url": style_url,
        "script_url": script_url,
        "images": views,
        "tags": all_tags,
        "q": filter.text.clone().unwrap_or_default(),
        "active_tag": filter.tag.clone().unwrap_or_default(),
        "color": filter.color.clone().unwrap_or_default(),
        "shuffle": filter.shuffle,
        "app_name": app_state.config.app.name,
        "base_url": app_state.config.app.base_url,
        "page_title": app_state.config.app.name,
    });

    let engine = &app_state.template_engine;
    let cards = engine
        .render_fragment(CARDS_TEMPLATE, globals.clone())
        .await
        .map_err(GalleryError::Template)?;

    let html = if is_partial_request(&headers) {
        cards
    } else {
        // The full page embeds the same card markup the fragment returns.
        let mut page_globals = globals;
        page_globals.insert("cards".into(), liquid::model::Value::Scalar(cards.into()));
        engine
            .render_template("index.html.liquid", page_globals)
            .await
            .map_err(GalleryError::Template)?
    };

    Ok(Html(html).into_response())
}

#[axum::debug_handler]
pub async fn recipe_handler(
    State(app_state): State<AppState>,
    Path(slug): Path<String>,
) -> Result<Response, GalleryError> {
    let image_url_prefix = app_state.config.gallery.image_url_prefix.clone();

    let view = with_session(&app_state.database, move |session| {
        let image = images::find_by_slug(session, &slug)?.ok_or(GalleryError::NotFound)?;
        let mut lookup = tags::tags_for_images(session, &[image.id])?;
        let image_tags = lookup.remove(&image.id).unwrap_or_default();
        Ok(ImageView::new(image, image_tags, &image_url_prefix))
    })
    .await?;

    let globals = liquid::object!({
        "img": view,
        "app_name": app_state.config.app.name,
    });

    let html = app_state
        .template_engine
        .render_fragment("_recipe.html.liquid", globals)
        .await
        .map_err(GalleryError::Template)?;

    Ok(Html(html).into_response())
}

#[axum::debug_handler]
pub async fn like_handler(
    State(app_state): State<AppState>,
    Path(image_id): Path<i64>,
) -> Result<Json<LikeResponse>, GalleryError> {
    let likes = with_session(&app_state.database, move |session| {
        images::increment_likes(session, image_id)?.ok_or(GalleryError::NotFound)
    })
    .await?;

    tracing::debug!(image_id, likes, "Image liked");
    Ok(Json(LikeResponse { likes }))
}

#[derive(Debug, Deserialize)]
pub struct AdminParams {
    pub t: Option<String>,
}

/// Exact match against the configured token. An unset or empty token
/// disables the route entirely.
fn is_admin_token_valid(expected: Option<&str>, supplied: Option<&str>) -> bool {
    match (expected, supplied) {
        (Some(expected), Some(supplied)) if !expected.is_empty() => expected == supplied,
        _ => false,
    }
}

#[axum::debug_handler]
pub async fn admin_ingest_handler(
    State(app_state): State<AppState>,
    Query(params): Query<AdminParams>,
) -> Result<String, GalleryError> {
    if !is_admin_token_valid(app_state.config.admin.token.as_deref(), params.t.as_deref()) {
        warn!("Admin ingest request rejected");
        return Err(GalleryError::Forbidden);
    }

    let source = IngestSource {
        images_directory: app_state.config.gallery.images_directory.clone(),
        metadata_file: app_state.config.gallery.metadata_file.clone(),
    };

    info!("Admin ingest triggered for {:?}", source.images_directory);
    let report = run_ingest_blocking(app_state.database.clone(), source).await?;

    Ok(report.summary())
}
