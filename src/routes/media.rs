use actix_web::{http::header, web, HttpResponse};

use super::AppState;
use crate::error::ApiError;
use crate::storage::MediaStoreError;

// serve stored image / avatar by key
pub async fn serve_upload(data: web::Data<AppState>, path: web::Path<String>) -> Result<HttpResponse, ApiError> {
    let key = path.into_inner();
    match data.media.load(&key).await {
        Ok((bytes, mime)) => Ok(HttpResponse::Ok()
            .insert_header((header::CONTENT_TYPE, mime))
            .insert_header((header::CACHE_CONTROL, "public, max-age=86400"))
            .body(bytes)),
        Err(MediaStoreError::NotFound) | Err(MediaStoreError::InvalidKey(_)) => Err(ApiError::NotFound),
        Err(e) => {
            log::error!("media load error for {key}: {e}");
            Err(ApiError::Internal)
        }
    }
}
