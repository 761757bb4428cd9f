//! HTTP handlers exposing the cache-first facade
//!
//! A thin surface for the surrounding protocol layer: each handler maps
//! one facade operation onto a route and converts typed errors into
//! status codes via `ResponseError`.

use actix_web::{web, HttpResponse};
use bytes::BytesMut;
use chrono::{DateTime, Utc};
use futures::StreamExt;
use log::{debug, error, info};
use serde::Serialize;

use crate::app_state::AppState;
use crate::error::NimbusError;
use crate::service::facade::StatInfo;

/// Stat payload returned to the protocol layer
#[derive(Debug, Serialize)]
pub struct StatResponse {
    pub is_directory: bool,
    pub size: u64,
    pub owning_account_present: bool,
    pub modified: Option<String>,
}

impl From<StatInfo> for StatResponse {
    fn from(info: StatInfo) -> Self {
        Self {
            is_directory: info.is_directory,
            size: info.size,
            owning_account_present: info.owning_account_present,
            modified: info
                .modified
                .map(|t| DateTime::<Utc>::from(t).to_rfc3339()),
        }
    }
}

fn logical_path(tail: &str) -> String {
    format!("/{}", tail)
}

pub async fn write_handler(
    path: web::Path<String>,
    mut payload: web::Payload,
    app_state: web::Data<AppState>,
) -> Result<HttpResponse, NimbusError> {
    let path = logical_path(&path.into_inner());
    log_mdc::insert("path", &path);
    debug!("PUT called for {}", path);

    let mut bytes = BytesMut::new();
    while let Some(chunk) = payload.next().await {
        let chunk = chunk.map_err(|e| {
            error!("Payload read failed for {}: {}", path, e);
            NimbusError::LocalIo(std::io::Error::new(std::io::ErrorKind::Other, e))
        })?;
        bytes.extend_from_slice(&chunk);
    }
    info!("Received {} bytes for {}", bytes.len(), path);

    let size = app_state.facade.write(&path, &bytes).await?;
    Ok(HttpResponse::Ok().body(format!("Stored {} bytes at {}", size, path)))
}

pub async fn read_handler(
    path: web::Path<String>,
    app_state: web::Data<AppState>,
) -> Result<HttpResponse, NimbusError> {
    let path = logical_path(&path.into_inner());
    log_mdc::insert("path", &path);
    debug!("GET called for {}", path);

    let data = app_state.facade.read(&path).await?;
    Ok(HttpResponse::Ok()
        .content_type("application/octet-stream")
        .body(data))
}

pub async fn delete_handler(
    path: web::Path<String>,
    app_state: web::Data<AppState>,
) -> Result<HttpResponse, NimbusError> {
    let path = logical_path(&path.into_inner());
    log_mdc::insert("path", &path);
    debug!("DELETE called for {}", path);

    app_state.facade.delete(&path).await?;
    Ok(HttpResponse::Ok().body(format!("Deleted {}", path)))
}

pub async fn list_handler(
    path: web::Path<String>,
    app_state: web::Data<AppState>,
) -> Result<HttpResponse, NimbusError> {
    let path = logical_path(&path.into_inner());
    log_mdc::insert("path", &path);
    debug!("LIST called for {}", path);

    let children = app_state.facade.list_children(&path)?;
    Ok(HttpResponse::Ok().json(children))
}

pub async fn stat_handler(
    path: web::Path<String>,
    app_state: web::Data<AppState>,
) -> Result<HttpResponse, NimbusError> {
    let path = logical_path(&path.into_inner());
    log_mdc::insert("path", &path);
    debug!("STAT called for {}", path);

    let info = app_state.facade.stat(&path)?;
    Ok(HttpResponse::Ok().json(StatResponse::from(info)))
}
