use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    Json,
};
use axum_extra::TypedHeader;
use headers::{authorization::Bearer, Authorization};
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_models::error::AppError;

use crate::models::SpecialistError;
use crate::services::DirectoryService;

#[derive(Debug, Deserialize)]
pub struct SpecialistQueryParams {
    pub specialty: Option<String>,
}

fn map_error(e: SpecialistError) -> AppError {
    match e {
        SpecialistError::NotFound => AppError::NotFound("Specialist not found".to_string()),
        SpecialistError::DatabaseError(msg) => AppError::Unavailable(msg),
    }
}

#[axum::debug_handler]
pub async fn list_specialties(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
) -> Result<Json<Value>, AppError> {
    let directory = DirectoryService::new(&state);

    let specialties = directory
        .list_specialties(auth.token())
        .await
        .map_err(map_error)?;

    Ok(Json(json!({
        "success": true,
        "specialties": specialties
    })))
}

#[axum::debug_handler]
pub async fn list_specialists(
    State(state): State<Arc<AppConfig>>,
    Query(params): Query<SpecialistQueryParams>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
) -> Result<Json<Value>, AppError> {
    let directory = DirectoryService::new(&state);

    let specialists = directory
        .list_specialists(params.specialty.as_deref(), auth.token())
        .await
        .map_err(map_error)?;

    Ok(Json(json!({
        "success": true,
        "specialists": specialists
    })))
}

#[axum::debug_handler]
pub async fn get_specialist(
    State(state): State<Arc<AppConfig>>,
    Path(specialist_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
) -> Result<Json<Value>, AppError> {
    let directory = DirectoryService::new(&state);

    let specialist = directory
        .get_specialist(specialist_id, auth.token())
        .await
        .map_err(map_error)?;

    Ok(Json(json!({
        "success": true,
        "specialist": specialist
    })))
}
