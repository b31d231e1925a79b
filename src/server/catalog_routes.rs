//! HTTP routes of the skill catalog.

use super::state::*;
use super::ServerConfig;
use crate::catalog::{CatalogEntryRef, CatalogError};
use crate::catalog_store::{
    ExportedQuery, ExportedSortField, ImportableQuery, ImportableSortField, PageRequest,
    SortDirection,
};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tracing::error;

#[derive(Serialize, Debug)]
pub(super) struct ErrorResponse {
    pub error: String,
    pub code: &'static str,
}

impl CatalogError {
    fn status_code(&self) -> StatusCode {
        match self {
            CatalogError::Conflict(_) | CatalogError::AlreadyImported { .. } => {
                StatusCode::CONFLICT
            }
            CatalogError::NotFound(_) => StatusCode::NOT_FOUND,
            CatalogError::SelfImport { .. }
            | CatalogError::ValidationError(_)
            | CatalogError::NotExportable { .. }
            | CatalogError::InsufficientPoints { .. } => StatusCode::BAD_REQUEST,
            CatalogError::FinalizationInProgress(_) => StatusCode::LOCKED,
            CatalogError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for CatalogError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let error = match &self {
            CatalogError::Store(e) => {
                error!("Store failure while serving request: {:#}", e);
                "Internal server error".to_string()
            }
            other => other.to_string(),
        };
        let body = ErrorResponse {
            error,
            code: self.code(),
        };
        (status, Json(body)).into_response()
    }
}

#[derive(Deserialize, Debug, Default)]
struct ExportedParams {
    page: Option<u32>,
    page_size: Option<u32>,
    sort_by: Option<ExportedSortField>,
    sort_dir: Option<SortDirection>,
}

#[derive(Deserialize, Debug, Default)]
struct ImportableParams {
    page: Option<u32>,
    page_size: Option<u32>,
    skill_name: Option<String>,
    project_name: Option<String>,
    sort_by: Option<ImportableSortField>,
    sort_dir: Option<SortDirection>,
}

#[derive(Deserialize, Debug)]
struct DeleteEntryBody {
    confirmation_text: String,
}

#[derive(Serialize)]
struct ExistsResponse {
    exists: bool,
}

fn page_request(config: &ServerConfig, page: Option<u32>, page_size: Option<u32>) -> PageRequest {
    PageRequest {
        page: page.unwrap_or(1).max(1),
        page_size: page_size
            .unwrap_or(config.default_page_size)
            .clamp(1, config.max_page_size),
    }
}

/// Blank filters mean no filter.
fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

async fn export_skill(
    State(export): State<GuardedExportService>,
    Path((project_id, skill_id)): Path<(String, String)>,
) -> Result<Response, CatalogError> {
    let result = export.export_one(&project_id, &skill_id)?;
    Ok((StatusCode::CREATED, Json(result)).into_response())
}

async fn bulk_export_skills(
    State(export): State<GuardedExportService>,
    Path(project_id): Path<String>,
    Json(skill_ids): Json<Vec<String>>,
) -> Result<Response, CatalogError> {
    Ok(Json(export.export_many(&project_id, &skill_ids)?).into_response())
}

async fn check_exportable(
    State(export): State<GuardedExportService>,
    Path(project_id): Path<String>,
    Json(skill_ids): Json<Vec<String>>,
) -> Result<Response, CatalogError> {
    Ok(Json(export.check_exportable(&project_id, &skill_ids)?).into_response())
}

async fn exists_in_catalog(
    State(export): State<GuardedExportService>,
    Path((project_id, id_or_name)): Path<(String, String)>,
) -> Result<Response, CatalogError> {
    let exists = export.exists_in_catalog(&project_id, &id_or_name)?;
    Ok(Json(ExistsResponse { exists }).into_response())
}

async fn list_exported(
    State(config): State<ServerConfig>,
    State(export): State<GuardedExportService>,
    Path(project_id): Path<String>,
    Query(params): Query<ExportedParams>,
) -> Result<Response, CatalogError> {
    let query = ExportedQuery {
        page: page_request(&config, params.page, params.page_size),
        sort_by: params.sort_by.unwrap_or_default(),
        sort_dir: params.sort_dir.unwrap_or_default(),
    };
    Ok(Json(export.list_exported(&project_id, &query)?).into_response())
}

async fn list_importable(
    State(config): State<ServerConfig>,
    State(import): State<GuardedImportService>,
    Path(project_id): Path<String>,
    Query(params): Query<ImportableParams>,
) -> Result<Response, CatalogError> {
    let query = ImportableQuery {
        page: page_request(&config, params.page, params.page_size),
        skill_name: non_blank(params.skill_name),
        project_name: non_blank(params.project_name),
        sort_by: params.sort_by.unwrap_or_default(),
        sort_dir: params.sort_dir.unwrap_or_default(),
    };
    Ok(Json(import.list_importable(&project_id, &query)?).into_response())
}

async fn import_skill(
    State(import): State<GuardedImportService>,
    Path((project_id, subject_id, from_project_id, from_skill_id)): Path<(
        String,
        String,
        String,
        String,
    )>,
) -> Result<Response, CatalogError> {
    let entry_ref = CatalogEntryRef::new(from_project_id, from_skill_id);
    let binding = import.import_one(&project_id, &subject_id, &entry_ref)?;
    Ok((StatusCode::CREATED, Json(binding)).into_response())
}

async fn bulk_import_skills(
    State(import): State<GuardedImportService>,
    Path((project_id, subject_id)): Path<(String, String)>,
    Json(entry_refs): Json<Vec<CatalogEntryRef>>,
) -> Result<Response, CatalogError> {
    Ok(Json(import.import_many(&project_id, &subject_id, &entry_refs)?).into_response())
}

async fn finalize_project(
    State(import): State<GuardedImportService>,
    Path(project_id): Path<String>,
) -> Result<Response, CatalogError> {
    Ok(Json(import.finalize_project(&project_id).await?).into_response())
}

async fn finalize_info(
    State(import): State<GuardedImportService>,
    Path(project_id): Path<String>,
) -> Result<Response, CatalogError> {
    Ok(Json(import.finalize_info(&project_id)?).into_response())
}

async fn delete_exported_entry(
    State(deletion): State<GuardedDeletionService>,
    Path((project_id, skill_id)): Path<(String, String)>,
    Json(body): Json<DeleteEntryBody>,
) -> Result<Response, CatalogError> {
    let result = deletion.delete_entry(&project_id, &skill_id, &body.confirmation_text)?;
    Ok(Json(result).into_response())
}

async fn list_importers(
    State(deletion): State<GuardedDeletionService>,
    Path((project_id, skill_id)): Path<(String, String)>,
) -> Result<Response, CatalogError> {
    Ok(Json(deletion.list_importers(&project_id, &skill_id)?).into_response())
}

/// Routes relative to `/v1/projects`.
pub fn catalog_routes(state: ServerState) -> Router {
    Router::new()
        .route("/{project_id}/skills/export", post(bulk_export_skills))
        .route("/{project_id}/skills/exportable", post(check_exportable))
        .route(
            "/{project_id}/skills/{skill_id}/export",
            post(export_skill).delete(delete_exported_entry),
        )
        .route(
            "/{project_id}/skills/{skill_id}/exported/importers",
            get(list_importers),
        )
        .route(
            "/{project_id}/catalog/exists/{id_or_name}",
            get(exists_in_catalog),
        )
        .route("/{project_id}/catalog/exported", get(list_exported))
        .route("/{project_id}/catalog/importable", get(list_importable))
        .route("/{project_id}/catalog/finalize", post(finalize_project))
        .route("/{project_id}/catalog/finalize/info", get(finalize_info))
        .route(
            "/{project_id}/subjects/{subject_id}/import",
            post(bulk_import_skills),
        )
        .route(
            "/{project_id}/subjects/{subject_id}/import/{from_project_id}/{from_skill_id}",
            post(import_skill),
        )
        .with_state(state)
}
