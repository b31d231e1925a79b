//! Minimal project, subject and skill management, enough to drive the catalog.

use super::state::*;
use crate::catalog::CatalogError;
use crate::catalog_store::CatalogRegistry;
use crate::skill_store::{
    validate_point_increment, NewSkill, PointsEngine, SkillStore, SkillUpdate,
};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, patch, post},
    Json, Router,
};
use serde::Deserialize;
use tracing::{debug, warn};

#[derive(Deserialize, Debug)]
struct CreateProjectBody {
    pub project_id: String,
    pub name: String,
}

#[derive(Deserialize, Debug)]
struct CreateSubjectBody {
    pub subject_id: String,
    pub name: String,
}

#[derive(Deserialize, Debug)]
struct UpdatePointsBody {
    pub point_increment: i64,
}

fn not_found(what: &str, id: &str) -> CatalogError {
    CatalogError::NotFound(format!("{} {} not found", what, id))
}

fn recompute_points(state: &ServerState, project_id: &str) -> Result<(), CatalogError> {
    let points = state.points_engine.recompute_project(project_id)?;
    debug!(
        "Project {} now has {} points",
        project_id, points.total_points
    );
    Ok(())
}

async fn create_project(
    State(skills): State<GuardedSkillStore>,
    Json(body): Json<CreateProjectBody>,
) -> Result<Response, CatalogError> {
    if body.project_id.trim().is_empty() || body.name.trim().is_empty() {
        return Err(CatalogError::ValidationError(
            "project_id and name must not be empty".to_string(),
        ));
    }
    if skills.get_project(&body.project_id)?.is_some() {
        return Err(CatalogError::Conflict(format!(
            "Project {} already exists",
            body.project_id
        )));
    }
    let project = skills.create_project(&body.project_id, &body.name)?;
    Ok((StatusCode::CREATED, Json(project)).into_response())
}

async fn get_project(
    State(skills): State<GuardedSkillStore>,
    Path(project_id): Path<String>,
) -> Result<Response, CatalogError> {
    match skills.get_project(&project_id)? {
        Some(project) => Ok(Json(project).into_response()),
        None => Err(not_found("Project", &project_id)),
    }
}

async fn create_subject(
    State(skills): State<GuardedSkillStore>,
    Path(project_id): Path<String>,
    Json(body): Json<CreateSubjectBody>,
) -> Result<Response, CatalogError> {
    if skills.get_project(&project_id)?.is_none() {
        return Err(not_found("Project", &project_id));
    }
    if skills.get_subject(&project_id, &body.subject_id)?.is_some() {
        return Err(CatalogError::Conflict(format!(
            "Subject {} already exists in project {}",
            body.subject_id, project_id
        )));
    }
    let subject = skills.create_subject(&project_id, &body.subject_id, &body.name)?;
    Ok((StatusCode::CREATED, Json(subject)).into_response())
}

async fn create_skill(
    State(state): State<ServerState>,
    Path((project_id, subject_id)): Path<(String, String)>,
    Json(body): Json<NewSkill>,
) -> Result<Response, CatalogError> {
    body.validate().map_err(CatalogError::ValidationError)?;
    if state
        .skill_store
        .get_subject(&project_id, &subject_id)?
        .is_none()
    {
        return Err(not_found("Subject", &subject_id));
    }
    if state
        .skill_store
        .get_skill(&project_id, &body.skill_id)?
        .is_some()
    {
        return Err(CatalogError::Conflict(format!(
            "Skill {} already exists in project {}",
            body.skill_id, project_id
        )));
    }

    let skill = state
        .skill_store
        .create_skill(&project_id, &subject_id, &body)?;
    recompute_points(&state, &project_id)?;
    Ok((StatusCode::CREATED, Json(skill)).into_response())
}

async fn list_skills(
    State(skills): State<GuardedSkillStore>,
    Path(project_id): Path<String>,
) -> Result<Response, CatalogError> {
    if skills.get_project(&project_id)?.is_none() {
        return Err(not_found("Project", &project_id));
    }
    Ok(Json(skills.list_skills(&project_id)?).into_response())
}

async fn get_skill(
    State(skills): State<GuardedSkillStore>,
    Path((project_id, skill_id)): Path<(String, String)>,
) -> Result<Response, CatalogError> {
    match skills.get_skill(&project_id, &skill_id)? {
        Some(skill) => Ok(Json(skill).into_response()),
        None => Err(not_found("Skill", &skill_id)),
    }
}

async fn update_skill(
    State(state): State<ServerState>,
    Path((project_id, skill_id)): Path<(String, String)>,
    Json(body): Json<SkillUpdate>,
) -> Result<Response, CatalogError> {
    body.validate().map_err(CatalogError::ValidationError)?;
    let existing = state
        .skill_store
        .get_skill(&project_id, &skill_id)?
        .ok_or_else(|| not_found("Skill", &skill_id))?;
    if existing.is_imported() {
        return Err(CatalogError::ValidationError(format!(
            "Skill {} is imported from the catalog, only its points can be changed",
            skill_id
        )));
    }

    let skill = state
        .skill_store
        .update_skill(&project_id, &skill_id, &body)?
        .ok_or_else(|| not_found("Skill", &skill_id))?;
    recompute_points(&state, &project_id)?;
    state
        .finalization_worker
        .source_skill_changed(&project_id, &skill_id)?;
    Ok(Json(skill).into_response())
}

async fn update_skill_points(
    State(state): State<ServerState>,
    Path((project_id, skill_id)): Path<(String, String)>,
    Json(body): Json<UpdatePointsBody>,
) -> Result<Response, CatalogError> {
    validate_point_increment(body.point_increment).map_err(CatalogError::ValidationError)?;
    let skill = state
        .skill_store
        .set_point_increment(&project_id, &skill_id, body.point_increment)?
        .ok_or_else(|| not_found("Skill", &skill_id))?;
    recompute_points(&state, &project_id)?;
    Ok(Json(skill).into_response())
}

async fn delete_skill(
    State(state): State<ServerState>,
    Path((project_id, skill_id)): Path<(String, String)>,
) -> Result<Response, CatalogError> {
    let skill = state
        .skill_store
        .get_skill(&project_id, &skill_id)?
        .ok_or_else(|| not_found("Skill", &skill_id))?;
    if skill.is_imported() {
        state
            .import_service
            .destination_skill_deleted(&project_id, &skill_id)?;
    }
    if state
        .catalog_store
        .get_entry(&project_id, &skill_id)?
        .is_some()
    {
        // Importers keep their copies, finalization reports the missing source
        warn!(
            "Deleting skill {}/{} which is still in the catalog",
            project_id, skill_id
        );
    }

    state.skill_store.delete_skill(&project_id, &skill_id)?;
    recompute_points(&state, &project_id)?;
    Ok(StatusCode::NO_CONTENT.into_response())
}

/// Routes relative to `/v1/projects`.
pub fn skill_routes(state: ServerState) -> Router {
    Router::new()
        .route("/", post(create_project))
        .route("/{project_id}", get(get_project))
        .route("/{project_id}/subjects", post(create_subject))
        .route(
            "/{project_id}/subjects/{subject_id}/skills",
            post(create_skill),
        )
        .route("/{project_id}/skills", get(list_skills))
        .route(
            "/{project_id}/skills/{skill_id}",
            get(get_skill).put(update_skill).delete(delete_skill),
        )
        .route(
            "/{project_id}/skills/{skill_id}/points",
            patch(update_skill_points),
        )
        .with_state(state)
}
