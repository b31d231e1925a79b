//! HTTP client for end-to-end tests
//!
//! This module provides a high-level HTTP client that wraps reqwest
//! and provides methods for all skill catalog endpoints.
//!
//! When API routes or request formats change, update only this file.
#![allow(dead_code)]

use super::constants::*;
use reqwest::{Response, StatusCode};
use serde_json::{json, Value};
use std::time::Duration;

pub struct TestClient {
    /// The underlying reqwest client (public for custom requests in tests)
    pub client: reqwest::Client,
    /// The base URL of the test server
    pub base_url: String,
}

impl TestClient {
    pub fn new(base_url: String) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .expect("Failed to build reqwest client");

        Self { client, base_url }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn get(&self, path: &str) -> Response {
        self.client
            .get(self.url(path))
            .send()
            .await
            .expect("GET request failed")
    }

    async fn post_json(&self, path: &str, body: Value) -> Response {
        self.client
            .post(self.url(path))
            .json(&body)
            .send()
            .await
            .expect("POST request failed")
    }

    // ========================================================================
    // Projects, subjects and skills
    // ========================================================================

    /// POST /v1/projects
    pub async fn create_project(&self, project_id: &str, name: &str) -> Response {
        self.post_json(
            "/v1/projects",
            json!({ "project_id": project_id, "name": name }),
        )
        .await
    }

    /// GET /v1/projects/{p}
    pub async fn get_project(&self, project_id: &str) -> Response {
        self.get(&format!("/v1/projects/{}", project_id)).await
    }

    /// Total points of a project, panicking if it cannot be read
    pub async fn project_points(&self, project_id: &str) -> i64 {
        let response = self.get_project(project_id).await;
        assert_eq!(response.status(), StatusCode::OK);
        let project: Value = response.json().await.unwrap();
        project["total_points"].as_i64().unwrap()
    }

    /// POST /v1/projects/{p}/subjects
    pub async fn create_subject(&self, project_id: &str, subject_id: &str, name: &str) -> Response {
        self.post_json(
            &format!("/v1/projects/{}/subjects", project_id),
            json!({ "subject_id": subject_id, "name": name }),
        )
        .await
    }

    /// POST /v1/projects/{p}/subjects/{subj}/skills
    pub async fn create_skill(
        &self,
        project_id: &str,
        subject_id: &str,
        skill_id: &str,
        name: &str,
        point_increment: i64,
        num_perform: i64,
    ) -> Response {
        self.post_json(
            &format!("/v1/projects/{}/subjects/{}/skills", project_id, subject_id),
            json!({
                "skill_id": skill_id,
                "name": name,
                "point_increment": point_increment,
                "num_perform_to_completion": num_perform,
            }),
        )
        .await
    }

    /// Creates a project with the test subject and one skill.
    pub async fn seed_project(
        &self,
        project_id: &str,
        project_name: &str,
        skill_id: &str,
        skill_name: &str,
        point_increment: i64,
        num_perform: i64,
    ) {
        let response = self.create_project(project_id, project_name).await;
        assert_eq!(response.status(), StatusCode::CREATED);
        let response = self
            .create_subject(project_id, SUBJECT_ID, SUBJECT_NAME)
            .await;
        assert_eq!(response.status(), StatusCode::CREATED);
        let response = self
            .create_skill(
                project_id,
                SUBJECT_ID,
                skill_id,
                skill_name,
                point_increment,
                num_perform,
            )
            .await;
        assert_eq!(response.status(), StatusCode::CREATED);
    }

    /// GET /v1/projects/{p}/skills/{s}
    pub async fn get_skill(&self, project_id: &str, skill_id: &str) -> Response {
        self.get(&format!("/v1/projects/{}/skills/{}", project_id, skill_id))
            .await
    }

    /// GET /v1/projects/{p}/skills/{s}, decoded
    pub async fn skill_json(&self, project_id: &str, skill_id: &str) -> Value {
        let response = self.get_skill(project_id, skill_id).await;
        assert_eq!(response.status(), StatusCode::OK);
        response.json().await.unwrap()
    }

    /// Polls a skill until `predicate` holds, for state the finalization
    /// worker updates in the background.
    pub async fn wait_for_skill<F>(&self, project_id: &str, skill_id: &str, predicate: F) -> Value
    where
        F: Fn(&Value) -> bool,
    {
        let start = std::time::Instant::now();
        loop {
            let skill = self.skill_json(project_id, skill_id).await;
            if predicate(&skill) {
                return skill;
            }
            if start.elapsed() > Duration::from_millis(SERVER_READY_TIMEOUT_MS) {
                panic!("Skill {}/{} never reached the expected state: {}", project_id, skill_id, skill);
            }
            tokio::time::sleep(Duration::from_millis(SERVER_READY_POLL_INTERVAL_MS)).await;
        }
    }

    /// PUT /v1/projects/{p}/skills/{s}
    pub async fn update_skill(&self, project_id: &str, skill_id: &str, body: Value) -> Response {
        self.client
            .put(self.url(&format!("/v1/projects/{}/skills/{}", project_id, skill_id)))
            .json(&body)
            .send()
            .await
            .expect("Update skill request failed")
    }

    /// PATCH /v1/projects/{p}/skills/{s}/points
    pub async fn update_points(&self, project_id: &str, skill_id: &str, point_increment: i64) -> Response {
        self.client
            .patch(self.url(&format!(
                "/v1/projects/{}/skills/{}/points",
                project_id, skill_id
            )))
            .json(&json!({ "point_increment": point_increment }))
            .send()
            .await
            .expect("Update points request failed")
    }

    /// DELETE /v1/projects/{p}/skills/{s}
    pub async fn delete_skill(&self, project_id: &str, skill_id: &str) -> Response {
        self.client
            .delete(self.url(&format!("/v1/projects/{}/skills/{}", project_id, skill_id)))
            .send()
            .await
            .expect("Delete skill request failed")
    }

    // ========================================================================
    // Export
    // ========================================================================

    /// POST /v1/projects/{p}/skills/{s}/export
    pub async fn export_skill(&self, project_id: &str, skill_id: &str) -> Response {
        self.post_json(
            &format!("/v1/projects/{}/skills/{}/export", project_id, skill_id),
            Value::Null,
        )
        .await
    }

    /// POST /v1/projects/{p}/skills/export
    pub async fn bulk_export(&self, project_id: &str, skill_ids: &[&str]) -> Response {
        self.post_json(
            &format!("/v1/projects/{}/skills/export", project_id),
            json!(skill_ids),
        )
        .await
    }

    /// POST /v1/projects/{p}/skills/exportable
    pub async fn check_exportable(&self, project_id: &str, skill_ids: &[&str]) -> Response {
        self.post_json(
            &format!("/v1/projects/{}/skills/exportable", project_id),
            json!(skill_ids),
        )
        .await
    }

    /// GET /v1/projects/{p}/catalog/exists/{idOrName}
    pub async fn exists_in_catalog(&self, project_id: &str, id_or_name: &str) -> Response {
        self.client
            .get(self.url(&format!(
                "/v1/projects/{}/catalog/exists/{}",
                project_id,
                id_or_name.replace(' ', "%20")
            )))
            .send()
            .await
            .expect("Exists request failed")
    }

    /// GET /v1/projects/{p}/catalog/exported
    pub async fn list_exported(&self, project_id: &str, query: &[(&str, &str)]) -> Response {
        self.client
            .get(self.url(&format!("/v1/projects/{}/catalog/exported", project_id)))
            .query(query)
            .send()
            .await
            .expect("List exported request failed")
    }

    // ========================================================================
    // Import and finalization
    // ========================================================================

    /// GET /v1/projects/{p}/catalog/importable
    pub async fn list_importable(&self, project_id: &str, query: &[(&str, &str)]) -> Response {
        self.client
            .get(self.url(&format!(
                "/v1/projects/{}/catalog/importable",
                project_id
            )))
            .query(query)
            .send()
            .await
            .expect("List importable request failed")
    }

    /// POST /v1/projects/{p}/subjects/{subj}/import/{fromP}/{fromS}
    pub async fn import_skill(
        &self,
        project_id: &str,
        subject_id: &str,
        from_project_id: &str,
        from_skill_id: &str,
    ) -> Response {
        self.post_json(
            &format!(
                "/v1/projects/{}/subjects/{}/import/{}/{}",
                project_id, subject_id, from_project_id, from_skill_id
            ),
            Value::Null,
        )
        .await
    }

    /// POST /v1/projects/{p}/subjects/{subj}/import
    pub async fn bulk_import(
        &self,
        project_id: &str,
        subject_id: &str,
        entries: &[(&str, &str)],
    ) -> Response {
        let refs: Vec<Value> = entries
            .iter()
            .map(|(p, s)| json!({ "project_id": p, "skill_id": s }))
            .collect();
        self.post_json(
            &format!("/v1/projects/{}/subjects/{}/import", project_id, subject_id),
            Value::Array(refs),
        )
        .await
    }

    /// POST /v1/projects/{p}/catalog/finalize
    pub async fn finalize(&self, project_id: &str) -> Response {
        self.post_json(
            &format!("/v1/projects/{}/catalog/finalize", project_id),
            Value::Null,
        )
        .await
    }

    /// GET /v1/projects/{p}/catalog/finalize/info
    pub async fn finalize_info(&self, project_id: &str) -> Response {
        self.get(&format!("/v1/projects/{}/catalog/finalize/info", project_id))
            .await
    }

    // ========================================================================
    // Deletion
    // ========================================================================

    /// DELETE /v1/projects/{p}/skills/{s}/export
    pub async fn delete_exported(&self, project_id: &str, skill_id: &str, confirmation: &str) -> Response {
        self.client
            .delete(self.url(&format!(
                "/v1/projects/{}/skills/{}/export",
                project_id, skill_id
            )))
            .json(&json!({ "confirmation_text": confirmation }))
            .send()
            .await
            .expect("Delete exported request failed")
    }

    /// GET /v1/projects/{p}/skills/{s}/exported/importers
    pub async fn list_importers(&self, project_id: &str, skill_id: &str) -> Response {
        self.get(&format!(
            "/v1/projects/{}/skills/{}/exported/importers",
            project_id, skill_id
        ))
        .await
    }
}
