//! Shared constants for end-to-end tests
//!
//! When test data changes (project ids, skill names, etc.), update only this file.
#![allow(dead_code)]

// ============================================================================
// Test Projects
// ============================================================================

/// Project that exports skills
pub const PROJ_1_ID: &str = "proj1";
pub const PROJ_1_NAME: &str = "Project 1";

/// Project that imports skills
pub const PROJ_2_ID: &str = "proj2";
pub const PROJ_2_NAME: &str = "Project 2";

/// A third project, for multi-importer scenarios
pub const PROJ_3_ID: &str = "proj3";
pub const PROJ_3_NAME: &str = "Project 3";

/// Subject created in every seeded project
pub const SUBJECT_ID: &str = "subj1";
pub const SUBJECT_NAME: &str = "Subject 1";

// ============================================================================
// Test Skills
// ============================================================================

pub const SKILL_1_ID: &str = "skill1";
pub const SKILL_1_NAME: &str = "Very Great Skill 1";

pub const SKILL_2_ID: &str = "skill2";
pub const SKILL_2_NAME: &str = "Very Great Skill 2";

/// Own skill of an importing project, sized so the project can export
pub const LOCAL_SKILL_ID: &str = "local1";
pub const LOCAL_SKILL_NAME: &str = "Local Skill";

/// Literal text that confirms a catalog deletion
pub const DELETE_CONFIRMATION_TEXT: &str = "Delete Me";

// ============================================================================
// Timeouts
// ============================================================================

/// Maximum time to wait for server to become ready (milliseconds)
pub const SERVER_READY_TIMEOUT_MS: u64 = 5000;

/// Timeout for individual HTTP requests (seconds)
pub const REQUEST_TIMEOUT_SECS: u64 = 10;

/// Polling interval when waiting for server ready (milliseconds)
pub const SERVER_READY_POLL_INTERVAL_MS: u64 = 50;
