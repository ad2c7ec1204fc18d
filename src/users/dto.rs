use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::users::model::{Exam, User, WriteOutcome};

/// Request body for `/api/createUser`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateUserRequest {
    pub user_id: String,
    pub user_name: String,
    #[serde(default)]
    pub age: i32,
}

/// Request body for `/api/addTestToUser`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddTestRequest {
    pub user_id: String,
    /// Age at the time of the exam; replaces the stored age when present.
    #[serde(default)]
    pub age_years: Option<i32>,
    #[serde(default)]
    pub age_months: Option<i32>,
    #[serde(default)]
    pub correct: i64,
    #[serde(default)]
    pub partly: i64,
    #[serde(default)]
    pub wrong: i64,
    #[serde(default)]
    pub time_took: f64,
    /// Base64-encoded recording.
    #[serde(default)]
    pub audio_file: Option<String>,
    #[serde(default = "default_audio_content_type")]
    pub audio_content_type: String,
    #[serde(default)]
    pub final_evaluation: serde_json::Value,
}

fn default_audio_content_type() -> String {
    "audio/webm".into()
}

/// Body of every mutation response.
#[derive(Debug, Serialize)]
pub struct OutcomeResponse {
    pub ok: bool,
    pub outcome: WriteOutcome,
}

impl From<WriteOutcome> for OutcomeResponse {
    fn from(outcome: WriteOutcome) -> Self {
        Self {
            ok: outcome.is_success(),
            outcome,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExamView {
    #[serde(with = "time::serde::rfc3339")]
    pub exam_date: OffsetDateTime,
    pub time_took: f64,
    pub errors: serde_json::Value,
    pub audio_file: Option<String>,
    pub final_evaluation: serde_json::Value,
}

impl From<Exam> for ExamView {
    fn from(e: Exam) -> Self {
        Self {
            exam_date: e.exam_date,
            time_took: e.time_took,
            errors: e.errors.into_relaxed_extjson(),
            audio_file: e.audio_file,
            final_evaluation: e.final_evaluation.into_relaxed_extjson(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct UserView {
    pub id: String,
    pub user_name: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub date_join: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub last_update: OffsetDateTime,
    pub age: i32,
    pub age_months: Option<i32>,
    pub exams: Vec<ExamView>,
    pub active: bool,
}

impl From<User> for UserView {
    fn from(u: User) -> Self {
        Self {
            id: u.id,
            user_name: u.user_name,
            date_join: u.date_join,
            last_update: u.last_update,
            age: u.age,
            age_months: u.age_months,
            exams: u.exams.into_iter().map(ExamView::from).collect(),
            active: u.active,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LatestExamResponse {
    #[serde(flatten)]
    pub exam: ExamView,
    /// Presigned link to the stored recording, when there is one.
    pub audio_url: Option<String>,
}
