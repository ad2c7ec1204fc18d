use bson::Bson;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// User document stored in the `users` collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    #[serde(default)]
    pub user_name: Option<String>,
    #[serde(with = "bson_datetime")]
    pub date_join: OffsetDateTime,
    #[serde(with = "bson_datetime")]
    pub last_update: OffsetDateTime,
    #[serde(default)]
    pub age: i32,
    /// Months past `age` years, as reported with the latest exam.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub age_months: Option<i32>,
    #[serde(default)]
    pub exams: Vec<Exam>,
    #[serde(default)]
    pub active: bool,
}

impl User {
    /// Fresh active user, both timestamps set to `now`.
    pub fn new(id: &str, user_name: &str, age: i32, exams: Vec<Exam>) -> Self {
        let now = now();
        Self {
            id: id.to_string(),
            user_name: Some(user_name.to_string()),
            date_join: now,
            last_update: now,
            age,
            age_months: None,
            exams,
            active: true,
        }
    }
}

/// One completed assessment, embedded in `User::exams`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Exam {
    #[serde(with = "bson_datetime")]
    pub exam_date: OffsetDateTime,
    #[serde(rename = "timeTook")]
    pub time_took: f64,
    pub errors: Bson,
    #[serde(rename = "audioFile")]
    pub audio_file: Option<String>,
    #[serde(rename = "finalEvaluation")]
    pub final_evaluation: Bson,
}

/// Exam payload supplied by callers; `exam_date` is stamped on append.
#[derive(Debug, Clone)]
pub struct NewExam {
    pub time_took: f64,
    pub errors: Bson,
    pub audio_file: Option<String>,
    pub final_evaluation: Bson,
}

impl NewExam {
    pub fn into_exam(self) -> Exam {
        Exam {
            exam_date: now(),
            time_took: self.time_took,
            errors: self.errors,
            audio_file: self.audio_file,
            final_evaluation: self.final_evaluation,
        }
    }
}

/// Age reported alongside an exam; `years` replaces `User::age`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Age {
    pub years: i32,
    pub months: Option<i32>,
}

/// Projection returned by `get_active_users`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActiveUser {
    pub id: String,
    pub user_name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StoreStats {
    pub total_users: u64,
    pub active_users: u64,
}

/// Matched/modified counts of a single-document update.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct UpdateCounts {
    pub matched: u64,
    pub modified: u64,
}

/// Result kind of a store mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WriteOutcome {
    Success,
    NotFound,
    Duplicate,
    /// The document matched but the update changed nothing.
    Unchanged,
    StoreError,
}

impl WriteOutcome {
    pub fn is_success(self) -> bool {
        self == WriteOutcome::Success
    }

    /// Outcome of an update that is expected to modify the matched document.
    pub fn from_counts(counts: UpdateCounts) -> Self {
        match counts {
            UpdateCounts { matched: 0, .. } => WriteOutcome::NotFound,
            UpdateCounts { modified: 0, .. } => WriteOutcome::Unchanged,
            _ => WriteOutcome::Success,
        }
    }
}

/// BSON datetimes carry millisecond precision; truncate so stored and
/// in-memory values compare equal.
pub(crate) fn now() -> OffsetDateTime {
    bson::DateTime::now().to_time_0_3()
}

/// Stores `OffsetDateTime` as a native BSON datetime.
pub(crate) mod bson_datetime {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use time::OffsetDateTime;

    pub fn serialize<S: Serializer>(value: &OffsetDateTime, s: S) -> Result<S::Ok, S::Error> {
        bson::DateTime::from_time_0_3(*value).serialize(s)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<OffsetDateTime, D::Error> {
        Ok(bson::DateTime::deserialize(d)?.to_time_0_3())
    }
}
