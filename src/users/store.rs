use std::sync::Arc;

use bson::Document;
use tracing::{error, info, warn};

use crate::config::MongoConfig;
use crate::error::StoreError;
use crate::users::model::{now, ActiveUser, Age, Exam, NewExam, StoreStats, User, WriteOutcome};
use crate::users::repo::{MongoUsers, UserCollection};

/// Facade over the `users` collection.
///
/// Only `connect` returns an error. Every other operation logs its failure and
/// degrades to a `WriteOutcome`, `None` or an empty collection.
#[derive(Clone)]
pub struct UserStore {
    users: Arc<dyn UserCollection>,
}

impl UserStore {
    /// Connects, pings, and ensures the unique index on `id`.
    pub async fn connect(cfg: &MongoConfig) -> Result<Self, StoreError> {
        let users = MongoUsers::connect(cfg).await.map_err(|e| {
            error!(error = %e, "failed to connect to MongoDB");
            e
        })?;
        Self::with_collection(Arc::new(users)).await
    }

    pub async fn with_collection(users: Arc<dyn UserCollection>) -> Result<Self, StoreError> {
        users.ensure_unique_id().await.map_err(|e| {
            error!(error = %e, "failed to ensure unique index on id");
            e
        })?;
        Ok(Self { users })
    }

    pub async fn add_user(&self, id: &str, user_name: &str, age: i32) -> WriteOutcome {
        self.add_user_with_exams(id, user_name, age, Vec::new()).await
    }

    pub async fn add_user_with_exams(
        &self,
        id: &str,
        user_name: &str,
        age: i32,
        exams: Vec<Exam>,
    ) -> WriteOutcome {
        let user = User::new(id, user_name, age, exams);
        match self.users.insert(&user).await {
            Ok(()) => {
                info!(user_id = %id, user_name = %user_name, "added new user");
                WriteOutcome::Success
            }
            Err(StoreError::DuplicateKey(_)) => {
                warn!(user_id = %id, "user id already exists; no action taken");
                WriteOutcome::Duplicate
            }
            Err(e) => {
                error!(user_id = %id, user_name = %user_name, error = %e, "error adding user");
                WriteOutcome::StoreError
            }
        }
    }

    pub async fn add_exam_to_user(&self, id: &str, exam: NewExam) -> WriteOutcome {
        let exam = exam.into_exam();
        match self.users.push_exam(id, &exam).await {
            Ok(counts) => {
                let outcome = WriteOutcome::from_counts(counts);
                match outcome {
                    WriteOutcome::NotFound => {
                        warn!(user_id = %id, "user not found; cannot add exam")
                    }
                    WriteOutcome::Unchanged => {
                        warn!(user_id = %id, "exam addition resulted in no change")
                    }
                    _ => info!(user_id = %id, "added new exam"),
                }
                outcome
            }
            Err(e) => {
                error!(user_id = %id, error = %e, "error adding exam");
                WriteOutcome::StoreError
            }
        }
    }

    /// `Success` if a document with this id exists, `NotFound` if not.
    pub async fn check_user(&self, id: &str) -> WriteOutcome {
        match self.users.exists(id).await {
            Ok(true) => WriteOutcome::Success,
            Ok(false) => WriteOutcome::NotFound,
            Err(e) => {
                error!(user_id = %id, error = %e, "error checking user");
                WriteOutcome::StoreError
            }
        }
    }

    pub async fn get_user_config(&self, id: &str) -> Option<User> {
        self.users.find_by_id(id).await.unwrap_or_else(|e| {
            error!(user_id = %id, error = %e, "error getting user config");
            None
        })
    }

    pub async fn get_active_users(&self) -> Vec<ActiveUser> {
        self.users.find_active_named().await.unwrap_or_else(|e| {
            error!(error = %e, "error getting active users");
            Vec::new()
        })
    }

    pub async fn update_last_snapshot(&self, id: &str) -> WriteOutcome {
        self.snapshot(id, None).await
    }

    /// Refreshes `last_update` and records the age reported with an exam.
    pub async fn update_snapshot_with_age(&self, id: &str, age: Age) -> WriteOutcome {
        self.snapshot(id, Some(age)).await
    }

    async fn snapshot(&self, id: &str, age: Option<Age>) -> WriteOutcome {
        match self.users.set_snapshot(id, now(), age).await {
            Ok(counts) => WriteOutcome::from_counts(counts),
            Err(e) => {
                error!(user_id = %id, error = %e, "error updating last snapshot");
                WriteOutcome::StoreError
            }
        }
    }

    pub async fn deactivate_user(&self, id: &str) -> WriteOutcome {
        match self.users.set_active(id, false).await {
            Ok(counts) => {
                let outcome = WriteOutcome::from_counts(counts);
                if outcome.is_success() {
                    info!(user_id = %id, "deactivated user");
                }
                outcome
            }
            Err(e) => {
                error!(user_id = %id, error = %e, "error deactivating user");
                WriteOutcome::StoreError
            }
        }
    }

    pub async fn get_latest_exam(&self, id: &str) -> Option<Exam> {
        match self.users.find_latest_exam(id).await {
            Ok(Some(exam)) => {
                info!(user_id = %id, "retrieved latest exam");
                Some(exam)
            }
            Ok(None) => {
                warn!(user_id = %id, "no exams recorded or user not found");
                None
            }
            Err(e) => {
                error!(user_id = %id, error = %e, "error getting latest exam");
                None
            }
        }
    }

    /// Unfiltered dump of raw documents, for diagnostics.
    pub async fn get_all_users(&self) -> Vec<Document> {
        self.users.find_all().await.unwrap_or_else(|e| {
            error!(error = %e, "error getting all users");
            Vec::new()
        })
    }

    pub async fn get_stats(&self) -> Option<StoreStats> {
        let counts = async {
            Ok::<_, StoreError>(StoreStats {
                total_users: self.users.count(false).await?,
                active_users: self.users.count(true).await?,
            })
        };
        counts.await.map_err(|e| error!(error = %e, "error getting stats")).ok()
    }

    pub async fn close_connection(&self) {
        self.users.close().await;
    }
}
