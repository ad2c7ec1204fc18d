use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use bson::{doc, Document};
use futures::TryStreamExt;
use mongodb::{
    error::{ErrorKind, WriteError, WriteFailure},
    options::{ClientOptions, IndexOptions},
    Client, Collection, IndexModel,
};
use time::OffsetDateTime;
use tracing::info;

use crate::config::MongoConfig;
use crate::error::StoreError;
use crate::users::model::{ActiveUser, Age, Exam, UpdateCounts, User};

pub const USERS_COLLECTION: &str = "users";

const DUPLICATE_KEY_CODE: i32 = 11000;

/// Document-level operations the user store needs from its backing collection.
#[async_trait]
pub trait UserCollection: Send + Sync {
    async fn ensure_unique_id(&self) -> Result<(), StoreError>;
    /// Fails with `StoreError::DuplicateKey` when the id is taken.
    async fn insert(&self, user: &User) -> Result<(), StoreError>;
    async fn exists(&self, id: &str) -> Result<bool, StoreError>;
    async fn push_exam(&self, id: &str, exam: &Exam) -> Result<UpdateCounts, StoreError>;
    /// Sets `last_update`, and `age`/`age_months` when an age is given.
    async fn set_snapshot(
        &self,
        id: &str,
        at: OffsetDateTime,
        age: Option<Age>,
    ) -> Result<UpdateCounts, StoreError>;
    async fn set_active(&self, id: &str, active: bool) -> Result<UpdateCounts, StoreError>;
    async fn find_by_id(&self, id: &str) -> Result<Option<User>, StoreError>;
    /// Last element of `exams` only, `None` when the user or its exams are missing.
    async fn find_latest_exam(&self, id: &str) -> Result<Option<Exam>, StoreError>;
    async fn find_active_named(&self) -> Result<Vec<ActiveUser>, StoreError>;
    /// Raw documents, so records that no longer match `User` still show up.
    async fn find_all(&self) -> Result<Vec<Document>, StoreError>;
    async fn count(&self, active_only: bool) -> Result<u64, StoreError>;
    async fn close(&self);
}

/// `users` collection on a live MongoDB deployment.
pub struct MongoUsers {
    client: Client,
    users: Collection<User>,
    raw: Collection<Document>,
    closed: AtomicBool,
}

impl MongoUsers {
    /// Opens a client and verifies it with `ping`. Does not touch indexes.
    pub async fn connect(cfg: &MongoConfig) -> Result<Self, StoreError> {
        if cfg.uri.trim().is_empty() {
            return Err(StoreError::MissingUri);
        }
        if cfg.database.trim().is_empty() {
            return Err(StoreError::MissingDatabase);
        }

        let mut options = ClientOptions::parse(&cfg.uri).await?;
        options.server_selection_timeout = Some(cfg.server_selection_timeout());
        options.max_pool_size = Some(cfg.max_pool_size);
        options.retry_writes = Some(true);
        options.app_name = Some("seesay".into());

        let client = Client::with_options(options)?;
        client.database("admin").run_command(doc! { "ping": 1 }).await?;

        let db = client.database(&cfg.database);
        info!(database = %cfg.database, "connected to MongoDB");
        Ok(Self {
            users: db.collection(USERS_COLLECTION),
            raw: db.collection(USERS_COLLECTION),
            client,
            closed: AtomicBool::new(false),
        })
    }
}

fn is_duplicate_key(err: &mongodb::error::Error) -> bool {
    matches!(
        err.kind.as_ref(),
        ErrorKind::Write(WriteFailure::WriteError(WriteError {
            code: DUPLICATE_KEY_CODE,
            ..
        }))
    )
}

#[async_trait]
impl UserCollection for MongoUsers {
    async fn ensure_unique_id(&self) -> Result<(), StoreError> {
        let index = IndexModel::builder()
            .keys(doc! { "id": 1 })
            .options(IndexOptions::builder().unique(true).build())
            .build();
        self.users.create_index(index).await?;
        Ok(())
    }

    async fn insert(&self, user: &User) -> Result<(), StoreError> {
        match self.users.insert_one(user).await {
            Ok(_) => Ok(()),
            Err(e) if is_duplicate_key(&e) => Err(StoreError::DuplicateKey(user.id.clone())),
            Err(e) => Err(e.into()),
        }
    }

    async fn exists(&self, id: &str) -> Result<bool, StoreError> {
        let found = self
            .raw
            .find_one(doc! { "id": id })
            .projection(doc! { "_id": 1 })
            .await?;
        Ok(found.is_some())
    }

    async fn push_exam(&self, id: &str, exam: &Exam) -> Result<UpdateCounts, StoreError> {
        let exam = bson::to_bson(exam)?;
        let res = self
            .users
            .update_one(doc! { "id": id }, doc! { "$push": { "exams": exam } })
            .await?;
        Ok(UpdateCounts {
            matched: res.matched_count,
            modified: res.modified_count,
        })
    }

    async fn set_snapshot(
        &self,
        id: &str,
        at: OffsetDateTime,
        age: Option<Age>,
    ) -> Result<UpdateCounts, StoreError> {
        let mut set = doc! { "last_update": bson::DateTime::from_time_0_3(at) };
        if let Some(age) = age {
            set.insert("age", age.years);
            if let Some(months) = age.months {
                set.insert("age_months", months);
            }
        }
        let res = self
            .users
            .update_one(doc! { "id": id }, doc! { "$set": set })
            .await?;
        Ok(UpdateCounts {
            matched: res.matched_count,
            modified: res.modified_count,
        })
    }

    async fn set_active(&self, id: &str, active: bool) -> Result<UpdateCounts, StoreError> {
        let res = self
            .users
            .update_one(doc! { "id": id }, doc! { "$set": { "active": active } })
            .await?;
        Ok(UpdateCounts {
            matched: res.matched_count,
            modified: res.modified_count,
        })
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<User>, StoreError> {
        Ok(self.users.find_one(doc! { "id": id }).await?)
    }

    async fn find_latest_exam(&self, id: &str) -> Result<Option<Exam>, StoreError> {
        let found = self
            .raw
            .find_one(doc! { "id": id })
            .projection(doc! { "_id": 0, "exams": { "$slice": -1 } })
            .await?;
        let Some(document) = found else {
            return Ok(None);
        };
        match document.get_array("exams").ok().and_then(|a| a.last()) {
            Some(latest) => Ok(Some(bson::from_bson(latest.clone())?)),
            None => Ok(None),
        }
    }

    async fn find_active_named(&self) -> Result<Vec<ActiveUser>, StoreError> {
        let cursor = self
            .raw
            .find(doc! {
                "active": true,
                "user_name": { "$exists": true, "$ne": null },
            })
            .projection(doc! { "_id": 0, "id": 1, "user_name": 1 })
            .await?;
        let documents: Vec<Document> = cursor.try_collect().await?;
        documents
            .iter()
            .map(|d| -> Result<ActiveUser, StoreError> {
                Ok(ActiveUser {
                    id: d.get_str("id")?.to_string(),
                    user_name: d.get_str("user_name")?.to_string(),
                })
            })
            .collect()
    }

    async fn find_all(&self) -> Result<Vec<Document>, StoreError> {
        let cursor = self.raw.find(doc! {}).await?;
        Ok(cursor.try_collect().await?)
    }

    async fn count(&self, active_only: bool) -> Result<u64, StoreError> {
        let filter = if active_only {
            doc! { "active": true }
        } else {
            doc! {}
        };
        Ok(self.users.count_documents(filter).await?)
    }

    async fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.client.clone().shutdown().await;
        info!("MongoDB connection closed");
    }
}

/// Runs against a real deployment: `MONGODB_TEST_URI=mongodb://localhost:27017
/// cargo test -- --ignored`. Each test uses its own throwaway database.
#[cfg(test)]
mod mongo_tests {
    use bson::Bson;

    use super::*;
    use crate::users::model::NewExam;

    async fn connect() -> Option<(MongoUsers, String)> {
        let Ok(uri) = std::env::var("MONGODB_TEST_URI") else {
            eprintln!("MONGODB_TEST_URI not set; skipping");
            return None;
        };
        let database = format!("seesay_test_{}", uuid::Uuid::new_v4().simple());
        let users = MongoUsers::connect(&MongoConfig::new(uri, database.clone()))
            .await
            .expect("connect to test deployment");
        users.ensure_unique_id().await.expect("unique index");
        Some((users, database))
    }

    async fn drop_database(users: &MongoUsers, database: &str) {
        users.client.database(database).drop().await.expect("drop test db");
    }

    fn exam(label: &str) -> Exam {
        NewExam {
            time_took: 1.5,
            errors: Bson::Int32(0),
            audio_file: None,
            final_evaluation: Bson::String(label.into()),
        }
        .into_exam()
    }

    #[tokio::test]
    #[ignore]
    async fn duplicate_insert_maps_to_duplicate_key() {
        let Some((users, db)) = connect().await else { return };
        users.insert(&User::new("u1", "Tom", 30, Vec::new())).await.unwrap();
        let err = users
            .insert(&User::new("u1", "Tom2", 31, Vec::new()))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::DuplicateKey(ref id) if id == "u1"));

        let all = users.find_all().await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].get_str("user_name").unwrap(), "Tom");
        drop_database(&users, &db).await;
    }

    #[tokio::test]
    #[ignore]
    async fn latest_exam_uses_tail_slice() {
        let Some((users, db)) = connect().await else { return };
        users.insert(&User::new("u1", "Tom", 30, Vec::new())).await.unwrap();
        assert_eq!(users.find_latest_exam("u1").await.unwrap(), None);

        for label in ["a", "b", "c"] {
            let counts = users.push_exam("u1", &exam(label)).await.unwrap();
            assert_eq!(counts, UpdateCounts { matched: 1, modified: 1 });
        }
        let latest = users.find_latest_exam("u1").await.unwrap().unwrap();
        assert_eq!(latest.final_evaluation, Bson::String("c".into()));

        let missing = users.push_exam("ghost", &exam("x")).await.unwrap();
        assert_eq!(missing.matched, 0);
        assert!(!users.exists("ghost").await.unwrap());
        drop_database(&users, &db).await;
    }

    #[tokio::test]
    #[ignore]
    async fn active_projection_skips_null_and_missing_names() {
        let Some((users, db)) = connect().await else { return };
        users.insert(&User::new("u1", "Tom", 30, Vec::new())).await.unwrap();
        let mut nameless = User::new("u2", "x", 5, Vec::new());
        nameless.user_name = None;
        users.insert(&nameless).await.unwrap();
        users
            .raw
            .insert_one(doc! { "id": "u3", "user_name": null, "active": true })
            .await
            .unwrap();
        users.insert(&User::new("u4", "Ann", 7, Vec::new())).await.unwrap();
        users.set_active("u4", false).await.unwrap();

        let active = users.find_active_named().await.unwrap();
        assert_eq!(
            active,
            vec![ActiveUser { id: "u1".into(), user_name: "Tom".into() }]
        );
        drop_database(&users, &db).await;
    }

    #[tokio::test]
    #[ignore]
    async fn dump_includes_documents_that_do_not_decode() {
        let Some((users, db)) = connect().await else { return };
        users.insert(&User::new("u1", "Tom", 30, Vec::new())).await.unwrap();
        users
            .raw
            .insert_one(doc! { "id": "legacy", "active": "yes" })
            .await
            .unwrap();

        assert_eq!(users.find_all().await.unwrap().len(), 2);
        assert_eq!(users.count(false).await.unwrap(), 2);
        drop_database(&users, &db).await;
    }

    #[tokio::test]
    #[ignore]
    async fn snapshot_writes_age_and_close_runs_once() {
        let Some((users, db)) = connect().await else { return };
        users.insert(&User::new("u1", "Tom", 0, Vec::new())).await.unwrap();
        let age = Age { years: 4, months: Some(6) };
        let counts = users
            .set_snapshot("u1", crate::users::model::now(), Some(age))
            .await
            .unwrap();
        assert_eq!(counts.matched, 1);
        let user = users.find_by_id("u1").await.unwrap().unwrap();
        assert_eq!((user.age, user.age_months), (4, Some(6)));

        drop_database(&users, &db).await;
        users.close().await;
        assert!(users.closed.load(Ordering::SeqCst));
        users.close().await;
    }
}
