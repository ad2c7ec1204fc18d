//! In-process `UserCollection` used by tests. Mirrors the unique index on `id`
//! and the update-count semantics of the MongoDB driver.

use std::sync::{
    atomic::{AtomicBool, AtomicUsize, Ordering},
    Mutex,
};

use async_trait::async_trait;
use bson::Document;
use time::OffsetDateTime;

use crate::error::StoreError;
use crate::users::model::{ActiveUser, Age, Exam, UpdateCounts, User};
use crate::users::repo::UserCollection;

#[derive(Default)]
pub struct InMemoryUsers {
    docs: Mutex<Vec<User>>,
    /// Documents that do not decode as `User`; only scans and counts see them.
    legacy: Mutex<Vec<Document>>,
    /// When set, every call fails as if the server were unreachable.
    pub offline: AtomicBool,
    pub index_calls: AtomicUsize,
    pub closed: AtomicUsize,
}

impl InMemoryUsers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Raw view of the stored documents, bypassing the store facade.
    pub fn snapshot(&self) -> Vec<User> {
        self.docs.lock().unwrap().clone()
    }

    pub fn insert_legacy(&self, document: Document) {
        self.legacy.lock().unwrap().push(document);
    }

    fn check_online(&self) -> Result<(), StoreError> {
        if self.offline.load(Ordering::SeqCst) {
            let io = std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "store offline");
            return Err(StoreError::Mongo(io.into()));
        }
        Ok(())
    }

    fn update(&self, id: &str, f: impl FnOnce(&mut User) -> bool) -> Result<UpdateCounts, StoreError> {
        self.check_online()?;
        let mut docs = self.docs.lock().unwrap();
        match docs.iter_mut().find(|u| u.id == id) {
            Some(user) => Ok(UpdateCounts {
                matched: 1,
                modified: u64::from(f(user)),
            }),
            None => Ok(UpdateCounts::default()),
        }
    }
}

#[async_trait]
impl UserCollection for InMemoryUsers {
    async fn ensure_unique_id(&self) -> Result<(), StoreError> {
        self.check_online()?;
        self.index_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn insert(&self, user: &User) -> Result<(), StoreError> {
        self.check_online()?;
        let mut docs = self.docs.lock().unwrap();
        if docs.iter().any(|u| u.id == user.id) {
            return Err(StoreError::DuplicateKey(user.id.clone()));
        }
        docs.push(user.clone());
        Ok(())
    }

    async fn exists(&self, id: &str) -> Result<bool, StoreError> {
        self.check_online()?;
        Ok(self.docs.lock().unwrap().iter().any(|u| u.id == id))
    }

    async fn push_exam(&self, id: &str, exam: &Exam) -> Result<UpdateCounts, StoreError> {
        self.update(id, |u| {
            u.exams.push(exam.clone());
            true
        })
    }

    async fn set_snapshot(
        &self,
        id: &str,
        at: OffsetDateTime,
        age: Option<Age>,
    ) -> Result<UpdateCounts, StoreError> {
        self.update(id, |u| {
            let before = u.clone();
            u.last_update = at;
            if let Some(age) = age {
                u.age = age.years;
                if age.months.is_some() {
                    u.age_months = age.months;
                }
            }
            *u != before
        })
    }

    async fn set_active(&self, id: &str, active: bool) -> Result<UpdateCounts, StoreError> {
        self.update(id, |u| {
            let changed = u.active != active;
            u.active = active;
            changed
        })
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<User>, StoreError> {
        self.check_online()?;
        Ok(self.docs.lock().unwrap().iter().find(|u| u.id == id).cloned())
    }

    async fn find_latest_exam(&self, id: &str) -> Result<Option<Exam>, StoreError> {
        Ok(self
            .find_by_id(id)
            .await?
            .and_then(|u| u.exams.last().cloned()))
    }

    async fn find_active_named(&self) -> Result<Vec<ActiveUser>, StoreError> {
        self.check_online()?;
        Ok(self
            .docs
            .lock()
            .unwrap()
            .iter()
            .filter(|u| u.active)
            .filter_map(|u| {
                u.user_name.as_ref().map(|name| ActiveUser {
                    id: u.id.clone(),
                    user_name: name.clone(),
                })
            })
            .collect())
    }

    async fn find_all(&self) -> Result<Vec<Document>, StoreError> {
        self.check_online()?;
        let mut all = self
            .snapshot()
            .iter()
            .map(bson::to_document)
            .collect::<Result<Vec<_>, _>>()?;
        all.extend(self.legacy.lock().unwrap().iter().cloned());
        Ok(all)
    }

    async fn count(&self, active_only: bool) -> Result<u64, StoreError> {
        self.check_online()?;
        let typed = self
            .docs
            .lock()
            .unwrap()
            .iter()
            .filter(|u| !active_only || u.active)
            .count();
        let legacy = self
            .legacy
            .lock()
            .unwrap()
            .iter()
            .filter(|d| !active_only || matches!(d.get_bool("active"), Ok(true)))
            .count();
        Ok((typed + legacy) as u64)
    }

    async fn close(&self) {
        self.closed.fetch_add(1, Ordering::SeqCst);
    }
}
