use crate::state::AppState;
use axum::Router;

pub mod dto;
pub mod handlers;
#[cfg(test)]
pub(crate) mod memory;
pub mod model;
pub mod repo;
pub mod store;

pub use model::{ActiveUser, Exam, NewExam, StoreStats, User, WriteOutcome};
pub use store::UserStore;

pub fn router() -> Router<AppState> {
    handlers::user_routes()
}
