//! Persistence and HTTP surface for SeeSay user and exam records, plus a
//! client for the speech transcription API.

pub mod app;
pub mod config;
pub mod error;
pub mod logging;
pub mod state;
pub mod storage;
pub mod transcribe;
pub mod users;

pub use error::StoreError;
pub use users::UserStore;
