use thiserror::Error;

/// Failures surfaced by the user record store and its backing collection.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("MongoDB URI not provided")]
    MissingUri,

    #[error("database name not provided")]
    MissingDatabase,

    #[error("user id {0} already exists")]
    DuplicateKey(String),

    #[error("mongodb error: {0}")]
    Mongo(#[from] mongodb::error::Error),

    #[error("bson encode error: {0}")]
    Encode(#[from] bson::ser::Error),

    #[error("bson decode error: {0}")]
    Decode(#[from] bson::de::Error),

    #[error("bson document error: {0}")]
    Document(#[from] bson::document::ValueAccessError),
}
