pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("database error: {0}")]
    Redb(#[from] redb::Error),

    #[error("database open error: {0}")]
    RedbDatabase(#[from] redb::DatabaseError),

    #[error("database storage error: {0}")]
    RedbStorage(#[from] redb::StorageError),

    #[error("database transaction error: {0}")]
    RedbTransaction(#[from] redb::TransactionError),

    #[error("database table error: {0}")]
    RedbTable(#[from] redb::TableError),

    #[error("database commit error: {0}")]
    RedbCommit(#[from] redb::CommitError),

    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("ingestion failed: {0}")]
    Ingestion(String),

    #[error("embedding batch failed: {0}")]
    EmbeddingBatch(String),

    #[error("index not ready: run build() or load() first")]
    NotReady,

    #[error("index corrupted: {0}")]
    Corruption(String),

    #[error("another build is already running against this index")]
    BuildInProgress,

    #[error("{kind} not found: {name}")]
    NotFound { kind: &'static str, name: String },
}
