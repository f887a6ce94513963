/// StoreError is the store's public error boundary. Callers match on it to
/// decide behavior (intake treats `Conflict` as "fetch the existing row
/// instead"); everything else propagates as an opaque database failure.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// `Create` was called with a `tx_hash` that already exists. The row was
    /// not mutated.
    #[error("job {0} already exists")]
    Conflict(String),

    /// `Get`/`Update` targeted a `tx_hash` with no row.
    #[error("job {0} not found")]
    NotFound(String),

    #[error("database error")]
    Database(#[from] sqlx::Error),

    #[error("database migration failed")]
    Migrate(#[from] sqlx::migrate::MigrateError),
}
