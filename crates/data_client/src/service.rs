use std::sync::Arc;

use arrow::record_batch::RecordBatch;
use async_trait::async_trait;
use thiserror::Error;

/// Failures reported by a query service implementation
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ServiceFailure {
    #[error("request failed: {message}")]
    Transport { message: String },
    #[error("service returned HTTP {status}: {message}")]
    Http { status: u16, message: String },
    #[error("query rejected: {message}")]
    Query { message: String },
    #[error("job {job_id} did not complete within the wait window")]
    Incomplete { job_id: String },
    #[error("unexpected response: {message}")]
    Decode { message: String },
}

impl ServiceFailure {
    pub fn transport<S: Into<String>>(message: S) -> Self {
        Self::Transport { message: message.into() }
    }

    pub fn decode<S: Into<String>>(message: S) -> Self {
        Self::Decode { message: message.into() }
    }
}

/// Executes read-only SQL against the remote warehouse, billed to a project.
#[async_trait]
pub trait QueryService: Send + Sync {
    /// Runs `sql` and returns every result row as one record batch
    async fn run_query(&self, sql: &str, billing_project_id: &str) -> Result<RecordBatch, ServiceFailure>;

    /// Short name used in log lines
    fn service_name(&self) -> &'static str;
}

#[async_trait]
impl<T: QueryService + ?Sized> QueryService for Arc<T> {
    async fn run_query(&self, sql: &str, billing_project_id: &str) -> Result<RecordBatch, ServiceFailure> {
        (**self).run_query(sql, billing_project_id).await
    }

    fn service_name(&self) -> &'static str {
        (**self).service_name()
    }
}

#[async_trait]
impl<T: QueryService + ?Sized> QueryService for Box<T> {
    async fn run_query(&self, sql: &str, billing_project_id: &str) -> Result<RecordBatch, ServiceFailure> {
        (**self).run_query(sql, billing_project_id).await
    }

    fn service_name(&self) -> &'static str {
        (**self).service_name()
    }
}
