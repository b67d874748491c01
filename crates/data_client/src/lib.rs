pub mod bigquery;
pub mod client;
pub mod query;
pub mod service;

pub use bigquery::BigQueryService;
pub use client::DataClient;
pub use query::{DomainQuery, QueryDomain, QueryRequest, REGISTRY_DEFAULT_YEARS};
pub use service::{QueryService, ServiceFailure};
