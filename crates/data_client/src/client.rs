use arrow::record_batch::RecordBatch;
use log::{debug, info, warn};

use shared::errors::{DemographyError, DemographyResult};
use shared::models::config::DemographyConfig;

use crate::query::{QueryDomain, QueryRequest};
use crate::service::QueryService;

/// Builds domain queries and dispatches them to a query service,
/// billing every execution to one project.
pub struct DataClient<S: QueryService> {
    service: S,
    billing_project_id: String,
}

impl<S: QueryService> DataClient<S> {
    pub fn new<P: Into<String>>(service: S, billing_project_id: P) -> DemographyResult<Self> {
        let billing_project_id = billing_project_id.into();
        if billing_project_id.trim().is_empty() {
            return Err(DemographyError::validation("billing project id must not be empty"));
        }
        Ok(Self {
            service,
            billing_project_id,
        })
    }

    pub fn from_config(service: S, config: &DemographyConfig) -> DemographyResult<Self> {
        Self::new(service, config.billing_project_id.clone())
    }

    pub fn service(&self) -> &S {
        &self.service
    }

    pub fn billing_project_id(&self) -> &str {
        &self.billing_project_id
    }

    /// Validates the request, renders its SQL and runs it.
    ///
    /// Invalid input fails with [`DemographyError::Validation`] before
    /// anything is sent; failures of the service come back as
    /// [`DemographyError::Service`] naming the target and the request.
    pub async fn build_and_run<T: AsRef<str>>(
        &self,
        domain: QueryDomain,
        municipality_ids: &[T],
        start_year: Option<i32>,
        end_year: Option<i32>,
    ) -> DemographyResult<RecordBatch> {
        let request = QueryRequest::new(domain, municipality_ids, start_year, end_year)?;
        self.run(&request).await
    }

    pub async fn run(&self, request: &QueryRequest) -> DemographyResult<RecordBatch> {
        let sql = request.render_sql();
        let target = request.target();
        let municipalities: Vec<String> = request
            .municipalities()
            .iter()
            .map(|id| id.to_string())
            .collect();

        info!(
            "Querying {} for {} ({} municipalities) via {}",
            target,
            request.domain(),
            municipalities.len(),
            self.service.service_name()
        );
        debug!("SQL:\n{}", sql);

        match self.service.run_query(&sql, &self.billing_project_id).await {
            Ok(batch) => {
                info!("{}: {} rows", request.domain(), batch.num_rows());
                Ok(batch)
            }
            Err(failure) => {
                warn!("Query on {} failed: {}", target, failure);
                Err(DemographyError::Service {
                    target,
                    municipalities,
                    years: request.years().map(|years| years.as_tuple()),
                    message: failure.to_string(),
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::ServiceFailure;
    use arrow::datatypes::{DataType, Field, Schema};
    use async_trait::async_trait;
    use std::sync::{Arc, Mutex};

    #[derive(Default)]
    struct RecordingService {
        queries: Mutex<Vec<(String, String)>>,
        fail: bool,
    }

    #[async_trait]
    impl QueryService for RecordingService {
        async fn run_query(&self, sql: &str, billing_project_id: &str) -> Result<RecordBatch, ServiceFailure> {
            self.queries
                .lock()
                .unwrap()
                .push((sql.to_string(), billing_project_id.to_string()));
            if self.fail {
                return Err(ServiceFailure::Http {
                    status: 403,
                    message: "Access Denied".to_string(),
                });
            }
            let schema = Arc::new(Schema::new(vec![Field::new("Idade", DataType::Int64, true)]));
            Ok(RecordBatch::new_empty(schema))
        }

        fn service_name(&self) -> &'static str {
            "recording"
        }
    }

    #[tokio::test]
    async fn test_build_and_run_dispatches_rendered_sql() {
        let service = Arc::new(RecordingService::default());
        let client = DataClient::new(service.clone(), "billing").unwrap();

        let batch = client
            .build_and_run(QueryDomain::Births, &["3550308"], Some(2019), Some(2020))
            .await
            .unwrap();
        assert_eq!(batch.num_rows(), 0);

        let queries = service.queries.lock().unwrap();
        assert_eq!(queries.len(), 1);
        assert!(queries[0].0.contains("(ano BETWEEN 2019 AND 2020)"));
        assert_eq!(queries[0].1, "billing");
    }

    #[tokio::test]
    async fn test_invalid_input_sends_nothing() {
        let service = Arc::new(RecordingService::default());
        let client = DataClient::new(service.clone(), "billing").unwrap();

        let result = client
            .build_and_run(QueryDomain::Births, &["355030"], None, None)
            .await;
        assert!(matches!(result, Err(DemographyError::Validation(_))));
        assert!(service.queries.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_service_failure_carries_context() {
        let service = RecordingService {
            fail: true,
            ..RecordingService::default()
        };
        let client = DataClient::new(service, "billing").unwrap();

        let err = client
            .build_and_run(QueryDomain::Deaths, &["3550308", "3304557"], Some(2010), Some(2011))
            .await
            .unwrap_err();
        assert!(err.is_service_failure());
        match err {
            DemographyError::Service {
                target,
                municipalities,
                years,
                message,
            } => {
                assert_eq!(target, "basedosdados.br_ms_sim.microdados");
                assert_eq!(municipalities, vec!["3550308", "3304557"]);
                assert_eq!(years, Some((2010, 2011)));
                assert!(message.contains("Access Denied"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_empty_billing_project_rejected() {
        assert!(DataClient::new(RecordingService::default(), " ").is_err());
    }
}
