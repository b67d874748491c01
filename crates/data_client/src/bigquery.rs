//! Query service backed by the BigQuery REST API (`jobs.query` plus
//! `jobs.getQueryResults` for further pages).

use std::sync::Arc;
use std::time::Duration;

use arrow::array::{ArrayRef, BooleanArray, Float64Array, Int64Array, StringArray};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use async_trait::async_trait;
use log::{debug, info};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use url::Url;

use shared::errors::DemographyResult;
use shared::models::config::{DEFAULT_TIMEOUT_MS, DemographyConfig};

use crate::service::{QueryService, ServiceFailure};

static NULL_CELL: Value = Value::Null;

#[derive(Debug, Clone)]
pub struct BigQueryService {
    http: reqwest::Client,
    base_url: Url,
    access_token: Option<String>,
    timeout_ms: u64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct QueryRequestBody<'a> {
    query: &'a str,
    use_legacy_sql: bool,
    timeout_ms: u64,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct QueryResponse {
    #[serde(default)]
    job_complete: Option<bool>,
    #[serde(default)]
    job_reference: Option<JobReference>,
    #[serde(default)]
    schema: Option<TableSchema>,
    #[serde(default)]
    rows: Vec<TableRow>,
    #[serde(default)]
    page_token: Option<String>,
    #[serde(default)]
    errors: Vec<ErrorProto>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JobReference {
    job_id: String,
    #[serde(default)]
    location: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct TableSchema {
    #[serde(default)]
    fields: Vec<TableFieldSchema>,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct TableFieldSchema {
    name: String,
    #[serde(rename = "type")]
    field_type: String,
    #[serde(default)]
    mode: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct TableRow {
    #[serde(default)]
    f: Vec<TableCell>,
}

#[derive(Debug, Deserialize)]
struct TableCell {
    #[serde(default)]
    v: Value,
}

#[derive(Debug, Deserialize)]
struct ErrorProto {
    #[serde(default)]
    reason: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorEnvelope {
    error: ApiError,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    message: String,
}

impl BigQueryService {
    pub fn new(base_url: Url) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url,
            access_token: None,
            timeout_ms: DEFAULT_TIMEOUT_MS,
        }
    }

    pub fn from_config(config: &DemographyConfig) -> DemographyResult<Self> {
        config.validate()?;
        let mut service = Self::new(config.api_base_url()?).with_timeout_ms(config.timeout_ms);
        if let Some(token) = &config.access_token {
            service = service.with_access_token(token.clone());
        }
        Ok(service)
    }

    pub fn with_access_token<S: Into<String>>(mut self, token: S) -> Self {
        self.access_token = Some(token.into());
        self
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    fn endpoint(&self, path: &str) -> Result<Url, ServiceFailure> {
        self.base_url
            .join(path)
            .map_err(|e| ServiceFailure::transport(format!("invalid endpoint '{path}': {e}")))
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        // The HTTP client itself waits a little longer than the server-side window
        let request = request.timeout(Duration::from_millis(self.timeout_ms + 10_000));
        match &self.access_token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn post_query(&self, sql: &str, billing_project_id: &str) -> Result<QueryResponse, ServiceFailure> {
        let url = self.endpoint(&format!("projects/{billing_project_id}/queries"))?;
        let body = QueryRequestBody {
            query: sql,
            use_legacy_sql: false,
            timeout_ms: self.timeout_ms,
        };
        let response = self
            .authorize(self.http.post(url))
            .json(&body)
            .send()
            .await
            .map_err(|e| ServiceFailure::transport(e.to_string()))?;
        decode_response(response).await
    }

    async fn fetch_page(
        &self,
        billing_project_id: &str,
        job: &JobReference,
        page_token: &str,
    ) -> Result<QueryResponse, ServiceFailure> {
        let mut url = self.endpoint(&format!("projects/{billing_project_id}/queries/{}", job.job_id))?;
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("pageToken", page_token);
            query.append_pair("timeoutMs", &self.timeout_ms.to_string());
            if let Some(location) = &job.location {
                query.append_pair("location", location);
            }
        }
        let response = self
            .authorize(self.http.get(url))
            .send()
            .await
            .map_err(|e| ServiceFailure::transport(e.to_string()))?;
        decode_response(response).await
    }
}

#[async_trait]
impl QueryService for BigQueryService {
    async fn run_query(&self, sql: &str, billing_project_id: &str) -> Result<RecordBatch, ServiceFailure> {
        let first = self.post_query(sql, billing_project_id).await?;
        check_complete(&first)?;

        let schema = first
            .schema
            .clone()
            .ok_or_else(|| ServiceFailure::decode("completed query carries no schema"))?;
        let mut rows = first.rows;
        let mut page_token = first.page_token;
        let mut pages = 1;

        while let Some(token) = page_token.take() {
            let job = first
                .job_reference
                .as_ref()
                .ok_or_else(|| ServiceFailure::decode("paged result without a job reference"))?;
            let page = self.fetch_page(billing_project_id, job, &token).await?;
            check_complete(&page)?;
            rows.extend(page.rows);
            page_token = page.page_token;
            pages += 1;
        }

        info!("BigQuery returned {} rows in {} page(s)", rows.len(), pages);
        rows_to_record_batch(&schema.fields, &rows)
    }

    fn service_name(&self) -> &'static str {
        "bigquery"
    }
}

async fn decode_response(response: reqwest::Response) -> Result<QueryResponse, ServiceFailure> {
    let status = response.status();
    let body = response
        .text()
        .await
        .map_err(|e| ServiceFailure::transport(e.to_string()))?;

    if !status.is_success() {
        let message = serde_json::from_str::<ApiErrorEnvelope>(&body)
            .map(|envelope| envelope.error.message)
            .unwrap_or(body);
        return Err(ServiceFailure::Http {
            status: status.as_u16(),
            message,
        });
    }

    debug!("BigQuery response: {} bytes", body.len());
    serde_json::from_str(&body).map_err(|e| ServiceFailure::decode(e.to_string()))
}

fn check_complete(response: &QueryResponse) -> Result<(), ServiceFailure> {
    if !response.errors.is_empty() {
        let message = response
            .errors
            .iter()
            .map(|e| {
                format!(
                    "{}: {}",
                    e.reason.as_deref().unwrap_or("error"),
                    e.message.as_deref().unwrap_or("")
                )
            })
            .collect::<Vec<_>>()
            .join("; ");
        return Err(ServiceFailure::Query { message });
    }
    if response.job_complete == Some(false) {
        let job_id = response
            .job_reference
            .as_ref()
            .map(|job| job.job_id.clone())
            .unwrap_or_default();
        return Err(ServiceFailure::Incomplete { job_id });
    }
    Ok(())
}

fn arrow_type(field: &TableFieldSchema) -> DataType {
    if field.mode.as_deref() == Some("REPEATED") {
        return DataType::Utf8;
    }
    match field.field_type.to_uppercase().as_str() {
        "INTEGER" | "INT64" => DataType::Int64,
        "FLOAT" | "FLOAT64" | "NUMERIC" | "BIGNUMERIC" => DataType::Float64,
        "BOOLEAN" | "BOOL" => DataType::Boolean,
        _ => DataType::Utf8,
    }
}

/// Converts the REST row encoding (`rows[].f[].v`) into a record batch.
pub(crate) fn rows_to_record_batch(
    fields: &[TableFieldSchema],
    rows: &[TableRow],
) -> Result<RecordBatch, ServiceFailure> {
    let mut schema_fields = Vec::with_capacity(fields.len());
    let mut columns: Vec<ArrayRef> = Vec::with_capacity(fields.len());

    for (position, field) in fields.iter().enumerate() {
        let data_type = arrow_type(field);
        let cells = rows
            .iter()
            .map(|row| row.f.get(position).map(|cell| &cell.v).unwrap_or(&NULL_CELL));

        let column: ArrayRef = match data_type {
            DataType::Int64 => Arc::new(
                cells
                    .map(|v| parse_integer(&field.name, v))
                    .collect::<Result<Int64Array, _>>()?,
            ),
            DataType::Float64 => Arc::new(
                cells
                    .map(|v| parse_float(&field.name, v))
                    .collect::<Result<Float64Array, _>>()?,
            ),
            DataType::Boolean => Arc::new(
                cells
                    .map(|v| parse_bool(&field.name, v))
                    .collect::<Result<BooleanArray, _>>()?,
            ),
            _ => Arc::new(cells.map(cell_text).collect::<StringArray>()),
        };
        schema_fields.push(Field::new(&field.name, data_type, true));
        columns.push(column);
    }

    RecordBatch::try_new(Arc::new(Schema::new(schema_fields)), columns)
        .map_err(|e| ServiceFailure::decode(e.to_string()))
}

fn cell_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(text) => Some(text.clone()),
        other => Some(other.to_string()),
    }
}

fn parse_integer(column: &str, value: &Value) -> Result<Option<i64>, ServiceFailure> {
    match value {
        Value::Null => Ok(None),
        Value::Number(number) => number
            .as_i64()
            .map(Some)
            .ok_or_else(|| ServiceFailure::decode(format!("{column}: {number} is not an integer"))),
        Value::String(text) => text
            .parse::<i64>()
            .map(Some)
            .map_err(|_| ServiceFailure::decode(format!("{column}: '{text}' is not an integer"))),
        other => Err(ServiceFailure::decode(format!("{column}: unexpected value {other}"))),
    }
}

fn parse_float(column: &str, value: &Value) -> Result<Option<f64>, ServiceFailure> {
    match value {
        Value::Null => Ok(None),
        Value::Number(number) => number
            .as_f64()
            .map(Some)
            .ok_or_else(|| ServiceFailure::decode(format!("{column}: {number} is not a number"))),
        Value::String(text) => text
            .parse::<f64>()
            .map(Some)
            .map_err(|_| ServiceFailure::decode(format!("{column}: '{text}' is not a number"))),
        other => Err(ServiceFailure::decode(format!("{column}: unexpected value {other}"))),
    }
}

fn parse_bool(column: &str, value: &Value) -> Result<Option<bool>, ServiceFailure> {
    match value {
        Value::Null => Ok(None),
        Value::Bool(flag) => Ok(Some(*flag)),
        Value::String(text) => match text.to_ascii_lowercase().as_str() {
            "true" => Ok(Some(true)),
            "false" => Ok(Some(false)),
            _ => Err(ServiceFailure::decode(format!("{column}: '{text}' is not a boolean"))),
        },
        other => Err(ServiceFailure::decode(format!("{column}: unexpected value {other}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::array::{Array, AsArray};
    use arrow::datatypes::{Float64Type, Int64Type};

    const COMPLETE_RESPONSE: &str = r#"{
        "kind": "bigquery#queryResponse",
        "jobReference": {"projectId": "billing", "jobId": "job_abc", "location": "US"},
        "jobComplete": true,
        "totalRows": "3",
        "schema": {"fields": [
            {"name": "mun_id", "type": "STRING", "mode": "NULLABLE"},
            {"name": "Ano", "type": "INTEGER", "mode": "NULLABLE"},
            {"name": "Idade", "type": "INTEGER", "mode": "NULLABLE"},
            {"name": "Peso", "type": "FLOAT", "mode": "NULLABLE"}
        ]},
        "rows": [
            {"f": [{"v": "3550308"}, {"v": "2020"}, {"v": "2"}, {"v": "1.5"}]},
            {"f": [{"v": "3550308"}, {"v": "2020"}, {"v": null}, {"v": "2"}]},
            {"f": [{"v": "3550308"}, {"v": "2021"}, {"v": "7"}, {"v": null}]}
        ]
    }"#;

    #[test]
    fn test_rows_to_record_batch() {
        let response: QueryResponse = serde_json::from_str(COMPLETE_RESPONSE).unwrap();
        assert!(check_complete(&response).is_ok());
        assert_eq!(response.job_reference.as_ref().unwrap().job_id, "job_abc");

        let schema = response.schema.unwrap();
        let batch = rows_to_record_batch(&schema.fields, &response.rows).unwrap();
        assert_eq!(batch.num_rows(), 3);
        assert_eq!(batch.schema().field(1).data_type(), &DataType::Int64);

        let ids = batch.column(0).as_string::<i32>();
        assert_eq!(ids.value(0), "3550308");

        let ages = batch.column(2).as_primitive::<Int64Type>();
        assert_eq!(ages.value(0), 2);
        assert!(ages.is_null(1));

        let weights = batch.column(3).as_primitive::<Float64Type>();
        assert_eq!(weights.value(0), 1.5);
        assert!(weights.is_null(2));
    }

    #[test]
    fn test_empty_result_keeps_schema() {
        let response: QueryResponse = serde_json::from_str(
            r#"{"jobComplete": true, "totalRows": "0",
                "schema": {"fields": [{"name": "Idade", "type": "INT64"}]}}"#,
        )
        .unwrap();
        let batch = rows_to_record_batch(&response.schema.unwrap().fields, &response.rows).unwrap();
        assert_eq!(batch.num_rows(), 0);
        assert_eq!(batch.schema().field(0).name(), "Idade");
    }

    #[test]
    fn test_incomplete_job_is_a_failure() {
        let response: QueryResponse = serde_json::from_str(
            r#"{"jobComplete": false, "jobReference": {"projectId": "p", "jobId": "job_slow"}}"#,
        )
        .unwrap();
        assert_eq!(
            check_complete(&response),
            Err(ServiceFailure::Incomplete { job_id: "job_slow".to_string() })
        );
    }

    #[test]
    fn test_job_errors_are_reported() {
        let response: QueryResponse = serde_json::from_str(
            r#"{"jobComplete": true, "errors": [{"reason": "invalidQuery", "message": "Unrecognized name: idade"}]}"#,
        )
        .unwrap();
        match check_complete(&response) {
            Err(ServiceFailure::Query { message }) => assert!(message.contains("invalidQuery")),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn test_bad_cell_value() {
        let fields = vec![TableFieldSchema {
            name: "Ano".to_string(),
            field_type: "INTEGER".to_string(),
            mode: None,
        }];
        let rows: Vec<TableRow> = serde_json::from_str(r#"[{"f": [{"v": "dois mil"}]}]"#).unwrap();
        assert!(matches!(
            rows_to_record_batch(&fields, &rows),
            Err(ServiceFailure::Decode { .. })
        ));
    }

    #[test]
    fn test_from_config() {
        let config = DemographyConfig::new("billing").with_access_token("token");
        let service = BigQueryService::from_config(&config).unwrap();
        assert_eq!(service.access_token.as_deref(), Some("token"));
        assert_eq!(
            service.endpoint("projects/billing/queries").unwrap().as_str(),
            "https://bigquery.googleapis.com/bigquery/v2/projects/billing/queries"
        );
    }

    #[tokio::test]
    async fn test_unreachable_service_is_a_transport_failure() {
        let service = BigQueryService::new(Url::parse("http://127.0.0.1:9/").unwrap()).with_timeout_ms(1_000);
        let result = service.run_query("SELECT 1", "billing").await;
        assert!(matches!(result, Err(ServiceFailure::Transport { .. })));
    }

    #[tokio::test]
    #[ignore] // needs network access and BIGQUERY_PROJECT / BIGQUERY_TOKEN
    async fn test_live_query() {
        let project = std::env::var("BIGQUERY_PROJECT").unwrap();
        let token = std::env::var("BIGQUERY_TOKEN").unwrap();
        let config = DemographyConfig::new(project.clone()).with_access_token(token);
        let service = BigQueryService::from_config(&config).unwrap();

        let batch = service
            .run_query(
                "SELECT ano AS Ano FROM `basedosdados.br_ms_sinasc.microdados` WHERE id_municipio_residencia = '3550308' LIMIT 5",
                &project,
            )
            .await
            .unwrap();
        assert!(batch.num_rows() <= 5);
    }
}
