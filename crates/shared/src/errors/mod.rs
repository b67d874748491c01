use thiserror::Error;

/// Centralized error type for the demography workspace
#[derive(Error, Debug)]
pub enum DemographyError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error(
        "Query against {target} failed (municipalities: {}, years: {}): {message}",
        .municipalities.join(", "),
        .years.map(|(start, end)| format!("{start}-{end}")).unwrap_or_else(|| "n/a".to_string())
    )]
    Service {
        target: String,
        municipalities: Vec<String>,
        years: Option<(i32, i32)>,
        message: String,
    },

    #[error("Insufficient data: {0}")]
    InsufficientData(String),

    #[error("Schema mismatch: {0}")]
    SchemaMismatch(String),

    #[error("Age band taxonomy error: {0}")]
    Taxonomy(String),

    #[error("Malformed record: {0}")]
    MalformedRecord(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON (de)serialization error: {0}")]
    SerdeJson(#[from] serde_json::Error),

    #[error("Arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),
}

impl DemographyError {
    pub fn validation<S: Into<String>>(msg: S) -> Self {
        Self::Validation(msg.into())
    }

    pub fn schema_mismatch<S: Into<String>>(msg: S) -> Self {
        Self::SchemaMismatch(msg.into())
    }

    pub fn taxonomy<S: Into<String>>(msg: S) -> Self {
        Self::Taxonomy(msg.into())
    }

    /// True for failures reported by the query service, which a caller may retry by hand
    pub fn is_service_failure(&self) -> bool {
        matches!(self, Self::Service { .. })
    }
}

/// Alias for fallible operations in the demography crates
pub type DemographyResult<T> = Result<T, DemographyError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_service_error_message_carries_context() {
        let err = DemographyError::Service {
            target: "basedosdados.br_ms_sim.microdados".to_string(),
            municipalities: vec!["3550308".to_string(), "3304557".to_string()],
            years: Some((2010, 2020)),
            message: "Access Denied".to_string(),
        };

        let text = err.to_string();
        assert!(text.contains("br_ms_sim.microdados"));
        assert!(text.contains("3550308, 3304557"));
        assert!(text.contains("2010-2020"));
        assert!(text.contains("Access Denied"));
        assert!(err.is_service_failure());
    }

    #[test]
    fn test_service_error_without_years() {
        let err = DemographyError::Service {
            target: "censo".to_string(),
            municipalities: vec!["3550308".to_string()],
            years: None,
            message: "quota".to_string(),
        };
        assert!(err.to_string().contains("years: n/a"));
    }

    #[test]
    fn test_helpers_build_expected_variants() {
        assert!(matches!(DemographyError::validation("x"), DemographyError::Validation(_)));
        assert!(matches!(DemographyError::schema_mismatch("x"), DemographyError::SchemaMismatch(_)));
        assert!(matches!(DemographyError::taxonomy("x"), DemographyError::Taxonomy(_)));
        assert!(!DemographyError::validation("x").is_service_failure());
    }
}
