use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use url::Url;

use crate::errors::{DemographyError, DemographyResult};
use crate::models::date_utils::CensusYear;

pub const DEFAULT_API_BASE_URL: &str = "https://bigquery.googleapis.com/bigquery/v2/";
pub const DEFAULT_TIMEOUT_MS: u64 = 60_000;

/// Paths of the semicolon-delimited age-band taxonomy files, one per domain
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaxonomyPaths {
    pub births: Option<PathBuf>,
    pub deaths: Option<PathBuf>,
    /// Taxonomy restricted to infants and the elderly, used for profiling
    pub infant_elderly_deaths: Option<PathBuf>,
    pub migration: Option<PathBuf>,
    pub pyramid_2000: Option<PathBuf>,
    pub pyramid_2010: Option<PathBuf>,
    pub pyramid_2022: Option<PathBuf>,
}

impl TaxonomyPaths {
    pub fn pyramid(&self, census: CensusYear) -> Option<&Path> {
        match census {
            CensusYear::Y2000 => self.pyramid_2000.as_deref(),
            CensusYear::Y2010 => self.pyramid_2010.as_deref(),
            CensusYear::Y2022 => self.pyramid_2022.as_deref(),
        }
    }
}

/// Configuration record passed explicitly to the client and the pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DemographyConfig {
    /// Project charged for query execution
    pub billing_project_id: String,
    /// Base URL of the query service REST API
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,
    /// OAuth bearer token sent with each request, when set
    #[serde(default)]
    pub access_token: Option<String>,
    /// Server-side wait before a query is reported as incomplete
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default)]
    pub taxonomies: TaxonomyPaths,
}

fn default_api_base_url() -> String {
    DEFAULT_API_BASE_URL.to_string()
}

fn default_timeout_ms() -> u64 {
    DEFAULT_TIMEOUT_MS
}

impl DemographyConfig {
    pub fn new<S: Into<String>>(billing_project_id: S) -> Self {
        Self {
            billing_project_id: billing_project_id.into(),
            api_base_url: default_api_base_url(),
            access_token: None,
            timeout_ms: DEFAULT_TIMEOUT_MS,
            taxonomies: TaxonomyPaths::default(),
        }
    }

    pub fn from_json_str(json: &str) -> DemographyResult<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file<P: AsRef<Path>>(path: P) -> DemographyResult<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| {
            DemographyError::Config(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::from_json_str(&content)
    }

    pub fn validate(&self) -> DemographyResult<()> {
        if self.billing_project_id.trim().is_empty() {
            return Err(DemographyError::Config("billing_project_id must not be empty".to_string()));
        }
        self.api_base_url()?;
        if self.timeout_ms == 0 {
            return Err(DemographyError::Config("timeout_ms must be positive".to_string()));
        }
        Ok(())
    }

    /// Parsed base URL, always ending with a slash so relative joins keep the path
    pub fn api_base_url(&self) -> DemographyResult<Url> {
        let mut raw = self.api_base_url.trim().to_string();
        if !raw.ends_with('/') {
            raw.push('/');
        }
        Url::parse(&raw)
            .map_err(|e| DemographyError::Config(format!("invalid api_base_url '{raw}': {e}")))
    }

    pub fn with_access_token<S: Into<String>>(mut self, token: S) -> Self {
        self.access_token = Some(token.into());
        self
    }

    pub fn with_api_base_url<S: Into<String>>(mut self, url: S) -> Self {
        self.api_base_url = url.into();
        self
    }

    pub fn with_taxonomies(mut self, taxonomies: TaxonomyPaths) -> Self {
        self.taxonomies = taxonomies;
        self
    }
}
