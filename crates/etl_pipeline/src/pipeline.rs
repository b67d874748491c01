//! Query, standardize and concatenate, one domain at a time.

use log::info;

use data_client::client::DataClient;
use data_client::query::{QueryDomain, QueryRequest};
use data_client::service::QueryService;
use shared::errors::{DemographyError, DemographyResult};
use shared::models::config::{DemographyConfig, TaxonomyPaths};
use shared::models::date_utils::CensusYear;
use shared::models::geo_utils::MunicipalityId;
use shared::models::record::{
    DWELLINGS_COLUMN, MUNICIPALITY_COLUMN, RESIDENTS_COLUMN, numeric_column, raw_records_from_batch,
};
use shared::models::table::{StandardizedTable, WideTable};

use crate::concatenate::{concatenate, pivot_years};
use crate::profiles::DomainProfile;
use crate::standardize::standardize_from_source;

/// Residents of occupied private dwellings in one municipality (2022 census)
#[derive(Debug, Clone, PartialEq)]
pub struct DwellingOccupancy {
    pub municipality: MunicipalityId,
    pub residents: f64,
    pub dwellings: f64,
    /// Residents per dwelling, rounded to 2 decimals; `None` without dwellings
    pub residents_per_dwelling: Option<f64>,
}

/// Produces the standardized demographic tables of a set of municipalities.
///
/// Each call issues exactly one query (pyramid series: one per census) and
/// reloads its taxonomy file, so nothing is cached between calls.
pub struct DemographyPipeline<S: QueryService> {
    client: DataClient<S>,
    taxonomies: TaxonomyPaths,
}

impl<S: QueryService> DemographyPipeline<S> {
    pub fn new(service: S, config: &DemographyConfig) -> DemographyResult<Self> {
        config.validate()?;
        Ok(Self {
            client: DataClient::from_config(service, config)?,
            taxonomies: config.taxonomies.clone(),
        })
    }

    pub fn client(&self) -> &DataClient<S> {
        &self.client
    }

    /// Live births by mother's age band and year
    pub async fn births<T: AsRef<str>>(
        &self,
        municipality_ids: &[T],
        start_year: Option<i32>,
        end_year: Option<i32>,
    ) -> DemographyResult<StandardizedTable> {
        self.run_profile(&DomainProfile::births(), municipality_ids, start_year, end_year)
            .await
    }

    /// Deaths by year, sex and age band
    pub async fn deaths<T: AsRef<str>>(
        &self,
        municipality_ids: &[T],
        start_year: Option<i32>,
        end_year: Option<i32>,
    ) -> DemographyResult<StandardizedTable> {
        self.run_profile(&DomainProfile::deaths(), municipality_ids, start_year, end_year)
            .await
    }

    /// Deaths with one column per year
    pub async fn deaths_by_year<T: AsRef<str>>(
        &self,
        municipality_ids: &[T],
        start_year: Option<i32>,
        end_year: Option<i32>,
    ) -> DemographyResult<WideTable> {
        let deaths = self.deaths(municipality_ids, start_year, end_year).await?;
        pivot_years(&deaths)
    }

    /// Deaths under 1 year and at 65 or older, by year and age band
    pub async fn infant_elderly_deaths<T: AsRef<str>>(
        &self,
        municipality_ids: &[T],
        start_year: Option<i32>,
        end_year: Option<i32>,
    ) -> DemographyResult<StandardizedTable> {
        self.run_profile(
            &DomainProfile::infant_elderly_deaths(),
            municipality_ids,
            start_year,
            end_year,
        )
        .await
    }

    pub async fn emigration<T: AsRef<str>>(
        &self,
        municipality_ids: &[T],
        census: CensusYear,
    ) -> DemographyResult<StandardizedTable> {
        self.run_profile(&DomainProfile::emigration(census), municipality_ids, None, None)
            .await
    }

    pub async fn immigration<T: AsRef<str>>(
        &self,
        municipality_ids: &[T],
        census: CensusYear,
    ) -> DemographyResult<StandardizedTable> {
        self.run_profile(&DomainProfile::immigration(census), municipality_ids, None, None)
            .await
    }

    /// Resident population by sex and age band, in whole people
    pub async fn population_pyramid<T: AsRef<str>>(
        &self,
        municipality_ids: &[T],
        census: CensusYear,
    ) -> DemographyResult<StandardizedTable> {
        self.run_profile(
            &DomainProfile::population_pyramid(census),
            municipality_ids,
            None,
            None,
        )
        .await
    }

    /// Pyramids of several censuses side by side, one column per census year.
    ///
    /// The pyramid taxonomies of the requested editions must share their bands.
    pub async fn population_pyramid_series<T: AsRef<str>>(
        &self,
        municipality_ids: &[T],
        censuses: &[CensusYear],
    ) -> DemographyResult<WideTable> {
        if censuses.is_empty() {
            return Err(DemographyError::validation("no census edition requested"));
        }
        let mut pyramids = Vec::with_capacity(censuses.len());
        for census in censuses {
            pyramids.push(self.population_pyramid(municipality_ids, *census).await?);
        }
        concatenate(&pyramids)
    }

    /// Resident population of each requested municipality, in request order.
    ///
    /// Municipalities absent from the result get 0.
    pub async fn total_population<T: AsRef<str>>(
        &self,
        municipality_ids: &[T],
        census: CensusYear,
    ) -> DemographyResult<Vec<(MunicipalityId, f64)>> {
        let request = QueryRequest::new(QueryDomain::TotalPopulation(census), municipality_ids, None, None)?;
        let batch = self.client.run(&request).await?;
        let records = raw_records_from_batch(&batch)?;

        let totals = request
            .municipalities()
            .iter()
            .map(|id| {
                let population = records
                    .iter()
                    .filter(|r| r.municipality.as_deref() == Some(id.as_str()))
                    .filter_map(|r| r.weight)
                    .sum();
                (id.clone(), population)
            })
            .collect();
        Ok(totals)
    }

    /// Residents per occupied private dwelling of each requested municipality,
    /// in request order. Municipalities absent from the result get zeros.
    pub async fn dwelling_occupancy<T: AsRef<str>>(
        &self,
        municipality_ids: &[T],
    ) -> DemographyResult<Vec<DwellingOccupancy>> {
        let request = QueryRequest::new(QueryDomain::DwellingOccupancy, municipality_ids, None, None)?;
        let batch = self.client.run(&request).await?;
        let records = raw_records_from_batch(&batch)?;
        let missing = |name: &str| {
            DemographyError::MalformedRecord(format!("dwelling occupancy result lacks column '{name}'"))
        };
        let resident_counts =
            numeric_column(&batch, RESIDENTS_COLUMN)?.ok_or_else(|| missing(RESIDENTS_COLUMN))?;
        let dwelling_counts =
            numeric_column(&batch, DWELLINGS_COLUMN)?.ok_or_else(|| missing(DWELLINGS_COLUMN))?;
        if batch.num_rows() > 0 && records.iter().all(|r| r.municipality.is_none()) {
            return Err(missing(MUNICIPALITY_COLUMN));
        }

        let occupancy = request
            .municipalities()
            .iter()
            .map(|id| {
                let (residents, dwellings) = records
                    .iter()
                    .zip(resident_counts.iter().zip(&dwelling_counts))
                    .filter(|(record, _)| record.municipality.as_deref() == Some(id.as_str()))
                    .fold((0.0, 0.0), |(r, d), (_, (residents, dwellings))| {
                        (r + residents.unwrap_or(0.0), d + dwellings.unwrap_or(0.0))
                    });
                let residents_per_dwelling =
                    (dwellings > 0.0).then(|| (residents / dwellings * 100.0).round_ties_even() / 100.0);
                DwellingOccupancy {
                    municipality: id.clone(),
                    residents,
                    dwellings,
                    residents_per_dwelling,
                }
            })
            .collect();
        Ok(occupancy)
    }

    async fn run_profile<T: AsRef<str>>(
        &self,
        profile: &DomainProfile,
        municipality_ids: &[T],
        start_year: Option<i32>,
        end_year: Option<i32>,
    ) -> DemographyResult<StandardizedTable> {
        let request = QueryRequest::new(profile.domain, municipality_ids, start_year, end_year)?;
        let taxonomy_path = profile.taxonomy.path(&self.taxonomies).ok_or_else(|| {
            DemographyError::Config(format!(
                "no taxonomy file configured for '{}'",
                profile.taxonomy.config_key()
            ))
        })?;

        let batch = self.client.run(&request).await?;
        let mut records = raw_records_from_batch(&batch)?;
        if let Some(year) = profile.constant_year {
            for record in &mut records {
                record.year = Some(year);
            }
        }

        let spec = profile.standardize_spec(request.municipalities().len());
        let table = standardize_from_source(&records, taxonomy_path, &spec)?;
        info!(
            "{}: {} rows over {} bands",
            profile.domain,
            table.len(),
            table.bands().len()
        );
        Ok(table)
    }
}
