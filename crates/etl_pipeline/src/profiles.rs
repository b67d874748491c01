use std::path::Path;

use data_client::query::QueryDomain;
use shared::models::config::TaxonomyPaths;
use shared::models::date_utils::CensusYear;
use shared::models::table::Dimension;

use crate::standardize::{AggregationMode, StandardizeSpec};

pub const BIRTHS_MEASURE: &str = "Nascimentos";
pub const DEATHS_MEASURE: &str = "Óbitos";
pub const WEIGHT_MEASURE: &str = "Peso";
pub const POPULATION_MEASURE: &str = "Pop";

/// Which configured taxonomy file a domain is standardized with
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaxonomySelector {
    Births,
    Deaths,
    InfantElderlyDeaths,
    Migration,
    Pyramid(CensusYear),
}

impl TaxonomySelector {
    pub fn path<'a>(&self, paths: &'a TaxonomyPaths) -> Option<&'a Path> {
        match self {
            Self::Births => paths.births.as_deref(),
            Self::Deaths => paths.deaths.as_deref(),
            Self::InfantElderlyDeaths => paths.infant_elderly_deaths.as_deref(),
            Self::Migration => paths.migration.as_deref(),
            Self::Pyramid(census) => paths.pyramid(*census),
        }
    }

    /// Name of the configuration field holding the path
    pub fn config_key(&self) -> &'static str {
        match self {
            Self::Births => "births",
            Self::Deaths => "deaths",
            Self::InfantElderlyDeaths => "infant_elderly_deaths",
            Self::Migration => "migration",
            Self::Pyramid(CensusYear::Y2000) => "pyramid_2000",
            Self::Pyramid(CensusYear::Y2010) => "pyramid_2010",
            Self::Pyramid(CensusYear::Y2022) => "pyramid_2022",
        }
    }
}

/// How one domain goes from query to standardized table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DomainProfile {
    pub domain: QueryDomain,
    pub measure: &'static str,
    pub grouping: Vec<Dimension>,
    pub mode: AggregationMode,
    pub taxonomy: TaxonomySelector,
    /// Year stamped on every record of single-edition sources
    pub constant_year: Option<i32>,
}

impl DomainProfile {
    pub fn births() -> Self {
        Self {
            domain: QueryDomain::Births,
            measure: BIRTHS_MEASURE,
            grouping: vec![Dimension::Year],
            mode: AggregationMode::Count,
            taxonomy: TaxonomySelector::Births,
            constant_year: None,
        }
    }

    pub fn deaths() -> Self {
        Self {
            domain: QueryDomain::Deaths,
            measure: DEATHS_MEASURE,
            grouping: vec![Dimension::Year, Dimension::Sex],
            mode: AggregationMode::Count,
            taxonomy: TaxonomySelector::Deaths,
            constant_year: None,
        }
    }

    pub fn infant_elderly_deaths() -> Self {
        Self {
            domain: QueryDomain::InfantElderlyDeaths,
            measure: DEATHS_MEASURE,
            grouping: vec![Dimension::Year],
            mode: AggregationMode::Count,
            taxonomy: TaxonomySelector::InfantElderlyDeaths,
            constant_year: None,
        }
    }

    pub fn emigration(census: CensusYear) -> Self {
        Self::migration(QueryDomain::Emigration(census))
    }

    pub fn immigration(census: CensusYear) -> Self {
        Self::migration(QueryDomain::Immigration(census))
    }

    fn migration(domain: QueryDomain) -> Self {
        Self {
            domain,
            measure: WEIGHT_MEASURE,
            grouping: vec![Dimension::Sex],
            mode: AggregationMode::WeightSum,
            taxonomy: TaxonomySelector::Migration,
            constant_year: None,
        }
    }

    pub fn population_pyramid(census: CensusYear) -> Self {
        Self {
            domain: QueryDomain::PopulationPyramid(census),
            measure: POPULATION_MEASURE,
            grouping: vec![Dimension::Year, Dimension::Sex],
            mode: AggregationMode::RoundedWeightSum,
            taxonomy: TaxonomySelector::Pyramid(census),
            constant_year: Some(census.year()),
        }
    }

    /// Standardization parameters for a request over `municipality_count` ids.
    ///
    /// Several municipalities are kept apart by a leading municipality dimension.
    pub fn standardize_spec(&self, municipality_count: usize) -> StandardizeSpec {
        let mut grouping = Vec::with_capacity(self.grouping.len() + 1);
        if municipality_count > 1 {
            grouping.push(Dimension::Municipality);
        }
        grouping.extend(self.grouping.iter().copied());
        StandardizeSpec::new(self.measure, grouping, self.mode)
    }
}
