pub mod age_groups;
pub mod config;
pub mod date_utils;
pub mod geo_utils;
pub mod record;
pub mod sex;
pub mod subsystem;
pub mod table;

pub use age_groups::{AgeBandTaxonomy, AgeKey, BandLookup, OUT_OF_SCOPE_BAND};
pub use config::{DemographyConfig, TaxonomyPaths};
pub use date_utils::{CensusYear, YearRange};
pub use geo_utils::{MunicipalityId, StateBR, get_state_info, parse_municipality_ids};
pub use record::{RawRecord, raw_records_from_batch};
pub use sex::Sex;
pub use subsystem::{Subsystem, census_subsystem};
pub use table::{
    AggregateValue, Dimension, DimensionValue, StandardizedRow, StandardizedTable, ValueKind,
    WideRow, WideTable,
};
