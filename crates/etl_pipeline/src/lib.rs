pub mod concatenate;
pub mod pipeline;
pub mod profiles;
pub mod standardize;

pub use concatenate::{concatenate, pivot_years};
pub use pipeline::{DemographyPipeline, DwellingOccupancy};
pub use profiles::{DomainProfile, TaxonomySelector};
pub use standardize::{AggregationMode, StandardizeSpec, standardize, standardize_from_source};
