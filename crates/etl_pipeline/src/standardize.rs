//! Age-group standardization: maps raw ages to taxonomy bands, aggregates by
//! the requested grouping and zero-fills the full key space.

use std::borrow::Cow;
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use log::{debug, info, warn};

use shared::errors::{DemographyError, DemographyResult};
use shared::models::age_groups::{AgeBandTaxonomy, AgeKey, BandLookup};
use shared::models::record::RawRecord;
use shared::models::sex::Sex;
use shared::models::table::{
    AggregateValue, Dimension, DimensionValue, StandardizedRow, StandardizedTable, ValueKind,
};

/// How each record contributes to its cell
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AggregationMode {
    /// One unit per record; integer output
    Count,
    /// Sum of the record weights; real-valued output
    WeightSum,
    /// Sum of the record weights rounded to whole people
    RoundedWeightSum,
}

impl AggregationMode {
    pub fn value_kind(&self) -> ValueKind {
        match self {
            Self::Count | Self::RoundedWeightSum => ValueKind::Count,
            Self::WeightSum => ValueKind::Weight,
        }
    }
}

/// Parameters of one standardization call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StandardizeSpec {
    /// Name of the value column in the output
    pub measure: String,
    /// Non-band dimensions, in output order
    pub grouping: Vec<Dimension>,
    pub mode: AggregationMode,
}

impl StandardizeSpec {
    pub fn new<S: Into<String>>(measure: S, grouping: Vec<Dimension>, mode: AggregationMode) -> Self {
        Self {
            measure: measure.into(),
            grouping,
            mode,
        }
    }

    fn validate(&self) -> DemographyResult<()> {
        if self.measure.trim().is_empty() {
            return Err(DemographyError::validation("measure name must not be empty"));
        }
        let distinct: BTreeSet<_> = self.grouping.iter().map(|d| d.column_name()).collect();
        if distinct.len() != self.grouping.len() {
            return Err(DemographyError::validation(format!(
                "grouping repeats a dimension: {:?}",
                self.grouping
            )));
        }
        Ok(())
    }
}

/// Standardizes a batch of raw records against a taxonomy.
///
/// Missing ages are replaced by the floor of the mean of the batch's integer
/// ages; records whose age is out of scope or not in the taxonomy are
/// dropped. The output holds every combination of the observed grouping
/// values with every band, sorted by key then band order.
///
/// # Errors
/// - [`DemographyError::InsufficientData`] when ages must be imputed but the
///   batch has no integer age to average
/// - [`DemographyError::MalformedRecord`] for negative or non-finite weights
/// - [`DemographyError::Validation`] for a grouping that repeats a dimension
pub fn standardize(
    records: &[RawRecord],
    taxonomy: &AgeBandTaxonomy,
    spec: &StandardizeSpec,
) -> DemographyResult<StandardizedTable> {
    spec.validate()?;

    let band_count = taxonomy.len();
    let imputed_age = impute_age(records)?;

    let mut sums: BTreeMap<Vec<DimensionValue>, Vec<f64>> = BTreeMap::new();
    let mut observed: Vec<BTreeSet<DimensionValue>> = vec![BTreeSet::new(); spec.grouping.len()];
    let (mut out_of_scope, mut unmapped, mut incomplete) = (0usize, 0usize, 0usize);

    for record in records {
        let age = match (&record.age, imputed_age) {
            (Some(age), _) => Cow::Borrowed(age),
            (None, Some(imputed)) => Cow::Owned(AgeKey::Years(imputed)),
            (None, None) => {
                unmapped += 1;
                continue;
            }
        };

        let band = match taxonomy.lookup(&age) {
            BandLookup::Band(index) => index,
            BandLookup::OutOfScope => {
                out_of_scope += 1;
                continue;
            }
            BandLookup::Unmapped => {
                unmapped += 1;
                continue;
            }
        };

        let value = record_value(record, spec.mode)?;

        let Some(key) = grouping_key(record, &spec.grouping) else {
            incomplete += 1;
            continue;
        };

        for (values, part) in observed.iter_mut().zip(&key) {
            values.insert(part.clone());
        }
        sums.entry(key).or_insert_with(|| vec![0.0; band_count])[band] += value;
    }

    if out_of_scope > 0 || unmapped > 0 {
        debug!(
            "Dropped {} out-of-scope and {} unmapped records",
            out_of_scope, unmapped
        );
    }
    if incomplete > 0 {
        warn!(
            "Dropped {} records with a missing or unrecognized grouping value",
            incomplete
        );
    }

    let mut rows = Vec::new();
    for key in cross_product(&observed) {
        let cells = sums.get(&key);
        for (band_index, band) in taxonomy.bands().iter().enumerate() {
            let sum = cells.map(|values| values[band_index]).unwrap_or(0.0);
            rows.push(StandardizedRow {
                key: key.clone(),
                band: band.clone(),
                value: finish(sum, spec.mode),
            });
        }
    }

    info!(
        "Standardized {} records into {} rows ({} bands)",
        records.len(),
        rows.len(),
        band_count
    );

    Ok(StandardizedTable::from_parts(
        spec.grouping.clone(),
        taxonomy.bands().to_vec(),
        spec.measure.clone(),
        spec.mode.value_kind(),
        rows,
    ))
}

/// Loads the taxonomy from `taxonomy_path` and standardizes `records` with it.
pub fn standardize_from_source<P: AsRef<Path>>(
    records: &[RawRecord],
    taxonomy_path: P,
    spec: &StandardizeSpec,
) -> DemographyResult<StandardizedTable> {
    let taxonomy = AgeBandTaxonomy::from_path(taxonomy_path)?;
    standardize(records, &taxonomy, spec)
}

/// Age used for records without one; `None` when no record needs it.
fn impute_age(records: &[RawRecord]) -> DemographyResult<Option<u32>> {
    let missing = records.iter().filter(|r| r.age.is_none()).count();
    if missing == 0 {
        return Ok(None);
    }

    let (sum, count) = records
        .iter()
        .filter_map(|r| r.age.as_ref().and_then(AgeKey::as_years))
        .fold((0u64, 0u64), |(sum, count), age| (sum + age as u64, count + 1));

    if count == 0 {
        return Err(DemographyError::InsufficientData(format!(
            "{missing} of {} records have no age and there is no integer age to impute from",
            records.len()
        )));
    }

    let imputed = (sum / count) as u32;
    debug!("Imputing age {} for {} records", imputed, missing);
    Ok(Some(imputed))
}

fn record_value(record: &RawRecord, mode: AggregationMode) -> DemographyResult<f64> {
    match mode {
        AggregationMode::Count => Ok(1.0),
        AggregationMode::WeightSum | AggregationMode::RoundedWeightSum => match record.weight {
            None => Ok(0.0),
            Some(weight) if weight.is_finite() && weight >= 0.0 => Ok(weight),
            Some(weight) => Err(DemographyError::MalformedRecord(format!(
                "invalid weight {weight}"
            ))),
        },
    }
}

fn grouping_key(record: &RawRecord, grouping: &[Dimension]) -> Option<Vec<DimensionValue>> {
    grouping
        .iter()
        .map(|dimension| match dimension {
            Dimension::Municipality => record
                .municipality
                .as_deref()
                .filter(|id| !id.is_empty())
                .map(|id| DimensionValue::Municipality(id.to_string())),
            Dimension::Year => record.year.map(DimensionValue::Year),
            Dimension::Sex => record
                .sex
                .as_deref()
                .and_then(Sex::from_code)
                .map(DimensionValue::Sex),
        })
        .collect()
}

/// Every combination of the observed values, in sorted order
fn cross_product(observed: &[BTreeSet<DimensionValue>]) -> Vec<Vec<DimensionValue>> {
    observed.iter().fold(vec![Vec::new()], |prefixes, values| {
        prefixes
            .iter()
            .flat_map(|prefix| {
                values.iter().map(move |value| {
                    let mut key = prefix.clone();
                    key.push(value.clone());
                    key
                })
            })
            .collect()
    })
}

fn finish(sum: f64, mode: AggregationMode) -> AggregateValue {
    match mode {
        AggregationMode::Count => AggregateValue::Count(sum as u64),
        AggregationMode::WeightSum => AggregateValue::Weight(sum),
        AggregationMode::RoundedWeightSum => AggregateValue::Count(sum.round_ties_even() as u64),
    }
}
