//! Age-band taxonomies.
//!
//! A taxonomy maps raw age keys (integer ages or textual age groups) to an
//! ordered list of named bands. The order of the bands is the order in which
//! they first appear in the source and drives the ordering of every
//! standardized table.

use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::io::{Cursor, Read};
use std::ops::RangeInclusive;
use std::path::Path;
use std::sync::Arc;

use arrow::array::{Array, StringArray};
use arrow::csv::ReaderBuilder;
use arrow::csv::reader::Format;
use arrow::datatypes::{DataType, Field, Schema};

use crate::errors::{DemographyError, DemographyResult};

/// Reserved band name for ages excluded from the analysis
pub const OUT_OF_SCOPE_BAND: &str = "Fora de Escopo";

/// Column separator of taxonomy files
pub const TAXONOMY_DELIMITER: u8 = b';';

/// Raw age key as found in query results and taxonomy files.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum AgeKey {
    /// Completed years of age
    Years(u32),
    /// Pre-grouped age label, e.g. "0 a 4 anos" in the 2022 census aggregates
    Label(String),
}

impl AgeKey {
    /// Parses a textual key; integral numbers ("7", "7.0") become `Years`.
    pub fn parse(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return None;
        }
        if let Ok(years) = trimmed.parse::<u32>() {
            return Some(Self::Years(years));
        }
        if let Ok(value) = trimmed.parse::<f64>() {
            if value.is_finite() && value >= 0.0 && value.fract() == 0.0 && value <= u32::MAX as f64 {
                return Some(Self::Years(value as u32));
            }
        }
        Some(Self::Label(trimmed.to_string()))
    }

    pub fn as_years(&self) -> Option<u32> {
        match self {
            Self::Years(years) => Some(*years),
            Self::Label(_) => None,
        }
    }
}

impl fmt::Display for AgeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Years(years) => write!(f, "{years}"),
            Self::Label(label) => f.write_str(label),
        }
    }
}

/// Result of looking an age key up in a taxonomy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BandLookup {
    /// Index into [`AgeBandTaxonomy::bands`]
    Band(usize),
    OutOfScope,
    Unmapped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Target {
    Band(usize),
    OutOfScope,
}

/// Ordered age-band taxonomy.
///
/// # Example
/// ```rust
/// use shared::models::age_groups::{AgeBandTaxonomy, AgeKey, BandLookup};
///
/// let taxonomy = AgeBandTaxonomy::from_ranges(&[
///     ("0-4", 0..=4),
///     ("5-9", 5..=9),
///     ("10+", 10..=120),
/// ]).unwrap();
///
/// assert_eq!(taxonomy.bands(), ["0-4", "5-9", "10+"]);
/// assert_eq!(taxonomy.lookup(&AgeKey::Years(7)), BandLookup::Band(1));
/// assert_eq!(taxonomy.lookup(&AgeKey::Years(130)), BandLookup::Unmapped);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct AgeBandTaxonomy {
    bands: Vec<String>,
    entries: HashMap<AgeKey, Target>,
}

impl AgeBandTaxonomy {
    /// Builds a taxonomy from `(age key, band name)` pairs in source order.
    pub fn from_entries<I, S>(entries: I) -> DemographyResult<Self>
    where
        I: IntoIterator<Item = (AgeKey, S)>,
        S: AsRef<str>,
    {
        let mut bands: Vec<String> = Vec::new();
        let mut positions: HashMap<String, usize> = HashMap::new();
        let mut mapping: HashMap<AgeKey, Target> = HashMap::new();

        for (key, band) in entries {
            let band = band.as_ref().trim();
            if band.is_empty() {
                return Err(DemographyError::taxonomy(format!(
                    "age key '{key}' has an empty band name"
                )));
            }

            let target = if band == OUT_OF_SCOPE_BAND {
                Target::OutOfScope
            } else {
                let next = bands.len();
                let index = *positions.entry(band.to_string()).or_insert_with(|| {
                    bands.push(band.to_string());
                    next
                });
                Target::Band(index)
            };

            match mapping.get(&key) {
                Some(existing) if *existing != target => {
                    return Err(DemographyError::taxonomy(format!(
                        "age key '{key}' is mapped to more than one band"
                    )));
                }
                Some(_) => {}
                None => {
                    mapping.insert(key, target);
                }
            }
        }

        if bands.is_empty() {
            return Err(DemographyError::taxonomy("taxonomy defines no in-scope band"));
        }

        Ok(Self { bands, entries: mapping })
    }

    /// Builds a taxonomy from contiguous integer age ranges.
    ///
    /// Ranges named [`OUT_OF_SCOPE_BAND`] mark ages as explicitly excluded.
    pub fn from_ranges(ranges: &[(&str, RangeInclusive<u32>)]) -> DemographyResult<Self> {
        Self::from_entries(
            ranges
                .iter()
                .flat_map(|(band, ages)| ages.clone().map(move |age| (AgeKey::Years(age), *band))),
        )
    }

    /// Loads a semicolon-delimited taxonomy with a header row.
    ///
    /// The first column holds the raw age key and the second the band name;
    /// any further columns are ignored.
    pub fn from_reader<R: Read>(mut reader: R) -> DemographyResult<Self> {
        let mut raw = Vec::new();
        reader.read_to_end(&mut raw)?;
        let content = raw.strip_prefix(b"\xEF\xBB\xBF".as_slice()).unwrap_or(&raw);

        let format = Format::default()
            .with_header(true)
            .with_delimiter(TAXONOMY_DELIMITER);
        let (inferred, _) = format.infer_schema(Cursor::new(content), None)?;
        if inferred.fields().len() < 2 {
            return Err(DemographyError::taxonomy(format!(
                "expected at least two '{}'-separated columns, found {}",
                TAXONOMY_DELIMITER as char,
                inferred.fields().len()
            )));
        }

        // Every column is read as text; key parsing happens here, not in the CSV layer
        let schema = Arc::new(Schema::new(
            inferred
                .fields()
                .iter()
                .map(|field| Field::new(field.name(), DataType::Utf8, true))
                .collect::<Vec<_>>(),
        ));

        let csv_reader = ReaderBuilder::new(schema)
            .with_header(true)
            .with_delimiter(TAXONOMY_DELIMITER)
            .build(Cursor::new(content))?;

        let mut entries: Vec<(AgeKey, String)> = Vec::new();
        for batch in csv_reader {
            let batch = batch?;
            let keys = text_column(batch.column(0).as_ref())?;
            let bands = text_column(batch.column(1).as_ref())?;

            for row in 0..batch.num_rows() {
                let key = if keys.is_null(row) { None } else { AgeKey::parse(keys.value(row)) };
                let Some(key) = key else {
                    log::debug!("Skipping taxonomy row without age key");
                    continue;
                };
                let band = if bands.is_null(row) { "" } else { bands.value(row) };
                entries.push((key, band.to_string()));
            }
        }

        let taxonomy = Self::from_entries(entries)?;
        log::debug!(
            "Loaded age band taxonomy with {} bands and {} age keys",
            taxonomy.bands.len(),
            taxonomy.entries.len()
        );
        Ok(taxonomy)
    }

    /// Loads a taxonomy file from disk
    pub fn from_path<P: AsRef<Path>>(path: P) -> DemographyResult<Self> {
        let path = path.as_ref();
        let file = fs::File::open(path).map_err(|e| {
            DemographyError::taxonomy(format!("cannot open {}: {e}", path.display()))
        })?;
        Self::from_reader(file)
    }

    /// In-scope band names in taxonomy order
    pub fn bands(&self) -> &[String] {
        &self.bands
    }

    pub fn len(&self) -> usize {
        self.bands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bands.is_empty()
    }

    pub fn position(&self, band: &str) -> Option<usize> {
        self.bands.iter().position(|b| b == band)
    }

    pub fn lookup(&self, key: &AgeKey) -> BandLookup {
        match self.entries.get(key) {
            Some(Target::Band(index)) => BandLookup::Band(*index),
            Some(Target::OutOfScope) => BandLookup::OutOfScope,
            None => BandLookup::Unmapped,
        }
    }
}

fn text_column(array: &dyn Array) -> DemographyResult<&StringArray> {
    array
        .as_any()
        .downcast_ref::<StringArray>()
        .ok_or_else(|| DemographyError::taxonomy("taxonomy columns must be text"))
}
