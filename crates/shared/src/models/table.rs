//! Standardized and wide demographic tables.

use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::Arc;

use arrow::array::{ArrayRef, DictionaryArray, Float64Array, Int32Array, Int64Array, StringArray};
use arrow::datatypes::{DataType, Field, Int32Type, Schema};
use arrow::record_batch::RecordBatch;
use serde::{Deserialize, Serialize};

use crate::errors::DemographyResult;
use crate::models::record::{AGE_BAND_COLUMN, MUNICIPALITY_COLUMN, SEX_COLUMN, YEAR_COLUMN};
use crate::models::sex::Sex;

/// Field metadata key flagging the band column as an ordered categorical
pub const ORDERED_METADATA_KEY: &str = "ordered";

/// Non-band dimensions a table can be grouped by
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Dimension {
    Municipality,
    Year,
    Sex,
}

impl Dimension {
    pub fn column_name(&self) -> &'static str {
        match self {
            Self::Municipality => MUNICIPALITY_COLUMN,
            Self::Year => YEAR_COLUMN,
            Self::Sex => SEX_COLUMN,
        }
    }
}

impl fmt::Display for Dimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.column_name())
    }
}

/// Value of one dimension in a row key
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum DimensionValue {
    Municipality(String),
    Year(i32),
    Sex(Sex),
}

impl DimensionValue {
    pub fn as_year(&self) -> Option<i32> {
        match self {
            Self::Year(year) => Some(*year),
            _ => None,
        }
    }
}

impl fmt::Display for DimensionValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Municipality(id) => f.write_str(id),
            Self::Year(year) => write!(f, "{year}"),
            Self::Sex(sex) => write!(f, "{sex}"),
        }
    }
}

/// Aggregated cell value: a count of records or a sum of weights
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum AggregateValue {
    Count(u64),
    Weight(f64),
}

impl AggregateValue {
    pub fn as_f64(&self) -> f64 {
        match self {
            Self::Count(count) => *count as f64,
            Self::Weight(weight) => *weight,
        }
    }
}

impl fmt::Display for AggregateValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Count(count) => write!(f, "{count}"),
            Self::Weight(weight) => write!(f, "{weight}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ValueKind {
    Count,
    Weight,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StandardizedRow {
    /// One value per table dimension, in dimension order
    pub key: Vec<DimensionValue>,
    pub band: String,
    pub value: AggregateValue,
}

/// Complete, ordered table indexed by (dimensions..., age band).
///
/// Built by the standardizer: the key space is the full cross product of
/// the observed dimension values and every taxonomy band, rows are sorted
/// by key then band order, and every cell holds a non-negative value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StandardizedTable {
    dimensions: Vec<Dimension>,
    bands: Vec<String>,
    measure: String,
    value_kind: ValueKind,
    rows: Vec<StandardizedRow>,
}

impl StandardizedTable {
    /// Assembles a table from rows that already satisfy the table invariants
    pub fn from_parts(
        dimensions: Vec<Dimension>,
        bands: Vec<String>,
        measure: String,
        value_kind: ValueKind,
        rows: Vec<StandardizedRow>,
    ) -> Self {
        Self {
            dimensions,
            bands,
            measure,
            value_kind,
            rows,
        }
    }

    pub fn dimensions(&self) -> &[Dimension] {
        &self.dimensions
    }

    pub fn bands(&self) -> &[String] {
        &self.bands
    }

    pub fn measure(&self) -> &str {
        &self.measure
    }

    pub fn value_kind(&self) -> ValueKind {
        self.value_kind
    }

    pub fn rows(&self) -> &[StandardizedRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn get(&self, key: &[DimensionValue], band: &str) -> Option<AggregateValue> {
        self.rows
            .iter()
            .find(|row| row.key == key && row.band == band)
            .map(|row| row.value)
    }

    /// Sum of every cell
    pub fn total(&self) -> f64 {
        self.rows.iter().map(|row| row.value.as_f64()).sum()
    }

    /// Distinct values of one dimension, sorted
    pub fn distinct(&self, dimension: Dimension) -> Vec<DimensionValue> {
        let Some(position) = self.dimensions.iter().position(|d| *d == dimension) else {
            return Vec::new();
        };
        self.rows
            .iter()
            .map(|row| row.key[position].clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// Renames the measure column (e.g. "Peso" to "Pop")
    pub fn with_measure(mut self, measure: impl Into<String>) -> Self {
        self.measure = measure.into();
        self
    }

    /// Exports the table as a record batch: one column per dimension, the
    /// dictionary-encoded band column, and the measure column.
    pub fn to_record_batch(&self) -> DemographyResult<RecordBatch> {
        let mut fields = Vec::with_capacity(self.dimensions.len() + 2);
        let mut columns: Vec<ArrayRef> = Vec::with_capacity(self.dimensions.len() + 2);

        for (position, dimension) in self.dimensions.iter().enumerate() {
            let values = self.rows.iter().map(|row| &row.key[position]);
            let (field, column) = dimension_column(*dimension, values);
            fields.push(field);
            columns.push(column);
        }

        let (band_field, band_column) =
            band_column(&self.bands, self.rows.iter().map(|row| row.band.as_str()))?;
        fields.push(band_field);
        columns.push(band_column);

        let (measure_field, measure_column) = value_column(
            &self.measure,
            self.value_kind,
            self.rows.iter().map(|row| row.value),
        );
        fields.push(measure_field);
        columns.push(measure_column);

        Ok(RecordBatch::try_new(Arc::new(Schema::new(fields)), columns)?)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WideRow {
    pub key: Vec<DimensionValue>,
    pub band: String,
    /// One value per year column
    pub values: Vec<AggregateValue>,
}

/// Table with the year dimension pivoted into columns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WideTable {
    row_dimensions: Vec<Dimension>,
    bands: Vec<String>,
    years: Vec<i32>,
    measure: String,
    value_kind: ValueKind,
    rows: Vec<WideRow>,
}

impl WideTable {
    pub fn from_parts(
        row_dimensions: Vec<Dimension>,
        bands: Vec<String>,
        years: Vec<i32>,
        measure: String,
        value_kind: ValueKind,
        rows: Vec<WideRow>,
    ) -> Self {
        Self {
            row_dimensions,
            bands,
            years,
            measure,
            value_kind,
            rows,
        }
    }

    pub fn row_dimensions(&self) -> &[Dimension] {
        &self.row_dimensions
    }

    pub fn bands(&self) -> &[String] {
        &self.bands
    }

    pub fn years(&self) -> &[i32] {
        &self.years
    }

    pub fn measure(&self) -> &str {
        &self.measure
    }

    pub fn value_kind(&self) -> ValueKind {
        self.value_kind
    }

    pub fn rows(&self) -> &[WideRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn get(&self, key: &[DimensionValue], band: &str, year: i32) -> Option<AggregateValue> {
        let column = self.years.iter().position(|y| *y == year)?;
        self.rows
            .iter()
            .find(|row| row.key == key && row.band == band)
            .map(|row| row.values[column])
    }

    /// Column totals, one per year
    pub fn year_totals(&self) -> Vec<(i32, f64)> {
        self.years
            .iter()
            .enumerate()
            .map(|(column, year)| {
                let total = self.rows.iter().map(|row| row.values[column].as_f64()).sum();
                (*year, total)
            })
            .collect()
    }

    /// Exports the table with one value column per year, named by the year.
    pub fn to_record_batch(&self) -> DemographyResult<RecordBatch> {
        let mut fields = Vec::with_capacity(self.row_dimensions.len() + 1 + self.years.len());
        let mut columns: Vec<ArrayRef> = Vec::with_capacity(fields.capacity());

        for (position, dimension) in self.row_dimensions.iter().enumerate() {
            let values = self.rows.iter().map(|row| &row.key[position]);
            let (field, column) = dimension_column(*dimension, values);
            fields.push(field);
            columns.push(column);
        }

        let (band_field, band_column) =
            band_column(&self.bands, self.rows.iter().map(|row| row.band.as_str()))?;
        fields.push(band_field);
        columns.push(band_column);

        for (position, year) in self.years.iter().enumerate() {
            let (field, column) = value_column(
                &year.to_string(),
                self.value_kind,
                self.rows.iter().map(|row| row.values[position]),
            );
            fields.push(field);
            columns.push(column);
        }

        Ok(RecordBatch::try_new(Arc::new(Schema::new(fields)), columns)?)
    }
}

fn dimension_column<'a>(
    dimension: Dimension,
    values: impl Iterator<Item = &'a DimensionValue>,
) -> (Field, ArrayRef) {
    match dimension {
        Dimension::Year => {
            let years: Int32Array = values.map(DimensionValue::as_year).collect();
            (Field::new(dimension.column_name(), DataType::Int32, false), Arc::new(years))
        }
        Dimension::Municipality | Dimension::Sex => {
            let labels: StringArray = values.map(|value| Some(value.to_string())).collect();
            (Field::new(dimension.column_name(), DataType::Utf8, false), Arc::new(labels))
        }
    }
}

/// Dictionary-encodes band names with the dictionary in taxonomy order, so
/// that dictionary keys sort the way the bands do.
fn band_column<'a>(
    bands: &[String],
    values: impl Iterator<Item = &'a str>,
) -> DemographyResult<(Field, ArrayRef)> {
    let positions: HashMap<&str, i32> = bands
        .iter()
        .enumerate()
        .map(|(i, band)| (band.as_str(), i as i32))
        .collect();
    let keys: Int32Array = values.map(|band| positions.get(band).copied()).collect();
    let dictionary = StringArray::from(bands.iter().map(String::as_str).collect::<Vec<_>>());
    let array = DictionaryArray::<Int32Type>::try_new(keys, Arc::new(dictionary))?;

    let field = Field::new(
        AGE_BAND_COLUMN,
        DataType::Dictionary(Box::new(DataType::Int32), Box::new(DataType::Utf8)),
        false,
    )
    .with_metadata(HashMap::from([(
        ORDERED_METADATA_KEY.to_string(),
        "true".to_string(),
    )]));
    Ok((field, Arc::new(array)))
}

fn value_column(
    name: &str,
    kind: ValueKind,
    values: impl Iterator<Item = AggregateValue>,
) -> (Field, ArrayRef) {
    match kind {
        ValueKind::Count => {
            let counts: Int64Array = values.map(|v| Some(v.as_f64() as i64)).collect();
            (Field::new(name, DataType::Int64, false), Arc::new(counts))
        }
        ValueKind::Weight => {
            let weights: Float64Array = values.map(|v| Some(v.as_f64())).collect();
            (Field::new(name, DataType::Float64, false), Arc::new(weights))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::array::Array;
    use arrow::array::AsArray;

    fn sample_table() -> StandardizedTable {
        let bands = vec!["0-4".to_string(), "5-9".to_string()];
        let rows = vec![
            StandardizedRow {
                key: vec![DimensionValue::Year(2020), DimensionValue::Sex(Sex::Feminino)],
                band: "0-4".to_string(),
                value: AggregateValue::Count(2),
            },
            StandardizedRow {
                key: vec![DimensionValue::Year(2020), DimensionValue::Sex(Sex::Feminino)],
                band: "5-9".to_string(),
                value: AggregateValue::Count(0),
            },
            StandardizedRow {
                key: vec![DimensionValue::Year(2020), DimensionValue::Sex(Sex::Masculino)],
                band: "0-4".to_string(),
                value: AggregateValue::Count(1),
            },
            StandardizedRow {
                key: vec![DimensionValue::Year(2020), DimensionValue::Sex(Sex::Masculino)],
                band: "5-9".to_string(),
                value: AggregateValue::Count(4),
            },
        ];
        StandardizedTable::from_parts(
            vec![Dimension::Year, Dimension::Sex],
            bands,
            "Óbitos".to_string(),
            ValueKind::Count,
            rows,
        )
    }

    #[test]
    fn test_accessors() {
        let table = sample_table();
        assert_eq!(table.len(), 4);
        assert_eq!(table.total(), 7.0);
        assert_eq!(
            table.get(&[DimensionValue::Year(2020), DimensionValue::Sex(Sex::Masculino)], "5-9"),
            Some(AggregateValue::Count(4))
        );
        assert_eq!(
            table.distinct(Dimension::Sex),
            vec![DimensionValue::Sex(Sex::Feminino), DimensionValue::Sex(Sex::Masculino)]
        );
        assert!(table.distinct(Dimension::Municipality).is_empty());
    }

    #[test]
    fn test_to_record_batch() {
        let batch = sample_table().to_record_batch().unwrap();
        assert_eq!(batch.num_rows(), 4);
        assert_eq!(batch.num_columns(), 4);

        let schema = batch.schema();
        assert_eq!(schema.field(0).name(), "Ano");
        assert_eq!(schema.field(1).name(), "Sexo");
        assert_eq!(schema.field(2).name(), "Faixa Etária");
        assert_eq!(
            schema.field(2).metadata().get(ORDERED_METADATA_KEY).map(String::as_str),
            Some("true")
        );
        assert_eq!(schema.field(3).name(), "Óbitos");

        let sexes = batch.column(1).as_string::<i32>();
        assert_eq!(sexes.value(0), "Feminino");
        assert_eq!(sexes.value(3), "Masculino");

        let bands = batch.column(2).as_dictionary::<Int32Type>();
        assert_eq!(bands.keys().values().to_vec(), vec![0, 1, 0, 1]);
        assert_eq!(bands.values().len(), 2);

        let counts = batch.column(3).as_primitive::<arrow::datatypes::Int64Type>();
        assert_eq!(counts.values().to_vec(), vec![2, 0, 1, 4]);
    }

    #[test]
    fn test_wide_table_accessors_and_export() {
        let key = vec![DimensionValue::Sex(Sex::Feminino)];
        let table = WideTable::from_parts(
            vec![Dimension::Sex],
            vec!["0-4".to_string()],
            vec![2000, 2010],
            "Pop".to_string(),
            ValueKind::Count,
            vec![WideRow {
                key: key.clone(),
                band: "0-4".to_string(),
                values: vec![AggregateValue::Count(10), AggregateValue::Count(12)],
            }],
        );

        assert_eq!(table.get(&key, "0-4", 2010), Some(AggregateValue::Count(12)));
        assert_eq!(table.get(&key, "0-4", 2022), None);
        assert_eq!(table.year_totals(), vec![(2000, 10.0), (2010, 12.0)]);

        let batch = table.to_record_batch().unwrap();
        let schema = batch.schema();
        let names: Vec<&str> = schema.fields().iter().map(|f| f.name().as_str()).collect();
        assert_eq!(names, vec!["Sexo", "Faixa Etária", "2000", "2010"]);
    }

    #[test]
    fn test_weight_values_stay_real() {
        let table = StandardizedTable::from_parts(
            vec![],
            vec!["0-4".to_string()],
            "Peso".to_string(),
            ValueKind::Weight,
            vec![StandardizedRow {
                key: vec![],
                band: "0-4".to_string(),
                value: AggregateValue::Weight(12.75),
            }],
        );
        let batch = table.to_record_batch().unwrap();
        let weights = batch.column(1).as_primitive::<arrow::datatypes::Float64Type>();
        assert_eq!(weights.value(0), 12.75);
        assert_eq!(table.with_measure("Pop").measure(), "Pop");
    }
}
