use arrow::array::{
    Array, ArrayRef, Float32Array, Float64Array, Int16Array, Int32Array, Int64Array, LargeStringArray,
    StringArray, UInt16Array, UInt32Array, UInt64Array,
};
use arrow::record_batch::RecordBatch;

use crate::errors::{DemographyError, DemographyResult};
use crate::models::age_groups::AgeKey;

/// Column aliases every domain query selects into
pub const MUNICIPALITY_COLUMN: &str = "mun_id";
pub const YEAR_COLUMN: &str = "Ano";
pub const SEX_COLUMN: &str = "Sexo";
pub const AGE_COLUMN: &str = "Idade";
pub const WEIGHT_COLUMN: &str = "Peso";

/// Aliases of the dwelling occupancy query
pub const RESIDENTS_COLUMN: &str = "Moradores";
pub const DWELLINGS_COLUMN: &str = "Domicilios";

/// Output column holding the age band of standardized tables
pub const AGE_BAND_COLUMN: &str = "Faixa Etária";

/// One row returned by the query service.
///
/// Every attribute is optional: which ones are populated depends on the
/// domain query that produced the row.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawRecord {
    pub municipality: Option<String>,
    pub year: Option<i32>,
    /// Raw sex code, normalized later by the standardizer
    pub sex: Option<String>,
    pub age: Option<AgeKey>,
    /// Sample weight or pre-aggregated population
    pub weight: Option<f64>,
}

impl RawRecord {
    pub fn with_age(age: Option<u32>) -> Self {
        Self {
            age: age.map(AgeKey::Years),
            ..Self::default()
        }
    }

    pub fn year(mut self, year: i32) -> Self {
        self.year = Some(year);
        self
    }

    pub fn sex(mut self, code: &str) -> Self {
        self.sex = Some(code.to_string());
        self
    }

    pub fn municipality(mut self, id: &str) -> Self {
        self.municipality = Some(id.to_string());
        self
    }

    pub fn weight(mut self, weight: f64) -> Self {
        self.weight = Some(weight);
        self
    }
}

/// Converts a query result into raw records using the canonical column aliases.
///
/// Columns that are absent from the batch leave the corresponding field empty.
pub fn raw_records_from_batch(batch: &RecordBatch) -> DemographyResult<Vec<RawRecord>> {
    let rows = batch.num_rows();
    let mut records = vec![RawRecord::default(); rows];

    if let Some(column) = batch.column_by_name(MUNICIPALITY_COLUMN) {
        let values = text_values(column, MUNICIPALITY_COLUMN)?;
        for (record, value) in records.iter_mut().zip(values) {
            record.municipality = value.map(|v| v.trim().to_string());
        }
    }

    if let Some(column) = batch.column_by_name(YEAR_COLUMN) {
        let values = integer_values(column, YEAR_COLUMN)?;
        for (record, value) in records.iter_mut().zip(values) {
            record.year = value
                .map(|year| {
                    i32::try_from(year).map_err(|_| {
                        DemographyError::MalformedRecord(format!("year {year} out of range"))
                    })
                })
                .transpose()?;
        }
    }

    if let Some(column) = batch.column_by_name(SEX_COLUMN) {
        let values = text_values(column, SEX_COLUMN)?;
        for (record, value) in records.iter_mut().zip(values) {
            record.sex = value;
        }
    }

    if let Some(column) = batch.column_by_name(AGE_COLUMN) {
        let values = age_values(column)?;
        for (record, value) in records.iter_mut().zip(values) {
            record.age = value;
        }
    }

    if let Some(column) = batch.column_by_name(WEIGHT_COLUMN) {
        let values = float_values(column, WEIGHT_COLUMN)?;
        for (record, value) in records.iter_mut().zip(values) {
            record.weight = value;
        }
    }

    Ok(records)
}

/// Reads a numeric column by name; `None` when the batch lacks it
pub fn numeric_column(batch: &RecordBatch, name: &str) -> DemographyResult<Option<Vec<Option<f64>>>> {
    batch
        .column_by_name(name)
        .map(|column| float_values(column, name))
        .transpose()
}

macro_rules! collect_numeric {
    ($column:expr, $array:ty, $convert:expr) => {
        $column.as_any().downcast_ref::<$array>().map(|array| {
            (0..array.len())
                .map(|i| if array.is_null(i) { None } else { Some($convert(array.value(i))) })
                .collect::<Vec<_>>()
        })
    };
}

fn text_values(column: &ArrayRef, name: &str) -> DemographyResult<Vec<Option<String>>> {
    if let Some(array) = column.as_any().downcast_ref::<StringArray>() {
        return Ok(array.iter().map(|v| v.map(str::to_string)).collect());
    }
    if let Some(array) = column.as_any().downcast_ref::<LargeStringArray>() {
        return Ok(array.iter().map(|v| v.map(str::to_string)).collect());
    }
    // Codes sometimes arrive as integers when the warehouse column is numeric
    if let Some(values) = integer_values(column, name).ok() {
        return Ok(values.into_iter().map(|v| v.map(|n| n.to_string())).collect());
    }
    Err(unsupported(name, column))
}

fn integer_values(column: &ArrayRef, name: &str) -> DemographyResult<Vec<Option<i64>>> {
    let values = collect_numeric!(column, Int64Array, |v: i64| v)
        .or_else(|| collect_numeric!(column, Int32Array, |v: i32| v as i64))
        .or_else(|| collect_numeric!(column, Int16Array, |v: i16| v as i64))
        .or_else(|| collect_numeric!(column, UInt16Array, |v: u16| v as i64))
        .or_else(|| collect_numeric!(column, UInt32Array, |v: u32| v as i64));
    if let Some(values) = values {
        return Ok(values);
    }

    if let Some(array) = column.as_any().downcast_ref::<StringArray>() {
        return array
            .iter()
            .map(|v| {
                v.map(|text| {
                    text.trim().parse::<i64>().map_err(|_| {
                        DemographyError::MalformedRecord(format!("{name}: '{text}' is not an integer"))
                    })
                })
                .transpose()
            })
            .collect();
    }
    Err(unsupported(name, column))
}

fn float_values(column: &ArrayRef, name: &str) -> DemographyResult<Vec<Option<f64>>> {
    let values = collect_numeric!(column, Float64Array, |v: f64| v)
        .or_else(|| collect_numeric!(column, Float32Array, |v: f32| v as f64))
        .or_else(|| collect_numeric!(column, Int64Array, |v: i64| v as f64))
        .or_else(|| collect_numeric!(column, Int32Array, |v: i32| v as f64))
        .or_else(|| collect_numeric!(column, UInt64Array, |v: u64| v as f64));
    if let Some(values) = values {
        return Ok(values);
    }

    if let Some(array) = column.as_any().downcast_ref::<StringArray>() {
        return array
            .iter()
            .map(|v| {
                v.map(|text| {
                    text.trim().parse::<f64>().map_err(|_| {
                        DemographyError::MalformedRecord(format!("{name}: '{text}' is not a number"))
                    })
                })
                .transpose()
            })
            .collect();
    }
    Err(unsupported(name, column))
}

fn age_values(column: &ArrayRef) -> DemographyResult<Vec<Option<AgeKey>>> {
    if let Some(array) = column.as_any().downcast_ref::<StringArray>() {
        return Ok(array.iter().map(|v| v.and_then(AgeKey::parse)).collect());
    }
    if let Some(array) = column.as_any().downcast_ref::<LargeStringArray>() {
        return Ok(array.iter().map(|v| v.and_then(AgeKey::parse)).collect());
    }

    let numeric = float_values(column, AGE_COLUMN)?;
    numeric
        .into_iter()
        .map(|value| match value {
            None => Ok(None),
            Some(age) if age.is_nan() => Ok(None),
            Some(age) if age < 0.0 || !age.is_finite() || age > u32::MAX as f64 => Err(
                DemographyError::MalformedRecord(format!("{AGE_COLUMN}: invalid age {age}")),
            ),
            Some(age) => Ok(Some(AgeKey::Years(age.trunc() as u32))),
        })
        .collect()
}

fn unsupported(name: &str, column: &ArrayRef) -> DemographyError {
    DemographyError::MalformedRecord(format!(
        "column '{name}' has unsupported type {}",
        column.data_type()
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::datatypes::{DataType, Field, Schema};
    use std::sync::Arc;

    #[test]
    fn test_raw_records_from_batch() {
        let schema = Arc::new(Schema::new(vec![
            Field::new(MUNICIPALITY_COLUMN, DataType::Utf8, true),
            Field::new(YEAR_COLUMN, DataType::Int64, true),
            Field::new(SEX_COLUMN, DataType::Utf8, true),
            Field::new(AGE_COLUMN, DataType::Int64, true),
        ]));
        let batch = RecordBatch::try_new(
            schema,
            vec![
                Arc::new(StringArray::from(vec![Some("3550308"), Some("3550308")])),
                Arc::new(Int64Array::from(vec![Some(2020), Some(2021)])),
                Arc::new(StringArray::from(vec![Some("1"), None])),
                Arc::new(Int64Array::from(vec![Some(34), None])),
            ],
        )
        .unwrap();

        let records = raw_records_from_batch(&batch).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].municipality.as_deref(), Some("3550308"));
        assert_eq!(records[0].year, Some(2020));
        assert_eq!(records[0].sex.as_deref(), Some("1"));
        assert_eq!(records[0].age, Some(AgeKey::Years(34)));
        assert_eq!(records[0].weight, None);
        assert_eq!(records[1].sex, None);
        assert_eq!(records[1].age, None);
    }

    #[test]
    fn test_float_ages_and_text_groups() {
        let schema = Arc::new(Schema::new(vec![
            Field::new(AGE_COLUMN, DataType::Float64, true),
            Field::new(WEIGHT_COLUMN, DataType::Float64, true),
        ]));
        let batch = RecordBatch::try_new(
            schema,
            vec![
                Arc::new(Float64Array::from(vec![Some(7.0), Some(f64::NAN), None])),
                Arc::new(Float64Array::from(vec![Some(10.5), Some(2.0), None])),
            ],
        )
        .unwrap();
        let records = raw_records_from_batch(&batch).unwrap();
        assert_eq!(records[0].age, Some(AgeKey::Years(7)));
        assert_eq!(records[1].age, None);
        assert_eq!(records[0].weight, Some(10.5));
        assert_eq!(records[2].weight, None);

        let schema = Arc::new(Schema::new(vec![Field::new(AGE_COLUMN, DataType::Utf8, true)]));
        let batch = RecordBatch::try_new(
            schema,
            vec![Arc::new(StringArray::from(vec![Some("0 a 4 anos"), Some("12")]))],
        )
        .unwrap();
        let records = raw_records_from_batch(&batch).unwrap();
        assert_eq!(records[0].age, Some(AgeKey::Label("0 a 4 anos".to_string())));
        assert_eq!(records[1].age, Some(AgeKey::Years(12)));
    }

    #[test]
    fn test_negative_age_is_malformed() {
        let schema = Arc::new(Schema::new(vec![Field::new(AGE_COLUMN, DataType::Int64, true)]));
        let batch =
            RecordBatch::try_new(schema, vec![Arc::new(Int64Array::from(vec![Some(-1)]))]).unwrap();
        assert!(matches!(
            raw_records_from_batch(&batch),
            Err(DemographyError::MalformedRecord(_))
        ));
    }

    #[test]
    fn test_integer_sex_codes_become_text() {
        let schema = Arc::new(Schema::new(vec![Field::new(SEX_COLUMN, DataType::Int64, true)]));
        let batch =
            RecordBatch::try_new(schema, vec![Arc::new(Int64Array::from(vec![Some(2)]))]).unwrap();
        let records = raw_records_from_batch(&batch).unwrap();
        assert_eq!(records[0].sex.as_deref(), Some("2"));
    }

    #[test]
    fn test_numeric_column() {
        let schema = Arc::new(Schema::new(vec![Field::new(RESIDENTS_COLUMN, DataType::Int64, true)]));
        let batch =
            RecordBatch::try_new(schema, vec![Arc::new(Int64Array::from(vec![Some(120), None]))]).unwrap();
        assert_eq!(
            numeric_column(&batch, RESIDENTS_COLUMN).unwrap(),
            Some(vec![Some(120.0), None])
        );
        assert_eq!(numeric_column(&batch, DWELLINGS_COLUMN).unwrap(), None);
    }

    #[test]
    fn test_builder_helpers() {
        let record = RawRecord::with_age(Some(3)).year(2020).sex("2").municipality("3550308").weight(1.5);
        assert_eq!(record.age, Some(AgeKey::Years(3)));
        assert_eq!(record.year, Some(2020));
        assert_eq!(record.weight, Some(1.5));
    }
}
