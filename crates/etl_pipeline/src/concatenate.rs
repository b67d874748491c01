//! Multi-year concatenation: aligns standardized tables on their non-year
//! keys and pivots the year dimension into columns.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use log::info;

use shared::errors::{DemographyError, DemographyResult};
use shared::models::table::{AggregateValue, Dimension, DimensionValue, StandardizedTable, WideRow, WideTable};

type RestKey = Vec<DimensionValue>;

/// Pivots the years of several standardized tables into one wide table.
///
/// Every table must share the dimensions, the band list (same order), the
/// measure, the value kind and, for every year it holds, the same set of
/// non-year keys. A (year, key, band) cell found twice is also a mismatch,
/// and so is a table without rows: each input must add at least one year.
pub fn concatenate(tables: &[StandardizedTable]) -> DemographyResult<WideTable> {
    let Some(first) = tables.first() else {
        return Err(DemographyError::validation("nothing to concatenate"));
    };

    let year_position = first
        .dimensions()
        .iter()
        .position(|d| *d == Dimension::Year)
        .ok_or_else(|| DemographyError::schema_mismatch("tables have no year dimension to pivot"))?;

    for (index, table) in tables.iter().enumerate().skip(1) {
        check_layout(first, table, index)?;
    }
    if let Some(index) = tables.iter().position(StandardizedTable::is_empty) {
        return Err(DemographyError::schema_mismatch(format!(
            "table {index} has no rows and contributes no year"
        )));
    }

    let mut cells: HashMap<(i32, RestKey, usize), AggregateValue> = HashMap::new();
    let mut keys_by_year: BTreeMap<i32, BTreeSet<RestKey>> = BTreeMap::new();

    for table in tables {
        for row in table.rows() {
            let year = row.key[year_position]
                .as_year()
                .ok_or_else(|| DemographyError::schema_mismatch("year column holds a non-year value"))?;
            let rest: RestKey = row
                .key
                .iter()
                .enumerate()
                .filter(|(position, _)| *position != year_position)
                .map(|(_, value)| value.clone())
                .collect();
            let band = first.bands().iter().position(|b| *b == row.band).ok_or_else(|| {
                DemographyError::schema_mismatch(format!("band '{}' is not in the band list", row.band))
            })?;

            keys_by_year.entry(year).or_default().insert(rest.clone());
            if cells.insert((year, rest, band), row.value).is_some() {
                return Err(DemographyError::schema_mismatch(format!(
                    "year {year} appears more than once for the same key and band '{}'",
                    row.band
                )));
            }
        }
    }

    let mut key_spaces = keys_by_year.iter();
    let reference = match key_spaces.next() {
        Some((_, keys)) => keys.clone(),
        None => BTreeSet::new(),
    };
    for (year, keys) in key_spaces {
        if *keys != reference {
            return Err(DemographyError::schema_mismatch(format!(
                "year {year} has {} keys where the first year has {}; key spaces differ",
                keys.len(),
                reference.len()
            )));
        }
    }

    let years: Vec<i32> = keys_by_year.keys().copied().collect();
    let mut rows = Vec::with_capacity(reference.len() * first.bands().len());
    for key in &reference {
        for (band_index, band) in first.bands().iter().enumerate() {
            let values = years
                .iter()
                .map(|year| {
                    cells.get(&(*year, key.clone(), band_index)).copied().ok_or_else(|| {
                        DemographyError::schema_mismatch(format!("year {year} lacks band '{band}'"))
                    })
                })
                .collect::<DemographyResult<Vec<_>>>()?;
            rows.push(WideRow {
                key: key.clone(),
                band: band.clone(),
                values,
            });
        }
    }

    let row_dimensions: Vec<Dimension> = first
        .dimensions()
        .iter()
        .copied()
        .filter(|d| *d != Dimension::Year)
        .collect();

    info!(
        "Concatenated {} tables into {} rows x {} years",
        tables.len(),
        rows.len(),
        years.len()
    );

    Ok(WideTable::from_parts(
        row_dimensions,
        first.bands().to_vec(),
        years,
        first.measure().to_string(),
        first.value_kind(),
        rows,
    ))
}

/// Pivots the year dimension of a single table into columns
pub fn pivot_years(table: &StandardizedTable) -> DemographyResult<WideTable> {
    concatenate(std::slice::from_ref(table))
}

fn check_layout(first: &StandardizedTable, table: &StandardizedTable, index: usize) -> DemographyResult<()> {
    if table.dimensions() != first.dimensions() {
        return Err(DemographyError::schema_mismatch(format!(
            "table {index} is grouped by {:?}, expected {:?}",
            table.dimensions(),
            first.dimensions()
        )));
    }
    if table.bands() != first.bands() {
        return Err(DemographyError::schema_mismatch(format!(
            "table {index} has bands {:?}, expected {:?}",
            table.bands(),
            first.bands()
        )));
    }
    if table.measure() != first.measure() || table.value_kind() != first.value_kind() {
        return Err(DemographyError::schema_mismatch(format!(
            "table {index} measures '{}' ({:?}), expected '{}' ({:?})",
            table.measure(),
            table.value_kind(),
            first.measure(),
            first.value_kind()
        )));
    }
    Ok(())
}
