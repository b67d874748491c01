use std::fmt;

use serde::{Deserialize, Serialize};

use crate::errors::{DemographyError, DemographyResult};

/// Inclusive range of calendar years used to filter registry queries.
///
/// # Example
/// ```rust
/// use shared::models::date_utils::YearRange;
///
/// let range = YearRange::new(2010, 2012).unwrap();
/// assert_eq!(range.years().collect::<Vec<_>>(), vec![2010, 2011, 2012]);
/// assert!(YearRange::new(2020, 2010).is_err());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct YearRange {
    pub start: i32,
    pub end: i32,
}

impl YearRange {
    pub fn new(start: i32, end: i32) -> DemographyResult<Self> {
        if start > end {
            return Err(DemographyError::validation(format!(
                "start_year cannot be greater than end_year ({start} > {end})"
            )));
        }
        Ok(Self { start, end })
    }

    /// Completes a partially specified range with a default range.
    ///
    /// `None` is returned only when neither bound nor a default is available.
    pub fn resolve(
        start: Option<i32>,
        end: Option<i32>,
        default: Option<YearRange>,
    ) -> DemographyResult<Option<Self>> {
        match (start, end, default) {
            (None, None, default) => Ok(default),
            (Some(start), Some(end), _) => Self::new(start, end).map(Some),
            (Some(start), None, Some(default)) => Self::new(start, default.end).map(Some),
            (None, Some(end), Some(default)) => Self::new(default.start, end).map(Some),
            (Some(year), None, None) | (None, Some(year), None) => Self::new(year, year).map(Some),
        }
    }

    pub fn contains(&self, year: i32) -> bool {
        (self.start..=self.end).contains(&year)
    }

    pub fn years(&self) -> std::ops::RangeInclusive<i32> {
        self.start..=self.end
    }

    pub fn as_tuple(&self) -> (i32, i32) {
        (self.start, self.end)
    }
}

impl fmt::Display for YearRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.start, self.end)
    }
}

/// Brazilian demographic census editions with person-level or aggregate data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "i32", into = "i32")]
pub enum CensusYear {
    Y2000,
    Y2010,
    Y2022,
}

impl CensusYear {
    pub const ALL: [CensusYear; 3] = [CensusYear::Y2000, CensusYear::Y2010, CensusYear::Y2022];

    pub fn from_year(year: i32) -> DemographyResult<Self> {
        match year {
            2000 => Ok(Self::Y2000),
            2010 => Ok(Self::Y2010),
            2022 => Ok(Self::Y2022),
            other => Err(DemographyError::validation(format!(
                "no census edition for year {other}; expected 2000, 2010 or 2022"
            ))),
        }
    }

    pub fn year(&self) -> i32 {
        match self {
            Self::Y2000 => 2000,
            Self::Y2010 => 2010,
            Self::Y2022 => 2022,
        }
    }
}

impl fmt::Display for CensusYear {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.year())
    }
}

impl TryFrom<i32> for CensusYear {
    type Error = DemographyError;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        Self::from_year(value)
    }
}

impl From<CensusYear> for i32 {
    fn from(census: CensusYear) -> Self {
        census.year()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_year_range_validation() {
        assert!(YearRange::new(2002, 2022).is_ok());
        assert!(YearRange::new(2015, 2015).is_ok());
        assert!(matches!(
            YearRange::new(2022, 2002),
            Err(DemographyError::Validation(_))
        ));
    }

    #[test]
    fn test_year_range_resolve() {
        let default = YearRange::new(2002, 2022).ok();

        assert_eq!(YearRange::resolve(None, None, default).unwrap(), default);
        assert_eq!(
            YearRange::resolve(Some(2010), None, default).unwrap(),
            Some(YearRange { start: 2010, end: 2022 })
        );
        assert_eq!(
            YearRange::resolve(None, Some(2005), default).unwrap(),
            Some(YearRange { start: 2002, end: 2005 })
        );
        assert_eq!(
            YearRange::resolve(Some(2010), None, None).unwrap(),
            Some(YearRange { start: 2010, end: 2010 })
        );
        assert_eq!(YearRange::resolve(None, None, None).unwrap(), None);
        assert!(YearRange::resolve(Some(2030), None, default).is_err());
    }

    #[test]
    fn test_year_range_helpers() {
        let range = YearRange::new(2000, 2002).unwrap();
        assert!(range.contains(2001));
        assert!(!range.contains(2003));
        assert_eq!(range.to_string(), "2000-2002");
        assert_eq!(range.as_tuple(), (2000, 2002));
    }

    #[test]
    fn test_census_year() {
        assert_eq!(CensusYear::from_year(2010).unwrap(), CensusYear::Y2010);
        assert!(CensusYear::from_year(2011).is_err());
        assert_eq!(CensusYear::Y2022.year(), 2022);
        assert_eq!(serde_json::to_string(&CensusYear::Y2000).unwrap(), "2000");
        assert_eq!(serde_json::from_str::<CensusYear>("2022").unwrap(), CensusYear::Y2022);
    }
}
