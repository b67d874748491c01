//! Parameterized read-only queries against the warehouse.
//!
//! Every domain is described by a [`DomainQuery`] record; a single renderer
//! turns any record plus a validated [`QueryRequest`] into standard SQL.

use std::fmt;

use shared::errors::{DemographyError, DemographyResult};
use shared::models::date_utils::{CensusYear, YearRange};
use shared::models::geo_utils::{MunicipalityId, parse_municipality_ids};
use shared::models::record::{
    AGE_COLUMN, DWELLINGS_COLUMN, MUNICIPALITY_COLUMN, RESIDENTS_COLUMN, SEX_COLUMN, WEIGHT_COLUMN,
    YEAR_COLUMN,
};
use shared::models::subsystem::{CENSO_2022_DOMICILIOS, SIM, SINASC, Subsystem, census_subsystem};

/// Default series for the registry sources
pub const REGISTRY_DEFAULT_YEARS: (i32, i32) = (2002, 2022);

/// Five-year age groups of the 2022 aggregates. The table also carries
/// broader groups overlapping these, which a plain sum would count twice.
const FIVE_YEAR_GROUPS_2022: &str = "grupo_idade IN ('0 a 4 anos', '5 a 9 anos', '10 a 14 anos', \
'15 a 19 anos', '20 a 24 anos', '25 a 29 anos', '30 a 34 anos', '35 a 39 anos', '40 a 44 anos', \
'45 a 49 anos', '50 a 54 anos', '55 a 59 anos', '60 a 64 anos', '65 a 69 anos', '70 a 74 anos', \
'75 a 79 anos', '80 a 84 anos', '85 a 89 anos', '90 a 94 anos', '95 a 99 anos', '100 anos ou mais')";

/// Data domains the builder can query
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueryDomain {
    /// Live births by mother's age (SINASC)
    Births,
    /// Non-fetal deaths by sex and age (SIM)
    Deaths,
    /// Non-fetal deaths restricted to ages under 1 and 65 or older
    InfantElderlyDeaths,
    /// People who lived in the municipality at the census reference date minus five years and left
    Emigration(CensusYear),
    /// People living in the municipality who arrived within five years of the census
    Immigration(CensusYear),
    /// Resident population by sex and age
    PopulationPyramid(CensusYear),
    /// Resident population total
    TotalPopulation(CensusYear),
    /// Residents and occupied private dwellings (2022 census)
    DwellingOccupancy,
}

impl QueryDomain {
    pub fn name(&self) -> String {
        match self {
            Self::Births => "births".to_string(),
            Self::Deaths => "deaths".to_string(),
            Self::InfantElderlyDeaths => "infant and elderly deaths".to_string(),
            Self::Emigration(census) => format!("emigration {census}"),
            Self::Immigration(census) => format!("immigration {census}"),
            Self::PopulationPyramid(census) => format!("population pyramid {census}"),
            Self::TotalPopulation(census) => format!("total population {census}"),
            Self::DwellingOccupancy => "dwelling occupancy 2022".to_string(),
        }
    }

    /// Per-domain query record
    pub fn query_spec(&self) -> DemographyResult<DomainQuery> {
        match *self {
            Self::Births => Ok(DomainQuery {
                subsystem: &SINASC,
                municipality_column: "id_municipio_residencia",
                columns: vec![
                    SelectColumn::plain("id_municipio_residencia", MUNICIPALITY_COLUMN),
                    SelectColumn::plain("ano", YEAR_COLUMN),
                    SelectColumn::plain("idade_mae", AGE_COLUMN),
                ],
                year_column: Some("ano"),
                predicates: vec![],
                order_by: vec!["ano", "idade_mae"],
                default_years: Some(REGISTRY_DEFAULT_YEARS),
            }),
            Self::Deaths | Self::InfantElderlyDeaths => {
                let mut predicates = vec!["tipo_obito = '2'"];
                if *self == Self::InfantElderlyDeaths {
                    predicates.push("(idade < 1) OR (idade >= 65)");
                }
                Ok(DomainQuery {
                    subsystem: &SIM,
                    municipality_column: "id_municipio_residencia",
                    columns: vec![
                        SelectColumn::plain("id_municipio_residencia", MUNICIPALITY_COLUMN),
                        SelectColumn::plain("ano", YEAR_COLUMN),
                        SelectColumn::plain("sexo", SEX_COLUMN),
                        SelectColumn::plain("idade", AGE_COLUMN),
                    ],
                    year_column: Some("ano"),
                    predicates,
                    order_by: vec!["ano", "sexo", "idade"],
                    default_years: Some(REGISTRY_DEFAULT_YEARS),
                })
            }
            Self::Emigration(census) | Self::Immigration(census) => {
                let variables = MicrodataVariables::for_census(census).ok_or_else(|| {
                    DemographyError::validation(format!(
                        "migration is only available from census microdata (2000, 2010), not {census}"
                    ))
                })?;
                let emigration = matches!(self, Self::Emigration(_));
                let municipality_column = if emigration {
                    variables.previous_municipality
                } else {
                    "id_municipio"
                };
                let predicates = if emigration {
                    vec![]
                } else {
                    vec![variables.immigrant_filter]
                };
                Ok(variables.by_sex_and_age(census, municipality_column, predicates))
            }
            Self::PopulationPyramid(census) => match MicrodataVariables::for_census(census) {
                Some(variables) => Ok(variables.by_sex_and_age(census, "id_municipio", vec![])),
                None => Ok(DomainQuery {
                    subsystem: census_subsystem(census),
                    municipality_column: "id_municipio",
                    columns: vec![
                        SelectColumn::plain("id_municipio", MUNICIPALITY_COLUMN),
                        SelectColumn::plain("sexo", SEX_COLUMN),
                        SelectColumn::plain("grupo_idade", AGE_COLUMN),
                        SelectColumn::aggregate("SUM(populacao_residente)", WEIGHT_COLUMN),
                    ],
                    year_column: None,
                    predicates: vec![],
                    order_by: vec!["id_municipio", "sexo", "grupo_idade"],
                    default_years: None,
                }),
            },
            Self::TotalPopulation(census) => {
                let (weight, predicates) = match MicrodataVariables::for_census(census) {
                    Some(variables) => (variables.weight_sum, vec![]),
                    None => ("SUM(populacao_residente)", vec![FIVE_YEAR_GROUPS_2022]),
                };
                Ok(DomainQuery {
                    subsystem: census_subsystem(census),
                    municipality_column: "id_municipio",
                    columns: vec![
                        SelectColumn::plain("id_municipio", MUNICIPALITY_COLUMN),
                        SelectColumn::aggregate(weight, WEIGHT_COLUMN),
                    ],
                    year_column: None,
                    predicates,
                    order_by: vec!["id_municipio"],
                    default_years: None,
                })
            }
            Self::DwellingOccupancy => Ok(DomainQuery {
                subsystem: &CENSO_2022_DOMICILIOS,
                municipality_column: "id_municipio",
                columns: vec![
                    SelectColumn::plain("id_municipio", MUNICIPALITY_COLUMN),
                    SelectColumn::plain("moradores", RESIDENTS_COLUMN),
                    SelectColumn::plain("domicilios", DWELLINGS_COLUMN),
                ],
                year_column: None,
                predicates: vec![],
                order_by: vec!["id_municipio"],
                default_years: None,
            }),
        }
    }
}

impl fmt::Display for QueryDomain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name())
    }
}

/// Variable codes of a census microdata extract
struct MicrodataVariables {
    weight_sum: &'static str,
    sex: &'static str,
    age: &'static str,
    /// Municipality of residence five years before the census
    previous_municipality: &'static str,
    /// Predicate selecting people who moved in within five years
    immigrant_filter: &'static str,
}

impl MicrodataVariables {
    fn for_census(census: CensusYear) -> Option<Self> {
        match census {
            CensusYear::Y2000 => Some(Self {
                weight_sum: "SUM(p001)",
                sex: "v0401",
                age: "v4752",
                previous_municipality: "v4250",
                immigrant_filter: "v0424 IN ('3','4')",
            }),
            CensusYear::Y2010 => Some(Self {
                weight_sum: "SUM(peso_amostral)",
                sex: "v0601",
                age: "v6036",
                previous_municipality: "v6264",
                immigrant_filter: "v6264 IS NOT NULL",
            }),
            CensusYear::Y2022 => None,
        }
    }

    fn by_sex_and_age(
        &self,
        census: CensusYear,
        municipality_column: &'static str,
        predicates: Vec<&'static str>,
    ) -> DomainQuery {
        DomainQuery {
            subsystem: census_subsystem(census),
            municipality_column,
            columns: vec![
                SelectColumn::plain(municipality_column, MUNICIPALITY_COLUMN),
                SelectColumn::plain(self.sex, SEX_COLUMN),
                SelectColumn::plain(self.age, AGE_COLUMN),
                SelectColumn::aggregate(self.weight_sum, WEIGHT_COLUMN),
            ],
            year_column: None,
            predicates,
            order_by: vec![municipality_column, self.sex, self.age],
            default_years: None,
        }
    }
}

/// One selected expression and its output alias
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectColumn {
    pub expression: &'static str,
    pub alias: &'static str,
    pub aggregate: bool,
}

impl SelectColumn {
    pub fn plain(expression: &'static str, alias: &'static str) -> Self {
        Self {
            expression,
            alias,
            aggregate: false,
        }
    }

    pub fn aggregate(expression: &'static str, alias: &'static str) -> Self {
        Self {
            expression,
            alias,
            aggregate: true,
        }
    }
}

/// Per-domain configuration record driving the query renderer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DomainQuery {
    pub subsystem: &'static Subsystem,
    /// Column compared against the requested municipality ids
    pub municipality_column: &'static str,
    pub columns: Vec<SelectColumn>,
    /// Column filtered by the year range; `None` for census sources
    pub year_column: Option<&'static str>,
    pub predicates: Vec<&'static str>,
    pub order_by: Vec<&'static str>,
    pub default_years: Option<(i32, i32)>,
}

impl DomainQuery {
    pub fn is_aggregated(&self) -> bool {
        self.columns.iter().any(|c| c.aggregate)
    }

    pub fn default_year_range(&self) -> DemographyResult<Option<YearRange>> {
        self.default_years
            .map(|(start, end)| YearRange::new(start, end))
            .transpose()
    }
}

/// A validated query, ready to be rendered and dispatched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryRequest {
    domain: QueryDomain,
    spec: DomainQuery,
    municipalities: Vec<MunicipalityId>,
    years: Option<YearRange>,
}

impl QueryRequest {
    /// Validates caller input; nothing is sent anywhere.
    ///
    /// Registry domains fill a missing year bound from their default series.
    /// Census domains reject any year bound.
    pub fn new<S: AsRef<str>>(
        domain: QueryDomain,
        municipality_ids: &[S],
        start_year: Option<i32>,
        end_year: Option<i32>,
    ) -> DemographyResult<Self> {
        let spec = domain.query_spec()?;
        let municipalities = parse_municipality_ids(municipality_ids)?;

        let years = match spec.year_column {
            Some(_) => YearRange::resolve(start_year, end_year, spec.default_year_range()?)?,
            None => {
                if start_year.is_some() || end_year.is_some() {
                    return Err(DemographyError::validation(format!(
                        "{domain} comes from a single census edition and takes no year range"
                    )));
                }
                None
            }
        };

        Ok(Self {
            domain,
            spec,
            municipalities,
            years,
        })
    }

    pub fn domain(&self) -> QueryDomain {
        self.domain
    }

    pub fn spec(&self) -> &DomainQuery {
        &self.spec
    }

    pub fn municipalities(&self) -> &[MunicipalityId] {
        &self.municipalities
    }

    pub fn years(&self) -> Option<YearRange> {
        self.years
    }

    pub fn target(&self) -> String {
        self.spec.subsystem.qualified_table().trim_matches('`').to_string()
    }

    /// Renders the read-only SELECT statement for this request
    pub fn render_sql(&self) -> String {
        let spec = &self.spec;
        let indent = "    ";

        let select = spec
            .columns
            .iter()
            .map(|c| format!("{indent}{} AS {}", c.expression, c.alias))
            .collect::<Vec<_>>()
            .join(",\n");

        let ids = self
            .municipalities
            .iter()
            .map(|id| format!("'{id}'"))
            .collect::<Vec<_>>()
            .join(", ");

        let mut conditions = vec![format!("({} IN ({ids}))", spec.municipality_column)];
        if let (Some(column), Some(years)) = (spec.year_column, self.years) {
            conditions.push(format!("({column} BETWEEN {} AND {})", years.start, years.end));
        }
        conditions.extend(spec.predicates.iter().map(|p| format!("({p})")));

        let mut sql = format!(
            "SELECT\n{select}\nFROM\n{indent}{}\nWHERE\n{indent}{}",
            spec.subsystem.qualified_table(),
            conditions.join(&format!("\n{indent}AND ")),
        );

        if spec.is_aggregated() {
            let group_by = spec
                .columns
                .iter()
                .filter(|c| !c.aggregate)
                .map(|c| c.expression)
                .collect::<Vec<_>>();
            if !group_by.is_empty() {
                sql.push_str(&format!("\nGROUP BY\n{indent}{}", group_by.join(", ")));
            }
        }

        if !spec.order_by.is_empty() {
            sql.push_str(&format!("\nORDER BY\n{indent}{}", spec.order_by.join(", ")));
        }
        sql.push(';');
        sql
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_births_query() {
        let request = QueryRequest::new(QueryDomain::Births, &["3550308"], Some(2010), Some(2012)).unwrap();
        let sql = request.render_sql();

        assert!(sql.starts_with("SELECT\n"));
        assert!(sql.contains("idade_mae AS Idade"));
        assert!(sql.contains("`basedosdados.br_ms_sinasc.microdados`"));
        assert!(sql.contains("(id_municipio_residencia IN ('3550308'))"));
        assert!(sql.contains("(ano BETWEEN 2010 AND 2012)"));
        assert!(sql.contains("ORDER BY\n    ano, idade_mae"));
        assert!(!sql.contains("GROUP BY"));
        assert!(sql.ends_with(';'));
        assert_eq!(request.target(), "basedosdados.br_ms_sinasc.microdados");
    }

    #[test]
    fn test_registry_defaults_fill_missing_bounds() {
        let request = QueryRequest::new(QueryDomain::Deaths, &["3550308"], None, None).unwrap();
        assert_eq!(request.years(), Some(YearRange { start: 2002, end: 2022 }));

        let request = QueryRequest::new(QueryDomain::Deaths, &["3550308"], Some(2015), None).unwrap();
        assert_eq!(request.years(), Some(YearRange { start: 2015, end: 2022 }));
    }

    #[test]
    fn test_deaths_queries_filter_death_type() {
        let request =
            QueryRequest::new(QueryDomain::Deaths, &["3550308", "3304557"], Some(2002), Some(2022)).unwrap();
        let sql = request.render_sql();
        assert!(sql.contains("(id_municipio_residencia IN ('3550308', '3304557'))"));
        assert!(sql.contains("AND (tipo_obito = '2')"));
        assert!(!sql.contains("idade >= 65"));

        let request = QueryRequest::new(QueryDomain::InfantElderlyDeaths, &["3550308"], None, None).unwrap();
        let sql = request.render_sql();
        assert!(sql.contains("((idade < 1) OR (idade >= 65))"));
    }

    #[test]
    fn test_migration_queries() {
        let emigration =
            QueryRequest::new(QueryDomain::Emigration(CensusYear::Y2010), &["3550308"], None, None).unwrap();
        let sql = emigration.render_sql();
        assert!(sql.contains("SUM(peso_amostral) AS Peso"));
        assert!(sql.contains("(v6264 IN ('3550308'))"));
        assert!(sql.contains("GROUP BY\n    v6264, v0601, v6036"));
        assert!(sql.contains("microdados_pessoa_2010"));

        let immigration =
            QueryRequest::new(QueryDomain::Immigration(CensusYear::Y2000), &["3550308"], None, None).unwrap();
        let sql = immigration.render_sql();
        assert!(sql.contains("SUM(p001) AS Peso"));
        assert!(sql.contains("(id_municipio IN ('3550308'))"));
        assert!(sql.contains("AND (v0424 IN ('3','4'))"));
        assert!(sql.contains("microdados_pessoa_2000"));
    }

    #[test]
    fn test_migration_unavailable_for_2022() {
        let result = QueryRequest::new(QueryDomain::Emigration(CensusYear::Y2022), &["3550308"], None, None);
        assert!(matches!(result, Err(DemographyError::Validation(_))));
    }

    #[test]
    fn test_pyramid_2022_uses_aggregates() {
        let request =
            QueryRequest::new(QueryDomain::PopulationPyramid(CensusYear::Y2022), &["3550308"], None, None).unwrap();
        let sql = request.render_sql();
        assert!(sql.contains("`basedosdados.br_ibge_censo_2022.populacao_residente_municipio`"));
        assert!(sql.contains("grupo_idade AS Idade"));
        assert!(sql.contains("SUM(populacao_residente) AS Peso"));
        assert!(sql.contains("GROUP BY\n    id_municipio, sexo, grupo_idade"));
    }

    #[test]
    fn test_total_population_query() {
        let request =
            QueryRequest::new(QueryDomain::TotalPopulation(CensusYear::Y2010), &["3550308"], None, None).unwrap();
        let sql = request.render_sql();
        assert!(sql.contains("SUM(peso_amostral) AS Peso"));
        assert!(sql.contains("`basedosdados.br_ibge_censo_demografico.microdados_pessoa_2010`"));
        assert!(sql.contains("GROUP BY\n    id_municipio"));
        assert!(!sql.contains("grupo_idade"));
    }

    #[test]
    fn test_total_population_2022_sums_five_year_groups_only() {
        let request =
            QueryRequest::new(QueryDomain::TotalPopulation(CensusYear::Y2022), &["3550308"], None, None).unwrap();
        let sql = request.render_sql();
        assert!(sql.contains("SUM(populacao_residente) AS Peso"));
        assert!(sql.contains("AND (grupo_idade IN ('0 a 4 anos', '5 a 9 anos', '10 a 14 anos', '15 a 19 anos'"));
        assert!(sql.contains("'95 a 99 anos', '100 anos ou mais'))"));
        assert_eq!(sql.matches(" anos").count(), 21);
    }

    #[test]
    fn test_dwelling_occupancy_query() {
        let request = QueryRequest::new(QueryDomain::DwellingOccupancy, &["3550308", "3304557"], None, None).unwrap();
        let sql = request.render_sql();
        assert!(sql.contains("`basedosdados.br_ibge_censo_2022.domicilio_morador_municipio`"));
        assert!(sql.contains("moradores AS Moradores"));
        assert!(sql.contains("domicilios AS Domicilios"));
        assert!(sql.contains("(id_municipio IN ('3550308', '3304557'))"));
        assert!(!sql.contains("GROUP BY"));
        assert!(sql.ends_with("ORDER BY\n    id_municipio;"));

        assert!(matches!(
            QueryRequest::new(QueryDomain::DwellingOccupancy, &["3550308"], Some(2022), None),
            Err(DemographyError::Validation(_))
        ));
    }

    #[test]
    fn test_validation_happens_before_dispatch() {
        let empty: [&str; 0] = [];
        assert!(matches!(
            QueryRequest::new(QueryDomain::Births, &empty, None, None),
            Err(DemographyError::Validation(_))
        ));
        assert!(matches!(
            QueryRequest::new(QueryDomain::Births, &["12345"], None, None),
            Err(DemographyError::Validation(_))
        ));
        assert!(matches!(
            QueryRequest::new(QueryDomain::Births, &["3550308"], Some(2020), Some(2010)),
            Err(DemographyError::Validation(_))
        ));
        assert!(matches!(
            QueryRequest::new(QueryDomain::PopulationPyramid(CensusYear::Y2010), &["3550308"], Some(2010), None),
            Err(DemographyError::Validation(_))
        ));
    }

    #[test]
    fn test_ids_cannot_inject_sql() {
        let result = QueryRequest::new(QueryDomain::Births, &["3550308') OR ('1'='1"], None, None);
        assert!(result.is_err());
    }
}
