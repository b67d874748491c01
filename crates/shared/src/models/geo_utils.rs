use std::collections::HashMap;
use std::fmt;

use lazy_static::lazy_static;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::errors::{DemographyError, DemographyResult};

lazy_static! {
    static ref MUNICIPALITY_ID_REGEX: Regex = Regex::new(r"^[0-9]{7}$").unwrap();
}

/// Representation of a Brazilian Federative Unit (State).
///
/// # Fields
/// * `code` - IBGE code of the state, also the first two digits of its municipality ids
/// * `name` - Full name of the state
/// * `uf` - State abbreviation (2 letters)
///
/// # Example
/// ```rust
/// use shared::models::geo_utils::StateBR;
///
/// let sao_paulo = StateBR::new(35, "São Paulo", "SP");
/// assert_eq!(sao_paulo.code, 35);
/// assert_eq!(sao_paulo.uf, "SP");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateBR {
    pub code: u8,
    pub name: String,
    pub uf: String,
}

impl StateBR {
    pub fn new(code: u8, name: &str, uf: &str) -> Self {
        Self {
            code,
            name: name.to_string(),
            uf: uf.to_string(),
        }
    }
}

/// Mapping of UF abbreviations to their complete state data.
pub static UFS: Lazy<HashMap<&'static str, StateBR>> = Lazy::new(|| {
    let mut ufs = HashMap::new();
    ufs.insert("RO", StateBR::new(11, "Rondônia", "RO"));
    ufs.insert("AC", StateBR::new(12, "Acre", "AC"));
    ufs.insert("AM", StateBR::new(13, "Amazonas", "AM"));
    ufs.insert("RR", StateBR::new(14, "Roraima", "RR"));
    ufs.insert("PA", StateBR::new(15, "Pará", "PA"));
    ufs.insert("AP", StateBR::new(16, "Amapá", "AP"));
    ufs.insert("TO", StateBR::new(17, "Tocantins", "TO"));
    ufs.insert("MA", StateBR::new(21, "Maranhão", "MA"));
    ufs.insert("PI", StateBR::new(22, "Piauí", "PI"));
    ufs.insert("CE", StateBR::new(23, "Ceará", "CE"));
    ufs.insert("RN", StateBR::new(24, "Rio Grande do Norte", "RN"));
    ufs.insert("PB", StateBR::new(25, "Paraíba", "PB"));
    ufs.insert("PE", StateBR::new(26, "Pernambuco", "PE"));
    ufs.insert("AL", StateBR::new(27, "Alagoas", "AL"));
    ufs.insert("SE", StateBR::new(28, "Sergipe", "SE"));
    ufs.insert("BA", StateBR::new(29, "Bahia", "BA"));
    ufs.insert("MG", StateBR::new(31, "Minas Gerais", "MG"));
    ufs.insert("ES", StateBR::new(32, "Espírito Santo", "ES"));
    ufs.insert("RJ", StateBR::new(33, "Rio de Janeiro", "RJ"));
    ufs.insert("SP", StateBR::new(35, "São Paulo", "SP"));
    ufs.insert("PR", StateBR::new(41, "Paraná", "PR"));
    ufs.insert("SC", StateBR::new(42, "Santa Catarina", "SC"));
    ufs.insert("RS", StateBR::new(43, "Rio Grande do Sul", "RS"));
    ufs.insert("MS", StateBR::new(50, "Mato Grosso do Sul", "MS"));
    ufs.insert("MT", StateBR::new(51, "Mato Grosso", "MT"));
    ufs.insert("GO", StateBR::new(52, "Goiás", "GO"));
    ufs.insert("DF", StateBR::new(53, "Distrito Federal", "DF"));
    ufs
});

/// Get state information by UF abbreviation (case insensitive).
pub fn get_state_info(uf: &str) -> DemographyResult<StateBR> {
    let uf_upper = uf.trim().to_uppercase();
    UFS.get(uf_upper.as_str())
        .cloned()
        .ok_or_else(|| DemographyError::validation(format!("UF não encontrada: '{uf}'")))
}

/// Get state information by its two-digit IBGE code.
pub fn state_for_code(code: u8) -> Option<&'static StateBR> {
    UFS.values().find(|state| state.code == code)
}

/// Seven-digit IBGE municipality identifier.
///
/// Identifiers are kept as text: they are compared and rendered into
/// queries as strings, never as numbers.
///
/// # Example
/// ```rust
/// use shared::models::geo_utils::MunicipalityId;
///
/// let sp = MunicipalityId::parse("3550308").unwrap();
/// assert_eq!(sp.as_str(), "3550308");
/// assert_eq!(sp.state().unwrap().uf, "SP");
/// assert!(MunicipalityId::parse("355030").is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct MunicipalityId(String);

impl MunicipalityId {
    pub fn parse(raw: &str) -> DemographyResult<Self> {
        let id = raw.trim();
        if !MUNICIPALITY_ID_REGEX.is_match(id) {
            return Err(DemographyError::validation(format!(
                "municipality id must have exactly seven digits, got '{raw}'"
            )));
        }

        let state_code: u8 = id[..2]
            .parse()
            .map_err(|_| DemographyError::validation(format!("invalid state prefix in '{raw}'")))?;
        if state_for_code(state_code).is_none() {
            return Err(DemographyError::validation(format!(
                "municipality id '{raw}' does not start with a known UF code"
            )));
        }

        Ok(Self(id.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// State the municipality belongs to; always `Some` for parsed ids
    pub fn state(&self) -> Option<&'static StateBR> {
        self.0[..2].parse().ok().and_then(state_for_code)
    }
}

impl fmt::Display for MunicipalityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<String> for MunicipalityId {
    type Error = DemographyError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<MunicipalityId> for String {
    fn from(id: MunicipalityId) -> Self {
        id.0
    }
}

/// Validates a list of municipality ids.
///
/// Fails on an empty list or on the first malformed id; duplicates are
/// collapsed while keeping the first-seen order.
pub fn parse_municipality_ids<S: AsRef<str>>(ids: &[S]) -> DemographyResult<Vec<MunicipalityId>> {
    if ids.is_empty() {
        return Err(DemographyError::validation("at least one municipality id is required"));
    }

    let mut parsed: Vec<MunicipalityId> = Vec::with_capacity(ids.len());
    for raw in ids {
        let id = MunicipalityId::parse(raw.as_ref())?;
        if !parsed.contains(&id) {
            parsed.push(id);
        }
    }
    Ok(parsed)
}
