use once_cell::sync::Lazy;

use crate::models::date_utils::CensusYear;

/// Warehouse project hosting every source table
pub const WAREHOUSE_PROJECT: &str = "basedosdados";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubsystemMetadata {
    pub long_name: String,
    pub source: String,
    pub description: String,
}

/// A data source published in the warehouse, with the table queried for it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subsystem {
    pub name: String,
    /// Dataset-qualified table, e.g. `br_ms_sim.microdados`
    pub table: String,
    pub metadata: SubsystemMetadata,
}

impl Subsystem {
    pub fn new(name: String, table: String, metadata: SubsystemMetadata) -> Self {
        Self { name, table, metadata }
    }

    /// Fully qualified table reference for standard SQL
    pub fn qualified_table(&self) -> String {
        format!("`{}.{}`", WAREHOUSE_PROJECT, self.table)
    }
}

pub static SINASC: Lazy<Subsystem> = Lazy::new(|| {
    Subsystem::new(
        "SINASC".to_string(),
        "br_ms_sinasc.microdados".to_string(),
        SubsystemMetadata {
            long_name: "Sistema de Informações sobre Nascidos Vivos".to_string(),
            source: "http://sinasc.saude.gov.br/".to_string(),
            description: [
                "Declarações de nascido vivo registradas pelo Ministério da Saúde, ",
                "com o município de residência e a idade da mãe."
            ].join(""),
        },
    )
});

pub static SIM: Lazy<Subsystem> = Lazy::new(|| {
    Subsystem::new(
        "SIM".to_string(),
        "br_ms_sim.microdados".to_string(),
        SubsystemMetadata {
            long_name: "Sistema de Informação sobre Mortalidade".to_string(),
            source: "http://sim.saude.gov.br".to_string(),
            description: [
                "O Sistema de Informação sobre Mortalidade (SIM) é um sistema ",
                "desenvolvido pelo Ministério da Saúde (MS) para coletar, ",
                "processar e disponibilizar informações sobre a mortalidade ",
                "no Brasil, incluindo dados sobre a idade, sexo, localização ",
                "e tipo do óbito."
            ].join(""),
        },
    )
});

pub static CENSO_2000: Lazy<Subsystem> = Lazy::new(|| {
    Subsystem::new(
        "CENSO2000".to_string(),
        "br_ibge_censo_demografico.microdados_pessoa_2000".to_string(),
        SubsystemMetadata {
            long_name: "Censo Demográfico 2000 - Microdados da Amostra (Pessoas)".to_string(),
            source: "https://www.ibge.gov.br/estatisticas/sociais/populacao/9663-censo-demografico-2000.html".to_string(),
            description: [
                "Registros de pessoas da amostra do Censo 2000. Cada registro ",
                "carrega o peso amostral p001, e a migração é identificada pelo ",
                "município de residência em 31/07/1995."
            ].join(""),
        },
    )
});

pub static CENSO_2010: Lazy<Subsystem> = Lazy::new(|| {
    Subsystem::new(
        "CENSO2010".to_string(),
        "br_ibge_censo_demografico.microdados_pessoa_2010".to_string(),
        SubsystemMetadata {
            long_name: "Censo Demográfico 2010 - Microdados da Amostra (Pessoas)".to_string(),
            source: "https://www.ibge.gov.br/estatisticas/sociais/populacao/9662-censo-demografico-2010.html".to_string(),
            description: [
                "Registros de pessoas da amostra do Censo 2010. Cada registro ",
                "carrega o peso_amostral, e a migração é identificada pelo ",
                "município de residência em 31/07/2005."
            ].join(""),
        },
    )
});

pub static CENSO_2022: Lazy<Subsystem> = Lazy::new(|| {
    Subsystem::new(
        "CENSO2022".to_string(),
        "br_ibge_censo_2022.populacao_residente_municipio".to_string(),
        SubsystemMetadata {
            long_name: "Censo Demográfico 2022 - População residente por município".to_string(),
            source: "https://censo2022.ibge.gov.br/".to_string(),
            description: [
                "População residente agregada por município, sexo e grupo de ",
                "idade, sem microdados de pessoas."
            ].join(""),
        },
    )
});

pub static CENSO_2022_DOMICILIOS: Lazy<Subsystem> = Lazy::new(|| {
    Subsystem::new(
        "CENSO2022_DOMICILIOS".to_string(),
        "br_ibge_censo_2022.domicilio_morador_municipio".to_string(),
        SubsystemMetadata {
            long_name: "Censo Demográfico 2022 - Domicílios particulares permanentes ocupados".to_string(),
            source: "https://censo2022.ibge.gov.br/".to_string(),
            description: [
                "Moradores e domicílios particulares permanentes ocupados ",
                "por município."
            ].join(""),
        },
    )
});

/// Census table for a given edition
pub fn census_subsystem(census: CensusYear) -> &'static Subsystem {
    match census {
        CensusYear::Y2000 => &*CENSO_2000,
        CensusYear::Y2010 => &*CENSO_2010,
        CensusYear::Y2022 => &*CENSO_2022,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_qualified_table() {
        assert_eq!(SIM.qualified_table(), "`basedosdados.br_ms_sim.microdados`");
        assert_eq!(
            SINASC.qualified_table(),
            "`basedosdados.br_ms_sinasc.microdados`"
        );
    }

    #[test]
    fn test_census_subsystem() {
        assert_eq!(census_subsystem(CensusYear::Y2010).name, "CENSO2010");
        assert!(census_subsystem(CensusYear::Y2000).table.ends_with("_2000"));
        assert!(census_subsystem(CensusYear::Y2022).table.starts_with("br_ibge_censo_2022"));
        assert_eq!(
            CENSO_2022_DOMICILIOS.qualified_table(),
            "`basedosdados.br_ibge_censo_2022.domicilio_morador_municipio`"
        );
    }
}
