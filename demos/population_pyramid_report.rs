use anyhow::{Context, Result};
use arrow::util::pretty::pretty_format_batches;
use data_client::BigQueryService;
use etl_pipeline::DemographyPipeline;
use shared::errors::DemographyError;
use shared::models::config::DemographyConfig;
use shared::models::date_utils::CensusYear;

// Usage: population_pyramid_report <config.json> [municipality ids...]
#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();

    let mut args = std::env::args().skip(1);
    let config_path = args
        .next()
        .context("usage: population_pyramid_report <config.json> [municipality ids...]")?;
    let mut ids: Vec<String> = args.collect();
    if ids.is_empty() {
        ids.push("3550308".to_string()); // São Paulo
    }

    let config = DemographyConfig::from_json_file(&config_path)?;
    let service = BigQueryService::from_config(&config)?;
    let pipeline = DemographyPipeline::new(service, &config)?;

    println!("🚀 Building demographic tables for {}", ids.join(", "));

    let mut censuses = Vec::new();
    for census in CensusYear::ALL {
        if config.taxonomies.pyramid(census).is_some() {
            censuses.push(census);
        }
    }

    if !censuses.is_empty() {
        println!("\n=== Population pyramid ===");
        match pipeline.population_pyramid_series(&ids, &censuses).await {
            Ok(pyramid) => println!("{}", pretty_format_batches(&[pyramid.to_record_batch()?])?),
            Err(e) if e.is_service_failure() => eprintln!("❌ {e}"),
            Err(e @ DemographyError::SchemaMismatch(_)) => eprintln!("❌ {e}"),
            Err(e) => return Err(e.into()),
        }
    }

    if config.taxonomies.deaths.is_some() {
        println!("\n=== Deaths by year ===");
        match pipeline.deaths_by_year(&ids, Some(2018), Some(2022)).await {
            Ok(deaths) => {
                println!("{}", pretty_format_batches(&[deaths.to_record_batch()?])?);
                for (year, total) in deaths.year_totals() {
                    println!("  {year}: {total}");
                }
            }
            Err(e) if e.is_service_failure() => eprintln!("❌ {e}"),
            Err(e @ DemographyError::SchemaMismatch(_)) => eprintln!("❌ {e}"),
            Err(e) => return Err(e.into()),
        }
    }

    println!("\n=== Total population (2010) ===");
    for (id, population) in pipeline.total_population(&ids, CensusYear::Y2010).await? {
        println!("  {id}: {population:.0}");
    }

    println!("\n=== Residents per dwelling (2022) ===");
    for occupancy in pipeline.dwelling_occupancy(&ids).await? {
        match occupancy.residents_per_dwelling {
            Some(ratio) => println!(
                "  {}: {ratio} ({:.0} residents / {:.0} dwellings)",
                occupancy.municipality, occupancy.residents, occupancy.dwellings
            ),
            None => println!("  {}: no occupied dwellings", occupancy.municipality),
        }
    }

    println!("\n✅ Done");
    Ok(())
}
