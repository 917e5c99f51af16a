use anyhow::{bail, Context, Result};
use std::env;
use std::path::Path;

use neighborhood_resolver::config::{init_logging, Config};
use neighborhood_resolver::{
    insert_municipalities, insert_neighborhoods, load_municipalities_csv, load_neighborhoods_csv,
    Catalog, Municipality, RawAddressSignal, ResolutionRequest, Resolver, SqliteCatalog,
};

const USAGE: &str = "\
Usage:
  neighborhood-resolver import <municipalities.csv> <neighborhoods.csv>
  neighborhood-resolver resolve [--lat <deg> --lon <deg>] [--city <text>]
                                [--neighborhood <text>] [--road <text>]
                                [--house-number <text>] [--postal-code <text>]
  neighborhood-resolver list";

fn main() -> Result<()> {
    let _ = dotenvy::dotenv();
    let config = Config::load()?;
    init_logging(&config.log_filter);

    let args: Vec<String> = env::args().skip(1).collect();

    match args.first().map(String::as_str) {
        Some("import") => run_import(&config, &args[1..]),
        Some("resolve") => run_resolve(&config, &args[1..]),
        Some("list") => run_list(&config),
        _ => {
            eprintln!("{}", USAGE);
            std::process::exit(2);
        }
    }
}

fn run_import(config: &Config, args: &[String]) -> Result<()> {
    let [municipalities_csv, neighborhoods_csv] = args else {
        bail!("import expects two CSV paths\n{}", USAGE);
    };

    println!("🗄️  Catalog import → {:?}", config.database_path);
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    let catalog = SqliteCatalog::open(&config.database_path)?;

    println!("\n📂 Loading municipalities...");
    let municipalities: Vec<Municipality> = load_municipalities_csv(Path::new(municipalities_csv))?
        .into_iter()
        .map(Municipality::from)
        .collect();
    let stats = catalog.with_connection(|conn| insert_municipalities(conn, &municipalities))?;
    println!("✓ Inserted: {} municipalities", stats.inserted);
    println!("✓ Skipped duplicates: {}", stats.duplicates);

    println!("\n📂 Loading neighborhoods...");
    let rows = load_neighborhoods_csv(Path::new(neighborhoods_csv))?;
    let stats = catalog.with_connection(|conn| insert_neighborhoods(conn, &rows))?;
    println!("✓ Inserted: {} neighborhoods", stats.inserted);
    println!("✓ Skipped duplicates: {}", stats.duplicates);
    if stats.skipped > 0 {
        println!("⚠️  Unknown municipality: {} rows", stats.skipped);
    }

    Ok(())
}

fn run_resolve(config: &Config, args: &[String]) -> Result<()> {
    let request = parse_resolve_args(args)?;
    let catalog = SqliteCatalog::open(&config.database_path)?;
    let resolver = Resolver::new(&catalog);

    let resolution = resolver.resolve(&request);
    if let Err(e) = catalog.record(&request, &resolution) {
        tracing::warn!(error = %e, "failed to record resolution event");
    }

    println!("{}", serde_json::to_string_pretty(&resolution)?);
    Ok(())
}

fn run_list(config: &Config) -> Result<()> {
    let catalog = SqliteCatalog::open(&config.database_path)?;

    for municipality in catalog.list_active_municipalities()? {
        let neighborhoods = catalog.list_active_neighborhoods(&municipality.id)?;
        println!("🏛️  {} ({} neighborhoods)", municipality.name, neighborhoods.len());
        for neighborhood in neighborhoods {
            if neighborhood.area.is_empty() {
                println!("    • {}", neighborhood.name);
            } else {
                println!("    • {} [{}]", neighborhood.name, neighborhood.area);
            }
        }
    }

    Ok(())
}

fn parse_resolve_args(args: &[String]) -> Result<ResolutionRequest> {
    let mut request = ResolutionRequest::from_address(RawAddressSignal::default());
    let mut iter = args.iter();

    while let Some(flag) = iter.next() {
        let value = iter
            .next()
            .with_context(|| format!("missing value for {}", flag))?;

        match flag.as_str() {
            "--lat" => request.latitude = Some(value.parse().context("invalid --lat")?),
            "--lon" => request.longitude = Some(value.parse().context("invalid --lon")?),
            "--city" => request.address.raw_city = value.clone(),
            "--neighborhood" => request.address.raw_neighborhood = value.clone(),
            "--road" => request.address.raw_road = value.clone(),
            "--house-number" => request.address.house_number = Some(value.clone()),
            "--postal-code" => request.address.postal_code = Some(value.clone()),
            other => bail!("unknown flag {}\n{}", other, USAGE),
        }
    }

    Ok(request)
}
