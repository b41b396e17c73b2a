//! tabular-etl CLI - run the load phase, the enrichment jobs and registry checks
//!
//! Connection settings come from the environment (see `tabular_etl::config`).

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process;
use tabular_etl::enrichment::{self, EnrichmentJob};
use tabular_etl::{
    Database, EnrichmentRunner, EntityRegistry, EtlConfig, EtlProcess, MemoryStore, Sink,
    StepRegistry,
};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "tabular-etl")]
#[command(version, about = "Registry-driven ETL into an analytical Postgres store", long_about = None)]
struct Cli {
    /// Entity registry YAML (overrides ETL_REGISTRY; default: built-in registry)
    #[arg(short, long, global = true)]
    registry: Option<PathBuf>,

    /// Write into an in-memory sink instead of the target database
    #[arg(long, global = true)]
    dry_run: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Extract, transform and load entities (all registered ones when none are given)
    Run {
        /// Entity keys, e.g. `obr dca`
        keys: Vec<String>,
    },

    /// Run second-phase enrichment jobs (all of them when none are given)
    Enrich {
        /// invoice-link, project-code-deliveries, project-code-items, parent-code, allocation
        jobs: Vec<String>,
    },

    /// List registered entities and their custom steps
    List,

    /// Validate the entity registry without connecting anywhere
    Validate,

    /// Check that an entity's inserted directive rows exist in its target
    VerifyRows {
        /// Entity key
        key: String,
    },
}

fn main() {
    dotenv::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    let result = EtlConfig::from_env()
        .map_err(|e| e.to_string())
        .and_then(|config| {
            let registry = config
                .load_registry(cli.registry.as_deref())
                .map_err(|e| e.to_string())?;
            match cli.command {
                Commands::Run { keys } => run_entities(&config, &registry, &keys, cli.dry_run),
                Commands::Enrich { jobs } => run_enrichment(&config, &registry, &jobs, cli.dry_run),
                Commands::List => list_entities(&registry),
                Commands::Validate => validate_registry(&registry),
                Commands::VerifyRows { key } => verify_rows(&config, &registry, &key),
            }
        });

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

fn connect(url: Option<&str>, config: &EtlConfig, role: &str) -> Result<Database, String> {
    let url = url.ok_or_else(|| format!("no {} database URL configured", role))?;
    let db = Database::new_with_config(url, config.database_config())
        .map_err(|e| format!("cannot connect to {} database: {}", role, e))?;
    db.test_connection()
        .map_err(|e| format!("{} database is not reachable: {}", role, e))?;
    Ok(db)
}

fn target_sink(config: &EtlConfig, dry_run: bool) -> Result<Box<dyn Sink>, String> {
    if dry_run {
        println!("  ℹ Dry run: writing into an in-memory sink");
        return Ok(Box::new(MemoryStore::new()));
    }
    Ok(Box::new(connect(config.target_url.as_deref(), config, "target")?))
}

fn run_entities(
    config: &EtlConfig,
    registry: &EntityRegistry,
    keys: &[String],
    dry_run: bool,
) -> Result<(), String> {
    println!("🚚 Running load phase...");
    let source = connect(config.source_url.as_deref(), config, "source")?;
    let sink = target_sink(config, dry_run)?;
    let steps = StepRegistry::builtin();

    let report = EtlProcess::new(&source, sink.as_ref(), registry, &steps)
        .run(keys)
        .map_err(|e| e.to_string())?;

    for loaded in &report.loaded {
        println!("  ✓ {} -> {} ({} rows)", loaded.key, loaded.target, loaded.rows);
    }
    if !report.skipped.is_empty() {
        println!("  ℹ Skipped (no rows): {}", report.skipped.join(", "));
    }
    for failed in &report.failed {
        println!("  ✗ {}: {}", failed.key, failed.reason);
    }
    println!("✨ Run {} finished", report.run_id);

    if report.is_success() {
        Ok(())
    } else {
        Err(format!("{} entities failed", report.failed.len()))
    }
}

fn run_enrichment(
    config: &EtlConfig,
    registry: &EntityRegistry,
    names: &[String],
    dry_run: bool,
) -> Result<(), String> {
    println!("🔗 Running enrichment jobs...");
    let settings = config.allocation_settings();
    let jobs: Vec<Box<dyn EnrichmentJob>> = if names.is_empty() {
        enrichment::all_jobs(&settings)
    } else {
        names
            .iter()
            .map(|name| enrichment::job_by_name(name, &settings))
            .collect::<Result<_, _>>()
            .map_err(|e| e.to_string())?
    };
    let sink = target_sink(config, dry_run)?;

    let report = EnrichmentRunner::new(sink.as_ref(), registry).run(&jobs);

    for done in &report.completed {
        println!("  ✓ {} ({} rows)", done.job, done.rows);
    }
    for skipped in &report.not_run {
        println!("  ✗ {}: {}", skipped.job, skipped.reason);
    }
    println!("✨ Enrichment complete!");
    Ok(())
}

fn list_entities(registry: &EntityRegistry) -> Result<(), String> {
    let steps = StepRegistry::builtin();
    println!("📋 {} registered entities", registry.len());
    for entity in registry.entities() {
        let custom = if steps.has_steps(&entity.key) {
            " [custom steps]"
        } else {
            ""
        };
        println!("  {} : {} -> {}{}", entity.key, entity.source, entity.target, custom);
    }
    Ok(())
}

fn validate_registry(registry: &EntityRegistry) -> Result<(), String> {
    registry.validate().map_err(|e| e.to_string())?;
    println!("  ✓ Registry is valid ({} entities)", registry.len());
    Ok(())
}

fn verify_rows(config: &EtlConfig, registry: &EntityRegistry, key: &str) -> Result<(), String> {
    let rows = registry
        .directives(key)
        .map(|d| d.insert.clone())
        .unwrap_or_default();
    if rows.is_empty() {
        println!("  ℹ No insert directives for '{}'", key);
        return Ok(());
    }

    let target = registry.target_name(key);
    let sink = connect(config.target_url.as_deref(), config, "target")?;
    let missing = enrichment::verify_inserted_rows(&sink, &target, &rows).map_err(|e| e.to_string())?;

    if missing.is_empty() {
        println!("  ✓ All {} directive rows present in {}", rows.len(), target);
        Ok(())
    } else {
        for row in &missing {
            println!("  ✗ Missing in {}: {:?}", target, row);
        }
        Err(format!("{} directive rows missing", missing.len()))
    }
}
