use anyhow::{Context, Result};
use colored::*;
use tracing::info;
use tracing_subscriber::EnvFilter;
use wheel_common::{load_dotenv, EnvVars};
use wheel_database::{DatabaseEnv, PgBackend};
use wheel_migration::{
    verify, MigrationConfig, MigrationReport, MigrationStats, Orchestrator, Stage,
};

/// Installs the fmt subscriber; `RUST_LOG` overrides the default `info` level.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = tracing_subscriber::FmtSubscriber::builder()
        .with_env_filter(filter)
        .finish();
    if tracing::subscriber::set_global_default(subscriber).is_err() {
        eprintln!("{}", "tracing subscriber already installed".yellow());
    }
}

async fn connect() -> Result<(PgBackend, MigrationConfig)> {
    load_dotenv();
    let config = MigrationConfig::load().context("Invalid migration configuration")?;
    let db_env = DatabaseEnv::load().context("Missing database configuration")?;

    let backend = PgBackend::connect(&db_env.database_url)
        .await
        .context("Failed to connect to database")?;
    backend.check_health().await.context("Database health check failed")?;
    Ok((backend, config))
}

/// Runs `stages` against the configured database, prints the report and
/// optionally writes it to `MIGRATION_REPORT_PATH`.
pub async fn run(stages: &[Stage]) -> Result<MigrationReport> {
    let (backend, config) = connect().await?;

    let names: Vec<&str> = stages.iter().map(Stage::as_str).collect();
    info!(
        "Starting migration of stages [{}] (batch size {}, force {})",
        names.join(", "),
        config.effective_batch_size(),
        config.force
    );

    let orchestrator = Orchestrator::new(&backend, &config);
    orchestrator
        .preflight(stages)
        .await
        .context("Preflight check failed, no data was changed")?;

    let report = orchestrator.run(stages).await;
    report.print();

    if let Some(path) = &config.report_path {
        report
            .write_json(path)
            .with_context(|| format!("Failed to write report to {}", path.display()))?;
        info!("Report written to {}", path.display());
    }
    Ok(report)
}

/// Prints current target row counts without running any stage.
pub async fn verify_only() -> Result<()> {
    let (backend, config) = connect().await?;
    let verification = verify(&backend, &config.tables, &MigrationStats::new()).await;

    for entry in &verification.entries {
        let count = entry
            .row_count
            .map(|c| c.to_string())
            .unwrap_or_else(|| "missing".to_string());
        println!(
            "{} {:<12} {:>8} rows in {}",
            "[INFO]".blue().bold(),
            entry.entity,
            count,
            entry.table
        );
    }
    for warning in &verification.warnings {
        println!("{} {}", "[WARNING]".yellow().bold(), warning);
    }
    if verification.is_consistent() {
        println!("{} All target tables are readable", "[SUCCESS]".green().bold());
    }
    Ok(())
}
