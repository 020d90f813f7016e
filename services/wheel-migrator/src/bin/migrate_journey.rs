//! Enriches phases and steps and folds legacy challenges into steps.
use anyhow::Result;
use wheel_migration::Stage;

#[tokio::main]
async fn main() -> Result<()> {
    wheel_migrator::init_tracing();
    wheel_migrator::run(&[Stage::Phases, Stage::Steps, Stage::Challenges]).await?;
    Ok(())
}
