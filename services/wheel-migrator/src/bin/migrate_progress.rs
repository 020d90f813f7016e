//! Moves legacy company progress into the unified progress table.
use anyhow::Result;
use wheel_migration::Stage;

#[tokio::main]
async fn main() -> Result<()> {
    wheel_migrator::init_tracing();
    wheel_migrator::run(&[Stage::Progress]).await?;
    Ok(())
}
