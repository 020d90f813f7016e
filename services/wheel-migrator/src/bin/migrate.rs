//! Runs all five stages followed by verification.
use anyhow::Result;
use wheel_migration::Stage;

#[tokio::main]
async fn main() -> Result<()> {
    wheel_migrator::init_tracing();
    wheel_migrator::run(&Stage::ALL).await?;
    Ok(())
}
