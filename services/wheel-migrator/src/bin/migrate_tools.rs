//! Splits legacy step tools into tools and step links.
use anyhow::Result;
use wheel_migration::Stage;

#[tokio::main]
async fn main() -> Result<()> {
    wheel_migrator::init_tracing();
    wheel_migrator::run(&[Stage::Tools]).await?;
    Ok(())
}
