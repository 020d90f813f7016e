use anyhow::Result;

#[tokio::main]
async fn main() -> Result<()> {
    wheel_migrator::init_tracing();
    wheel_migrator::verify_only().await
}
