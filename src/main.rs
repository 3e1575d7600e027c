use anyhow::Result;

#[tokio::main]
async fn main() -> Result<()> {
    pagewarden_cli::cli::app::run().await
}
