use anyhow::Result;

#[tokio::main]
async fn main() -> Result<()> {
    soulbrowser_replay::cli::run().await
}
