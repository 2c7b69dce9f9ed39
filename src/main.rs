#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dashboard_refresh::run().await
}
