use anyhow::Context;
use clap::Parser;
use guard_gateway::utils::{logger, validation::Validate};
use guard_gateway::{adapters, server, Analyzer, BatchCoordinator, GatewayConfig};
use std::sync::Arc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = GatewayConfig::parse();

    // 初始化日誌
    logger::init_logger(config.verbose, config.json_logs);

    tracing::info!("Starting guard-gateway");
    if config.verbose {
        tracing::debug!("CLI config: {:?}", config);
    }

    // 解析並驗證配置，任何錯誤都在啟動時中止
    let settings = config.resolve().context("failed to load configuration")?;
    if let Err(e) = settings.validate() {
        tracing::error!("❌ Configuration validation failed: {}", e);
        return Err(e).context("invalid configuration");
    }

    let backend = adapters::build_backend(&settings).context("failed to construct backend")?;
    let analyzer = Analyzer::new(backend, settings.options.clone(), settings.score_table.clone());
    let coordinator = Arc::new(BatchCoordinator::new(
        Arc::new(analyzer),
        settings.max_concurrency,
    ));

    let addr = config.bind_address();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;

    server::serve(listener, coordinator).await?;

    tracing::info!("✅ Server stopped");
    Ok(())
}
