use anyhow::{anyhow, bail, Context as _, Result};
use serde::Serialize;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use saldo_core::{AccountId, EngineConfig, RawStatementFile, SettlementBatch, StatementFormat, UserId};
use saldo_engine::{HttpAggregator, IngestSource, SyncCoordinator, WebhookEvent};
use saldo_extract::HttpBackend;
use saldo_import::KeywordDictionary;
use saldo_storage::SqliteStore;

pub struct Context {
    pub config: EngineConfig,
    pub coordinator: SyncCoordinator<SqliteStore>,
}

impl Context {
    pub async fn load(config_path: &Path) -> Result<Self> {
        let config = EngineConfig::load(config_path)
            .with_context(|| format!("Failed to load {}", config_path.display()))?;
        let store = SqliteStore::open(&config.database)
            .await
            .with_context(|| format!("Failed to open database {}", config.database.display()))?;

        let mut coordinator = SyncCoordinator::new(store, &config);
        if let Some(path) = &config.categorization.keywords_file {
            coordinator = coordinator.with_keywords(load_keywords(path)?);
        }
        if let Some(extraction) = &config.extraction {
            let backend = HttpBackend::new(extraction.clone(), request_timeout(&config))
                .context("Failed to build the extraction client")?;
            coordinator = coordinator.with_extractor(Box::new(backend));
        }
        tracing::info!(database = %config.database.display(), "Loaded configuration");
        Ok(Self { config, coordinator })
    }

    fn aggregator(&self) -> Result<HttpAggregator> {
        HttpAggregator::new(self.config.aggregator()?.clone(), request_timeout(&self.config))
            .context("Failed to build the aggregator client")
    }
}

fn request_timeout(config: &EngineConfig) -> Duration {
    Duration::from_secs(config.sync.timeout_secs)
}

fn load_keywords(path: &Path) -> Result<KeywordDictionary> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read keywords file {}", path.display()))?;
    KeywordDictionary::from_toml(&content).map_err(|e| anyhow!("{}: {e}", path.display()))
}

/// Explicit `--format` wins; otherwise the extension decides.
pub fn statement_format(file: &Path, explicit: Option<&str>) -> Result<StatementFormat> {
    if let Some(format) = explicit {
        return StatementFormat::from_str(format).map_err(|e| anyhow!(e));
    }
    let ext = file
        .extension()
        .and_then(|e| e.to_str())
        .ok_or_else(|| anyhow!("{} has no extension; pass --format", file.display()))?;
    match StatementFormat::from_extension(ext) {
        Some(format) => Ok(format),
        None => bail!("Unsupported file extension '.{ext}' (expected .csv, .ofx or .pdf)"),
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

pub async fn import(ctx: &Context, file: &Path, account: i64, format: Option<&str>) -> Result<()> {
    let format = statement_format(file, format)?;
    let bytes = std::fs::read(file).with_context(|| format!("Failed to read {}", file.display()))?;
    let report = ctx
        .coordinator
        .ingest_with_timeout(
            IngestSource::ManualFile(RawStatementFile::new(bytes, format)),
            AccountId(account),
            std::time::Duration::from_secs(ctx.config.sync.timeout_secs),
        )
        .await
        .with_context(|| format!("Import of {} failed", file.display()))?;
    print_json(&report)
}

pub async fn sync(ctx: &Context, account: i64) -> Result<()> {
    let client = ctx.aggregator()?;
    let report = ctx
        .coordinator
        .pull_account(&client, AccountId(account))
        .await
        .with_context(|| format!("Sync of account {account} failed"))?;
    print_json(&report)
}

pub async fn webhook(ctx: &Context, payload: &Path) -> Result<()> {
    let raw = std::fs::read_to_string(payload)
        .with_context(|| format!("Failed to read {}", payload.display()))?;
    let event: WebhookEvent = serde_json::from_str(&raw).context("Invalid webhook payload")?;
    let client = ctx.aggregator()?;
    let outcome = ctx.coordinator.handle_webhook(&client, &event).await?;
    print_json(&outcome)
}

pub async fn settle(ctx: &Context, user: i64, batch: &Path) -> Result<()> {
    let raw = std::fs::read_to_string(batch)
        .with_context(|| format!("Failed to read {}", batch.display()))?;
    let batch: SettlementBatch = serde_json::from_str(&raw).context("Invalid settlement batch")?;
    let receipt = saldo_engine::settle(ctx.coordinator.store(), UserId(user), &batch).await?;
    print_json(&receipt)
}

pub async fn categorize(ctx: &Context, user: i64) -> Result<()> {
    let report = ctx.coordinator.recategorize(UserId(user)).await?;
    print_json(&report)
}
