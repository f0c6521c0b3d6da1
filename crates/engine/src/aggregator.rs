use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::future::Future;
use std::sync::Mutex;
use std::time::Duration;
use thiserror::Error;

use saldo_core::config::AggregatorConfig;
use saldo_import::{ProviderAccount, ProviderBoleto, ProviderTransaction};

/// Transactions requested per page.
pub const PAGE_SIZE: usize = 500;

const MAX_PAGES: u32 = 1_000;

#[derive(Debug, Error)]
pub enum AggregatorError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Aggregator returned status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("Provider account {0} not found in item")]
    AccountNotFound(String),
    #[error("Aggregator unavailable: {0}")]
    Unavailable(String),
    #[error("Aggregator kept returning pages after {0} requests")]
    TooManyPages(u32),
}

/// Read side of the Open-Finance style aggregator.
#[async_trait]
pub trait AggregatorClient: Send + Sync {
    async fn accounts(&self, item_id: &str) -> Result<Vec<ProviderAccount>, AggregatorError>;

    async fn transactions(
        &self,
        provider_account_id: &str,
    ) -> Result<Vec<ProviderTransaction>, AggregatorError>;

    /// DDA boletos registered against the item.
    async fn boletos(&self, item_id: &str) -> Result<Vec<ProviderBoleto>, AggregatorError>;
}

// ── Paging ────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    #[serde(default = "Vec::new")]
    pub results: Vec<T>,
    #[serde(default)]
    pub total_pages: Option<u32>,
}

/// Requests pages from 1 until the provider says there are no more: the
/// reported page count is reached, or a page comes back short or empty.
pub async fn collect_pages<T, F, Fut>(page_size: usize, mut fetch: F) -> Result<Vec<T>, AggregatorError>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<Page<T>, AggregatorError>>,
{
    let mut all = Vec::new();
    for page in 1..=MAX_PAGES {
        let batch = fetch(page).await?;
        let count = batch.results.len();
        all.extend(batch.results);
        let last = match batch.total_pages {
            Some(total) => page >= total,
            None => count < page_size,
        };
        if count == 0 || last {
            return Ok(all);
        }
    }
    Err(AggregatorError::TooManyPages(MAX_PAGES))
}

// ── Webhook payload ───────────────────────────────────────────────────────────

pub const TRANSACTIONS_CREATED: &str = "TRANSACTIONS_CREATED";
pub const ITEM_UPDATED: &str = "ITEM_UPDATED";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookEvent {
    pub event: String,
    pub item_id: String,
}

impl WebhookEvent {
    /// Only new transactions and item refreshes trigger a sync.
    pub fn is_actionable(&self) -> bool {
        matches!(self.event.as_str(), TRANSACTIONS_CREATED | ITEM_UPDATED)
    }
}

// ── Mock client (always available, used for tests) ────────────────────────────

/// In-memory aggregator keyed by provider account id.
#[derive(Default)]
pub struct MockAggregator {
    accounts: Vec<ProviderAccount>,
    transactions: HashMap<String, Vec<ProviderTransaction>>,
    boletos: Vec<ProviderBoleto>,
    failure: Option<String>,
    boleto_failure: Option<String>,
    page_size: Option<usize>,
    delay: Option<Duration>,
    calls: Mutex<Vec<String>>,
}

impl MockAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_account(mut self, account: ProviderAccount, txs: Vec<ProviderTransaction>) -> Self {
        self.transactions.insert(account.id.clone(), txs);
        self.accounts.push(account);
        self
    }

    pub fn with_boletos(mut self, boletos: Vec<ProviderBoleto>) -> Self {
        self.boletos = boletos;
        self
    }

    /// Serves transactions in pages of `size`, the way the HTTP client reads them.
    pub fn paged(mut self, size: usize) -> Self {
        self.page_size = Some(size);
        self
    }

    /// Every request stalls for `delay` before answering.
    pub fn delayed(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn failing_boletos(mut self, message: impl Into<String>) -> Self {
        self.boleto_failure = Some(message.into());
        self
    }

    pub fn failing(message: impl Into<String>) -> Self {
        Self {
            failure: Some(message.into()),
            ..Self::default()
        }
    }

    /// Requests seen so far, as `accounts:<item>`, `transactions:<account>`
    /// or `boletos:<item>`.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    async fn record(&self, call: String) -> Result<(), AggregatorError> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(call);
        }
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        match &self.failure {
            Some(message) => Err(AggregatorError::Unavailable(message.clone())),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl AggregatorClient for MockAggregator {
    async fn accounts(&self, item_id: &str) -> Result<Vec<ProviderAccount>, AggregatorError> {
        self.record(format!("accounts:{item_id}")).await?;
        Ok(self.accounts.clone())
    }

    async fn transactions(
        &self,
        provider_account_id: &str,
    ) -> Result<Vec<ProviderTransaction>, AggregatorError> {
        self.record(format!("transactions:{provider_account_id}")).await?;
        let all = self
            .transactions
            .get(provider_account_id)
            .map(Vec::as_slice)
            .unwrap_or_default();
        let Some(size) = self.page_size.filter(|s| *s > 0) else {
            return Ok(all.to_vec());
        };
        collect_pages(size, |page| {
            let start = (page as usize - 1) * size;
            let results = all.iter().skip(start).take(size).cloned().collect();
            async move { Ok(Page { results, total_pages: None }) }
        })
        .await
    }

    async fn boletos(&self, item_id: &str) -> Result<Vec<ProviderBoleto>, AggregatorError> {
        self.record(format!("boletos:{item_id}")).await?;
        match &self.boleto_failure {
            Some(message) => Err(AggregatorError::Unavailable(message.clone())),
            None => Ok(self.boletos.clone()),
        }
    }
}

// ── HTTP client ───────────────────────────────────────────────────────────────

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct AuthRequest<'a> {
    client_id: &'a str,
    client_secret: &'a str,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AuthResponse {
    api_key: String,
}

/// Talks to the aggregator REST API. Every call authenticates first with
/// the configured client credentials and sends the key as `X-API-KEY`.
pub struct HttpAggregator {
    client: Client,
    config: AggregatorConfig,
}

impl HttpAggregator {
    /// Each HTTP request, body included, must finish within `timeout`.
    pub fn new(config: AggregatorConfig, timeout: Duration) -> Result<Self, AggregatorError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { client, config })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.config.base_url.trim_end_matches('/'), path)
    }

    async fn api_key(&self) -> Result<String, AggregatorError> {
        let response = self
            .client
            .post(self.url("auth"))
            .json(&AuthRequest {
                client_id: &self.config.client_id,
                client_secret: &self.config.client_secret,
            })
            .send()
            .await?;
        let auth: AuthResponse = check(response).await?.json().await?;
        Ok(auth.api_key)
    }

    async fn get_page<T: serde::de::DeserializeOwned>(
        &self,
        key: &str,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<Page<T>, AggregatorError> {
        let response = self
            .client
            .get(self.url(path))
            .header("X-API-KEY", key)
            .query(query)
            .send()
            .await?;
        Ok(check(response).await?.json().await?)
    }

    async fn get_results<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<Vec<T>, AggregatorError> {
        let key = self.api_key().await?;
        Ok(self.get_page(&key, path, query).await?.results)
    }
}

async fn check(response: reqwest::Response) -> Result<reqwest::Response, AggregatorError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(AggregatorError::Status {
        status: status.as_u16(),
        body,
    })
}

#[async_trait]
impl AggregatorClient for HttpAggregator {
    async fn accounts(&self, item_id: &str) -> Result<Vec<ProviderAccount>, AggregatorError> {
        self.get_results("accounts", &[("itemId", item_id.to_string())]).await
    }

    async fn transactions(
        &self,
        provider_account_id: &str,
    ) -> Result<Vec<ProviderTransaction>, AggregatorError> {
        let key = self.api_key().await?;
        let key = key.as_str();
        collect_pages(PAGE_SIZE, |page| async move {
            let query = [
                ("accountId", provider_account_id.to_string()),
                ("pageSize", PAGE_SIZE.to_string()),
                ("page", page.to_string()),
            ];
            self.get_page(key, "transactions", &query).await
        })
        .await
    }

    async fn boletos(&self, item_id: &str) -> Result<Vec<ProviderBoleto>, AggregatorError> {
        self.get_results("boletos", &[("itemId", item_id.to_string())]).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provider_account(id: &str, balance: f64) -> ProviderAccount {
        ProviderAccount {
            id: id.to_string(),
            balance,
            name: None,
            kind: None,
        }
    }

    fn numbered(count: usize) -> Vec<u32> {
        (0..count as u32).collect()
    }

    #[test]
    fn webhook_events_filtering() {
        let event: WebhookEvent =
            serde_json::from_str(r#"{"event":"TRANSACTIONS_CREATED","itemId":"item-1"}"#).unwrap();
        assert_eq!(event.item_id, "item-1");
        assert!(event.is_actionable());

        let updated = WebhookEvent { event: ITEM_UPDATED.into(), item_id: "x".into() };
        assert!(updated.is_actionable());

        let other = WebhookEvent { event: "ITEM_LOGIN_ERROR".into(), item_id: "x".into() };
        assert!(!other.is_actionable());
    }

    #[tokio::test]
    async fn mock_serves_accounts_and_transactions() {
        let mock = MockAggregator::new().with_account(provider_account("acc-1", 10.5), vec![]);

        let accounts = mock.accounts("item-1").await.unwrap();
        assert_eq!(accounts.len(), 1);
        assert!(mock.transactions("acc-1").await.unwrap().is_empty());
        assert!(mock.transactions("unknown").await.unwrap().is_empty());
        assert_eq!(mock.calls(), vec!["accounts:item-1", "transactions:acc-1", "transactions:unknown"]);
    }

    #[tokio::test]
    async fn failing_mock_reports_unavailable() {
        let mock = MockAggregator::failing("maintenance");
        assert!(matches!(
            mock.accounts("item-1").await,
            Err(AggregatorError::Unavailable(m)) if m == "maintenance"
        ));
    }

    #[test]
    fn http_urls_join_cleanly() {
        let http = HttpAggregator::new(
            AggregatorConfig {
                base_url: "https://api.example.test/".into(),
                client_id: "id".into(),
                client_secret: "secret".into(),
            },
            Duration::from_secs(5),
        )
        .unwrap();
        assert_eq!(http.url("accounts"), "https://api.example.test/accounts");
    }

    // ── paging ────────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn short_page_ends_the_walk() {
        let rows = numbered(1_201);
        let requested = Mutex::new(Vec::new());
        let all = collect_pages(500, |page| {
            requested.lock().unwrap().push(page);
            let start = (page as usize - 1) * 500;
            let results = rows.iter().skip(start).take(500).copied().collect();
            async move { Ok(Page { results, total_pages: None }) }
        })
        .await
        .unwrap();
        assert_eq!(all, rows);
        assert_eq!(*requested.lock().unwrap(), vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn reported_page_count_is_honoured() {
        let all = collect_pages(2, |page| async move {
            Ok(Page { results: vec![page, page], total_pages: Some(2) })
        })
        .await
        .unwrap();
        assert_eq!(all, vec![1, 1, 2, 2]);

        // a full last page needs one more empty request to be sure
        let exact = collect_pages(2, |page| async move {
            let results = if page <= 2 { vec![page, page] } else { Vec::new() };
            Ok(Page { results, total_pages: None })
        })
        .await
        .unwrap();
        assert_eq!(exact.len(), 4);
    }

    #[tokio::test]
    async fn page_error_aborts_the_walk() {
        let result: Result<Vec<u32>, _> = collect_pages(1, |page| async move {
            if page == 2 {
                Err(AggregatorError::Unavailable("page 2".into()))
            } else {
                Ok(Page { results: vec![page], total_pages: None })
            }
        })
        .await;
        assert!(matches!(result, Err(AggregatorError::Unavailable(_))));
    }

    #[tokio::test]
    async fn endless_pages_are_cut_off() {
        let result: Result<Vec<u32>, _> = collect_pages(1, |page| async move {
            Ok(Page { results: vec![page], total_pages: None })
        })
        .await;
        assert!(matches!(result, Err(AggregatorError::TooManyPages(MAX_PAGES))));
    }

    #[tokio::test]
    async fn paged_mock_returns_every_transaction() {
        let txs: Vec<ProviderTransaction> = (0..7)
            .map(|i| ProviderTransaction {
                id: format!("t-{i}"),
                account_id: None,
                date: "2024-03-01".into(),
                description: format!("PIX {i}"),
                amount: 1.0,
                balance: None,
                status: None,
                category: None,
                kind: None,
            })
            .collect();
        let mock = MockAggregator::new().with_account(provider_account("acc-1", 0.0), txs).paged(3);
        assert_eq!(mock.transactions("acc-1").await.unwrap().len(), 7);
    }
}
