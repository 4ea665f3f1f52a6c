//! Single-pass sync: fetch the company listing, then append unseen companies to the ledger.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, info_span, Instrument, Span};
use uuid::Uuid;
use ycl_core::CompanyRecord;
use ycl_storage::{HttpClientConfig, HttpFetcher, LedgerFile};

pub const CRATE_NAME: &str = "ycl-sync";

pub const DEFAULT_API_URL: &str = "https://yc-oss.github.io/api/companies/all.json";
pub const DEFAULT_LEDGER_PATH: &str = "yc_companies_master.csv";
pub const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 60;

#[derive(Debug, Clone)]
pub struct SyncConfig {
    pub api_url: String,
    pub ledger_path: PathBuf,
    pub http_timeout_secs: u64,
    pub user_agent: String,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            ledger_path: PathBuf::from(DEFAULT_LEDGER_PATH),
            http_timeout_secs: DEFAULT_HTTP_TIMEOUT_SECS,
            user_agent: format!("ycl-bot/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

/// Where the full company listing comes from.
#[async_trait]
pub trait CompanySource: Send + Sync {
    async fn fetch_companies(&self) -> Result<Vec<CompanyRecord>>;
}

pub struct HttpCompanySource {
    http: HttpFetcher,
    url: String,
}

impl HttpCompanySource {
    pub fn new(http: HttpFetcher, url: impl Into<String>) -> Self {
        Self {
            http,
            url: url.into(),
        }
    }
}

#[async_trait]
impl CompanySource for HttpCompanySource {
    async fn fetch_companies(&self) -> Result<Vec<CompanyRecord>> {
        self.http
            .fetch_companies(&self.url)
            .await
            .with_context(|| format!("fetching company listing from {}", self.url))
    }
}

/// Predicate applied between fetch and append.
pub trait RecordFilter: Send + Sync {
    fn keep(&self, record: &CompanyRecord) -> bool;
}

#[derive(Default)]
pub struct AcceptAll;

impl RecordFilter for AcceptAll {
    fn keep(&self, _record: &CompanyRecord) -> bool {
        true
    }
}

/// Keeps companies whose stage equals `stage`, ignoring case and surrounding whitespace.
pub struct StageFilter {
    stage: String,
}

impl StageFilter {
    pub fn new(stage: impl Into<String>) -> Self {
        Self {
            stage: stage.into().trim().to_lowercase(),
        }
    }
}

impl RecordFilter for StageFilter {
    fn keep(&self, record: &CompanyRecord) -> bool {
        record
            .stage
            .as_deref()
            .is_some_and(|stage| stage.trim().to_lowercase() == self.stage)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SyncRunSummary {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub fetched_records: usize,
    pub filtered_out: usize,
    pub known_ids: usize,
    pub appended: usize,
    pub skipped_known: usize,
    pub skipped_missing_id: usize,
    pub ledger_created: bool,
    pub ledger_path: String,
}

impl SyncRunSummary {
    pub fn summary_line(&self) -> String {
        format!("Appended {} new companies.", self.appended)
    }
}

pub struct SyncPipeline {
    ledger: LedgerFile,
    source: Box<dyn CompanySource>,
    filter: Box<dyn RecordFilter>,
}

impl SyncPipeline {
    pub fn new(config: SyncConfig) -> Result<Self> {
        let http = HttpFetcher::new(HttpClientConfig {
            timeout: Duration::from_secs(config.http_timeout_secs),
            user_agent: Some(config.user_agent.clone()),
        })?;
        Ok(Self {
            ledger: LedgerFile::new(config.ledger_path),
            source: Box::new(HttpCompanySource::new(http, config.api_url)),
            filter: Box::<AcceptAll>::default(),
        })
    }

    pub fn with_source(mut self, source: Box<dyn CompanySource>) -> Self {
        self.source = source;
        self
    }

    pub fn with_filter(mut self, filter: Box<dyn RecordFilter>) -> Self {
        self.filter = filter;
        self
    }

    pub fn ledger(&self) -> &LedgerFile {
        &self.ledger
    }

    pub async fn run_once(&self) -> Result<SyncRunSummary> {
        let run_id = Uuid::new_v4();
        let span = info_span!("sync_run", %run_id, ledger = %self.ledger.path().display());
        self.run_steps(run_id).instrument(span).await
    }

    async fn run_steps(&self, run_id: Uuid) -> Result<SyncRunSummary> {
        let started_at = Utc::now();

        // The ledger is not touched until the listing is fully in hand.
        let companies = self.source.fetch_companies().await?;
        let fetched_records = companies.len();
        let companies: Vec<_> = companies
            .into_iter()
            .filter(|record| self.filter.keep(record))
            .collect();
        let filtered_out = fetched_records - companies.len();

        let ledger = self.ledger.clone();
        let span = Span::current();
        let (known_ids, outcome) = tokio::task::spawn_blocking(move || -> Result<_> {
            let _guard = span.enter();
            let known = ledger.load_existing_ids()?;
            let known_ids = known.len();
            let outcome = ledger.append_new(&companies, known)?;
            Ok((known_ids, outcome))
        })
        .await
        .context("joining ledger update task")??;

        let finished_at = Utc::now();
        info!(
            fetched_records,
            filtered_out,
            known_ids,
            appended = outcome.appended,
            skipped_known = outcome.skipped_known,
            skipped_missing_id = outcome.skipped_missing_id,
            "sync complete"
        );

        Ok(SyncRunSummary {
            run_id,
            started_at,
            finished_at,
            fetched_records,
            filtered_out,
            known_ids,
            appended: outcome.appended,
            skipped_known: outcome.skipped_known,
            skipped_missing_id: outcome.skipped_missing_id,
            ledger_created: outcome.created,
            ledger_path: self.ledger.path().display().to_string(),
        })
    }
}

/// Run one sync against the public listing and the default ledger path.
pub async fn run_sync_once() -> Result<SyncRunSummary> {
    let pipeline = SyncPipeline::new(SyncConfig::default())?;
    pipeline.run_once().await
}
