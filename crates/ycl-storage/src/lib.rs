//! HTTP fetch utilities + the append-only CSV company ledger.

use std::collections::HashSet;
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, Read, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use csv::{ReaderBuilder, Terminator, WriterBuilder};
use reqwest::StatusCode;
use thiserror::Error;
use tracing::{debug, info, info_span, warn, Instrument};
use ycl_core::{CompanyRecord, LedgerRow, LEDGER_COLUMNS};

pub const CRATE_NAME: &str = "ycl-storage";

const UTF8_BOM: &[u8] = b"\xef\xbb\xbf";

#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    pub timeout: Duration,
    pub user_agent: Option<String>,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(60),
            user_agent: None,
        }
    }
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("http status {status} for {url}")]
    HttpStatus { status: u16, url: String },
    #[error("malformed company listing from {url}: {source}")]
    Decode {
        url: String,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Clone)]
pub struct FetchedResponse {
    pub status: StatusCode,
    pub final_url: String,
    pub body: Vec<u8>,
}

/// Single-shot HTTP reader. One request per call, no retries.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new(config: HttpClientConfig) -> anyhow::Result<Self> {
        let mut builder = reqwest::Client::builder()
            .gzip(true)
            .brotli(true)
            .timeout(config.timeout);

        if let Some(user_agent) = &config.user_agent {
            builder = builder.user_agent(user_agent.clone());
        }

        let client = builder.build().context("building reqwest client")?;
        Ok(Self { client })
    }

    pub async fn fetch_bytes(&self, url: &str) -> Result<FetchedResponse, FetchError> {
        let span = info_span!("http_fetch", url);
        self.get_once(url).instrument(span).await
    }

    async fn get_once(&self, url: &str) -> Result<FetchedResponse, FetchError> {
        let resp = self.client.get(url).send().await?;
        let status = resp.status();
        let final_url = resp.url().to_string();
        debug!(status = status.as_u16(), %final_url, "response received");

        if !status.is_success() {
            return Err(FetchError::HttpStatus {
                status: status.as_u16(),
                url: final_url,
            });
        }

        let body = resp.bytes().await?.to_vec();
        Ok(FetchedResponse {
            status,
            final_url,
            body,
        })
    }

    /// Fetch the full company listing: a JSON array of records.
    pub async fn fetch_companies(&self, url: &str) -> Result<Vec<CompanyRecord>, FetchError> {
        let response = self.fetch_bytes(url).await?;
        let companies: Vec<CompanyRecord> =
            serde_json::from_slice(&response.body).map_err(|source| FetchError::Decode {
                url: response.final_url.clone(),
                source,
            })?;
        info!(url, records = companies.len(), bytes = response.body.len(), "fetched company listing");
        Ok(companies)
    }
}

/// Result of one append pass over the ledger.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AppendOutcome {
    pub appended: usize,
    pub skipped_known: usize,
    pub skipped_missing_id: usize,
    /// The header was written by this pass.
    pub created: bool,
}

/// Append-only CSV ledger of company rows keyed by `id`.
#[derive(Debug, Clone)]
pub struct LedgerFile {
    path: PathBuf,
}

impl LedgerFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Collect every `id` already recorded. A missing file is an empty ledger.
    ///
    /// Rows without an id, short rows and rows the CSV parser rejects are
    /// skipped; only I/O failures are reported.
    pub fn load_existing_ids(&self) -> anyhow::Result<HashSet<String>> {
        let file = match File::open(&self.path) {
            Ok(file) => file,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "no ledger yet");
                return Ok(HashSet::new());
            }
            Err(err) => {
                return Err(err).with_context(|| format!("opening ledger {}", self.path.display()))
            }
        };

        let mut reader = ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_reader(file);
        let headers = reader
            .byte_headers()
            .with_context(|| format!("reading ledger header {}", self.path.display()))?
            .clone();
        let Some(id_index) = headers
            .iter()
            .position(|name| name.strip_prefix(UTF8_BOM).unwrap_or(name) == b"id")
        else {
            warn!(path = %self.path.display(), "ledger has no id column; treating as empty");
            return Ok(HashSet::new());
        };

        let mut ids = HashSet::new();
        let mut skipped = 0usize;
        for result in reader.byte_records() {
            let record = match result {
                Ok(record) => record,
                Err(err) if err.is_io_error() => {
                    return Err(err)
                        .with_context(|| format!("reading ledger {}", self.path.display()));
                }
                Err(err) => {
                    debug!(%err, "skipping unreadable ledger row");
                    skipped += 1;
                    continue;
                }
            };
            match record.get(id_index) {
                Some(raw) if !raw.is_empty() => {
                    ids.insert(String::from_utf8_lossy(raw).into_owned());
                }
                _ => skipped += 1,
            }
        }

        debug!(path = %self.path.display(), ids = ids.len(), skipped, "loaded ledger ids");
        Ok(ids)
    }

    /// Append one row per record whose id is not in `known`, in input order.
    ///
    /// Ids written during this pass join `known`, so a listing that repeats
    /// an id still yields a single row.
    pub fn append_new(
        &self,
        records: &[CompanyRecord],
        mut known: HashSet<String>,
    ) -> anyhow::Result<AppendOutcome> {
        let mut outcome = AppendOutcome::default();
        let mut rows = Vec::new();
        for record in records {
            let Some(id) = record.ledger_id() else {
                warn!(name = record.name.as_deref().unwrap_or_default(), "skipping company without id");
                outcome.skipped_missing_id += 1;
                continue;
            };
            if !known.insert(id.to_string()) {
                outcome.skipped_known += 1;
                continue;
            }
            rows.push(LedgerRow::from_record(record));
        }

        let existing_len = match fs::metadata(&self.path) {
            Ok(meta) => meta.len(),
            Err(err) if err.kind() == io::ErrorKind::NotFound => 0,
            Err(err) => {
                return Err(err).with_context(|| format!("inspecting ledger {}", self.path.display()))
            }
        };
        let needs_header = existing_len == 0;
        let tail = if needs_header || rows.is_empty() {
            LedgerTail::RowBoundary
        } else {
            self.tail_state()?
        };

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("opening ledger {} for append", self.path.display()))?;
        let repair: &[u8] = match tail {
            LedgerTail::RowBoundary => b"",
            LedgerTail::MidRow => b"\r\n",
            LedgerTail::OpenQuote => b"\"\r\n",
        };
        if !repair.is_empty() {
            warn!(path = %self.path.display(), ?tail, "ledger ends mid-row; starting a fresh line");
            file.write_all(repair)
                .with_context(|| format!("repairing row boundary in {}", self.path.display()))?;
        }

        let mut writer = WriterBuilder::new()
            .has_headers(false)
            .terminator(Terminator::CRLF)
            .from_writer(file);
        if needs_header {
            writer
                .write_record(LEDGER_COLUMNS)
                .with_context(|| format!("writing ledger header {}", self.path.display()))?;
            outcome.created = true;
        }
        for row in &rows {
            writer
                .write_record(row.as_cells())
                .with_context(|| format!("appending row {} to {}", row.id, self.path.display()))?;
            outcome.appended += 1;
        }
        writer
            .flush()
            .with_context(|| format!("flushing ledger {}", self.path.display()))?;

        Ok(outcome)
    }

    /// Classify how the file ends, tracking CSV quote state from the start so a
    /// cut inside a quoted cell is told apart from a cut between cells.
    fn tail_state(&self) -> anyhow::Result<LedgerTail> {
        let file = File::open(&self.path)
            .with_context(|| format!("opening ledger {}", self.path.display()))?;
        let mut in_quotes = false;
        let mut last = None;
        for byte in BufReader::new(file).bytes() {
            let byte = byte.with_context(|| format!("scanning ledger {}", self.path.display()))?;
            if byte == b'"' {
                // An escaped `""` toggles twice and leaves the state unchanged.
                in_quotes = !in_quotes;
            }
            last = Some(byte);
        }
        Ok(match last {
            _ if in_quotes => LedgerTail::OpenQuote,
            None | Some(b'\n') | Some(b'\r') => LedgerTail::RowBoundary,
            Some(_) => LedgerTail::MidRow,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LedgerTail {
    RowBoundary,
    MidRow,
    /// Cut inside a quoted cell; the cell must be closed before a line break ends the row.
    OpenQuote,
}
