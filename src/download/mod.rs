//! Document downloader
//!
//! Retrieves a [`DocumentCandidate`] into storage. Each attempt streams the
//! body into the `raw/` staging area while hashing it, then the staged file
//! is verified and either discarded as a duplicate of known content or moved
//! into `organized/<domain>/<category>/`.
//!
//! This is the only component that writes document bytes.

mod naming;

pub use naming::{document_filename, parse_content_disposition, resolve_unique_path, sanitize_filename};

use crate::classify::Categorizer;
use crate::config::{Config, DownloadConfig, OutputConfig};
use crate::crawler::retry::{classify_status, FailureKind, RetryDecision, RetryPolicy};
use crate::crawler::build_http_client;
use crate::document::{DetectionSource, DocumentCandidate, DocumentIndex, DocumentKind, DownloadedDocument};
use crate::url::storage_domain;
use chrono::Utc;
use reqwest::header::{CONTENT_DISPOSITION, CONTENT_TYPE};
use reqwest::Client;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use url::Url;

/// Bytes kept from the start of a body for signature and snippet checks
const HEAD_BYTES: usize = 4096;

/// Why a download failed
#[derive(Debug, Clone, Error)]
pub enum DownloadErrorKind {
    #[error("HTTP {0}")]
    HttpStatus(u16),

    #[error("network error: {0}")]
    Network(String),

    #[error("timed out after {0:?}")]
    Timeout(Duration),

    #[error("expected {expected} content, server sent {actual:?}")]
    ContentTypeMismatch { expected: DocumentKind, actual: String },

    #[error("integrity check failed: {0}")]
    Integrity(String),

    #[error("body exceeds {limit} bytes")]
    TooLarge { limit: u64 },

    #[error("storage error: {0}")]
    Io(String),
}

/// A document could not be downloaded
#[derive(Debug, Clone, Error)]
#[error("download of {url} failed after {attempts} attempt(s): {kind}")]
pub struct DownloadError {
    pub url: String,
    pub attempts: u32,
    pub kind: DownloadErrorKind,
}

/// Result of a successful download
#[derive(Debug, Clone, PartialEq)]
pub enum DownloadOutcome {
    /// New content was written to storage
    Stored(DownloadedDocument),
    /// The content matched an earlier download; nothing was written
    Duplicate(DownloadedDocument),
}

impl DownloadOutcome {
    pub fn record(&self) -> &DownloadedDocument {
        match self {
            Self::Stored(doc) | Self::Duplicate(doc) => doc,
        }
    }

    pub fn into_record(self) -> DownloadedDocument {
        match self {
            Self::Stored(doc) | Self::Duplicate(doc) => doc,
        }
    }
}

/// A verified body sitting in the staging area
struct Staged {
    path: PathBuf,
    size: u64,
    checksum: String,
    head: Vec<u8>,
    kind: DocumentKind,
    content_disposition: Option<String>,
}

/// Retry-aware, integrity-checking document downloader
pub struct Downloader {
    client: Client,
    retry: RetryPolicy,
    timeout: Duration,
    max_bytes: u64,
    raw_dir: PathBuf,
    organized_dir: PathBuf,
}

impl Downloader {
    pub fn new(client: Client, download: &DownloadConfig, output: &OutputConfig) -> Self {
        Self {
            client,
            retry: RetryPolicy::from_config(&download.retry),
            timeout: Duration::from_secs(download.timeout_secs),
            max_bytes: download.max_bytes,
            raw_dir: output.raw_dir(),
            organized_dir: output.organized_dir(),
        }
    }

    pub fn from_config(config: &Config) -> Result<Self, reqwest::Error> {
        let timeout = Duration::from_secs(config.download.timeout_secs);
        let client = build_http_client(&config.user_agent, timeout)?;
        Ok(Self::new(client, &config.download, &config.output))
    }

    /// Downloads a document
    ///
    /// # Arguments
    ///
    /// * `candidate` - The document to retrieve
    /// * `index` - Checksums of content already stored, for deduplication
    /// * `categorizer` - Assigns the category of new content
    ///
    /// # Returns
    ///
    /// * `Ok(DownloadOutcome::Stored)` - New content written under `organized/`
    /// * `Ok(DownloadOutcome::Duplicate)` - Content already stored; the record points at it
    /// * `Err(DownloadError)` - Retries exhausted or a non-retryable failure
    pub async fn download(
        &self,
        candidate: &DocumentCandidate,
        index: &DocumentIndex,
        categorizer: &Categorizer,
    ) -> Result<DownloadOutcome, DownloadError> {
        let url = Url::parse(&candidate.url).map_err(|e| DownloadError {
            url: candidate.url.clone(),
            attempts: 0,
            kind: DownloadErrorKind::Network(format!("invalid URL: {}", e)),
        })?;

        let (staged, attempts) = self.fetch_with_retry(&url, candidate).await?;
        let retry_count = attempts - 1;

        if let Some(original) = index.get(&staged.checksum) {
            remove_quietly(&staged.path).await;
            tracing::info!(
                "Duplicate content: {} matches {} ({})",
                candidate.url,
                original.source_url,
                original.local_path.display()
            );
            return Ok(DownloadOutcome::Duplicate(DownloadedDocument {
                source_url: candidate.url.clone(),
                local_path: original.local_path.clone(),
                category: original.category.clone(),
                confidence: original.confidence,
                size_bytes: staged.size,
                checksum: staged.checksum,
                timestamp: Utc::now(),
                retry_count,
                kind: staged.kind,
                duplicate_of: Some(original.source_url.clone()),
                found_on: candidate.found_on.clone(),
            }));
        }

        let snippet = staged
            .kind
            .is_textual()
            .then(|| String::from_utf8_lossy(&staged.head).into_owned());
        let mut typed = candidate.clone();
        typed.inferred_type = staged.kind;
        let categorization = categorizer.categorize(&typed, snippet.as_deref()).await;

        let destination = self
            .place(&url, &staged, &categorization.category)
            .await
            .map_err(|e| {
                DownloadError {
                    url: candidate.url.clone(),
                    attempts,
                    kind: DownloadErrorKind::Io(e.to_string()),
                }
            });
        let destination = match destination {
            Ok(path) => path,
            Err(e) => {
                remove_quietly(&staged.path).await;
                return Err(e);
            }
        };

        tracing::info!(
            "Stored {} ({} bytes) as {} [{} {:.2}]",
            candidate.url,
            staged.size,
            destination.display(),
            categorization.category,
            categorization.confidence
        );

        Ok(DownloadOutcome::Stored(DownloadedDocument {
            source_url: candidate.url.clone(),
            local_path: destination,
            category: categorization.category,
            confidence: categorization.confidence,
            size_bytes: staged.size,
            checksum: staged.checksum,
            timestamp: Utc::now(),
            retry_count,
            kind: staged.kind,
            duplicate_of: None,
            found_on: candidate.found_on.clone(),
        }))
    }

    async fn fetch_with_retry(
        &self,
        url: &Url,
        candidate: &DocumentCandidate,
    ) -> Result<(Staged, u32), DownloadError> {
        let waive_content_type = candidate.detection_source == DetectionSource::ContentType;
        let mut attempt = 1;
        let mut mismatches = 0;

        loop {
            let outcome = match tokio::time::timeout(
                self.timeout,
                self.attempt(url, candidate.inferred_type, waive_content_type, attempt),
            )
            .await
            {
                Ok(outcome) => outcome,
                Err(_) => Err(DownloadErrorKind::Timeout(self.timeout)),
            };

            let kind = match outcome {
                Ok(staged) => return Ok((staged, attempt)),
                Err(kind) => kind,
            };

            let failure = match &kind {
                DownloadErrorKind::HttpStatus(status) => classify_status(*status),
                DownloadErrorKind::Network(_)
                | DownloadErrorKind::Timeout(_)
                | DownloadErrorKind::Integrity(_) => FailureKind::Transient,
                // A mismatch is retried once; confirmed twice it is final
                DownloadErrorKind::ContentTypeMismatch { .. } => {
                    mismatches += 1;
                    if mismatches >= 2 {
                        FailureKind::Permanent
                    } else {
                        FailureKind::Transient
                    }
                }
                DownloadErrorKind::TooLarge { .. } | DownloadErrorKind::Io(_) => {
                    FailureKind::Permanent
                }
            };

            match self.retry.should_retry(failure, attempt) {
                RetryDecision::Retry {
                    delay,
                    attempt: next,
                } => {
                    tracing::debug!(
                        "Download attempt {} of {} failed: {}; retrying in {:?}",
                        attempt,
                        url,
                        kind,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                    attempt = next;
                }
                RetryDecision::DoNotRetry { reason } => {
                    tracing::debug!("Giving up on {}: {}", url, reason);
                    return Err(DownloadError {
                        url: url.to_string(),
                        attempts: attempt,
                        kind,
                    });
                }
            }
        }
    }

    /// One attempt: request, verify headers, stream to staging, verify body
    async fn attempt(
        &self,
        url: &Url,
        expected: DocumentKind,
        waive_content_type: bool,
        attempt: u32,
    ) -> Result<Staged, DownloadErrorKind> {
        let mut response = self.client.get(url.clone()).send().await.map_err(|e| {
            if e.is_timeout() {
                DownloadErrorKind::Timeout(self.timeout)
            } else {
                DownloadErrorKind::Network(e.to_string())
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(DownloadErrorKind::HttpStatus(status.as_u16()));
        }

        let content_type = header_string(&response, CONTENT_TYPE).unwrap_or_default();
        let content_disposition = header_string(&response, CONTENT_DISPOSITION);

        if !waive_content_type && !expected.accepts_mime(&content_type) {
            return Err(DownloadErrorKind::ContentTypeMismatch {
                expected,
                actual: content_type,
            });
        }

        let kind = resolve_kind(expected, &content_type, content_disposition.as_deref());

        let declared = response.content_length();
        if let Some(len) = declared {
            if len > self.max_bytes {
                return Err(DownloadErrorKind::TooLarge {
                    limit: self.max_bytes,
                });
            }
        }

        tokio::fs::create_dir_all(&self.raw_dir)
            .await
            .map_err(|e| DownloadErrorKind::Io(format!("{}: {}", self.raw_dir.display(), e)))?;
        let staging = self.raw_dir.join(staging_name(url, attempt));

        let streamed = self.stream_to(&mut response, &staging).await;
        let (size, checksum, head) = match streamed {
            Ok(result) => result,
            Err(e) => {
                remove_quietly(&staging).await;
                return Err(e);
            }
        };

        let verdict = verify_body(kind, declared, size, &head);
        if let Err(e) = verdict {
            remove_quietly(&staging).await;
            return Err(e);
        }

        Ok(Staged {
            path: staging,
            size,
            checksum,
            head,
            kind,
            content_disposition,
        })
    }

    async fn stream_to(
        &self,
        response: &mut reqwest::Response,
        path: &Path,
    ) -> Result<(u64, String, Vec<u8>), DownloadErrorKind> {
        let io_err = |e: std::io::Error| DownloadErrorKind::Io(format!("{}: {}", path.display(), e));

        let file = tokio::fs::File::create(path).await.map_err(io_err)?;
        let mut writer = tokio::io::BufWriter::new(file);
        let mut hasher = Sha256::new();
        let mut head = Vec::with_capacity(HEAD_BYTES);
        let mut size: u64 = 0;

        while let Some(chunk) = response.chunk().await.map_err(|e| {
            if e.is_timeout() {
                DownloadErrorKind::Timeout(self.timeout)
            } else {
                DownloadErrorKind::Network(e.to_string())
            }
        })? {
            size += chunk.len() as u64;
            if size > self.max_bytes {
                return Err(DownloadErrorKind::TooLarge {
                    limit: self.max_bytes,
                });
            }
            if head.len() < HEAD_BYTES {
                let take = (HEAD_BYTES - head.len()).min(chunk.len());
                head.extend_from_slice(&chunk[..take]);
            }
            hasher.update(&chunk);
            writer.write_all(&chunk).await.map_err(io_err)?;
        }

        writer.flush().await.map_err(io_err)?;
        writer.get_ref().sync_all().await.map_err(io_err)?;

        Ok((size, hex::encode(hasher.finalize()), head))
    }

    /// Moves a staged body to its organized location
    async fn place(&self, url: &Url, staged: &Staged, category: &str) -> std::io::Result<PathBuf> {
        let dir = self
            .organized_dir
            .join(storage_domain(url))
            .join(category);
        tokio::fs::create_dir_all(&dir).await?;

        let filename = document_filename(url, staged.kind, staged.content_disposition.as_deref());
        let destination = resolve_unique_path(&dir, &filename);

        if tokio::fs::rename(&staged.path, &destination).await.is_err() {
            // Staging and destination on different filesystems
            tokio::fs::copy(&staged.path, &destination).await?;
            tokio::fs::remove_file(&staged.path).await?;
        }
        Ok(destination)
    }
}

/// Settles the document kind once headers are known
fn resolve_kind(expected: DocumentKind, content_type: &str, disposition: Option<&str>) -> DocumentKind {
    if expected != DocumentKind::Unknown {
        return expected;
    }
    DocumentKind::from_mime(content_type)
        .or_else(|| {
            disposition
                .and_then(parse_content_disposition)
                .and_then(|name| {
                    name.rsplit_once('.')
                        .and_then(|(_, ext)| DocumentKind::from_extension(ext))
                })
        })
        .unwrap_or(DocumentKind::Unknown)
}

/// Body checks applied before a staged file is accepted
fn verify_body(
    kind: DocumentKind,
    declared: Option<u64>,
    size: u64,
    head: &[u8],
) -> Result<(), DownloadErrorKind> {
    if size == 0 {
        return Err(DownloadErrorKind::Integrity("empty body".to_string()));
    }
    if let Some(expected) = declared {
        if expected != size {
            return Err(DownloadErrorKind::Integrity(format!(
                "expected {} bytes, received {}",
                expected, size
            )));
        }
    }
    if !kind.matches_signature(head) {
        return Err(DownloadErrorKind::Integrity(format!(
            "content does not look like {}",
            kind
        )));
    }
    Ok(())
}

fn header_string(response: &reqwest::Response, name: reqwest::header::HeaderName) -> Option<String> {
    response
        .headers()
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

/// Unique staging filename per URL and attempt
fn staging_name(url: &Url, attempt: u32) -> String {
    let digest = Sha256::digest(url.as_str().as_bytes());
    format!("{}-{}.part", &hex::encode(digest)[..16], attempt)
}

async fn remove_quietly(path: &Path) {
    if let Err(e) = tokio::fs::remove_file(path).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            tracing::warn!("Failed to remove staged file {}: {}", path.display(), e);
        }
    }
}
