use crate::assembler::assemble;
use crate::attribution::attribute_suspects;
use crate::collector::{ScriptKind, collect_scripts};
use crate::config::ScanConfig;
use crate::deobfuscate::{Deobfuscator, EscapeDecoder};
use crate::document::DocumentIndex;
use crate::error::{FetchError, Result, ScanError};
use crate::fetcher::{Fetcher, HttpFetcher};
use crate::matcher::{FetchStatus, InlineScript, RemoteScript, match_scripts};
use crate::page::{NodeKey, Page};
use crate::result::{CrawlResult, TextPair};
use futures::stream::{self, StreamExt};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

struct PendingRemote {
    node: NodeKey,
    src: String,
    url: Option<Url>,
}

/// Scans one page per call. Holds no per-crawl state between calls.
pub struct Scanner<F = HttpFetcher> {
    fetcher: F,
    deobfuscator: Arc<dyn Deobfuscator>,
    config: ScanConfig,
}

impl Scanner<HttpFetcher> {
    pub fn new() -> Result<Self> {
        Self::with_config(ScanConfig::default())
    }

    pub fn with_config(config: ScanConfig) -> Result<Self> {
        let fetcher = HttpFetcher::new(&config).map_err(ScanError::Client)?;
        Ok(Self::with_fetcher(fetcher, config))
    }
}

impl<F: Fetcher> Scanner<F> {
    pub fn with_fetcher(fetcher: F, config: ScanConfig) -> Self {
        Self {
            fetcher,
            deobfuscator: Arc::new(EscapeDecoder),
            config,
        }
    }

    pub fn with_deobfuscator(mut self, deobfuscator: impl Deobfuscator + 'static) -> Self {
        self.deobfuscator = Arc::new(deobfuscator);
        self
    }

    /// Fetch `page_url`, search its scripts for `terms` and script hosts for
    /// `domains`, and attribute inline-only matches to suspect scripts.
    ///
    /// Only a failure to fetch the page itself is an error; failed script
    /// fetches are recorded and the scan carries on.
    pub async fn scan(&self, page_url: &str, terms: &[String], domains: &[String]) -> Result<CrawlResult> {
        let page_url = Url::parse(page_url)
            .map_err(|e| ScanError::InvalidUrl(format!("{}: {}", page_url, e)))?;
        info!("Starting scan of {}", page_url);

        let html = self.fetch(&page_url).await.map_err(|source| {
            warn!("Error encountered when fetching {}: {}", page_url, source);
            ScanError::PageFetch {
                url: page_url.to_string(),
                source,
            }
        })?;
        info!("Fetched document of length {} from {}", html.len(), page_url);

        let page = Page::parse(&html);
        let index = DocumentIndex::build(&page);
        let descriptors = collect_scripts(&page, &page_url);
        info!("Found {} script tags on the page.", descriptors.len());

        let mut inline_scripts = Vec::new();
        let mut pending = Vec::new();
        for descriptor in descriptors {
            match descriptor.kind {
                ScriptKind::Inline { text } => inline_scripts.push(InlineScript {
                    node: descriptor.node,
                    text: TextPair::from_deobfuscator(text, self.deobfuscator.as_ref()),
                }),
                ScriptKind::Remote { src, url } => pending.push(PendingRemote {
                    node: descriptor.node,
                    src,
                    url,
                }),
            }
        }

        let remote_scripts = self.fetch_remote_scripts(pending).await;

        let mut outcome = match_scripts(&inline_scripts, &remote_scripts, terms, domains);
        attribute_suspects(&mut outcome, &index);
        let result = assemble(outcome);

        info!(
            "Finished scan of {}. Found {} matching terms, and {} matching domains",
            page_url,
            result.terms.len(),
            result.domains.len()
        );
        Ok(result)
    }

    async fn fetch(&self, url: &Url) -> std::result::Result<String, FetchError> {
        let timeout = Duration::from_secs(self.config.timeout_secs.max(1));
        tokio::time::timeout(timeout, self.fetcher.get(url))
            .await
            .unwrap_or(Err(FetchError::Timeout(timeout)))
    }

    async fn fetch_script(&self, url: Url) -> FetchStatus {
        match self.fetch(&url).await {
            Ok(body) => {
                debug!("Fetched script of length {} from {}", body.len(), url);
                FetchStatus::Fetched(TextPair::from_deobfuscator(body, self.deobfuscator.as_ref()))
            }
            Err(e) => {
                warn!("Error occurred when trying to fetch script from {}: {}", url, e);
                FetchStatus::Failed
            }
        }
    }

    /// Fetch every remote script concurrently. Results come back in
    /// descriptor order, one cell per fetch, and are only combined once all
    /// fetches have settled.
    async fn fetch_remote_scripts(&self, pending: Vec<PendingRemote>) -> Vec<RemoteScript> {
        let share = self.config.share_fetches_by_url;
        let mut jobs: Vec<Url> = Vec::new();
        let mut by_url: HashMap<Url, usize> = HashMap::new();

        let slots: Vec<Option<usize>> = pending
            .iter()
            .map(|remote| {
                let url = remote.url.as_ref()?;
                if share && let Some(slot) = by_url.get(url) {
                    return Some(*slot);
                }
                let slot = jobs.len();
                jobs.push(url.clone());
                if share {
                    by_url.insert(url.clone(), slot);
                }
                Some(slot)
            })
            .collect();

        debug!(
            "Fetching {} remote scripts with {} requests",
            pending.len(),
            jobs.len()
        );

        let statuses: Vec<FetchStatus> = stream::iter(jobs)
            .map(move |url| async move { self.fetch_script(url).await })
            .buffered(self.config.max_concurrent_fetches.max(1))
            .collect()
            .await;

        pending
            .into_iter()
            .zip(slots)
            .map(|(remote, slot)| RemoteScript {
                node: remote.node,
                src: remote.src,
                url: remote.url,
                status: slot
                    .and_then(|slot| statuses.get(slot).cloned())
                    .unwrap_or(FetchStatus::Failed),
            })
            .collect()
    }
}
