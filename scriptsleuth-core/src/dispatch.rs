use crate::data::Database;
use crate::validate::{CrawlArgs, ValidatedArgs, ValidationError, validate};
use scriptsleuth_scanner::{CrawlResult, Fetcher, ScanError, Scanner};
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Error, Debug)]
pub enum DispatchError {
    #[error("Invalid arguments: {0}")]
    Validation(#[from] ValidationError),

    #[error("Error encountered when crawling {url}: {source}")]
    Scan {
        url: String,
        #[source]
        source: ScanError,
    },

    #[error("Failed to record crawl result: {0}")]
    Storage(#[from] rusqlite::Error),
}

/// A crawl that was scanned and stored.
#[derive(Debug, Clone)]
pub struct Dispatched {
    pub crawl_id: i64,
    pub args: ValidatedArgs,
    pub result: CrawlResult,
}

/// Scan with already validated arguments, without storing anything.
pub async fn crawl<F: Fetcher>(
    scanner: &Scanner<F>,
    args: &ValidatedArgs,
) -> Result<CrawlResult, DispatchError> {
    scanner
        .scan(args.url.as_str(), &args.terms, &args.domains)
        .await
        .map_err(|source| {
            warn!("Error encountered when crawling {}: {}", args.url, source);
            DispatchError::Scan {
                url: args.url.to_string(),
                source,
            }
        })
}

/// Validate `args`, scan the page and record the result.
pub async fn dispatch<F: Fetcher>(
    scanner: &Scanner<F>,
    db: &mut Database,
    args: CrawlArgs,
) -> Result<Dispatched, DispatchError> {
    debug!("Dispatching {:?}", args);
    let args = validate(args).inspect_err(|e| warn!("Invalid arguments: {}", e))?;

    let result = crawl(scanner, &args).await?;

    debug!("About to record result for {}", args.url);
    let crawl_id = db.record(&result, &args.record_meta())?;
    info!("Successfully recorded result for {} as crawl {}", args.url, crawl_id);

    Ok(Dispatched {
        crawl_id,
        args,
        result,
    })
}
