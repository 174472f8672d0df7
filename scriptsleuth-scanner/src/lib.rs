//! Script analysis engine: fetch a page, collect its script tags, search
//! them for identifier terms and hostnames, and guess which remote script
//! is missing when a term only appears inline.

pub mod assembler;
pub mod attribution;
pub mod collector;
pub mod config;
pub mod deobfuscate;
pub mod document;
pub mod error;
pub mod fetcher;
pub mod matcher;
pub mod page;
pub mod result;
pub mod scanner;

pub use config::ScanConfig;
pub use deobfuscate::{Deobfuscator, EscapeDecoder, PassThrough};
pub use error::{FetchError, ScanError};
pub use fetcher::{Fetcher, HttpFetcher};
pub use result::{CrawlResult, DomainFinding, InlineMatch, RemoteMatch, SuspectScript, TermFinding, TextPair};
pub use scanner::Scanner;
