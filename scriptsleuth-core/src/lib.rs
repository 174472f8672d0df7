pub mod data;
pub mod dispatch;
pub mod report;
pub mod validate;

pub use data::{Database, RecordMeta};
pub use dispatch::{DispatchError, Dispatched, crawl, dispatch};
pub use validate::{CrawlArgs, ValidatedArgs, ValidationError, validate};
