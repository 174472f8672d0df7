//! Checks on invocation arguments, run before any network activity.

use crate::data::RecordMeta;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use thiserror::Error;
use url::Url;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("tags argument, if provided, must be a non-empty list of strings")]
    InvalidTags,

    #[error("must provide either search terms, or search domains")]
    NoSearchCriteria,

    #[error("{0} must not contain empty entries")]
    EmptyEntry(&'static str),

    #[error("batch argument must be a UUID string, found '{0}'")]
    InvalidBatch(String),

    #[error("expected valid URL in 'url' argument, but found '{0}'")]
    InvalidUrl(String),
}

/// Arguments of one crawl invocation as they arrive from an event document
/// or the command line.
///
/// Event documents are read leniently: a value of the wrong JSON type is
/// left for [`validate`] to judge rather than failing the parse.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CrawlArgs {
    #[serde(deserialize_with = "loose_string")]
    pub url: Option<String>,
    #[serde(deserialize_with = "loose_string")]
    pub batch: Option<String>,
    #[serde(deserialize_with = "string_list")]
    pub terms: Option<Vec<String>>,
    #[serde(deserialize_with = "string_list")]
    pub domains: Option<Vec<String>>,
    #[serde(deserialize_with = "non_empty_string")]
    pub region: Option<String>,
    #[serde(deserialize_with = "string_list")]
    pub tags: Option<Vec<String>>,
    #[serde(deserialize_with = "non_zero_rank")]
    pub rank: Option<i64>,
    #[serde(deserialize_with = "strictly_true")]
    pub debug: bool,
}

/// A present list that is not a list of strings becomes `Some(vec![])`, which
/// `validate` treats as a missing criterion, or as invalid tags.
fn string_list<'de, D: Deserializer<'de>>(de: D) -> Result<Option<Vec<String>>, D::Error> {
    let list = match Value::deserialize(de)? {
        Value::Array(items) => items
            .into_iter()
            .map(|item| match item {
                Value::String(s) => Some(s),
                _ => None,
            })
            .collect::<Option<Vec<String>>>()
            .unwrap_or_default(),
        _ => Vec::new(),
    };
    Ok(Some(list))
}

/// Non-string values keep their JSON text so the error can show them.
fn loose_string<'de, D: Deserializer<'de>>(de: D) -> Result<Option<String>, D::Error> {
    Ok(match Value::deserialize(de)? {
        Value::Null => None,
        Value::String(s) => Some(s),
        other => Some(other.to_string()),
    })
}

fn non_empty_string<'de, D: Deserializer<'de>>(de: D) -> Result<Option<String>, D::Error> {
    Ok(match Value::deserialize(de)? {
        Value::String(s) if !s.is_empty() => Some(s),
        _ => None,
    })
}

fn non_zero_rank<'de, D: Deserializer<'de>>(de: D) -> Result<Option<i64>, D::Error> {
    Ok(Value::deserialize(de)?.as_i64().filter(|rank| *rank != 0))
}

fn strictly_true<'de, D: Deserializer<'de>>(de: D) -> Result<bool, D::Error> {
    Ok(Value::deserialize(de)? == Value::Bool(true))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedArgs {
    pub url: Url,
    pub batch: String,
    pub terms: Vec<String>,
    pub domains: Vec<String>,
    pub region: Option<String>,
    pub tags: Vec<String>,
    pub rank: Option<i64>,
}

impl CrawlArgs {
    /// Parse an event document such as `{"url": "...", "batch": "...", "terms": [...]}`.
    pub fn from_json(document: &str) -> serde_json::Result<Self> {
        serde_json::from_str(document)
    }
}

impl ValidatedArgs {
    pub fn record_meta(&self) -> RecordMeta {
        RecordMeta {
            batch_uuid: self.batch.clone(),
            batch_tags: self.tags.clone(),
            url: self.url.to_string(),
            region: self.region.clone(),
            rank: self.rank,
            terms: self.terms.clone(),
            domains: self.domains.clone(),
        }
    }
}

fn non_empty(list: Option<Vec<String>>) -> Option<Vec<String>> {
    list.filter(|values| !values.is_empty())
}

fn check_entries(values: &[String], what: &'static str) -> Result<(), ValidationError> {
    if values.iter().any(String::is_empty) {
        return Err(ValidationError::EmptyEntry(what));
    }
    Ok(())
}

/// The batch must be a hyphenated UUID, 36 characters long.
fn is_batch_uuid(batch: &str) -> bool {
    batch.len() == 36 && uuid::Uuid::parse_str(batch).is_ok()
}

pub fn validate(args: CrawlArgs) -> Result<ValidatedArgs, ValidationError> {
    let tags = match args.tags {
        Some(tags) if tags.is_empty() => return Err(ValidationError::InvalidTags),
        Some(tags) => tags,
        None => Vec::new(),
    };
    check_entries(&tags, "tags")?;

    // An empty list for one criterion is fine as long as the other has entries
    let terms = non_empty(args.terms);
    let domains = non_empty(args.domains);
    if terms.is_none() && domains.is_none() {
        return Err(ValidationError::NoSearchCriteria);
    }
    let terms = terms.unwrap_or_default();
    let domains = domains.unwrap_or_default();
    check_entries(&terms, "terms")?;
    check_entries(&domains, "domains")?;

    let batch = args.batch.unwrap_or_default();
    if !is_batch_uuid(&batch) {
        return Err(ValidationError::InvalidBatch(batch));
    }

    let raw_url = args.url.unwrap_or_default();
    let url = Url::parse(&raw_url).map_err(|_| ValidationError::InvalidUrl(raw_url.clone()))?;

    Ok(ValidatedArgs {
        url,
        batch,
        terms,
        domains,
        region: args.region,
        tags,
        rank: args.rank,
    })
}
