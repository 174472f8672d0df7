use crate::deobfuscate::Deobfuscator;
use crate::page::NodeKey;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A script body together with its deobfuscated form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextPair {
    pub original: String,
    /// Present only when deobfuscation changed the text.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub canonical: Option<String>,
}

impl TextPair {
    pub fn new(original: String, deobfuscated: String) -> Self {
        let canonical = (deobfuscated != original).then_some(deobfuscated);
        Self {
            original,
            canonical,
        }
    }

    pub fn from_deobfuscator(original: String, deobfuscator: &dyn Deobfuscator) -> Self {
        let deobfuscated = deobfuscator.deobfuscate(&original);
        Self::new(original, deobfuscated)
    }

    /// The text matching runs against.
    pub fn searchable(&self) -> &str {
        self.canonical.as_deref().unwrap_or(&self.original)
    }
}

/// Remote script guessed to define the code an inline script uses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuspectScript {
    /// The `src` attribute as written in the page.
    pub url: String,
    pub responded: bool,
    pub distance: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InlineMatch {
    pub text: TextPair,
    pub node: NodeKey,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suspect_script: Option<SuspectScript>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteMatch {
    pub text: TextPair,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TermFinding {
    pub term: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inline: Option<Vec<InlineMatch>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote: Option<Vec<RemoteMatch>>,
}

impl TermFinding {
    pub fn inline_matches(&self) -> &[InlineMatch] {
        self.inline.as_deref().unwrap_or(&[])
    }

    pub fn remote_matches(&self) -> &[RemoteMatch] {
        self.remote.as_deref().unwrap_or(&[])
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DomainFinding {
    pub domain: String,
    /// Absolute script URL to the script it served.
    pub matches: BTreeMap<String, TextPair>,
}

/// Everything one crawl found. Terms and domains without matches are absent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrawlResult {
    pub terms: BTreeMap<String, TermFinding>,
    pub domains: BTreeMap<String, DomainFinding>,
}

impl CrawlResult {
    pub fn is_empty(&self) -> bool {
        self.terms.is_empty() && self.domains.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_text_pair_omits_unchanged_canonical() {
        let pair = TextPair::new("abc".to_string(), "abc".to_string());
        assert_eq!(pair.canonical, None);
        assert_eq!(pair.searchable(), "abc");
    }

    #[test]
    fn test_text_pair_keeps_both_when_changed() {
        let pair = TextPair::new(r"\x61bc".to_string(), "abc".to_string());
        assert_eq!(pair.original, r"\x61bc");
        assert_eq!(pair.canonical.as_deref(), Some("abc"));
        assert_eq!(pair.searchable(), "abc");
    }

    #[test]
    fn test_term_finding_serialization_is_sparse() {
        let finding = TermFinding {
            term: "fbq".to_string(),
            inline: None,
            remote: Some(vec![RemoteMatch {
                text: TextPair::new("fbq()".to_string(), "fbq()".to_string()),
                url: "https://connect.example.net/fbevents.js".to_string(),
            }]),
        };
        let json = serde_json::to_value(&finding).unwrap();

        assert!(json.get("inline").is_none());
        assert!(json["remote"][0]["text"].get("canonical").is_none());
        assert_eq!(json["remote"][0]["url"], "https://connect.example.net/fbevents.js");
    }
}
