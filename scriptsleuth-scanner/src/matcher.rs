//! Term and domain matching over a page's collected scripts.

use crate::page::NodeKey;
use crate::result::{InlineMatch, RemoteMatch, TextPair};
use std::collections::{BTreeMap, HashMap, HashSet};
use tracing::debug;
use url::Url;

#[derive(Debug, Clone)]
pub struct InlineScript {
    pub node: NodeKey,
    pub text: TextPair,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchStatus {
    Fetched(TextPair),
    Failed,
}

#[derive(Debug, Clone)]
pub struct RemoteScript {
    pub node: NodeKey,
    pub src: String,
    pub url: Option<Url>,
    pub status: FetchStatus,
}

/// Raw findings of one page, before attribution and assembly.
#[derive(Debug, Default)]
pub struct MatchOutcome {
    pub inline: BTreeMap<String, Vec<InlineMatch>>,
    pub remote: BTreeMap<String, Vec<RemoteMatch>>,
    pub domains: BTreeMap<String, BTreeMap<String, TextPair>>,
    /// Every remote script tag on the page, mapped to its raw `src`.
    pub remote_scripts: HashMap<NodeKey, String>,
    /// Remote script tags whose fetch failed.
    pub non_responding: HashSet<NodeKey>,
}

/// Exact, case-sensitive substring test.
pub fn inline_term_matches(text: &str, term: &str) -> bool {
    text.contains(term)
}

/// Every `.`-separated segment of the term must occur somewhere in the text,
/// in any order. Minifiers rewrite `a.b.c` property chains, so the segments
/// rarely survive side by side.
pub fn remote_term_matches(text: &str, term: &str) -> bool {
    term.split('.').all(|segment| text.contains(segment))
}

/// Substring containment on the host, so `ads.example.com` also matches
/// `cdn.ads.example.com.evil.net`.
pub fn domain_matches(host: &str, domain: &str) -> bool {
    host.contains(domain)
}

pub fn match_scripts(
    inline_scripts: &[InlineScript],
    remote_scripts: &[RemoteScript],
    terms: &[String],
    domains: &[String],
) -> MatchOutcome {
    let terms = unique(terms);
    let domains = unique(domains);
    let mut outcome = MatchOutcome::default();

    for script in inline_scripts {
        let text = script.text.searchable();
        for term in &terms {
            if inline_term_matches(text, term) {
                debug!("Found {} in inline script {}", term, script.node);
                outcome
                    .inline
                    .entry(term.to_string())
                    .or_default()
                    .push(InlineMatch {
                        text: script.text.clone(),
                        node: script.node,
                        suspect_script: None,
                    });
            }
        }
    }

    for script in remote_scripts {
        outcome.remote_scripts.insert(script.node, script.src.clone());

        let (text, url) = match (&script.status, &script.url) {
            (FetchStatus::Fetched(text), Some(url)) => (text, url),
            _ => {
                outcome.non_responding.insert(script.node);
                continue;
            }
        };

        if let Some(host) = url.host_str() {
            for domain in &domains {
                if domain_matches(host, domain) {
                    debug!("Found {} in domain of remote script {}", domain, url);
                    outcome
                        .domains
                        .entry(domain.to_string())
                        .or_default()
                        .insert(url.to_string(), text.clone());
                }
            }
        }

        let searchable = text.searchable();
        for term in &terms {
            if remote_term_matches(searchable, term) {
                debug!("Found {} in text of remote script {}", term, url);
                outcome
                    .remote
                    .entry(term.to_string())
                    .or_default()
                    .push(RemoteMatch {
                        text: text.clone(),
                        url: url.to_string(),
                    });
            }
        }
    }

    outcome
}

fn unique(values: &[String]) -> Vec<&str> {
    let mut seen = HashSet::new();
    values
        .iter()
        .map(String::as_str)
        .filter(|value| seen.insert(*value))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::page::Page;

    fn keys(count: usize) -> Vec<NodeKey> {
        let html = "<p></p>".repeat(count);
        let page = Page::parse(&html);
        page.elements_by_tag("p").collect()
    }

    fn plain(text: &str) -> TextPair {
        TextPair::new(text.to_string(), text.to_string())
    }

    fn remote(node: NodeKey, url: &str, body: Option<&str>) -> RemoteScript {
        RemoteScript {
            node,
            src: url.to_string(),
            url: Url::parse(url).ok(),
            status: body.map_or(FetchStatus::Failed, |b| FetchStatus::Fetched(plain(b))),
        }
    }

    fn strings(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    #[test]
    fn test_remote_match_requires_every_segment() {
        assert!(remote_term_matches("var c = 1; a.x; b()", "a.b.c"));
        assert!(remote_term_matches("c b a", "a.b.c"));
        assert!(!remote_term_matches("only a here", "a.b"));
        assert!(remote_term_matches("fbq", "fbq"));
    }

    #[test]
    fn test_inline_match_is_exact_and_case_sensitive() {
        assert!(inline_term_matches("window.ga('send')", "window.ga"));
        assert!(!inline_term_matches("ga.window", "window.ga"));
        assert!(!inline_term_matches("Window.GA", "window.ga"));
    }

    #[test]
    fn test_domain_match_is_substring_of_host() {
        assert!(domain_matches("cdn.ads.example.com.evil.net", "ads.example.com"));
        assert!(domain_matches("ads.example.com", "ads.example.com"));
        assert!(!domain_matches("example.com", "ads.example.com"));
    }

    #[test]
    fn test_inline_uses_canonical_text() {
        let k = keys(1);
        let inline = vec![InlineScript {
            node: k[0],
            text: TextPair::new(r"\x66bq('init')".to_string(), "fbq('init')".to_string()),
        }];
        let outcome = match_scripts(&inline, &[], &strings(&["fbq"]), &[]);

        let matches = &outcome.inline["fbq"];
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].text.original, r"\x66bq('init')");
        assert_eq!(matches[0].text.canonical.as_deref(), Some("fbq('init')"));
    }

    #[test]
    fn test_failed_fetch_lands_in_non_responding_set() {
        let k = keys(3);
        let remotes = vec![
            remote(k[0], "https://a.example.com/a.js", None),
            remote(k[1], "https://b.example.com/b.js", Some("analytics.track()")),
            remote(k[2], "https://c.example.com/c.js", Some("nothing")),
        ];
        let outcome = match_scripts(&[], &remotes, &strings(&["analytics.track"]), &strings(&["example.com"]));

        assert_eq!(outcome.non_responding, HashSet::from([k[0]]));
        assert_eq!(outcome.remote_scripts.len(), 3);
        assert_eq!(outcome.remote["analytics.track"].len(), 1);
        assert_eq!(outcome.remote["analytics.track"][0].url, "https://b.example.com/b.js");

        let domain = &outcome.domains["example.com"];
        assert_eq!(domain.len(), 2);
        assert!(!domain.contains_key("https://a.example.com/a.js"));
    }

    #[test]
    fn test_unresolved_remote_counts_as_failed() {
        let k = keys(1);
        let remotes = vec![RemoteScript {
            node: k[0],
            src: "http://[broken".to_string(),
            url: None,
            status: FetchStatus::Failed,
        }];
        let outcome = match_scripts(&[], &remotes, &strings(&["x"]), &[]);
        assert!(outcome.non_responding.contains(&k[0]));
        assert_eq!(outcome.remote_scripts[&k[0]], "http://[broken");
    }

    #[test]
    fn test_duplicate_terms_match_once() {
        let k = keys(1);
        let inline = vec![InlineScript {
            node: k[0],
            text: plain("gtag('config')"),
        }];
        let outcome = match_scripts(&inline, &[], &strings(&["gtag", "gtag"]), &[]);
        assert_eq!(outcome.inline["gtag"].len(), 1);
    }

    #[test]
    fn test_terms_without_matches_are_absent() {
        let k = keys(2);
        let inline = vec![InlineScript {
            node: k[0],
            text: plain("foo()"),
        }];
        let remotes = vec![remote(k[1], "https://cdn.example.com/x.js", Some("bar()"))];
        let outcome = match_scripts(&inline, &remotes, &strings(&["foo", "bar", "baz"]), &[]);

        assert!(outcome.inline.contains_key("foo"));
        assert!(outcome.remote.contains_key("bar"));
        assert!(!outcome.inline.contains_key("baz"));
        assert!(!outcome.remote.contains_key("baz"));
    }
}
