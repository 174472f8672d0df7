use crate::matcher::MatchOutcome;
use crate::result::{CrawlResult, DomainFinding, TermFinding};
use std::collections::BTreeMap;

/// Fold raw matches into the sparse [`CrawlResult`].
pub fn assemble(outcome: MatchOutcome) -> CrawlResult {
    let MatchOutcome {
        mut inline,
        mut remote,
        domains,
        ..
    } = outcome;

    let mut term_names: Vec<String> = inline.keys().chain(remote.keys()).cloned().collect();
    term_names.sort();
    term_names.dedup();

    let mut terms = BTreeMap::new();
    for term in term_names {
        let inline = inline.remove(&term).filter(|m| !m.is_empty());
        let remote = remote.remove(&term).filter(|m| !m.is_empty());
        if inline.is_none() && remote.is_none() {
            continue;
        }
        terms.insert(
            term.clone(),
            TermFinding {
                term,
                inline,
                remote,
            },
        );
    }

    let domains = domains
        .into_iter()
        .filter(|(_, matches)| !matches.is_empty())
        .map(|(domain, matches)| {
            (
                domain.clone(),
                DomainFinding { domain, matches },
            )
        })
        .collect();

    CrawlResult { terms, domains }
}
