// Text report for a single scan

use colored::Colorize;
use scriptsleuth_scanner::{CrawlResult, InlineMatch};

const RULE: &str = "━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━";

fn describe_inline(inline: &InlineMatch) -> String {
    match &inline.suspect_script {
        Some(suspect) => {
            let status = if suspect.responded {
                "responded".green()
            } else {
                "failed to load".red()
            };
            format!(
                "    inline script {} (suspect: {} {}, distance {})\n",
                inline.node,
                suspect.url.cyan(),
                status,
                suspect.distance
            )
        }
        None => format!("    inline script {}\n", inline.node),
    }
}

pub fn generate_scan_report(url: &str, result: &CrawlResult) -> String {
    let mut report = String::new();
    report.push_str(RULE);
    report.push_str("\n\n");
    report.push_str(&format!("# Scan of {}\n", url.bold()));

    let inline_total: usize = result.terms.values().map(|t| t.inline_matches().len()).sum();
    let remote_total: usize = result.terms.values().map(|t| t.remote_matches().len()).sum();
    report.push_str(&format!("  Matching terms: {}\n", result.terms.len()));
    report.push_str(&format!("  Inline matches: {}\n", inline_total));
    report.push_str(&format!("  Remote matches: {}\n", remote_total));
    report.push_str(&format!("  Matching domains: {}\n", result.domains.len()));
    report.push('\n');

    if result.is_empty() {
        report.push_str(&format!("  {}\n\n", "No matches found".dimmed()));
        return report;
    }

    report.push_str(RULE);
    report.push_str("\n\n");

    for finding in result.terms.values() {
        report.push_str(&format!("## {}\n", finding.term.yellow()));

        let inline = finding.inline_matches();
        if !inline.is_empty() {
            report.push_str(&format!("  {} inline\n", inline.len()));
            for m in inline {
                report.push_str(&describe_inline(m));
            }
        }

        let remote = finding.remote_matches();
        if !remote.is_empty() {
            report.push_str(&format!("  {} remote\n", remote.len()));
            for m in remote {
                report.push_str(&format!("    {}\n", m.url));
            }
        }
        report.push('\n');
    }

    for finding in result.domains.values() {
        report.push_str(&format!("## {}\n", finding.domain.yellow()));
        report.push_str(&format!("  {} scripts\n", finding.matches.len()));
        for url in finding.matches.keys() {
            report.push_str(&format!("    {}\n", url));
        }
        report.push('\n');
    }

    report
}
