use crate::CLAP_STYLING;
use clap::{ArgAction, ArgGroup, arg, command};
use std::path::PathBuf;
use url::Url;

pub(crate) fn command_argument_builder() -> clap::Command {
    clap::Command::new("scriptsleuth")
        .version(env!("CARGO_PKG_VERSION"))
        .bin_name("scriptsleuth")
        .styles(CLAP_STYLING)
        .about("Find code signatures and script hosting domains in the scripts a page loads")
        .subcommand_required(true)
        .arg_required_else_help(true)
        .subcommand(
            command!("init")
                .about("Initializes the scriptsleuth database on your filesystem")
                .arg(
                    arg!([PATH])
                        .required(false)
                        .help("Directory to store the scriptsleuth database in")
                        .default_value("~/.config/scriptsleuth/"),
                )
                .arg(
                    arg!(-f --"force")
                        .help("Overwrite any existing database at the specified location without asking")
                        .required(false),
                ),
        )
        .subcommand(
            command!("scan")
                .about(
                    "Scan a page, or every page in a hosts file, for terms in its scripts and \
                for scripts served from given domains.",
                )
                .arg(
                    arg!(-u --"url" <URL>)
                        .required(false)
                        .help("The page to scan")
                        .value_parser(clap::value_parser!(Url))
                        .conflicts_with("hosts-file"),
                )
                .arg(
                    arg!(-H --"hosts-file" <PATH>)
                        .required(false)
                        .help("Newline-delimited file of URLs, hosts or `rank,host` pairs to scan")
                        .value_parser(clap::value_parser!(PathBuf))
                        .conflicts_with("url"),
                )
                .group(
                    ArgGroup::new("target")
                        .args(["url", "hosts-file"])
                        .required(true),
                )
                .arg(
                    arg!(-t --"term" <TERM>)
                        .required(false)
                        .help("Identifier to search scripts for, e.g. `fbq` or `ga.create`. Repeatable.")
                        .action(ArgAction::Append),
                )
                .arg(
                    arg!(-d --"domain" <DOMAIN>)
                        .required(false)
                        .help("Match remote scripts whose host contains this domain. Repeatable.")
                        .action(ArgAction::Append),
                )
                .group(
                    ArgGroup::new("criteria")
                        .args(["term", "domain"])
                        .multiple(true)
                        .required(true),
                )
                .arg(
                    arg!(-b --"batch" <UUID>)
                        .required(false)
                        .help("Batch to record the crawls under (default: a new random UUID)"),
                )
                .arg(
                    arg!(--"tag" <TAG>)
                        .required(false)
                        .help("Tag to attach to the batch. Repeatable.")
                        .action(ArgAction::Append),
                )
                .arg(
                    arg!(-r --"region" <REGION>)
                        .required(false)
                        .help("Region the scan runs from, stored with the batch"),
                )
                .arg(
                    arg!(--"rank" <RANK>)
                        .required(false)
                        .help("Popularity rank of the page. Ranks in the hosts file take precedence.")
                        .value_parser(clap::value_parser!(i64)),
                )
                .arg(
                    arg!(--"db" <PATH>)
                        .required(false)
                        .help("Database to record into (default: ~/.config/scriptsleuth/scriptsleuth.db)"),
                )
                .arg(
                    arg!(--"no-store")
                        .required(false)
                        .help("Print results without recording them")
                        .action(ArgAction::SetTrue)
                        .conflicts_with("db"),
                )
                .arg(
                    arg!(-f --"format" <FORMAT>)
                        .required(false)
                        .help("Output format: text, json")
                        .value_parser(["text", "json"])
                        .default_value("text"),
                )
                .arg(
                    arg!(--"timeout" <SECONDS>)
                        .required(false)
                        .help("Request timeout in seconds, for the page and each script")
                        .value_parser(clap::value_parser!(u64).range(1..))
                        .default_value("10"),
                )
                .arg(
                    arg!(-c --"concurrency" <NUM>)
                        .required(false)
                        .help("Maximum number of script fetches in flight at once")
                        .value_parser(clap::value_parser!(u64).range(1..))
                        .default_value("8"),
                )
                .arg(
                    arg!(--"share-fetches")
                        .required(false)
                        .help("Fetch each distinct script URL once, even if several tags load it")
                        .action(ArgAction::SetTrue),
                )
                .arg(
                    arg!(--"reject-error-status")
                        .required(false)
                        .help("Treat 4xx/5xx script responses as failed fetches")
                        .action(ArgAction::SetTrue),
                )
                .arg(
                    arg!(--"debug")
                        .required(false)
                        .help("Log debug output to stderr")
                        .action(ArgAction::SetTrue),
                ),
        )
        .subcommand(
            command!("event")
                .about("Dispatch a single crawl described by a JSON event document")
                .arg(
                    arg!(<PATH>)
                        .help("JSON document with url, batch, terms, domains, region, tags, rank, debug")
                        .value_parser(clap::value_parser!(PathBuf)),
                )
                .arg(
                    arg!(--"db" <PATH>)
                        .required(false)
                        .help("Database to record into (default: ~/.config/scriptsleuth/scriptsleuth.db)"),
                )
                .arg(
                    arg!(--"debug")
                        .required(false)
                        .help("Log debug output to stderr")
                        .action(ArgAction::SetTrue),
                ),
        )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_tree_is_valid() {
        command_argument_builder().debug_assert();
    }

    #[test]
    fn test_scan_collects_repeated_terms() {
        let matches = command_argument_builder()
            .try_get_matches_from([
                "scriptsleuth",
                "scan",
                "-u",
                "https://example.com",
                "-t",
                "fbq",
                "-t",
                "ga.create",
                "--tag",
                "alexa",
            ])
            .unwrap();
        let (_, scan) = matches.subcommand().unwrap();

        let terms: Vec<&String> = scan.get_many::<String>("term").unwrap().collect();
        assert_eq!(terms, ["fbq", "ga.create"]);
        assert_eq!(scan.get_one::<u64>("timeout"), Some(&10));
        assert!(!scan.get_flag("no-store"));
    }

    #[test]
    fn test_scan_requires_search_criteria() {
        let err = command_argument_builder()
            .try_get_matches_from(["scriptsleuth", "scan", "-u", "https://example.com"])
            .unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::MissingRequiredArgument);
    }

    #[test]
    fn test_scan_url_and_hosts_file_conflict() {
        let result = command_argument_builder().try_get_matches_from([
            "scriptsleuth",
            "scan",
            "-u",
            "https://example.com",
            "-H",
            "hosts.txt",
            "-d",
            "ads.example.com",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_scan_rejects_zero_timeout_and_concurrency() {
        for flag in ["--timeout", "--concurrency"] {
            let err = command_argument_builder()
                .try_get_matches_from([
                    "scriptsleuth",
                    "scan",
                    "-u",
                    "https://example.com",
                    "-t",
                    "fbq",
                    flag,
                    "0",
                ])
                .unwrap_err();
            assert_eq!(err.kind(), clap::error::ErrorKind::ValueValidation, "{}", flag);
        }
    }
}
