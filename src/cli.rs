//! CLI argument definitions using clap derive macros.

use std::path::PathBuf;

use clap::Parser;

use connection_request::HttpMethod;

/// Issue HTTP requests with progress reporting.
///
/// Every URL becomes one tracked request; all of them run concurrently and
/// Ctrl-C cancels whatever is still in flight.
#[derive(Parser, Debug)]
#[command(name = "fetch")]
#[command(author, version, about)]
pub struct Args {
    /// URLs to request
    #[arg(required = true)]
    pub urls: Vec<String>,

    /// Increase output verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(short, long)]
    pub quiet: bool,

    /// HTTP method (GET, POST, PUT, DELETE); POST when --data is given
    #[arg(short = 'X', long)]
    pub method: Option<HttpMethod>,

    /// Extra request header as "Name: value" (repeatable)
    #[arg(short = 'H', long = "header", value_parser = parse_header)]
    pub headers: Vec<(String, String)>,

    /// Request body
    #[arg(short, long)]
    pub data: Option<String>,

    /// Parse responses as JSON and pretty-print them
    #[arg(long)]
    pub json: bool,

    /// Stream response bodies to files instead of printing them
    #[arg(long, conflicts_with = "json")]
    pub download: bool,

    /// Directory for downloaded files (defaults to the system temp directory)
    #[arg(short, long, requires = "download")]
    pub output_dir: Option<PathBuf>,

    /// Transport configuration file (JSON)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Connect timeout in seconds (1-3600)
    #[arg(long, value_parser = clap::value_parser!(u64).range(1..=3600))]
    pub connect_timeout: Option<u64>,

    /// Whole-request timeout in seconds (1-3600)
    #[arg(long, value_parser = clap::value_parser!(u64).range(1..=3600))]
    pub read_timeout: Option<u64>,

    /// Override the User-Agent header
    #[arg(long)]
    pub user_agent: Option<String>,
}

impl Args {
    /// Method to use: explicit `-X`, else POST with a body, else GET.
    #[must_use]
    pub fn effective_method(&self) -> HttpMethod {
        self.method.unwrap_or(if self.data.is_some() {
            HttpMethod::Post
        } else {
            HttpMethod::Get
        })
    }
}

fn parse_header(raw: &str) -> Result<(String, String), String> {
    let (name, value) = raw
        .split_once(':')
        .ok_or_else(|| format!("header `{raw}` must look like `Name: value`"))?;
    let name = name.trim();
    if name.is_empty() {
        return Err(format!("header `{raw}` has an empty name"));
    }
    Ok((name.to_string(), value.trim().to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_single_url_parses_with_defaults() {
        let args = Args::try_parse_from(["fetch", "https://example.com"]).unwrap();
        assert_eq!(args.urls, vec!["https://example.com"]);
        assert_eq!(args.verbose, 0);
        assert!(!args.quiet);
        assert!(!args.json);
        assert!(!args.download);
        assert_eq!(args.effective_method(), HttpMethod::Get);
    }

    #[test]
    fn test_cli_requires_url() {
        let err = Args::try_parse_from(["fetch"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::MissingRequiredArgument);
    }

    #[test]
    fn test_cli_verbose_flag_increments_count() {
        let args = Args::try_parse_from(["fetch", "-vv", "https://example.com"]).unwrap();
        assert_eq!(args.verbose, 2);
    }

    #[test]
    fn test_cli_method_is_case_insensitive() {
        let args = Args::try_parse_from(["fetch", "-X", "delete", "https://example.com"]).unwrap();
        assert_eq!(args.effective_method(), HttpMethod::Delete);
    }

    #[test]
    fn test_cli_unknown_method_is_rejected() {
        let result = Args::try_parse_from(["fetch", "-X", "PATCH", "https://example.com"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_cli_data_defaults_to_post() {
        let args =
            Args::try_parse_from(["fetch", "-d", "{\"a\":1}", "https://example.com"]).unwrap();
        assert_eq!(args.effective_method(), HttpMethod::Post);

        let args = Args::try_parse_from(["fetch", "-d", "x", "-X", "PUT", "https://example.com"])
            .unwrap();
        assert_eq!(args.effective_method(), HttpMethod::Put);
    }

    #[test]
    fn test_cli_headers_are_repeatable() {
        let args = Args::try_parse_from([
            "fetch",
            "-H",
            "Accept: application/json",
            "--header",
            "X-Trace:abc",
            "https://example.com",
        ])
        .unwrap();
        assert_eq!(
            args.headers,
            vec![
                ("Accept".to_string(), "application/json".to_string()),
                ("X-Trace".to_string(), "abc".to_string()),
            ]
        );
    }

    #[test]
    fn test_cli_malformed_header_is_rejected() {
        assert!(Args::try_parse_from(["fetch", "-H", "no-colon", "https://example.com"]).is_err());
        assert!(Args::try_parse_from(["fetch", "-H", ": value", "https://example.com"]).is_err());
    }

    #[test]
    fn test_cli_output_dir_requires_download() {
        let result = Args::try_parse_from(["fetch", "-o", "/tmp/out", "https://example.com"]);
        assert!(result.is_err());

        let args =
            Args::try_parse_from(["fetch", "--download", "-o", "/tmp/out", "https://example.com"])
                .unwrap();
        assert_eq!(args.output_dir, Some(PathBuf::from("/tmp/out")));
    }

    #[test]
    fn test_cli_json_conflicts_with_download() {
        let result = Args::try_parse_from(["fetch", "--json", "--download", "https://example.com"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_cli_timeout_range_enforced() {
        assert!(
            Args::try_parse_from(["fetch", "--connect-timeout", "0", "https://example.com"])
                .is_err()
        );
        let args = Args::try_parse_from(["fetch", "--read-timeout", "60", "https://example.com"])
            .unwrap();
        assert_eq!(args.read_timeout, Some(60));
    }

    #[test]
    fn test_cli_help_flag_shows_usage() {
        let err = Args::try_parse_from(["fetch", "--help"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::DisplayHelp);
    }
}
