use anyhow::Result;
use clap::{Parser, Subcommand};
use pagemark::{SearchBackend, SearchRequest};
use pagemark_local::config::{self, Config};
use pagemark_local::dispatch::{self, SavedPageOpener};
use pagemark_local::dom::Document;
use pagemark_local::extract;
use pagemark_local::highlight::{highlight_with, HighlightOptions, HighlightReport};
use pagemark_local::pattern::PatternMode;
use pagemark_local::{capture_page, search_and_highlight, BackendClient, CaptureOutcome};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "pagemark")]
#[command(about = "Capture page text and highlight search hits in HTML documents", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Extract the normalized title + main content text of an HTML page (json).
    Extract(ExtractCmd),
    /// Highlight every match of a pattern in an HTML page and write the result.
    Highlight(HighlightCmd),
    /// Extract a page and send it to the backend capture endpoint (json).
    Capture(CaptureCmd),
    /// Query the backend search endpoint (json).
    Search(SearchCmd),
    /// Search, then highlight the query in the top hit's page (given as a saved HTML file).
    Find(FindCmd),
    /// Print version info.
    Version(VersionCmd),
}

#[derive(clap::Args, Debug)]
struct ExtractCmd {
    /// HTML file to read ("-" for stdin).
    #[arg(long)]
    file: PathBuf,
    /// Page URL; excluded URLs (search result pages) are reported and not extracted.
    #[arg(long)]
    url: Option<String>,
    /// Output format: json|text
    #[arg(long = "output", alias = "format", default_value = "json")]
    output: String,
}

#[derive(clap::Args, Debug)]
struct HighlightCmd {
    /// HTML file to read ("-" for stdin).
    #[arg(long)]
    file: PathBuf,
    /// Text to highlight (matched case-insensitively).
    #[arg(long, required_unless_present = "message", conflicts_with = "message")]
    text: Option<String>,
    /// Raw page message instead of --text, e.g. '{"type":"highlight","text":"q","color":"orange"}'.
    #[arg(long)]
    message: Option<String>,
    /// Marker background color (default: PAGEMARK_HIGHLIGHT_COLOR or yellow).
    #[arg(long)]
    color: Option<String>,
    /// Treat --text as a regular expression instead of literal text.
    #[arg(long, default_value_t = false)]
    regex: bool,
    /// Write highlighted HTML here and print a json report; default prints HTML to stdout.
    #[arg(long)]
    out: Option<PathBuf>,
}

#[derive(clap::Args, Debug)]
struct CaptureCmd {
    /// HTML file to read ("-" for stdin).
    #[arg(long)]
    file: PathBuf,
    /// URL the page was loaded from.
    #[arg(long)]
    url: String,
    /// Backend base URL (default: PAGEMARK_BACKEND_URL or http://localhost:5000).
    #[arg(long)]
    backend_url: Option<String>,
    /// Request timeout (default: PAGEMARK_TIMEOUT_MS or 10000).
    #[arg(long)]
    timeout_ms: Option<u64>,
}

#[derive(clap::Args, Debug)]
struct SearchCmd {
    #[arg(long)]
    query: String,
    /// Number of results to request.
    #[arg(long, default_value_t = 1)]
    k: usize,
    /// Backend base URL (default: PAGEMARK_BACKEND_URL or http://localhost:5000).
    #[arg(long)]
    backend_url: Option<String>,
    #[arg(long)]
    timeout_ms: Option<u64>,
    /// Output format: json|text
    #[arg(long = "output", alias = "format", default_value = "json")]
    output: String,
}

#[derive(clap::Args, Debug)]
struct FindCmd {
    #[arg(long)]
    query: String,
    /// Saved HTML of the page the top hit points to ("-" for stdin).
    #[arg(long)]
    file: PathBuf,
    /// Marker background color (default: PAGEMARK_HIGHLIGHT_COLOR or yellow).
    #[arg(long)]
    color: Option<String>,
    /// Backend base URL (default: PAGEMARK_BACKEND_URL or http://localhost:5000).
    #[arg(long)]
    backend_url: Option<String>,
    #[arg(long)]
    timeout_ms: Option<u64>,
    /// Write highlighted HTML here; the json result is printed either way.
    #[arg(long)]
    out: Option<PathBuf>,
}

#[derive(clap::Args, Debug)]
struct VersionCmd {
    /// Output format: json|text
    #[arg(long = "output", alias = "format", default_value = "json")]
    output: String,
}

fn init_logging() {
    // stdout carries json/html; logs go to stderr.
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

/// Opt-in (PAGEMARK_ENV_FILE); never overrides variables already set in the process.
///
/// Runs before logging is installed, so a problem is returned for the caller to log.
fn load_env_file() -> Option<String> {
    let p = std::env::var("PAGEMARK_ENV_FILE").ok()?;
    let p = p.trim();
    if p.is_empty() {
        return None;
    }
    let txt = match std::fs::read_to_string(p) {
        Ok(t) => t,
        Err(e) => return Some(format!("PAGEMARK_ENV_FILE {p} not readable: {e}")),
    };
    for raw in txt.lines() {
        let s = raw.trim();
        if s.is_empty() || s.starts_with('#') {
            continue;
        }
        let Some((k, v)) = s.split_once('=') else {
            continue;
        };
        let k = k.trim();
        if k.is_empty() {
            continue;
        }
        if std::env::var_os(k).is_none() {
            std::env::set_var(k, v.trim());
        }
    }
    None
}

fn read_input(path: &Path) -> Result<String> {
    if path.as_os_str() == "-" {
        return Ok(std::io::read_to_string(std::io::stdin())?);
    }
    std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("failed to read {}: {e}", path.display()))
}

/// Backend-facing config: flags win over `PAGEMARK_*`.
fn backend_config(url: Option<&str>, timeout_ms: Option<u64>) -> Result<Config> {
    let mut cfg = Config::from_env_with_backend(url)?;
    if let Some(ms) = timeout_ms {
        cfg.timeout = Duration::from_millis(ms);
    }
    Ok(cfg)
}

fn write_out(path: &Path, html: &str) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, html)?;
    Ok(())
}

fn error_code(e: &pagemark::Error) -> &'static str {
    match e {
        pagemark::Error::InvalidUrl(_) => "invalid_url",
        pagemark::Error::Capture(_) => "capture_failed",
        pagemark::Error::Search(_) => "search_failed",
        pagemark::Error::Message(_) => "invalid_message",
        pagemark::Error::Delivery(_) => "delivery_failed",
        pagemark::Error::NotReady(_) => "not_ready",
        pagemark::Error::InvalidPattern(_) => "invalid_pattern",
        pagemark::Error::Config(_) => "config",
    }
}

fn run_extract(args: ExtractCmd) -> Result<()> {
    let exclusions = config::exclusions_from_env();
    let excluded = args
        .url
        .as_deref()
        .and_then(|u| exclusions.matching(u))
        .map(str::to_string);
    let extracted = match excluded {
        Some(_) => None,
        None => Some(extract::extract_html(&read_input(&args.file)?)),
    };

    if args.output.eq_ignore_ascii_case("text") {
        if let Some(ex) = &extracted {
            println!("{}", ex.text);
        }
        return Ok(());
    }
    let v = serde_json::json!({
        "schema_version": 1,
        "kind": "extract",
        "ok": true,
        "url": args.url,
        "excluded": excluded.is_some(),
        "excluded_by": excluded,
        "region": extracted.as_ref().map(|e| e.region),
        "title": extracted.as_ref().map(|e| e.title.as_str()),
        "text": extracted.as_ref().map(|e| e.text.as_str()).unwrap_or(""),
        "warnings": extracted.as_ref().map(|e| e.warnings.clone()).unwrap_or_default(),
    });
    println!("{v}");
    Ok(())
}

fn run_highlight(args: HighlightCmd) -> Result<()> {
    let html = read_input(&args.file)?;
    let mut doc = Document::parse(&html);
    let color = args
        .color
        .clone()
        .unwrap_or_else(config::highlight_color_from_env);

    let report: Option<HighlightReport> = match (&args.message, &args.text) {
        (Some(raw), _) => {
            let handled = dispatch::handle_json(&mut doc, raw, Some(&color));
            if !handled.ack.success {
                anyhow::bail!("unrecognized message: {raw}");
            }
            handled.report
        }
        (None, Some(text)) => {
            let opts = HighlightOptions {
                color: Some(color),
                mode: if args.regex {
                    PatternMode::Regex
                } else {
                    PatternMode::Literal
                },
            };
            Some(highlight_with(&mut doc, text, &opts))
        }
        (None, None) => anyhow::bail!("either --text or --message is required"),
    };

    let out_html = doc.to_html();
    match &args.out {
        None => println!("{out_html}"),
        Some(path) => {
            write_out(path, &out_html)?;
            let v = serde_json::json!({
                "schema_version": 1,
                "kind": "highlight",
                "ok": true,
                "out": path.display().to_string(),
                "report": report,
            });
            println!("{v}");
        }
    }
    Ok(())
}

async fn run_capture(args: CaptureCmd) -> Result<()> {
    let html = read_input(&args.file)?;
    let doc = Document::parse(&html);
    let cfg = backend_config(args.backend_url.as_deref(), args.timeout_ms)?;
    let client = BackendClient::from_config(&cfg)?;
    let outcome = capture_page(&client, &cfg.exclusions, &args.url, &doc).await;
    let v = serde_json::json!({
        "schema_version": 1,
        "kind": "capture",
        "ok": !matches!(outcome, CaptureOutcome::Failed { .. }),
        "url": args.url,
        "backend_url": client.base_url().as_str(),
        "result": outcome,
    });
    println!("{v}");
    Ok(())
}

async fn run_search(args: SearchCmd) -> Result<()> {
    let cfg = backend_config(args.backend_url.as_deref(), args.timeout_ms)?;
    let client = BackendClient::from_config(&cfg)?;
    let req = SearchRequest {
        query: args.query.clone(),
        k: args.k.max(1),
    };
    let text_mode = args.output.eq_ignore_ascii_case("text");
    match client.search(&req).await {
        Ok(resp) => {
            if text_mode {
                match resp.top() {
                    Some(hit) => println!("{}", hit.url),
                    None => println!("No results found"),
                }
                return Ok(());
            }
            let v = serde_json::json!({
                "schema_version": 1,
                "kind": "search",
                "ok": true,
                "query": resp.query,
                "k": req.k,
                "total_results": resp.total_results,
                "results": resp.results,
            });
            println!("{v}");
        }
        Err(e) => {
            if text_mode {
                anyhow::bail!("Error: {e}");
            }
            let v = serde_json::json!({
                "schema_version": 1,
                "kind": "search",
                "ok": false,
                "query": req.query,
                "k": req.k,
                "error": { "code": error_code(&e), "message": e.to_string() },
            });
            println!("{v}");
        }
    }
    Ok(())
}

async fn run_find(args: FindCmd) -> Result<()> {
    let opener = SavedPageOpener::new(read_input(&args.file)?);
    let cfg = backend_config(args.backend_url.as_deref(), args.timeout_ms)?;
    let client = BackendClient::from_config(&cfg)?;
    let color = args
        .color
        .clone()
        .unwrap_or_else(|| cfg.highlight_color.clone());

    let found = match search_and_highlight(
        &client,
        &opener,
        &args.query,
        Some(color),
        cfg.retry_delay,
    )
    .await
    {
        Ok(found) => found,
        Err(e) => {
            let v = serde_json::json!({
                "schema_version": 1,
                "kind": "find",
                "ok": false,
                "query": args.query,
                "error": { "code": error_code(&e), "message": e.to_string() },
            });
            println!("{v}");
            return Ok(());
        }
    };

    let Some(found) = found else {
        let v = serde_json::json!({
            "schema_version": 1,
            "kind": "find",
            "ok": true,
            "query": args.query,
            "hit": null,
            "message": "No results found",
        });
        println!("{v}");
        return Ok(());
    };

    if let Some(path) = &args.out {
        write_out(path, &found.page.with_document(|d| d.to_html()))?;
    }
    let v = serde_json::json!({
        "schema_version": 1,
        "kind": "find",
        "ok": true,
        "query": args.query,
        "hit": found.hit,
        "report": found.page.last_report(),
        "out": args.out.as_ref().map(|p| p.display().to_string()),
    });
    println!("{v}");
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let env_problem = load_env_file();
    init_logging();
    if let Some(problem) = env_problem {
        tracing::warn!("{problem}");
    }

    let cli = Cli::parse();

    match cli.command {
        Commands::Extract(args) => run_extract(args)?,
        Commands::Highlight(args) => run_highlight(args)?,
        Commands::Capture(args) => run_capture(args).await?,
        Commands::Search(args) => run_search(args).await?,
        Commands::Find(args) => run_find(args).await?,
        Commands::Version(args) => {
            let v = serde_json::json!({
                "schema_version": 1,
                "kind": "version",
                "ok": true,
                "name": "pagemark",
                "version": env!("CARGO_PKG_VERSION"),
            });
            match args.output.to_ascii_lowercase().as_str() {
                "text" => println!("pagemark {}", env!("CARGO_PKG_VERSION")),
                _ => println!("{}", v),
            }
        }
    }
    Ok(())
}
