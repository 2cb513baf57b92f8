//! A3S SERP - search result scraper command line interface.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use a3s_serp::{
    captcha::{CaptchaSolver, TwoCaptcha},
    config::Settings,
    engines::{build_registry, options_for, providers},
    page::Navigator,
    server::Server,
    transport::RawTransport,
    DateInterval, EngineRegistry, Query,
};

/// A3S SERP - search engine result scraper
#[derive(Parser)]
#[command(name = "a3s-serp")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// YAML configuration file
    #[arg(short, long, global = true, env = "A3S_SERP_CONFIG")]
    config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Enable trace output
    #[arg(long, global = true)]
    trace: bool,

    #[command(flatten)]
    overrides: Overrides,
}

/// Flags that take precedence over the file and environment.
#[derive(Args)]
struct Overrides {
    /// Listen host
    #[arg(long, global = true)]
    host: Option<String>,

    /// Listen port
    #[arg(long, global = true)]
    port: Option<u16>,

    /// Proxy URL (e.g., http://127.0.0.1:8080 or socks5://127.0.0.1:1080)
    #[arg(long, global = true)]
    proxy: Option<String>,

    /// Accept invalid TLS certificates
    #[arg(long, global = true)]
    insecure: bool,

    /// Fetch result pages without a browser
    #[arg(long, global = true)]
    raw: bool,

    /// Show the browser window
    #[arg(long, global = true)]
    head: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP API
    #[command(alias = "listen")]
    Serve,

    /// Run one search and print the results as JSON
    Search(SearchArgs),

    /// List available search engines
    Engines,

    /// Print version information
    Version,
}

#[derive(Args)]
struct SearchArgs {
    /// Engine name (see `engines`)
    engine: String,

    /// Search query
    text: String,

    /// Result page, starting at 1
    #[arg(short, long, default_value = "1")]
    page: u32,

    /// Restrict results to a site
    #[arg(short, long)]
    site: Option<String>,

    /// Restrict results to a file type
    #[arg(short, long)]
    file: Option<String>,

    /// Date interval as YYYYMMDD..YYYYMMDD
    #[arg(short, long)]
    date: Option<String>,

    /// Maximum number of results
    #[arg(short, long)]
    limit: Option<usize>,

    /// Image search instead of web search
    #[arg(long)]
    image: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli)?;

    match cli.command {
        Commands::Version => {
            println!("a3s-serp {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        Commands::Engines => {
            let settings = load_settings(cli.config.as_deref(), &cli.overrides)?;
            list_engines(&settings);
            Ok(())
        }
        Commands::Serve => {
            let settings = load_settings(cli.config.as_deref(), &cli.overrides)?;
            serve(settings).await
        }
        Commands::Search(args) => {
            let settings = load_settings(cli.config.as_deref(), &cli.overrides)?;
            run_search(settings, args).await
        }
    }
}

fn init_logging(cli: &Cli) -> Result<()> {
    let level = if cli.trace {
        "trace"
    } else if cli.verbose {
        "debug"
    } else {
        "info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}

fn load_settings(path: Option<&std::path::Path>, overrides: &Overrides) -> Result<Settings> {
    let mut settings = Settings::load(path)?;
    if let Some(host) = &overrides.host {
        settings.server.host = host.clone();
    }
    if let Some(port) = overrides.port {
        settings.server.port = port;
    }
    if let Some(proxy) = &overrides.proxy {
        settings.app.proxy_url = Some(proxy.clone());
    }
    if overrides.insecure {
        settings.app.insecure = true;
    }
    if overrides.raw {
        settings.app.raw_requests = true;
    }
    if overrides.head {
        settings.app.headless = false;
    }
    settings.validate()?;
    Ok(settings)
}

fn list_engines(settings: &Settings) {
    println!("Available search engines:\n");
    for provider in providers() {
        let options = options_for(provider.as_ref(), settings);
        println!(
            "  {:<12} timeout {}ms, one request per {}ms (burst {})",
            provider.name(),
            options.timeout_ms,
            options.rate_interval_ms,
            options.rate_burst
        );
    }
    println!();
    println!("Usage: a3s-serp search brave \"query\" --page 2");
}

#[cfg(feature = "headless")]
async fn launch_browser(settings: &Settings) -> Result<Option<Arc<dyn Navigator>>> {
    if settings.app.raw_requests {
        return Ok(None);
    }
    let session = a3s_serp::browser::BrowserSession::launch(settings.session_config())
        .await
        .context("cannot start the browser; install Chrome or use --raw")?;
    Ok(Some(Arc::new(session)))
}

#[cfg(not(feature = "headless"))]
async fn launch_browser(settings: &Settings) -> Result<Option<Arc<dyn Navigator>>> {
    if !settings.app.raw_requests {
        warn!("Built without the headless feature, using raw requests");
    }
    Ok(None)
}

fn solver(settings: &Settings) -> Option<Arc<dyn CaptchaSolver>> {
    let key = settings.captcha.api_key.as_deref().filter(|k| !k.is_empty())?;
    info!("Captcha solver enabled");
    Some(Arc::new(TwoCaptcha::new(key)))
}

async fn build(settings: &Settings) -> Result<(Arc<EngineRegistry>, Option<Arc<dyn Navigator>>)> {
    let navigator = launch_browser(settings).await?;
    let registry = build_registry(
        settings,
        navigator.clone(),
        Arc::new(RawTransport::new()),
        solver(settings),
    )?;
    Ok((Arc::new(registry), navigator))
}

async fn serve(settings: Settings) -> Result<()> {
    let addr = settings.server.addr();
    // Bind before launching the browser so a taken port fails fast.
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("cannot bind {}", addr))?;

    let (registry, navigator) = build(&settings).await?;
    let server = Arc::new(Server::new(
        registry,
        navigator,
        settings.server.shutdown_grace(),
    ));

    let mut serving = tokio::spawn({
        let server = Arc::clone(&server);
        async move { server.serve(listener).await }
    });

    tokio::select! {
        signal = shutdown_signal() => info!("Received {}", signal),
        outcome = &mut serving => match outcome {
            Ok(Ok(())) => warn!("Listener stopped unexpectedly"),
            Ok(Err(e)) => error!("Listener failed: {}", e),
            Err(e) => error!("Listener task failed: {}", e),
        },
    }

    server.shutdown().await;
    serving.abort();
    Ok(())
}

#[cfg(unix)]
async fn shutdown_signal() -> &'static str {
    use tokio::signal::unix::{signal, SignalKind};

    let kinds = [
        (SignalKind::interrupt(), "SIGINT"),
        (SignalKind::terminate(), "SIGTERM"),
        (SignalKind::hangup(), "SIGHUP"),
        (SignalKind::quit(), "SIGQUIT"),
    ];
    let mut waits = Vec::with_capacity(kinds.len());
    for (kind, name) in kinds {
        match signal(kind) {
            Ok(mut stream) => waits.push(Box::pin(async move {
                stream.recv().await;
                name
            })),
            Err(e) => warn!("Cannot listen for {}: {}", name, e),
        }
    }
    if waits.is_empty() {
        return std::future::pending().await;
    }
    futures::future::select_all(waits).await.0
}

#[cfg(not(unix))]
async fn shutdown_signal() -> &'static str {
    if tokio::signal::ctrl_c().await.is_err() {
        return std::future::pending().await;
    }
    "Ctrl-C"
}

async fn run_search(settings: Settings, args: SearchArgs) -> Result<()> {
    let mut query = Query::new(&args.text).with_page(args.page);
    if let Some(site) = args.site {
        query = query.with_site(site);
    }
    if let Some(file) = args.file {
        query = query.with_filetype(file);
    }
    if let Some(date) = args.date {
        query = query.with_date_interval(DateInterval::parse(&date)?);
    }
    if let Some(limit) = args.limit {
        query = query.with_limit(limit);
    }

    let (registry, navigator) = build(&settings).await?;
    let outcome = match registry.get(&args.engine) {
        Some(engine) => {
            engine.rate_limiter().acquire().await;
            let results = if args.image {
                engine.search_image(&query).await
            } else {
                engine.search(&query).await
            };
            results.map(|r| a3s_serp::apply_limit(a3s_serp::deduplicate(r), query.limit))
        }
        None => Err(a3s_serp::SearchError::UnknownEngine(args.engine.clone())),
    };

    if let Some(navigator) = navigator {
        navigator.release().await;
    }

    let results = outcome?;
    println!("{}", serde_json::to_string_pretty(&results)?);
    Ok(())
}
