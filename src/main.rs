//! hookwire CLI
//!
//! Run the capture gateway, or attach to an endpoint's live stream and relay
//! captured requests to a local server with automatic reconnection.

mod config;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use hookwire_gateway::{GatewayConfig, GatewayServer};
use hookwire_live::{Action, Applied, LiveList};
use hookwire_proto::{Headers, TrustedProxies, MAX_BODY_SIZE};
use hookwire_relay::{
    create_tunnel_endpoint, parse_header, ApiClient, ConnectionState, LocalTarget, RelayEvent,
    ReplayOutcome, Replayer, TunnelConfig, TunnelSession,
};
use hookwire_store::{HttpStore, HttpStoreConfig, MemoryStore};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::config::{ConfigManager, DEFAULT_API_URL};

/// hookwire - capture webhooks and relay them to your machine
#[derive(Parser, Debug)]
#[command(name = "hookwire")]
#[command(about = "Capture webhooks and relay them to your machine")]
#[command(version = env!("GIT_TAG"))]
#[command(long_version = concat!(env!("GIT_TAG"), "\nCommit: ", env!("GIT_HASH"), "\nBuilt: ", env!("BUILD_TIME")))]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Log level (trace, debug, info, warn, error); RUST_LOG takes precedence
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

/// Where the management API lives and how to authenticate
#[derive(Args, Debug)]
struct ApiArgs {
    /// API base URL (default: stored value, then http://localhost:3001)
    #[arg(long, env = "HOOKWIRE_API_URL")]
    api_url: Option<String>,

    /// API bearer token (default: stored value)
    #[arg(long, env = "HOOKWIRE_TOKEN", hide_env_values = true)]
    token: Option<String>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the capture gateway
    #[command(long_about = r#"
Run the capture gateway on /w/{slug}/{*path}.

With --store-url every capture is forwarded to a remote store service.
Without it the gateway runs standalone: endpoints and requests are kept in
memory and the management API (/api/...) is served alongside the capture
route.

ENVIRONMENT VARIABLES:
  HOOKWIRE_BIND             Address to bind
  HOOKWIRE_STORE_URL        Remote store base URL
  HOOKWIRE_STORE_SECRET     Shared secret for the remote store
  HOOKWIRE_TRUSTED_PROXIES  Comma separated proxy IPs/CIDRs
  HOOKWIRE_API_TOKEN        Bearer token for the standalone API
    "#)]
    Serve(ServeArgs),

    /// Relay an endpoint's requests to a local server
    #[command(long_about = r#"
Subscribe to an endpoint's live stream and replay every captured request
against a local server. Credentials and hop-by-hop headers are stripped
before replay; use -H to add headers your local server needs.

EXAMPLES:
  hookwire tunnel abc123 --target 3000
  hookwire tunnel --new --ephemeral --target http://localhost:8080/webhooks
  hookwire tunnel abc123 --target 3000 -H 'Authorization: Bearer dev'
    "#)]
    Tunnel {
        /// Endpoint slug
        #[arg(required_unless_present = "new")]
        slug: Option<String>,

        /// Create a new endpoint for this session
        #[arg(long, conflicts_with = "slug")]
        new: bool,

        /// Local target: port, host:port or URL
        #[arg(short, long, required_unless_present = "listen_only")]
        target: Option<String>,

        /// Extra header for replayed requests ('Name: value'), repeatable
        #[arg(short = 'H', long = "header")]
        headers: Vec<String>,

        /// Delete the endpoint when the tunnel stops
        #[arg(long)]
        ephemeral: bool,

        /// Print incoming requests without replaying them
        #[arg(long)]
        listen_only: bool,

        #[command(flatten)]
        api: ApiArgs,
    },

    /// Print an endpoint's recent requests, then follow new ones
    Listen {
        /// Endpoint slug
        slug: String,

        /// Number of recent requests to show first
        #[arg(long, default_value = "20")]
        limit: usize,

        /// Only show requests with this method
        #[arg(long)]
        method: Option<String>,

        /// Only show requests containing this text
        #[arg(long)]
        grep: Option<String>,

        #[command(flatten)]
        api: ApiArgs,
    },

    /// Replay one captured request against a target
    Replay {
        /// Endpoint slug
        slug: String,

        /// Captured request id
        request_id: String,

        /// Target: port, host:port or URL
        #[arg(short, long)]
        target: String,

        /// Extra header ('Name: value'), repeatable
        #[arg(short = 'H', long = "header")]
        headers: Vec<String>,

        #[command(flatten)]
        api: ApiArgs,
    },

    /// Manage stored CLI settings
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Args, Debug)]
struct ServeArgs {
    /// Address to bind
    #[arg(long, env = "HOOKWIRE_BIND", default_value = "0.0.0.0:3001")]
    bind: SocketAddr,

    /// Remote store base URL; omit to run standalone with an in-memory store
    #[arg(long, env = "HOOKWIRE_STORE_URL", conflicts_with = "standalone")]
    store_url: Option<String>,

    /// Shared secret sent to the remote store as a bearer token
    #[arg(long, env = "HOOKWIRE_STORE_SECRET", hide_env_values = true)]
    store_secret: Option<String>,

    /// Run with the in-memory store and serve the management API
    #[arg(long)]
    standalone: bool,

    /// Store call timeout in seconds
    #[arg(long, default_value = "10")]
    store_timeout: u64,

    /// Largest accepted capture body in bytes
    #[arg(long, default_value_t = MAX_BODY_SIZE)]
    max_body_size: usize,

    /// Peers allowed to set X-Real-Ip / X-Forwarded-For (empty = any)
    #[arg(long, env = "HOOKWIRE_TRUSTED_PROXIES", default_value = "")]
    trusted_proxies: String,

    /// Bearer token required by the standalone API
    #[arg(long, env = "HOOKWIRE_API_TOKEN", hide_env_values = true)]
    api_token: Option<String>,
}

#[derive(Subcommand, Debug)]
enum ConfigAction {
    /// Store the default API token
    SetToken { token: String },
    /// Remove the stored API token
    ClearToken,
    /// Store the default API URL
    SetUrl { url: String },
    /// Show stored settings
    Show,
}

/// Setup logging; RUST_LOG wins over the command line
fn setup_logging(log_level: &str, verbose: bool) {
    let level = if verbose { "debug" } else { log_level };

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true).with_thread_ids(false))
        .with(filter)
        .init();
}

/// Resolves on Ctrl+C, or SIGTERM on unix
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, shutting down..."),
        _ = terminate => info!("Received SIGTERM, shutting down..."),
    }
}

fn api_client(args: &ApiArgs) -> Result<ApiClient> {
    let stored = ConfigManager::new()
        .and_then(|manager| manager.load())
        .unwrap_or_else(|e| {
            warn!("Ignoring stored config: {}", e);
            Default::default()
        });

    let url = stored.api_url_or(args.api_url.clone());
    let token = stored.token_or(args.token.clone());
    ApiClient::new(&url, token).with_context(|| format!("Invalid API URL: {}", url))
}

fn parse_headers(lines: &[String]) -> Result<Headers> {
    let mut headers = Headers::new();
    for line in lines {
        let (name, value) = parse_header(line)?;
        headers.append(name, value);
    }
    Ok(headers)
}

async fn run_serve(args: ServeArgs) -> Result<()> {
    let trusted_proxies =
        TrustedProxies::parse(&args.trusted_proxies).context("Invalid --trusted-proxies")?;

    let config = GatewayConfig {
        bind_addr: args.bind,
        max_body_size: args.max_body_size,
        store_timeout: Duration::from_secs(args.store_timeout),
        trusted_proxies,
        api_token: args.api_token.filter(|token| !token.is_empty()),
    };
    info!("Gateway config: {:?}", config);

    let server = match args.store_url.filter(|_| !args.standalone) {
        Some(url) => {
            let secret = args
                .store_secret
                .context("--store-secret is required with --store-url")?;
            let store_config = HttpStoreConfig::new(&url, secret).with_timeout(config.store_timeout);
            let store = HttpStore::new(store_config).context("Failed to create store client")?;
            info!("Forwarding captures to {}", url);
            GatewayServer::new(config, Arc::new(store))
        }
        None => {
            info!("Running standalone with an in-memory store");
            GatewayServer::standalone(config, Arc::new(MemoryStore::new()))
        }
    };

    server
        .run(shutdown_signal())
        .await
        .context("Gateway failed")?;
    Ok(())
}

/// Run a session until it fails or the process is asked to stop
async fn run_until_shutdown(session: TunnelSession) -> Result<()> {
    let cancel = CancellationToken::new();
    let mut task: JoinHandle<_> = tokio::spawn(session.run(cancel.clone()));

    let result = tokio::select! {
        _ = shutdown_signal() => {
            cancel.cancel();
            (&mut task).await
        }
        result = &mut task => result,
    };

    match result {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(e).context("Tunnel stopped"),
        Err(e) => Err(e).context("Tunnel task failed"),
    }
}

async fn run_tunnel(
    slug: Option<String>,
    target: Option<String>,
    headers: Vec<String>,
    ephemeral: bool,
    listen_only: bool,
    api: ApiArgs,
) -> Result<()> {
    let api = api_client(&api)?;

    let slug = match slug {
        Some(slug) => {
            api.get_endpoint(&slug)
                .await
                .with_context(|| format!("Endpoint '{}' is not available", slug))?;
            slug
        }
        None => {
            let endpoint = create_tunnel_endpoint(&api, ephemeral)
                .await
                .context("Failed to create endpoint")?;
            info!("Created endpoint {}", endpoint.slug);
            endpoint.slug
        }
    };

    let mut builder = TunnelConfig::builder()
        .slug(&slug)
        .ephemeral(ephemeral)
        .listen_only(listen_only);
    if let Some(target) = target {
        builder = builder.target(target);
    }
    for header in headers {
        builder = builder.header(header);
    }
    let config = builder.build()?;

    let capture_url = format!("{}w/{}", api.base_url(), slug);
    match &config.target {
        Some(target) if !listen_only => info!("Relaying {} -> {}", capture_url, target),
        _ => info!("Listening on {}", capture_url),
    }
    if ephemeral {
        info!("Endpoint {} will be deleted on exit", slug);
    }

    let (session, _states, mut events) = TunnelSession::new(config, api)?;

    let summary = tokio::spawn(async move {
        let mut received = 0usize;
        let mut failed = 0usize;
        while let Some(event) = events.recv().await {
            match event {
                RelayEvent::Received(_) => received += 1,
                RelayEvent::Replayed(outcome) if !outcome.is_success() => failed += 1,
                RelayEvent::Replayed(_) => {}
            }
        }
        (received, failed)
    });

    let result = run_until_shutdown(session).await;

    if let Ok((received, failed)) = summary.await {
        info!("{} requests received, {} replays failed", received, failed);
    }
    result
}

async fn run_listen(
    slug: String,
    limit: usize,
    method: Option<String>,
    grep: Option<String>,
    api: ApiArgs,
) -> Result<()> {
    let api = api_client(&api)?;
    let config = TunnelConfig::builder()
        .slug(&slug)
        .listen_only(true)
        .build()?;
    let (session, mut states, mut events) = TunnelSession::new(config, api.clone())?;

    let mut list = LiveList::new();
    list.apply(Action::EndpointSwitched(slug.clone()));
    list.apply(Action::FilterChanged { method, text: grep });
    let tag = list.tag().context("live list has no endpoint")?;

    let printer = tokio::spawn(async move {
        // Subscribe before fetching the snapshot so nothing falls in between
        if states
            .wait_for(|state| *state == ConnectionState::Streaming)
            .await
            .is_err()
        {
            return;
        }

        match api.list_requests(&slug, limit).await {
            Ok(records) => {
                list.apply(Action::Snapshot {
                    tag: tag.clone(),
                    records,
                });
                for record in list.visible(0, limit).into_iter().rev() {
                    println!("{}", record);
                }
            }
            Err(e) => warn!("Failed to load recent requests: {}", e),
        }

        while let Some(event) = events.recv().await {
            let RelayEvent::Received(record) = event else {
                continue;
            };
            let shown = list.filter().matches(&record).then(|| record.to_string());
            let applied = list.apply(Action::NewRecord {
                tag: tag.clone(),
                record,
            });
            if let (Applied::Applied, Some(line)) = (applied, shown) {
                println!("{}", line);
            }
        }
    });

    let result = run_until_shutdown(session).await;
    printer.abort();
    result
}

async fn run_replay(
    slug: String,
    request_id: String,
    target: String,
    headers: Vec<String>,
    api: ApiArgs,
) -> Result<()> {
    let api = api_client(&api)?;
    let record = api
        .get_request(&slug, &request_id)
        .await
        .with_context(|| format!("Failed to fetch request {}", request_id))?;

    let target = LocalTarget::parse(&target)?;
    let replayer = Replayer::new(target, parse_headers(&headers)?)?;
    let outcome = replayer.replay(&record).await;
    print_outcome(&outcome);

    match outcome.error {
        Some(e) => anyhow::bail!("Replay failed: {}", e),
        None => Ok(()),
    }
}

fn print_outcome(outcome: &ReplayOutcome) {
    let status = outcome
        .status
        .map(|s| s.to_string())
        .unwrap_or_else(|| "---".to_string());
    println!(
        "{} {} -> {} ({}ms, {} bytes)",
        outcome.method,
        outcome.path,
        status,
        outcome.latency.as_millis(),
        outcome.body_size
    );
}

fn run_config(action: ConfigAction) -> Result<()> {
    let manager = ConfigManager::new()?;

    match action {
        ConfigAction::SetToken { token } => {
            manager.set_token(token)?;
            println!("Token saved to {}", manager.path().display());
        }
        ConfigAction::ClearToken => {
            manager.clear_token()?;
            println!("Token cleared");
        }
        ConfigAction::SetUrl { url } => {
            ApiClient::new(&url, None).with_context(|| format!("Invalid API URL: {}", url))?;
            manager.set_api_url(url)?;
            println!("API URL saved to {}", manager.path().display());
        }
        ConfigAction::Show => {
            let config = manager.load()?;
            println!("Config file: {}", manager.path().display());
            println!(
                "API URL:     {}",
                config.api_url.as_deref().unwrap_or(DEFAULT_API_URL)
            );
            println!(
                "Token:       {}",
                config
                    .auth_token
                    .as_deref()
                    .map(mask)
                    .unwrap_or_else(|| "(not set)".to_string())
            );
        }
    }
    Ok(())
}

fn mask(token: &str) -> String {
    let visible: String = token.chars().take(4).collect();
    format!("{}****", visible)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    setup_logging(&cli.log_level, cli.verbose);

    match cli.command {
        Commands::Serve(args) => run_serve(args).await,
        Commands::Tunnel {
            slug,
            new: _,
            target,
            headers,
            ephemeral,
            listen_only,
            api,
        } => run_tunnel(slug, target, headers, ephemeral, listen_only, api).await,
        Commands::Listen {
            slug,
            limit,
            method,
            grep,
            api,
        } => run_listen(slug, limit, method, grep, api).await,
        Commands::Replay {
            slug,
            request_id,
            target,
            headers,
            api,
        } => run_replay(slug, request_id, target, headers, api).await,
        Commands::Config { action } => run_config(action),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_tunnel_requires_slug_or_new() {
        assert!(Cli::try_parse_from(["hookwire", "tunnel", "--target", "3000"]).is_err());
        assert!(Cli::try_parse_from(["hookwire", "tunnel", "--new", "--target", "3000"]).is_ok());
        assert!(
            Cli::try_parse_from(["hookwire", "tunnel", "abc", "--new", "--target", "3000"])
                .is_err()
        );
    }

    #[test]
    fn test_tunnel_target_optional_when_listening() {
        assert!(Cli::try_parse_from(["hookwire", "tunnel", "abc"]).is_err());
        assert!(Cli::try_parse_from(["hookwire", "tunnel", "abc", "--listen-only"]).is_ok());
    }

    #[test]
    fn test_repeatable_headers() {
        let cli = Cli::try_parse_from([
            "hookwire", "tunnel", "abc", "-t", "3000", "-H", "X-A: 1", "-H", "X-B: 2",
        ])
        .unwrap();
        match cli.command {
            Commands::Tunnel { headers, .. } => assert_eq!(headers, vec!["X-A: 1", "X-B: 2"]),
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_parse_headers() {
        let headers = parse_headers(&["X-A: 1".to_string(), "x-a: 2".to_string()]).unwrap();
        assert_eq!(headers.get("X-A"), Some("1, 2"));
        assert!(parse_headers(&["broken".to_string()]).is_err());
    }

    #[test]
    fn test_mask() {
        assert_eq!(mask("tok_abcdef"), "tok_****");
        assert_eq!(mask("ab"), "ab****");
    }
}
