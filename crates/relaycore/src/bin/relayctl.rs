//! `relayctl`: a client-side CLI over the Remote Service Proxy and the
//! Local Session Cache (spec.md §4.4/§4.5) — everything a caller needs to
//! talk to a `relayd` server without writing any code.

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use relaycore::config::Config;
use relaycore::http::ClientFactory;
use relaycore::models::Credential;
use relaycore::remote::proxy::RemoteServiceProxy;
use relaycore::services::CircuitBreakerPool;
use relaycore::session::LocalSessionCache;
use serde_json::json;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "relayctl")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Client for a relayd Remote Service Server")]
struct Cli {
    /// Configuration file path (for HTTP client profiles and cache directory)
    #[arg(short, long, default_value = "config.yaml")]
    config: String,

    /// Remote server base URL, e.g. https://relay.example.com
    #[arg(long)]
    remote: String,

    /// API key presented to the remote server
    #[arg(long)]
    api_key: String,

    /// Service tag to operate against
    #[arg(long)]
    service: String,

    /// Session profile name
    #[arg(long, default_value = "default")]
    profile: String,

    /// Proxy provider token (e.g. "nordvpn:ca1066") or qualified URI,
    /// resolved client-side against `proxy_providers` before upload
    #[arg(long)]
    proxy: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Search a service's catalog
    Search {
        query: String,
    },
    /// Resolve a title/title_id/URL into title metadata
    Titles {
        title: String,
    },
    /// List tracks for a title, optionally filtered to one episode
    Tracks {
        title: String,
        #[arg(long)]
        season: Option<i32>,
        #[arg(long)]
        episode: Option<i32>,
    },
    /// List chapters for a title
    Chapters {
        title: String,
        #[arg(long)]
        season: Option<i32>,
        #[arg(long)]
        episode: Option<i32>,
    },
    /// Supply a username/password for the next command that needs auth
    Auth {
        #[arg(long)]
        username: String,
        #[arg(long)]
        password: String,
        #[command(subcommand)]
        inner: AuthedCommand,
    },
    /// Inspect or clear the Local Session Cache
    Sessions {
        #[command(subcommand)]
        action: SessionsAction,
    },
}

#[derive(Subcommand)]
enum AuthedCommand {
    Search { query: String },
    Titles { title: String },
}

#[derive(Subcommand)]
enum SessionsAction {
    /// List all cached sessions
    List,
    /// Remove a single cached session
    Clear,
    /// Remove every expired entry
    Prune,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "relaycore=info".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let config = Arc::new(Config::load_from_file(&cli.config).unwrap_or_default());
    let breaker_pool = Arc::new(CircuitBreakerPool::new(config.circuitbreaker.clone().unwrap_or_default()));
    let client_factory = Arc::new(ClientFactory::new(config.clone(), breaker_pool));
    let session_cache = Arc::new(
        LocalSessionCache::open(config.directories.cache.clone())
            .await
            .context("failed to open local session cache")?,
    );

    match cli.command {
        Command::Sessions { action } => {
            match action {
                SessionsAction::List => {
                    for summary in session_cache.list_sessions(None).await {
                        println!(
                            "{} / {} / {} — age {}s{}",
                            summary.remote_url,
                            summary.service_tag,
                            summary.profile,
                            summary.age_seconds,
                            if summary.expired { " (expired)" } else { "" }
                        );
                    }
                }
                SessionsAction::Clear => {
                    let removed = session_cache.delete_session(&cli.remote, &cli.service, &cli.profile).await?;
                    println!("{}", if removed { "removed" } else { "no matching session" });
                }
                SessionsAction::Prune => {
                    let removed = session_cache.cleanup_expired().await?;
                    println!("pruned {removed} expired session(s)");
                }
            }
            return Ok(());
        }
        Command::Search { query } => {
            let proxy = build_proxy(&cli, config.clone(), client_factory, session_cache, None);
            print_json(proxy.search(&query).await?);
        }
        Command::Titles { title } => {
            let proxy = build_proxy(&cli, config.clone(), client_factory, session_cache, None);
            print_json(proxy.titles(&title, json!({})).await?);
        }
        Command::Tracks { title, season, episode } => {
            let proxy = build_proxy(&cli, config.clone(), client_factory, session_cache, None);
            print_json(proxy.tracks(&title, season, episode).await?);
        }
        Command::Chapters { title, season, episode } => {
            let proxy = build_proxy(&cli, config.clone(), client_factory, session_cache, None);
            print_json(proxy.chapters(&title, season, episode).await?);
        }
        Command::Auth { username, password, inner } => {
            let credential = Credential { username, password };
            let proxy = build_proxy(&cli, config.clone(), client_factory, session_cache, Some(credential));
            match inner {
                AuthedCommand::Search { query } => print_json(proxy.search(&query).await?),
                AuthedCommand::Titles { title } => print_json(proxy.titles(&title, json!({})).await?),
            }
        }
    }

    Ok(())
}

fn build_proxy(
    cli: &Cli,
    config: Arc<Config>,
    client_factory: Arc<ClientFactory>,
    session_cache: Arc<LocalSessionCache>,
    credential: Option<Credential>,
) -> RemoteServiceProxy {
    let mut proxy = RemoteServiceProxy::new(
        cli.remote.as_str(),
        cli.api_key.as_str(),
        cli.service.as_str(),
        cli.profile.as_str(),
        client_factory,
        session_cache,
        config,
    );
    if let Some(proxy_token) = &cli.proxy {
        proxy = proxy.with_proxy(proxy_token.clone());
    }
    match credential {
        Some(credential) => proxy.with_credential(credential),
        None => proxy,
    }
}

fn print_json(value: serde_json::Value) {
    match serde_json::to_string_pretty(&value) {
        Ok(text) => println!("{text}"),
        Err(_) => println!("{value}"),
    }
}
