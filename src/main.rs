use anyhow::{Context, Result, anyhow, bail};
use chrono::Utc;
use clap::{ArgAction, Parser};
use env_logger::Env;
use log::{debug, info, warn};
use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};
use url::Url;

use matchcast::config::cache::DomainCache;
use matchcast::config::{EmbedDomainConfig, PlaybackPolicy};
use matchcast::error::PlaybackFault;
use matchcast::hls;
use matchcast::model::{QualityLevel, Stream};
use matchcast::player::adaptive::{AdaptiveEvent, ErrorKind};
use matchcast::player::embed::CrossOrigin;
use matchcast::player::{PlayerStrategy, dispatch};
use matchcast::probe::{ProbeOutcome, load_match, probe};
use matchcast::resolver::MAX_EXTRA_STREAMS;
use matchcast::session::{Command, SessionManager, SurfaceEvent};
use matchcast::telemetry::{LogTelemetry, PlayerHost};

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Resolve and check the playable stream of a sports match"
)]
struct Cli {
    /// Match record: a JSON file or an http(s) URL serving one
    #[arg(value_name = "MATCH")]
    input: String,

    /// Base URL embeds are served from (defaults to the cached one)
    #[arg(long, value_name = "URL")]
    embed_domain: Option<String>,

    /// Fetch the current embed domain from this endpoint first
    #[arg(long, value_name = "URL")]
    domain_endpoint: Option<Url>,

    /// List discovered streams and exit
    #[arg(short, long, action = ArgAction::SetTrue)]
    list: bool,

    /// Select the source of this provider instead of the first one
    #[arg(short, long, value_name = "NAME")]
    provider: Option<String>,

    /// Stream index to use with --provider
    #[arg(long, value_name = "N", requires = "provider")]
    stream_index: Option<u32>,

    /// Print the selected embed URL instead of checking it
    #[arg(long, action = ArgAction::SetTrue)]
    stream_url: bool,

    /// Quality for manifest streams (best, worst, auto, or a label like 720p)
    #[arg(short, long, default_value = "auto")]
    quality: String,

    /// Exit instead of waiting when the match has not started yet
    #[arg(long, action = ArgAction::SetTrue)]
    no_wait: bool,

    /// Override the default user agent
    #[arg(long, value_name = "AGENT")]
    user_agent: Option<String>,

    /// Buffer stalls before the automatic quality downgrade
    #[arg(long, value_name = "N")]
    stall_threshold: Option<u32>,

    /// Seconds before switching a silent primary embed to the backup
    #[arg(long, value_name = "SECS")]
    fallback_delay: Option<u64>,

    /// Seconds to wait for a load signal before assuming success
    #[arg(long, value_name = "SECS")]
    load_timeout: Option<u64>,

    /// Interactions swallowed before the embed receives input
    #[arg(long, value_name = "N")]
    interaction_threshold: Option<u32>,

    /// Additional stream indices to resolve per source (at most 16)
    #[arg(long, value_name = "N", value_parser = parse_extra_streams)]
    extra_streams: Option<u32>,
}

impl Cli {
    fn policy(&self) -> PlaybackPolicy {
        let mut policy = PlaybackPolicy::default();
        if let Some(n) = self.stall_threshold {
            policy.stall_threshold = n;
        }
        if let Some(secs) = self.fallback_delay {
            policy.fallback_delay = Duration::from_secs(secs);
        }
        if let Some(secs) = self.load_timeout {
            policy.load_timeout = Duration::from_secs(secs);
        }
        if let Some(n) = self.interaction_threshold {
            policy.interaction_threshold = n;
        }
        if let Some(n) = self.extra_streams {
            policy.extra_streams = n;
        }
        policy
    }
}

fn parse_extra_streams(value: &str) -> Result<u32, String> {
    let n: u32 = value.parse().map_err(|err| format!("{err}"))?;
    if n > MAX_EXTRA_STREAMS {
        return Err(format!("at most {MAX_EXTRA_STREAMS} extra streams per source"));
    }
    Ok(n)
}

struct ConsoleHost;

impl PlayerHost for ConsoleHost {
    fn on_load(&self) {
        info!("Stream loaded");
    }

    fn on_error(&self, fault: &PlaybackFault) {
        if fault.is_terminal() {
            warn!("{fault}");
        } else {
            debug!("{fault}");
        }
    }

    fn on_quality_change(&self, level: &QualityLevel) {
        info!("Quality: {}", level.label());
    }

    fn on_reload(&self, stream: &Stream) {
        debug!("Loading {}", stream.embed_url);
    }
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(Env::default().filter_or("RUST_LOG", "info"))
        .format_timestamp(None)
        .init();

    let cli = Cli::parse();
    let policy = cli.policy();
    let client = build_client(cli.user_agent.clone(), policy.load_timeout)?;
    let domain = Arc::new(load_domain(&cli, &client)?);
    info!("Using embed domain {}", domain.current());

    let m = load_match(&client, &cli.input)?;
    let mut manager = SessionManager::new(
        domain,
        policy,
        Box::new(LogTelemetry),
        Box::new(ConsoleHost),
        Box::new(CrossOrigin),
    );

    let now = Instant::now();
    let mut queue = VecDeque::from(manager.select_match(m.clone(), now, Utc::now()));

    if let Some(provider) = &cli.provider {
        let source = m
            .sources
            .iter()
            .find(|source| source.provider.eq_ignore_ascii_case(provider))
            .ok_or_else(|| anyhow!("Provider '{provider}' has no source for this match"))?;
        let commands = manager.select_stream(source, cli.stream_index, now, Utc::now());
        queue.extend(commands);
    }

    if cli.list {
        print_streams(&manager);
        return Ok(());
    }

    let Some(session) = manager.session() else {
        bail!("{}", PlaybackFault::ResolutionEmpty);
    };

    if cli.stream_url {
        println!("{}", session.stream().embed_url);
        return Ok(());
    }

    if cli.no_wait {
        if let Some(parts) = manager.countdown(Utc::now()) {
            println!("{} starts in {parts}", m.title);
            return Ok(());
        }
    }

    watch(&client, &mut manager, queue, &cli.quality)
}

fn watch(
    client: &Client,
    manager: &mut SessionManager,
    mut queue: VecDeque<Command>,
    quality: &str,
) -> Result<()> {
    let mut last_countdown = None;
    let mut quality_applied = false;

    loop {
        while let Some(command) = queue.pop_front() {
            let events = execute(client, manager, command);
            for event in events {
                queue.extend(manager.handle(event, Instant::now()));
            }
        }

        let session = manager
            .session()
            .ok_or_else(|| anyhow!("{}", PlaybackFault::ResolutionEmpty))?;

        if let Some(fault) = session.terminal() {
            eprintln!("{fault}");
            eprintln!(
                "Retry later or open the stream directly: {}",
                session.stream().embed_url
            );
            bail!("Playback failed");
        }

        if session.is_loaded() {
            if !quality_applied {
                quality_applied = true;
                let index = session
                    .adaptive()
                    .and_then(|adaptive| select_level(adaptive.ladder().levels(), quality));
                if let Some(index) = index {
                    let event = SurfaceEvent::SelectQuality(index);
                    queue.extend(manager.handle(event, Instant::now()));
                    continue;
                }
            }
            print_playback(manager);
            return Ok(());
        }

        if let Some(parts) = manager.countdown(Utc::now()) {
            if last_countdown != Some(parts) {
                println!("Starts in {parts}");
                last_countdown = Some(parts);
            }
        }

        let now = Instant::now();
        let wait = manager
            .next_deadline()
            .map(|at| at.saturating_duration_since(now))
            .unwrap_or(Duration::from_secs(1))
            .clamp(Duration::from_millis(20), Duration::from_secs(1));
        std::thread::sleep(wait);
        queue.extend(manager.poll(Instant::now(), Utc::now()));
    }
}

/// Performs a surface command and reports what the surface observed.
fn execute(client: &Client, manager: &SessionManager, command: Command) -> Vec<SurfaceEvent> {
    let (url, strategy) = match command {
        Command::Attach { url, strategy } => (url, strategy),
        Command::ReloadManifest | Command::RecoverMediaError => {
            let Some(session) = manager.session() else {
                return Vec::new();
            };
            let url = session.active_url().to_string();
            let strategy = dispatch(&url);
            (url, strategy)
        }
        other => {
            debug!("Surface: {other:?}");
            return Vec::new();
        }
    };

    info!("Checking {url} ({strategy})");
    match (probe(client, &url, strategy), strategy) {
        (ProbeOutcome::Manifest(variants), _) => {
            for variant in &variants {
                debug!("Variant {} at {}", variant.level.label(), variant.uri);
            }
            let levels = hls::levels(&variants);
            let event = SurfaceEvent::Adaptive(AdaptiveEvent::ManifestParsed(levels));
            vec![event]
        }
        (ProbeOutcome::Page, _) => vec![SurfaceEvent::Loaded],
        (ProbeOutcome::TimedOut, _) => {
            debug!("{url} is slow to answer, waiting on the load timer");
            Vec::new()
        }
        (ProbeOutcome::Failed(reason), PlayerStrategy::Adaptive) => {
            let error = AdaptiveEvent::Error {
                kind: ErrorKind::Other,
                fatal: true,
                details: reason,
            };
            vec![SurfaceEvent::Adaptive(error)]
        }
        (ProbeOutcome::Failed(reason), PlayerStrategy::Embed) => {
            vec![SurfaceEvent::LoadFailed(reason)]
        }
    }
}

fn load_domain(cli: &Cli, client: &Client) -> Result<EmbedDomainConfig> {
    let explicit = cli.embed_domain.as_deref();
    let configured = EmbedDomainConfig::with_cache(explicit, DomainCache::new());

    match (&cli.domain_endpoint, configured) {
        (Some(endpoint), Ok(config)) => {
            if let Err(err) = config.refresh(client, endpoint) {
                warn!("Keeping embed domain {}: {err:#}", config.current());
            }
            Ok(config)
        }
        (Some(endpoint), Err(_)) => {
            EmbedDomainConfig::bootstrap(client, endpoint, DomainCache::new())
        }
        (None, configured) => configured.context("Pass --embed-domain or --domain-endpoint"),
    }
}

fn build_client(user_agent: Option<String>, timeout: Duration) -> Result<Client> {
    let mut headers = HeaderMap::new();
    let agent = user_agent.unwrap_or_else(|| "matchcast/0.1".to_string());
    headers.insert(
        USER_AGENT,
        HeaderValue::from_str(&agent).context("Invalid user agent value")?,
    );

    Client::builder()
        .default_headers(headers)
        .timeout(timeout)
        .redirect(reqwest::redirect::Policy::limited(10))
        .build()
        .context("Failed to build HTTP client")
}

fn select_level(levels: &[QualityLevel], quality: &str) -> Option<i32> {
    let q = quality.to_lowercase();
    let level = match q.as_str() {
        "auto" => return None,
        "best" => levels.iter().max_by_key(|level| level.bitrate_bps),
        "worst" => levels.iter().min_by_key(|level| level.bitrate_bps),
        _ => levels
            .iter()
            .find(|level| level.label().to_lowercase() == q),
    };
    if level.is_none() {
        warn!("Quality '{quality}' is not available, staying on auto");
    }
    level.map(|level| level.index)
}

fn print_streams(manager: &SessionManager) {
    if let Some(m) = manager.current_match() {
        let teams = m
            .teams
            .as_ref()
            .map(|teams| format!(" ({} - {})", teams.home, teams.away))
            .unwrap_or_default();
        println!("{} [{}]{teams}", m.title, m.category);
        println!("Kick-off: {}", m.start_time.format("%Y-%m-%d %H:%M UTC"));
        if let Some(poster) = &m.poster {
            println!("Poster: {poster}");
        }
    }

    let discovery = manager.discovery();
    println!(
        "{} of {} sources have streams ({})",
        discovery.sources_with_streams,
        discovery.sources_checked,
        discovery.provider_names.join(", ")
    );

    let active = manager.session().map(|session| session.stream());
    for stream in manager.streams() {
        let marker = if Some(stream) == active { "*" } else { "-" };
        println!(
            "{marker} {:<12} #{:<2} {:<4} {:<3} {}",
            stream.provider,
            stream.stream_index,
            stream.language,
            if stream.is_hd { "HD" } else { "" },
            stream.embed_url
        );
    }
}

fn print_playback(manager: &SessionManager) {
    let Some(session) = manager.session() else {
        return;
    };

    println!("Playing {}", session.active_url());
    if let Some(strategy) = session.strategy() {
        println!("Strategy: {strategy}");
    }
    if session.fallback_tried() {
        let primary = &session.stream().embed_url;
        println!("(backup source, primary was {primary})");
    }
    if let Some(message) = session.gate_message() {
        println!("{message}");
    }

    let Some(adaptive) = session.adaptive() else {
        return;
    };
    let ladder = adaptive.ladder();
    let mut levels = ladder.levels().to_vec();
    levels.sort_by(|a, b| b.bitrate_bps.cmp(&a.bitrate_bps));

    println!("Available qualities:");
    for level in levels {
        let res = if level.width > 0 {
            format!("{}x{}", level.width, level.height)
        } else {
            "unknown".into()
        };
        let bandwidth = if level.bitrate_bps > 0 {
            format!("{} kbps", level.bitrate_bps / 1000)
        } else {
            "unknown".into()
        };
        let selected = level.index == ladder.selected();
        let marker = if selected { "*" } else { "-" };
        println!("{marker} {:<10} {:<12} {}", level.label(), res, bandwidth);
    }
}
