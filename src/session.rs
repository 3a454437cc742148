//! Playback session manager: the single owner of "the stream being watched".

use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use std::sync::Arc;
use std::time::Instant;

use crate::config::{EmbedDomainConfig, PlaybackPolicy};
use crate::error::PlaybackFault;
use crate::model::{AUTO_QUALITY, DiscoveryResult, Match, Source, Stream};
use crate::player::adaptive::{AdaptiveController, AdaptiveEffect, AdaptiveEvent};
use crate::player::controls::ControlsVisibility;
use crate::player::countdown::{CountdownGate, CountdownParts, CountdownTick};
use crate::player::embed::{CleanupOutcome, EmbedCleanup};
use crate::player::fallback::{FallbackController, FallbackEffect, FallbackEvent, FallbackState};
use crate::player::interaction::{GateDecision, InteractionGate};
use crate::player::timer::earliest;
use crate::player::{PlayerStrategy, StrategyCache, dispatch};
use crate::resolver::{build_stream, discover, resolve_with_extra};
use crate::telemetry::{PlayerHost, TelemetryEvent, TelemetrySink};

/// Input from the rendered playback surface.
#[derive(Debug, Clone, PartialEq)]
pub enum SurfaceEvent {
    Loaded,
    LoadFailed(String),
    Interaction,
    Adaptive(AdaptiveEvent),
    SelectQuality(i32),
    Fullscreen(bool),
}

/// Work for the rendered playback surface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Attach {
        url: String,
        strategy: PlayerStrategy,
    },
    Detach,
    ForwardInteraction,
    ReloadManifest,
    RecoverMediaError,
    SetLevel(i32),
}

#[derive(Debug)]
struct Surface {
    strategy: PlayerStrategy,
    adaptive: Option<AdaptiveController>,
    fallback: FallbackController,
    gate: InteractionGate,
    controls: ControlsVisibility,
}

impl Surface {
    /// Tears the decoder down and cancels every timer.
    fn detach(&mut self) {
        if let Some(adaptive) = self.adaptive.as_mut() {
            adaptive.handle(AdaptiveEvent::Teardown);
        }
        self.adaptive = None;
        self.fallback.cancel();
        self.controls.cancel();
    }
}

#[derive(Debug)]
pub struct PlaybackSession {
    stream: Stream,
    fallback_url: Option<String>,
    errors: u32,
    buffering: bool,
    viewer_interacted: bool,
    overlay_cleanup: Option<CleanupOutcome>,
    terminal: Option<PlaybackFault>,
    surface: Option<Surface>,
}

impl PlaybackSession {
    fn new(stream: Stream, fallback_url: Option<String>) -> Self {
        Self {
            stream,
            fallback_url,
            errors: 0,
            buffering: false,
            viewer_interacted: false,
            overlay_cleanup: None,
            terminal: None,
            surface: None,
        }
    }

    pub fn stream(&self) -> &Stream {
        &self.stream
    }

    pub fn errors(&self) -> u32 {
        self.errors
    }

    pub fn is_buffering(&self) -> bool {
        self.buffering
    }

    pub fn viewer_interacted(&self) -> bool {
        self.viewer_interacted
    }

    pub fn is_attached(&self) -> bool {
        self.surface.is_some()
    }

    pub fn strategy(&self) -> Option<PlayerStrategy> {
        self.surface.as_ref().map(|surface| surface.strategy)
    }

    pub fn active_url(&self) -> &str {
        self.surface
            .as_ref()
            .map(|surface| surface.fallback.active_url())
            .unwrap_or(&self.stream.embed_url)
    }

    pub fn fallback_url(&self) -> Option<&str> {
        self.fallback_url.as_deref()
    }

    pub fn quality_index(&self) -> i32 {
        self.adaptive()
            .map(|adaptive| adaptive.ladder().selected())
            .unwrap_or(AUTO_QUALITY)
    }

    pub fn downgrade_applied(&self) -> bool {
        self.adaptive()
            .map(|adaptive| adaptive.downgrade_applied())
            .unwrap_or(false)
    }

    pub fn fallback_tried(&self) -> bool {
        self.surface
            .as_ref()
            .map(|surface| surface.fallback.fallback_tried())
            .unwrap_or(false)
    }

    pub fn is_loaded(&self) -> bool {
        self.surface
            .as_ref()
            .is_some_and(|surface| surface.fallback.state() == FallbackState::Loaded)
    }

    pub fn adaptive(&self) -> Option<&AdaptiveController> {
        self.surface
            .as_ref()
            .and_then(|surface| surface.adaptive.as_ref())
    }

    /// Overlay text while the interaction gate still absorbs taps.
    pub fn gate_message(&self) -> Option<String> {
        let surface = self.surface.as_ref()?;
        if surface.strategy != PlayerStrategy::Embed {
            return None;
        }
        surface.gate.message()
    }

    pub fn controls_visible(&self) -> bool {
        self.surface
            .as_ref()
            .is_some_and(|surface| surface.controls.is_visible())
    }

    /// Set once both primary and backup failed.
    pub fn terminal(&self) -> Option<&PlaybackFault> {
        self.terminal.as_ref()
    }
}

pub struct SessionManager {
    domain: Arc<EmbedDomainConfig>,
    policy: PlaybackPolicy,
    telemetry: Box<dyn TelemetrySink>,
    host: Box<dyn PlayerHost>,
    cleanup: Box<dyn EmbedCleanup>,
    current: Option<Match>,
    streams: Vec<Stream>,
    discovery: DiscoveryResult,
    countdown: Option<CountdownGate>,
    session: Option<PlaybackSession>,
    strategies: StrategyCache,
    fullscreen: bool,
}

impl SessionManager {
    pub fn new(
        domain: Arc<EmbedDomainConfig>,
        policy: PlaybackPolicy,
        telemetry: Box<dyn TelemetrySink>,
        host: Box<dyn PlayerHost>,
        cleanup: Box<dyn EmbedCleanup>,
    ) -> Self {
        Self {
            domain,
            policy,
            telemetry,
            host,
            cleanup,
            current: None,
            streams: Vec::new(),
            discovery: DiscoveryResult::default(),
            countdown: None,
            session: None,
            strategies: StrategyCache::default(),
            fullscreen: false,
        }
    }

    pub fn current_match(&self) -> Option<&Match> {
        self.current.as_ref()
    }

    pub fn streams(&self) -> &[Stream] {
        &self.streams
    }

    pub fn discovery(&self) -> &DiscoveryResult {
        &self.discovery
    }

    pub fn session(&self) -> Option<&PlaybackSession> {
        self.session.as_ref()
    }

    pub fn strategy_evaluations(&self) -> u32 {
        self.strategies.evaluations()
    }

    pub fn is_fullscreen(&self) -> bool {
        self.fullscreen
    }

    /// Countdown to display, `None` once the match is live.
    pub fn countdown(&self, wall: DateTime<Utc>) -> Option<CountdownParts> {
        self.countdown
            .as_ref()
            .and_then(|gate| gate.remaining(wall))
            .map(CountdownParts::from_remaining)
    }

    pub fn is_live(&self) -> bool {
        self.countdown.as_ref().is_some_and(|gate| gate.is_open())
    }

    pub fn select_match(&mut self, m: Match, now: Instant, wall: DateTime<Utc>) -> Vec<Command> {
        let mut commands = self.end_session();
        if let Some(gate) = self.countdown.as_mut() {
            gate.cancel();
        }
        self.strategies.clear();

        self.streams = resolve_with_extra(&m, &self.domain.current(), self.policy.extra_streams);
        self.discovery = discover(&m, &self.streams);
        info!(
            "{}: {} of {} sources have streams ({})",
            m.title,
            self.discovery.sources_with_streams,
            self.discovery.sources_checked,
            self.discovery.provider_names.join(", ")
        );

        self.telemetry.emit(TelemetryEvent::MatchSelected {
            match_id: m.id.clone(),
        });
        self.countdown = Some(CountdownGate::new(
            m.start_time,
            self.policy.countdown_tick,
            now,
            wall,
        ));
        self.current = Some(m);

        match self.streams.first().cloned() {
            Some(first) => commands.extend(self.activate(first, now, wall)),
            None => {
                warn!("No candidate streams for this match");
                self.host.on_error(&PlaybackFault::ResolutionEmpty);
            }
        }
        commands
    }

    pub fn select_stream(
        &mut self,
        source: &Source,
        stream_index: Option<u32>,
        now: Instant,
        wall: DateTime<Utc>,
    ) -> Vec<Command> {
        self.select_stream_inner(source, stream_index.unwrap_or(1), false, now, wall)
    }

    /// Reloads the first source of the current match, even if it is the
    /// active one.
    pub fn retry(&mut self, now: Instant, wall: DateTime<Utc>) -> Vec<Command> {
        let Some(source) = self
            .current
            .as_ref()
            .and_then(|m| m.sources.first())
            .cloned()
        else {
            warn!("Retry requested without a match loaded");
            return Vec::new();
        };
        self.select_stream_inner(&source, 1, true, now, wall)
    }

    /// Tears everything down, as on unmount.
    pub fn close(&mut self) -> Vec<Command> {
        let commands = self.end_session();
        if let Some(gate) = self.countdown.as_mut() {
            gate.cancel();
        }
        self.countdown = None;
        self.current = None;
        self.streams.clear();
        self.discovery = DiscoveryResult::default();
        self.strategies.clear();
        commands
    }

    pub fn handle(&mut self, event: SurfaceEvent, now: Instant) -> Vec<Command> {
        if let SurfaceEvent::Fullscreen(entered) = event {
            self.fullscreen = entered;
            self.telemetry.emit(TelemetryEvent::Fullscreen { entered });
            return Vec::new();
        }

        let Some(session) = self.session.as_mut() else {
            debug!("Ignoring {event:?} without an active session");
            return Vec::new();
        };
        let Some(surface) = session.surface.as_mut() else {
            debug!("Ignoring {event:?} while nothing is attached");
            return Vec::new();
        };

        match event {
            SurfaceEvent::Interaction => {
                session.viewer_interacted = true;
                surface.controls.show(now);
                let effects = surface.fallback.handle(FallbackEvent::Interacted, now);
                let forward = match surface.strategy {
                    PlayerStrategy::Adaptive => true,
                    PlayerStrategy::Embed => match surface.gate.on_interaction() {
                        GateDecision::Absorbed { remaining } => {
                            debug!("Interaction absorbed, {remaining} to go");
                            false
                        }
                        GateDecision::PassThrough => true,
                    },
                };
                let mut commands = self.apply_fallback(effects);
                if forward {
                    commands.push(Command::ForwardInteraction);
                }
                commands
            }
            SurfaceEvent::Loaded => {
                let effects = surface.fallback.handle(FallbackEvent::Loaded, now);
                self.apply_fallback(effects)
            }
            SurfaceEvent::LoadFailed(reason) => {
                session.errors += 1;
                let event = FallbackEvent::LoadFailed(reason);
                let effects = surface.fallback.handle(event, now);
                self.apply_fallback(effects)
            }
            SurfaceEvent::SelectQuality(index) => {
                let event = AdaptiveEvent::SelectQuality(index);
                self.handle(SurfaceEvent::Adaptive(event), now)
            }
            SurfaceEvent::Adaptive(event) => {
                if matches!(event, AdaptiveEvent::Error { .. }) {
                    session.errors += 1;
                }
                let Some(adaptive) = surface.adaptive.as_mut() else {
                    debug!("Ignoring {event:?} on a non-manifest surface");
                    return Vec::new();
                };
                let playing = matches!(
                    event,
                    AdaptiveEvent::LevelSwitched(_) | AdaptiveEvent::Resumed
                );
                let effects = adaptive.handle(event);
                if playing {
                    surface.fallback.handle(FallbackEvent::Playing, now);
                }
                self.apply_adaptive(effects, now)
            }
            SurfaceEvent::Fullscreen(_) => Vec::new(),
        }
    }

    /// Fires due timers.
    pub fn poll(&mut self, now: Instant, wall: DateTime<Utc>) -> Vec<Command> {
        let mut commands = Vec::new();

        let tick = self
            .countdown
            .as_mut()
            .and_then(|gate| gate.poll(now, wall));
        if let Some(tick) = tick {
            match tick {
                CountdownTick::Opened => {
                    info!("Match is live");
                    commands.extend(self.attach_surface(now));
                }
                CountdownTick::Remaining { parts, .. } => debug!("Starts in {parts}"),
            }
        }

        let effects = match self
            .session
            .as_mut()
            .and_then(|session| session.surface.as_mut())
        {
            Some(surface) => {
                surface.controls.poll(now);
                surface.fallback.poll(now)
            }
            None => Vec::new(),
        };
        commands.extend(self.apply_fallback(effects));
        commands
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        let surface = self
            .session
            .as_ref()
            .and_then(|session| session.surface.as_ref());
        let countdown = self
            .countdown
            .as_ref()
            .and_then(|gate| gate.next_deadline());
        earliest([
            countdown,
            surface.and_then(|surface| surface.fallback.next_deadline()),
            surface.and_then(|surface| surface.controls.next_deadline()),
        ])
    }

    fn select_stream_inner(
        &mut self,
        source: &Source,
        stream_index: u32,
        force: bool,
        now: Instant,
        wall: DateTime<Utc>,
    ) -> Vec<Command> {
        if self.current.is_none() {
            warn!("Stream selection requested without a match loaded");
            return Vec::new();
        }

        let stream = build_stream(source, stream_index, &self.domain.current());
        if !force {
            if let Some(session) = &self.session {
                if session.stream == stream {
                    debug!("{} is already active", stream.embed_url);
                    return Vec::new();
                }
            }
        }

        let mut commands = self.end_session();
        commands.extend(self.activate(stream, now, wall));
        commands
    }

    fn activate(&mut self, mut stream: Stream, now: Instant, wall: DateTime<Utc>) -> Vec<Command> {
        stream.resolved_at = Some(wall);
        let fallback_url = self.fallback_for(&stream);

        info!("Active stream {}", stream.embed_url);
        self.telemetry.emit(TelemetryEvent::SourceChanged {
            provider: stream.provider.clone(),
            stream_index: stream.stream_index,
        });
        self.host.on_reload(&stream);
        self.session = Some(PlaybackSession::new(stream, fallback_url));

        if self.is_live() {
            self.attach_surface(now)
        } else {
            Vec::new()
        }
    }

    /// Next resolved candidate after `stream` with a different URL.
    fn fallback_for(&self, stream: &Stream) -> Option<String> {
        let position = self.streams.iter().position(|s| s == stream)?;
        self.streams[position + 1..]
            .iter()
            .find(|s| s.embed_url != stream.embed_url)
            .map(|s| s.embed_url.clone())
    }

    fn attach_surface(&mut self, now: Instant) -> Vec<Command> {
        let policy = &self.policy;
        let Some(session) = self.session.as_mut() else {
            return Vec::new();
        };
        if session.surface.is_some() || session.terminal.is_some() {
            return Vec::new();
        }

        let strategy = self.strategies.strategy_for(&session.stream);
        let url = session.stream.embed_url.clone();
        session.surface = Some(Surface {
            strategy,
            adaptive: new_adaptive(strategy, policy.stall_threshold),
            fallback: FallbackController::new(
                url.clone(),
                session.fallback_url.clone(),
                policy.load_timeout,
                policy.fallback_delay,
                now,
            ),
            gate: InteractionGate::new(policy.interaction_threshold),
            controls: ControlsVisibility::new(policy.controls_hide_delay),
        });

        debug!("Attaching {strategy} surface for {url}");
        vec![Command::Attach { url, strategy }]
    }

    fn end_session(&mut self) -> Vec<Command> {
        let Some(mut session) = self.session.take() else {
            return Vec::new();
        };
        match session.surface.as_mut() {
            Some(surface) => {
                surface.detach();
                vec![Command::Detach]
            }
            None => Vec::new(),
        }
    }

    fn apply_adaptive(&mut self, effects: Vec<AdaptiveEffect>, now: Instant) -> Vec<Command> {
        let mut commands = Vec::new();

        for effect in effects {
            match effect {
                AdaptiveEffect::Loaded => {
                    let fallback_effects = self.with_surface(|surface| {
                        surface.fallback.handle(FallbackEvent::Loaded, now)
                    });
                    commands.extend(self.apply_fallback(fallback_effects));
                }
                AdaptiveEffect::ReloadManifest => commands.push(Command::ReloadManifest),
                AdaptiveEffect::RecoverMediaError => commands.push(Command::RecoverMediaError),
                AdaptiveEffect::SetLevel(index) => commands.push(Command::SetLevel(index)),
                AdaptiveEffect::QualityChanged { level, automatic } => {
                    self.host.on_quality_change(&level);
                    self.telemetry.emit(TelemetryEvent::QualityChanged {
                        index: level.index,
                        height: level.height,
                        automatic,
                    });
                }
                AdaptiveEffect::Buffering { stalls } => {
                    if let Some(session) = self.session.as_mut() {
                        session.buffering = true;
                    }
                    self.telemetry.emit(TelemetryEvent::Buffering { stalls });
                }
                AdaptiveEffect::Resumed => {
                    if let Some(session) = self.session.as_mut() {
                        session.buffering = false;
                    }
                }
                AdaptiveEffect::Escalate(fault) => {
                    let fallback_effects = self.with_surface(|surface| {
                        surface
                            .fallback
                            .handle(FallbackEvent::LoadFailed(fault.to_string()), now)
                    });
                    commands.extend(self.apply_fallback(fallback_effects));
                }
                AdaptiveEffect::Detach => commands.push(Command::Detach),
            }
        }

        commands
    }

    fn apply_fallback(&mut self, effects: Vec<FallbackEffect>) -> Vec<Command> {
        let mut commands = Vec::new();

        for effect in effects {
            let Some(session) = self.session.as_mut() else {
                break;
            };

            match effect {
                FallbackEffect::Loaded => {
                    self.host.on_load();
                    let embed = session
                        .surface
                        .as_ref()
                        .filter(|surface| surface.strategy == PlayerStrategy::Embed)
                        .map(|surface| surface.fallback.active_url().to_string());
                    if let (Some(url), None) = (embed, session.overlay_cleanup) {
                        let outcome = self.cleanup.apply(&url);
                        debug!("Overlay cleanup for {url}: {outcome:?}");
                        session.overlay_cleanup = Some(outcome);
                    }
                }
                FallbackEffect::SwitchTo(url) => {
                    let Some(surface) = session.surface.as_mut() else {
                        continue;
                    };
                    if let Some(adaptive) = surface.adaptive.as_mut() {
                        adaptive.handle(AdaptiveEvent::Teardown);
                    }
                    let strategy = dispatch(&url);
                    surface.strategy = strategy;
                    surface.adaptive = new_adaptive(strategy, self.policy.stall_threshold);
                    session.buffering = false;
                    session.overlay_cleanup = None;
                    info!("Switched to backup {url} ({strategy})");
                    commands.push(Command::Detach);
                    commands.push(Command::Attach { url, strategy });
                }
                FallbackEffect::Exhausted(fault) => {
                    if let Some(mut surface) = session.surface.take() {
                        surface.detach();
                        commands.push(Command::Detach);
                    }
                    warn!("Playback failed: {fault}");
                    self.host.on_error(&fault);
                    session.terminal = Some(fault);
                }
            }
        }

        commands
    }

    fn with_surface<T: Default>(&mut self, f: impl FnOnce(&mut Surface) -> T) -> T {
        self.session
            .as_mut()
            .and_then(|session| session.surface.as_mut())
            .map(f)
            .unwrap_or_default()
    }
}

fn new_adaptive(strategy: PlayerStrategy, stall_threshold: u32) -> Option<AdaptiveController> {
    match strategy {
        PlayerStrategy::Adaptive => {
            let mut adaptive = AdaptiveController::new(stall_threshold);
            adaptive.handle(AdaptiveEvent::Attach);
            Some(adaptive)
        }
        PlayerStrategy::Embed => None,
    }
}

#[cfg(test)]
mod tests;
