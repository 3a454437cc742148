use chrono::{DateTime, TimeDelta, Utc};
use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::*;
use crate::player::adaptive::ErrorKind;
use crate::player::embed::CrossOrigin;
use crate::telemetry::recorder::Recorder;

const DOMAIN: &str = "https://embed.example";

fn fixture(sources: Vec<Source>, start_time: DateTime<Utc>) -> Match {
    Match {
        id: "m1".into(),
        title: "A vs B".into(),
        category: "football".into(),
        start_time,
        sources,
        poster: None,
        teams: None,
    }
}

fn two_sources(start_time: DateTime<Utc>) -> Match {
    fixture(
        vec![
            Source::new("providerA", "123"),
            Source::new("providerB", "456"),
        ],
        start_time,
    )
}

#[derive(Clone, Default)]
struct OverlayLog {
    urls: Rc<RefCell<Vec<String>>>,
}

impl EmbedCleanup for OverlayLog {
    fn apply(&self, url: &str) -> CleanupOutcome {
        self.urls.borrow_mut().push(url.to_string());
        CleanupOutcome::Applied
    }
}

fn manager(domain: &str) -> (SessionManager, Recorder) {
    manager_with(domain, Box::new(CrossOrigin))
}

fn manager_with(domain: &str, cleanup: Box<dyn EmbedCleanup>) -> (SessionManager, Recorder) {
    let recorder = Recorder::default();
    let manager = SessionManager::new(
        Arc::new(EmbedDomainConfig::new(domain).unwrap()),
        PlaybackPolicy::default(),
        Box::new(recorder.clone()),
        Box::new(recorder.clone()),
        cleanup,
    );
    (manager, recorder)
}

fn live_manager() -> (SessionManager, Recorder, Instant, DateTime<Utc>) {
    let (mut manager, recorder) = manager(DOMAIN);
    let now = Instant::now();
    let wall = Utc::now();
    manager.select_match(two_sources(wall - TimeDelta::minutes(10)), now, wall);
    (manager, recorder, now, wall)
}

#[test]
fn selecting_a_match_activates_the_first_stream() {
    let (mut manager, recorder) = manager(DOMAIN);
    let now = Instant::now();
    let wall = Utc::now();
    let commands = manager.select_match(two_sources(wall - TimeDelta::minutes(1)), now, wall);

    let urls: Vec<&str> = manager
        .streams()
        .iter()
        .map(|s| s.embed_url.as_str())
        .collect();
    assert_eq!(
        urls,
        vec![
            "https://embed.example/providerA/123/1",
            "https://embed.example/providerB/456/1",
        ]
    );
    assert_eq!(manager.discovery().sources_with_streams, 2);
    assert_eq!(
        commands,
        vec![Command::Attach {
            url: "https://embed.example/providerA/123/1".into(),
            strategy: PlayerStrategy::Embed,
        }]
    );

    let session = manager.session().unwrap();
    assert_eq!(session.stream().embed_url, urls[0]);
    assert_eq!(session.stream().resolved_at, Some(wall));
    assert_eq!(session.fallback_url(), Some(urls[1]));
    assert_eq!(
        recorder.events.borrow()[0],
        TelemetryEvent::MatchSelected {
            match_id: "m1".into()
        }
    );
}

#[test]
fn reselecting_the_active_stream_is_a_no_op() {
    let (mut manager, recorder, now, wall) = live_manager();
    manager.handle(SurfaceEvent::Interaction, now);
    let reloads = recorder.reloads.borrow().len();
    let evaluations = manager.strategy_evaluations();

    let commands = manager.select_stream(&Source::new("providerA", "123"), Some(1), now, wall);
    assert!(commands.is_empty());
    assert_eq!(recorder.reloads.borrow().len(), reloads);
    assert_eq!(manager.strategy_evaluations(), evaluations);
    // same session object: its state survived
    assert!(manager.session().unwrap().viewer_interacted());
}

#[test]
fn selecting_another_index_reloads() {
    let (mut manager, recorder, now, wall) = live_manager();
    let commands = manager.select_stream(&Source::new("providerB", "456"), Some(2), now, wall);

    assert_eq!(
        commands,
        vec![
            Command::Detach,
            Command::Attach {
                url: "https://embed.example/providerB/456/2".into(),
                strategy: PlayerStrategy::Embed,
            },
        ]
    );
    assert_eq!(
        recorder.reloads.borrow().last().map(String::as_str),
        Some("https://embed.example/providerB/456/2")
    );
    assert_eq!(
        recorder.events.borrow().last(),
        Some(&TelemetryEvent::SourceChanged {
            provider: "providerB".into(),
            stream_index: 2
        })
    );
    // not a resolved candidate, so there is nothing to fall back to
    assert_eq!(manager.session().unwrap().fallback_url(), None);
}

#[test]
fn operations_without_a_match_do_nothing() {
    let (mut manager, recorder) = manager(DOMAIN);
    let now = Instant::now();
    assert!(
        manager
            .select_stream(&Source::new("providerA", "1"), None, now, Utc::now())
            .is_empty()
    );
    assert!(manager.retry(now, Utc::now()).is_empty());
    assert!(manager.handle(SurfaceEvent::Loaded, now).is_empty());
    assert!(manager.session().is_none());
    assert!(recorder.reloads.borrow().is_empty());
}

#[test]
fn empty_match_reports_no_stream() {
    let (mut manager, recorder) = manager(DOMAIN);
    let wall = Utc::now();
    let commands = manager.select_match(fixture(Vec::new(), wall), Instant::now(), wall);
    assert!(commands.is_empty());
    assert!(manager.session().is_none());
    assert_eq!(
        recorder.errors.borrow().as_slice(),
        &[PlaybackFault::ResolutionEmpty]
    );
}

#[test]
fn interactions_are_absorbed_on_embeds() {
    let (mut manager, _recorder, now, _wall) = live_manager();

    for _ in 0..3 {
        assert!(manager.handle(SurfaceEvent::Interaction, now).is_empty());
    }
    assert_eq!(manager.session().unwrap().gate_message(), None);
    assert_eq!(
        manager.handle(SurfaceEvent::Interaction, now),
        vec![Command::ForwardInteraction]
    );
    assert!(manager.session().unwrap().controls_visible());
    manager.poll(now + Duration::from_secs(3), Utc::now());
    assert!(!manager.session().unwrap().controls_visible());
}

#[test]
fn gate_resets_on_stream_change() {
    let (mut manager, _recorder, now, wall) = live_manager();
    for _ in 0..3 {
        manager.handle(SurfaceEvent::Interaction, now);
    }
    manager.select_stream(&Source::new("providerB", "456"), None, now, wall);
    assert_eq!(
        manager.session().unwrap().gate_message().as_deref(),
        Some("Tap 3 more times to start the stream")
    );
}

#[test]
fn failed_primary_falls_back_then_terminates() {
    let (mut manager, recorder, now, _wall) = live_manager();

    let commands = manager.handle(SurfaceEvent::LoadFailed("refused".into()), now);
    assert_eq!(
        commands,
        vec![
            Command::Detach,
            Command::Attach {
                url: "https://embed.example/providerB/456/1".into(),
                strategy: PlayerStrategy::Embed,
            },
        ]
    );
    let session = manager.session().unwrap();
    assert!(session.fallback_tried());
    assert_eq!(
        session.active_url(),
        "https://embed.example/providerB/456/1"
    );

    let commands = manager.handle(SurfaceEvent::LoadFailed("refused".into()), now);
    assert_eq!(commands, vec![Command::Detach]);
    let session = manager.session().unwrap();
    assert!(matches!(
        session.terminal(),
        Some(PlaybackFault::SourcesExhausted { .. })
    ));
    assert_eq!(session.errors(), 2);
    assert_eq!(recorder.errors.borrow().len(), 1);
    assert!(manager.next_deadline().is_none());

    // nothing more happens until the viewer retries
    let late = SurfaceEvent::LoadFailed("x".into());
    assert!(manager.handle(late, now).is_empty());
    let commands = manager.retry(now, Utc::now());
    assert_eq!(
        commands,
        vec![Command::Attach {
            url: "https://embed.example/providerA/123/1".into(),
            strategy: PlayerStrategy::Embed,
        }]
    );
    assert!(manager.session().unwrap().terminal().is_none());
}

#[test]
fn silent_primary_switches_after_twenty_seconds() {
    let (mut manager, recorder, now, wall) = live_manager();
    manager.handle(SurfaceEvent::Loaded, now);
    assert_eq!(*recorder.loads.borrow(), 1);

    assert!(manager.poll(now + Duration::from_secs(19), wall).is_empty());
    let commands = manager.poll(now + Duration::from_secs(20), wall);
    assert!(commands.contains(&Command::Attach {
        url: "https://embed.example/providerB/456/1".into(),
        strategy: PlayerStrategy::Embed,
    }));
}

#[test]
fn stream_change_cancels_pending_timers() {
    let (mut manager, _recorder, now, wall) = live_manager();
    manager.handle(SurfaceEvent::Loaded, now);
    manager.select_stream(&Source::new("providerB", "456"), None, now, wall);

    // only the fresh load timer of the new stream is pending
    assert_eq!(manager.next_deadline(), Some(now + Duration::from_secs(15)));
    let commands = manager.poll(now + Duration::from_secs(20), wall);
    assert!(commands.is_empty());
    assert_eq!(
        manager.session().unwrap().active_url(),
        "https://embed.example/providerB/456/1"
    );
}

#[test]
fn overlay_cleanup_runs_again_on_the_backup() {
    let overlays = OverlayLog::default();
    let (mut manager, _recorder) = manager_with(DOMAIN, Box::new(overlays.clone()));
    let now = Instant::now();
    let wall = Utc::now();
    manager.select_match(two_sources(wall - TimeDelta::minutes(10)), now, wall);

    manager.handle(SurfaceEvent::Loaded, now);
    manager.poll(now + Duration::from_secs(20), wall);
    assert!(manager.session().unwrap().fallback_tried());
    manager.handle(SurfaceEvent::Loaded, now + Duration::from_secs(21));

    assert_eq!(
        overlays.urls.borrow().as_slice(),
        &[
            "https://embed.example/providerA/123/1".to_string(),
            "https://embed.example/providerB/456/1".to_string(),
        ]
    );
}

#[test]
fn close_releases_everything() {
    let (mut manager, _recorder, now, _wall) = live_manager();
    manager.handle(SurfaceEvent::Loaded, now);
    assert_eq!(manager.close(), vec![Command::Detach]);
    assert!(manager.session().is_none());
    assert!(manager.next_deadline().is_none());
}

#[test]
fn countdown_holds_the_surface_until_start() {
    let (mut manager, _recorder) = manager(DOMAIN);
    let now = Instant::now();
    let wall = Utc::now();
    let commands = manager.select_match(two_sources(wall + TimeDelta::seconds(2)), now, wall);

    assert!(commands.is_empty());
    assert!(!manager.session().unwrap().is_attached());
    assert!(manager.countdown(wall).is_some());
    let one = Duration::from_secs(1);
    let commands = manager.poll(now + one, wall + TimeDelta::seconds(1));
    assert!(commands.is_empty());

    let commands = manager.poll(now + one * 2, wall + TimeDelta::seconds(2));
    assert_eq!(commands.len(), 1);
    assert!(manager.is_live());
    assert!(manager.session().unwrap().is_attached());
    assert_eq!(manager.countdown(wall), None);
}

fn manifest_manager() -> (SessionManager, Recorder, Instant) {
    let (mut manager, recorder) = manager("https://cdn.example");
    let now = Instant::now();
    let wall = Utc::now();
    manager.select_match(
        fixture(
            vec![
                Source::direct("hls", "live", "https://cdn.example/live/master.m3u8"),
                Source::new("alpha", "7"),
            ],
            wall - TimeDelta::minutes(1),
        ),
        now,
        wall,
    );
    (manager, recorder, now)
}

fn ladder() -> Vec<crate::model::QualityLevel> {
    (0..3)
        .map(|index| crate::model::QualityLevel {
            index,
            width: 640 * (index as u64 + 1),
            height: 360 * (index as u64 + 1),
            bitrate_bps: 1_000_000 * (index as u64 + 1),
        })
        .collect()
}

#[test]
fn manifest_streams_use_the_adaptive_controller() {
    let (mut manager, recorder, now) = manifest_manager();
    assert_eq!(
        manager.session().unwrap().strategy(),
        Some(PlayerStrategy::Adaptive)
    );

    let commands = manager.handle(
        SurfaceEvent::Adaptive(AdaptiveEvent::ManifestParsed(ladder())),
        now,
    );
    assert_eq!(commands, vec![Command::SetLevel(AUTO_QUALITY)]);
    assert_eq!(*recorder.loads.borrow(), 1);
    assert!(manager.session().unwrap().is_loaded());

    for _ in 0..3 {
        manager.handle(SurfaceEvent::Adaptive(AdaptiveEvent::Stalled), now);
    }
    let session = manager.session().unwrap();
    assert!(session.downgrade_applied());
    assert!(session.is_buffering());
    assert_eq!(session.quality_index(), 1);
    assert_eq!(recorder.qualities.borrow().len(), 1);
    assert!(recorder.events.borrow().iter().any(|event| matches!(
        event,
        TelemetryEvent::QualityChanged {
            index: 1,
            automatic: true,
            ..
        }
    )));

    manager.handle(SurfaceEvent::Adaptive(AdaptiveEvent::Resumed), now);
    assert!(!manager.session().unwrap().is_buffering());
}

#[test]
fn fatal_manifest_error_escalates_to_backup_embed() {
    let (mut manager, _recorder, now) = manifest_manager();
    manager.handle(
        SurfaceEvent::Adaptive(AdaptiveEvent::ManifestParsed(ladder())),
        now,
    );

    let commands = manager.handle(
        SurfaceEvent::Adaptive(AdaptiveEvent::Error {
            kind: ErrorKind::Other,
            fatal: true,
            details: "decoder died".into(),
        }),
        now,
    );
    assert_eq!(
        commands,
        vec![
            Command::Detach,
            Command::Attach {
                url: "https://cdn.example/alpha/7/1".into(),
                strategy: PlayerStrategy::Embed,
            },
        ]
    );
    let session = manager.session().unwrap();
    assert_eq!(session.strategy(), Some(PlayerStrategy::Embed));
    assert!(session.adaptive().is_none());
    assert_eq!(session.errors(), 1);
}

#[test]
fn quality_selection_is_forwarded() {
    let (mut manager, recorder, now) = manifest_manager();
    manager.handle(
        SurfaceEvent::Adaptive(AdaptiveEvent::ManifestParsed(ladder())),
        now,
    );
    let commands = manager.handle(SurfaceEvent::SelectQuality(0), now);
    assert_eq!(commands, vec![Command::SetLevel(0)]);
    assert_eq!(recorder.qualities.borrow()[0].height, 360);
}

#[test]
fn fullscreen_is_reported() {
    let (mut manager, recorder, now, _wall) = live_manager();
    manager.handle(SurfaceEvent::Fullscreen(true), now);
    assert!(manager.is_fullscreen());
    assert_eq!(
        recorder.events.borrow().last(),
        Some(&TelemetryEvent::Fullscreen { entered: true })
    );
}

#[test]
fn playing_manifest_keeps_its_primary() {
    let (mut manager, _recorder, now) = manifest_manager();
    let parsed = AdaptiveEvent::ManifestParsed(ladder());
    manager.handle(SurfaceEvent::Adaptive(parsed), now);
    let switched = AdaptiveEvent::LevelSwitched(2);
    manager.handle(SurfaceEvent::Adaptive(switched), now);

    let commands = manager.poll(now + Duration::from_secs(20), Utc::now());
    assert!(commands.is_empty());
    let session = manager.session().unwrap();
    assert!(!session.fallback_tried());
    assert_eq!(session.active_url(), "https://cdn.example/live/master.m3u8");
}
