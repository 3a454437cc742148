use crate::model::Source;
use crate::player::{PlayerStrategy, StrategyCache, dispatch};
use crate::resolver::build_stream;

#[test]
fn manifests_go_to_the_adaptive_player() {
    assert_eq!(
        dispatch("https://cdn.example/live/index.m3u8"),
        PlayerStrategy::Adaptive
    );
    assert_eq!(
        dispatch("https://cdn.example/live/INDEX.M3U8?token=abc"),
        PlayerStrategy::Adaptive
    );
    assert_eq!(
        dispatch("/relative/index.m3u8#t=10"),
        PlayerStrategy::Adaptive
    );
}

#[test]
fn everything_else_is_an_embed() {
    assert_eq!(
        dispatch("https://embed.example/alpha/123/1"),
        PlayerStrategy::Embed
    );
    assert_eq!(
        dispatch("https://embed.example/player?src=index.m3u8"),
        PlayerStrategy::Embed
    );
    assert_eq!(dispatch("/clip.m3u8.html"), PlayerStrategy::Embed);
}

#[test]
fn strategy_is_recomputed_only_on_identity_change() {
    let mut cache = StrategyCache::default();
    let first = build_stream(&Source::new("alpha", "1"), 1, "https://embed.example");
    let second = build_stream(&Source::new("alpha", "1"), 2, "https://embed.example");

    cache.strategy_for(&first);
    cache.strategy_for(&first.clone());
    assert_eq!(cache.evaluations(), 1);

    cache.strategy_for(&second);
    assert_eq!(cache.evaluations(), 2);
}
