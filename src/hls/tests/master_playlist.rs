use crate::hls::{levels, parse_master_playlist};
use url::Url;

const MASTER: &str = "#EXTM3U
#EXT-X-STREAM-INF:BANDWIDTH=2500000,RESOLUTION=1280x720,CODECS=\"avc1.4d401f,mp4a.40.2\"
720/index.m3u8
#EXT-X-STREAM-INF:BANDWIDTH=800000,RESOLUTION=640x360
360/index.m3u8
#EXT-X-STREAM-INF:AVERAGE-BANDWIDTH=5000000,RESOLUTION=1920x1080
https://cdn.example/1080/index.m3u8
";

#[test]
fn variants_are_ordered_lowest_first() {
    let base = Url::parse("https://embed.example/live/master.m3u8").unwrap();
    let variants = parse_master_playlist(&base, MASTER).unwrap();

    let heights: Vec<u64> = variants.iter().map(|v| v.level.height).collect();
    assert_eq!(heights, vec![360, 720, 1080]);

    let indices: Vec<i32> = levels(&variants).iter().map(|l| l.index).collect();
    assert_eq!(indices, vec![0, 1, 2]);

    assert_eq!(
        variants[0].uri.as_str(),
        "https://embed.example/live/360/index.m3u8"
    );
    assert_eq!(
        variants[2].uri.as_str(),
        "https://cdn.example/1080/index.m3u8"
    );
    assert_eq!(variants[2].level.bitrate_bps, 5_000_000);
}

#[test]
fn quoted_commas_do_not_split_attributes() {
    let base = Url::parse("https://embed.example/master.m3u8").unwrap();
    let variants = parse_master_playlist(&base, MASTER).unwrap();
    assert_eq!(variants[1].level.width, 1280);
    assert_eq!(variants[1].level.bitrate_bps, 2_500_000);
}

#[test]
fn media_playlist_has_empty_ladder() {
    let base = Url::parse("https://embed.example/media.m3u8").unwrap();
    let body = "#EXTM3U\n#EXT-X-TARGETDURATION:4\n#EXTINF:4.0,\nseg1.ts\n";
    assert!(parse_master_playlist(&base, body).unwrap().is_empty());
}

#[test]
fn html_is_not_a_playlist() {
    let base = Url::parse("https://embed.example/player").unwrap();
    assert!(parse_master_playlist(&base, "<html></html>").is_err());
}
