use crate::model::{DiscoveryResult, Match, Source, Stream};

const DEFAULT_LANGUAGE: &str = "en";

/// Upper bound on the additional indices emitted per source.
pub const MAX_EXTRA_STREAMS: u32 = 16;

/// Builds one candidate per source at stream index 1.
pub fn resolve(m: &Match, domain: &str) -> Vec<Stream> {
    resolve_with_extra(m, domain, 0)
}

/// Like [`resolve`], additionally emitting indices `2..=extra + 1` per
/// source, with `extra` capped at [`MAX_EXTRA_STREAMS`]. Output order is
/// source order, then index.
pub fn resolve_with_extra(m: &Match, domain: &str, extra: u32) -> Vec<Stream> {
    let last = extra.min(MAX_EXTRA_STREAMS).saturating_add(1);
    let mut streams = Vec::with_capacity(m.sources.len() * last as usize);
    for source in &m.sources {
        for index in 1..=last {
            streams.push(build_stream(source, index, domain));
        }
    }
    streams
}

pub fn build_stream(source: &Source, stream_index: u32, domain: &str) -> Stream {
    let stream_index = stream_index.max(1);
    let embed_url = match (&source.direct_url, stream_index) {
        (Some(direct), 1) => direct.clone(),
        _ => {
            let id = &source.provider_match_id;
            embed_url(domain, &source.provider, id, stream_index)
        }
    };
    Stream {
        provider: source.provider.clone(),
        provider_match_id: source.provider_match_id.clone(),
        stream_index,
        language: source
            .language
            .clone()
            .unwrap_or_else(|| DEFAULT_LANGUAGE.into()),
        is_hd: source.hd,
        embed_url,
        resolved_at: None,
    }
}

/// `{domain}/{provider}/{providerMatchId}/{streamIndex}`
pub fn embed_url(
    domain: &str,
    provider: &str,
    provider_match_id: &str,
    stream_index: u32,
) -> String {
    format!(
        "{}/{}/{}/{}",
        domain.trim_end_matches('/'),
        urlencoding::encode(provider),
        urlencoding::encode(provider_match_id),
        stream_index
    )
}

pub fn discover(m: &Match, streams: &[Stream]) -> DiscoveryResult {
    let mut provider_names: Vec<String> = Vec::new();
    let mut sources_with_streams = 0;

    for source in &m.sources {
        if streams.iter().any(|stream| stream.matches_source(source)) {
            sources_with_streams += 1;
            if !provider_names.contains(&source.provider) {
                provider_names.push(source.provider.clone());
            }
        }
    }

    DiscoveryResult {
        sources_checked: m.sources.len(),
        sources_with_streams,
        provider_names,
    }
}
