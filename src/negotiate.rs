use std::sync::Arc;

use http::HeaderMap;
use http::header::ACCEPT_ENCODING;

use crate::codec::Codec;

/// One entry of an `Accept-Encoding` header.
#[derive(Debug, Clone, PartialEq)]
pub struct EncodingPreference {
    /// The encoding token, e.g. `"gzip"` or `"*"`.
    pub token: String,
    /// The quality attached to the token, clamped to `0.0..=1.0`.
    pub quality: f32,
}

impl EncodingPreference {
    /// Parses one comma-separated entry like `"gzip"` or `"br;q=0.8"`.
    ///
    /// A missing or malformed quality counts as `1.0`. Returns `None` for
    /// entries without a token.
    fn parse(entry: &str) -> Option<Self> {
        let mut parts = entry.splitn(2, ';');
        let token = parts.next().unwrap_or("").trim();
        if token.is_empty() {
            return None;
        }

        let quality = parts
            .next()
            .and_then(|params| {
                let params = params.trim();
                params.strip_prefix("q=").or_else(|| params.strip_prefix("Q="))
            })
            .and_then(|quality| quality.trim().parse::<f32>().ok())
            .filter(|quality| quality.is_finite())
            .map(|quality| quality.clamp(0.0, 1.0))
            .unwrap_or(1.0);

        Some(Self {
            token: token.to_owned(),
            quality,
        })
    }
}

/// Parses every `Accept-Encoding` value in `headers` into a flat preference
/// list, in header order. Values that are not visible ASCII are skipped. An
/// absent header yields an empty list.
pub fn parse_accept_encoding(headers: &HeaderMap) -> Vec<EncodingPreference> {
    headers
        .get_all(ACCEPT_ENCODING)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .filter_map(EncodingPreference::parse)
        .collect()
}

/// Picks the configured codec the peer prefers most.
///
/// Entries with a quality of zero never match. The first codec matching the
/// highest-quality entry wins; among entries of equal quality the one listed
/// first wins. A `*` entry stands for any configured codec and selects the
/// first one unless an explicitly named codec carries strictly higher
/// quality. Returns `None` when no entry is acceptable.
pub fn negotiate<'a>(
    preferences: &[EncodingPreference],
    codecs: &'a [Arc<dyn Codec>],
) -> Option<&'a Arc<dyn Codec>> {
    let mut best: Option<(&'a Arc<dyn Codec>, f32)> = None;
    let mut wildcard: Option<f32> = None;

    for preference in preferences {
        if preference.quality == 0.0 {
            continue;
        }
        if preference.token == "*" {
            wildcard = Some(wildcard.map_or(preference.quality, |q| q.max(preference.quality)));
            continue;
        }
        if let Some(codec) = codecs.iter().find(|codec| codec.matches(&preference.token)) {
            match best {
                Some((_, best_quality)) if preference.quality <= best_quality => {}
                _ => best = Some((codec, preference.quality)),
            }
        }
    }

    match (best, wildcard) {
        (Some((_, best_quality)), Some(wildcard_quality)) if wildcard_quality >= best_quality => {
            codecs.first()
        }
        (Some((codec, _)), _) => Some(codec),
        (None, Some(_)) => codecs.first(),
        (None, None) => None,
    }
}
