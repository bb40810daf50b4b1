//! Request fingerprints.
//!
//! A fingerprint is the SHA-1 of method, canonical URL and body, rendered as
//! lowercase hex. Two requests that differ only in query-argument order or
//! fragment share a fingerprint. The priority queue keys its payload table on it.

use sha1::{Digest, Sha1};

use crate::error::{Error, Result};
use crate::model::Request;

/// Knobs for [`fingerprint_with`].
#[derive(Debug, Clone, Default)]
pub struct FingerprintOptions {
    /// Header names to mix in, matched case-insensitively.
    pub include_headers: Vec<String>,
    /// Keep `#fragment` when canonicalizing the URL.
    pub keep_fragments: bool,
}

/// Fingerprint with default options.
pub fn fingerprint(request: &Request) -> String {
    fingerprint_with(request, &FingerprintOptions::default())
}

pub fn fingerprint_with(request: &Request, options: &FingerprintOptions) -> String {
    let mut hasher = Sha1::new();
    hasher.update(request.method.to_ascii_uppercase().as_bytes());

    // Unparseable URLs are hashed verbatim; queues reject them before this point.
    let url = canonicalize(&request.url, options.keep_fragments)
        .unwrap_or_else(|_| request.url.clone());
    hasher.update(url.as_bytes());
    hasher.update(request.body.as_deref().unwrap_or_default());

    let mut names: Vec<String> = options
        .include_headers
        .iter()
        .map(|name| name.to_ascii_lowercase())
        .collect();
    names.sort();
    names.dedup();

    for name in &names {
        let mut values = request
            .headers
            .iter()
            .filter(|(key, _)| key.eq_ignore_ascii_case(name))
            .flat_map(|(_, values)| values.iter())
            .peekable();
        if values.peek().is_none() {
            continue;
        }
        hasher.update(name.as_bytes());
        for value in values {
            hasher.update(value.as_bytes());
        }
    }

    format!("{:x}", hasher.finalize())
}

/// Canonical form of `url`: lowercase scheme and host, default port dropped,
/// path percent-encoded, query pairs sorted, fragment removed.
pub fn canonicalize_url(url: &str) -> Result<String> {
    canonicalize(url, false)
}

fn canonicalize(url: &str, keep_fragments: bool) -> Result<String> {
    let mut parsed =
        url::Url::parse(url).map_err(|e| Error::InvalidRequest(format!("{url}: {e}")))?;

    let mut pairs: Vec<(String, String)> = parsed
        .query_pairs()
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    if pairs.is_empty() {
        parsed.set_query(None);
    } else {
        pairs.sort();
        parsed.query_pairs_mut().clear().extend_pairs(&pairs);
    }

    if !keep_fragments {
        parsed.set_fragment(None);
    }

    Ok(parsed.into())
}
