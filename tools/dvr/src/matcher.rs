//! Exact-match comparison between a stored interaction and a live request.

use crate::http::{HeaderMap, RequestUrl};
use crate::interaction::InteractionRecord;

/// Returns true when `live` is the same request as `stored`.
///
/// Every URL component, the user-info, headers, trailers and the request body
/// must be identical. A record without a request or URL never matches. The
/// `consumed` flag is ignored here; the store applies it.
pub fn matches(stored: &InteractionRecord, live: &InteractionRecord) -> bool {
    let (Some(stored_request), Some(live_request)) = (&stored.request, &live.request) else {
        return false;
    };
    let (Some(stored_url), Some(live_url)) = (&stored_request.url, &live_request.url) else {
        return false;
    };
    urls_match(stored_url, live_url)
        && headers_match(&stored_request.headers, &live_request.headers)
        && headers_match(&stored_request.trailers, &live_request.trailers)
        && stored.request_body == live.request_body
}

fn urls_match(left: &RequestUrl, right: &RequestUrl) -> bool {
    if left.scheme != right.scheme
        || left.opaque != right.opaque
        || left.host != right.host
        || left.path != right.path
        || left.raw_query != right.raw_query
        || left.fragment != right.fragment
    {
        return false;
    }
    match (&left.user, &right.user) {
        (None, None) => true,
        (Some(l), Some(r)) => l.to_string() == r.to_string(),
        _ => false,
    }
}

fn headers_match(left: &HeaderMap, right: &HeaderMap) -> bool {
    left.len() == right.len()
        && left
            .iter()
            .all(|(name, values)| right.get(name).is_some_and(|other| other == values))
}
