//! Success predicates.
//!
//! A predicate looks at a response and answers `(success, retry)`.

use std::sync::Arc;

use super::transport::TransportResponse;
use crate::config::PLEASE_RETRY_MARKER;

/// `(success, retry)` verdict on a response.
pub type SuccessPredicate = Arc<dyn Fn(&TransportResponse) -> (bool, bool) + Send + Sync>;

/// True if the body is `{"error": "..."}` and the error text asks for a retry.
pub fn asks_for_retry(response: &TransportResponse) -> bool {
    response
        .json()
        .as_ref()
        .and_then(|body| body.get("error"))
        .and_then(|error| error.as_str())
        .map(|error| error.to_lowercase().contains(PLEASE_RETRY_MARKER))
        .unwrap_or(false)
}

/// Succeeds on 2xx; asks for a retry on 429 and 503.
pub fn status_predicate() -> SuccessPredicate {
    Arc::new(|response: &TransportResponse| {
        let retry = matches!(response.status, 429 | 503);
        (response.is_success(), retry)
    })
}

/// Combines the verdicts of `predicates`.
///
/// Without predicates every response succeeds. A "please retry" body, or any
/// predicate asking for a retry, makes the attempt retryable.
pub(crate) fn judge(predicates: &[SuccessPredicate], response: &TransportResponse) -> (bool, bool) {
    let mut success = predicates.is_empty();
    let mut retry = asks_for_retry(response);
    for predicate in predicates {
        let (ok, again) = predicate(response);
        success |= ok;
        retry |= again;
    }
    (success, retry)
}
