//! Article slugs
//!
//! A slug is the lowercased title with whitespace runs collapsed to `-`,
//! followed by a six digit suffix. The suffix comes from the millisecond
//! clock plus a process-wide counter, so back-to-back calls with the same
//! title never repeat within the window of a million milliseconds.

use chrono::Utc;
use std::sync::atomic::{AtomicU64, Ordering};

static SEQUENCE: AtomicU64 = AtomicU64::new(0);

/// Derive a fresh slug for `title`.
///
/// ```ignore
/// let slug = derive_slug("Hello   World");
/// assert!(slug.starts_with("hello-world-"));
/// ```
pub fn derive_slug(title: &str) -> String {
    let base = title
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("-");

    let millis = Utc::now().timestamp_millis().max(0) as u64;
    let suffix = millis.wrapping_add(SEQUENCE.fetch_add(1, Ordering::Relaxed)) % 1_000_000;

    format!("{}-{:06}", base, suffix)
}
