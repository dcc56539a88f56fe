//! Small helpers shared across crates.

/// Truncate a hash or long identifier for display purposes.
///
/// Keeps the first 6 and last 4 characters, e.g.
/// `"0xa096c418...a0b4"` becomes `"0xa096...a0b4"`. Identifiers of 12
/// characters or fewer are returned unchanged.
pub fn truncate_id(id: &str) -> String {
	if id.len() <= 12 || !id.is_ascii() {
		id.to_string()
	} else {
		format!("{}...{}", &id[..6], &id[id.len() - 4..])
	}
}

/// Current unix time in seconds.
pub fn now_secs() -> u64 {
	chrono::Utc::now().timestamp().max(0) as u64
}
