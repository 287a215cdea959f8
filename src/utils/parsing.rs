//! Parsing utilities
//!
//! This module provides utilities for parsing various types of data.

/// Parses a string argument into a `u64` value representing a file size.
///
/// Accepts human-readable formats like "1GB", "500MB", "1024KB" (decimal
/// multiples) as well as plain byte counts. Returns an error if the format
/// is invalid.
pub fn parse_string_to_bytes_size(s: &str) -> Result<u64, String> {
	let trimmed = s.trim();
	if trimmed.is_empty() {
		return Err(format!("Invalid size format: '{}'", s));
	}

	let upper = trimmed.to_uppercase();
	let (multiplier, digits) = if let Some(stripped) = upper.strip_suffix("GB") {
		(1_000_000_000u64, stripped)
	} else if let Some(stripped) = upper.strip_suffix("MB") {
		(1_000_000u64, stripped)
	} else if let Some(stripped) = upper.strip_suffix("KB") {
		(1_000u64, stripped)
	} else if let Some(stripped) = upper.strip_suffix('B') {
		(1u64, stripped)
	} else {
		(1u64, upper.as_str())
	};

	let digits = digits.trim();
	digits
		.parse::<u64>()
		.ok()
		.and_then(|value| value.checked_mul(multiplier))
		.ok_or_else(|| format!("Invalid size format: '{}'", s))
}

/// Normalizes a string by trimming whitespace and converting to lowercase.
///
/// Useful for case-insensitive comparisons such as chain symbol matching.
pub fn normalize_string(input: &str) -> String {
	input.trim().to_lowercase()
}
