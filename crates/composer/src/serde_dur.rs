//! Go-style duration strings (`"500ms"`, `"1h30m"`) for serde.

use std::time::Duration;

use serde::{Deserialize, Deserializer, Serializer};

pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
where
	S: Serializer,
{
	serializer.serialize_str(&durationfmt::to_string(*duration))
}

pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
	D: Deserializer<'de>,
{
	let raw = String::deserialize(deserializer)?;
	parse(&raw).map_err(serde::de::Error::custom)
}

pub fn parse(raw: &str) -> Result<Duration, String> {
	let nanos = go_parse_duration::parse_duration(raw.trim())
		.map_err(|e| format!("invalid duration {:?}: {:?}", raw, e))?;
	u64::try_from(nanos)
		.map(Duration::from_nanos)
		.map_err(|_| format!("duration {:?} must not be negative", raw))
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_parse() {
		assert_eq!(parse("500ms").unwrap(), Duration::from_millis(500));
		assert_eq!(parse("1h30m").unwrap(), Duration::from_secs(5400));
		assert!(parse("soon").is_err());
		assert!(parse("-1s").is_err());
	}
}
