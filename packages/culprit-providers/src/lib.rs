pub mod tracker;

mod error;

pub use error::{Error, Result};

use std::time::Duration;

use reqwest::{
	Client, RequestBuilder,
	header::{ACCEPT, HeaderMap, HeaderName, HeaderValue},
};

use culprit_config::Tracker;

/// Configured default headers plus `Accept: application/json`.
pub fn default_headers(cfg: &Tracker) -> Result<HeaderMap> {
	let mut headers = HeaderMap::new();

	headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

	for (key, value) in &cfg.default_headers {
		let Some(raw) = value.as_str() else {
			return Err(Error::InvalidConfig {
				message: "Default header values must be strings.".to_string(),
			});
		};

		headers.insert(HeaderName::from_bytes(key.as_bytes())?, raw.parse()?);
	}

	Ok(headers)
}

/// With a username the token is sent as a basic-auth password, otherwise as a bearer token.
pub fn authorize(request: RequestBuilder, cfg: &Tracker) -> RequestBuilder {
	match cfg.username.as_deref() {
		Some(username) => request.basic_auth(username, Some(&cfg.api_token)),
		None => request.bearer_auth(&cfg.api_token),
	}
}

/// HTTP client carrying the tracker timeout and default headers.
pub fn client(cfg: &Tracker) -> Result<Client> {
	Ok(Client::builder()
		.timeout(Duration::from_millis(cfg.timeout_ms))
		.default_headers(default_headers(cfg)?)
		.build()?)
}

#[cfg(test)]
mod tests {
	use serde_json::{Map, Value};

	use culprit_config::{Tracker, TrackerFields};

	use crate::default_headers;

	fn tracker(headers: Map<String, Value>) -> Tracker {
		Tracker {
			api_base: "https://tracker.example.com".to_string(),
			username: None,
			api_token: "token".to_string(),
			timeout_ms: 1_000,
			default_headers: headers,
			fields: TrackerFields::default(),
		}
	}

	#[test]
	fn merges_default_headers() {
		let mut headers = Map::new();

		headers.insert("X-Client".to_string(), Value::String("culprit".to_string()));

		let map = default_headers(&tracker(headers)).expect("Headers must build.");

		assert_eq!(map.get("x-client").and_then(|v| v.to_str().ok()), Some("culprit"));
		assert_eq!(map.get("accept").and_then(|v| v.to_str().ok()), Some("application/json"));
	}

	#[test]
	fn rejects_non_string_header_values() {
		let mut headers = Map::new();

		headers.insert("X-Retries".to_string(), Value::from(3));

		assert!(default_headers(&tracker(headers)).is_err());
	}
}
