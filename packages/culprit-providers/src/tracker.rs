//! Jira-compatible REST API: paged JQL search and single-record fetch.

use std::time::Duration;

use reqwest::{Client, Response, header::RETRY_AFTER};
use serde_json::Value;
use time::{
	OffsetDateTime, PrimitiveDateTime, UtcOffset, format_description::well_known::Rfc3339,
	macros::format_description,
};

use culprit_config::{Tracker, TrackerFields};
use culprit_domain::{RawComment, RawRecord};

use crate::{Error, Result};

const MAX_ERROR_BODY: usize = 500;

#[derive(Clone, Debug, Default, PartialEq)]
pub struct SearchPage {
	pub records: Vec<RawRecord>,
	pub start_at: u32,
	/// Total matches reported by the tracker, when it reports one.
	pub total: Option<u32>,
}

pub async fn search_page(
	client: &Client,
	cfg: &Tracker,
	jql: &str,
	start_at: u32,
	max_results: u32,
) -> Result<SearchPage> {
	let url = format!("{}/rest/api/2/search", cfg.api_base);
	let body = serde_json::json!({
		"jql": jql,
		"startAt": start_at,
		"maxResults": max_results,
		"fields": ["*all"],
	});
	let res = crate::authorize(client.post(url), cfg).json(&body).send().await?;
	let json: Value = check_status(res).await?.json().await?;

	parse_search_response(json, &cfg.fields)
}

pub async fn fetch_record(client: &Client, cfg: &Tracker, key: &str) -> Result<RawRecord> {
	let url = format!("{}/rest/api/2/issue/{key}", cfg.api_base);
	let res = crate::authorize(client.get(url).query(&[("fields", "*all")]), cfg).send().await?;
	let json: Value = check_status(res).await?.json().await?;

	parse_issue(&json, &cfg.fields)
}

async fn check_status(res: Response) -> Result<Response> {
	let status = res.status();

	if status.is_success() {
		return Ok(res);
	}

	let retry_after = res
		.headers()
		.get(RETRY_AFTER)
		.and_then(|value| value.to_str().ok())
		.and_then(|value| value.trim().parse::<u64>().ok())
		.map(Duration::from_secs);
	let mut message = res.text().await.unwrap_or_default();

	if message.len() > MAX_ERROR_BODY {
		let mut cut = MAX_ERROR_BODY;

		while !message.is_char_boundary(cut) {
			cut -= 1;
		}

		message.truncate(cut);
	}
	if message.trim().is_empty() {
		message = status.canonical_reason().unwrap_or("request failed").to_string();
	}

	Err(Error::Status { status: status.as_u16(), message, retry_after })
}

fn parse_search_response(json: Value, fields: &TrackerFields) -> Result<SearchPage> {
	let issues = json.get("issues").and_then(Value::as_array).ok_or_else(|| {
		Error::InvalidResponse { message: "Search response is missing issues array.".to_string() }
	})?;
	let records = issues.iter().map(|issue| parse_issue(issue, fields)).collect::<Result<_>>()?;

	Ok(SearchPage {
		records,
		start_at: json.get("startAt").and_then(Value::as_u64).unwrap_or(0) as u32,
		total: json.get("total").and_then(Value::as_u64).map(|total| total as u32),
	})
}

fn parse_issue(issue: &Value, ids: &TrackerFields) -> Result<RawRecord> {
	let key = issue.get("key").and_then(Value::as_str).ok_or_else(|| Error::InvalidResponse {
		message: "Issue is missing key.".to_string(),
	})?;
	let fields = issue.get("fields").ok_or_else(|| Error::InvalidResponse {
		message: format!("Issue {key} is missing fields."),
	})?;
	let comments = fields
		.get("comment")
		.and_then(|comment| comment.get("comments"))
		.and_then(Value::as_array)
		.map(|items| {
			items
				.iter()
				.map(|item| RawComment {
					author: item
						.get("author")
						.and_then(|author| person_name(author, &["displayName", "name"])),
					body: item.get("body").and_then(Value::as_str).unwrap_or_default().to_string(),
				})
				.collect()
		})
		.unwrap_or_default();

	Ok(RawRecord {
		key: key.to_string(),
		issue_type: fields
			.get("issuetype")
			.and_then(|kind| kind.get("name"))
			.and_then(Value::as_str)
			.map(str::to_string),
		summary: text(fields.get("summary")).unwrap_or_default(),
		description: text(fields.get("description")).unwrap_or_default(),
		created: fields.get("created").and_then(Value::as_str).and_then(parse_timestamp),
		planned_start: custom_text(fields, &ids.planned_start).as_deref().and_then(parse_timestamp),
		planned_end: custom_text(fields, &ids.planned_end).as_deref().and_then(parse_timestamp),
		team: custom_text(fields, &ids.team),
		business_units: custom_values(fields.get(&ids.business_units)),
		change_category: custom_text(fields, &ids.change_category),
		labels: custom_values(fields.get("labels")),
		assignee: fields.get("assignee").and_then(|person| person_name(person, &["name", "displayName"])),
		reporter: fields.get("reporter").and_then(|person| person_name(person, &["name", "displayName"])),
		resolution: fields
			.get("resolution")
			.and_then(|resolution| resolution.get("name"))
			.and_then(Value::as_str)
			.map(str::to_string),
		comments,
	})
}

fn text(value: Option<&Value>) -> Option<String> {
	value.and_then(Value::as_str).map(str::to_string)
}

fn person_name(person: &Value, keys: &[&str]) -> Option<String> {
	keys.iter()
		.filter_map(|key| person.get(*key).and_then(Value::as_str))
		.map(str::trim)
		.find(|name| !name.is_empty())
		.map(str::to_string)
}

/// Scalar value of a custom field: a string, or the `value`/`name` of an option object.
fn custom_text(fields: &Value, id: &str) -> Option<String> {
	let label = match fields.get(id)? {
		Value::Array(items) => items.iter().find_map(option_label),
		other => option_label(other),
	};

	label.filter(|value| !value.trim().is_empty())
}

fn custom_values(value: Option<&Value>) -> Vec<String> {
	match value {
		Some(Value::Array(items)) => items.iter().filter_map(option_label).collect(),
		Some(Value::String(raw)) if !raw.trim().is_empty() => vec![raw.clone()],
		Some(other @ Value::Object(_)) => option_label(other).into_iter().collect(),
		_ => Vec::new(),
	}
}

fn option_label(value: &Value) -> Option<String> {
	match value {
		Value::String(raw) => Some(raw.clone()),
		Value::Object(map) => map
			.get("value")
			.or_else(|| map.get("name"))
			.and_then(Value::as_str)
			.map(str::to_string),
		_ => None,
	}
}

/// Accepts RFC 3339 and the tracker's `2025-03-14T10:05:00.000+0000` form. Anything else is
/// read as a naive UTC timestamp from its first 19 characters.
pub fn parse_timestamp(raw: &str) -> Option<OffsetDateTime> {
	let raw = raw.trim();

	if let Ok(parsed) = OffsetDateTime::parse(raw, &Rfc3339) {
		return Some(parsed.to_offset(UtcOffset::UTC));
	}

	let tracker = format_description!(
		"[year]-[month]-[day]T[hour]:[minute]:[second].[subsecond][offset_hour sign:mandatory][offset_minute]"
	);

	if let Ok(parsed) = OffsetDateTime::parse(raw, tracker) {
		return Some(parsed.to_offset(UtcOffset::UTC));
	}

	let naive = format_description!("[year]-[month]-[day]T[hour]:[minute]:[second]");

	raw.get(..19)
		.and_then(|head| PrimitiveDateTime::parse(head, naive).ok())
		.map(PrimitiveDateTime::assume_utc)
}

#[cfg(test)]
mod tests {
	use time::macros::datetime;

	use super::*;

	#[test]
	fn parses_tracker_timestamps() {
		assert_eq!(
			parse_timestamp("2025-03-14T10:05:00.000+0100"),
			Some(datetime!(2025-03-14 09:05 UTC))
		);
		assert_eq!(parse_timestamp("2025-03-14T10:05:00Z"), Some(datetime!(2025-03-14 10:05 UTC)));
		assert_eq!(parse_timestamp("2025-03-14T10:05:00"), Some(datetime!(2025-03-14 10:05 UTC)));
		assert_eq!(parse_timestamp("soon"), None);
	}

	#[test]
	fn parses_issue_fields() {
		let json = serde_json::json!({
			"key": "TECCM-42",
			"fields": {
				"issuetype": { "name": "Technical Change" },
				"summary": "Upgrade nginx on web042",
				"description": null,
				"created": "2025-03-13T08:00:00.000+0000",
				"customfield_10303": "2025-03-14T09:00:00.000+0000",
				"customfield_10304": "2025-03-14T11:00:00.000+0000",
				"customfield_15000": { "value": "IC-SRE" },
				"customfield_12921": [{ "value": "IC-Compute" }, "AR_Mail"],
				"customfield_12990": { "value": "Normal" },
				"labels": ["strato"],
				"assignee": { "name": "jdoe", "displayName": "Jane Doe" },
				"reporter": null,
				"resolution": { "name": "Done" },
				"comment": {
					"comments": [
						{ "author": { "displayName": "Jane Doe" }, "body": "[14/03/2025 09:10, 09:50]" }
					]
				}
			}
		});
		let record = parse_issue(&json, &TrackerFields::default()).expect("parse failed");

		assert_eq!(record.key, "TECCM-42");
		assert_eq!(record.issue_type.as_deref(), Some("Technical Change"));
		assert_eq!(record.description, "");
		assert_eq!(record.planned_start, Some(datetime!(2025-03-14 09:00 UTC)));
		assert_eq!(record.team.as_deref(), Some("IC-SRE"));
		assert_eq!(record.business_units, vec!["IC-Compute".to_string(), "AR_Mail".to_string()]);
		assert_eq!(record.change_category.as_deref(), Some("Normal"));
		assert_eq!(record.assignee.as_deref(), Some("jdoe"));
		assert_eq!(record.reporter, None);
		assert_eq!(record.resolution.as_deref(), Some("Done"));
		assert_eq!(record.comments.len(), 1);
		assert_eq!(record.comments[0].author.as_deref(), Some("Jane Doe"));
	}

	#[test]
	fn parses_search_page() {
		let json = serde_json::json!({
			"startAt": 100,
			"total": 130,
			"issues": [{ "key": "TECCM-1", "fields": { "summary": "a" } }]
		});
		let page = parse_search_response(json, &TrackerFields::default()).expect("parse failed");

		assert_eq!(page.start_at, 100);
		assert_eq!(page.total, Some(130));
		assert_eq!(page.records[0].summary, "a");
	}

	#[test]
	fn search_without_issues_is_invalid() {
		let err = parse_search_response(serde_json::json!({ "total": 0 }), &TrackerFields::default())
			.expect_err("Expected invalid response.");

		assert!(matches!(err, Error::InvalidResponse { .. }));
	}
}
