use serde::{Deserialize, Serialize};
use time::{OffsetDateTime, UtcOffset};

use culprit_config::Search;

use crate::model::SearchOptions;

#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryKind {
	Window,
	ActiveAtAnchor,
	OpenEnded,
}
impl QueryKind {
	pub fn as_str(self) -> &'static str {
		match self {
			Self::Window => "window",
			Self::ActiveAtAnchor => "active_at_anchor",
			Self::OpenEnded => "open_ended",
		}
	}
}

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct PlannedQuery {
	pub kind: QueryKind,
	pub jql: String,
	pub max_results: u32,
}

/// Builds the window, active-at-anchor and open-ended queries for one incident.
///
/// The plan holds at most three queries and may be empty when the window has zero width and
/// both optional variants are disabled.
pub fn plan_queries(
	anchor: OffsetDateTime,
	options: &SearchOptions,
	search: &Search,
) -> Vec<PlannedQuery> {
	let start = quote(&search.start_field);
	let end = quote(&search.end_field);
	let at = render_time(anchor);
	let mut plan = Vec::with_capacity(3);

	if options.window_before.is_positive() || options.window_after.is_positive() {
		let from = render_time(anchor - options.window_before);
		let to = render_time(anchor + options.window_after);

		plan.push((QueryKind::Window, format!("{start} >= \"{from}\" AND {start} <= \"{to}\"")));
	}
	if options.include_active {
		plan.push((QueryKind::ActiveAtAnchor, format!("{start} <= \"{at}\" AND {end} >= \"{at}\"")));
	}
	if options.include_open_ended {
		plan.push((QueryKind::OpenEnded, format!("{start} <= \"{at}\" AND {end} IS EMPTY")));
	}

	plan.into_iter()
		.map(|(kind, condition)| PlannedQuery {
			kind,
			jql: assemble(&condition, options, search),
			max_results: options.max_results,
		})
		.collect()
}

fn assemble(condition: &str, options: &SearchOptions, search: &Search) -> String {
	let mut jql = format!("project = {} AND {condition}", options.project);

	if !options.include_low_signal && !search.low_signal_field.trim().is_empty() {
		let field = quote(&search.low_signal_field);

		jql.push_str(&format!(
			" AND ({field} IS EMPTY OR {field} != \"{}\")",
			search.low_signal_value.replace('"', "\\\"")
		));
	}

	let extra = options.extra_filter.trim();

	if !extra.is_empty() {
		jql.push(' ');
		jql.push_str(extra);
	}

	jql.push_str(&format!(" ORDER BY {} DESC", quote(&search.start_field)));

	jql
}

fn quote(field: &str) -> String {
	format!("\"{}\"", field.replace('"', "\\\""))
}

/// `YYYY-MM-DD HH:MM` in UTC.
pub fn render_time(at: OffsetDateTime) -> String {
	let at = at.to_offset(UtcOffset::UTC);

	format!(
		"{:04}-{:02}-{:02} {:02}:{:02}",
		at.year(),
		u8::from(at.month()),
		at.day(),
		at.hour(),
		at.minute()
	)
}
