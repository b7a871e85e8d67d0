use std::{path::PathBuf, sync::Arc, time::Duration};

use clap::{Parser, Subcommand};
use color_eyre::eyre;
use time::OffsetDateTime;
use tracing_subscriber::EnvFilter;

use culprit_config::Weights;
use culprit_domain::SearchOptions;
use culprit_service::{Correlator, Error, HttpTrackerProvider, JobStatus, ManualIncident};

const POLL_INTERVAL: Duration = Duration::from_millis(250);

#[derive(Debug, Parser)]
#[command(
	version = culprit_cli::VERSION,
	rename_all = "kebab",
	styles = culprit_cli::styles(),
)]
pub struct Args {
	#[arg(long, short = 'c', value_name = "FILE", global = true, default_value = "culprit.toml")]
	pub config: PathBuf,
	#[command(subcommand)]
	pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
	/// Rank the changes around an incident fetched from the tracker.
	Extract {
		#[arg(long, value_name = "KEY")]
		incident: String,
		#[command(flatten)]
		search: SearchArgs,
		#[command(flatten)]
		output: OutputArgs,
	},
	/// Rank the changes around an incident described on the command line.
	Manual {
		/// RFC 3339 time of first impact.
		#[arg(long, value_name = "TIME")]
		anchor: String,
		#[arg(long)]
		summary: Option<String>,
		#[arg(long = "service", value_name = "NAME")]
		services: Vec<String>,
		#[arg(long = "host", value_name = "HOST")]
		hosts: Vec<String>,
		#[arg(long = "tech", value_name = "NAME")]
		technologies: Vec<String>,
		#[arg(long)]
		team: Option<String>,
		#[command(flatten)]
		search: SearchArgs,
		#[command(flatten)]
		output: OutputArgs,
	},
}

/// Overrides for the configured search defaults.
#[derive(Debug, Default, clap::Args)]
pub struct SearchArgs {
	/// Window before the anchor, such as `48h`, `2d` or `120m`.
	#[arg(long, value_name = "WINDOW")]
	pub window_before: Option<String>,
	#[arg(long, value_name = "WINDOW")]
	pub window_after: Option<String>,
	/// Skip the query for changes active at the anchor.
	#[arg(long)]
	pub no_active: bool,
	/// Skip the query for changes without an end time.
	#[arg(long)]
	pub no_open_ended: bool,
	/// Exclude standard (pre-approved) changes.
	#[arg(long)]
	pub exclude_low_signal: bool,
	#[arg(long)]
	pub max_results: Option<u32>,
	/// Appended to every query, including its leading `AND`.
	#[arg(long, value_name = "JQL")]
	pub extra_filter: Option<String>,
	#[arg(long)]
	pub project: Option<String>,
}
impl SearchArgs {
	pub fn apply(&self, mut options: SearchOptions) -> eyre::Result<SearchOptions> {
		if let Some(raw) = &self.window_before {
			options.window_before = culprit_domain::model::parse_window(raw)?;
		}
		if let Some(raw) = &self.window_after {
			options.window_after = culprit_domain::model::parse_window(raw)?;
		}
		if self.no_active {
			options.include_active = false;
		}
		if self.no_open_ended {
			options.include_open_ended = false;
		}
		if self.exclude_low_signal {
			options.include_low_signal = false;
		}
		if let Some(max_results) = self.max_results {
			options.max_results = max_results;
		}
		if let Some(extra_filter) = &self.extra_filter {
			options.extra_filter = extra_filter.clone();
		}
		if let Some(project) = &self.project {
			options.project = project.clone();
		}

		Ok(options)
	}
}

#[derive(Debug, Default, clap::Args)]
pub struct OutputArgs {
	#[arg(long, value_name = "N")]
	pub top: Option<usize>,
	/// Rescore with `time,service,infra,org` weights instead of the configured ones.
	#[arg(long, value_name = "T,S,I,O")]
	pub weights: Option<String>,
}

pub async fn run(args: Args) -> eyre::Result<()> {
	let config = culprit_config::load(&args.config)?;
	let filter = EnvFilter::new(config.service.log_level.clone());

	tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).init();

	let provider = HttpTrackerProvider::new(&config.tracker)?;
	let correlator = Correlator::new(config, Arc::new(provider));

	let (job_id, output) = match args.command {
		Command::Extract { incident, search, output } => {
			let options = search.apply(correlator.default_options()?)?;

			(correlator.start_extraction(&incident, Some(options)).await?, output)
		},
		Command::Manual {
			anchor,
			summary,
			services,
			hosts,
			technologies,
			team,
			search,
			output,
		} => {
			let options = search.apply(correlator.default_options()?)?;
			let incident = ManualIncident {
				anchor: parse_anchor(&anchor)?,
				summary,
				services,
				hosts,
				technologies,
				team,
			};

			(correlator.start_manual_extraction(incident, Some(options)).await?, output)
		},
	};

	let job = loop {
		let job = correlator.job(job_id).await?;

		if job.status.is_terminal() {
			break job;
		}

		tokio::time::sleep(POLL_INTERVAL).await;
	};

	match job.status {
		JobStatus::Completed => {},
		JobStatus::Failed => {
			let message = job.error.unwrap_or_else(|| "unknown error".to_string());

			return Err(Error::ExtractionFailed { message }.into());
		},
		status => return Err(eyre::eyre!("Extraction {job_id} ended as {status}.")),
	}

	let mut ranking = correlator.ranking(job_id, output.top).await?;

	if let Some(raw) = output.weights.as_deref() {
		let top = match output.top {
			Some(top) => top,
			None => correlator.settings().top_results().await? as usize,
		};
		let mut items = correlator.rescore(job_id, parse_weights(raw)?).await?;

		items.truncate(top);

		ranking.items = items;
	}

	println!("{}", serde_json::to_string_pretty(&ranking)?);

	Ok(())
}

fn parse_anchor(raw: &str) -> eyre::Result<OffsetDateTime> {
	culprit_domain::time_serde::parse_utc(raw.trim())
		.map_err(|err| eyre::eyre!("Invalid anchor {raw:?}. Expected RFC 3339: {err}"))
}

/// `time,service,infra,org`, for example `0.5,0.3,0.1,0.1`.
pub fn parse_weights(raw: &str) -> eyre::Result<Weights> {
	let parts = raw
		.split(',')
		.map(|part| part.trim().parse::<f64>())
		.collect::<Result<Vec<_>, _>>()
		.map_err(|err| eyre::eyre!("Invalid weights {raw:?}: {err}"))?;
	let [time, service, infra, org] = parts[..] else {
		return Err(eyre::eyre!("Expected four comma-separated weights, got {}.", parts.len()));
	};

	Ok(Weights { time, service, infra, org })
}
