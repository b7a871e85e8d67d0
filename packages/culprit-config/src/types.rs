use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Clone, Debug, Deserialize)]
pub struct Config {
	pub service: Service,
	pub tracker: Tracker,
	#[serde(default)]
	pub extraction: Extraction,
	#[serde(default)]
	pub search: Search,
	#[serde(default)]
	pub scoring: Scoring,
	#[serde(default)]
	pub mapping: Mapping,
}

#[derive(Clone, Debug, Deserialize)]
pub struct Service {
	pub log_level: String,
}

#[derive(Clone, Debug, Deserialize)]
pub struct Tracker {
	pub api_base: String,
	/// Optional. When set, requests use basic auth with `api_token` as the password; otherwise
	/// `api_token` is sent as a bearer token.
	pub username: Option<String>,
	pub api_token: String,
	pub timeout_ms: u64,
	#[serde(default)]
	pub default_headers: Map<String, Value>,
	#[serde(default)]
	pub fields: TrackerFields,
}

/// Custom field ids of the tracker instance.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct TrackerFields {
	pub planned_start: String,
	pub planned_end: String,
	pub team: String,
	pub business_units: String,
	pub change_category: String,
}
impl Default for TrackerFields {
	fn default() -> Self {
		Self {
			planned_start: "customfield_10303".to_string(),
			planned_end: "customfield_10304".to_string(),
			team: "customfield_15000".to_string(),
			business_units: "customfield_12921".to_string(),
			change_category: "customfield_12990".to_string(),
		}
	}
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Extraction {
	pub concurrency: usize,
	pub page_size: u32,
	pub retry: Retry,
	pub hosts: HostPolicy,
	pub technologies: Vec<String>,
}
impl Default for Extraction {
	fn default() -> Self {
		Self {
			concurrency: 8,
			page_size: 100,
			retry: Retry::default(),
			hosts: HostPolicy::default(),
			technologies: default_technologies(),
		}
	}
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Retry {
	pub max_attempts: u32,
	pub base_delay_ms: u64,
	pub max_delay_ms: u64,
	/// Fraction of the computed delay added at random, in the range 0.0-1.0.
	pub jitter: f64,
}
impl Default for Retry {
	fn default() -> Self {
		Self { max_attempts: 3, base_delay_ms: 2_000, max_delay_ms: 30_000, jitter: 0.2 }
	}
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct HostPolicy {
	pub patterns: Vec<String>,
	pub blacklist: Vec<String>,
}
impl Default for HostPolicy {
	fn default() -> Self {
		Self {
			patterns: [
				r"\b(s3-node-\d+(?:-\d+)?)\b",
				r"\b([a-z]{2,10}-[a-z]*-?\d{1,3})\b",
				r"\b([a-z]{2,6}\d{2,4})\b",
				r"\b([a-z]{3,8}-\d{3,5})\b",
				r"\b([a-z]{6,30}[a-z]\d{2})\b",
			]
			.into_iter()
			.map(str::to_string)
			.collect(),
			blacklist: [
				"https",
				"http",
				"image",
				"browse",
				"version",
				"update",
				"release",
				"node12",
				"node10",
				"node11",
				"utf8",
				"utf16",
				"iso8859",
				"win1252",
				"amd64",
				"x86",
				"arm64",
				"region",
				"regions",
			]
			.into_iter()
			.map(str::to_string)
			.collect(),
		}
	}
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Search {
	pub defaults: SearchDefaults,
	/// Query-language name of the change start field.
	pub start_field: String,
	pub end_field: String,
	pub low_signal_field: String,
	pub low_signal_value: String,
}
impl Default for Search {
	fn default() -> Self {
		Self {
			defaults: SearchDefaults::default(),
			start_field: "Start Date/Time".to_string(),
			end_field: "End Date/Time".to_string(),
			low_signal_field: "Change Category".to_string(),
			low_signal_value: "Standard".to_string(),
		}
	}
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct SearchDefaults {
	pub window_before: String,
	pub window_after: String,
	pub include_active: bool,
	pub include_open_ended: bool,
	pub include_low_signal: bool,
	pub max_results: u32,
	pub extra_filter: String,
	pub project: String,
}
impl Default for SearchDefaults {
	fn default() -> Self {
		Self {
			window_before: "48h".to_string(),
			window_after: "2h".to_string(),
			include_active: true,
			include_open_ended: true,
			include_low_signal: true,
			max_results: 500,
			extra_filter: String::new(),
			project: "TECCM".to_string(),
		}
	}
}

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(default)]
pub struct Scoring {
	pub weights: Weights,
	pub penalties: Penalties,
	pub bonuses: Bonuses,
	pub thresholds: Thresholds,
	pub top_results: u32,
}
impl Default for Scoring {
	fn default() -> Self {
		Self {
			weights: Weights::default(),
			penalties: Penalties::default(),
			bonuses: Bonuses::default(),
			thresholds: Thresholds::default(),
			top_results: 20,
		}
	}
}

/// Stored weights. They are normalized to sum to one before use.
#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Serialize)]
#[serde(default)]
pub struct Weights {
	pub time: f64,
	pub service: f64,
	pub infra: f64,
	pub org: f64,
}
impl Default for Weights {
	fn default() -> Self {
		Self { time: 0.35, service: 0.30, infra: 0.20, org: 0.15 }
	}
}

#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Serialize)]
#[serde(default)]
pub struct Penalties {
	pub no_live_intervals: f64,
	pub no_hosts: f64,
	pub no_services: f64,
	pub generic_change: f64,
	pub long_duration_week: f64,
	pub long_duration_month: f64,
	pub long_duration_quarter: f64,
}
impl Penalties {
	pub fn entries(&self) -> [(&'static str, f64); 7] {
		[
			("no_live_intervals", self.no_live_intervals),
			("no_hosts", self.no_hosts),
			("no_services", self.no_services),
			("generic_change", self.generic_change),
			("long_duration_week", self.long_duration_week),
			("long_duration_month", self.long_duration_month),
			("long_duration_quarter", self.long_duration_quarter),
		]
	}
}
impl Default for Penalties {
	fn default() -> Self {
		Self {
			no_live_intervals: 0.8,
			no_hosts: 0.95,
			no_services: 0.9,
			generic_change: 0.5,
			long_duration_week: 0.8,
			long_duration_month: 0.6,
			long_duration_quarter: 0.4,
		}
	}
}

#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Serialize)]
#[serde(default)]
pub struct Bonuses {
	pub proximity_exact: f64,
	pub proximity_1h: f64,
	pub proximity_2h: f64,
	pub proximity_4h: f64,
}
impl Bonuses {
	pub fn entries(&self) -> [(&'static str, f64); 4] {
		[
			("proximity_exact", self.proximity_exact),
			("proximity_1h", self.proximity_1h),
			("proximity_2h", self.proximity_2h),
			("proximity_4h", self.proximity_4h),
		]
	}
}
impl Default for Bonuses {
	fn default() -> Self {
		Self { proximity_exact: 1.5, proximity_1h: 1.3, proximity_2h: 1.2, proximity_4h: 1.1 }
	}
}

#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Serialize)]
#[serde(default)]
pub struct Thresholds {
	pub time_decay_hours: f64,
	pub min_score_to_show: f64,
}
impl Default for Thresholds {
	fn default() -> Self {
		Self { time_decay_hours: 4.0, min_score_to_show: 0.0 }
	}
}

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(default)]
pub struct Mapping {
	/// Canonical service name to its aliases.
	pub synonyms: BTreeMap<String, Vec<String>>,
	/// Ecosystem name to the canonical services it groups.
	pub groups: BTreeMap<String, Vec<String>>,
}
impl Default for Mapping {
	fn default() -> Self {
		Self { synonyms: default_synonyms(), groups: default_groups() }
	}
}

pub fn default_synonyms() -> BTreeMap<String, Vec<String>> {
	to_table(&[
		(
			"customer area",
			&["adc", "area de clientes", "customer system", "arsys customer panel", "área de clientes"],
		),
		("control panel", &["pdc", "panel de control", "control panels"]),
		("s3 object storage", &["s3", "object storage", "ic-s3", "cloudian", "hyperstore"]),
		("block storage", &["ic-block storage"]),
		("compute", &["ic-compute", "compute platform", "compute provisioning"]),
		("network", &["ic-network", "network platform", "network provisioning"]),
		("mail", &["email", "e-mail", "mail platform", "dovecot", "postfix"]),
		("dns", &["domain", "dns platform"]),
		("dedicated server", &["dedicated", "bare metal", "physical server"]),
		("cloud server", &["ngcs", "vps", "v-server", "cloud nx"]),
		("webhosting", &["shared hosting", "sharedhosting", "web hosting"]),
		("kubernetes", &["k8s", "container registry", "ic-kubernetes"]),
	])
}

pub fn default_groups() -> BTreeMap<String, Vec<String>> {
	to_table(&[
		(
			"ionos-cloud",
			&[
				"ic-cis",
				"ic-sre",
				"ic-oss",
				"ic-pss",
				"ic-bss",
				"ic-ess",
				"cloud api",
				"dcd",
				"dcd api",
				"compute",
				"network",
				"block storage",
				"s3 object storage",
				"kubernetes",
				"sre",
				"iam",
				"keycloak",
				"iaas provisioning",
				"storage provisioning",
				"compute platform",
				"network platform",
				"storage platform",
			],
		),
		(
			"arsys",
			&[
				"customer area",
				"control panel",
				"mail",
				"dns",
				"webhosting",
				"dedicated server",
				"cloud server",
				"ar-cis",
				"ar-pss",
				"ar-oss",
			],
		),
		("strato", &["strato-mail", "strato-webmail", "strato-server", "str-cis", "str-pss"]),
	])
}

pub fn default_technologies() -> Vec<String> {
	[
		"opensearch",
		"kibana",
		"elasticsearch",
		"logstash",
		"fluentd",
		"apache",
		"nginx",
		"php",
		"python",
		"java",
		"nodejs",
		"tomcat",
		"jboss",
		"wildfly",
		"mysql",
		"postgresql",
		"mariadb",
		"mongodb",
		"redis",
		"cassandra",
		"ceph",
		"docker",
		"kubernetes",
		"k8s",
		"proxmox",
		"vmware",
		"vcenter",
		"esxi",
		"openstack",
		"jenkins",
		"ansible",
		"terraform",
		"gitlab",
		"github",
		"rundeck",
		"salt",
		"imperva",
		"cloudflare",
		"akamai",
		"waf",
		"kafka",
		"rabbitmq",
		"activemq",
		"grafana",
		"prometheus",
		"zabbix",
		"nagios",
		"haproxy",
		"keepalived",
		"varnish",
		"memcached",
		"s3",
		"cloudian",
		"hyperstore",
		"netbackup",
		"nfs",
		"dovecot",
		"postfix",
		"roundcube",
		"exim",
		"qemu",
		"kvm",
		"libvirt",
		"hyper-v",
		"virtuozzo",
		"debian",
		"ubuntu",
		"centos",
		"rhel",
		"keycloak",
		"ldap",
		"saml",
		"oauth",
	]
	.into_iter()
	.map(str::to_string)
	.collect()
}

fn to_table(rows: &[(&str, &[&str])]) -> BTreeMap<String, Vec<String>> {
	rows.iter()
		.map(|(name, members)| {
			(name.to_string(), members.iter().map(|member| member.to_string()).collect())
		})
		.collect()
}
