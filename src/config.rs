use clap::Parser;
use lazy_static::lazy_static;
use tracing::Level;

use crate::BackendFactory;

lazy_static! {
	/// `--be-type` help, listing the backend types compiled into this binary.
	static ref BACKEND_TYPE_HELP: String =
		format!("Backend type, one of: {}", BackendFactory::list().join(", "));
}

/// Command line of the servicebox server.
///
/// Every flag can also be set through its `SERVICEBOX_*` environment variable, including from a
/// `.env` file in the working directory.
#[derive(Parser, Debug, Clone)]
#[command(name = "servicebox", version, about)]
pub struct Args {
	/// Port to listen on.
	#[arg(short, long, env = "SERVICEBOX_PORT", default_value_t = 8080)]
	pub port: u16,
	/// Log level
	#[arg(short, long, env = "SERVICEBOX_LOG_LEVEL", default_value = "info")]
	pub log_level: Level,
	#[arg(
		short,
		long,
		env = "SERVICEBOX_BE_TYPE",
		default_value = "memory",
		help = BACKEND_TYPE_HELP.as_str()
	)]
	pub be_type: String,
	/// Backend options as a JSON document, e.g. `{"contactPoints":["localhost:9042"]}`.
	#[arg(short = 'o', long, env = "SERVICEBOX_BE_OPTS", value_parser = parse_json)]
	pub be_opts: Option<serde_json::Value>,
	/// Drop and recreate the backend's counter storage before binding. Destroys every counter.
	#[arg(long)]
	pub provision: bool,
}

impl Args {
	/// Backend options, `null` when none were given.
	pub fn backend_options(&self) -> serde_json::Value {
		self.be_opts.clone().unwrap_or(serde_json::Value::Null)
	}
}

fn parse_json(value: &str) -> Result<serde_json::Value, serde_json::Error> {
	serde_json::from_str(value)
}

#[cfg(test)]
mod tests {
	use serde_json::json;

	use super::*;

	#[test]
	fn defaults() {
		let args = Args::try_parse_from(["servicebox"]).unwrap();

		assert_eq!(args.port, 8080);
		assert_eq!(args.log_level, Level::INFO);
		assert_eq!(args.be_type, "memory");
		assert_eq!(args.backend_options(), serde_json::Value::Null);
		assert!(!args.provision);
	}

	#[test]
	fn short_flags() {
		let args = Args::try_parse_from([
			"servicebox",
			"-p",
			"9000",
			"-l",
			"debug",
			"-b",
			"redis-cluster",
			"-o",
			r#"{"contactPoints":["10.0.0.1:6379"]}"#,
			"--provision",
		])
		.unwrap();

		assert_eq!(args.port, 9000);
		assert_eq!(args.log_level, Level::DEBUG);
		assert_eq!(args.be_type, "redis-cluster");
		assert_eq!(args.backend_options(), json!({ "contactPoints": ["10.0.0.1:6379"] }));
		assert!(args.provision);
	}

	#[test]
	fn invalid_backend_options_are_rejected() {
		let result = Args::try_parse_from(["servicebox", "--be-opts", "{contactPoints:"]);

		assert!(result.is_err());
	}

	#[test]
	fn help_lists_backend_types() {
		assert!(BACKEND_TYPE_HELP.contains("memory"));
	}
}
