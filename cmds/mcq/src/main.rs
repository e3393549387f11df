use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use commands::util::BrokenPipeGuard;
use tracing::Level;

mod commands;
mod telemetry;

#[derive(Parser)]
#[command(name = "mcq")]
#[command(about = "Query a fleet of Kubernetes clusters as a single principal", long_about = None)]
#[command(version)]
struct Cli {
	/// Fleet configuration file
	#[arg(short = 'c', long, env = "MCQ_CONFIG", global = true)]
	config: Option<PathBuf>,

	/// Log level (possible values: error, warn, info, debug, trace). Overrides RUST_LOG
	#[arg(long, global = true)]
	log_level: Option<Level>,

	#[command(subcommand)]
	command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
	/// List a kind across every cluster and accessible namespace
	List(commands::list::ListArgs),

	/// Get one object from one cluster
	Get(commands::get::GetArgs),

	/// Show the resource kinds that can be queried
	Kinds(commands::kinds::KindsArgs),
}

fn main() -> Result<()> {
	let cli = Cli::parse();

	telemetry::init(cli.log_level)?;

	let stdout = BrokenPipeGuard::new(std::io::stdout());
	let config = cli.config.as_deref();

	match cli.command {
		Commands::List(args) => commands::list::run(args, config, stdout),
		Commands::Get(args) => commands::get::run(args, config, stdout),
		Commands::Kinds(args) => commands::kinds::run(args, config, stdout),
	}
}

#[cfg(test)]
mod tests {
	use assert_matches::assert_matches;

	use super::*;

	#[test]
	fn test_parse_list() {
		let cli = Cli::try_parse_from([
			"mcq",
			"--config",
			"fleet.yaml",
			"list",
			"configmap",
			"-l",
			"app=web",
			"--limit",
			"10",
			"--continue",
			"abc",
		])
		.unwrap();

		assert_eq!(cli.config, Some(PathBuf::from("fleet.yaml")));
		assert_matches!(cli.command, Commands::List(args) => {
			assert_eq!(args.kind, "configmap");
			assert_eq!(args.selector.as_deref(), Some("app=web"));
			assert_eq!(args.limit, Some(10));
			assert_eq!(args.continue_token, "abc");
			assert!(!args.all);
		});
	}

	#[test]
	fn test_parse_global_flags_after_subcommand() {
		let cli = Cli::try_parse_from([
			"mcq",
			"get",
			"east",
			"configmap",
			"app",
			"-n",
			"team-a",
			"--log-level",
			"debug",
		])
		.unwrap();

		assert_eq!(cli.log_level, Some(Level::DEBUG));
		assert_matches!(cli.command, Commands::Get(args) => {
			assert_eq!(args.cluster, "east");
			assert_eq!(args.namespace.as_deref(), Some("team-a"));
		});
	}

	#[test]
	fn test_get_requires_name() {
		assert!(Cli::try_parse_from(["mcq", "get", "east", "configmap"]).is_err());
	}
}
