//! Kinds command handler.

use std::{io::Write, path::Path};

use anyhow::Result;
use clap::Args;
use multicluster::{KindRegistry, ResourceKind, ResourceScope};
use serde::Serialize;
use tabwriter::TabWriter;

use super::util::{create_tokio_runtime, discover, load_client, write_document, OutputFormat};

#[derive(Debug, Args)]
pub struct KindsArgs {
	/// Discover the kinds served by this cluster instead of showing the built-in table
	#[arg(long)]
	pub cluster: Option<String>,

	#[arg(short = 'o', long, value_enum, default_value_t = OutputFormat::Table)]
	pub output: OutputFormat,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct KindEntry<'a> {
	kind: &'a str,
	api_version: &'a str,
	plural: &'a str,
	namespaced: bool,
}

impl<'a> From<&'a ResourceKind> for KindEntry<'a> {
	fn from(kind: &'a ResourceKind) -> Self {
		Self {
			kind: &kind.api_resource.kind,
			api_version: &kind.api_resource.api_version,
			plural: &kind.api_resource.plural,
			namespaced: kind.scope == ResourceScope::Namespaced,
		}
	}
}

/// Run the kinds command.
///
/// The built-in table needs no fleet configuration.
pub fn run<W: Write>(args: KindsArgs, config: Option<&Path>, mut writer: W) -> Result<()> {
	let registry = match &args.cluster {
		Some(cluster) => {
			let client = load_client(config)?;
			let runtime = create_tokio_runtime()?;
			runtime.block_on(discover(&client, cluster))?
		}
		None => KindRegistry::builtin(),
	};
	write_kinds(&registry, args.output, &mut writer)
}

fn write_kinds<W: Write>(registry: &KindRegistry, format: OutputFormat, writer: &mut W) -> Result<()> {
	let entries: Vec<KindEntry<'_>> = registry.kinds().into_iter().map(KindEntry::from).collect();

	match format {
		OutputFormat::Table => {
			let mut tw = TabWriter::new(writer);
			writeln!(tw, "KIND\tAPIVERSION\tPLURAL\tSCOPE")?;
			for entry in &entries {
				let scope = if entry.namespaced {
					"Namespaced"
				} else {
					"Cluster"
				};
				writeln!(
					tw,
					"{}\t{}\t{}\t{}",
					entry.kind, entry.api_version, entry.plural, scope
				)?;
			}
			tw.flush()?;
			Ok(())
		}
		format => write_document(writer, format, &entries),
	}
}
