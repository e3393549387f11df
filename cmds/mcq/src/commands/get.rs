//! Get command handler.

use std::{io::Write, path::Path};

use anyhow::{Context, Result};
use clap::Args;
use kube::api::DynamicObject;
use multicluster::{ClustersClient, KindRegistry};
use serde::Serialize;
use tabwriter::TabWriter;

use super::util::{create_tokio_runtime, discover, load_client, write_document, OutputFormat};

#[derive(Debug, Args)]
pub struct GetArgs {
	/// Cluster to read from
	pub cluster: String,

	/// Resource kind, e.g. ConfigMap or deployment
	pub kind: String,

	/// Object name
	pub name: String,

	/// Namespace of the object; omit for cluster-wide kinds
	#[arg(short = 'n', long)]
	pub namespace: Option<String>,

	/// Resolve the kind from the cluster's discovery instead of the built-in table
	#[arg(long)]
	pub discover: bool,

	#[arg(short = 'o', long, value_enum, default_value_t = OutputFormat::Table)]
	pub output: OutputFormat,
}

#[derive(Debug, Serialize)]
struct GetOutput {
	cluster: String,
	#[serde(skip_serializing_if = "Option::is_none")]
	tenant: Option<String>,
	object: DynamicObject,
}

/// Run the get command.
pub fn run<W: Write>(args: GetArgs, config: Option<&Path>, mut writer: W) -> Result<()> {
	let client = load_client(config)?;
	let runtime = create_tokio_runtime()?;
	runtime.block_on(run_async(args, &client, &mut writer))
}

pub async fn run_async<W: Write>(args: GetArgs, client: &ClustersClient, writer: &mut W) -> Result<()> {
	let kinds = if args.discover {
		discover(client, &args.cluster).await?
	} else {
		KindRegistry::builtin()
	};

	let found = client
		.get_object(
			&kinds,
			&args.cluster,
			&args.kind,
			args.namespace.as_deref(),
			&args.name,
		)
		.await
		.with_context(|| {
			format!(
				"getting {} `{}` from cluster `{}`",
				args.kind, args.name, args.cluster
			)
		})?;

	let output = GetOutput {
		cluster: found.cluster,
		tenant: found.tenant,
		object: found.object,
	};

	match args.output {
		OutputFormat::Table => {
			let mut tw = TabWriter::new(writer);
			writeln!(tw, "CLUSTER\tNAMESPACE\tNAME\tTENANT")?;
			writeln!(
				tw,
				"{}\t{}\t{}\t{}",
				output.cluster,
				output.object.metadata.namespace.as_deref().unwrap_or("-"),
				output.object.metadata.name.as_deref().unwrap_or("-"),
				output.tenant.as_deref().unwrap_or("-"),
			)?;
			tw.flush()?;
			Ok(())
		}
		format => write_document(writer, format, &output),
	}
}
