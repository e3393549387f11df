//! List command handler.

use std::{io::Write, path::Path, time::Duration};

use anyhow::Result;
use clap::Args;
use kube::api::DynamicObject;
use multicluster::{ClusteredList, ClusteredListRequest, ClustersClient};
use serde::Serialize;
use tabwriter::TabWriter;
use tracing::warn;

use super::util::{create_tokio_runtime, load_client, resolve_kind, write_document, OutputFormat};

#[derive(Debug, Args)]
pub struct ListArgs {
	/// Resource kind, e.g. ConfigMap or deployment
	pub kind: String,

	/// Label selector applied in every namespace
	#[arg(short = 'l', long)]
	pub selector: Option<String>,

	/// Field selector applied in every namespace
	#[arg(long)]
	pub field_selector: Option<String>,

	/// Maximum items per namespace and page
	#[arg(long)]
	pub limit: Option<u32>,

	/// Continue token printed by a previous page
	#[arg(long = "continue", default_value = "")]
	pub continue_token: String,

	/// Fetch every page instead of a single one
	#[arg(long)]
	pub all: bool,

	/// Give up on a page after this many seconds
	#[arg(long)]
	pub timeout: Option<u64>,

	/// Resolve the kind from this cluster's discovery instead of the built-in table
	#[arg(long)]
	pub discover_from: Option<String>,

	#[arg(short = 'o', long, value_enum, default_value_t = OutputFormat::Table)]
	pub output: OutputFormat,
}

#[derive(Debug, Serialize)]
struct ListedItem {
	cluster: String,
	#[serde(flatten)]
	object: DynamicObject,
}

#[derive(Debug, Serialize)]
struct FailedScope {
	cluster: String,
	#[serde(skip_serializing_if = "Option::is_none")]
	namespace: Option<String>,
	error: String,
}

#[derive(Debug, Default, Serialize)]
struct ListOutput {
	items: Vec<ListedItem>,
	#[serde(rename = "continue", skip_serializing_if = "String::is_empty")]
	continue_token: String,
	#[serde(skip_serializing_if = "Vec::is_empty")]
	errors: Vec<FailedScope>,
}

impl ListOutput {
	fn extend(&mut self, list: ClusteredList) {
		let (list, errors) = list.into_parts();
		self.items.extend(list.items().map(|(cluster, object)| ListedItem {
			cluster: cluster.to_string(),
			object: object.clone(),
		}));

		for error in errors.iter().flatten() {
			warn!(scope = %error.scope, error = %error.failure, "listing failed");
			self.errors.push(FailedScope {
				cluster: error.scope.cluster.clone(),
				namespace: error.scope.namespace.clone(),
				error: error.failure.to_string(),
			});
		}
	}

	fn write_table<W: Write>(&self, writer: &mut W) -> Result<()> {
		let mut tw = TabWriter::new(&mut *writer);
		writeln!(tw, "CLUSTER\tNAMESPACE\tNAME")?;
		for item in &self.items {
			writeln!(
				tw,
				"{}\t{}\t{}",
				item.cluster,
				item.object.metadata.namespace.as_deref().unwrap_or("-"),
				item.object.metadata.name.as_deref().unwrap_or("-"),
			)?;
		}
		tw.flush()?;
		drop(tw);

		for failed in &self.errors {
			writeln!(
				writer,
				"error: {}/{}: {}",
				failed.cluster,
				failed.namespace.as_deref().unwrap_or("-"),
				failed.error
			)?;
		}
		if !self.continue_token.is_empty() {
			writeln!(writer, "continue: {}", self.continue_token)?;
		}
		Ok(())
	}
}

/// Run the list command.
pub fn run<W: Write>(args: ListArgs, config: Option<&Path>, mut writer: W) -> Result<()> {
	let client = load_client(config)?;
	let runtime = create_tokio_runtime()?;
	runtime.block_on(run_async(args, &client, &mut writer))
}

pub async fn run_async<W: Write>(args: ListArgs, client: &ClustersClient, writer: &mut W) -> Result<()> {
	let kind = resolve_kind(client, &args.kind, args.discover_from.as_deref()).await?;

	let mut output = ListOutput::default();
	let mut token = args.continue_token.clone();
	loop {
		let request = ClusteredListRequest::builder()
			.kind(kind.clone())
			.continue_token(token)
			.maybe_limit(args.limit)
			.maybe_label_selector(args.selector.clone())
			.maybe_field_selector(args.field_selector.clone())
			.maybe_timeout(args.timeout.map(Duration::from_secs))
			.build();

		let list = client.clustered_list(&request).await?;
		let has_more = list.has_more();
		token = list.continue_token();
		output.extend(list);

		if !has_more {
			break;
		}
		if !args.all {
			output.continue_token = token;
			break;
		}
	}

	match args.output {
		OutputFormat::Table => output.write_table(writer),
		format => write_document(writer, format, &output),
	}
}
