//! Utilities for command handlers.

use std::{
	io::{self, ErrorKind, Write},
	path::Path,
};

use anyhow::{Context, Result};
use clap::ValueEnum;
use multicluster::{ClustersClient, FleetConfig, KindRegistry, ResourceKind};
use serde::Serialize;

/// Output format of a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
	/// Aligned columns
	Table,
	Json,
	Yaml,
}

pub fn create_tokio_runtime() -> Result<tokio::runtime::Runtime> {
	tokio::runtime::Builder::new_multi_thread()
		.enable_all()
		.build()
		.context("creating tokio runtime")
}

pub fn load_client(config: Option<&Path>) -> Result<ClustersClient> {
	let config = FleetConfig::load(config).context("loading fleet config")?;
	config.client().context("registering clusters")
}

/// Resolve a kind name, from the built-in table or from a cluster's discovery.
pub async fn resolve_kind(
	client: &ClustersClient,
	kind: &str,
	discover_from: Option<&str>,
) -> Result<ResourceKind> {
	let registry = match discover_from {
		Some(cluster) => discover(client, cluster).await?,
		None => KindRegistry::builtin(),
	};
	registry
		.lookup(kind)
		.cloned()
		.with_context(|| format!("unknown resource kind `{kind}`"))
}

pub async fn discover(client: &ClustersClient, cluster: &str) -> Result<KindRegistry> {
	let kube_client = client
		.pool()
		.client_for(client.principal(), cluster)
		.await
		.with_context(|| format!("connecting to cluster `{cluster}`"))?;
	KindRegistry::discover(&kube_client)
		.await
		.with_context(|| format!("discovering resource kinds of cluster `{cluster}`"))
}

/// Write `value` as one JSON or YAML document.
pub fn write_document<W: Write, T: Serialize>(
	writer: &mut W,
	format: OutputFormat,
	value: &T,
) -> Result<()> {
	match format {
		OutputFormat::Yaml => serde_yaml::to_writer(&mut *writer, value)?,
		OutputFormat::Json | OutputFormat::Table => {
			serde_json::to_writer_pretty(&mut *writer, value)?;
			writeln!(writer)?;
		}
	}
	Ok(())
}

/// A writer wrapper that silently handles broken pipe errors.
///
/// When the underlying writer returns a broken pipe error (EPIPE), this wrapper
/// converts it to a successful write. This allows commands to exit cleanly when
/// output is piped to a process that closes early (e.g., `mcq list pod | head -1`).
pub struct BrokenPipeGuard<W> {
	inner: W,
}

impl<W> BrokenPipeGuard<W> {
	pub fn new(inner: W) -> Self {
		Self { inner }
	}
}

impl<W: Write> Write for BrokenPipeGuard<W> {
	fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
		match self.inner.write(buf) {
			Err(e) if e.kind() == ErrorKind::BrokenPipe => Ok(buf.len()),
			other => other,
		}
	}

	fn flush(&mut self) -> io::Result<()> {
		match self.inner.flush() {
			Err(e) if e.kind() == ErrorKind::BrokenPipe => Ok(()),
			other => other,
		}
	}
}
