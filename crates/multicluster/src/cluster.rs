//! Cluster descriptors.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use http::Uri;
use kube::config::{AuthInfo, Context, Kubeconfig, NamedAuthInfo, NamedCluster, NamedContext};
use serde::Deserialize;
use thiserror::Error;

const PEM_CERTIFICATE_HEADER: &str = "-----BEGIN CERTIFICATE-----";

/// Reasons a cluster descriptor is rejected at registration.
#[derive(Debug, Error)]
pub enum InvalidClusterError {
	#[error("cluster name is empty")]
	EmptyName,

	#[error("server address `{server}` is not a valid URI")]
	InvalidServer {
		server: String,
		#[source]
		source: http::uri::InvalidUri,
	},

	#[error("server address `{0}` must be an absolute http(s) URL")]
	NotAbsolute(String),

	#[error("certificateAuthorityData is not valid base64")]
	CertificateAuthorityEncoding(#[source] base64::DecodeError),

	#[error("certificateAuthorityData does not contain a PEM certificate")]
	MissingCertificate,
}

/// TLS trust material for one cluster endpoint.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TlsConfig {
	/// Base64-encoded PEM bundle of certificate authorities.
	#[serde(default)]
	pub certificate_authority_data: Option<String>,
	#[serde(default)]
	pub insecure_skip_tls_verify: bool,
	/// Overrides the server name used for SNI and certificate validation.
	#[serde(default)]
	pub tls_server_name: Option<String>,
}

/// A cluster participating in the federation.
///
/// Immutable once registered with a [`ClientsPool`](crate::pool::ClientsPool).
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cluster {
	pub name: String,
	pub server: String,
	#[serde(flatten)]
	pub tls: TlsConfig,
}

impl Cluster {
	pub fn new(name: impl Into<String>, server: impl Into<String>) -> Self {
		Self {
			name: name.into(),
			server: server.into(),
			tls: TlsConfig::default(),
		}
	}

	/// Trust the given base64-encoded PEM certificate authorities.
	pub fn with_certificate_authority(mut self, data: impl Into<String>) -> Self {
		self.tls.certificate_authority_data = Some(data.into());
		self
	}

	/// Skip server certificate verification.
	pub fn insecure(mut self) -> Self {
		self.tls.insecure_skip_tls_verify = true;
		self
	}

	/// Check the descriptor without contacting the cluster.
	pub fn validate(&self) -> Result<(), InvalidClusterError> {
		if self.name.trim().is_empty() {
			return Err(InvalidClusterError::EmptyName);
		}

		let uri: Uri = self
			.server
			.parse()
			.map_err(|source| InvalidClusterError::InvalidServer {
				server: self.server.clone(),
				source,
			})?;
		let has_http_scheme = matches!(uri.scheme_str(), Some("http" | "https"));
		if !has_http_scheme || uri.host().is_none() {
			return Err(InvalidClusterError::NotAbsolute(self.server.clone()));
		}

		if let Some(data) = &self.tls.certificate_authority_data {
			let pem = STANDARD
				.decode(data.trim())
				.map_err(InvalidClusterError::CertificateAuthorityEncoding)?;
			if !String::from_utf8_lossy(&pem).contains(PEM_CERTIFICATE_HEADER) {
				return Err(InvalidClusterError::MissingCertificate);
			}
		}

		Ok(())
	}

	/// Build a single-context kubeconfig for this cluster authenticating as `auth_info`.
	pub(crate) fn kubeconfig(&self, auth_info: AuthInfo) -> Kubeconfig {
		let user_name = "federated-user";

		Kubeconfig {
			clusters: vec![NamedCluster {
				name: self.name.clone(),
				cluster: Some(kube::config::Cluster {
					server: Some(self.server.clone()),
					certificate_authority_data: self.tls.certificate_authority_data.clone(),
					insecure_skip_tls_verify: Some(self.tls.insecure_skip_tls_verify),
					tls_server_name: self.tls.tls_server_name.clone(),
					..Default::default()
				}),
			}],
			contexts: vec![NamedContext {
				name: self.name.clone(),
				context: Some(Context {
					cluster: self.name.clone(),
					user: Some(user_name.to_string()),
					..Default::default()
				}),
			}],
			auth_infos: vec![NamedAuthInfo {
				name: user_name.to_string(),
				auth_info: Some(auth_info),
			}],
			current_context: Some(self.name.clone()),
			..Default::default()
		}
	}
}

#[cfg(test)]
mod tests {
	use assert_matches::assert_matches;
	use rstest::rstest;

	use super::*;

	// "-----BEGIN CERTIFICATE-----\nMIIB\n-----END CERTIFICATE-----\n"
	const FAKE_CA: &str =
		"LS0tLS1CRUdJTiBDRVJUSUZJQ0FURS0tLS0tCk1JSUIKLS0tLS1FTkQgQ0VSVElGSUNBVEUtLS0tLQo=";

	#[test]
	fn test_valid_cluster() {
		let cluster = Cluster::new("prod", "https://10.0.0.1:6443").with_certificate_authority(FAKE_CA);
		assert!(cluster.validate().is_ok());
	}

	#[rstest]
	#[case::empty_name("", "https://10.0.0.1:6443")]
	#[case::blank_name("  ", "https://10.0.0.1:6443")]
	fn test_empty_name_rejected(#[case] name: &str, #[case] server: &str) {
		assert_matches!(
			Cluster::new(name, server).validate(),
			Err(InvalidClusterError::EmptyName)
		);
	}

	#[rstest]
	#[case::relative("/just/a/path")]
	#[case::other_scheme("ftp://10.0.0.1")]
	#[case::bare_host("10.0.0.1:6443")]
	fn test_non_http_server_rejected(#[case] server: &str) {
		let result = Cluster::new("prod", server).validate();
		assert!(matches!(
			result,
			Err(InvalidClusterError::NotAbsolute(_) | InvalidClusterError::InvalidServer { .. })
		));
	}

	#[test]
	fn test_undecodable_ca_rejected() {
		let cluster =
			Cluster::new("prod", "https://10.0.0.1:6443").with_certificate_authority("%%%not-base64");
		assert_matches!(
			cluster.validate(),
			Err(InvalidClusterError::CertificateAuthorityEncoding(_))
		);
	}

	#[test]
	fn test_ca_without_certificate_rejected() {
		let cluster = Cluster::new("prod", "https://10.0.0.1:6443")
			.with_certificate_authority(STANDARD.encode("hello"));
		assert_matches!(
			cluster.validate(),
			Err(InvalidClusterError::MissingCertificate)
		);
	}

	#[test]
	fn test_kubeconfig_selects_cluster_context() {
		let cluster = Cluster::new("prod", "https://10.0.0.1:6443").insecure();
		let auth = AuthInfo {
			impersonate: Some("anne".to_string()),
			..Default::default()
		};

		let kubeconfig = cluster.kubeconfig(auth);

		assert_eq!(kubeconfig.current_context.as_deref(), Some("prod"));
		let named = &kubeconfig.clusters[0];
		let spec = named.cluster.as_ref().unwrap();
		assert_eq!(spec.server.as_deref(), Some("https://10.0.0.1:6443"));
		assert_eq!(spec.insecure_skip_tls_verify, Some(true));
		let user = kubeconfig.auth_infos[0].auth_info.as_ref().unwrap();
		assert_eq!(user.impersonate.as_deref(), Some("anne"));
	}
}
