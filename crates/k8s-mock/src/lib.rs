//! Mock Kubernetes API server for testing.
//!
//! Serves discovery and an in-memory object store over HTTP, with list
//! pagination, equality-based selectors and per-namespace authorization
//! failures. Received requests are recorded for inspection.

pub mod discovery;
mod helpers;
pub mod http;
pub mod selectors;
pub mod store;

pub use discovery::{DiscoveryMode, MockApiResource, MockDiscovery};
pub use http::{HttpMockK8sServer, RecordedRequest, RunningHttpMockK8sServer};
