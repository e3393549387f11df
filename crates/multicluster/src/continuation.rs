//! Continue tokens for clustered lists.
//!
//! A clustered list spans many scopes, each paginated by the upstream API
//! server with its own cursor. The caller sees one opaque token that carries
//! the cursor of every scope which still has data. The token is the whole
//! pagination state; nothing is kept between rounds.
//!
//! The empty string means "start a fresh scan". A state with no scopes left
//! encodes to a non-empty token meaning "nothing left to deliver", so the two
//! never collide on the wire.

use std::collections::{btree_map, BTreeMap};

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::scope::Scope;

const TOKEN_VERSION: u32 = 1;

/// Errors decoding a continue token supplied by a caller.
#[derive(Debug, Error)]
pub enum ContinueTokenError {
	#[error("continue token is not valid base64")]
	Encoding(#[source] base64::DecodeError),

	#[error("continue token payload is malformed")]
	Payload(#[source] serde_json::Error),

	#[error("unsupported continue token version {0}")]
	UnsupportedVersion(u32),

	#[error("continue token lists {0} twice")]
	DuplicateScope(Scope),

	#[error("continue token has an empty cursor for {0}")]
	EmptyCursor(Scope),
}

#[derive(Serialize, Deserialize)]
struct TokenPayload {
	v: u32,
	scopes: Vec<TokenEntry>,
}

#[derive(Serialize, Deserialize)]
struct TokenEntry {
	#[serde(flatten)]
	scope: Scope,
	#[serde(rename = "continue")]
	cursor: String,
}

/// Scopes that still have data, each with the upstream cursor to resume from.
///
/// Scopes absent from the state are fully delivered and never revisited.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResumptionState {
	cursors: BTreeMap<Scope, String>,
}

impl ResumptionState {
	/// Compute the state after a round from the cursor each visited scope
	/// returned. Scopes without a further cursor are exhausted and dropped.
	pub fn advance<I>(outcomes: I) -> Self
	where
		I: IntoIterator<Item = (Scope, Option<String>)>,
	{
		outcomes
			.into_iter()
			.filter_map(|(scope, cursor)| cursor.filter(|c| !c.is_empty()).map(|c| (scope, c)))
			.collect()
	}

	pub fn cursor(&self, scope: &Scope) -> Option<&str> {
		self.cursors.get(scope).map(String::as_str)
	}

	pub fn is_empty(&self) -> bool {
		self.cursors.is_empty()
	}

	pub fn len(&self) -> usize {
		self.cursors.len()
	}

	pub fn iter(&self) -> btree_map::Iter<'_, Scope, String> {
		self.cursors.iter()
	}

	/// Serialize into an opaque, URL-safe token. Never empty.
	pub fn encode(&self) -> String {
		let payload = TokenPayload {
			v: TOKEN_VERSION,
			scopes: self
				.cursors
				.iter()
				.map(|(scope, cursor)| TokenEntry {
					scope: scope.clone(),
					cursor: cursor.clone(),
				})
				.collect(),
		};
		let json = serde_json::to_vec(&payload).expect("token payload is always serializable");
		URL_SAFE_NO_PAD.encode(json)
	}

	/// Parse a token produced by [`encode`](Self::encode).
	pub fn decode(token: &str) -> Result<Self, ContinueTokenError> {
		let json = URL_SAFE_NO_PAD
			.decode(token.trim())
			.map_err(ContinueTokenError::Encoding)?;
		let payload: TokenPayload =
			serde_json::from_slice(&json).map_err(ContinueTokenError::Payload)?;

		if payload.v != TOKEN_VERSION {
			return Err(ContinueTokenError::UnsupportedVersion(payload.v));
		}

		let mut cursors = BTreeMap::new();
		for entry in payload.scopes {
			if entry.cursor.is_empty() {
				return Err(ContinueTokenError::EmptyCursor(entry.scope));
			}
			match cursors.entry(entry.scope) {
				btree_map::Entry::Occupied(occupied) => {
					return Err(ContinueTokenError::DuplicateScope(occupied.key().clone()));
				}
				btree_map::Entry::Vacant(vacant) => {
					vacant.insert(entry.cursor);
				}
			}
		}

		Ok(Self { cursors })
	}
}

impl FromIterator<(Scope, String)> for ResumptionState {
	fn from_iter<T: IntoIterator<Item = (Scope, String)>>(iter: T) -> Self {
		Self {
			cursors: iter.into_iter().collect(),
		}
	}
}

/// Where a clustered-list round starts from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Continuation {
	/// No token supplied: visit every scope from the beginning.
	Fresh,
	/// Resume the scopes recorded in a previous round's token.
	Resume(ResumptionState),
}

impl Continuation {
	/// Interpret a caller-supplied token. The empty string is [`Continuation::Fresh`].
	pub fn decode(token: &str) -> Result<Self, ContinueTokenError> {
		if token.is_empty() {
			return Ok(Self::Fresh);
		}
		ResumptionState::decode(token).map(Self::Resume)
	}

	pub fn encode(&self) -> String {
		match self {
			Self::Fresh => String::new(),
			Self::Resume(state) => state.encode(),
		}
	}

	pub fn state(&self) -> Option<&ResumptionState> {
		match self {
			Self::Fresh => None,
			Self::Resume(state) => Some(state),
		}
	}
}
