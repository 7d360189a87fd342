//! Canonical notebook identity types.

use std::fmt;

use url::Url;

/// URL scheme addressing a single cell inside a notebook document.
///
/// Cell URLs identify a fragment of a notebook, never a whole document, and
/// are rejected by the resolver before any provider lookup.
pub const CELL_SCHEME: &str = "notebook-cell";

/// Canonical identifier for a whole notebook document.
///
/// Two keys with equal canonical forms refer to the same document; the
/// resolver uses the canonical form for cache identity, so equal keys must
/// observe the same model instance while any reference to it is alive.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DocumentKey {
	url: Url,
}

impl DocumentKey {
	/// Wraps an already-parsed URL.
	pub fn new(url: Url) -> Self {
		Self { url }
	}

	/// Parses a key from its string form.
	pub fn parse(input: &str) -> Result<Self, url::ParseError> {
		Ok(Self { url: Url::parse(input)? })
	}

	/// Returns the canonical string form used for cache identity.
	pub fn canonical(&self) -> &str {
		self.url.as_str()
	}

	/// Returns the underlying URL.
	pub fn url(&self) -> &Url {
		&self.url
	}

	/// Returns true when this key addresses a cell fragment rather than a
	/// whole notebook document.
	pub fn is_cell(&self) -> bool {
		self.url.scheme() == CELL_SCHEME
	}
}

impl fmt::Display for DocumentKey {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.canonical())
	}
}

/// Tag selecting the loading strategy and content interpretation for a key.
///
/// A key has at most one kind bound at any time; the binding sticks once a
/// resolve has established it, for as long as any model for that key exists.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NotebookKind(String);

impl NotebookKind {
	/// Creates a kind from its identifier.
	pub fn new(id: impl Into<String>) -> Self {
		Self(id.into())
	}

	/// Returns the kind identifier.
	pub fn as_str(&self) -> &str {
		&self.0
	}
}

impl fmt::Display for NotebookKind {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.0)
	}
}

impl From<&str> for NotebookKind {
	fn from(id: &str) -> Self {
		Self(id.to_string())
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn cell_scheme_is_detected() {
		let key = DocumentKey::parse("notebook-cell://a/nb.ipynb#cell0").unwrap();
		assert!(key.is_cell());

		let key = DocumentKey::parse("file:///work/nb.ipynb").unwrap();
		assert!(!key.is_cell());
	}

	#[test]
	fn canonical_form_drives_equality() {
		let a = DocumentKey::parse("file:///work/nb.ipynb").unwrap();
		let b = DocumentKey::parse("file:///work/nb.ipynb").unwrap();
		assert_eq!(a, b);
		assert_eq!(a.canonical(), b.canonical());
	}
}
