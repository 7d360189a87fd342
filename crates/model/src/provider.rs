//! Collaborator interfaces consumed by the resolver core.
//!
//! The concrete strategies for loading and persisting notebook bytes live
//! behind these traits; the resolver only decides *which* strategy applies
//! and manages the resulting model's lifetime.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::key::{DocumentKey, NotebookKind};

/// Host-provided controller that owns load and save entirely.
///
/// This is the externally managed path: the resolver wraps the controller in
/// a model, invokes [`ExternalController::load`] during construction, and
/// delegates every save to [`ExternalController::save`].
#[async_trait]
pub trait ExternalController: Send + Sync {
	/// Loads the document's content into the host-side representation.
	async fn load(&self, key: &DocumentKey) -> anyhow::Result<Vec<String>>;

	/// Persists the document.
	async fn save(&self, key: &DocumentKey) -> anyhow::Result<()>;
}

/// A generic file-backed working copy (the locally managed path).
#[derive(Debug)]
pub struct FileWorkingCopy {
	key: DocumentKey,
	bytes: Mutex<Vec<u8>>,
}

impl FileWorkingCopy {
	/// Creates a working copy over the given bytes.
	pub fn new(key: DocumentKey, bytes: Vec<u8>) -> Self {
		Self { key, bytes: Mutex::new(bytes) }
	}

	/// The document this copy backs.
	pub fn key(&self) -> &DocumentKey {
		&self.key
	}

	/// Snapshot of the current bytes.
	pub fn bytes(&self) -> Vec<u8> {
		self.bytes.lock().clone()
	}

	/// Replaces the current bytes.
	pub fn set_bytes(&self, bytes: Vec<u8>) {
		*self.bytes.lock() = bytes;
	}
}

/// Resolves and persists file-backed working copies.
#[async_trait]
pub trait WorkingCopyManager: Send + Sync {
	/// Resolves the working copy for `key`, reading it if necessary.
	async fn resolve(&self, key: &DocumentKey) -> anyhow::Result<FileWorkingCopy>;

	/// Flushes a working copy's bytes to persistent storage.
	async fn flush(&self, copy: &FileWorkingCopy) -> anyhow::Result<()>;
}

/// How a provider loads and saves a notebook for a given `(key, kind)`.
#[derive(Clone)]
pub enum ProviderDescriptor {
	/// A third-party controller owns load/save entirely.
	External(Arc<dyn ExternalController>),
	/// The resolver manages a file-backed working copy itself.
	Local,
}

/// Registration record for one provider of a key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderInfo {
	/// The kind this provider serves.
	pub kind: NotebookKind,
	/// Exclusive providers win default-kind selection over all others.
	pub exclusive: bool,
}

/// Registry of notebook providers, owned by the host.
#[async_trait]
pub trait ProviderRegistry: Send + Sync {
	/// Returns the provider descriptor for `(key, kind)`, if one is
	/// registered.
	fn find_provider(&self, key: &DocumentKey, kind: &NotebookKind) -> Option<ProviderDescriptor>;

	/// Lists providers registered for `key`, in registration order.
	///
	/// Registration order is part of the contract: when no exclusive
	/// provider exists, the first registered provider supplies the default
	/// kind.
	fn list_providers(&self, key: &DocumentKey) -> Vec<ProviderInfo>;

	/// Completes once provider registration has settled.
	///
	/// Awaited unconditionally before a default kind is derived, so early
	/// resolves do not race extension registration.
	async fn registration_ready(&self);
}
