//! Refcounted, asynchronous notebook model resolution.
//!
//! [`NotebookModelResolver`] maps a [`DocumentKey`] plus an optional
//! [`NotebookKind`] to a shared, lazily constructed [`NotebookModel`].
//! Concurrent resolves for one key coalesce onto a single construction; the
//! model is torn down asynchronously once its last reference drops, unless
//! it is dirty, in which case an internally held reference keeps it alive
//! until it is clean again.
//!
//! Layering, leaves first: [`cache`] (generic keyed refcounted cache),
//! [`loader`] (provider lookup and model construction), [`keep_alive`]
//! (dirty-state extra reference), [`service`] (the public entry point).

use std::sync::Arc;

use thiserror::Error;

pub mod cache;
pub mod keep_alive;
pub mod loader;
pub mod service;

pub use folio_model::{DocumentKey, NotebookKind, NotebookModel};
pub use service::{NotebookHandle, NotebookModelResolver};

/// Resolution and load errors.
///
/// `Clone` is part of the contract: a failed construction is observed
/// through a shared future by every concurrent acquirer of the same key, so
/// each waiter receives its own copy of the one failure.
#[derive(Debug, Clone, Error)]
pub enum Error {
	/// The key addresses a cell inside a notebook, not a whole document.
	#[error("cannot resolve a cell key as a notebook document: {0}")]
	InvalidKey(DocumentKey),
	/// No kind was supplied and no provider is registered for the key.
	#[error("no notebook provider available for {0}")]
	NoProviderAvailable(DocumentKey),
	/// The key is already bound to a different kind by a live model.
	#[error("notebook {key} is bound to kind '{bound}', cannot resolve as '{requested}'")]
	KindConflict {
		/// The contested key.
		key: DocumentKey,
		/// The kind bound by the live model.
		bound: NotebookKind,
		/// The kind this resolve asked for.
		requested: NotebookKind,
	},
	/// Provider lookup during load returned nothing for `(key, kind)`.
	#[error("no provider found for {key} with kind '{kind}'")]
	ProviderNotFound {
		/// The key being loaded.
		key: DocumentKey,
		/// The kind the load was attempted with.
		kind: NotebookKind,
	},
	/// A collaborator failed while constructing the model.
	#[error("loading notebook {key} failed: {source}")]
	Load {
		/// The key being loaded.
		key: DocumentKey,
		/// The underlying collaborator failure.
		#[source]
		source: Arc<anyhow::Error>,
	},
}

impl Error {
	/// Wraps a collaborator failure raised while loading `key`.
	pub fn load(key: DocumentKey, source: anyhow::Error) -> Self {
		Self::Load { key, source: Arc::new(source) }
	}
}

/// Crate-level result alias.
pub type Result<T, E = Error> = std::result::Result<T, E>;
