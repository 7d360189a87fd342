//! Dirty-state keep-alive: an extra cache reference held while a model has
//! unsaved changes.
//!
//! A model with zero external holders is not necessarily safe to free: if it
//! is dirty, tearing it down would lose unsaved work. The keep-alive offsets
//! the refcount with one internally held reference for exactly as long as
//! the model is dirty, so caller releases alone can never destroy a dirty
//! model, and a model that becomes clean with no other holder is destroyed
//! immediately.

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

use folio_model::{NotebookKind, NotebookModel};

use crate::cache::{CacheRef, RefCountedCache};

/// The resolver's cache specialization: kind-tagged notebook models.
pub type ModelCache = RefCountedCache<NotebookKind, NotebookModel>;

/// Extra-reference slot, owned exclusively by the installed listener.
struct Slot {
	key: String,
	slot: Mutex<Option<CacheRef<NotebookKind, NotebookModel>>>,
}

impl Drop for Slot {
	fn drop(&mut self) {
		// The model's disposal clears its subscriber list, dropping the
		// listener closure and with it this slot; a reference still held
		// here is released as part of that one teardown.
		if self.slot.get_mut().take().is_some() {
			debug!(key = %self.key, "keep-alive released with model disposal");
		}
	}
}

/// Installs the dirty keep-alive on a freshly resolved model.
///
/// Called from the cache's construction path, so installation happens
/// exactly once per model regardless of how many resolves share it. The
/// subscription is synchronous: the extra reference is taken or released in
/// the same instant the dirty flag flips, before any interleaved handle
/// release can observe the refcount.
pub fn install(cache: &ModelCache, model: &NotebookModel) {
	let key = model.key().canonical().to_string();
	let state = Arc::new(Slot {
		key,
		slot: Mutex::new(None),
	});
	let cache = cache.clone();

	model.on_did_change_dirty(move |dirty| {
		let mut slot = state.slot.lock();
		if dirty {
			if slot.is_none() {
				// A dirty transition implies a live entry (some holder made
				// the edit); if the entry is already gone the model is mid
				// destruction and must not be resurrected.
				*slot = cache.acquire_existing(&state.key);
				if slot.is_some() {
					debug!(key = %state.key, "keep-alive holding dirty model");
				}
			}
		} else if slot.take().is_some() {
			debug!(key = %state.key, "keep-alive released clean model");
		}
	});
}
