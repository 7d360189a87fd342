//! The notebook model resolver service.

use std::sync::Arc;

use futures::FutureExt;
use tokio::sync::broadcast;
use tracing::debug;

use folio_model::{
	DocumentKey, NotebookKind, NotebookModel, ProviderRegistry, WorkingCopyManager,
};

use crate::cache::MetaConflict;
use crate::keep_alive::{self, ModelCache};
use crate::loader::ModelLoader;
use crate::{Error, Result};

/// Capacity of the service-wide save stream.
///
/// Saves are low-rate; a lagging subscriber loses the oldest notifications
/// by broadcast semantics rather than blocking saves.
const SAVE_STREAM_CAPACITY: usize = 64;

/// Resolves document keys to shared notebook models and manages their
/// lifetime.
///
/// The sole public entry point is [`NotebookModelResolver::resolve`].
/// Concurrent resolves for one key coalesce onto a single load; every caller
/// receives a [`NotebookHandle`] onto the same model instance. Models are
/// destroyed asynchronously after the last handle drops, unless dirty (see
/// [`keep_alive`]).
pub struct NotebookModelResolver {
	cache: ModelCache,
	registry: Arc<dyn ProviderRegistry>,
	loader: Arc<ModelLoader>,
	saves: broadcast::Sender<DocumentKey>,
}

impl NotebookModelResolver {
	/// Creates a resolver over the host's provider registry and working-copy
	/// manager.
	pub fn new(registry: Arc<dyn ProviderRegistry>, working_copies: Arc<dyn WorkingCopyManager>) -> Self {
		let (saves, _) = broadcast::channel(SAVE_STREAM_CAPACITY);
		let loader = Arc::new(ModelLoader::new(
			Arc::clone(&registry),
			working_copies,
			saves.clone(),
		));
		let cache = ModelCache::new(|model: Arc<NotebookModel>| {
			async move { model.dispose().await }.boxed()
		});
		Self {
			cache,
			registry,
			loader,
			saves,
		}
	}

	/// Resolves `key` to a shared notebook model.
	///
	/// Kind resolution order: the kind bound by a live model for this key is
	/// authoritative; otherwise the caller's `kind`; otherwise, after
	/// provider registration has settled, the provider marked exclusive for
	/// this key, falling back to the first registered provider.
	///
	/// # Errors
	///
	/// - [`Error::InvalidKey`] — `key` addresses a cell, not a document.
	/// - [`Error::KindConflict`] — a live model binds a different kind.
	/// - [`Error::NoProviderAvailable`] — no kind could be derived.
	/// - [`Error::ProviderNotFound`] / [`Error::Load`] — construction
	///   failed; every concurrent resolve of this key observes the same
	///   failure.
	pub async fn resolve(&self, key: &DocumentKey, kind: Option<NotebookKind>) -> Result<NotebookHandle> {
		if key.is_cell() {
			return Err(Error::InvalidKey(key.clone()));
		}

		let canonical = key.canonical();
		let effective = match self.cache.meta(canonical) {
			// A live model's binding is authoritative; an explicit different
			// kind is a conflict, surfaced before touching the entry.
			Some(bound) => match kind {
				Some(requested) if requested != bound => {
					return Err(Error::KindConflict {
						key: key.clone(),
						bound,
						requested,
					});
				}
				_ => bound,
			},
			None => match kind {
				Some(kind) => kind,
				None => self.default_kind(key).await?,
			},
		};

		let reference = {
			let loader = Arc::clone(&self.loader);
			let cache = self.cache.clone();
			let factory_key = key.clone();
			let load_kind = effective.clone();
			self.cache
				.acquire(canonical, effective, move || {
					async move {
						let model = loader.load(factory_key, load_kind).await?;
						keep_alive::install(&cache, &model);
						Ok(model)
					}
					.boxed()
				})
				.map_err(|MetaConflict { bound, requested }| Error::KindConflict {
					key: key.clone(),
					bound,
					requested,
				})?
		};

		// Awaited outside the cache lock; dropping `reference` on failure
		// releases the failed entry toward removal.
		let model = reference.resolved().await?;
		debug!(key = %key, kind = %model.kind(), "notebook model resolved");
		Ok(NotebookHandle { model, reference })
	}

	/// Stream of keys whose models were successfully saved.
	///
	/// Fires once per save of any currently-or-formerly resolved model.
	pub fn on_did_save_notebook(&self) -> broadcast::Receiver<DocumentKey> {
		self.saves.subscribe()
	}

	/// Returns the kind currently bound for `key`, while any model for it is
	/// alive.
	pub fn bound_kind(&self, key: &DocumentKey) -> Option<NotebookKind> {
		self.cache.meta(key.canonical())
	}

	/// Number of live models.
	pub fn live_models(&self) -> usize {
		self.cache.len()
	}

	/// Derives the default kind for an unbound key from the provider
	/// registry: the exclusive provider if one exists, else the first
	/// registered one.
	async fn default_kind(&self, key: &DocumentKey) -> Result<NotebookKind> {
		self.registry.registration_ready().await;
		let providers = self.registry.list_providers(key);
		providers
			.iter()
			.find(|p| p.exclusive)
			.or_else(|| providers.first())
			.map(|p| p.kind.clone())
			.ok_or_else(|| Error::NoProviderAvailable(key.clone()))
	}
}

/// A caller's reference to a resolved notebook model.
///
/// Dropping the handle releases the caller's reference; ownership makes a
/// double release unrepresentable. The model itself stays alive while any
/// handle, or the dirty keep-alive, still references it.
pub struct NotebookHandle {
	model: Arc<NotebookModel>,
	// Held for its Drop: releasing it decrements the cache entry.
	#[allow(dead_code)]
	reference: crate::cache::CacheRef<NotebookKind, NotebookModel>,
}

impl NotebookHandle {
	/// The shared model instance.
	pub fn model(&self) -> &Arc<NotebookModel> {
		&self.model
	}
}

impl std::fmt::Debug for NotebookHandle {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("NotebookHandle").finish_non_exhaustive()
	}
}

impl std::ops::Deref for NotebookHandle {
	type Target = NotebookModel;

	fn deref(&self) -> &Self::Target {
		&self.model
	}
}
