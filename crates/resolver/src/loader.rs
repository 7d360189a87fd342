//! Provider lookup and notebook model construction.

use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::debug;

use folio_model::{
	DocumentKey, NotebookKind, NotebookModel, ProviderDescriptor, ProviderRegistry,
	WorkingCopyManager,
};

use crate::{Error, Result};

/// Builds resolved notebook models for `(key, kind)` pairs.
///
/// The loader decides nothing about lifetime; it is invoked by the cache's
/// construction path exactly once per key generation.
pub struct ModelLoader {
	registry: Arc<dyn ProviderRegistry>,
	working_copies: Arc<dyn WorkingCopyManager>,
	saves: broadcast::Sender<DocumentKey>,
}

impl ModelLoader {
	/// Creates a loader publishing save notifications onto `saves`.
	pub fn new(
		registry: Arc<dyn ProviderRegistry>,
		working_copies: Arc<dyn WorkingCopyManager>,
		saves: broadcast::Sender<DocumentKey>,
	) -> Self {
		Self {
			registry,
			working_copies,
			saves,
		}
	}

	/// Loads the model for `(key, kind)` through whichever provider serves
	/// it.
	///
	/// Externally managed providers hand over a controller that owns
	/// load/save entirely; the loader wraps it and awaits the controller's
	/// load. Locally managed providers go through the working-copy manager.
	/// Either way the resolved model gets a save relay that republishes the
	/// model's key on the service-wide save stream; the relay lives in the
	/// model's subscriber list and is torn down by the model's own disposal.
	pub async fn load(&self, key: DocumentKey, kind: NotebookKind) -> Result<Arc<NotebookModel>> {
		let descriptor = self
			.registry
			.find_provider(&key, &kind)
			.ok_or_else(|| Error::ProviderNotFound {
				key: key.clone(),
				kind: kind.clone(),
			})?;

		let model = match descriptor {
			ProviderDescriptor::External(controller) => {
				let model = NotebookModel::external(key.clone(), kind.clone(), controller);
				model.load().await.map_err(|err| Error::load(key.clone(), err))?;
				Arc::new(model)
			}
			ProviderDescriptor::Local => {
				let copy = self
					.working_copies
					.resolve(&key)
					.await
					.map_err(|err| Error::load(key.clone(), err))?;
				Arc::new(NotebookModel::local(
					key.clone(),
					kind.clone(),
					copy,
					Arc::clone(&self.working_copies),
				))
			}
		};

		let saves = self.saves.clone();
		model.on_did_save(move |saved| {
			// No receiver subscribed is not an error; the stream is lossy by
			// broadcast semantics.
			let _ = saves.send(saved.clone());
		});

		debug!(key = %key, kind = %kind, "notebook model loaded");
		Ok(model)
	}
}
