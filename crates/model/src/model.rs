//! The resolved notebook model and its lifecycle surface.

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

use crate::content::ContentContainer;
use crate::key::{DocumentKey, NotebookKind};
use crate::listeners::Listeners;
use crate::provider::{ExternalController, FileWorkingCopy, WorkingCopyManager};

/// The two mutually exclusive load/save strategies backing a model.
enum ModelBacking {
	/// A host-provided controller owns load and save entirely.
	External { controller: Arc<dyn ExternalController> },
	/// A generic file-backed working copy, flushed through its manager.
	Local {
		copy: FileWorkingCopy,
		manager: Arc<dyn WorkingCopyManager>,
	},
}

/// A resolved, shared, disposable notebook document model.
///
/// Exactly one instance exists per key while any reference to it is alive;
/// all holders of the same key share this object through `Arc`. The model is
/// destroyed exactly once, by the cache entry that owns it, never by
/// individual holders.
pub struct NotebookModel {
	key: DocumentKey,
	kind: NotebookKind,
	content: ContentContainer,
	backing: ModelBacking,
	/// Dirty flag; the guard is held across listener emission so dirty
	/// transitions are totally ordered with their notifications.
	dirty: Mutex<bool>,
	dirty_listeners: Listeners<bool>,
	save_listeners: Listeners<DocumentKey>,
}

impl NotebookModel {
	/// Creates an externally managed model. Content arrives when
	/// [`NotebookModel::load`] resolves through the controller.
	pub fn external(key: DocumentKey, kind: NotebookKind, controller: Arc<dyn ExternalController>) -> Self {
		Self {
			key,
			kind,
			content: ContentContainer::new(Vec::new()),
			backing: ModelBacking::External { controller },
			dirty: Mutex::new(false),
			dirty_listeners: Listeners::new(),
			save_listeners: Listeners::new(),
		}
	}

	/// Creates a locally managed model over an already-resolved working copy.
	pub fn local(key: DocumentKey, kind: NotebookKind, copy: FileWorkingCopy, manager: Arc<dyn WorkingCopyManager>) -> Self {
		let payload = String::from_utf8_lossy(&copy.bytes()).into_owned();
		Self {
			key,
			kind,
			content: ContentContainer::new(vec![payload]),
			backing: ModelBacking::Local { copy, manager },
			dirty: Mutex::new(false),
			dirty_listeners: Listeners::new(),
			save_listeners: Listeners::new(),
		}
	}

	/// The document this model represents.
	pub fn key(&self) -> &DocumentKey {
		&self.key
	}

	/// The kind this model was resolved with.
	pub fn kind(&self) -> &NotebookKind {
		&self.kind
	}

	/// The underlying content container.
	pub fn content(&self) -> &ContentContainer {
		&self.content
	}

	/// Resolves the model's content.
	///
	/// For the externally managed backing this invokes the controller's load
	/// and awaits the fully resolved result; locally managed models arrive
	/// with their working copy already resolved.
	pub async fn load(&self) -> anyhow::Result<()> {
		match &self.backing {
			ModelBacking::External { controller } => {
				let cells = controller.load(&self.key).await?;
				self.content.replace_cells(cells);
			}
			ModelBacking::Local { .. } => {}
		}
		Ok(())
	}

	/// Returns true while the model holds unsaved changes.
	pub fn is_dirty(&self) -> bool {
		*self.dirty.lock()
	}

	/// Flips the dirty flag, notifying subscribers on actual transitions.
	///
	/// Notification is synchronous: by the time this returns, every dirty
	/// subscriber (including the resolver's keep-alive) has observed the
	/// transition.
	pub fn set_dirty(&self, dirty: bool) {
		let mut guard = self.dirty.lock();
		if *guard == dirty {
			return;
		}
		*guard = dirty;
		self.dirty_listeners.emit(&dirty);
	}

	/// Subscribes to dirty-state transitions.
	pub fn on_did_change_dirty(&self, f: impl Fn(bool) + Send + Sync + 'static) {
		self.dirty_listeners.subscribe(move |dirty| f(*dirty));
	}

	/// Subscribes to successful saves of this model.
	pub fn on_did_save(&self, f: impl Fn(&DocumentKey) + Send + Sync + 'static) {
		self.save_listeners.subscribe(f);
	}

	/// Persists the model through its backing, clears the dirty flag, then
	/// announces the save.
	///
	/// A failed save leaves the dirty flag untouched and emits nothing.
	pub async fn save(&self) -> anyhow::Result<()> {
		match &self.backing {
			ModelBacking::External { controller } => controller.save(&self.key).await?,
			ModelBacking::Local { copy, manager } => manager.flush(copy).await?,
		}
		// Clearing dirty first lets the keep-alive release its reference
		// before the save event fans out; the model itself stays valid until
		// the cache's background destructor runs.
		self.set_dirty(false);
		self.save_listeners.emit(&self.key);
		debug!(key = %self.key, "notebook model saved");
		Ok(())
	}

	/// Tears the model down, exactly once.
	///
	/// Fires the content container's will-dispose token, then clears every
	/// subscriber list (releasing subscriber-owned state such as the
	/// keep-alive's extra reference) before the backing is dropped. Repeat
	/// calls are no-ops.
	pub async fn dispose(&self) -> anyhow::Result<()> {
		if !self.content.dispose() {
			return Ok(());
		}
		self.dirty_listeners.clear();
		self.save_listeners.clear();
		debug!(key = %self.key, kind = %self.kind, "notebook model disposed");
		Ok(())
	}

	/// Returns true once disposal has begun.
	pub fn is_disposed(&self) -> bool {
		self.content.is_disposed()
	}
}
