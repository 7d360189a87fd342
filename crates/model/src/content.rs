//! Notebook content container with observable teardown.

use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

/// The model's underlying content.
///
/// The resolver core treats content as opaque: cells are carried as
/// serialized payloads and interpreted elsewhere. What the core does depend
/// on is teardown observability: [`ContentContainer::will_dispose`] fires
/// exactly once, before the backing is torn down, so observers can detach
/// while the model is still valid.
pub struct ContentContainer {
	cells: Mutex<Vec<String>>,
	disposed: AtomicBool,
	will_dispose: CancellationToken,
}

impl ContentContainer {
	/// Creates a container holding the given serialized cells.
	pub fn new(cells: Vec<String>) -> Self {
		Self {
			cells: Mutex::new(cells),
			disposed: AtomicBool::new(false),
			will_dispose: CancellationToken::new(),
		}
	}

	/// Returns a snapshot of the serialized cells.
	pub fn cells(&self) -> Vec<String> {
		self.cells.lock().clone()
	}

	/// Replaces the serialized cells.
	pub fn replace_cells(&self, cells: Vec<String>) {
		*self.cells.lock() = cells;
	}

	/// Token cancelled once, immediately before the container is torn down.
	pub fn will_dispose(&self) -> CancellationToken {
		self.will_dispose.child_token()
	}

	/// Returns true once disposal has begun.
	pub fn is_disposed(&self) -> bool {
		self.disposed.load(Ordering::Acquire)
	}

	/// Begins disposal. Returns false if disposal had already begun.
	///
	/// Fires [`ContentContainer::will_dispose`] before clearing content, so
	/// observers see a still-valid container.
	pub(crate) fn dispose(&self) -> bool {
		if self.disposed.swap(true, Ordering::AcqRel) {
			return false;
		}
		self.will_dispose.cancel();
		self.cells.lock().clear();
		true
	}
}
