//! Generic keyed refcounted cache with coalesced asynchronous construction.
//!
//! Maps a canonical string key to a lazily created, shared, asynchronously
//! produced value. For any key at most one construction is ever in flight;
//! every concurrent [`RefCountedCache::acquire`] joining a live entry
//! receives a reference to the same eventual value. The last reference to
//! drop removes the entry synchronously and runs the destructor in the
//! background, so releasing never blocks the caller and a new acquire for
//! the same key can never join a dying entry.

use std::collections::HashMap;
use std::sync::Arc;

use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use parking_lot::Mutex;
use tracing::{debug, error};

use crate::Result;

/// The shared construction future of one cache entry.
///
/// Cloned by every reference to the entry; the underlying load is polled at
/// most once to completion regardless of how many clones await it.
pub type SharedLoad<V> = Shared<BoxFuture<'static, Result<Arc<V>>>>;

/// Asynchronous destructor invoked once per entry, after the last release.
pub type Destructor<V> = Arc<dyn Fn(Arc<V>) -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync>;

/// Requested entry metadata disagrees with the live entry's binding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetaConflict<M> {
	/// Metadata bound by the live entry.
	pub bound: M,
	/// Metadata this acquire asked for.
	pub requested: M,
}

struct Entry<M, V> {
	meta: M,
	refs: usize,
	/// Distinguishes this entry from earlier and later entries for the same
	/// key, so a stale reference can never decrement a successor.
	generation: u64,
	load: SharedLoad<V>,
}

struct State<M, V> {
	entries: HashMap<String, Entry<M, V>>,
	next_generation: u64,
}

/// Keyed refcounted cache of shared, asynchronously constructed values.
///
/// All entry mutation (refcounts, insertion, removal) happens under one
/// mutex and never across an await; awaiting happens on the cloned
/// [`SharedLoad`] outside the lock. Destruction runs on a spawned task, so
/// the cache must be used from within a tokio runtime.
pub struct RefCountedCache<M, V> {
	state: Arc<Mutex<State<M, V>>>,
	destructor: Destructor<V>,
}

impl<M, V> Clone for RefCountedCache<M, V> {
	fn clone(&self) -> Self {
		Self {
			state: Arc::clone(&self.state),
			destructor: Arc::clone(&self.destructor),
		}
	}
}

impl<M, V> RefCountedCache<M, V>
where
	M: Clone + PartialEq + Send + 'static,
	V: Send + Sync + 'static,
{
	/// Creates an empty cache with the given entry destructor.
	///
	/// Destructor failures are logged at error severity and swallowed; by
	/// the time destruction runs, no caller is positioned to react.
	pub fn new(destructor: impl Fn(Arc<V>) -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync + 'static) -> Self {
		Self {
			state: Arc::new(Mutex::new(State {
				entries: HashMap::new(),
				next_generation: 0,
			})),
			destructor: Arc::new(destructor),
		}
	}

	/// Acquires a reference to the entry for `key`, creating it if absent.
	///
	/// On creation the factory is invoked exactly once, under the cache
	/// lock, to produce the construction future; the factory must only
	/// assemble the future, the load itself runs when the future is first
	/// polled. The refcount is incremented before this returns, so a caller
	/// still awaiting the load already holds a reference and cannot race a
	/// concurrent release to zero.
	///
	/// Joining a live entry whose metadata differs from `meta` fails with
	/// [`MetaConflict`]; the check is atomic with the join.
	pub fn acquire<F>(&self, key: &str, meta: M, factory: F) -> std::result::Result<CacheRef<M, V>, MetaConflict<M>>
	where
		F: FnOnce() -> BoxFuture<'static, Result<Arc<V>>>,
	{
		let mut state = self.state.lock();

		if let Some(entry) = state.entries.get_mut(key) {
			if entry.meta != meta {
				return Err(MetaConflict {
					bound: entry.meta.clone(),
					requested: meta,
				});
			}
			entry.refs += 1;
			return Ok(self.make_ref(key, entry.generation, entry.load.clone()));
		}

		let generation = state.next_generation;
		state.next_generation += 1;
		let load: SharedLoad<V> = factory().shared();
		state.entries.insert(
			key.to_string(),
			Entry {
				meta,
				refs: 1,
				generation,
				load: load.clone(),
			},
		);
		debug!(key, generation, "cache entry created");
		Ok(self.make_ref(key, generation, load))
	}

	/// Acquires a reference to the live entry for `key`, never constructing
	/// one.
	///
	/// Returns `None` when no entry exists, including the window after a
	/// refcount reached zero: the old entry is already gone by then and must
	/// not be resurrected from here.
	pub fn acquire_existing(&self, key: &str) -> Option<CacheRef<M, V>> {
		let mut state = self.state.lock();
		let entry = state.entries.get_mut(key)?;
		entry.refs += 1;
		Some(self.make_ref(key, entry.generation, entry.load.clone()))
	}

	/// Returns the metadata bound by the live entry for `key`, if any.
	pub fn meta(&self, key: &str) -> Option<M> {
		self.state.lock().entries.get(key).map(|e| e.meta.clone())
	}

	/// Returns true while a live entry exists for `key`.
	pub fn contains(&self, key: &str) -> bool {
		self.state.lock().entries.contains_key(key)
	}

	/// Number of live entries.
	pub fn len(&self) -> usize {
		self.state.lock().entries.len()
	}

	/// Returns true when no entry is live.
	pub fn is_empty(&self) -> bool {
		self.state.lock().entries.is_empty()
	}

	fn make_ref(&self, key: &str, generation: u64, load: SharedLoad<V>) -> CacheRef<M, V> {
		CacheRef {
			cache: self.clone(),
			key: key.to_string(),
			generation,
			load,
		}
	}

	/// Releases one reference taken against `generation` of `key`.
	///
	/// The release that reaches zero removes the entry synchronously, then
	/// destroys the value on a background task: the (possibly still
	/// pending) load is awaited to completion and the destructor runs on
	/// its value. A failed load leaves nothing to destroy.
	fn release(&self, key: &str, generation: u64) {
		let load = {
			let mut state = self.state.lock();
			let Some(entry) = state.entries.get_mut(key) else {
				return;
			};
			if entry.generation != generation {
				return;
			}
			entry.refs -= 1;
			if entry.refs > 0 {
				return;
			}
			let Some(entry) = state.entries.remove(key) else {
				return;
			};
			entry.load
		};

		debug!(key, generation, "cache entry released, destroying");
		let destructor = Arc::clone(&self.destructor);
		let key = key.to_string();
		tokio::spawn(async move {
			let value = match load.await {
				Ok(value) => value,
				// Construction failed; every acquirer saw the error and
				// there is no value to tear down.
				Err(_) => return,
			};
			match (destructor)(value).await {
				Ok(()) => debug!(key = %key, generation, "cache entry destroyed"),
				Err(err) => {
					error!(key = %key, generation, error = %err, "cache entry destructor failed");
				}
			}
		});
	}
}

/// A counted reference to one cache entry.
///
/// Dropping the reference releases it; ownership makes a double release
/// unrepresentable. References are deliberately not `Clone`: every holder
/// must go through the cache so the refcount stays authoritative.
pub struct CacheRef<M, V>
where
	M: Clone + PartialEq + Send + 'static,
	V: Send + Sync + 'static,
{
	cache: RefCountedCache<M, V>,
	key: String,
	generation: u64,
	load: SharedLoad<V>,
}

impl<M, V> std::fmt::Debug for CacheRef<M, V>
where
	M: Clone + PartialEq + Send + 'static,
	V: Send + Sync + 'static,
{
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("CacheRef")
			.field("key", &self.key)
			.field("generation", &self.generation)
			.finish_non_exhaustive()
	}
}

impl<M, V> CacheRef<M, V>
where
	M: Clone + PartialEq + Send + 'static,
	V: Send + Sync + 'static,
{
	/// The canonical key this reference counts against.
	pub fn key(&self) -> &str {
		&self.key
	}

	/// Awaits the entry's shared construction.
	///
	/// Every reference to the same entry observes the same value, or the
	/// same failure.
	pub fn resolved(&self) -> impl Future<Output = Result<Arc<V>>> + Send + 'static {
		self.load.clone()
	}
}

impl<M, V> Drop for CacheRef<M, V>
where
	M: Clone + PartialEq + Send + 'static,
	V: Send + Sync + 'static,
{
	fn drop(&mut self) {
		self.cache.release(&self.key, self.generation);
	}
}

#[cfg(test)]
mod tests;
