//! Synchronous subscriber lists for model lifecycle notifications.

use parking_lot::Mutex;

/// A synchronous subscriber list.
///
/// Emission runs every subscriber inline on the emitting thread. That is
/// load-bearing for the dirty keep-alive: the extra cache reference must be
/// taken or released in the same instant the dirty flag flips, before any
/// interleaved handle release can observe a zero refcount.
///
/// Subscribers are removed only in bulk, by [`Listeners::clear`], which the
/// model invokes during disposal. Clearing drops the subscriber closures, so
/// any state they own (such as the keep-alive's reference slot) is released
/// as part of that one teardown.
pub struct Listeners<T> {
	inner: Mutex<Vec<Box<dyn Fn(&T) + Send + Sync>>>,
}

impl<T> Listeners<T> {
	/// Creates an empty subscriber list.
	pub fn new() -> Self {
		Self { inner: Mutex::new(Vec::new()) }
	}

	/// Adds a subscriber.
	pub fn subscribe(&self, f: impl Fn(&T) + Send + Sync + 'static) {
		self.inner.lock().push(Box::new(f));
	}

	/// Invokes every subscriber with `value`, in subscription order.
	pub fn emit(&self, value: &T) {
		let guard = self.inner.lock();
		for f in guard.iter() {
			f(value);
		}
	}

	/// Removes and drops every subscriber.
	pub fn clear(&self) {
		// Drop the closures outside the lock so a subscriber that releases
		// resources on drop cannot deadlock against a concurrent emit.
		let drained = std::mem::take(&mut *self.inner.lock());
		drop(drained);
	}

	/// Returns the current subscriber count.
	pub fn len(&self) -> usize {
		self.inner.lock().len()
	}

	/// Returns true when no subscriber is registered.
	pub fn is_empty(&self) -> bool {
		self.inner.lock().is_empty()
	}
}

impl<T> Default for Listeners<T> {
	fn default() -> Self {
		Self::new()
	}
}

#[cfg(test)]
mod tests {
	use std::sync::Arc;
	use std::sync::atomic::{AtomicUsize, Ordering};

	use super::*;

	#[test]
	fn emit_runs_subscribers_in_order() {
		let listeners = Listeners::new();
		let seen = Arc::new(Mutex::new(Vec::new()));

		for tag in ["first", "second"] {
			let seen = Arc::clone(&seen);
			listeners.subscribe(move |v: &u32| seen.lock().push((tag, *v)));
		}

		listeners.emit(&7);
		assert_eq!(*seen.lock(), vec![("first", 7), ("second", 7)]);
	}

	#[test]
	fn clear_drops_subscriber_state() {
		let listeners: Listeners<()> = Listeners::new();
		let alive = Arc::new(AtomicUsize::new(1));

		struct Canary(Arc<AtomicUsize>);
		impl Drop for Canary {
			fn drop(&mut self) {
				self.0.store(0, Ordering::SeqCst);
			}
		}

		let canary = Canary(Arc::clone(&alive));
		listeners.subscribe(move |_| {
			let _ = &canary;
		});

		assert_eq!(alive.load(Ordering::SeqCst), 1);
		listeners.clear();
		assert_eq!(alive.load(Ordering::SeqCst), 0);
		assert!(listeners.is_empty());
	}
}
