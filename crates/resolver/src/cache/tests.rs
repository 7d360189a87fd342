//! Tests for the keyed refcounted cache.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use futures::FutureExt;
use tokio::sync::{Notify, mpsc};

use super::*;
use crate::{DocumentKey, Error};

/// Cache over `usize` values whose destructor reports every destroyed value.
fn cache_with_drops() -> (RefCountedCache<&'static str, usize>, mpsc::UnboundedReceiver<usize>) {
	let (tx, rx) = mpsc::unbounded_channel();
	let cache = RefCountedCache::new(move |value: Arc<usize>| {
		let tx = tx.clone();
		async move {
			tx.send(*value)?;
			Ok(())
		}
		.boxed()
	});
	(cache, rx)
}

fn counting_factory(calls: Arc<AtomicUsize>) -> impl FnOnce() -> futures::future::BoxFuture<'static, crate::Result<Arc<usize>>> {
	move || {
		let n = calls.fetch_add(1, Ordering::SeqCst);
		async move { Ok(Arc::new(n)) }.boxed()
	}
}

#[tokio::test]
async fn concurrent_acquires_share_one_construction() {
	let (cache, _rx) = cache_with_drops();
	let calls = Arc::new(AtomicUsize::new(0));

	let first = cache.acquire("k", "kind", counting_factory(Arc::clone(&calls))).unwrap();
	let second = cache
		.acquire("k", "kind", || panic!("joining a live entry must not construct"))
		.unwrap();

	let a = first.resolved().await.unwrap();
	let b = second.resolved().await.unwrap();
	assert!(Arc::ptr_eq(&a, &b), "both references must observe the same value");
	assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn meta_conflict_is_atomic_with_join() {
	let (cache, _rx) = cache_with_drops();
	let calls = Arc::new(AtomicUsize::new(0));

	let _held = cache.acquire("k", "jupyter", counting_factory(Arc::clone(&calls))).unwrap();
	let err = cache
		.acquire("k", "dotnet", || panic!("conflicting acquire must not construct"))
		.unwrap_err();

	assert_eq!(
		err,
		MetaConflict {
			bound: "jupyter",
			requested: "dotnet",
		}
	);
}

#[tokio::test]
async fn refs_drop_to_zero_destroys_exactly_once() {
	let (cache, mut drops) = cache_with_drops();
	let calls = Arc::new(AtomicUsize::new(0));

	let refs: Vec<_> = (0..3)
		.map(|i| {
			if i == 0 {
				cache.acquire("k", "kind", counting_factory(Arc::clone(&calls))).unwrap()
			} else {
				cache.acquire_existing("k").expect("entry is live")
			}
		})
		.collect();
	let value = refs[0].resolved().await.unwrap();
	assert_eq!(*value, 0);

	for r in refs {
		drop(r);
	}

	assert_eq!(drops.recv().await, Some(0), "destructor runs after the last release");
	assert!(!cache.contains("k"));
	tokio::task::yield_now().await;
	assert!(drops.try_recv().is_err(), "destructor must run exactly once");
}

#[tokio::test]
async fn acquire_after_zero_starts_a_fresh_construction() {
	let (cache, mut drops) = cache_with_drops();
	let calls = Arc::new(AtomicUsize::new(0));

	let first = cache.acquire("k", "kind", counting_factory(Arc::clone(&calls))).unwrap();
	let _ = first.resolved().await.unwrap();
	drop(first);
	assert_eq!(drops.recv().await, Some(0));

	let second = cache.acquire("k", "kind", counting_factory(Arc::clone(&calls))).unwrap();
	let value = second.resolved().await.unwrap();
	assert_eq!(*value, 1, "fresh generation reruns the factory");
	assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn release_while_load_pending_still_destroys() {
	let (cache, mut drops) = cache_with_drops();
	let gate = Arc::new(Notify::new());

	let reference = {
		let gate = Arc::clone(&gate);
		cache
			.acquire("k", "kind", move || {
				async move {
					gate.notified().await;
					Ok(Arc::new(7))
				}
				.boxed()
			})
			.unwrap()
	};

	// The entry disappears synchronously with the last release, even though
	// its construction has not finished.
	drop(reference);
	assert!(!cache.contains("k"));

	gate.notify_one();
	assert_eq!(drops.recv().await, Some(7), "pending loads are awaited and then destroyed");
}

#[tokio::test]
async fn failed_construction_propagates_to_every_waiter() {
	let (cache, mut drops) = cache_with_drops();
	let key = DocumentKey::parse("file:///nb.ipynb").unwrap();

	let first = {
		let key = key.clone();
		cache
			.acquire("k", "kind", move || {
				async move { Err(Error::load(key, anyhow::anyhow!("backend unreachable"))) }.boxed()
			})
			.unwrap()
	};
	let second = cache.acquire_existing("k").expect("entry is live");

	assert!(matches!(first.resolved().await, Err(Error::Load { .. })));
	assert!(matches!(second.resolved().await, Err(Error::Load { .. })));

	drop(first);
	drop(second);
	for _ in 0..8 {
		tokio::task::yield_now().await;
	}
	assert!(drops.try_recv().is_err(), "a failed construction leaves nothing to destroy");
	assert!(!cache.contains("k"), "the failed entry is removed once released");
}

#[tokio::test]
async fn acquire_existing_never_constructs() {
	let (cache, mut drops) = cache_with_drops();
	assert!(cache.acquire_existing("missing").is_none());

	let calls = Arc::new(AtomicUsize::new(0));
	let first = cache.acquire("k", "kind", counting_factory(Arc::clone(&calls))).unwrap();
	let extra = cache.acquire_existing("k").expect("entry is live");
	let _ = first.resolved().await.unwrap();

	drop(first);
	assert!(cache.contains("k"), "the extra reference keeps the entry alive");

	drop(extra);
	assert_eq!(drops.recv().await, Some(0));
	assert!(cache.acquire_existing("k").is_none(), "a dying entry cannot be rejoined");
}

#[tokio::test]
async fn destructor_failure_is_swallowed() {
	let (tx, mut rx) = mpsc::unbounded_channel();
	let cache: RefCountedCache<&'static str, usize> = RefCountedCache::new(move |value: Arc<usize>| {
		let tx = tx.clone();
		async move {
			let _ = tx.send(*value);
			anyhow::bail!("teardown rejected")
		}
		.boxed()
	});

	let reference = cache
		.acquire("k", "kind", || async move { Ok(Arc::new(3)) }.boxed())
		.unwrap();
	let _ = reference.resolved().await.unwrap();
	drop(reference);

	assert_eq!(rx.recv().await, Some(3), "destructor ran despite failing");

	// The cache stays usable after a failed teardown.
	let calls = Arc::new(AtomicUsize::new(0));
	let again = cache.acquire("k", "kind", counting_factory(Arc::clone(&calls))).unwrap();
	assert_eq!(*again.resolved().await.unwrap(), 0);
}
