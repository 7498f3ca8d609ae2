// SPDX-License-Identifier: MIT OR Apache-2.0

//! Tests for the labels module.

use super::{ApplyLabels, LABEL_KEY, LabelSet};
use crate::id::ContextId;
use crate::registry::Registry;
use std::future::Future;
use std::pin::pin;
use std::sync::Arc;
use std::task::{Context, Poll, Waker};

#[cfg(target_arch = "wasm32")]
use wasm_bindgen_test::*;

/// Records the label set visible on every poll; finishes on the second poll.
struct Observe {
    yielded: bool,
    seen: Vec<Option<LabelSet>>,
}

impl Future for Observe {
    type Output = Vec<Option<LabelSet>>;

    fn poll(mut self: std::pin::Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let current = LabelSet::current();
        self.seen.push(current);
        if self.yielded {
            Poll::Ready(std::mem::take(&mut self.seen))
        } else {
            self.yielded = true;
            cx.waker().wake_by_ref();
            Poll::Pending
        }
    }
}

struct YieldNow(bool);

impl Future for YieldNow {
    type Output = ();

    fn poll(mut self: std::pin::Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        if self.0 {
            Poll::Ready(())
        } else {
            self.0 = true;
            cx.waker().wake_by_ref();
            Poll::Pending
        }
    }
}

#[cfg_attr(not(target_arch = "wasm32"), test)]
#[cfg_attr(target_arch = "wasm32", wasm_bindgen_test)]
fn with_label_is_a_copy() {
    let a = LabelSet::new().with_label("foo", "bar");
    let b = a.with_label("foo", "baz").with_label("x", "y");
    assert_eq!(a.get("foo"), Some("bar"));
    assert_eq!(a.len(), 1);
    assert_eq!(b.get("foo"), Some("baz"));
    assert_eq!(b.iter().collect::<Vec<_>>(), vec![("foo", "baz"), ("x", "y")]);

    let c = b.without_label("foo");
    assert_eq!(c.get("foo"), None);
    assert_eq!(b.get("foo"), Some("baz"));
    assert!(LabelSet::new().is_empty());
}

#[cfg_attr(not(target_arch = "wasm32"), test)]
#[cfg_attr(target_arch = "wasm32", wasm_bindgen_test)]
fn equality_ignores_lease() {
    let lease = Registry::global().register(Arc::new(1u8));
    let id = lease.id();
    let leased = LabelSet::new().with_lease(lease);
    let forged = LabelSet::new().with_label(LABEL_KEY, id.to_string());
    assert_eq!(leased, forged);
    assert_eq!(format!("{forged:?}"), format!("{{\"{LABEL_KEY}\": \"{id}\"}}"));
}

#[cfg_attr(not(target_arch = "wasm32"), test)]
#[cfg_attr(target_arch = "wasm32", wasm_bindgen_test)]
fn context_id_parsing() {
    assert_eq!(LabelSet::new().context_id(), None);
    let labels = LabelSet::new().with_label(LABEL_KEY, "2a");
    assert_eq!(labels.context_id().map(ContextId::get), Some(42));
    let broken = labels.with_label(LABEL_KEY, "brokenGctxId");
    assert_eq!(broken.context_id(), None);
    let zero = labels.with_label(LABEL_KEY, "0");
    assert_eq!(zero.context_id(), None);
}

#[cfg_attr(not(target_arch = "wasm32"), test)]
#[cfg_attr(target_arch = "wasm32", wasm_bindgen_test)]
fn overwriting_the_key_drops_the_lease() {
    let registry = Registry::global();
    let lease = registry.register(Arc::new("leased"));
    let id = lease.id();
    let leased = LabelSet::new().with_lease(lease).with_label("other", "kept");
    let overwritten = leased.with_label(LABEL_KEY, "ff");
    let removed = leased.without_label(LABEL_KEY);
    drop(leased);
    assert!(registry.lookup(id).is_none());
    assert_eq!(overwritten.get("other"), Some("kept"));
    assert_eq!(removed.get("other"), Some("kept"));
}

#[cfg_attr(not(target_arch = "wasm32"), test)]
#[cfg_attr(target_arch = "wasm32", wasm_bindgen_test)]
fn other_labels_keep_the_lease() {
    let registry = Registry::global();
    let lease = registry.register(Arc::new("leased"));
    let id = lease.id();
    let leased = LabelSet::new().with_lease(lease);
    let extended = leased.with_label("foo", "bar");
    drop(leased);
    assert!(registry.lookup(id).is_some());
    drop(extended);
    assert!(registry.lookup(id).is_none());
}

#[cfg_attr(not(target_arch = "wasm32"), test)]
#[cfg_attr(target_arch = "wasm32", wasm_bindgen_test)]
fn thread_current_is_replaced_wholesale() {
    LabelSet::new().with_label("a", "1").set_current();
    let prior = LabelSet::replace_current(Some(LabelSet::new().with_label("b", "2")));
    assert_eq!(prior.unwrap().get("a"), Some("1"));
    let current = LabelSet::current().unwrap();
    assert_eq!(current.get("a"), None);
    assert_eq!(current.get("b"), Some("2"));
    LabelSet::clear_current();
    assert_eq!(LabelSet::current(), None);
}

#[test]
fn threads_do_not_share_labels() {
    LabelSet::new().with_label("owner", "main").set_current();
    let seen = std::thread::spawn(LabelSet::current).join().unwrap();
    assert_eq!(seen, None);
    assert_eq!(LabelSet::current().unwrap().get("owner"), Some("main"));
    LabelSet::clear_current();
}

#[test]
fn thread_exit_releases_leased_labels() {
    let id = std::thread::spawn(|| {
        let labels = crate::run_with_context("x", || LabelSet::current().unwrap());
        let id = labels.context_id().unwrap();
        // the set now holds the only lease, and the thread exits holding it
        labels.set_current();
        id
    })
    .join()
    .unwrap();
    assert!(Registry::global().lookup(id).is_none());
}

#[test]
fn thread_exit_is_only_flagged_during_teardown() {
    assert!(!super::thread_exiting());
    let seen = std::thread::spawn(super::thread_exiting).join().unwrap();
    assert!(!seen);
}

#[cfg_attr(not(target_arch = "wasm32"), test)]
#[cfg_attr(target_arch = "wasm32", wasm_bindgen_test)]
fn apply_labels_installs_around_each_poll() {
    LabelSet::clear_current();
    let labels = LabelSet::new().with_label("task", "child");
    let mut fut = pin!(ApplyLabels::new(
        Some(labels.clone()),
        Observe {
            yielded: false,
            seen: Vec::new(),
        }
    ));
    let mut cx = Context::from_waker(Waker::noop());

    assert!(fut.as_mut().poll(&mut cx).is_pending());
    assert_eq!(LabelSet::current(), None);
    assert_eq!(fut.labels(), Some(&labels));

    let Poll::Ready(seen) = fut.as_mut().poll(&mut cx) else {
        panic!("expected the future to finish");
    };
    assert_eq!(seen, vec![Some(labels.clone()), Some(labels)]);
    assert_eq!(LabelSet::current(), None);
    assert_eq!(fut.labels(), None);
}

#[cfg_attr(not(target_arch = "wasm32"), test)]
#[cfg_attr(target_arch = "wasm32", wasm_bindgen_test)]
fn apply_labels_keeps_changes_made_by_the_future() {
    let outer = LabelSet::new().with_label("thread", "outer");
    outer.clone().set_current();
    let mut fut = pin!(ApplyLabels::new(None, async {
        LabelSet::new().with_label("set", "inside").set_current();
        YieldNow(false).await;
        LabelSet::current()
    }));
    let mut cx = Context::from_waker(Waker::noop());

    assert!(fut.as_mut().poll(&mut cx).is_pending());
    assert_eq!(LabelSet::current(), Some(outer.clone()));
    assert_eq!(fut.labels().and_then(|l| l.get("set")), Some("inside"));

    let Poll::Ready(seen) = fut.as_mut().poll(&mut cx) else {
        panic!("expected the future to finish");
    };
    assert_eq!(seen, Some(LabelSet::new().with_label("set", "inside")));
    assert_eq!(LabelSet::current(), Some(outer));
    LabelSet::clear_current();
}

async fn fail() -> u8 {
    panic!("inner future failed")
}

#[test]
fn apply_labels_restores_after_panic() {
    LabelSet::new().with_label("thread", "outer").set_current();
    let result = std::panic::catch_unwind(|| {
        let fut = ApplyLabels::new(Some(LabelSet::new().with_label("task", "panics")), fail());
        test_executors::spin_on(fut)
    });
    assert!(result.is_err());
    assert_eq!(LabelSet::current().unwrap().get("thread"), Some("outer"));
    LabelSet::clear_current();
}
