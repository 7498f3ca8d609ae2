// SPDX-License-Identifier: MIT OR Apache-2.0

//! Children spawned inside a scope carry its context; children spawned later don't.

use std::sync::mpsc;
use taskctx::{ContextId, Registry, current_context, run_with_context, spawn};

#[test]
fn child_keeps_context_after_scope_returns() {
    let (go, wait) = mpsc::channel::<()>();
    let (child, id) = run_with_context("x", || {
        assert_eq!(*current_context::<&str>().unwrap(), "x");
        let child = spawn(move || {
            wait.recv().unwrap();
            current_context::<&str>().map(|s| *s)
        });
        (child, ContextId::current().unwrap())
    });

    // the scope is over on this thread
    assert!(current_context::<&str>().is_none());
    // but the child still holds a copy of its labels
    assert!(Registry::global().lookup(id).is_some());

    go.send(()).unwrap();
    assert_eq!(child.join().unwrap(), Some("x"));
    assert!(Registry::global().lookup(id).is_none());
}

#[test]
fn grandchildren_inherit_too() {
    let seen = run_with_context(11u32, || {
        spawn(|| spawn(|| current_context::<u32>().map(|v| *v)).join().unwrap())
    })
    .join()
    .unwrap();
    assert_eq!(seen, Some(11));
}

#[test]
fn later_siblings_do_not_see_a_finished_scope() {
    run_with_context("earlier", || ());
    let seen = spawn(|| current_context::<&str>().is_some()).join().unwrap();
    assert!(!seen);
}

#[test]
fn children_see_the_scope_active_when_they_were_spawned() {
    let (outer_child, inner_child) = run_with_context("outer", || {
        let inner_child = run_with_context("inner", || {
            spawn(|| current_context::<&str>().map(|s| *s))
        });
        let outer_child = spawn(|| current_context::<&str>().map(|s| *s));
        (outer_child, inner_child)
    });
    assert_eq!(inner_child.join().unwrap(), Some("inner"));
    assert_eq!(outer_child.join().unwrap(), Some("outer"));
}

#[test]
fn child_context_ends_with_child() {
    let id = run_with_context("short", || {
        let id = ContextId::current().unwrap();
        spawn(|| ()).join().unwrap();
        id
    });
    assert!(Registry::global().lookup(id).is_none());
}

#[test]
fn child_scopes_do_not_reach_the_parent() {
    run_with_context("parent", || {
        spawn(|| {
            run_with_context("child", || {
                assert_eq!(*current_context::<&str>().unwrap(), "child");
            })
        })
        .join()
        .unwrap();
        assert_eq!(*current_context::<&str>().unwrap(), "parent");
    });
}
