//SPDX-License-Identifier: MIT OR Apache-2.0
/*!
# taskctx

taskctx attaches a value ("context") to the task that is currently running, and to
every task spawned from it, so that code anywhere below can ask "what is *my*
context?" without the value being passed through every function in between.

# Development status

taskctx is experimental and the API may change.

# The problem

Suppose a request handler calls into a library, which calls into another library,
which logs.  The log line should carry the request id.  Threading a `&Request` through
every signature is invasive, and a global only works until there are two requests in
flight.  A thread-local works until the handler spawns a thread, or until the handler
is a future and the executor moves it between threads.

# The model

Each task has a small set of string labels.  A scope allocates a fresh identifier,
stores the payload under it in a process-wide registry, and publishes the identifier
in the task's labels.  Looking the context up is parsing the label and asking the
registry.

| Operation                      | Effect                                                    |
|--------------------------------|-----------------------------------------------------------|
| [`run_with_context`]           | attach for the duration of a closure                      |
| [`enter`]                      | attach until the returned [`ContextGuard`] drops          |
| [`with_context`]               | attach to a future for as long as it runs                 |
| [`attach`]                     | attach to the thread until replaced or the thread exits   |
| [`current_context`]            | read the attached value back, typed                       |
| [`spawn`], [`spawn_scoped`]    | start a thread with a copy of the current labels          |
| [`inherit`]                    | give a future a copy of the current labels                |

Labels are copied, never shared: a child's view is fixed at the moment it was
spawned, and what a child does with its labels does not affect anyone else.

```rust
use taskctx::{current_context, run_with_context};

fn deep_in_a_library() -> String {
    match current_context::<String>() {
        Some(user) => format!("acting for {user}"),
        None => "acting for nobody".to_string(),
    }
}

let answer = run_with_context("alice".to_string(), deep_in_a_library);
assert_eq!(answer, "acting for alice");
assert_eq!(deep_in_a_library(), "acting for nobody");
```

# Lifetime of a context

A scope's label change is undone when it ends, even if the body panics.  The payload
stays in the registry for as long as some task can still see its identifier: usually
that is exactly the scope, but a thread or future that inherited the context keeps it
alive until it finishes.  After that, nobody can observe it and the entry is gone.

# Multithreading

Thread-local storage does not follow new threads, so spawn through [`spawn`] (or
[`spawn_scoped`]) to propagate context.  For async code, wrap futures with
[`inherit`] where they are created; executors that poll on worker threads then see
the right labels on every poll.

# Logging

taskctx logs through [logwise](https://crates.io/crates/logwise).  Internal logging is
compiled in with the `logwise_internal` feature.
*/

mod id;
pub mod labels;
pub mod registry;
mod scope;
mod spawn;
mod spinlock;
mod sys;

logwise::declare_logging_domain!();

pub use id::{ContextId, ParseContextIdError};
pub use labels::{ApplyLabels, LABEL_KEY, LabelSet};
pub use registry::{Lease, Payload, Registry};
pub use scope::{
    ContextGuard, attach, current_context, current_payload, enter, run_with_context,
    with_context,
};
#[cfg(not(target_arch = "wasm32"))]
pub use spawn::spawn_scoped;
pub use spawn::{inherit, spawn};
