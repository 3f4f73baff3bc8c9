//! # effectsaga
//!
//! Effect-based asynchronous action middleware: sagas describe side effects
//! as plain values, a driver performs them.
//!
//! ## Core Concepts
//!
//! effectsaga separates **describing** an effect from **performing** it:
//! - [`Effect`] = Description (dispatch this action, call this function)
//! - [`Driver`] = Execution (deliver to the sink, invoke, feed the result back)
//!
//! A [`Saga`] never does IO. It is resumed with the outcome of its previous
//! effect and answers with the next one, so a test can walk it by hand and
//! compare what it yields with expected descriptors.
//!
//! ## Architecture
//!
//! ```text
//! Edge (caller / UI / test)
//!     │
//!     ▼ emit()
//! ActionBus ─────────────────────────────────────┐
//!     │                                          │
//!     ▼ subscribe()                              │
//! Runtime trigger loop                           │
//!     │                                          │
//!     ├─► Watch "A" (every)  ─► spawn saga ──┐   │
//!     │                                      │   │
//!     └─► Watch "B" (latest) ─► cancel prev, │   │
//!                               spawn saga ──┤   │
//!                                            ▼   │
//!                                      Driver    │
//!                                            │   │
//!                 ┌──────────────────────────┤   │
//!                 │                          │   │
//!   Call ─► invoke fn, resume with result    │   │
//!                                            │   │
//!   Put ──► deliver action ──────────────────┴───┘
//! ```
//!
//! ## Key Invariants
//!
//! 1. **Effects are values** - Immutable, compared structurally, carry no behavior
//! 2. **Only the driver performs effects** - Sagas yield, never execute
//! 3. **One resume at a time** - A saga instance is never resumed concurrently
//! 4. **Strict yield order** - Effect N settles before effect N+1 is requested
//! 5. **Failures are injected** - A failed call resumes the saga via [`Resume::Fail`]
//! 6. **Cancellation at suspension points** - In-flight calls finish, their results are dropped
//!
//! ## Example
//!
//! ```ignore
//! use effectsaga_core::{dispatch, invoke, Action, Resume, Saga, SagaError, Step};
//! use effectsaga_core::sagas::delay;
//!
//! // 1. A saga is a state machine over its suspension points
//! enum Ping { Start, Waiting, Done }
//!
//! impl Saga for Ping {
//!     fn name(&self) -> &str { "ping" }
//!
//!     fn resume(&mut self, input: Resume) -> Result<Step, SagaError> {
//!         match self {
//!             Ping::Start => {
//!                 *self = Ping::Waiting;
//!                 Ok(Step::Yield(invoke!(delay(), 100)))
//!             }
//!             Ping::Waiting => {
//!                 input.into_value()?;
//!                 *self = Ping::Done;
//!                 Ok(Step::Yield(dispatch(Action::new("PONG"))))
//!             }
//!             Ping::Done => Ok(Step::Done(None)),
//!         }
//!     }
//! }
//!
//! // 2. Register it and start the runtime
//! let bus = ActionBus::new();
//! let handle = RuntimeBuilder::new(bus.clone())
//!     .watch_latest("PING", |_| Box::new(Ping::Start))
//!     .build()
//!     .start();
//!
//! // 3. Emit triggers
//! bus.emit(Action::new("PING"));
//! ```
//!
//! ## What This Is Not
//!
//! effectsaga is **not**:
//! - A store or reducer
//! - An actor framework
//! - A retry/backoff layer
//!
//! Resilience is something a saga expresses itself, by yielding a failure
//! action instead of giving up.

// Core modules
mod action;
mod bus;
mod driver;
mod effect;
mod effect_macro;
mod error;
mod request;
mod runtime;
mod saga;
mod watch;

// Sample sagas
pub mod sagas;

// Testing utilities are in the separate effectsaga-testing crate


// Re-export core types
pub use crate::action::Action;
pub use crate::effect::{dispatch, invoke, Args, Call, CallTarget, Effect, Func};
pub use crate::saga::{Resume, Saga, Step};

// Re-export error types
pub use crate::error::{CallFailure, RequestError, SagaError};

// Re-export driver
pub use driver::Driver;

// Re-export bus types
pub use bus::{ActionBus, ActionSink, DEFAULT_BUS_CAPACITY};

// Re-export watch and runtime types
pub use runtime::{Runtime, RuntimeBuilder, RuntimeHandle, TaskId, TaskSnapshot};
pub use watch::{Policy, SagaFactory, Watch};

// Re-export request helpers (syntactic sugar over the action bus)
pub use request::{request, request_timeout, DEFAULT_REQUEST_TIMEOUT};

// Re-export commonly used external types
pub use async_trait::async_trait;
pub use tokio_util::sync::CancellationToken;

#[doc(hidden)]
pub use serde_json;
