//! Reactive Primitives
//!
//! This module implements the fine-grained reactive core: the dependency
//! store, the effect runtime, the transparent object wrapper, and the
//! derived primitives built on top of them (signals, computed values,
//! watchers).
//!
//! # Concepts
//!
//! ## Tracking
//!
//! Reading reactive state inside a running effect records a dependency
//! edge in the dependency store: (target, key) -> effect. Writing that
//! state later notifies exactly the effects registered under the written
//! key, and nothing else.
//!
//! ## Effects
//!
//! An effect is the unit of subscription. It re-collects its dependency
//! set from scratch on every run, so a computation whose data needs
//! change (a branch that stops reading a field) sheds stale subscriptions
//! automatically.
//!
//! ## Batching
//!
//! An effect may carry a scheduling policy. Component render effects use
//! one to defer through the scheduler instead of running synchronously on
//! every write; watchers use one to pick their flush phase.

pub mod computed;
pub mod effect;
pub mod signal;
pub mod store;
pub mod watch;
pub mod wrapper;

pub use computed::Computed;
pub use effect::{effect, EffectOptions, EffectScheduler, ReactiveEffect};
pub use signal::Signal;
pub use store::{DepKey, TargetId};
pub use watch::{watch, watch_effect, FlushMode, OnInvalidate, WatchHandle, WatchOptions};
pub use wrapper::{reactive, readonly, Reactive};
