//! wisp-core — command-compiler core for a declarative GPU draw library.
//!
//! The surrounding library compiles declarative draw-command descriptors into
//! reusable, low-overhead routines that issue graphics-API calls while
//! minimizing redundant state changes. This crate is the algorithmic core
//! that compiler depends on:
//!
//! - [`codegen`] — a runtime code-generation environment assembling
//!   specialized routines from composable fragments, with scoped
//!   save/restore of mutated state and a deduplicating constant-linking
//!   table.
//! - [`dynamic`] — a property-path resolver turning user path strings such
//!   as `"a.b[0]"` into safe nested lookups, and the static/dynamic
//!   classification of bound command parameters.
//! - [`timer`] — an asynchronous GPU-timer scheduler pooling hardware timer
//!   queries and attributing elapsed time to overlapping profiling scopes as
//!   results resolve out of order.
//! - [`pool`] — a power-of-16 binned allocator for short-lived numeric
//!   staging buffers.
//!
//! Resource lifecycle management, context acquisition, option normalization
//! and the frame loop live outside this crate and consume its outputs.
//!
//! # Threading
//!
//! Everything here assumes exactly one logical thread of control, the model
//! the surrounding render loop provides: shared state is `Rc`/`RefCell`, no
//! operation blocks, and the only asynchronous element — timer-query
//! availability — is polled once per externally driven update tick.

pub mod codegen;
pub mod dynamic;
pub mod errors;
pub mod pool;
pub mod timer;
pub mod value;

pub use codegen::{CodeGenEnvironment, CompiledProcedures, ConstId, Expr, Op, Place};
pub use dynamic::{DynamicValue, PathAccessor, PathToken, accessor};
pub use errors::{Result, WispError};
pub use pool::{BufferPool, RawBuffer, TypedView};
pub use timer::{ProfilingStats, StatsHandle, TimerBackend, TimerQuery, TimerQueryScheduler};
pub use value::Value;
