//! # Pigment
//!
//! Pigment is a thin, low-level rendering layer. A single API surface sits on top of
//! structurally different native graphics backends, which are plugged in through the
//! [Visitor](crate::backends::Visitor) trait.
//!
//! The layer owns three things:
//!
//! 1. The reference-counted object model. Every GPU-visible resource (geometry buffers,
//! data buffers, textures, frame buffers, pipeline states, inputs and parameters) is
//! addressed by a typed handle, created through the [Session](crate::session::Session)
//! and destroyed when its last reference is released.
//! 2. Pipeline states. A [StateParams](crate::objects::state::StateParams) is compiled
//! into input slots, a flattened parameter table and fixed-function state, and is
//! validated against the formats of the active render target before it can be used.
//! 3. Immediate-mode batching. Ad-hoc primitives are accumulated into a bounded
//! geometry buffer and flushed as draw calls whenever the buffer runs out of space.
//!
//! Everything is single-threaded: a `Session` is created once, owns its backend, and
//! must not be shared between threads.

#[macro_use]
extern crate failure;
#[macro_use]
extern crate log;
#[macro_use]
extern crate serde;

#[macro_use]
pub mod errors;
#[macro_use]
pub mod utils;

pub mod backends;
pub mod immediate;
pub mod objects;
pub mod session;
pub mod settings;

pub mod prelude;

/// The maximum number of color targets of a frame buffer.
pub const MAX_COLOR_TARGETS: usize = 8;
/// The maximum number of parameter sets of a pipeline state.
pub const MAX_PARAMETER_SETS: usize = 8;
/// The maximum number of input slots of a pipeline state.
pub const MAX_INPUT_SLOTS: usize = 16;
