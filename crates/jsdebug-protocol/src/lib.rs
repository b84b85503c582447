//! jsdebug-protocol: typed message shapes for JavaScript VM debugger protocols.
//!
//! The [`binding`] module turns untyped JSON into typed views with
//! declarative subtype selection. The [`v8`] and [`wip`] modules are the
//! shape catalogues of the native and WebSocket Inspector dialects.

pub mod binding;
pub mod error;
pub mod v8;
pub mod wip;

pub use binding::{decode, decode_fields, Condition, Field, Polymorphic, Subtype, Typed};
pub use error::DecodeError;
