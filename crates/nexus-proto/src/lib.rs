//! Wire types for the Nexus perception/action daemon protocol.
//!
//! # Purpose
//!
//! - Define the normalized [`Element`]/[`Snapshot`] data model every backend
//!   adapter converts into and every formatter reads back out of.
//! - Define the daemon's line-delimited JSON [`Request`]/[`Response`]
//!   envelope and the closed [`ErrorKind`] taxonomy.
//! - Exclude any backend-specific representation (native accessibility
//!   nodes, DevTools JSON, OCR runs) — those live behind `nexus-backends`
//!   and are converted to [`Element`] before crossing into this crate.
//!
//! # Mental model
//!
//! A [`Snapshot`] is an immutable, ordered list of [`Element`]s captured
//! from one window at one instant. Elements never outlive their snapshot;
//! across snapshots only [`Element::id`] shares no meaning; matching across
//! snapshots (diffing, resolving) always goes through `(name, role,
//! parent_name)`, never raw ids.

pub mod element;
pub mod error;
pub mod mark;
pub mod raw;
pub mod request;
pub mod response;
pub mod window;

pub use element::{Element, ElementFlags, Rect, Role, Snapshot};
pub use error::{ErrorKind, StatusError};
pub use mark::{Mark, MarkTable};
pub use raw::{RawGraph, RawNode, RawRef};
pub use request::{Command, FocusPreset, Format, MatchKind, Region, Request};
pub use response::Response;
pub use window::{Backend, WindowInfo, WindowKey};
