//! cliprelay Timeline Model
//!
//! Defines the data contracts exchanged with the editor and the renderer:
//! - **Tracks / items:** the composition timeline, with trim windows
//! - **Publish status:** whether an item points at durable or local media
//! - **Playback URLs:** the pattern that marks an item as already published
//! - **Usages:** an item's trim window tied back to its timeline slot
//!
//! The timeline is supplied by an external editor. Fields this crate does
//! not know about are carried through verbatim so that a resolved timeline
//! can be handed to the renderer without losing layout attributes.

pub mod published;
pub mod timeline;
pub mod usage;

pub use published::*;
pub use timeline::*;
pub use usage::*;
