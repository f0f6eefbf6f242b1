//! cliprelay Media Engine
//!
//! Cuts independently playable segments out of source media.
//!
//! # Pipeline Architecture
//!
//! ```text
//! source blob ──► write_input ──► input.mp4 (scratch dir)
//!                                     │
//! usages ──► cut plan per usage ──► execute (ffmpeg) ──► usage_<id>.mp4
//!                                                            │
//!                                  read_output ◄─────────────┘
//!                                       │
//!                                       ▼
//!                              ExtractedSegment (start 0)
//! ```
//!
//! The engine is an explicitly constructed value with `start`/`shutdown`.
//! Callers hold it by `&mut`, which serializes extraction calls.

pub mod blob;
pub mod engine;
pub mod extract;
pub mod keyframes;

pub use blob::*;
pub use engine::*;
pub use extract::*;
