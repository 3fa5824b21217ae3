//! Diff and patch algorithms for addressed XML revisions.
//!
//! [`Diff`] computes the [`Difference`]s between two revisions and writes
//! them as an edit script. [`EditScript`] reads a script back, and [`Patch`]
//! replays it against a streamed base revision to reconstruct or annotate
//! the target.

mod difference;
mod edit_script;
mod generator;
mod patch;

pub use difference::{Anchor, Boundary, Delete, Difference, Insert};
pub use edit_script::{
    write_version, EditScript, Fragment, Operation, ScriptBody, VersionProperties,
};
pub use generator::{Diff, DiffConfig, TieBreak};
pub use patch::Patch;
