//! Public facade crate for `subpipe`.
//!
//! No IO or yt-dlp specifics live here: it re-exports the language selector, the subtitle
//! normalizer, and the collaborator traits from `subpipe-core`.

pub use subpipe_core::*;
