//! Friend-link maintenance for a static site.
//!
//! Friend sites live as Markdown documents with a YAML-like frontmatter
//! header. [`status`] probes each friend's website and writes the outcome
//! back into that header; [`feed`] reads the friends' RSS/Atom feeds.

pub mod config;
pub mod feed;
pub mod friends;
pub mod status;
pub mod util;
