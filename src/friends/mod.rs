//! Friend documents: the frontmatter codec and the tracked-entity view of a
//! friends directory.
//!
//! - [`frontmatter`] - parses the `---` delimited header and rewrites the
//!   managed status lines in place, leaving the body untouched
//! - [`entity`] - lists a directory of friend documents as [`TrackedEntity`] values

pub mod entity;
pub mod frontmatter;

pub use entity::{load_entities, EntityError, FriendStatus, TrackedEntity};
pub use frontmatter::{
    parse as parse_frontmatter, update_status, BlockError, Frontmatter, FrontmatterError,
    FrontmatterValue, HIDE_THRESHOLD,
};
