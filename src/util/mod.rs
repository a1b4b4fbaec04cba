//! Text helpers shared by the feed extractor and the CLI output.
//!
//! - **Markup cleanup**: entity decoding and tag stripping for feed text
//! - **Terminal output**: control-character filtering and width-aware truncation
//!
//! # Examples
//!
//! ```
//! use friendlink::util::{decode_html_entities, strip_html_tags, truncate_to_width};
//!
//! let summary = decode_html_entities(&strip_html_tags("<p>Fish &amp; chips</p>")).into_owned();
//! assert_eq!(summary, "Fish & chips");
//!
//! assert_eq!(truncate_to_width("A rather long friend name", 10), "A rathe...");
//! ```

mod text;

pub use text::{
    decode_html_entities, fit_to_width, sanitize_for_terminal, strip_html_tags,
    truncate_to_width, unescape_amp,
};
