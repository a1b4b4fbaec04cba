//! Friend feed reading.
//!
//! - [`extractor`] - turns raw RSS 2.0 / Atom text into [`FeedEntry`] values
//!   by pattern matching, newest first
//! - [`fetcher`] - HTTP retrieval with timeout and size limit, per-friend
//!   fan-out, and merging into a single recent-entries list
//!
//! The extractor has no knowledge of HTTP or friend documents; callers only
//! depend on [`extract_entries`], so a structural XML implementation can
//! replace it without touching them.

pub mod extractor;
pub mod fetcher;

pub use extractor::{extract_entries, parse_feed_date, FeedDialect, FeedEntry};
pub use fetcher::{fetch_feed, fetch_friend_feeds, recent_entries, FeedFetchError, RecentEntry};
