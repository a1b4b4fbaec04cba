use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use regex::Regex;
use serde::Serialize;
use std::sync::LazyLock;

use crate::util::{decode_html_entities, strip_html_tags, unescape_amp};

/// One normalized feed entry.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeedEntry {
    pub title: String,
    pub link: String,
    pub pub_date: DateTime<Utc>,
    pub description: String,
    pub author: String,
    pub guid: String,
}

/// The two feed shapes the extractor understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedDialect {
    Atom,
    Rss,
}

impl FeedDialect {
    /// Atom if the text has a `<feed` opening tag or an `<entry>` tag,
    /// RSS 2.0 otherwise.
    pub fn detect(raw: &str) -> Self {
        if raw.contains("<feed") || raw.contains("<entry>") {
            FeedDialect::Atom
        } else {
            FeedDialect::Rss
        }
    }
}

macro_rules! pattern {
    ($name:ident, $re:expr) => {
        static $name: LazyLock<Regex> =
            LazyLock::new(|| Regex::new($re).expect(concat!(stringify!($name), " is a valid regex")));
    };
}

pattern!(ATOM_ENTRY, r"(?is)<entry[^>]*>.*?</entry>");
pattern!(RSS_ITEM, r"(?is)<item[^>]*>.*?</item>");

pattern!(TITLE, r"(?is)<title[^>]*>(?:<!\[CDATA\[(.*?)\]\]>|(.*?))</title>");
pattern!(ATOM_LINK_HREF, r#"(?is)<link[^>]*href=["'](.*?)["'][^>]*>"#);
pattern!(LINK_TEXT, r"(?is)<link[^>]*>(.*?)</link>");
pattern!(
    ATOM_DATE,
    r"(?is)<(?:published|updated)[^>]*>(.*?)</(?:published|updated)>"
);
pattern!(RSS_DATE, r"(?is)<pubDate[^>]*>(.*?)</pubDate>");
pattern!(
    ATOM_SUMMARY,
    r"(?is)<(?:summary|content)[^>]*>(?:<!\[CDATA\[(.*?)\]\]>|(.*?))</(?:summary|content)>"
);
pattern!(
    RSS_DESCRIPTION,
    r"(?is)<description[^>]*>(?:<!\[CDATA\[(.*?)\]\]>|(.*?))</description>"
);
pattern!(
    ATOM_AUTHOR_NAME,
    r"(?is)<author[^>]*>.*?<name[^>]*>(.*?)</name>.*?</author>"
);
pattern!(
    ATOM_AUTHOR,
    r"(?is)<author[^>]*>(?:<!\[CDATA\[(.*?)\]\]>|(.*?))</author>"
);
pattern!(
    RSS_AUTHOR,
    r"(?is)<(?:author|dc:creator)[^>]*>(?:<!\[CDATA\[(.*?)\]\]>|(.*?))</(?:author|dc:creator)>"
);
pattern!(ATOM_ID, r"(?is)<id[^>]*>(.*?)</id>");
pattern!(RSS_GUID, r"(?is)<guid[^>]*>(.*?)</guid>");

/// Per-dialect patterns for each field. A field with several patterns uses a
/// later one only when the earlier ones do not match at all.
struct FieldPatterns {
    block: &'static LazyLock<Regex>,
    link: &'static [&'static LazyLock<Regex>],
    date: &'static LazyLock<Regex>,
    description: &'static LazyLock<Regex>,
    author: &'static [&'static LazyLock<Regex>],
    id: &'static LazyLock<Regex>,
}

static ATOM_FIELDS: FieldPatterns = FieldPatterns {
    block: &ATOM_ENTRY,
    link: &[&ATOM_LINK_HREF, &LINK_TEXT],
    date: &ATOM_DATE,
    description: &ATOM_SUMMARY,
    author: &[&ATOM_AUTHOR_NAME, &ATOM_AUTHOR],
    id: &ATOM_ID,
};

static RSS_FIELDS: FieldPatterns = FieldPatterns {
    block: &RSS_ITEM,
    link: &[&LINK_TEXT],
    date: &RSS_DATE,
    description: &RSS_DESCRIPTION,
    author: &[&RSS_AUTHOR],
    id: &RSS_GUID,
};

/// Extracts entries from RSS 2.0 or Atom text, newest first.
///
/// This is pattern matching over the raw markup, not an XML parser: each
/// field is the first match inside its `<item>`/`<entry>` block. Entries
/// without both a title and a link are dropped, and a missing or unreadable
/// date becomes the current time.
///
/// # Examples
///
/// ```
/// use friendlink::feed::extract_entries;
///
/// let rss = "<rss><channel><item><title>Hello</title><link>http://a/1</link></item></channel></rss>";
/// let entries = extract_entries(rss);
/// assert_eq!(entries.len(), 1);
/// assert_eq!(entries[0].title, "Hello");
/// ```
pub fn extract_entries(raw: &str) -> Vec<FeedEntry> {
    extract_entries_at(raw, Utc::now())
}

/// Same as [`extract_entries`], with `now` standing in for missing dates.
pub fn extract_entries_at(raw: &str, now: DateTime<Utc>) -> Vec<FeedEntry> {
    let dialect = FeedDialect::detect(raw);
    let fields = match dialect {
        FeedDialect::Atom => &ATOM_FIELDS,
        FeedDialect::Rss => &RSS_FIELDS,
    };

    let mut entries: Vec<FeedEntry> = fields
        .block
        .find_iter(raw)
        .filter_map(|block| extract_one(block.as_str(), fields, now))
        .collect();

    entries.sort_by(|a, b| b.pub_date.cmp(&a.pub_date));
    tracing::trace!(dialect = ?dialect, entries = entries.len(), "Extracted feed entries");
    entries
}

fn extract_one(block: &str, fields: &FieldPatterns, now: DateTime<Utc>) -> Option<FeedEntry> {
    let title = capture(&TITLE, block);
    let link = capture_first_matching(fields.link, block);
    if title.is_empty() || link.is_empty() {
        return None;
    }

    let date_text = capture(fields.date, block);
    let pub_date = if date_text.is_empty() {
        now
    } else {
        parse_feed_date(&date_text).unwrap_or(now)
    };

    let description = capture(fields.description, block);
    let description = if description.is_empty() {
        String::new()
    } else {
        decode_html_entities(&strip_html_tags(&description)).into_owned()
    };

    let author = capture_first_matching(fields.author, block);

    let id = capture(fields.id, block);
    let guid = if id.is_empty() { link.clone() } else { id };

    Some(FeedEntry {
        title: decode_html_entities(&title).into_owned(),
        link: unescape_amp(&link),
        pub_date,
        description,
        author: decode_html_entities(&author).into_owned(),
        guid: unescape_amp(&guid),
    })
}

/// First non-empty capture group of the first match, trimmed; empty when the
/// pattern does not match.
fn capture(re: &Regex, text: &str) -> String {
    re.captures(text)
        .map(|caps| first_group(&caps))
        .unwrap_or_default()
}

/// Like [`capture`] over an ordered list of patterns; a later pattern is
/// consulted only when the earlier ones have no match at all.
fn capture_first_matching(patterns: &[&'static LazyLock<Regex>], text: &str) -> String {
    patterns
        .iter()
        .find_map(|re| re.captures(text))
        .map(|caps| first_group(&caps))
        .unwrap_or_default()
}

fn first_group(caps: &regex::Captures<'_>) -> String {
    caps.iter()
        .skip(1)
        .flatten()
        .map(|m| m.as_str())
        .find(|s| !s.is_empty())
        .unwrap_or("")
        .trim()
        .to_string()
}

/// Parses the date formats seen in feeds: RFC 2822 (RSS), RFC 3339 (Atom),
/// and bare ISO date-times or dates, which are taken as UTC.
pub fn parse_feed_date(text: &str) -> Option<DateTime<Utc>> {
    let text = text.trim();
    if let Ok(dt) = DateTime::parse_from_rfc2822(text) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(text, format) {
            return Some(naive.and_utc());
        }
    }
    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2030, 6, 1, 0, 0, 0).unwrap()
    }

    const RSS_SAMPLE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0" xmlns:dc="http://purl.org/dc/elements/1.1/">
<channel>
  <title>Alice's Blog</title>
  <link>https://alice.dev</link>
  <item>
    <title><![CDATA[Older & wiser]]></title>
    <link>https://alice.dev/older?a=1&amp;b=2</link>
    <pubDate>Tue, 02 Jan 2024 08:00:00 +0800</pubDate>
    <description><![CDATA[<p>First <b>post</b> &amp; more</p>]]></description>
    <dc:creator>Alice</dc:creator>
    <guid isPermaLink="false">older-1</guid>
  </item>
  <item>
    <title>Newer &lt;3</title>
    <link>https://alice.dev/newer</link>
    <pubDate>Wed, 10 Jan 2024 12:00:00 GMT</pubDate>
    <description>Plain &quot;text&quot;</description>
  </item>
</channel>
</rss>"#;

    const ATOM_SAMPLE: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<feed xmlns="http://www.w3.org/2005/Atom">
  <title>Bob</title>
  <entry>
    <title type="html">First</title>
    <link href="https://bob.dev/first"/>
    <id>urn:bob:1</id>
    <updated>2024-02-01T00:00:00Z</updated>
    <summary>Short summary</summary>
    <author><name>Bob Builder</name><email>bob@bob.dev</email></author>
  </entry>
  <entry>
    <title>Second</title>
    <link rel="alternate" type="text/html" href='https://bob.dev/second?x=1&amp;y=2' />
    <published>2024-03-05T10:00:00+02:00</published>
    <content type="html"><![CDATA[<div>Full <i>content</i></div>]]></content>
  </entry>
</feed>"#;

    #[test]
    fn test_detect_dialect() {
        assert_eq!(FeedDialect::detect(ATOM_SAMPLE), FeedDialect::Atom);
        assert_eq!(FeedDialect::detect("<x><entry></entry></x>"), FeedDialect::Atom);
        assert_eq!(FeedDialect::detect(RSS_SAMPLE), FeedDialect::Rss);
    }

    #[test]
    fn test_minimal_rss_item() {
        let raw = "<item><title>Hello</title><link>http://a/1</link>\
                   <pubDate>Mon, 01 Jan 2024 00:00:00 GMT</pubDate></item>";
        let entries = extract_entries_at(raw, now());

        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].title, "Hello");
        assert_eq!(entries[0].link, "http://a/1");
        assert_eq!(
            entries[0].pub_date,
            Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
        );
        assert_eq!(entries[0].guid, "http://a/1");
        assert_eq!(entries[0].description, "");
        assert_eq!(entries[0].author, "");
    }

    #[test]
    fn test_rss_fields_and_order() {
        let entries = extract_entries_at(RSS_SAMPLE, now());
        assert_eq!(entries.len(), 2);

        let newer = &entries[0];
        assert_eq!(newer.title, "Newer <3");
        assert_eq!(newer.description, "Plain \"text\"");
        assert_eq!(newer.guid, "https://alice.dev/newer");

        let older = &entries[1];
        assert_eq!(older.title, "Older & wiser");
        assert_eq!(older.link, "https://alice.dev/older?a=1&b=2");
        assert_eq!(older.description, "First post & more");
        assert_eq!(older.author, "Alice");
        assert_eq!(older.guid, "older-1");
        assert_eq!(
            older.pub_date,
            Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap()
        );
    }

    #[test]
    fn test_atom_fields_and_order() {
        let entries = extract_entries_at(ATOM_SAMPLE, now());
        assert_eq!(entries.len(), 2);

        let second = &entries[0];
        assert_eq!(second.title, "Second");
        assert_eq!(second.link, "https://bob.dev/second?x=1&y=2");
        assert_eq!(second.description, "Full content");
        assert_eq!(second.guid, "https://bob.dev/second?x=1&y=2");
        assert_eq!(
            second.pub_date,
            Utc.with_ymd_and_hms(2024, 3, 5, 8, 0, 0).unwrap()
        );

        let first = &entries[1];
        assert_eq!(first.link, "https://bob.dev/first");
        assert_eq!(first.guid, "urn:bob:1");
        assert_eq!(first.author, "Bob Builder");
        assert_eq!(first.description, "Short summary");
    }

    #[test]
    fn test_atom_self_closing_link() {
        let raw = r#"<feed><entry><title>T</title><link href="http://b/2"/></entry></feed>"#;
        let entries = extract_entries_at(raw, now());
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].link, "http://b/2");
    }

    #[test]
    fn test_atom_link_text_fallback() {
        let raw = "<feed><entry><title>T</title><link>http://b/3</link></entry></feed>";
        let entries = extract_entries_at(raw, now());
        assert_eq!(entries[0].link, "http://b/3");
    }

    #[test]
    fn test_atom_author_without_name() {
        let raw = "<feed><entry><title>T</title><link href=\"http://b/4\"/>\
                   <author>Carol &amp; Dan</author></entry></feed>";
        let entries = extract_entries_at(raw, now());
        assert_eq!(entries[0].author, "Carol & Dan");
    }

    #[test]
    fn test_later_date_first_regardless_of_source_order() {
        let raw = "<rss><channel>\
            <item><title>Old</title><link>http://a/old</link><pubDate>Mon, 01 Jan 2024 00:00:00 GMT</pubDate></item>\
            <item><title>New</title><link>http://a/new</link><pubDate>Fri, 01 Mar 2024 00:00:00 GMT</pubDate></item>\
            </channel></rss>";
        let titles: Vec<_> = extract_entries_at(raw, now())
            .into_iter()
            .map(|e| e.title)
            .collect();
        assert_eq!(titles, vec!["New", "Old"]);
    }

    #[test]
    fn test_entries_without_title_or_link_dropped() {
        let raw = "<rss><channel>\
            <item><title>  </title><link>http://a/1</link></item>\
            <item><title>No link</title></item>\
            <item><title>Kept</title><link>http://a/3</link></item>\
            </channel></rss>";
        let entries = extract_entries_at(raw, now());
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].title, "Kept");
    }

    #[test]
    fn test_missing_or_bad_date_defaults_to_now() {
        let raw = "<rss><channel>\
            <item><title>A</title><link>http://a/1</link></item>\
            <item><title>B</title><link>http://a/2</link><pubDate>someday</pubDate></item>\
            </channel></rss>";
        let entries = extract_entries_at(raw, now());
        assert!(entries.iter().all(|e| e.pub_date == now()));
    }

    #[test]
    fn test_case_insensitive_tags() {
        let raw = "<RSS><ITEM><TITLE>Loud</TITLE><LINK>http://a/loud</LINK></ITEM></RSS>";
        let entries = extract_entries_at(raw, now());
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].title, "Loud");
    }

    #[test]
    fn test_multiline_title() {
        let raw = "<rss><item><title>\n  Spread\n  out\n</title><link>\n http://a/x \n</link></item></rss>";
        let entries = extract_entries_at(raw, now());
        assert_eq!(entries[0].title, "Spread\n  out");
        assert_eq!(entries[0].link, "http://a/x");
    }

    #[test]
    fn test_garbage_input_is_empty() {
        assert!(extract_entries_at("", now()).is_empty());
        assert!(extract_entries_at("not a feed at all", now()).is_empty());
        assert!(extract_entries_at("<item><title>unterminated", now()).is_empty());
    }

    #[test]
    fn test_parse_feed_date_formats() {
        let expected = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        assert_eq!(parse_feed_date("Mon, 01 Jan 2024 00:00:00 GMT"), Some(expected));
        assert_eq!(parse_feed_date("2024-01-01T00:00:00Z"), Some(expected));
        assert_eq!(parse_feed_date("2024-01-01T08:00:00+08:00"), Some(expected));
        assert_eq!(parse_feed_date("2024-01-01T00:00:00"), Some(expected));
        assert_eq!(parse_feed_date("2024-01-01 00:00:00"), Some(expected));
        assert_eq!(parse_feed_date("2024-01-01"), Some(expected));
        assert_eq!(parse_feed_date("yesterday"), None);
    }
}
