use std::borrow::Cow;
use std::sync::LazyLock;

use regex::Regex;
use unicode_width::{UnicodeWidthChar, UnicodeWidthStr};

/// Entity table applied by [`decode_html_entities`], in replacement order.
///
/// `&amp;` is decoded after `&lt;`/`&gt;`, so `&amp;lt;` becomes `&lt;`
/// rather than `<`.
const ENTITY_TABLE: &[(&str, &str)] = &[
    ("&lt;", "<"),
    ("&gt;", ">"),
    ("&amp;", "&"),
    ("&quot;", "\""),
    ("&#39;", "'"),
    ("&nbsp;", " "),
];

static TAG_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<[^>]*>").expect("tag pattern is a valid regex"));

/// Decodes the small set of HTML entities that show up in feed titles and
/// summaries. Anything outside [`ENTITY_TABLE`] passes through untouched.
///
/// # Examples
///
/// ```
/// use friendlink::util::decode_html_entities;
///
/// assert_eq!(decode_html_entities("Tom &amp; Jerry"), "Tom & Jerry");
/// assert_eq!(decode_html_entities("&lt;b&gt;"), "<b>");
/// assert_eq!(decode_html_entities("&copy;"), "&copy;");
/// ```
pub fn decode_html_entities(text: &str) -> Cow<'_, str> {
    if !text.contains('&') {
        return Cow::Borrowed(text);
    }

    let mut out = text.to_string();
    for (entity, replacement) in ENTITY_TABLE {
        if out.contains(entity) {
            out = out.replace(entity, replacement);
        }
    }
    Cow::Owned(out)
}

/// Removes every `<...>` tag from `html`, leaving the text between tags.
pub fn strip_html_tags(html: &str) -> Cow<'_, str> {
    TAG_PATTERN.replace_all(html, "")
}

/// Unescapes `&amp;` only, as used for URLs pulled out of feed markup.
pub fn unescape_amp(url: &str) -> String {
    url.replace("&amp;", "&")
}

/// Drops control characters (except tab and newline) so that text taken from
/// remote feeds cannot drive the terminal when printed.
pub fn sanitize_for_terminal(s: &str) -> Cow<'_, str> {
    if !s.chars().any(is_unsafe_control) {
        return Cow::Borrowed(s);
    }
    Cow::Owned(s.chars().filter(|c| !is_unsafe_control(*c)).collect())
}

fn is_unsafe_control(c: char) -> bool {
    c.is_control() && c != '\t' && c != '\n'
}

const ELLIPSIS: &str = "...";
const ELLIPSIS_WIDTH: usize = 3;

/// Truncates `s` to at most `max_width` terminal columns, appending `...`
/// when text was cut. CJK characters and emoji count as two columns.
///
/// Widths of 3 or less never get an ellipsis; they keep as many leading
/// characters as fit.
pub fn truncate_to_width(s: &str, max_width: usize) -> Cow<'_, str> {
    if UnicodeWidthStr::width(s) <= max_width {
        return Cow::Borrowed(s);
    }

    let budget = if max_width <= ELLIPSIS_WIDTH {
        max_width
    } else {
        max_width - ELLIPSIS_WIDTH
    };

    let mut used = 0;
    let mut end = 0;
    for (idx, c) in s.char_indices() {
        let w = UnicodeWidthChar::width(c).unwrap_or(0);
        if used + w > budget {
            break;
        }
        used += w;
        end = idx + c.len_utf8();
    }

    if max_width <= ELLIPSIS_WIDTH {
        Cow::Owned(s[..end].to_string())
    } else {
        Cow::Owned(format!("{}{}", &s[..end], ELLIPSIS))
    }
}

/// Truncates and right-pads `s` to exactly `width` columns for table output.
pub fn fit_to_width(s: &str, width: usize) -> String {
    let cut = truncate_to_width(s, width);
    let pad = width.saturating_sub(UnicodeWidthStr::width(cut.as_ref()));
    format!("{}{}", cut, " ".repeat(pad))
}
