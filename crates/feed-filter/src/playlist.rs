//! M3U playlist filtering.
//!
//! Reduces an extended M3U playlist to the entries that belong to one channel
//! and normalizes their `tvg-id`/`tvg-name` attributes so that guide lookups
//! in players resolve to the filtered XMLTV document.
//!
//! An entry is an `#EXTINF` line, any number of further `#` lines (player
//! options such as `#EXTVLCOPT`) and finally the stream URL. Entries without
//! an `#EXTINF` line are dropped, and so is everything before the first entry.

use std::sync::LazyLock;

use regex::Regex;
use tracing::trace;

use crate::ChannelTarget;

/// Playlist header, written exactly once at the top of every filtered playlist.
pub const HEADER: &str = "#EXTM3U";

/// Prefix of an entry metadata line.
pub const EXTINF: &str = "#EXTINF";

const TVG_ID: &str = "tvg-id";
const TVG_NAME: &str = "tvg-name";

static ATTRIBUTE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"([\w-]+)="([^"]*)""#).expect("attribute pattern is a valid regex")
});

/// A single `key="value"` pair of an `#EXTINF` line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    pub key: String,
    pub value: String,
}

impl Attribute {
    fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// Parsed `#EXTINF` metadata line.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtInf {
    /// Attributes in the order they appear on the line.
    pub attributes: Vec<Attribute>,
    /// Everything after the first comma, trimmed.
    pub title: String,
}

impl ExtInf {
    /// Parse a metadata line.
    ///
    /// Attributes are only looked for before the first comma. Lines without
    /// any attribute or title parse to an empty record instead of failing.
    pub fn parse(line: &str) -> Self {
        let (meta, title) = match line.split_once(',') {
            Some((meta, title)) => (meta, title.trim()),
            None => (line, ""),
        };

        let attributes = ATTRIBUTE_RE
            .captures_iter(meta)
            .map(|caps| Attribute::new(&caps[1], &caps[2]))
            .collect();

        Self {
            attributes,
            title: title.to_string(),
        }
    }

    /// Value of the first attribute named `key`.
    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|attr| attr.key == key)
            .map(|attr| attr.value.as_str())
    }

    /// Whether `pattern` matches the entry's `tvg-id`, `tvg-name` or title.
    ///
    /// Empty candidates are never tested.
    pub fn matches(&self, pattern: &Regex) -> bool {
        [
            self.attribute(TVG_ID).unwrap_or_default(),
            self.attribute(TVG_NAME).unwrap_or_default(),
            self.title.as_str(),
        ]
        .into_iter()
        .any(|text| !text.is_empty() && pattern.is_match(text))
    }

    /// Force `tvg-id` and `tvg-name` to the target identity.
    ///
    /// Existing occurrences are overwritten in place. Missing ones are inserted
    /// at the front, `tvg-id` first and `tvg-name` right after it.
    pub fn retarget(&mut self, target: &ChannelTarget) {
        let mut seen_id = false;
        let mut seen_name = false;

        for attr in &mut self.attributes {
            match attr.key.as_str() {
                TVG_ID => {
                    attr.value.clone_from(&target.id);
                    seen_id = true;
                }
                TVG_NAME => {
                    attr.value.clone_from(&target.name);
                    seen_name = true;
                }
                _ => {}
            }
        }

        if !seen_id {
            self.attributes
                .insert(0, Attribute::new(TVG_ID, target.id.as_str()));
        }
        if !seen_name {
            let at = match self.attributes.first() {
                Some(first) if first.key == TVG_ID => 1,
                _ => 0,
            };
            self.attributes
                .insert(at, Attribute::new(TVG_NAME, target.name.as_str()));
        }
    }

    /// Render as an `#EXTINF` line with an unknown (`-1`) duration.
    pub fn render(&self) -> String {
        let mut line = String::from("#EXTINF:-1");
        for attr in &self.attributes {
            line.push(' ');
            line.push_str(&attr.key);
            line.push_str("=\"");
            line.push_str(&attr.value);
            line.push('"');
        }
        line.push(',');
        line.push_str(&self.title);
        line.trim().to_string()
    }
}

/// Entry collected between its `#EXTINF` line and its URL line.
struct PendingEntry<'a> {
    extinf: ExtInf,
    matched: bool,
    comments: Vec<&'a [u8]>,
}

/// Strip surrounding whitespace, Unicode-aware when the line is valid UTF-8.
fn trim(line: &[u8]) -> &[u8] {
    match std::str::from_utf8(line) {
        Ok(text) => text.trim().as_bytes(),
        Err(_) => line.trim_ascii(),
    }
}

/// Filter `raw` down to the entries matching `pattern`, retargeted to `target`.
///
/// Rewritten entries carry the target name as their title. The result always
/// starts with [`HEADER`], separates entries by a blank line and ends with a
/// single newline. `#EXTINF` lines are re-rendered from their parsed form;
/// comment and URL lines of kept entries are copied byte for byte, even when
/// they are not valid UTF-8.
pub fn filter(raw: &[u8], pattern: &Regex, target: &ChannelTarget) -> Vec<u8> {
    let mut output = Vec::with_capacity(raw.len().min(4096));
    output.extend_from_slice(HEADER.as_bytes());
    output.push(b'\n');

    let mut kept = 0usize;
    let mut pending: Option<PendingEntry<'_>> = None;

    for line in raw.split(|&b| b == b'\n') {
        let line = trim(line);
        if line.is_empty() || line.starts_with(HEADER.as_bytes()) {
            continue;
        }

        if line.starts_with(EXTINF.as_bytes()) {
            let extinf = ExtInf::parse(&String::from_utf8_lossy(line));
            let matched = extinf.matches(pattern);
            pending = Some(PendingEntry {
                extinf,
                matched,
                comments: Vec::new(),
            });
            continue;
        }

        if line.starts_with(b"#") {
            if let Some(entry) = pending.as_mut() {
                entry.comments.push(line);
            }
            continue;
        }

        match pending.take() {
            Some(mut entry) if entry.matched => {
                entry.extinf.retarget(target);
                entry.extinf.title.clone_from(&target.name);

                if kept > 0 {
                    output.push(b'\n');
                }
                kept += 1;

                output.extend_from_slice(entry.extinf.render().as_bytes());
                output.push(b'\n');
                for comment in entry.comments {
                    output.extend_from_slice(comment);
                    output.push(b'\n');
                }
                output.extend_from_slice(line);
                output.push(b'\n');
            }
            Some(entry) => {
                trace!(title = %entry.extinf.title, "Dropping non-matching playlist entry");
            }
            None => {
                trace!(
                    url = %String::from_utf8_lossy(line),
                    "Dropping playlist URL without #EXTINF metadata"
                );
            }
        }
    }

    output
}
