use anyhow::Result;
use feed_rs::parser;
use sha2::{Digest, Sha256};

use crate::storage::ParsedItem;

/// Outcome of decoding one feed payload.
#[derive(Debug)]
pub struct ParseOutcome {
    pub items: Vec<ParsedItem>,
    /// Entries dropped because they carried no title.
    pub skipped: usize,
}

/// Decode a feed payload (RSS or Atom) into item records.
///
/// An entry without a title is skipped and counted rather than stored blank
/// or failing the whole batch. An entry without a link gets a deterministic
/// fallback permalink hashed from its fields, so the dedup key is always
/// present.
///
/// `published_at` falls back to the entry's updated time, then to `now`, so
/// undated entries enter the rolling window as just-published instead of
/// disappearing. `pub_date` keeps whatever string representation the feed
/// carried.
pub fn parse_items(bytes: &[u8]) -> Result<ParseOutcome> {
    let feed = parser::parse(bytes)?;
    let now = chrono::Utc::now();

    let mut items = Vec::with_capacity(feed.entries.len());
    let mut skipped = 0;

    for entry in feed.entries {
        let Some(title) = entry.title.map(|t| t.content).filter(|t| !t.trim().is_empty())
        else {
            skipped += 1;
            continue;
        };

        let published = entry.published.or(entry.updated);
        let pub_date = published.map(|dt| dt.to_rfc2822()).unwrap_or_default();
        let published_at = published.unwrap_or(now).timestamp();

        let author = entry
            .authors
            .first()
            .map(|a| a.name.clone())
            .unwrap_or_default();

        let content = entry
            .content
            .and_then(|c| c.body)
            .or_else(|| entry.summary.map(|s| s.content))
            .unwrap_or_default();

        let link = entry.links.first().map(|l| l.href.clone());
        let more_info = link.unwrap_or_else(|| fallback_permalink(&title, published_at));

        items.push(ParsedItem {
            title,
            pub_date,
            author,
            content,
            more_info,
            published_at,
        });
    }

    Ok(ParseOutcome { items, skipped })
}

fn fallback_permalink(title: &str, published_at: i64) -> String {
    let hash = Sha256::digest(format!("{}|{}", title, published_at).as_bytes());
    format!("urn:catchup:{:x}", hash)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const RSS_THREE_ITEMS: &str = r#"<?xml version="1.0"?>
<rss version="2.0"><channel><title>Example</title>
    <item>
        <title>First</title>
        <link>https://example.com/1</link>
        <author>alice@example.com (Alice)</author>
        <pubDate>Mon, 01 Jan 2024 10:00:00 GMT</pubDate>
        <description>Body one</description>
    </item>
    <item>
        <title>Second</title>
        <link>https://example.com/2</link>
        <pubDate>Tue, 02 Jan 2024 10:00:00 GMT</pubDate>
        <description>Body two</description>
    </item>
    <item>
        <title>Third</title>
        <link>https://example.com/3</link>
        <pubDate>Wed, 03 Jan 2024 10:00:00 GMT</pubDate>
        <description>Body three</description>
    </item>
</channel></rss>"#;

    #[test]
    fn test_parse_yields_one_item_per_entry() {
        let outcome = parse_items(RSS_THREE_ITEMS.as_bytes()).unwrap();
        assert_eq!(outcome.items.len(), 3);
        assert_eq!(outcome.skipped, 0);

        let titles: Vec<&str> = outcome.items.iter().map(|i| i.title.as_str()).collect();
        assert_eq!(titles, vec!["First", "Second", "Third"]);
        assert_eq!(outcome.items[0].more_info, "https://example.com/1");
    }

    #[test]
    fn test_entry_without_title_is_skipped() {
        let rss = r#"<?xml version="1.0"?>
<rss version="2.0"><channel>
    <item><title>Kept</title><link>https://example.com/1</link></item>
    <item><link>https://example.com/2</link><description>No title here</description></item>
    <item><title>Also kept</title><link>https://example.com/3</link></item>
</channel></rss>"#;

        let outcome = parse_items(rss.as_bytes()).unwrap();
        assert_eq!(outcome.items.len(), 2);
        assert_eq!(outcome.skipped, 1);
    }

    #[test]
    fn test_malformed_payload_is_an_error() {
        assert!(parse_items(b"this is not a feed at all").is_err());
    }

    #[test]
    fn test_empty_feed_yields_no_items() {
        let rss = r#"<?xml version="1.0"?>
<rss version="2.0"><channel><title>Empty</title></channel></rss>"#;
        let outcome = parse_items(rss.as_bytes()).unwrap();
        assert!(outcome.items.is_empty());
        assert_eq!(outcome.skipped, 0);
    }

    #[test]
    fn test_pub_date_string_preserved_and_timestamp_derived() {
        let outcome = parse_items(RSS_THREE_ITEMS.as_bytes()).unwrap();
        let first = &outcome.items[0];
        assert!(first.pub_date.contains("2024"));
        // Mon, 01 Jan 2024 10:00:00 GMT
        assert_eq!(first.published_at, 1704103200);
    }

    #[test]
    fn test_undated_entry_gets_current_timestamp() {
        let rss = r#"<?xml version="1.0"?>
<rss version="2.0"><channel>
    <item><title>No date</title><link>https://example.com/1</link></item>
</channel></rss>"#;

        let before = chrono::Utc::now().timestamp();
        let outcome = parse_items(rss.as_bytes()).unwrap();
        let after = chrono::Utc::now().timestamp();

        let item = &outcome.items[0];
        assert!(item.pub_date.is_empty());
        assert!(item.published_at >= before && item.published_at <= after);
    }

    #[test]
    fn test_linkless_entry_gets_stable_fallback_permalink() {
        let rss = r#"<?xml version="1.0"?>
<rss version="2.0"><channel>
    <item><title>Orphan</title><pubDate>Mon, 01 Jan 2024 10:00:00 GMT</pubDate></item>
</channel></rss>"#;

        let a = parse_items(rss.as_bytes()).unwrap();
        let b = parse_items(rss.as_bytes()).unwrap();
        assert!(a.items[0].more_info.starts_with("urn:catchup:"));
        assert_eq!(a.items[0].more_info, b.items[0].more_info);
    }

    #[test]
    fn test_atom_feed_parses() {
        let atom = r#"<?xml version="1.0" encoding="utf-8"?>
<feed xmlns="http://www.w3.org/2005/Atom">
    <title>Atom Example</title>
    <entry>
        <title>Atom entry</title>
        <link href="https://example.com/atom/1"/>
        <id>urn:uuid:1</id>
        <updated>2024-01-05T12:00:00Z</updated>
        <author><name>Bob</name></author>
        <content type="html">&lt;p&gt;Hello&lt;/p&gt;</content>
    </entry>
</feed>"#;

        let outcome = parse_items(atom.as_bytes()).unwrap();
        assert_eq!(outcome.items.len(), 1);
        let item = &outcome.items[0];
        assert_eq!(item.title, "Atom entry");
        assert_eq!(item.author, "Bob");
        assert_eq!(item.more_info, "https://example.com/atom/1");
        assert!(item.content.contains("Hello"));
    }
}
