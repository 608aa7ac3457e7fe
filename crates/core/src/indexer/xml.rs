//! Feed parsing for the torznab/newznab XML dialects.
//!
//! Both protocols speak RSS 2.0 extended with namespaced `attr` elements
//! (`<torznab:attr name=".." value=".."/>`). Parsing never panics; anything
//! malformed becomes a [`SearchError::Protocol`].

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use super::types::{CapsCategory, SearchError};

/// A raw `<item>` from a search feed, before normalization.
#[derive(Debug, Clone, Default)]
pub struct FeedItem {
    pub title: String,
    pub link: Option<String>,
    pub guid: Option<String>,
    pub pub_date: Option<String>,
    /// Details page, when the feed provides one.
    pub comments: Option<String>,
    pub enclosure_url: Option<String>,
    pub enclosure_length: Option<u64>,
    /// Category codes from `<category>` elements.
    pub categories: Vec<u32>,
    /// Namespaced attr elements, in document order (names can repeat).
    pub attrs: Vec<(String, String)>,
}

impl FeedItem {
    /// First attr with the given name.
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    /// All category codes: `<category>` elements plus `category` attrs.
    pub fn all_categories(&self) -> Vec<u32> {
        let mut codes = self.categories.clone();
        for (name, value) in &self.attrs {
            if name == "category" {
                if let Ok(code) = value.parse::<u32>() {
                    if !codes.contains(&code) {
                        codes.push(code);
                    }
                }
            }
        }
        codes
    }
}

fn read_attr_pair(e: &BytesStart<'_>) -> Option<(String, String)> {
    let mut name = None;
    let mut value = None;
    for attr in e.attributes().flatten() {
        match attr.key.local_name().as_ref() {
            b"name" => name = attr.unescape_value().ok().map(|v| v.into_owned()),
            b"value" => value = attr.unescape_value().ok().map(|v| v.into_owned()),
            _ => {}
        }
    }
    Some((name?, value?))
}

fn read_enclosure(e: &BytesStart<'_>, item: &mut FeedItem) {
    for attr in e.attributes().flatten() {
        match attr.key.local_name().as_ref() {
            b"url" => {
                item.enclosure_url = attr.unescape_value().ok().map(|v| v.into_owned());
            }
            b"length" => {
                item.enclosure_length = attr
                    .unescape_value()
                    .ok()
                    .and_then(|v| v.parse::<u64>().ok());
            }
            _ => {}
        }
    }
}

/// Extract an `<error code=".." description=".."/>` element, if present.
fn read_error(e: &BytesStart<'_>) -> SearchError {
    let mut code = String::new();
    let mut description = String::new();
    for attr in e.attributes().flatten() {
        match attr.key.local_name().as_ref() {
            b"code" => code = attr.unescape_value().unwrap_or_default().into_owned(),
            b"description" => {
                description = attr.unescape_value().unwrap_or_default().into_owned()
            }
            _ => {}
        }
    }
    SearchError::ApiError(format!("indexer error {}: {}", code, description))
}

/// Parse a search feed into raw items.
///
/// An `<error>` element anywhere in the document surfaces as
/// [`SearchError::ApiError`] carrying the indexer's own description.
pub fn parse_feed(xml: &str) -> Result<Vec<FeedItem>, SearchError> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut items = Vec::new();
    let mut current: Option<FeedItem> = None;
    let mut current_tag: Option<String> = None;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                let local = e.local_name().as_ref().to_vec();
                if local == b"item" {
                    current = Some(FeedItem::default());
                    current_tag = None;
                } else if local == b"error" {
                    return Err(read_error(&e));
                } else if current.is_some() {
                    current_tag = Some(String::from_utf8_lossy(&local).into_owned());
                }
            }
            Ok(Event::Empty(e)) => {
                let local = e.local_name().as_ref().to_vec();
                if local == b"error" {
                    return Err(read_error(&e));
                }
                if let Some(ref mut item) = current {
                    match local.as_slice() {
                        b"attr" => {
                            if let Some(pair) = read_attr_pair(&e) {
                                item.attrs.push(pair);
                            }
                        }
                        b"enclosure" => read_enclosure(&e, item),
                        _ => {}
                    }
                }
            }
            Ok(Event::Text(t)) => {
                let text = t
                    .unescape()
                    .map_err(|e| SearchError::Protocol(e.to_string()))?
                    .into_owned();
                apply_text(&mut current, &current_tag, text);
            }
            Ok(Event::CData(t)) => {
                let text = String::from_utf8_lossy(&t).into_owned();
                apply_text(&mut current, &current_tag, text);
            }
            Ok(Event::End(e)) => {
                if e.local_name().as_ref() == b"item" {
                    if let Some(item) = current.take() {
                        items.push(item);
                    }
                }
                current_tag = None;
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(SearchError::Protocol(e.to_string())),
            Ok(_) => {}
        }
    }

    Ok(items)
}

fn apply_text(current: &mut Option<FeedItem>, tag: &Option<String>, text: String) {
    let (Some(item), Some(tag)) = (current.as_mut(), tag.as_deref()) else {
        return;
    };
    match tag {
        "title" => item.title = text,
        "link" => item.link = Some(text),
        "guid" => item.guid = Some(text),
        "pubDate" => item.pub_date = Some(text),
        "comments" => item.comments = Some(text),
        "size" => {
            if item.enclosure_length.is_none() {
                item.enclosure_length = text.parse::<u64>().ok();
            }
        }
        "category" => {
            if let Ok(code) = text.parse::<u32>() {
                item.categories.push(code);
            }
        }
        _ => {}
    }
}

/// Parse a `?t=caps` response into the advertised category list.
///
/// Both top-level categories and their subcategories are returned flat.
pub fn parse_caps(xml: &str) -> Result<Vec<CapsCategory>, SearchError> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut categories = Vec::new();

    loop {
        let event = match reader.read_event() {
            Ok(Event::Eof) => break,
            Ok(e) => e,
            Err(e) => return Err(SearchError::Protocol(e.to_string())),
        };

        let (Event::Start(e) | Event::Empty(e)) = event else {
            continue;
        };
        let local = e.local_name().as_ref().to_vec();
        if local == b"error" {
            return Err(read_error(&e));
        }
        if local != b"category" && local != b"subcat" {
            continue;
        }

        let mut id = None;
        let mut name = String::new();
        for attr in e.attributes().flatten() {
            match attr.key.local_name().as_ref() {
                b"id" => {
                    id = attr
                        .unescape_value()
                        .ok()
                        .and_then(|v| v.parse::<u32>().ok());
                }
                b"name" => name = attr.unescape_value().unwrap_or_default().into_owned(),
                _ => {}
            }
        }
        if let Some(id) = id {
            categories.push(CapsCategory { id, name });
        }
    }

    Ok(categories)
}

#[cfg(test)]
mod tests {
    use super::*;

    const TORZNAB_FEED: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0" xmlns:torznab="http://torznab.com/schemas/2015/feed">
  <channel>
    <title>Example Indexer</title>
    <item>
      <title>Cave Story Plus v1.2</title>
      <guid>https://indexer.example/details/12345</guid>
      <link>https://indexer.example/dl/12345.torrent</link>
      <comments>https://indexer.example/details/12345</comments>
      <pubDate>Mon, 06 Jun 2016 08:44:00 +0000</pubDate>
      <category>4050</category>
      <enclosure url="https://indexer.example/dl/12345.torrent" length="734003200" type="application/x-bittorrent"/>
      <torznab:attr name="category" value="4050"/>
      <torznab:attr name="seeders" value="41"/>
      <torznab:attr name="peers" value="57"/>
    </item>
  </channel>
</rss>"#;

    const NEWZNAB_FEED: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0" xmlns:newznab="http://www.newznab.com/DTD/2010/feeds/attributes/">
  <channel>
    <item>
      <title><![CDATA[Hollow.Knight.Silksong-GROUP]]></title>
      <guid>abc-def-123</guid>
      <link>https://nzbs.example/getnzb/abc.nzb</link>
      <pubDate>Tue, 07 Jun 2016 10:00:00 +0000</pubDate>
      <newznab:attr name="category" value="4010"/>
      <newznab:attr name="size" value="524288000"/>
      <newznab:attr name="grabs" value="108"/>
      <newznab:attr name="poster" value="poster@example.org"/>
      <newznab:attr name="group" value="alt.binaries.games"/>
    </item>
  </channel>
</rss>"#;

    #[test]
    fn test_parse_torznab_feed() {
        let items = parse_feed(TORZNAB_FEED).unwrap();
        assert_eq!(items.len(), 1);

        let item = &items[0];
        assert_eq!(item.title, "Cave Story Plus v1.2");
        assert_eq!(item.guid.as_deref(), Some("https://indexer.example/details/12345"));
        assert_eq!(
            item.enclosure_url.as_deref(),
            Some("https://indexer.example/dl/12345.torrent")
        );
        assert_eq!(item.enclosure_length, Some(734003200));
        assert_eq!(item.attr("seeders"), Some("41"));
        assert_eq!(item.attr("peers"), Some("57"));
        assert_eq!(item.all_categories(), vec![4050]);
    }

    #[test]
    fn test_parse_newznab_feed_cdata_title() {
        let items = parse_feed(NEWZNAB_FEED).unwrap();
        assert_eq!(items.len(), 1);

        let item = &items[0];
        assert_eq!(item.title, "Hollow.Knight.Silksong-GROUP");
        assert_eq!(item.attr("grabs"), Some("108"));
        assert_eq!(item.attr("poster"), Some("poster@example.org"));
        assert_eq!(item.attr("group"), Some("alt.binaries.games"));
        assert_eq!(item.all_categories(), vec![4010]);
    }

    #[test]
    fn test_parse_feed_error_element() {
        let xml = r#"<error code="100" description="Incorrect user credentials"/>"#;
        let err = parse_feed(xml).unwrap_err();
        match err {
            SearchError::ApiError(msg) => {
                assert!(msg.contains("100"));
                assert!(msg.contains("Incorrect user credentials"));
            }
            other => panic!("Expected ApiError, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_feed_malformed() {
        let err = parse_feed("<rss><channel><item></rss>").unwrap_err();
        assert!(matches!(err, SearchError::Protocol(_)));
    }

    #[test]
    fn test_parse_feed_empty_channel() {
        let xml = r#"<rss version="2.0"><channel><title>Empty</title></channel></rss>"#;
        assert!(parse_feed(xml).unwrap().is_empty());
    }

    #[test]
    fn test_parse_caps() {
        let xml = r#"<caps>
  <categories>
    <category id="4000" name="PC">
      <subcat id="4050" name="Games"/>
    </category>
    <category id="1000" name="Console"/>
  </categories>
</caps>"#;
        let cats = parse_caps(xml).unwrap();
        assert_eq!(cats.len(), 3);
        assert!(cats.contains(&CapsCategory {
            id: 4050,
            name: "Games".to_string()
        }));
    }

    #[test]
    fn test_parse_caps_error() {
        let xml = r#"<error code="101" description="API key missing"/>"#;
        assert!(matches!(
            parse_caps(xml).unwrap_err(),
            SearchError::ApiError(_)
        ));
    }
}
