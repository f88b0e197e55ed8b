//! Textrank: site-wide fragment frequencies used to drop repeated boilerplate.
//!
//! Every visible text node of a page is a fragment. Fragments that repeat
//! across the site more often than the configured limit (navigation, footers)
//! are dropped from the page text; the rest are kept in document order.

use crate::store::RankMap;
use scraper::{ElementRef, Html, Node};

/// Elements whose text is never visible content
const HIDDEN_ELEMENTS: [&str; 4] = ["script", "style", "noscript", "template"];
const HEADING_ELEMENTS: [&str; 6] = ["h1", "h2", "h3", "h4", "h5", "h6"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FragmentKind {
    Heading,
    ListItem,
    Text,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextFragment {
    pub text: String,
    pub kind: FragmentKind,
}

/// Collapse whitespace runs, newlines included, to single spaces and trim
pub fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn element_text(element: ElementRef<'_>) -> String {
    normalize_whitespace(&element.text().collect::<String>())
}

/// Visible text fragments of a page in document order.
///
/// A fragment is a heading or list item when it is the whole text of an
/// enclosing `h1`-`h6` or `li` element. Headings take precedence.
pub fn text_fragments(html: &str) -> Vec<TextFragment> {
    let document = Html::parse_document(html);
    let mut fragments = Vec::new();

    for node in document.root_element().descendants() {
        let Node::Text(raw) = node.value() else {
            continue;
        };
        let text = normalize_whitespace(raw);
        if text.is_empty() {
            continue;
        }

        let ancestors: Vec<ElementRef<'_>> = node.ancestors().filter_map(ElementRef::wrap).collect();
        if ancestors
            .iter()
            .any(|el| HIDDEN_ELEMENTS.contains(&el.value().name()))
        {
            continue;
        }

        let whole_text_of = |names: &[&str]| {
            ancestors
                .iter()
                .find(|el| names.contains(&el.value().name()))
                .is_some_and(|el| element_text(*el) == text)
        };
        let kind = if whole_text_of(&HEADING_ELEMENTS) {
            FragmentKind::Heading
        } else if whole_text_of(&["li"]) {
            FragmentKind::ListItem
        } else {
            FragmentKind::Text
        };

        fragments.push(TextFragment { text, kind });
    }

    fragments
}

/// Add every fragment of a page to the site-wide textrank
pub fn update_textrank(textrank: &mut RankMap, fragments: &[TextFragment]) {
    textrank.update(fragments.iter().map(|fragment| fragment.text.clone()));
}

/// Page text keeping fragments seen at most `limit` times across the site.
///
/// Headings become `\n\n<text>:\n` and list items `- <text>`; lines are
/// joined with newlines.
pub fn ranked_text(fragments: &[TextFragment], textrank: &RankMap, limit: u64) -> String {
    fragments
        .iter()
        .filter(|fragment| textrank.get(&fragment.text) <= limit)
        .map(|fragment| match fragment.kind {
            FragmentKind::Heading => format!("\n\n{}:\n", fragment.text),
            FragmentKind::ListItem => format!("- {}", fragment.text),
            FragmentKind::Text => fragment.text.clone(),
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"<html><head><title>Expo</title><style>p { color: red }</style></head>
<body>
  <nav><ul><li>Home</li><li><a href="/x">Tickets</a></li></ul></nav>
  <h2>Opening
      hours</h2>
  <p>Doors open at <b>9am</b></p>
  <script>var x = 1;</script>
</body></html>"#;

    #[test]
    fn test_fragments_in_document_order() {
        let fragments = text_fragments(PAGE);
        let texts: Vec<&str> = fragments.iter().map(|f| f.text.as_str()).collect();
        assert_eq!(
            texts,
            vec!["Expo", "Home", "Tickets", "Opening hours", "Doors open at", "9am"]
        );

        assert_eq!(fragments[1].kind, FragmentKind::ListItem);
        assert_eq!(fragments[2].kind, FragmentKind::ListItem);
        assert_eq!(fragments[3].kind, FragmentKind::Heading);
        assert_eq!(fragments[4].kind, FragmentKind::Text);
    }

    #[test]
    fn test_ranked_text_formatting() {
        let fragments = text_fragments(PAGE);
        let mut textrank = RankMap::new();
        update_textrank(&mut textrank, &fragments);

        assert_eq!(
            ranked_text(&fragments, &textrank, 4),
            "Expo\n- Home\n- Tickets\n\n\nOpening hours:\n\nDoors open at\n9am"
        );
    }

    #[test]
    fn test_frequency_limit_is_inclusive() {
        let fragments = vec![
            TextFragment {
                text: "Footer".to_string(),
                kind: FragmentKind::Text,
            },
            TextFragment {
                text: "Menu".to_string(),
                kind: FragmentKind::Text,
            },
            TextFragment {
                text: "Unique".to_string(),
                kind: FragmentKind::Text,
            },
        ];
        let mut textrank = RankMap::new();
        textrank.insert("Footer", 4);
        textrank.insert("Menu", 5);
        textrank.insert("Unique", 1);

        assert_eq!(ranked_text(&fragments, &textrank, 4), "Footer\nUnique");
    }

    #[test]
    fn test_placeholder_has_no_fragments() {
        assert!(text_fragments(crate::crawler::PLACEHOLDER_HTML).is_empty());
    }
}
