//! Parsed page tree with explicit node identity.
//!
//! `scraper` hands out references tied to the lifetime of its `Html` value, and
//! that value is not `Send`. The page is therefore copied into an owned arena
//! right after parsing. Every element receives a [`NodeKey`] sequence number at
//! parse time, which is what the rest of the crate uses as node identity.

use scraper::{ElementRef, Html};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Stable identity of an element in a [`Page`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeKey(usize);

impl fmt::Display for NodeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone)]
struct PageNode {
    tag: String,
    attrs: Vec<(String, String)>,
    text: String,
    children: Vec<NodeKey>,
}

/// An HTML document reduced to its elements.
#[derive(Debug, Clone)]
pub struct Page {
    nodes: Vec<PageNode>,
}

impl Page {
    /// Parse a full HTML document. Parsing never fails; malformed markup is
    /// repaired by the HTML5 tree builder.
    pub fn parse(html: &str) -> Self {
        let document = Html::parse_document(html);
        let mut nodes: Vec<PageNode> = Vec::new();

        // Children are pushed in reverse so they pop in source order, which keeps
        // key assignment in depth-first pre-order.
        let mut stack: Vec<(ElementRef<'_>, Option<NodeKey>)> = vec![(document.root_element(), None)];

        while let Some((element, parent)) = stack.pop() {
            let key = NodeKey(nodes.len());
            let value = element.value();

            let mut text = String::new();
            let mut child_elements = Vec::new();
            for child in element.children() {
                if let Some(child_element) = ElementRef::wrap(child) {
                    child_elements.push(child_element);
                } else if let Some(child_text) = child.value().as_text() {
                    text.push_str(child_text);
                }
            }

            nodes.push(PageNode {
                tag: value.name().to_string(),
                attrs: value
                    .attrs()
                    .map(|(name, val)| (name.to_string(), val.to_string()))
                    .collect(),
                text,
                children: Vec::new(),
            });

            if let Some(parent) = parent {
                nodes[parent.0].children.push(key);
            }

            for child_element in child_elements.into_iter().rev() {
                stack.push((child_element, Some(key)));
            }
        }

        Page { nodes }
    }

    /// The document element (`<html>`).
    pub fn root(&self) -> NodeKey {
        NodeKey(0)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn tag(&self, key: NodeKey) -> Option<&str> {
        self.nodes.get(key.0).map(|n| n.tag.as_str())
    }

    pub fn attr(&self, key: NodeKey, name: &str) -> Option<&str> {
        self.nodes.get(key.0).and_then(|n| {
            n.attrs
                .iter()
                .find(|(attr, _)| attr.eq_ignore_ascii_case(name))
                .map(|(_, val)| val.as_str())
        })
    }

    /// Concatenated text of the element's direct text children.
    pub fn text(&self, key: NodeKey) -> Option<&str> {
        self.nodes.get(key.0).map(|n| n.text.as_str())
    }

    pub fn children(&self, key: NodeKey) -> &[NodeKey] {
        self.nodes
            .get(key.0)
            .map(|n| n.children.as_slice())
            .unwrap_or(&[])
    }

    /// All elements with the given tag name, in document order.
    pub fn elements_by_tag<'a>(&'a self, tag: &'a str) -> impl Iterator<Item = NodeKey> + 'a {
        self.nodes
            .iter()
            .enumerate()
            .filter(move |(_, n)| n.tag.eq_ignore_ascii_case(tag))
            .map(|(i, _)| NodeKey(i))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_root_is_html_element() {
        let page = Page::parse("<p>hello</p>");
        assert_eq!(page.tag(page.root()), Some("html"));
    }

    #[test]
    fn test_keys_follow_source_order() {
        let page = Page::parse(
            "<html><head><title>t</title></head><body><div><span></span></div><p></p></body></html>",
        );
        let tags: Vec<&str> = (0..page.len())
            .map(|i| page.tag(NodeKey(i)).unwrap())
            .collect();
        assert_eq!(tags, vec!["html", "head", "title", "body", "div", "span", "p"]);
    }

    #[test]
    fn test_script_text_and_attributes() {
        let page = Page::parse(
            r#"<html><head><script SRC="/lib.js"></script><script>var a = "<b>";</script></head></html>"#,
        );
        let scripts: Vec<NodeKey> = page.elements_by_tag("script").collect();
        assert_eq!(scripts.len(), 2);
        assert_eq!(page.attr(scripts[0], "src"), Some("/lib.js"));
        assert_eq!(page.text(scripts[0]), Some(""));
        assert_eq!(page.attr(scripts[1], "src"), None);
        assert_eq!(page.text(scripts[1]), Some(r#"var a = "<b>";"#));
    }

    #[test]
    fn test_text_nodes_are_not_elements() {
        let page = Page::parse("<html><body>one<i>two</i>three</body></html>");
        let body = page.elements_by_tag("body").next().unwrap();
        assert_eq!(page.children(body).len(), 1);
        assert_eq!(page.text(body), Some("onethree"));
    }

    #[test]
    fn test_deeply_nested_markup() {
        let html = format!("{}{}", "<div>".repeat(2000), "</div>".repeat(2000));
        let page = Page::parse(&html);
        assert!(page.len() > 2000);
    }
}
