//! A lenient markup reader producing a neutral node tree
//!
//! Published documents only use a handful of elements, but templates are
//! hand-authored and story formats wrap the data in arbitrary HTML, so the
//! reader never fails: stray close tags are dropped, unclosed elements are
//! closed at the end of input, and markup the tokenizer rejects is kept as
//! text. Nesting deeper than [`MAX_DEPTH`] is flattened.
//!
//! [`MAX_DEPTH`]: constant.MAX_DEPTH.html

use quick_xml::escape::{resolve_predefined_entity, unescape_with};
use quick_xml::events::Event;
use quick_xml::Reader;
use std::ops::Range;

/// Elements that never have children
const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "param", "source",
    "track", "wbr",
];

/// Elements whose contents are not markup
const RAW_TEXT_ELEMENTS: &[&str] = &["script", "style", "textarea", "title"];

/// Deepest element nesting kept in the tree. Elements opened below it become
/// childless siblings
pub const MAX_DEPTH: usize = 256;

#[derive(Clone, Debug, PartialEq)]
pub enum Node {
    Element(Element),
    Text(String),
}

#[derive(Clone, Debug, PartialEq)]
pub struct Element {
    /// Lower-cased tag name
    pub name: String,
    pub attrs: Vec<(String, String)>,
    pub children: Vec<Node>,

    /// Byte range of the start tag in the source
    pub span: Range<usize>,
}

impl Element {
    fn new(name: String, attrs: Vec<(String, String)>, span: Range<usize>) -> Self {
        Element {
            name,
            attrs,
            children: Vec::new(),
            span,
        }
    }

    /// Value of the named attribute
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// Direct children that are elements
    pub fn child_elements(&self) -> impl Iterator<Item = &Element> {
        self.children.iter().filter_map(|node| match node {
            Node::Element(e) => Some(e),
            Node::Text(_) => None,
        })
    }

    /// All descendants named `name`, in document order
    pub fn descendants<'a>(&'a self, name: &str) -> Vec<&'a Element> {
        find_all(&self.children, name)
    }

    /// Text directly inside this element, ignoring child elements
    pub fn own_text(&self) -> String {
        self.children
            .iter()
            .filter_map(|node| match node {
                Node::Text(t) => Some(t.as_str()),
                Node::Element(_) => None,
            })
            .collect()
    }

    /// Concatenated text of this element and its descendants
    pub fn text(&self) -> String {
        let mut out = String::new();
        walk(&self.children, |node| {
            if let Node::Text(t) = node {
                out.push_str(t);
            }
        });
        out
    }
}

/// All elements named `name` anywhere in `nodes`, in document order
pub fn find_all<'a>(nodes: &'a [Node], name: &str) -> Vec<&'a Element> {
    let mut out = Vec::new();
    walk(nodes, |node| match node {
        Node::Element(e) if e.name == name => out.push(e),
        _ => {}
    });
    out
}

/// All elements carrying the attribute `attr` anywhere in `nodes`
pub fn find_with_attr<'a>(nodes: &'a [Node], attr: &str) -> Vec<&'a Element> {
    let mut out = Vec::new();
    walk(nodes, |node| match node {
        Node::Element(e) if e.attr(attr).is_some() => out.push(e),
        _ => {}
    });
    out
}

/// Visits every node in document order without recursing
fn walk<'a, F: FnMut(&'a Node)>(nodes: &'a [Node], mut visit: F) {
    let mut pending = vec![nodes.iter()];
    loop {
        let next = match pending.last_mut() {
            Some(iter) => iter.next(),
            None => break,
        };
        match next {
            Some(node) => {
                visit(node);
                if let Node::Element(e) = node {
                    pending.push(e.children.iter());
                }
            }
            None => {
                pending.pop();
            }
        }
    }
}

fn reader_at(src: &str) -> Reader<&[u8]> {
    let mut reader = Reader::from_str(src);
    let config = reader.config_mut();
    config.trim_text(false);
    config.check_end_names = false;
    config.allow_unmatched_ends = true;
    reader
}

/// Parses `src` into a list of top-level nodes
pub fn parse(src: &str) -> Vec<Node> {
    let mut tree = Tree::default();

    // Byte offset of the current reader's input within `src`. The reader is
    // restarted past raw text and past anything it rejects
    let mut base = 0;
    let mut reader = reader_at(src);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        let before = base + reader.buffer_position() as usize;
        let event = reader.read_event_into(&mut buf);
        let after = base + reader.buffer_position() as usize;
        match event {
            Ok(Event::Start(ref e)) | Ok(Event::Empty(ref e)) => {
                let name = String::from_utf8_lossy(e.name().as_ref()).to_ascii_lowercase();
                if !name.starts_with(|c: char| c.is_ascii_alphabetic()) {
                    tree.push_text(&src[before..after]);
                    continue;
                }
                let attrs = e
                    .html_attributes()
                    .flatten()
                    .map(|attr| {
                        let key = String::from_utf8_lossy(attr.key.as_ref()).to_ascii_lowercase();
                        let value = decode_entities(&String::from_utf8_lossy(&attr.value));
                        (key, value)
                    })
                    .collect();
                let mut element = Element::new(name, attrs, before..after);
                let self_closing = matches!(event, Ok(Event::Empty(_)));

                if self_closing || VOID_ELEMENTS.contains(&element.name.as_str()) {
                    tree.push_node(Node::Element(element));
                } else if RAW_TEXT_ELEMENTS.contains(&element.name.as_str()) {
                    let (text_end, resume) = match find_close_tag(src, after, &element.name) {
                        Some(found) => found,
                        None => (src.len(), src.len()),
                    };
                    let text = &src[after..text_end];
                    if !text.is_empty() {
                        element.children.push(Node::Text(decode_entities(text)));
                    }
                    tree.push_node(Node::Element(element));
                    base = resume;
                    reader = reader_at(&src[base..]);
                } else {
                    tree.open(element);
                }
            }
            Ok(Event::End(ref e)) => {
                let name = String::from_utf8_lossy(e.name().as_ref()).to_ascii_lowercase();
                tree.close(&name);
            }
            Ok(Event::Eof) => break,
            Ok(Event::Comment(_))
            | Ok(Event::Decl(_))
            | Ok(Event::PI(_))
            | Ok(Event::DocType(_)) => {}
            // Text, character data and entity references
            Ok(_) => tree.push_text(&src[before..after]),
            Err(e) => {
                tracing::debug!(at = before, error = %e, "keeping unreadable markup as text");
                let resume = src[before..]
                    .char_indices()
                    .skip(1)
                    .find(|(_, c)| *c == '<')
                    .map(|(i, _)| before + i)
                    .unwrap_or_else(|| src.len());
                tree.push_text(&src[before..resume]);
                if resume >= src.len() {
                    break;
                }
                base = resume;
                reader = reader_at(&src[base..]);
            }
        }
    }

    tree.finish()
}

/// Finds the close tag of the raw-text element `name` at or after `from`,
/// ignoring case. Returns where the text ends and where markup resumes
fn find_close_tag(src: &str, from: usize, name: &str) -> Option<(usize, usize)> {
    let bytes = src.as_bytes();
    let mut at = from;
    while let Some(offset) = src[at..].find("</") {
        let start = at + offset;
        let name_end = start + 2 + name.len();
        let matches = bytes
            .get(start + 2..name_end)
            .map_or(false, |n| n.eq_ignore_ascii_case(name.as_bytes()));
        if matches {
            let resume = src[name_end..]
                .find('>')
                .map(|gt| name_end + gt + 1)
                .unwrap_or_else(|| src.len());
            return Some((start, resume));
        }
        at = start + 2;
    }
    None
}

/// Open elements and finished top-level nodes
#[derive(Default)]
struct Tree {
    root: Vec<Node>,
    stack: Vec<Element>,
    flattened: bool,
}

impl Tree {
    fn push_node(&mut self, node: Node) {
        match self.stack.last_mut() {
            Some(parent) => parent.children.push(node),
            None => self.root.push(node),
        }
    }

    /// Adds text, joining it to a text node directly before it
    fn push_text(&mut self, raw: &str) {
        if raw.is_empty() {
            return;
        }
        let text = decode_entities(raw);
        let siblings = match self.stack.last_mut() {
            Some(parent) => &mut parent.children,
            None => &mut self.root,
        };
        match siblings.last_mut() {
            Some(Node::Text(last)) => last.push_str(&text),
            _ => siblings.push(Node::Text(text)),
        }
    }

    fn open(&mut self, element: Element) {
        if self.stack.len() < MAX_DEPTH {
            self.stack.push(element);
            return;
        }
        if !self.flattened {
            tracing::warn!(
                depth = MAX_DEPTH,
                at = element.span.start,
                "markup nested too deeply, flattening"
            );
            self.flattened = true;
        }
        self.push_node(Node::Element(element));
    }

    fn close(&mut self, name: &str) {
        if let Some(depth) = self.stack.iter().rposition(|e| e.name == name) {
            while self.stack.len() > depth {
                if let Some(done) = self.stack.pop() {
                    self.push_node(Node::Element(done));
                }
            }
        }
    }

    fn finish(mut self) -> Vec<Node> {
        while let Some(done) = self.stack.pop() {
            self.push_node(Node::Element(done));
        }
        self.root
    }
}

/// Replaces character references with the characters they stand for. Text
/// holding a reference that cannot be resolved is kept as written
pub fn decode_entities(s: &str) -> String {
    if !s.contains('&') {
        return s.to_string();
    }
    let resolve = |entity: &str| match entity {
        "nbsp" => Some("\u{a0}"),
        _ => resolve_predefined_entity(entity),
    };
    match unescape_with(s, resolve) {
        Ok(decoded) => decoded.into_owned(),
        Err(_) => s.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn only_element(nodes: &[Node]) -> &Element {
        match nodes {
            [Node::Element(e)] => e,
            other => panic!("expected a single element, got {:?}", other),
        }
    }

    #[test]
    fn attributes_in_every_style() {
        let nodes = parse(r#"<tw-passagedata pid="1" name='It&apos;s' tags=a hidden>x</tw-passagedata>"#);
        let e = only_element(&nodes);
        assert_eq!(e.name, "tw-passagedata");
        assert_eq!(e.attr("pid"), Some("1"));
        assert_eq!(e.attr("name"), Some("It's"));
        assert_eq!(e.attr("tags"), Some("a"));
        assert_eq!(e.attr("hidden"), Some(""));
        assert_eq!(e.text(), "x");
    }

    #[test]
    fn nesting_and_spans() {
        let src = "<a><b x=\"1\"></b><b></b></a>";
        let nodes = parse(src);
        let bs = find_all(&nodes, "b");
        assert_eq!(bs.len(), 2);
        assert_eq!(&src[bs[0].span.clone()], "<b x=\"1\">");
        assert_eq!(only_element(&nodes).child_elements().count(), 2);
    }

    #[test]
    fn void_and_self_closing() {
        let nodes = parse("<div><br><img src=x><tw-command step=0 /></div>");
        let div = only_element(&nodes);
        let names: Vec<_> = div.child_elements().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["br", "img", "tw-command"]);
    }

    #[test]
    fn raw_text_is_not_markup() {
        let nodes = parse("<script>if (a < b) { x = '</div>'; }</SCRIPT><p>after</p>");
        assert_eq!(nodes.len(), 2);
        let script = match &nodes[0] {
            Node::Element(e) => e,
            _ => panic!(),
        };
        assert_eq!(script.text(), "if (a < b) { x = '</div>'; }");
        assert_eq!(find_all(&nodes, "p")[0].text(), "after");
    }

    #[test]
    fn many_raw_text_elements() {
        let src = "<style>a{}</style>".repeat(200) + "<p>end</p>";
        let nodes = parse(&src);
        assert_eq!(find_all(&nodes, "style").len(), 200);
        assert_eq!(find_all(&nodes, "p").len(), 1);
    }

    #[test]
    fn stray_and_unclosed_tags() {
        let nodes = parse("</nope><a><b>text</a> tail < 3");
        let a = find_all(&nodes, "a");
        assert_eq!(a.len(), 1);
        assert_eq!(a[0].text(), "text");
        assert_eq!(find_all(&nodes, "b").len(), 1);
        let tail: String = nodes
            .iter()
            .filter_map(|n| match n {
                Node::Text(t) => Some(t.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(tail, " tail < 3");
    }

    #[test]
    fn own_text_skips_children() {
        let nodes = parse("<p>one<b>two</b>three</p>");
        let p = only_element(&nodes);
        assert_eq!(p.own_text(), "onethree");
        assert_eq!(p.text(), "onetwothree");
    }

    #[test]
    fn lookup_by_attribute() {
        let nodes = parse("<div><span data-x=1></span><i></i></div><b data-x></b>");
        let found: Vec<_> = find_with_attr(&nodes, "data-x")
            .iter()
            .map(|e| e.name.as_str())
            .collect();
        assert_eq!(found, vec!["span", "b"]);
    }

    #[test]
    fn comments_and_doctype_are_skipped() {
        let nodes = parse("<!DOCTYPE html><!-- <a> --><a></a>");
        assert_eq!(find_all(&nodes, "a").len(), 1);
    }

    #[test]
    fn deep_nesting_is_flattened() {
        let depth = 50_000;
        let src = format!("<section>{}<p>deep</p>", "<div>".repeat(depth));
        let nodes = parse(&src);
        assert_eq!(find_all(&nodes, "div").len(), depth);
        assert_eq!(find_all(&nodes, "p").len(), 1);
        assert_eq!(find_all(&nodes, "section")[0].text(), "deep");
    }

    #[test]
    fn entities() {
        assert_eq!(decode_entities("a &amp; b &lt;c&gt; &#39;&#x41;"), "a & b <c> 'A");
        assert_eq!(decode_entities("fish &amp; chips&nbsp;"), "fish & chips\u{a0}");
        assert_eq!(decode_entities("fish & chips &bogus;"), "fish & chips &bogus;");
    }
}
