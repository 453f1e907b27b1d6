//! Builds the sandbox `Dom` from markup.
//!
//! Tree construction is html5ever's (through `scraper`), so generated markup
//! nests, recovers and decodes character references exactly as a browser would.
//! The result is copied into the owned arena the sandbox mutates.

use scraper::{Html, Node};

use crate::dom::{Attribute, Dom, Element, NodeKind};

/// Parses a document. Never fails; missing `html`/`head`/`body` are implied.
pub fn parse_html(source: &str) -> Dom {
    let parsed = Html::parse_document(source);
    let mut dom = Dom::new();

    let mut stack = vec![(parsed.tree.root(), Dom::DOCUMENT)];
    while let Some((node, parent)) = stack.pop() {
        let id = match node.value() {
            Node::Document | Node::Fragment => parent,
            Node::Doctype(doctype) => dom.append(parent, NodeKind::Doctype(doctype.name().to_string())),
            Node::Comment(comment) => dom.append(parent, NodeKind::Comment(String::from(&**comment))),
            Node::Text(text) => {
                dom.append(parent, NodeKind::Text(String::from(&**text)));
                continue;
            }
            Node::Element(el) => dom.append(
                parent,
                NodeKind::Element(Element {
                    name: el.name().to_string(),
                    attrs: el
                        .attrs()
                        .map(|(name, value)| Attribute {
                            name: name.to_string(),
                            value: value.to_string(),
                        })
                        .collect(),
                }),
            ),
            _ => continue,
        };
        let children: Vec<_> = node.children().collect();
        for child in children.into_iter().rev() {
            stack.push((child, id));
        }
    }
    dom
}
