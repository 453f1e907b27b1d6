//! CSS selector queries over the sandbox `Dom`.
//!
//! Selectors are parsed and matched by `scraper`. Matching runs against a
//! fresh parse of the current markup, and hits map back to arena nodes by their
//! position in document order, which a parse of serialized output preserves.

use std::collections::HashMap;

use scraper::Html;

use crate::dom::{Dom, NodeId};
use crate::error::{PreviewError, PreviewResult};

#[derive(Debug, Clone)]
pub struct Selector {
    source: String,
    compiled: scraper::Selector,
}

impl Selector {
    pub fn parse(source: &str) -> PreviewResult<Self> {
        let compiled = scraper::Selector::parse(source).map_err(|e| PreviewError::InvalidSelector {
            selector: source.to_string(),
            reason: e.to_string(),
        })?;
        Ok(Self {
            source: source.to_string(),
            compiled,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// Matching elements of `dom`, in document order.
    pub fn select(&self, dom: &Dom) -> Vec<NodeId> {
        let mirror = Html::parse_document(&dom.serialize());
        let positions: HashMap<_, usize> = mirror
            .tree
            .root()
            .descendants()
            .filter(|n| n.value().is_element())
            .enumerate()
            .map(|(i, n)| (n.id(), i))
            .collect();
        let elements = dom.elements();
        mirror
            .select(&self.compiled)
            .filter_map(|el| positions.get(&el.id()))
            .filter_map(|&i| elements.get(i).copied())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_html;
    use pretty_assertions::assert_eq;

    fn tags(dom: &Dom, selector: &str) -> Vec<String> {
        Selector::parse(selector)
            .unwrap()
            .select(dom)
            .into_iter()
            .map(|n| dom.tag_name(n).unwrap().to_string())
            .collect()
    }

    #[test]
    fn test_compound_and_list_matching() {
        let dom = parse_html(
            "<div id=\"hero\" class=\"card wide\" data-ai-selected=\"3\"><p class=\"ai-selected-element\">a</p></div><span class=\"card\">b</span>",
        );
        assert_eq!(tags(&dom, "div.card.wide"), vec!["div"]);
        assert_eq!(tags(&dom, "#hero"), vec!["div"]);
        assert_eq!(tags(&dom, "[data-ai-selected]"), vec!["div"]);
        assert_eq!(tags(&dom, ".card"), vec!["div", "span"]);
        assert_eq!(tags(&dom, ".ai-selected-element, [data-ai-selected]"), vec!["div", "p"]);
        assert_eq!(tags(&dom, "#hero > p"), vec!["p"]);
        assert!(tags(&dom, ".narrow").is_empty());
    }

    #[test]
    fn test_matches_follow_mutations() {
        let mut dom = parse_html("<h1>A</h1><p>B</p>");
        let p = Selector::parse("p").unwrap().select(&dom)[0];
        dom.element_mut(p).unwrap().add_class("picked");
        assert_eq!(Selector::parse(".picked").unwrap().select(&dom), vec![p]);

        let h1 = Selector::parse("h1").unwrap().select(&dom)[0];
        dom.detach(h1);
        assert_eq!(Selector::parse(".picked").unwrap().select(&dom), vec![p]);
    }

    #[test]
    fn test_invalid_selector() {
        assert!(matches!(
            Selector::parse("div >"),
            Err(PreviewError::InvalidSelector { .. })
        ));
        assert!(Selector::parse("").is_err());
        assert!(Selector::parse("#").is_err());
    }
}
