//! DOM-like render surface
//!
//! The sandbox renders a submission into this owned tree; the assertion
//! runner observes it through `MountedView`, a read-only handle. The
//! view exposes lookups only - nothing here can mutate the mounted
//! output or reach back into the host.

/// One node of the rendered tree
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    Element(Element),
    Text(String),
}

/// A rendered element: tag, attributes in source order, children
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    pub tag: String,
    pub attrs: Vec<(String, String)>,
    pub children: Vec<Node>,
}

impl Element {
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    /// Concatenated text of this element's subtree, in document order
    pub fn text_content(&self) -> String {
        let mut out = String::new();
        collect_text(&self.children, &mut out);
        out
    }
}

fn collect_text(nodes: &[Node], out: &mut String) {
    for node in nodes {
        match node {
            Node::Text(text) => out.push_str(text),
            Node::Element(el) => collect_text(&el.children, out),
        }
    }
}

fn collect_by_tag<'a>(nodes: &'a [Node], tag: &str, out: &mut Vec<&'a Element>) {
    for node in nodes {
        if let Node::Element(el) = node {
            if el.tag == tag {
                out.push(el);
            }
            collect_by_tag(&el.children, tag, out);
        }
    }
}

/// Read-only handle over one mounted subtree
///
/// Holds the top-level nodes a mount produced. An empty component body
/// mounts an empty view, so assertions against it fail cleanly instead
/// of erroring.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountedView {
    nodes: Vec<Node>,
}

impl MountedView {
    pub(crate) fn new(nodes: Vec<Node>) -> Self {
        Self { nodes }
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// First element with the given tag, in document order
    pub fn find(&self, tag: &str) -> Option<&Element> {
        let mut matches = Vec::new();
        collect_by_tag(&self.nodes, tag, &mut matches);
        matches.into_iter().next()
    }

    /// All elements with the given tag, in document order
    pub fn find_all(&self, tag: &str) -> Vec<&Element> {
        let mut matches = Vec::new();
        collect_by_tag(&self.nodes, tag, &mut matches);
        matches
    }

    pub fn count(&self, tag: &str) -> usize {
        self.find_all(tag).len()
    }

    pub fn exists(&self, tag: &str) -> bool {
        self.find(tag).is_some()
    }

    /// Text content of the first matching element
    pub fn text(&self, tag: &str) -> Option<String> {
        self.find(tag).map(Element::text_content)
    }

    /// Attribute value of the first matching element
    pub fn attr(&self, tag: &str, name: &str) -> Option<String> {
        self.find(tag)
            .and_then(|el| el.attr(name))
            .map(str::to_string)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_view() -> MountedView {
        // <div class="card">
        //   <h1>"Hello"</h1>
        //   <p>"first"</p>
        //   <p><span>"second"</span></p>
        // </div>
        MountedView::new(vec![Node::Element(Element {
            tag: "div".to_string(),
            attrs: vec![("class".to_string(), "card".to_string())],
            children: vec![
                Node::Element(Element {
                    tag: "h1".to_string(),
                    attrs: vec![],
                    children: vec![Node::Text("Hello".to_string())],
                }),
                Node::Element(Element {
                    tag: "p".to_string(),
                    attrs: vec![],
                    children: vec![Node::Text("first".to_string())],
                }),
                Node::Element(Element {
                    tag: "p".to_string(),
                    attrs: vec![],
                    children: vec![Node::Element(Element {
                        tag: "span".to_string(),
                        attrs: vec![],
                        children: vec![Node::Text("second".to_string())],
                    })],
                }),
            ],
        })])
    }

    #[test]
    fn test_find_is_document_order() {
        let view = sample_view();
        assert_eq!(view.find("div").unwrap().tag, "div");
        assert_eq!(view.text("p"), Some("first".to_string()));
    }

    #[test]
    fn test_count_is_recursive() {
        let view = sample_view();
        assert_eq!(view.count("p"), 2);
        assert_eq!(view.count("span"), 1);
        assert_eq!(view.count("ul"), 0);
    }

    #[test]
    fn test_text_content_concatenates_subtree() {
        let view = sample_view();
        assert_eq!(view.find("div").unwrap().text_content(), "Hellofirstsecond");
    }

    #[test]
    fn test_attr_lookup() {
        let view = sample_view();
        assert_eq!(view.attr("div", "class"), Some("card".to_string()));
        assert_eq!(view.attr("div", "id"), None);
        assert_eq!(view.attr("nav", "class"), None);
    }

    #[test]
    fn test_empty_view() {
        let view = MountedView::new(vec![]);
        assert!(view.is_empty());
        assert!(!view.exists("h1"));
        assert_eq!(view.text("h1"), None);
        assert_eq!(view.count("p"), 0);
    }
}
