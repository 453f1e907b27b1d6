//! Builds the document handed to the isolated frame.

use std::sync::OnceLock;

use regex::Regex;

use crate::dom::escape_text;
use crate::instrument::instrumentation_markup;

const PLACEHOLDER_HEAD: &str = r#"<!DOCTYPE html>
<html>
<head>
<meta charset="UTF-8">
<meta name="viewport" content="width=device-width, initial-scale=1.0">
<title>Empty Project</title>
<style>
body { margin: 0; padding: 40px; font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', Roboto, sans-serif; background: #f8fafc; color: #334155; display: flex; flex-direction: column; align-items: center; justify-content: center; min-height: 100vh; }
.empty-state { text-align: center; max-width: 400px; }
.empty-state h1 { color: #64748b; margin-bottom: 16px; }
.empty-state p { color: #94a3b8; line-height: 1.6; }
</style>
</head>
<body>
<div class="empty-state">
<h1>No Content Yet</h1>
<p>Generate or edit your website to see the preview here.</p>
</div>
</body>
</html>"#;

const SHELL_STYLE: &str = "* { margin: 0; padding: 0; box-sizing: border-box; }\nbody { font-family: -apple-system, BlinkMacSystemFont, sans-serif; }";

#[derive(Debug, Clone)]
pub struct ComposeOptions {
    /// Inject the selection/patch instrumentation.
    pub editing: bool,
    /// Title used when the markup is a fragment and needs a shell.
    pub title: Option<String>,
}

impl Default for ComposeOptions {
    fn default() -> Self {
        Self {
            editing: true,
            title: None,
        }
    }
}

fn html_tag() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)<html[\s>/]").unwrap())
}

fn instrumented_marker() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"(?i)\bid\s*=\s*["']?ai-preview-script\b"#).unwrap())
}

pub fn compose(markup: &str, editing: bool) -> String {
    compose_with(
        markup,
        &ComposeOptions {
            editing,
            title: None,
        },
    )
}

pub fn compose_with(markup: &str, opts: &ComposeOptions) -> String {
    let document = if markup.trim().is_empty() {
        PLACEHOLDER_HEAD.to_string()
    } else if !html_tag().is_match(markup) {
        shell(markup, opts.title.as_deref())
    } else {
        markup.to_string()
    };

    if !opts.editing || instrumented_marker().is_match(&document) {
        return document;
    }
    inject(&document, &instrumentation_markup())
}

fn shell(fragment: &str, title: Option<&str>) -> String {
    let title = title.map(str::trim).filter(|t| !t.is_empty()).unwrap_or("Website");
    format!(
        "<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"UTF-8\">\n<meta name=\"viewport\" content=\"width=device-width, initial-scale=1.0\">\n<title>{}</title>\n<style>\n{}\n</style>\n</head>\n<body>\n{}\n</body>\n</html>",
        escape_text(title),
        SHELL_STYLE,
        fragment
    )
}

/// Inserts `block` before the last `</body>`, else before the last `</html>`,
/// else at the end.
fn inject(document: &str, block: &str) -> String {
    // ASCII lowercasing keeps byte offsets aligned with the original.
    let lower = document.to_ascii_lowercase();
    let at = lower
        .rfind("</body")
        .or_else(|| lower.rfind("</html"))
        .unwrap_or(document.len());
    let mut out = String::with_capacity(document.len() + block.len());
    out.push_str(&document[..at]);
    out.push_str(block);
    out.push_str(&document[at..]);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instrument::{SCRIPT_ID, STYLE_ID};
    use crate::parser::parse_html;
    use pretty_assertions::assert_eq;

    fn count(haystack: &str, needle: &str) -> usize {
        haystack.matches(needle).count()
    }

    #[test]
    fn test_blank_markup_gets_placeholder() {
        let doc = compose("   \n", false);
        assert!(doc.contains("<title>Empty Project</title>"));
        assert!(doc.contains("No Content Yet"));
        assert!(!doc.contains(SCRIPT_ID));

        let doc = compose("", true);
        assert_eq!(count(&doc, &format!("id=\"{}\"", SCRIPT_ID)), 1);
    }

    #[test]
    fn test_fragment_is_wrapped_in_shell() {
        let doc = compose_with(
            "<h1>Hello</h1>",
            &ComposeOptions {
                editing: false,
                title: Some("Tom & Jerry".into()),
            },
        );
        assert!(doc.starts_with("<!DOCTYPE html>"));
        assert!(doc.contains("<title>Tom &amp; Jerry</title>"));
        assert!(doc.contains("box-sizing: border-box"));
        let dom = parse_html(&doc);
        let h1 = dom.query_selector("h1").unwrap().unwrap();
        assert_eq!(dom.text_content(h1), "Hello");

        assert!(compose("<p>x</p>", false).contains("<title>Website</title>"));
    }

    #[test]
    fn test_instrumentation_goes_before_last_body_close() {
        let doc = compose("<HTML><body><p>a</p></BODY></HTML>", true);
        let script_at = doc.find(SCRIPT_ID).unwrap();
        assert!(script_at < doc.find("</BODY>").unwrap());
        assert_eq!(count(&doc, &format!("id=\"{}\"", STYLE_ID)), 1);
        assert!(doc.starts_with("<HTML><body><p>a</p><style"));
    }

    #[test]
    fn test_instrumentation_falls_back_to_html_close_then_append() {
        let doc = compose("<html><p>a</p></html>", true);
        assert!(doc.ends_with("</script></html>"));

        let doc = compose("<html><p>a</p>", true);
        assert!(doc.ends_with("</script>"));
    }

    #[test]
    fn test_compose_is_not_reinstrumented() {
        let once = compose("<html><body><p>a</p></body></html>", true);
        let twice = compose(&once, true);
        assert_eq!(once, twice);
    }

    #[test]
    fn test_full_document_untouched_without_editing() {
        let src = "<!DOCTYPE html><html><body>x</body></html>";
        assert_eq!(compose(src, false), src);
    }
}
