//! Clean markup out of an instrumented document, plus the download helpers.

use std::fs;
use std::path::{Path, PathBuf};

use base64::engine::general_purpose::STANDARD;
use base64::Engine;

use crate::dom::Dom;
use crate::error::PreviewResult;
use crate::instrument::{HOVER_CLASS, SCRIPT_ID, SELECTED_ATTR, SELECTED_CLASS, STYLE_ID};

/// Removes selection/hover marks and the injected style and script nodes.
pub fn strip_instrumentation(dom: &mut Dom) {
    for id in [STYLE_ID, SCRIPT_ID] {
        while let Some(node) = dom.get_element_by_id(id) {
            dom.detach(node);
        }
    }
    for node in dom.elements() {
        if let Some(el) = dom.element_mut(node) {
            el.remove_class(SELECTED_CLASS);
            el.remove_class(HOVER_CLASS);
            el.remove_attr(SELECTED_ATTR);
        }
    }
}

/// Outer markup of the root element, without the doctype. A document with no
/// root element serializes as a whole.
pub fn root_markup(dom: &Dom) -> String {
    match dom.document_element() {
        Some(root) => dom.outer_html(root),
        None => dom.serialize(),
    }
}

pub fn download_file_name(project_name: Option<&str>) -> String {
    let stem: String = project_name
        .unwrap_or_default()
        .chars()
        .filter(|c| !matches!(c, '/' | '\\' | '\0'))
        .collect();
    let stem = stem.trim().trim_matches('.');
    if stem.is_empty() {
        "website.html".to_string()
    } else {
        format!("{}.html", stem)
    }
}

/// Writes `html` to `<dir>/<project>.html` and returns the written path.
pub fn write_download(dir: &Path, project_name: Option<&str>, html: &str) -> PreviewResult<PathBuf> {
    let path = dir.join(download_file_name(project_name));
    fs::write(&path, html)?;
    tracing::info!(path = %path.display(), bytes = html.len(), "wrote html download");
    Ok(path)
}

/// `data:` URL that opens the markup in a fresh browsing context.
pub fn data_url(html: &str) -> String {
    format!("data:text/html;charset=utf-8;base64,{}", STANDARD.encode(html.as_bytes()))
}
