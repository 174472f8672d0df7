use crate::page::{NodeKey, Page};
use tracing::{debug, warn};
use url::Url;

/// Whether a script carries its code inline or references it by URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptKind {
    Inline {
        text: String,
    },
    Remote {
        /// The attribute value exactly as written in the page.
        src: String,
        /// `src` resolved against the page URL, `None` if it could not be resolved.
        url: Option<Url>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptDescriptor {
    pub node: NodeKey,
    pub kind: ScriptKind,
}

impl ScriptDescriptor {
    pub fn is_remote(&self) -> bool {
        matches!(self.kind, ScriptKind::Remote { .. })
    }
}

/// Extract every `<script>` element of the page, in document order.
pub fn collect_scripts(page: &Page, page_url: &Url) -> Vec<ScriptDescriptor> {
    page.elements_by_tag("script")
        .map(|node| {
            let kind = match page.attr(node, "src").filter(|src| !src.is_empty()) {
                Some(src) => {
                    let url = resolve_script_url(page_url, src);
                    if url.is_none() {
                        warn!("Could not resolve script src '{}' against {}", src, page_url);
                    }
                    debug!("scriptSrc = {}", src);
                    ScriptKind::Remote {
                        src: src.to_string(),
                        url,
                    }
                }
                None => ScriptKind::Inline {
                    text: page.text(node).unwrap_or_default().to_string(),
                },
            };
            ScriptDescriptor { node, kind }
        })
        .collect()
}

fn resolve_script_url(base: &Url, src: &str) -> Option<Url> {
    base.join(src.trim()).ok()
}
