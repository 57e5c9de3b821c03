//! Selected UI elements and the context block built from them.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::state::now_ms;
use crate::timeline::local_id;

/// Default bound on simultaneously selected elements.
pub const DEFAULT_MAX_SELECTED: usize = 10;

/// Markup characters embedded per element when one element is selected.
const SINGLE_HTML_CHARS: usize = 2000;
/// Markup characters embedded per element when several are selected.
const MULTI_HTML_CHARS: usize = 1000;
/// Characters of text content shown in a label preview.
const PREVIEW_CHARS: usize = 30;

/// Element as reported by the preview, before it gets a local id.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ElementDescriptor {
    pub tag_name: String,
    #[serde(default)]
    pub element_id: Option<String>,
    #[serde(default)]
    pub class_list: Vec<String>,
    #[serde(default)]
    pub text_content: String,
    pub xpath: String,
    #[serde(rename = "outerHTML")]
    pub outer_html: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectedElement {
    pub id: String,
    pub tag_name: String,
    pub element_id: Option<String>,
    pub class_list: Vec<String>,
    pub text_content: String,
    pub xpath: String,
    #[serde(rename = "outerHTML")]
    pub outer_html: String,
    pub timestamp: i64,
}

impl SelectedElement {
    /// `tag#id` when the element has an id, else `tag.class1.class2`.
    #[must_use]
    pub fn label(&self) -> String {
        let tag = self.tag_name.to_lowercase();
        match self.element_id.as_deref().filter(|id| !id.is_empty()) {
            Some(id) => format!("{tag}#{id}"),
            None if self.class_list.is_empty() => tag,
            None => format!("{tag}.{}", self.class_list.join(".")),
        }
    }

    /// Leading text content, clipped for display.
    #[must_use]
    pub fn preview(&self) -> String {
        let text = self.text_content.trim();
        if text.chars().count() > PREVIEW_CHARS {
            let head: String = text.chars().take(PREVIEW_CHARS).collect();
            format!("{head}...")
        } else {
            text.to_owned()
        }
    }

    fn render(&self, index: Option<usize>, limit: usize) -> String {
        let mut lines = Vec::with_capacity(8);
        lines.push(match index {
            Some(i) => format!("<selected-element index=\"{i}\">"),
            None => "<selected-element>".to_owned(),
        });
        lines.push(format!("<tag>{}</tag>", self.tag_name));
        if let Some(id) = self.element_id.as_deref().filter(|id| !id.is_empty()) {
            lines.push(format!("<id>{id}</id>"));
        }
        if !self.class_list.is_empty() {
            lines.push(format!("<classes>{}</classes>", self.class_list.join(" ")));
        }
        lines.push(format!("<xpath>{}</xpath>", self.xpath));
        lines.push("<html>".to_owned());
        lines.push(truncate(&self.outer_html, limit));
        lines.push("</html>".to_owned());
        lines.push("</selected-element>".to_owned());
        lines.join("\n")
    }
}

fn truncate(html: &str, limit: usize) -> String {
    match html.char_indices().nth(limit) {
        Some((cut, _)) => format!("{}... (truncated)", &html[..cut]),
        None => html.to_owned(),
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AddOutcome {
    Added(String),
    Duplicate,
    AtCapacity,
}

/// Ordered selection, deduplicated by xpath and bounded by capacity.
#[derive(Clone, Debug)]
pub struct ElementSelectionSet {
    elements: Vec<SelectedElement>,
    capacity: usize,
}

impl Default for ElementSelectionSet {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_SELECTED)
    }
}

impl ElementSelectionSet {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self { elements: Vec::new(), capacity }
    }

    #[must_use]
    pub fn elements(&self) -> &[SelectedElement] {
        &self.elements
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.elements.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Insert unless the xpath is already selected or the set is full.
    /// Neither rejection is an error.
    pub fn add(&mut self, element: ElementDescriptor) -> AddOutcome {
        if self.elements.iter().any(|e| e.xpath == element.xpath) {
            debug!(xpath = %element.xpath, "selection: element already selected");
            return AddOutcome::Duplicate;
        }
        if self.elements.len() >= self.capacity {
            warn!(max = self.capacity, "selection: capacity reached");
            return AddOutcome::AtCapacity;
        }
        let id = local_id();
        self.elements.push(SelectedElement {
            id: id.clone(),
            tag_name: element.tag_name,
            element_id: element.element_id,
            class_list: element.class_list,
            text_content: element.text_content,
            xpath: element.xpath,
            outer_html: element.outer_html,
            timestamp: now_ms(),
        });
        AddOutcome::Added(id)
    }

    pub fn remove(&mut self, id: &str) -> bool {
        let before = self.elements.len();
        self.elements.retain(|e| e.id != id);
        self.elements.len() != before
    }

    /// Deselect by structural locator, as a click on a highlighted element does.
    pub fn remove_by_xpath(&mut self, xpath: &str) -> bool {
        let before = self.elements.len();
        self.elements.retain(|e| e.xpath != xpath);
        self.elements.len() != before
    }

    pub fn clear(&mut self) {
        self.elements.clear();
    }

    /// Render the selection for inclusion in an instruction. Empty when
    /// nothing is selected.
    #[must_use]
    pub fn build_context(&self) -> String {
        match self.elements.as_slice() {
            [] => String::new(),
            [only] => only.render(None, SINGLE_HTML_CHARS),
            many => many
                .iter()
                .enumerate()
                .map(|(i, el)| el.render(Some(i + 1), MULTI_HTML_CHARS))
                .collect::<Vec<_>>()
                .join("\n\n"),
        }
    }
}

#[cfg(test)]
#[path = "selection_test.rs"]
mod tests;
