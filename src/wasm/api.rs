//! WASM API for inspecting machine files.

use wasm_bindgen::prelude::*;

use crate::codec::{compact_lines, compaction_percent, replay};
use crate::history::{EventId, EventKind, HistoryEvent, HistoryTree};

/// JavaScript-compatible error wrapper
#[wasm_bindgen]
#[derive(Debug, Clone)]
pub struct JsError {
    message: String,
}

#[wasm_bindgen]
impl JsError {
    #[wasm_bindgen(constructor)]
    pub fn new(message: &str) -> JsError {
        JsError {
            message: message.to_string(),
        }
    }

    #[wasm_bindgen(getter)]
    pub fn message(&self) -> String {
        self.message.clone()
    }
}

impl From<crate::TimelineError> for JsError {
    fn from(e: crate::TimelineError) -> Self {
        JsError {
            message: e.to_string(),
        }
    }
}

/// One node of the history tree, flattened for JavaScript.
#[wasm_bindgen]
#[derive(Debug, Clone)]
pub struct EventInfo {
    id: f64,
    ticks: f64,
    parent: Option<f64>,
    label: String,
    bookmarked: bool,
    system: bool,
    state_len: usize,
}

#[wasm_bindgen]
impl EventInfo {
    #[wasm_bindgen(getter)]
    pub fn id(&self) -> f64 {
        self.id
    }

    /// Engine ticks (as f64 for JavaScript compatibility)
    #[wasm_bindgen(getter)]
    pub fn ticks(&self) -> f64 {
        self.ticks
    }

    #[wasm_bindgen(getter)]
    pub fn parent(&self) -> Option<f64> {
        self.parent
    }

    #[wasm_bindgen(getter)]
    pub fn label(&self) -> String {
        self.label.clone()
    }

    #[wasm_bindgen(getter)]
    pub fn bookmarked(&self) -> bool {
        self.bookmarked
    }

    #[wasm_bindgen(getter)]
    pub fn system(&self) -> bool {
        self.system
    }

    #[wasm_bindgen(getter)]
    pub fn state_len(&self) -> usize {
        self.state_len
    }
}

impl From<&HistoryEvent> for EventInfo {
    fn from(event: &HistoryEvent) -> Self {
        let (label, bookmark) = match event.kind() {
            EventKind::CoreAction(action) => (action.to_string(), None),
            EventKind::Checkpoint { bookmark: Some(b) } if b.system => {
                ("System bookmark".to_string(), Some(b))
            }
            EventKind::Checkpoint { bookmark: Some(b) } => ("Bookmark".to_string(), Some(b)),
            EventKind::Checkpoint { bookmark: None } => ("Checkpoint".to_string(), None),
        };
        EventInfo {
            id: event.id().get() as f64,
            ticks: event.ticks() as f64,
            parent: event.parent().map(|p| p.get() as f64),
            label,
            bookmarked: bookmark.is_some(),
            system: bookmark.is_some_and(|b| b.system),
            state_len: bookmark.map_or(0, |b| b.state_len()),
        }
    }
}

/// Read-only view of a machine file's history.
#[wasm_bindgen]
pub struct TimelineViewer {
    name: String,
    tree: HistoryTree,
    source_len: u64,
}

#[wasm_bindgen]
impl TimelineViewer {
    /// Replay the text of a machine file.
    #[wasm_bindgen(constructor)]
    pub fn new(text: &str) -> Result<TimelineViewer, JsError> {
        let replayed = replay(text.lines())?;
        Ok(TimelineViewer {
            name: replayed.name.unwrap_or_default(),
            tree: replayed.tree,
            source_len: text.lines().map(|l| l.len() as u64 + 1).sum(),
        })
    }

    #[wasm_bindgen(getter)]
    pub fn name(&self) -> String {
        self.name.clone()
    }

    #[wasm_bindgen(getter)]
    pub fn event_count(&self) -> usize {
        self.tree.len()
    }

    #[wasm_bindgen(getter)]
    pub fn current_id(&self) -> f64 {
        self.tree.current_id().get() as f64
    }

    pub fn event(&self, id: f64) -> Result<EventInfo, JsError> {
        Ok(self.tree.event(EventId(id as u64))?.into())
    }

    /// Child ids of an event, oldest branch first.
    pub fn children(&self, id: f64) -> Result<Vec<f64>, JsError> {
        let event = self.tree.event(EventId(id as u64))?;
        Ok(event.children().iter().map(|c| c.get() as f64).collect())
    }

    /// Events from the root down to the current event.
    pub fn current_path(&self) -> js_sys::Array {
        let mut path: Vec<&HistoryEvent> = self
            .tree
            .ancestors(self.tree.current_id())
            .filter_map(|id| self.tree.get(id))
            .collect();
        path.reverse();
        path.into_iter()
            .map(|event| JsValue::from(EventInfo::from(event)))
            .collect()
    }

    /// Compacted machine file text.
    pub fn compact(&self) -> String {
        let mut text = compact_lines(&self.name, &self.tree).join("\n");
        text.push('\n');
        text
    }

    /// Percentage saved by [`TimelineViewer::compact`].
    pub fn compaction_percent(&self) -> f64 {
        compaction_percent(self.source_len, self.compact().len() as u64) as f64
    }
}
