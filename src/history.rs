//! Branching history of recorded emulator events.
//!
//! The tree is an arena of [`HistoryEvent`] nodes keyed by [`EventId`]. Each node
//! stores its parent id and the ordered ids of its children, so there are no
//! reference cycles to break and a snapshot of the whole tree is a plain `Clone`.
//!
//! ## Invariants
//!
//! - Exactly one root: id 0, a `Checkpoint`, no parent.
//! - Ids are allocated monotonically. A node's id is greater than its parent's and
//!   than every id allocated before it, including ids of trimmed nodes.
//! - Node payloads are an [`EventKind`], so "action iff `CoreAction`" and
//!   "bookmark only on `Checkpoint`" hold by construction.
//! - The only edits besides appending are [`HistoryTree::trim`] and
//!   [`HistoryTree::set_bookmark`].

use std::collections::BTreeMap;
use std::fmt;

use crate::action::Action;
use crate::bookmark::Bookmark;
use crate::error::{Result, TimelineError};

/// Identifier of a history event, unique across the whole tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct EventId(pub u64);

impl EventId {
    /// The id of the root checkpoint.
    pub const ROOT: EventId = EventId(0);

    /// The raw id value.
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Node type tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventType {
    Checkpoint,
    CoreAction,
}

/// Payload of a history event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventKind {
    /// A point in time, optionally carrying a state snapshot.
    Checkpoint { bookmark: Option<Bookmark> },
    /// A discrete input action executed by the engine.
    CoreAction(Action),
}

impl EventKind {
    /// A checkpoint without a bookmark.
    pub fn checkpoint() -> Self {
        EventKind::Checkpoint { bookmark: None }
    }

    /// A checkpoint carrying `bookmark`.
    pub fn bookmarked(bookmark: Bookmark) -> Self {
        EventKind::Checkpoint {
            bookmark: Some(bookmark),
        }
    }
}

/// A node of the history tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryEvent {
    id: EventId,
    ticks: u64,
    kind: EventKind,
    parent: Option<EventId>,
    children: Vec<EventId>,
}

impl HistoryEvent {
    pub fn id(&self) -> EventId {
        self.id
    }

    /// Engine ticks at the moment the event was recorded.
    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    pub fn kind(&self) -> &EventKind {
        &self.kind
    }

    pub fn event_type(&self) -> EventType {
        match self.kind {
            EventKind::Checkpoint { .. } => EventType::Checkpoint,
            EventKind::CoreAction(_) => EventType::CoreAction,
        }
    }

    /// The recorded action, for `CoreAction` events.
    pub fn action(&self) -> Option<&Action> {
        match &self.kind {
            EventKind::CoreAction(action) => Some(action),
            EventKind::Checkpoint { .. } => None,
        }
    }

    /// The attached bookmark, for `Checkpoint` events that carry one.
    pub fn bookmark(&self) -> Option<&Bookmark> {
        match &self.kind {
            EventKind::Checkpoint { bookmark } => bookmark.as_ref(),
            EventKind::CoreAction(_) => None,
        }
    }

    pub fn is_checkpoint(&self) -> bool {
        self.event_type() == EventType::Checkpoint
    }

    /// Parent id; `None` only for the root.
    pub fn parent(&self) -> Option<EventId> {
        self.parent
    }

    /// Child ids in insertion order.
    pub fn children(&self) -> &[EventId] {
        &self.children
    }

    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }
}

/// In-memory branching history with a movable `current` cursor.
#[derive(Debug, Clone)]
pub struct HistoryTree {
    events: BTreeMap<EventId, HistoryEvent>,
    current: EventId,
    next_id: u64,
}

impl Default for HistoryTree {
    fn default() -> Self {
        Self::new()
    }
}

/// Trees compare by nodes and cursor position. The id allocator is not part of
/// the observable shape (a reopened file cannot know about trimmed ids).
impl PartialEq for HistoryTree {
    fn eq(&self, other: &Self) -> bool {
        self.current == other.current && self.events == other.events
    }
}

impl Eq for HistoryTree {}

impl HistoryTree {
    /// Create a tree holding only the power-on root checkpoint at tick 0.
    pub fn new() -> Self {
        Self::with_root(0, None)
    }

    /// Create a tree whose root checkpoint has the given ticks and bookmark.
    pub fn with_root(ticks: u64, bookmark: Option<Bookmark>) -> Self {
        let root = HistoryEvent {
            id: EventId::ROOT,
            ticks,
            kind: EventKind::Checkpoint { bookmark },
            parent: None,
            children: Vec::new(),
        };
        let mut events = BTreeMap::new();
        events.insert(EventId::ROOT, root);

        Self {
            events,
            current: EventId::ROOT,
            next_id: 1,
        }
    }

    pub fn root_id(&self) -> EventId {
        EventId::ROOT
    }

    pub fn root(&self) -> &HistoryEvent {
        &self.events[&EventId::ROOT]
    }

    pub fn current_id(&self) -> EventId {
        self.current
    }

    pub fn current(&self) -> &HistoryEvent {
        &self.events[&self.current]
    }

    /// The id the next append will receive.
    pub fn next_id(&self) -> EventId {
        EventId(self.next_id)
    }

    /// Number of live events, root included.
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// A tree always holds its root.
    pub fn is_empty(&self) -> bool {
        false
    }

    pub fn contains(&self, id: EventId) -> bool {
        self.events.contains_key(&id)
    }

    pub fn get(&self, id: EventId) -> Option<&HistoryEvent> {
        self.events.get(&id)
    }

    /// Look up an event, failing with `UnknownEvent`.
    pub fn event(&self, id: EventId) -> Result<&HistoryEvent> {
        self.events.get(&id).ok_or(TimelineError::UnknownEvent(id))
    }

    /// Live events in ascending id order.
    pub fn iter(&self) -> impl Iterator<Item = &HistoryEvent> {
        self.events.values()
    }

    /// Append a new event as the last child of `current` and return its id.
    ///
    /// The cursor does not move; callers decide whether to advance it.
    pub fn append(&mut self, ticks: u64, kind: EventKind) -> Result<EventId> {
        let id = EventId(self.next_id);
        self.insert(id, ticks, kind)
    }

    /// Append an event with an explicit id as the last child of `current`.
    ///
    /// Used when replaying a log. `id` must not be lower than [`Self::next_id`].
    pub fn insert(&mut self, id: EventId, ticks: u64, kind: EventKind) -> Result<EventId> {
        if id.0 < self.next_id {
            return Err(TimelineError::InvalidOperation(format!(
                "event id {} is not greater than every id already allocated",
                id
            )));
        }
        if let EventKind::CoreAction(action) = &kind {
            if !action.is_recordable() {
                return Err(TimelineError::InvalidOperation(
                    "run-until actions are not recorded in the history".to_string(),
                ));
            }
        }

        let parent = self.current;
        self.events.insert(
            id,
            HistoryEvent {
                id,
                ticks,
                kind,
                parent: Some(parent),
                children: Vec::new(),
            },
        );
        if let Some(parent) = self.events.get_mut(&parent) {
            parent.children.push(id);
        }
        self.next_id = id.0 + 1;

        Ok(id)
    }

    /// Move the cursor to an existing event.
    pub fn set_current(&mut self, id: EventId) -> Result<()> {
        if !self.contains(id) {
            return Err(TimelineError::UnknownEvent(id));
        }
        self.current = id;
        Ok(())
    }

    /// True if `ancestor` is `id` or lies on the path from `id` to the root.
    pub fn is_ancestor_or_self(&self, ancestor: EventId, id: EventId) -> bool {
        self.ancestors(id).any(|a| a == ancestor)
    }

    /// Ids from `id` (inclusive) up to the root (inclusive).
    pub fn ancestors(&self, id: EventId) -> Ancestors<'_> {
        Ancestors {
            tree: self,
            next: self.contains(id).then_some(id),
        }
    }

    /// Ids on the path below `ancestor` down to `target`, in root-to-leaf order.
    ///
    /// Excludes `ancestor`, includes `target`. Fails if `ancestor` is not an
    /// ancestor of (or equal to) `target`.
    pub fn path_between(&self, ancestor: EventId, target: EventId) -> Result<Vec<EventId>> {
        self.event(target)?;
        let mut path = Vec::new();
        for id in self.ancestors(target) {
            if id == ancestor {
                path.reverse();
                return Ok(path);
            }
            path.push(id);
        }
        Err(TimelineError::InvalidOperation(format!(
            "event {} is not an ancestor of event {}",
            ancestor, target
        )))
    }

    /// Detach `id` from its parent and discard its whole subtree.
    ///
    /// Fails with `InvalidOperation` for the root, the current event, or any
    /// ancestor of the current event.
    pub fn trim(&mut self, id: EventId) -> Result<()> {
        let parent = self.check_trim(id)?;

        if let Some(parent) = self.events.get_mut(&parent) {
            parent.children.retain(|&child| child != id);
        }

        let mut pending = vec![id];
        while let Some(next) = pending.pop() {
            if let Some(removed) = self.events.remove(&next) {
                pending.extend(removed.children);
            }
        }

        Ok(())
    }

    /// Check that `id` may be trimmed, returning its parent.
    pub fn check_trim(&self, id: EventId) -> Result<EventId> {
        let Some(parent) = self.event(id)?.parent else {
            return Err(TimelineError::InvalidOperation(
                "cannot trim the root event".to_string(),
            ));
        };
        if self.is_ancestor_or_self(id, self.current) {
            return Err(TimelineError::InvalidOperation(format!(
                "cannot trim event {}: the current event is in its subtree",
                id
            )));
        }
        Ok(parent)
    }

    /// Attach, replace or clear (`None`) the bookmark of a checkpoint.
    pub fn set_bookmark(&mut self, id: EventId, bookmark: Option<Bookmark>) -> Result<()> {
        let event = self
            .events
            .get_mut(&id)
            .ok_or(TimelineError::UnknownEvent(id))?;

        match &mut event.kind {
            EventKind::Checkpoint { bookmark: slot } => {
                *slot = bookmark;
                Ok(())
            }
            EventKind::CoreAction(_) => Err(TimelineError::InvalidOperation(format!(
                "event {} is not a checkpoint",
                id
            ))),
        }
    }

    /// The closest event at or above `id` that is a bookmarked checkpoint.
    ///
    /// Falls back to the root, which always stands for the power-on state.
    pub fn nearest_bookmarked_ancestor(&self, id: EventId) -> Result<EventId> {
        self.event(id)?;
        Ok(self
            .ancestors(id)
            .find(|&a| self.events[&a].bookmark().is_some())
            .unwrap_or(EventId::ROOT))
    }

    /// Number of events in the subtree rooted at `id`, including `id`.
    pub fn subtree_len(&self, id: EventId) -> usize {
        let mut count = 0;
        let mut pending = vec![id];
        while let Some(next) = pending.pop() {
            if let Some(event) = self.events.get(&next) {
                count += 1;
                pending.extend(event.children.iter().copied());
            }
        }
        count
    }
}

/// Iterator over an event and its ancestors, leaf to root.
pub struct Ancestors<'a> {
    tree: &'a HistoryTree,
    next: Option<EventId>,
}

impl Iterator for Ancestors<'_> {
    type Item = EventId;

    fn next(&mut self) -> Option<EventId> {
        let id = self.next?;
        self.next = self.tree.events.get(&id).and_then(|e| e.parent);
        Some(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(code: u8) -> EventKind {
        EventKind::CoreAction(Action::key_press(code, true))
    }

    /// root -> 1 -> 2, with 2 current.
    fn chain() -> HistoryTree {
        let mut tree = HistoryTree::new();
        let a = tree.append(10, key(1)).unwrap();
        tree.set_current(a).unwrap();
        let b = tree.append(20, key(2)).unwrap();
        tree.set_current(b).unwrap();
        tree
    }

    #[test]
    fn test_new_tree_has_root() {
        let tree = HistoryTree::new();
        assert_eq!(tree.root_id(), EventId::ROOT);
        assert_eq!(tree.current_id(), EventId::ROOT);
        assert!(tree.root().is_checkpoint());
        assert!(tree.root().is_root());
        assert_eq!(tree.len(), 1);
    }

    #[test]
    fn test_append_does_not_move_cursor() {
        let mut tree = HistoryTree::new();
        let id = tree.append(5, key(3)).unwrap();

        assert_eq!(id, EventId(1));
        assert_eq!(tree.current_id(), EventId::ROOT);
        assert_eq!(tree.root().children(), &[id]);
        assert_eq!(tree.get(id).unwrap().parent(), Some(EventId::ROOT));
    }

    #[test]
    fn test_append_rejects_run_until() {
        let mut tree = HistoryTree::new();
        let kind = EventKind::CoreAction(Action::run_until(10, crate::StopReason::NONE));
        assert!(matches!(
            tree.append(0, kind),
            Err(TimelineError::InvalidOperation(_))
        ));
        assert_eq!(tree.len(), 1);
    }

    #[test]
    fn test_insert_rejects_stale_id() {
        let mut tree = chain();
        assert!(tree.insert(EventId(2), 30, key(9)).is_err());
        assert_eq!(tree.insert(EventId(7), 30, key(9)).unwrap(), EventId(7));
        assert_eq!(tree.next_id(), EventId(8));
    }

    #[test]
    fn test_trim_root_and_current_branch_fail() {
        let mut tree = chain();
        assert!(matches!(
            tree.trim(EventId::ROOT),
            Err(TimelineError::InvalidOperation(_))
        ));
        assert!(matches!(
            tree.trim(EventId(2)),
            Err(TimelineError::InvalidOperation(_))
        ));
        assert!(matches!(
            tree.trim(EventId(1)),
            Err(TimelineError::InvalidOperation(_))
        ));
        assert_eq!(tree.len(), 3);
    }

    #[test]
    fn test_trim_discards_subtree_but_keeps_ids_allocated() {
        let mut tree = chain();
        tree.set_current(EventId::ROOT).unwrap();
        tree.trim(EventId(1)).unwrap();

        assert_eq!(tree.len(), 1);
        assert!(tree.root().children().is_empty());
        assert_eq!(tree.append(0, key(4)).unwrap(), EventId(3));
    }

    #[test]
    fn test_set_bookmark_requires_checkpoint() {
        let mut tree = chain();
        let bookmark = Bookmark::new(20, &[1, 2, 3], false);
        assert!(tree.set_bookmark(EventId(1), Some(bookmark.clone())).is_err());

        tree.set_bookmark(EventId::ROOT, Some(bookmark.clone())).unwrap();
        assert_eq!(tree.root().bookmark(), Some(&bookmark));

        tree.set_bookmark(EventId::ROOT, None).unwrap();
        assert!(tree.root().bookmark().is_none());
    }

    #[test]
    fn test_nearest_bookmarked_ancestor() {
        let mut tree = chain();
        assert_eq!(
            tree.nearest_bookmarked_ancestor(EventId(2)).unwrap(),
            EventId::ROOT
        );

        let cp = tree
            .append(30, EventKind::bookmarked(Bookmark::new(30, &[7], false)))
            .unwrap();
        tree.set_current(cp).unwrap();
        let leaf = tree.append(40, key(5)).unwrap();

        assert_eq!(tree.nearest_bookmarked_ancestor(leaf).unwrap(), cp);
        assert_eq!(tree.nearest_bookmarked_ancestor(cp).unwrap(), cp);
    }

    #[test]
    fn test_path_between() {
        let tree = chain();
        assert_eq!(
            tree.path_between(EventId::ROOT, EventId(2)).unwrap(),
            vec![EventId(1), EventId(2)]
        );
        assert!(tree.path_between(EventId(2), EventId(1)).is_err());
        assert!(tree.path_between(EventId(2), EventId(2)).unwrap().is_empty());
    }

    #[test]
    fn test_ancestors_walks_to_root() {
        let tree = chain();
        let ids: Vec<_> = tree.ancestors(EventId(2)).collect();
        assert_eq!(ids, vec![EventId(2), EventId(1), EventId::ROOT]);
        assert_eq!(tree.ancestors(EventId(99)).count(), 0);
    }

    #[test]
    fn test_subtree_len() {
        let tree = chain();
        assert_eq!(tree.subtree_len(EventId::ROOT), 3);
        assert_eq!(tree.subtree_len(EventId(2)), 1);
        assert_eq!(tree.subtree_len(EventId(42)), 0);
    }
}
