//! Row tree storage.
//!
//! Rows live in an arena keyed by [`RowId`], a stable identity the UI layer
//! can hang selection and expansion state on. Incremental repair removes and
//! recreates rows whose identity-defining key (option, state, component) is
//! gone, and leaves every other row's id untouched; cosmetic refreshes mutate
//! display fields in place without reissuing ids.

use std::collections::HashMap;
use std::fmt;

use epd_model::{Iid, ParameterSwitchKind, Subject};

/// Stable row identity, unique within one tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RowId(u64);

impl fmt::Display for RowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "row:{}", self.0)
    }
}

/// Closed set of row kinds, in strict containment order:
/// Subject -> Option -> State -> Component.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowKind {
    Subject,
    Option { option: Iid },
    State { state: Iid },
    Component { component: Iid, index: usize },
}

impl RowKind {
    pub fn option_iid(&self) -> Option<Iid> {
        match self {
            RowKind::Option { option } => Some(*option),
            _ => None,
        }
    }

    pub fn state_iid(&self) -> Option<Iid> {
        match self {
            RowKind::State { state } => Some(*state),
            _ => None,
        }
    }

    pub fn component_iid(&self) -> Option<Iid> {
        match self {
            RowKind::Component { component, .. } => Some(*component),
            _ => None,
        }
    }
}

/// Per-cell display values mirrored from the backing value set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValueCells {
    pub manual: String,
    pub computed: String,
    pub reference: String,
    pub published: String,
    /// The value selected by the switch.
    pub actual: String,
    pub value_switch: ParameterSwitchKind,
}

/// One node of the materialized tree. Rows mirror domain state, they never
/// own it; `value_set` and the kind's iids are non-owning references.
#[derive(Debug, Clone)]
pub struct Row {
    pub id: RowId,
    pub kind: RowKind,
    pub subject: Subject,
    pub parent: Option<RowId>,
    pub children: Vec<RowId>,
    pub name: String,
    pub owner_short_name: String,
    /// Backing record for rows that carry cells.
    pub value_set: Option<Iid>,
    /// Index into the value arrays; 0 for a folded scalar terminal.
    pub slot_index: usize,
    pub cells: Option<ValueCells>,
    pub is_editable: bool,
    /// Per-row diagnostic, e.g. a rejected write or a failed subtree.
    pub error: Option<String>,
}

impl Row {
    pub fn is_terminal(&self) -> bool {
        self.cells.is_some()
    }
}

/// Arena holding every row of one tree.
#[derive(Debug, Default)]
pub struct RowArena {
    rows: HashMap<RowId, Row>,
    next: u64,
}

impl RowArena {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Allocate a fresh id and insert the row under it, linking it to its
    /// parent's child list.
    pub fn insert(&mut self, build: impl FnOnce(RowId) -> Row) -> RowId {
        self.next += 1;
        let id = RowId(self.next);
        let row = build(id);
        let parent = row.parent;
        self.rows.insert(id, row);
        if let Some(parent) = parent
            && let Some(parent_row) = self.rows.get_mut(&parent)
        {
            parent_row.children.push(id);
        }
        id
    }

    pub fn row(&self, id: RowId) -> Option<&Row> {
        self.rows.get(&id)
    }

    pub fn row_mut(&mut self, id: RowId) -> Option<&mut Row> {
        self.rows.get_mut(&id)
    }

    pub fn contains(&self, id: RowId) -> bool {
        self.rows.contains_key(&id)
    }

    /// Remove a row and all of its descendants, unlinking it from its
    /// parent. Returns the removed rows so the caller can release any
    /// per-row bookkeeping (value-set watches in particular).
    pub fn remove_subtree(&mut self, id: RowId) -> Vec<Row> {
        let Some(root) = self.rows.get(&id) else {
            return Vec::new();
        };
        if let Some(parent) = root.parent
            && let Some(parent_row) = self.rows.get_mut(&parent)
        {
            parent_row.children.retain(|child| *child != id);
        }
        let mut removed = Vec::new();
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            if let Some(row) = self.rows.remove(&current) {
                stack.extend(row.children.iter().copied());
                removed.push(row);
            }
        }
        removed
    }

    /// Pre-order traversal of the subtree rooted at `id`.
    pub fn preorder(&self, id: RowId) -> Vec<RowId> {
        let mut out = Vec::new();
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            if let Some(row) = self.rows.get(&current) {
                out.push(current);
                // push in reverse so children come out in order
                stack.extend(row.children.iter().rev().copied());
            }
        }
        out
    }

    /// All rows (whole arena, any subtree) bound to one value set.
    pub fn rows_backed_by(&self, value_set: Iid) -> Vec<RowId> {
        let mut ids: Vec<RowId> = self
            .rows
            .values()
            .filter(|row| row.value_set == Some(value_set))
            .map(|row| row.id)
            .collect();
        ids.sort();
        ids
    }

    pub fn clear(&mut self) {
        self.rows.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = &Row> {
        self.rows.values()
    }
}
