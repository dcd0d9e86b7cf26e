//! Row chunks and reassembled rows.
//!
//! A scan response carries fragments of one logical row. The merger
//! accumulates fragments into a [`PartialRow`] until a commit marker
//! finalizes them into an immutable [`Row`]. Families accumulate in
//! first-seen order; qualifiers within a family in arrival order; cells
//! under a qualifier in arrival order.

use bytes::Bytes;

/// One cell fragment of a row. A fragment with no qualifier registers the
/// family without adding a column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CellChunk {
    pub family: String,
    pub qualifier: Option<Bytes>,
    pub timestamp_micros: i64,
    pub value: Bytes,
}

/// A fragment of the row currently being assembled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Chunk {
    /// Cell data to merge into the in-progress row.
    Content(CellChunk),
    /// Discard everything accumulated for the in-progress row and keep
    /// reading, as if nothing had been seen for it.
    ResetRow,
    /// Finalize the in-progress row and emit it.
    CommitRow,
}

/// One response message from the scan stream: chunks belonging to a row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanResponse {
    pub row_key: Bytes,
    pub chunks: Vec<Chunk>,
}

/// A fully reassembled row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Row {
    pub key: Bytes,
    pub families: Vec<Family>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Family {
    pub name: String,
    pub columns: Vec<Column>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Column {
    pub qualifier: Bytes,
    pub cells: Vec<Cell>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cell {
    pub timestamp_micros: i64,
    pub value: Bytes,
}

/// Accumulator for the row currently being assembled. Owned exclusively
/// by the merger; never shared.
#[derive(Debug)]
pub(crate) struct PartialRow {
    key: Bytes,
    families: Vec<Family>,
}

impl PartialRow {
    pub(crate) fn new(key: Bytes) -> Self {
        Self {
            key,
            families: Vec::new(),
        }
    }

    /// Merge one cell fragment, creating the family/column on first
    /// sight.
    pub(crate) fn merge(&mut self, chunk: CellChunk) {
        let family = match self
            .families
            .iter_mut()
            .position(|f| f.name == chunk.family)
        {
            Some(index) => &mut self.families[index],
            None => {
                self.families.push(Family {
                    name: chunk.family,
                    columns: Vec::new(),
                });
                self.families.last_mut().expect("just pushed")
            }
        };
        let Some(qualifier) = chunk.qualifier else {
            // Family-only fragment.
            return;
        };
        let cell = Cell {
            timestamp_micros: chunk.timestamp_micros,
            value: chunk.value,
        };
        match family
            .columns
            .iter_mut()
            .find(|c| c.qualifier == qualifier)
        {
            Some(column) => column.cells.push(cell),
            None => family.columns.push(Column {
                qualifier,
                cells: vec![cell],
            }),
        }
    }

    /// Discard accumulated fragments but stay on the same row.
    pub(crate) fn clear(&mut self) {
        self.families.clear();
    }

    /// Finalize into an immutable row. A row with no accumulated
    /// fragments becomes an explicitly empty row for its key.
    pub(crate) fn into_row(self) -> Row {
        Row {
            key: self.key,
            families: self.families,
        }
    }
}
