//! Private working copies of input catalogues and result reconciliation.
//!
//! A backend never touches the caller's catalogues. It clones each one into a
//! [`WorkingCatalogue`], where every entry gets a unique [`OriginTag`] in input
//! order. Tags travel through the external tool; [`reconcile`] pops the
//! fully-attributed originals back out by tag.

use hashbrown::HashMap;

use crate::catalogue::{Catalogue, CoordSystem, Entry, Identifier};
use crate::exchange::{ExchangeRow, OriginTag};

/// First identifier assigned to output match pairs.
pub const FIRST_MATCH_IDENTIFIER: Identifier = 1;

#[derive(Debug)]
pub struct WorkingCatalogue {
    name: String,
    system: CoordSystem,
    order: Vec<OriginTag>,
    entries: HashMap<OriginTag, Entry>,
}

impl WorkingCatalogue {
    /// Deep-copies `catalogue`. The caller guarantees a uniform coordinate system.
    pub fn new(catalogue: &Catalogue, system: CoordSystem) -> Self {
        let mut order = Vec::with_capacity(catalogue.len());
        let mut entries = HashMap::with_capacity(catalogue.len());
        for (idx, entry) in catalogue.iter().enumerate() {
            let tag = OriginTag(idx as u32 + 1);
            order.push(tag);
            entries.insert(tag, entry.clone());
        }

        Self {
            name: catalogue.name().to_string(),
            system,
            order,
            entries,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn system(&self) -> CoordSystem {
        self.system
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Rows for the external tool, in input order. The id column carries the
    /// origin tag value as well, for tools that echo ids but drop comments.
    pub fn exchange_rows(&self, magnitude: &str) -> Vec<ExchangeRow> {
        self.order
            .iter()
            .filter_map(|tag| self.entries.get(tag).map(|entry| (tag, entry)))
            .map(|(tag, entry)| ExchangeRow {
                id: tag.0 as Identifier,
                coords: entry.position.coords(),
                magnitude: entry.magnitude(magnitude),
                origin: Some(*tag),
                note: String::new(),
            })
            .collect()
    }

    pub fn contains(&self, tag: OriginTag) -> bool {
        self.entries.contains_key(&tag)
    }

    /// Removes and returns the entry behind `tag`; `None` when unknown or
    /// already popped.
    pub fn pop(&mut self, tag: OriginTag) -> Option<Entry> {
        self.entries.remove(&tag)
    }
}

/// Outcome counters of one reconciliation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileStats {
    pub rows: usize,
    pub matched: usize,
    pub dropped: usize,
}

/// Builds the two matched catalogues from row-aligned tag lists.
///
/// Row `k` of `tags_a` and row `k` of `tags_b` form one match. A pair is
/// emitted only when both originals are still present; otherwise the row is
/// dropped and neither side is consumed. Emitted pairs get consecutive identifiers starting at
/// [`FIRST_MATCH_IDENTIFIER`], in tool output order.
pub fn reconcile(
    tags_a: &[Option<OriginTag>],
    tags_b: &[Option<OriginTag>],
    work_a: &mut WorkingCatalogue,
    work_b: &mut WorkingCatalogue,
) -> (Catalogue, Catalogue, ReconcileStats) {
    let rows = tags_a.len().min(tags_b.len());
    let mut matched_a = Catalogue::new(format!("{}-matched", work_a.name()));
    let mut matched_b = Catalogue::new(format!("{}-matched", work_b.name()));
    let mut next_id = FIRST_MATCH_IDENTIFIER;

    for (row, (tag_a, tag_b)) in tags_a.iter().zip(tags_b).enumerate() {
        // Neither side is consumed unless both still resolve.
        let popped = match (*tag_a, *tag_b) {
            (Some(a), Some(b)) if work_a.contains(a) && work_b.contains(b) => {
                work_a.pop(a).zip(work_b.pop(b))
            }
            _ => None,
        };

        let Some((mut entry_a, mut entry_b)) = popped else {
            tracing::debug!(
                "Dropping result row {}: origin {:?} / {:?} not resolvable",
                row + 1,
                tag_a,
                tag_b
            );
            continue;
        };

        entry_a.identifier = next_id;
        entry_b.identifier = next_id;
        matched_a.push(entry_a);
        matched_b.push(entry_b);
        next_id += 1;
    }

    let stats = ReconcileStats {
        rows,
        matched: matched_a.len(),
        dropped: rows - matched_a.len(),
    };

    if common::is_debug() {
        assert_eq!(matched_a.len(), matched_b.len());
        assert!(matched_a.has_unique_identifiers());
        assert_eq!(matched_a.identifiers(), matched_b.identifiers());
    }

    (matched_a, matched_b, stats)
}
