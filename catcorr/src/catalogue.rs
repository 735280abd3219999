//! In-memory source catalogues.
//!
//! A [`Catalogue`] is an ordered collection of [`Entry`] values. Identifiers are
//! only meaningful within one catalogue and may repeat in caller-supplied input;
//! correlation output always carries fresh, unique identifiers.

use std::collections::BTreeMap;

use glam::DVec2;
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};

/// Per-catalogue entry identifier.
pub type Identifier = i64;

/// Canonical magnitude label used when no other type is requested.
pub const DEFAULT_MAGNITUDE: &str = "mag";

/// Coordinate system of a position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum CoordSystem {
    /// Detector pixel coordinates.
    Pixel,
    /// Right ascension / declination in degrees.
    Sky,
}

/// Position of a source, either on the detector or on the sky.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Position {
    Pixel { x: f64, y: f64 },
    Sky { ra: f64, dec: f64 },
}

impl Position {
    pub fn from_coords(system: CoordSystem, coords: DVec2) -> Self {
        match system {
            CoordSystem::Pixel => Position::Pixel {
                x: coords.x,
                y: coords.y,
            },
            CoordSystem::Sky => Position::Sky {
                ra: coords.x,
                dec: coords.y,
            },
        }
    }

    pub fn system(&self) -> CoordSystem {
        match self {
            Position::Pixel { .. } => CoordSystem::Pixel,
            Position::Sky { .. } => CoordSystem::Sky,
        }
    }

    /// The two coordinate values as (x, y) or (ra, dec).
    pub fn coords(&self) -> DVec2 {
        match *self {
            Position::Pixel { x, y } => DVec2::new(x, y),
            Position::Sky { ra, dec } => DVec2::new(ra, dec),
        }
    }

    pub fn is_finite(&self) -> bool {
        self.coords().is_finite()
    }
}

/// One catalogued source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entry {
    pub identifier: Identifier,
    pub position: Position,
    /// Magnitudes keyed by type label (e.g. `mag`, `mag_iso`).
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub magnitudes: BTreeMap<String, f64>,
    /// Free-form side-channel text. Never interpreted by correlation.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub annotation: String,
}

impl Entry {
    pub fn new(identifier: Identifier, position: Position) -> Self {
        Self {
            identifier,
            position,
            magnitudes: BTreeMap::new(),
            annotation: String::new(),
        }
    }

    pub fn pixel(identifier: Identifier, x: f64, y: f64) -> Self {
        Self::new(identifier, Position::Pixel { x, y })
    }

    pub fn sky(identifier: Identifier, ra: f64, dec: f64) -> Self {
        Self::new(identifier, Position::Sky { ra, dec })
    }

    /// Adds a magnitude under the default `mag` label.
    pub fn with_mag(self, value: f64) -> Self {
        self.with_magnitude(DEFAULT_MAGNITUDE, value)
    }

    pub fn with_magnitude(mut self, label: impl Into<String>, value: f64) -> Self {
        self.magnitudes.insert(label.into(), value);
        self
    }

    pub fn with_annotation(mut self, annotation: impl Into<String>) -> Self {
        self.annotation = annotation.into();
        self
    }

    pub fn magnitude(&self, label: &str) -> Option<f64> {
        self.magnitudes.get(label).copied()
    }

    /// True when everything except the identifier matches `other`.
    pub fn same_source_as(&self, other: &Entry) -> bool {
        self.position == other.position
            && self.magnitudes == other.magnitudes
            && self.annotation == other.annotation
    }
}

/// Named, ordered collection of entries.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Catalogue {
    name: String,
    entries: Vec<Entry>,
}

impl Catalogue {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            entries: Vec::new(),
        }
    }

    pub fn from_entries(name: impl Into<String>, entries: Vec<Entry>) -> Self {
        Self {
            name: name.into(),
            entries,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    pub fn push(&mut self, entry: Entry) {
        self.entries.push(entry);
    }

    /// Removes and returns every entry carrying `identifier`, preserving the
    /// order of both the removed and the remaining entries.
    ///
    /// An unknown identifier yields an empty vector.
    pub fn pop_identifier(&mut self, identifier: Identifier) -> Vec<Entry> {
        if !self.entries.iter().any(|e| e.identifier == identifier) {
            return Vec::new();
        }

        let (popped, kept): (Vec<Entry>, Vec<Entry>) = std::mem::take(&mut self.entries)
            .into_iter()
            .partition(|e| e.identifier == identifier);
        self.entries = kept;
        popped
    }

    /// First entry carrying `identifier`.
    pub fn get_by_identifier(&self, identifier: Identifier) -> Option<&Entry> {
        self.entries.iter().find(|e| e.identifier == identifier)
    }

    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    pub fn into_entries(self) -> Vec<Entry> {
        self.entries
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Entry> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn identifiers(&self) -> Vec<Identifier> {
        self.entries.iter().map(|e| e.identifier).collect()
    }

    pub fn has_unique_identifiers(&self) -> bool {
        let mut seen = hashbrown::HashSet::with_capacity(self.entries.len());
        self.entries.iter().all(|e| seen.insert(e.identifier))
    }

    /// The coordinate system shared by all entries; `None` when the
    /// catalogue is empty or mixes systems.
    pub fn coord_system(&self) -> Option<CoordSystem> {
        let first = self.entries.first()?.position.system();
        self.entries
            .iter()
            .all(|e| e.position.system() == first)
            .then_some(first)
    }
}

impl<'a> IntoIterator for &'a Catalogue {
    type Item = &'a Entry;
    type IntoIter = std::slice::Iter<'a, Entry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}
