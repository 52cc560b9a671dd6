//! Action catalog
//!
//! The catalog is loaded once at startup and shared read-only across cycles.
//! Catalog order defines the class index the scorer uses for each action.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

use crate::error::{QikiError, Result};

/// Inclusive `[min, max]` bound for one parameter
///
/// Serialized as a two-element array.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "(f64, f64)", into = "(f64, f64)")]
pub struct ParamBounds {
    pub min: f64,
    pub max: f64,
}

impl ParamBounds {
    pub fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    /// Whether `value` lies inside the bound. NaN is never inside.
    pub fn contains(&self, value: f64) -> bool {
        value >= self.min && value <= self.max
    }

    fn is_well_formed(&self) -> bool {
        self.min.is_finite() && self.max.is_finite() && self.min <= self.max
    }
}

impl From<(f64, f64)> for ParamBounds {
    fn from((min, max): (f64, f64)) -> Self {
        Self { min, max }
    }
}

impl From<ParamBounds> for (f64, f64) {
    fn from(bounds: ParamBounds) -> Self {
        (bounds.min, bounds.max)
    }
}

/// One declared action and its parameter bounds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionSpec {
    pub name: String,
    /// Declared parameters, ordered by name
    #[serde(default)]
    pub params: BTreeMap<String, ParamBounds>,
}

impl ActionSpec {
    /// An action without parameters
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            params: BTreeMap::new(),
        }
    }

    /// Declare a parameter bound
    pub fn with_param(mut self, name: impl Into<String>, min: f64, max: f64) -> Self {
        self.params.insert(name.into(), ParamBounds::new(min, max));
        self
    }

    pub fn bounds(&self, param: &str) -> Option<&ParamBounds> {
        self.params.get(param)
    }
}

#[derive(Deserialize)]
struct CatalogFile {
    #[serde(default)]
    actions: Vec<ActionSpec>,
}

/// Immutable mapping from action name to declared parameter bounds
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "CatalogFile")]
pub struct ActionCatalog {
    actions: Vec<ActionSpec>,
    #[serde(skip)]
    index: HashMap<String, usize>,
}

impl ActionCatalog {
    /// Build a catalog, rejecting empty names, duplicates and malformed bounds
    pub fn new(actions: Vec<ActionSpec>) -> Result<Self> {
        let mut index = HashMap::with_capacity(actions.len());
        for (i, action) in actions.iter().enumerate() {
            if action.name.trim().is_empty() {
                return Err(QikiError::EmptyActionName { index: i });
            }
            for (param, bounds) in &action.params {
                if !bounds.is_well_formed() {
                    return Err(QikiError::InvalidBounds {
                        action: action.name.clone(),
                        param: param.clone(),
                        min: bounds.min,
                        max: bounds.max,
                    });
                }
            }
            if index.insert(action.name.clone(), i).is_some() {
                return Err(QikiError::DuplicateAction {
                    name: action.name.clone(),
                });
            }
        }
        Ok(Self { actions, index })
    }

    /// Parse a catalog from `{"actions": [...]}` JSON
    pub fn from_json(json: &str) -> std::result::Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn get(&self, name: &str) -> Option<&ActionSpec> {
        self.index.get(name).map(|&i| &self.actions[i])
    }

    /// Action at a class index
    pub fn by_index(&self, index: usize) -> Option<&ActionSpec> {
        self.actions.get(index)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    pub fn actions(&self) -> &[ActionSpec] {
        &self.actions
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }
}

impl TryFrom<CatalogFile> for ActionCatalog {
    type Error = QikiError;

    fn try_from(file: CatalogFile) -> Result<Self> {
        Self::new(file.actions)
    }
}
