use crate::config::FamilyConfig;
use crate::types::{FamilyMinimum, Feature};
use rayon::prelude::*;
use serde::Serialize;
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Error, Clone, PartialEq)]
pub enum SummaryError {
    #[error("dataset contains no features")]
    EmptyDataset,
    #[error("no attributes matched family '{family}'")]
    NoMatchingAttribute { family: String },
}

/// Index of the first configured family whose prefix starts `attribute`.
pub fn family_of(attribute: &str, families: &[FamilyConfig]) -> Option<usize> {
    families.iter().position(|f| attribute.starts_with(&f.prefix))
}

/// `"Pop_1980"` -> `Some("1980")`. Attributes without `_` have no period.
pub fn period_of(attribute: &str) -> Option<&str> {
    attribute.split_once('_').map(|(_, period)| period)
}

/// Per-family minima, one slot per configured family.
fn fold_minima(features: &[Feature], families: &[FamilyConfig]) -> Vec<Option<f64>> {
    features
        .par_iter()
        .fold(
            || vec![None; families.len()],
            |mut acc: Vec<Option<f64>>, feature| {
                for (name, &value) in &feature.attributes {
                    if let Some(idx) = family_of(name, families) {
                        acc[idx] = Some(acc[idx].map_or(value, |m: f64| m.min(value)));
                    }
                }
                acc
            },
        )
        .reduce(
            || vec![None; families.len()],
            |a, b| {
                a.into_iter()
                    .zip(b)
                    .map(|pair| match pair {
                        (Some(x), Some(y)) => Some(x.min(y)),
                        (x, y) => x.or(y),
                    })
                    .collect()
            },
        )
}

/// Minimum value per configured family across every feature and period.
///
/// Fails on an empty dataset, or if any configured family matched no attribute.
pub fn summarize(features: &[Feature], families: &[FamilyConfig]) -> Result<FamilyMinimum, SummaryError> {
    let (minima, missing) = summarize_partial(features, families)?;
    if let Some(err) = missing.into_iter().next() {
        return Err(err);
    }
    Ok(minima)
}

/// Like [`summarize`], but families without values are reported instead of failing the call.
pub fn summarize_partial(
    features: &[Feature],
    families: &[FamilyConfig],
) -> Result<(FamilyMinimum, Vec<SummaryError>), SummaryError> {
    if features.is_empty() {
        return Err(SummaryError::EmptyDataset);
    }

    let mut minima = FamilyMinimum::new();
    let mut missing = Vec::new();

    for (family, min) in families.iter().zip(fold_minima(features, families)) {
        match min {
            Some(min) => {
                debug!(family = %family.name, min, "family minimum");
                minima.insert(family.name.clone(), min);
            }
            None => {
                warn!(family = %family.name, prefix = %family.prefix, "no attributes matched family");
                missing.push(SummaryError::NoMatchingAttribute {
                    family: family.name.clone(),
                });
            }
        }
    }

    Ok((minima, missing))
}

/// Largest value per family; used for legend reference circles.
pub fn family_maxima(features: &[Feature], families: &[FamilyConfig]) -> BTreeMap<String, f64> {
    let mut maxima: BTreeMap<String, f64> = BTreeMap::new();
    for feature in features {
        for (name, &value) in &feature.attributes {
            if let Some(idx) = family_of(name, families) {
                maxima
                    .entry(families[idx].name.clone())
                    .and_modify(|m| *m = m.max(value))
                    .or_insert(value);
            }
        }
    }
    maxima
}

/// The ordered attributes of one family; a slider steps through these.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct AttributeSequence {
    pub family: String,
    pub attributes: Vec<String>,
}

impl AttributeSequence {
    pub fn len(&self) -> usize {
        self.attributes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.attributes.is_empty()
    }

    /// Attribute at `index`, clamped into range.
    pub fn get_clamped(&self, index: usize) -> Option<&str> {
        let last = self.attributes.len().checked_sub(1)?;
        self.attributes.get(index.min(last)).map(String::as_str)
    }

    /// Moves `index` by `delta` steps without wrapping past either end.
    pub fn step(&self, index: usize, delta: isize) -> usize {
        let last = self.attributes.len().saturating_sub(1);
        let moved = if delta < 0 {
            index.saturating_sub(delta.unsigned_abs())
        } else {
            index.saturating_add(delta as usize)
        };
        moved.min(last)
    }

    pub fn position(&self, attribute: &str) -> Option<usize> {
        self.attributes.iter().position(|a| a == attribute)
    }
}

/// Numeric periods first in numeric order, then everything else lexicographically.
fn compare_attributes(a: &str, b: &str) -> Ordering {
    let key = |s: &str| period_of(s).and_then(|p| p.parse::<f64>().ok());
    match (key(a), key(b)) {
        (Some(x), Some(y)) => x.total_cmp(&y).then_with(|| a.cmp(b)),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => a.cmp(b),
    }
}

/// One sequence per configured family that has at least one attribute in the data.
pub fn attribute_sequences(features: &[Feature], families: &[FamilyConfig]) -> Vec<AttributeSequence> {
    let mut grouped: Vec<BTreeSet<&str>> = vec![BTreeSet::new(); families.len()];
    for feature in features {
        for name in feature.attributes.keys() {
            if let Some(idx) = family_of(name, families) {
                grouped[idx].insert(name.as_str());
            }
        }
    }

    families
        .iter()
        .zip(grouped)
        .filter(|(_, names)| !names.is_empty())
        .map(|(family, names)| {
            let mut attributes: Vec<String> = names.into_iter().map(str::to_string).collect();
            attributes.sort_by(|a, b| compare_attributes(a, b));
            AttributeSequence {
                family: family.name.clone(),
                attributes,
            }
        })
        .collect()
}
