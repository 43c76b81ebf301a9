//! Flux records of edge species and edge reactions.
//!
//! A flux ratio is the absolute rate of an edge entity divided by a characteristic rate of the
//! whole system at the same instant. Each simulation keeps the maximum ratio seen over time;
//! records of several conditions are merged by taking the per-entity maximum.
use crate::MechanismGeneration::reaction::ReactionId;
use crate::MechanismGeneration::species::SpeciesId;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// What an edge flux is divided by
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub enum FluxNormalization {
    /// sum of |r| over all core and edge reactions
    #[default]
    TotalFlux,
    /// euclidean norm of dC/dt over the core species
    CharacteristicCoreRate,
    /// gross production + consumption rate of one core species
    ReferenceSpecies(SpeciesId),
}

/// Ratio of `flux` to `normaliser`; a vanishing normaliser makes any non-zero flux infinitely significant
pub fn flux_ratio(flux: f64, normaliser: f64) -> f64 {
    let flux = flux.abs();
    if !(flux > 0.0) {
        0.0
    } else if normaliser > 0.0 && normaliser.is_finite() {
        flux / normaliser
    } else {
        f64::INFINITY
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct EntityFlux {
    pub max_ratio: f64,
    pub max_ratio_time: f64,
    /// net rate at the last evaluated instant, mol/(m3 s)
    pub final_rate: f64,
    /// (t, ratio) pairs, only filled when history recording is on
    pub history: Vec<(f64, f64)>,
}

impl EntityFlux {
    pub fn update(&mut self, t: f64, rate: f64, ratio: f64, record: bool) {
        if ratio > self.max_ratio {
            self.max_ratio = ratio;
            self.max_ratio_time = t;
        }
        self.final_rate = rate;
        if record {
            self.history.push((t, ratio));
        }
    }
}

/// Flux of every edge entity during one simulation
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct FluxRecord {
    pub species: BTreeMap<SpeciesId, EntityFlux>,
    pub reactions: BTreeMap<ReactionId, EntityFlux>,
}

impl FluxRecord {
    pub fn new(species: impl IntoIterator<Item = SpeciesId>, reactions: impl IntoIterator<Item = ReactionId>) -> Self {
        Self {
            species: species.into_iter().map(|id| (id, EntityFlux::default())).collect(),
            reactions: reactions.into_iter().map(|id| (id, EntityFlux::default())).collect(),
        }
    }

    pub fn species_ratio(&self, id: SpeciesId) -> Option<f64> {
        self.species.get(&id).map(|f| f.max_ratio)
    }

    pub fn reaction_ratio(&self, id: ReactionId) -> Option<f64> {
        self.reactions.get(&id).map(|f| f.max_ratio)
    }

    pub fn max_species_ratio(&self) -> f64 {
        self.species.values().map(|f| f.max_ratio).fold(0.0, f64::max)
    }
}

/// Per-entity maximum ratio over all conditions that completed
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MergedFlux {
    pub species: BTreeMap<SpeciesId, f64>,
    pub reactions: BTreeMap<ReactionId, f64>,
}

impl MergedFlux {
    /// The result does not depend on the order of `records`
    pub fn merge<'a>(records: impl IntoIterator<Item = &'a FluxRecord>) -> Self {
        let mut merged = MergedFlux::default();
        for record in records {
            for (id, flux) in &record.species {
                let entry = merged.species.entry(*id).or_insert(0.0);
                *entry = entry.max(flux.max_ratio);
            }
            for (id, flux) in &record.reactions {
                let entry = merged.reactions.entry(*id).or_insert(0.0);
                *entry = entry.max(flux.max_ratio);
            }
        }
        merged
    }

    /// species with ratio >= tolerance (inclusive)
    pub fn significant_species(&self, tolerance: f64) -> BTreeSet<SpeciesId> {
        self.species
            .iter()
            .filter(|(_, ratio)| **ratio >= tolerance)
            .map(|(id, _)| *id)
            .collect()
    }

    /// reactions with ratio >= tolerance (inclusive)
    pub fn significant_reactions(&self, tolerance: f64) -> BTreeSet<ReactionId> {
        self.reactions
            .iter()
            .filter(|(_, ratio)| **ratio >= tolerance)
            .map(|(id, _)| *id)
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.species.is_empty() && self.reactions.is_empty()
    }
}
