use crate::Kinetics::molmass::hill_formula;
use crate::Kinetics::rate_constants::RateExpression;
use crate::MechanismGeneration::errors::MechanismError;
use crate::MechanismGeneration::reaction::ReactionId;
use crate::MechanismGeneration::registry::Registry;
use crate::MechanismGeneration::species::{ModelStatus, SpeciesId, SpeciesStructure};
use crate::Thermodynamics::nasa_poly::NasaPolynomial;
use log::info;
use prettytable::{Table, row};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpeciesRecord {
    pub id: SpeciesId,
    pub label: String,
    pub key: String,
    pub formula: Option<String>,
    /// g/mol
    pub molar_mass: Option<f64>,
    pub status: ModelStatus,
    pub created_iteration: usize,
    pub reactive: bool,
    pub adjacency_list: Option<String>,
    pub thermo: Option<NasaPolynomial>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReactionRecord {
    pub id: ReactionId,
    pub equation: String,
    pub reactants: Vec<String>,
    pub products: Vec<String>,
    pub family: String,
    pub alternative_families: Vec<String>,
    pub degeneracy: u32,
    pub reversible: bool,
    /// per-site rate; multiply by `degeneracy` for the reaction rate
    pub rate: RateExpression,
    pub status: ModelStatus,
    pub created_iteration: usize,
}

/// Stable copy of the reaction model: everything a serializer needs, detached from the registry
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ModelSnapshot {
    /// last enlargement cycle reflected in the snapshot
    pub iteration: usize,
    pub species: Vec<SpeciesRecord>,
    pub reactions: Vec<ReactionRecord>,
}

impl ModelSnapshot {
    pub fn from_registry(registry: &Registry) -> Self {
        let species = registry
            .all_species()
            .iter()
            .map(|s| {
                let (formula, adjacency_list) = match &s.structure {
                    SpeciesStructure::Graph(graph) => (Some(graph.formula()), Some(graph.to_adjacency_list())),
                    SpeciesStructure::Label(_) => (s.structure.element_counts().map(|c| hill_formula(&c)), None),
                };
                SpeciesRecord {
                    id: s.id,
                    label: s.label.clone(),
                    key: s.key.clone(),
                    formula,
                    molar_mass: s.molar_mass(),
                    status: s.status,
                    created_iteration: s.created_iteration,
                    reactive: s.reactive,
                    adjacency_list,
                    thermo: s.thermo.clone(),
                }
            })
            .collect();
        let labels = |ids: &[SpeciesId]| ids.iter().map(|id| registry.label(*id)).collect::<Vec<_>>();
        let reactions = registry
            .all_reactions()
            .iter()
            .map(|r| ReactionRecord {
                id: r.id,
                equation: r.equation(|id| registry.label(id)),
                reactants: labels(&r.reactants),
                products: labels(&r.products),
                family: r.family.clone(),
                alternative_families: r.alternative_families.clone(),
                degeneracy: r.degeneracy,
                reversible: r.reversible,
                rate: r.rate.clone(),
                status: r.status,
                created_iteration: r.created_iteration,
            })
            .collect();
        Self {
            iteration: registry.iteration(),
            species,
            reactions,
        }
    }

    pub fn core_species_count(&self) -> usize {
        self.species.iter().filter(|s| s.status == ModelStatus::Core).count()
    }

    pub fn core_reactions_count(&self) -> usize {
        self.reactions.iter().filter(|r| r.status == ModelStatus::Core).count()
    }

    pub fn edge_species_count(&self) -> usize {
        self.species.len() - self.core_species_count()
    }

    pub fn edge_reactions_count(&self) -> usize {
        self.reactions.len() - self.core_reactions_count()
    }

    pub fn core_labels(&self) -> BTreeSet<String> {
        self.species
            .iter()
            .filter(|s| s.status == ModelStatus::Core)
            .map(|s| s.label.clone())
            .collect()
    }

    pub fn edge_labels(&self) -> BTreeSet<String> {
        self.species
            .iter()
            .filter(|s| s.status == ModelStatus::Edge)
            .map(|s| s.label.clone())
            .collect()
    }

    /// the final mechanism: core species and core reactions only
    pub fn core_only(&self) -> ModelSnapshot {
        ModelSnapshot {
            iteration: self.iteration,
            species: self
                .species
                .iter()
                .filter(|s| s.status == ModelStatus::Core)
                .cloned()
                .collect(),
            reactions: self
                .reactions
                .iter()
                .filter(|r| r.status == ModelStatus::Core)
                .cloned()
                .collect(),
        }
    }

    pub fn save_json<P: AsRef<Path>>(&self, path: P) -> Result<(), MechanismError> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path.as_ref(), json)?;
        info!("model written to {}", path.as_ref().display());
        Ok(())
    }

    pub fn load_json<P: AsRef<Path>>(path: P) -> Result<Self, MechanismError> {
        let content = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// (equation, symbolic rate constant k(T, M) at pressure `P`) of the core reactions
    pub fn rate_table(&self, P: f64) -> Vec<(String, String)> {
        self.reactions
            .iter()
            .filter(|r| r.status == ModelStatus::Core)
            .map(|r| {
                let rate = if r.degeneracy == 1 {
                    r.rate.clone()
                } else {
                    r.rate.scaled(r.degeneracy as f64)
                };
                (r.equation.clone(), format!("{}", rate.K_sym(P)))
            })
            .collect()
    }

    pub fn pretty_print(&self) {
        let mut species_table = Table::new();
        species_table.add_row(row!["Id", "Label", "Formula", "M, g/mol", "Status", "Iteration"]);
        for s in &self.species {
            species_table.add_row(row![
                s.id,
                s.label,
                s.formula.clone().unwrap_or_default(),
                s.molar_mass.map(|m| format!("{:.3}", m)).unwrap_or_default(),
                format!("{:?}", s.status),
                s.created_iteration
            ]);
        }
        species_table.printstd();

        let mut reaction_table = Table::new();
        reaction_table.add_row(row!["Id", "Equation", "Family", "Degeneracy", "Status", "Iteration"]);
        for r in &self.reactions {
            reaction_table.add_row(row![
                r.id,
                r.equation,
                r.family,
                r.degeneracy,
                format!("{:?}", r.status),
                r.created_iteration
            ]);
        }
        reaction_table.printstd();
        println!(
            "core: {} species, {} reactions; edge: {} species, {} reactions",
            self.core_species_count(),
            self.core_reactions_count(),
            self.edge_species_count(),
            self.edge_reactions_count()
        );
    }
}
