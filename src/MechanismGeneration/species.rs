use crate::Kinetics::molmass::calculate_molar_mass;
use crate::MechanismGeneration::errors::MechanismError;
use crate::MechanismGeneration::structure::MolecularGraph;
use crate::Thermodynamics::nasa_poly::NasaPolynomial;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Stable handle of a species inside the registry arena
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SpeciesId(pub usize);

impl fmt::Display for SpeciesId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "S{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ModelStatus {
    Core,
    Edge,
}

/// How a species is described: a molecular graph, or only a name for species
/// that come from reaction libraries without structures
#[derive(Debug, Clone, PartialEq)]
pub enum SpeciesStructure {
    Label(String),
    Graph(MolecularGraph),
}

impl SpeciesStructure {
    pub fn from_adjacency_list(text: &str) -> Result<Self, MechanismError> {
        Ok(SpeciesStructure::Graph(MolecularGraph::from_adjacency_list(text)?))
    }

    /// identity key; structures with equal keys are the same species
    pub fn canonical_key(&self) -> String {
        match self {
            SpeciesStructure::Label(label) => format!("label:{}", label),
            SpeciesStructure::Graph(graph) => format!("graph:{}", graph.canonical_key()),
        }
    }

    pub fn validate(&self) -> Result<(), MechanismError> {
        match self {
            SpeciesStructure::Label(label) if label.trim().is_empty() => Err(
                MechanismError::Structural("species label must not be empty".to_string()),
            ),
            SpeciesStructure::Label(_) => Ok(()),
            SpeciesStructure::Graph(graph) => graph.validate(),
        }
    }

    pub fn as_graph(&self) -> Option<&MolecularGraph> {
        match self {
            SpeciesStructure::Graph(graph) => Some(graph),
            SpeciesStructure::Label(_) => None,
        }
    }

    /// element counts of a graph, or of a label that reads as a formula ("CH4", "O2")
    pub fn element_counts(&self) -> Option<BTreeMap<String, usize>> {
        match self {
            SpeciesStructure::Graph(graph) => Some(graph.element_counts()),
            SpeciesStructure::Label(label) => calculate_molar_mass(label).ok().map(|(_, c)| c),
        }
    }

    /// g/mol
    pub fn molar_mass(&self) -> Option<f64> {
        match self {
            SpeciesStructure::Graph(graph) => graph.molar_mass(),
            SpeciesStructure::Label(label) => calculate_molar_mass(label).ok().map(|(m, _)| m),
        }
    }

    /// name used for species discovered without a label
    pub fn default_label(&self) -> String {
        match self {
            SpeciesStructure::Label(label) => label.clone(),
            SpeciesStructure::Graph(graph) => graph.formula(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Species {
    pub id: SpeciesId,
    pub label: String,
    pub structure: SpeciesStructure,
    pub key: String,
    pub thermo: Option<NasaPolynomial>,
    pub status: ModelStatus,
    /// enlargement cycle in which the species was first seen (0 for seeds)
    pub created_iteration: usize,
    /// false for bath gases: they are simulated but never reacted by the generator
    pub reactive: bool,
}

impl Species {
    pub fn is_core(&self) -> bool {
        self.status == ModelStatus::Core
    }
    pub fn molar_mass(&self) -> Option<f64> {
        self.structure.molar_mass()
    }
}
