//! # Task Settings Module
//!
//! ## Purpose
//! Reads the JSON task file of a mechanism generation run and turns it into a ready
//! [`ReactionModel`]: seed species, reaction conditions, reaction families, a thermo library
//! and the numerical options of the simulator and of the enlargement loop.
//!
//! ## Task File Format
//! ```json
//! {
//!   "species": [
//!     {"label": "ethane", "adjacency": "1 C u0 {2,S} ..."},
//!     {"label": "N2", "reactive": false}
//!   ],
//!   "conditions": [
//!     {"temperature": 1200.0, "pressure": 1e5, "composition": {"ethane": 0.1, "N2": 0.9}}
//!   ],
//!   "options": {"end_time": 1e-3, "flux_significance_threshold": 0.1, "max_core_size": 50},
//!   "families": [
//!     {"kind": "BondFission", "rate": {"type": "elem", "Arrenius": [1e16, 0.0, 360000.0]}}
//!   ],
//!   "log_level": "info",
//!   "output_file": "model.json"
//! }
//! ```
//! Every section except `species`, `conditions` and `families` may be omitted.
//! Compositions are normalised to mole fractions summing to one; a condition without
//! `end_time` uses `options.end_time`.

use crate::MechanismGeneration::controller::{EnlargementSettings, ReactionModel};
use crate::MechanismGeneration::errors::MechanismError;
use crate::MechanismGeneration::families::ReactionFamily;
use crate::MechanismGeneration::flux::FluxNormalization;
use crate::MechanismGeneration::rate_rules::RateRuleDatabase;
use crate::MechanismGeneration::simulator::{ReactionCondition, SimulationSettings};
use crate::MechanismGeneration::species::{SpeciesId, SpeciesStructure};
use crate::Thermodynamics::nasa_poly::NasaPolynomial;
use log::{LevelFilter, info};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

fn default_true() -> bool {
    true
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Seed species of the model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeedSpeciesConfig {
    pub label: String,
    /// adjacency list; a species without one is identified by its label only
    #[serde(default)]
    pub adjacency: Option<String>,
    /// non-reactive species (bath gases) stay in the core but are never reacted
    #[serde(default = "default_true")]
    pub reactive: bool,
    #[serde(default)]
    pub thermo: Option<NasaPolynomial>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConditionConfig {
    /// K
    pub temperature: f64,
    /// Pa
    pub pressure: f64,
    /// label -> amount, normalised to mole fractions
    pub composition: BTreeMap<String, f64>,
    /// s
    #[serde(default)]
    pub end_time: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FluxNormalizationConfig {
    #[default]
    TotalFlux,
    CharacteristicCoreRate,
    /// label of a core species
    ReferenceSpecies(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelOptions {
    pub end_time: f64,
    pub absolute_tolerance: f64,
    pub relative_tolerance: f64,
    pub flux_significance_threshold: f64,
    pub max_core_size: usize,
    pub max_iterations: usize,
    pub flux_normalization: FluxNormalizationConfig,
    pub react_core_with_edge: bool,
    pub max_solver_steps: usize,
    pub wall_clock_limit_s: Option<f64>,
    pub early_termination: bool,
    pub interrupt_on_significant: bool,
    pub record_flux_history: bool,
    pub parallel_conditions: bool,
}

impl Default for ModelOptions {
    fn default() -> Self {
        let simulation = SimulationSettings::default();
        let enlargement = EnlargementSettings::default();
        Self {
            end_time: 1.0,
            absolute_tolerance: simulation.atol,
            relative_tolerance: simulation.rtol,
            flux_significance_threshold: simulation.threshold,
            max_core_size: enlargement.max_core_size,
            max_iterations: enlargement.max_iterations,
            flux_normalization: FluxNormalizationConfig::TotalFlux,
            react_core_with_edge: enlargement.react_core_with_edge,
            max_solver_steps: simulation.max_solver_steps,
            wall_clock_limit_s: None,
            early_termination: simulation.early_termination,
            interrupt_on_significant: simulation.interrupt_on_significant,
            record_flux_history: simulation.record_history,
            parallel_conditions: simulation.parallel_conditions,
        }
    }
}

impl ModelOptions {
    fn validate(&self) -> Result<(), MechanismError> {
        let positive = [
            ("end_time", self.end_time),
            ("absolute_tolerance", self.absolute_tolerance),
            ("relative_tolerance", self.relative_tolerance),
            ("flux_significance_threshold", self.flux_significance_threshold),
        ];
        for (name, value) in positive {
            if !(value.is_finite() && value > 0.0) {
                return Err(MechanismError::Config(format!(
                    "option {} must be positive and finite, got {}",
                    name, value
                )));
            }
        }
        if self.max_core_size == 0 || self.max_iterations == 0 || self.max_solver_steps == 0 {
            return Err(MechanismError::Config(
                "max_core_size, max_iterations and max_solver_steps must be at least 1".to_string(),
            ));
        }
        if let Some(limit) = self.wall_clock_limit_s {
            if !(limit.is_finite() && limit > 0.0) {
                return Err(MechanismError::Config(format!(
                    "wall_clock_limit_s must be positive, got {}",
                    limit
                )));
            }
        }
        Ok(())
    }

    pub fn simulation_settings(&self) -> SimulationSettings {
        SimulationSettings {
            atol: self.absolute_tolerance,
            rtol: self.relative_tolerance,
            threshold: self.flux_significance_threshold,
            max_solver_steps: self.max_solver_steps,
            wall_clock_limit: self.wall_clock_limit_s.map(Duration::from_secs_f64),
            early_termination: self.early_termination,
            interrupt_on_significant: self.interrupt_on_significant,
            record_history: self.record_flux_history,
            parallel_conditions: self.parallel_conditions,
            ..SimulationSettings::default()
        }
    }

    pub fn enlargement_settings(&self) -> EnlargementSettings {
        EnlargementSettings {
            simulation: self.simulation_settings(),
            max_core_size: self.max_core_size,
            max_iterations: self.max_iterations,
            react_core_with_edge: self.react_core_with_edge,
        }
    }
}

/// Complete description of a mechanism generation run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskConfig {
    pub species: Vec<SeedSpeciesConfig>,
    /// label -> adjacency list, used to give structures to species named in reaction libraries
    #[serde(default)]
    pub dictionary: BTreeMap<String, String>,
    pub conditions: Vec<ConditionConfig>,
    #[serde(default)]
    pub options: ModelOptions,
    pub families: Vec<ReactionFamily>,
    #[serde(default)]
    pub thermo_library: BTreeMap<String, NasaPolynomial>,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub output_file: Option<String>,
}

impl TaskConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, MechanismError> {
        let content = fs::read_to_string(path.as_ref())?;
        info!("task file {} loaded", path.as_ref().display());
        Self::from_json_str(&content)
    }

    pub fn from_json_str(json: &str) -> Result<Self, MechanismError> {
        let task: TaskConfig = serde_json::from_str(json)?;
        task.validate()?;
        Ok(task)
    }

    pub fn log_level(&self) -> Result<LevelFilter, MechanismError> {
        LevelFilter::from_str(&self.log_level)
            .map_err(|_| MechanismError::Config(format!("unknown log level {}", self.log_level)))
    }

    pub fn validate(&self) -> Result<(), MechanismError> {
        if self.species.is_empty() {
            return Err(MechanismError::Config("no seed species given".to_string()));
        }
        if self.conditions.is_empty() {
            return Err(MechanismError::Config("no reaction conditions given".to_string()));
        }
        if self.families.is_empty() {
            return Err(MechanismError::Config("no reaction families given".to_string()));
        }
        let mut labels = BTreeSet::new();
        for seed in &self.species {
            if !labels.insert(seed.label.as_str()) {
                return Err(MechanismError::Config(format!("seed species {} given twice", seed.label)));
            }
        }
        for (i, condition) in self.conditions.iter().enumerate() {
            if let Some(unknown) = condition.composition.keys().find(|l| !labels.contains(l.as_str())) {
                return Err(MechanismError::Config(format!(
                    "condition {}: {} is not a seed species",
                    i, unknown
                )));
            }
            if condition.composition.values().any(|x| !(x.is_finite() && *x >= 0.0)) {
                return Err(MechanismError::Config(format!(
                    "condition {}: amounts must be non-negative",
                    i
                )));
            }
            if condition.composition.values().sum::<f64>() <= 0.0 {
                return Err(MechanismError::Config(format!("condition {}: empty composition", i)));
            }
        }
        if let FluxNormalizationConfig::ReferenceSpecies(label) = &self.options.flux_normalization {
            if !labels.contains(label.as_str()) {
                return Err(MechanismError::Config(format!(
                    "flux reference species {} is not a seed species",
                    label
                )));
            }
        }
        self.options.validate()?;
        self.log_level()?;
        Ok(())
    }

    fn seed_structure(seed: &SeedSpeciesConfig) -> Result<SpeciesStructure, MechanismError> {
        match &seed.adjacency {
            Some(adjacency) => SpeciesStructure::from_adjacency_list(adjacency),
            None => Ok(SpeciesStructure::Label(seed.label.clone())),
        }
    }

    /// Structures known by label: the dictionary plus every seed given with an adjacency list
    fn structure_dictionary(&self) -> Result<BTreeMap<String, SpeciesStructure>, MechanismError> {
        let mut dictionary = BTreeMap::new();
        for (label, adjacency) in &self.dictionary {
            let structure = SpeciesStructure::from_adjacency_list(adjacency)
                .map_err(|e| MechanismError::Config(format!("dictionary entry {}: {}", label, e)))?;
            dictionary.insert(label.clone(), structure);
        }
        for seed in self.species.iter().filter(|s| s.adjacency.is_some()) {
            dictionary.insert(seed.label.clone(), Self::seed_structure(seed)?);
        }
        Ok(dictionary)
    }

    /// Builds the seeded model with its conditions, ready for `enlarge`
    pub fn build_model(&self) -> Result<ReactionModel, MechanismError> {
        self.validate()?;
        let dictionary = self.structure_dictionary()?;
        let database = RateRuleDatabase::new(self.families.clone(), &dictionary, self.thermo_library.clone())?;
        let mut model = ReactionModel::new(database, self.options.enlargement_settings());

        let mut ids: BTreeMap<&str, SpeciesId> = BTreeMap::new();
        for seed in &self.species {
            let id = model.add_seed_species(&seed.label, Self::seed_structure(seed)?, seed.reactive, seed.thermo.clone())?;
            ids.insert(seed.label.as_str(), id);
        }
        let lookup = |label: &str| {
            ids.get(label)
                .copied()
                .ok_or_else(|| MechanismError::Config(format!("{} is not a seed species", label)))
        };

        let normalization = match &self.options.flux_normalization {
            FluxNormalizationConfig::TotalFlux => FluxNormalization::TotalFlux,
            FluxNormalizationConfig::CharacteristicCoreRate => FluxNormalization::CharacteristicCoreRate,
            FluxNormalizationConfig::ReferenceSpecies(label) => FluxNormalization::ReferenceSpecies(lookup(label)?),
        };
        model.set_flux_normalization(normalization);

        let mut conditions = Vec::with_capacity(self.conditions.len());
        for condition in &self.conditions {
            let total: f64 = condition.composition.values().sum();
            let mut fractions = BTreeMap::new();
            for (label, amount) in &condition.composition {
                fractions.insert(lookup(label)?, amount / total);
            }
            conditions.push(ReactionCondition::new(
                condition.temperature,
                condition.pressure,
                fractions,
                condition.end_time.unwrap_or(self.options.end_time),
            ));
        }
        model.set_conditions(conditions)?;
        info!(
            "model built: {} seed species, {} conditions, {} reaction families",
            self.species.len(),
            self.conditions.len(),
            self.families.len()
        );
        Ok(model)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MechanismGeneration::controller::EnlargementState;
    use crate::MechanismGeneration::families::ReactionFamilyRule;
    use approx::assert_relative_eq;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const TASK: &str = r#"{
        "species": [
            {"label": "A"},
            {"label": "N2", "reactive": false}
        ],
        "conditions": [
            {"temperature": 1000.0, "pressure": 1e5, "composition": {"A": 1.0, "N2": 3.0}},
            {"temperature": 1200.0, "pressure": 2e5, "composition": {"A": 2.0}, "end_time": 0.5}
        ],
        "options": {"end_time": 2.0, "max_core_size": 10},
        "families": [
            {"kind": "Library", "name": "decomposition", "reactions": [
                {"reactants": ["A"], "products": ["B", "C"], "rate": {"type": "elem", "Arrenius": [1.0, 0.0, 0.0]}}
            ]}
        ]
    }"#;

    fn with_options(options: &str) -> String {
        TASK.replace(r#""options": {"end_time": 2.0, "max_core_size": 10}"#, options)
    }

    #[test]
    fn test_defaults() {
        let task = TaskConfig::from_json_str(TASK).unwrap();
        assert_eq!(task.log_level().unwrap(), LevelFilter::Info);
        assert_eq!(task.output_file, None);
        assert_eq!(task.options.max_core_size, 10);
        assert_eq!(task.options.max_iterations, 50);
        assert_eq!(task.options.flux_normalization, FluxNormalizationConfig::TotalFlux);
        assert!(task.species[0].reactive);
        assert!(!task.species[1].reactive);
        let settings = task.options.enlargement_settings();
        assert_eq!(settings.simulation.atol, 1e-12);
        assert_eq!(settings.simulation.wall_clock_limit, None);
        assert_eq!(settings.max_core_size, 10);
    }

    #[test]
    fn test_task_survives_json_round_trip() {
        let task = TaskConfig::from_json_str(TASK).unwrap();
        let text = serde_json::to_string_pretty(&task).unwrap();
        let reread = TaskConfig::from_json_str(&text).unwrap();
        // families carry rate expressions, so the task is compared part by part
        assert_eq!(reread.species, task.species);
        assert_eq!(reread.conditions, task.conditions);
        assert_eq!(reread.options, task.options);
        assert_eq!(reread.families.len(), task.families.len());
        assert_eq!(reread.families[0].family_name(), "decomposition");
    }

    #[test]
    fn test_load_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(TASK.as_bytes()).unwrap();
        let task = TaskConfig::load(file.path()).unwrap();
        assert_eq!(task.conditions.len(), 2);
        assert!(matches!(
            TaskConfig::load("no/such/task.json"),
            Err(MechanismError::Io(_))
        ));
    }

    #[test]
    fn test_build_model_normalises_compositions() {
        let task = TaskConfig::from_json_str(TASK).unwrap();
        let model = task.build_model().unwrap();
        assert_eq!(model.state(), EnlargementState::Generating);
        let a = model.registry().find_by_label("A").unwrap();
        let n2 = model.registry().find_by_label("N2").unwrap();
        let conditions = model.conditions();
        assert_relative_eq!(conditions[0].mole_fractions[&a], 0.25);
        assert_relative_eq!(conditions[0].mole_fractions[&n2], 0.75);
        assert_eq!(conditions[0].end_time, 2.0);
        assert_relative_eq!(conditions[1].mole_fractions[&a], 1.0);
        assert_eq!(conditions[1].end_time, 0.5);
        assert_eq!(conditions[1].pressure, 2e5);
    }

    #[test]
    fn test_built_model_enlarges() {
        let mut model = TaskConfig::from_json_str(TASK).unwrap().build_model().unwrap();
        let outcome = model.enlarge().unwrap();
        let core = outcome.model.core_labels();
        for label in ["A", "B", "C", "N2"] {
            assert!(core.contains(label));
        }
    }

    #[test]
    fn test_flux_normalization_options() {
        let task = TaskConfig::from_json_str(&with_options(
            r#""options": {"flux_normalization": {"reference_species": "A"}, "wall_clock_limit_s": 2.5}"#,
        ))
        .unwrap();
        let model = task.build_model().unwrap();
        let a = model.registry().find_by_label("A").unwrap();
        let simulation = &model.settings().simulation;
        assert_eq!(simulation.normalization, FluxNormalization::ReferenceSpecies(a));
        assert_eq!(simulation.wall_clock_limit, Some(Duration::from_millis(2500)));

        let task = TaskConfig::from_json_str(&with_options(
            r#""options": {"flux_normalization": "characteristic_core_rate"}"#,
        ))
        .unwrap();
        assert_eq!(
            task.options.flux_normalization,
            FluxNormalizationConfig::CharacteristicCoreRate
        );

        let unknown = TaskConfig::from_json_str(&with_options(
            r#""options": {"flux_normalization": {"reference_species": "X"}}"#,
        ));
        assert!(matches!(unknown, Err(MechanismError::Config(_))));
    }

    #[test]
    fn test_invalid_tasks() {
        let bad_threshold =
            TaskConfig::from_json_str(&with_options(r#""options": {"flux_significance_threshold": 0.0}"#));
        assert!(matches!(bad_threshold, Err(MechanismError::Config(_))));

        let bad_level = TaskConfig::from_json_str(&TASK.replace(r#""species""#, r#""log_level": "loud", "species""#));
        assert!(matches!(bad_level, Err(MechanismError::Config(_))));

        let unknown_species = TaskConfig::from_json_str(&TASK.replace(r#"{"A": 2.0}"#, r#"{"Z": 2.0}"#));
        assert!(matches!(unknown_species, Err(MechanismError::Config(_))));

        let empty = TaskConfig::from_json_str(&TASK.replace(r#"{"A": 2.0}"#, r#"{"A": 0.0}"#));
        assert!(matches!(empty, Err(MechanismError::Config(_))));

        let duplicate = TaskConfig::from_json_str(&TASK.replace(r#"{"label": "N2", "reactive": false}"#, r#"{"label": "A"}"#));
        assert!(matches!(duplicate, Err(MechanismError::Config(_))));

        let malformed = TaskConfig::from_json_str("{\"species\": []");
        assert!(matches!(malformed, Err(MechanismError::Serde(_))));
    }

    #[test]
    fn test_seed_with_adjacency_list() {
        let task = TASK.replace(
            r#"{"label": "A"}"#,
            r#"{"label": "A", "adjacency": "1 C u0 {2,S} {3,S} {4,S} {5,S}\n2 H u0 {1,S}\n3 H u0 {1,S}\n4 H u0 {1,S}\n5 H u0 {1,S}"}"#,
        );
        let model = TaskConfig::from_json_str(&task).unwrap().build_model().unwrap();
        let a = model.registry().find_by_label("A").unwrap();
        let species = model.registry().species(a).unwrap();
        assert!(species.structure.as_graph().is_some());
        assert_eq!(species.label, "A");
        // the additivity estimate is used when no thermo is given
        assert!(species.thermo.is_some());
    }
}
