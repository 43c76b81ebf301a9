//! Model Enlargement Controller.
//!
//! One enlargement cycle walks the states
//! ```text
//! Generating -> Simulating -> Evaluating -> Enlarging -> Generating ...
//!                                        \-> Converged
//! ```
//! and any error moves the model to `Terminated`. The registry is mutated only while
//! generating and enlarging; simulations work on a read-only [`CoreNetwork`].
use crate::MechanismGeneration::errors::{EnlargementFailure, MechanismError};
use crate::MechanismGeneration::flux::{FluxNormalization, MergedFlux};
use crate::MechanismGeneration::generator::NetworkGenerator;
use crate::MechanismGeneration::rate_rules::RateRuleDatabase;
use crate::MechanismGeneration::reaction::ReactionId;
use crate::MechanismGeneration::registry::Registry;
use crate::MechanismGeneration::simulator::{
    CoreNetwork, KineticSimulator, ReactionCondition, SimulationOutcome, SimulationSettings,
};
use crate::MechanismGeneration::snapshot::ModelSnapshot;
use crate::MechanismGeneration::species::{SpeciesId, SpeciesStructure};
use crate::Thermodynamics::nasa_poly::NasaPolynomial;
use log::{debug, error, info, warn};
use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;
use std::sync::atomic::AtomicBool;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnlargementState {
    Generating,
    Simulating,
    Evaluating,
    Enlarging,
    Converged,
    Terminated,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EnlargementSettings {
    pub simulation: SimulationSettings,
    /// enlargement stops (converged, capped) once the core has this many species
    pub max_core_size: usize,
    pub max_iterations: usize,
    pub react_core_with_edge: bool,
}

impl Default for EnlargementSettings {
    fn default() -> Self {
        Self {
            simulation: SimulationSettings::default(),
            max_core_size: 200,
            max_iterations: 50,
            react_core_with_edge: false,
        }
    }
}

/// What happened in one enlargement cycle
#[derive(Debug, Clone, PartialEq, Default)]
pub struct IterationSummary {
    pub iteration: usize,
    pub new_species: usize,
    pub new_reactions: usize,
    pub conditions_simulated: usize,
    pub conditions_failed: usize,
    pub max_species_ratio: f64,
    pub promoted_species: Vec<SpeciesId>,
    pub promoted_reactions: Vec<ReactionId>,
    /// (core species, core reactions, edge species, edge reactions) at the end of the cycle
    pub sizes: (usize, usize, usize, usize),
}

#[derive(Debug, Clone)]
pub struct EnlargementOutcome {
    pub model: ModelSnapshot,
    pub iterations: usize,
    /// true when enlargement stopped at the core size cap
    pub capped: bool,
    pub warnings: Vec<String>,
    pub history: Vec<IterationSummary>,
}

/// The reaction model under construction together with everything needed to enlarge it
pub struct ReactionModel {
    registry: Registry,
    database: RateRuleDatabase,
    generator: NetworkGenerator,
    settings: EnlargementSettings,
    conditions: Vec<ReactionCondition>,
    state: EnlargementState,
    iteration: usize,
    capped: bool,
    current: IterationSummary,
    outcomes: Vec<SimulationOutcome>,
    merged: MergedFlux,
    flagged_species: BTreeSet<SpeciesId>,
    flagged_reactions: BTreeSet<ReactionId>,
    warnings: Vec<String>,
    history: Vec<IterationSummary>,
    warned_fallbacks: HashSet<ReactionId>,
    cancel: Arc<AtomicBool>,
}

impl ReactionModel {
    pub fn new(database: RateRuleDatabase, settings: EnlargementSettings) -> Self {
        Self {
            registry: Registry::new(),
            database,
            generator: NetworkGenerator::new(settings.react_core_with_edge),
            settings,
            conditions: Vec::new(),
            state: EnlargementState::Generating,
            iteration: 0,
            capped: false,
            current: IterationSummary::default(),
            outcomes: Vec::new(),
            merged: MergedFlux::default(),
            flagged_species: BTreeSet::new(),
            flagged_reactions: BTreeSet::new(),
            warnings: Vec::new(),
            history: Vec::new(),
            warned_fallbacks: HashSet::new(),
            cancel: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Adds a seed species to the core. Thermo is estimated when none is given.
    pub fn add_seed_species(
        &mut self,
        label: &str,
        structure: SpeciesStructure,
        reactive: bool,
        thermo: Option<NasaPolynomial>,
    ) -> Result<SpeciesId, MechanismError> {
        if self.iteration > 0 {
            return Err(MechanismError::Config(format!(
                "seed species {} added after enlargement started",
                label
            )));
        }
        let thermo = thermo.or_else(|| self.database.estimate_thermo_for(label, &structure));
        self.registry.add_seed(label, structure, reactive, thermo)
    }

    /// Replaces the reaction conditions; each must start from core species only
    pub fn set_conditions(&mut self, conditions: Vec<ReactionCondition>) -> Result<(), MechanismError> {
        let network = CoreNetwork::from_registry(&self.registry);
        for condition in &conditions {
            condition.validate(&network)?;
        }
        self.conditions = conditions;
        Ok(())
    }

    pub fn conditions(&self) -> &[ReactionCondition] {
        &self.conditions
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn state(&self) -> EnlargementState {
        self.state
    }

    pub fn iteration(&self) -> usize {
        self.iteration
    }

    pub fn settings(&self) -> &EnlargementSettings {
        &self.settings
    }

    pub fn set_flux_normalization(&mut self, normalization: FluxNormalization) {
        self.settings.simulation.normalization = normalization;
    }

    pub fn history(&self) -> &[IterationSummary] {
        &self.history
    }

    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    /// simulation outcomes of the last cycle that ran simulations
    pub fn last_outcomes(&self) -> &[SimulationOutcome] {
        &self.outcomes
    }

    /// Setting the flag aborts running simulations; they are reported as failed conditions
    pub fn cancel_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    pub fn snapshot(&self) -> ModelSnapshot {
        ModelSnapshot::from_registry(&self.registry)
    }

    fn non_convergence(&self, message: String) -> MechanismError {
        MechanismError::NonConvergence {
            iterations: self.iteration,
            core_species: self.registry.core_species_count(),
            message,
        }
    }

    fn generating(&mut self) -> Result<EnlargementState, MechanismError> {
        if self.registry.core_species_count() >= self.settings.max_core_size {
            info!("core size cap of {} species reached", self.settings.max_core_size);
            self.capped = true;
            return Ok(EnlargementState::Converged);
        }
        if self.iteration >= self.settings.max_iterations {
            return Err(self.non_convergence(format!(
                "max_iterations = {} reached with the edge still significant",
                self.settings.max_iterations
            )));
        }
        self.iteration += 1;
        self.registry.set_iteration(self.iteration);
        info!("iteration {}: generating", self.iteration);
        let report = self.generator.generate(&mut self.registry, &self.database)?;
        self.current = IterationSummary {
            iteration: self.iteration,
            new_species: report.new_species.len(),
            new_reactions: report.new_reactions,
            ..IterationSummary::default()
        };
        Ok(EnlargementState::Simulating)
    }

    fn simulating(&mut self) -> Result<EnlargementState, MechanismError> {
        let network = CoreNetwork::from_registry(&self.registry);
        for id in network.irreversible_fallbacks() {
            if self.warned_fallbacks.insert(*id) {
                let equation = self.registry.reaction(*id)?.equation(|s| self.registry.label(s));
                warn!("{} ({}) lacks thermo data and is simulated as irreversible", id, equation);
            }
        }
        self.outcomes.clear();
        if !network.has_edge() {
            info!("iteration {}: edge is empty, nothing to simulate", self.iteration);
            self.merged = MergedFlux::default();
            return Ok(EnlargementState::Evaluating);
        }
        info!(
            "iteration {}: simulating {} conditions ({} core species, {} edge species)",
            self.iteration,
            self.conditions.len(),
            network.core_species().len(),
            network.edge_species().len()
        );
        let simulator = KineticSimulator::new(self.settings.simulation.clone());
        let results = simulator.simulate_all(&network, &self.conditions, Some(self.cancel.as_ref()));
        let mut failures = Vec::new();
        for result in results {
            match result {
                Ok(outcome) => self.outcomes.push(outcome),
                Err(e @ MechanismError::Integration { .. }) => {
                    warn!("iteration {}: {}", self.iteration, e);
                    self.warnings.push(format!("iteration {}: {}", self.iteration, e));
                    failures.push(e);
                }
                Err(e) => return Err(e),
            }
        }
        self.current.conditions_simulated = self.outcomes.len();
        self.current.conditions_failed = failures.len();
        if self.outcomes.is_empty() {
            let message = failures
                .iter()
                .map(|e| e.to_string())
                .collect::<Vec<_>>()
                .join("; ");
            let condition = match failures.first() {
                Some(MechanismError::Integration { condition, .. }) => *condition,
                _ => 0,
            };
            return Err(MechanismError::Integration {
                condition,
                message: format!("every condition failed: {}", message),
            });
        }
        self.merged = MergedFlux::merge(self.outcomes.iter().map(|o| &o.flux));
        Ok(EnlargementState::Evaluating)
    }

    fn evaluating(&mut self) -> Result<EnlargementState, MechanismError> {
        let tolerance = self.settings.simulation.threshold;
        self.current.max_species_ratio = self.merged.species.values().copied().fold(0.0, f64::max);
        self.flagged_species = self.merged.significant_species(tolerance);
        self.flagged_reactions = self.merged.significant_reactions(tolerance);
        for id in &self.flagged_species {
            debug!(
                "{} ({}) significant, ratio {:.3e}",
                id,
                self.registry.label(*id),
                self.merged.species.get(id).copied().unwrap_or_default()
            );
        }
        info!(
            "iteration {}: {} significant species, {} significant reactions (max ratio {:.3e})",
            self.iteration,
            self.flagged_species.len(),
            self.flagged_reactions.len(),
            self.current.max_species_ratio
        );
        if self.flagged_species.is_empty() && self.flagged_reactions.is_empty() {
            self.finish_iteration();
            return Ok(EnlargementState::Converged);
        }
        Ok(EnlargementState::Enlarging)
    }

    fn enlarging(&mut self) -> Result<EnlargementState, MechanismError> {
        let summary = self
            .registry
            .promote_with_closure(&self.flagged_species, &self.flagged_reactions)?;
        self.registry.check_consistency()?;
        for id in &summary.species {
            info!("promoted {} ({}) to core", id, self.registry.label(*id));
        }
        self.current.promoted_species = summary.species;
        self.current.promoted_reactions = summary.reactions;
        self.flagged_species.clear();
        self.flagged_reactions.clear();
        self.finish_iteration();
        if self.registry.core_species_count() >= self.settings.max_core_size {
            info!("core size cap of {} species reached", self.settings.max_core_size);
            self.capped = true;
            return Ok(EnlargementState::Converged);
        }
        Ok(EnlargementState::Generating)
    }

    fn finish_iteration(&mut self) {
        self.current.sizes = self.registry.sizes();
        let (cs, cr, es, er) = self.current.sizes;
        info!(
            "iteration {} done: core {} species / {} reactions, edge {} species / {} reactions, {} promoted",
            self.iteration,
            cs,
            cr,
            es,
            er,
            self.current.promoted_species.len()
        );
        self.history.push(std::mem::take(&mut self.current));
    }

    /// Performs one state transition and returns the new state
    pub fn step(&mut self) -> Result<EnlargementState, MechanismError> {
        let next = match self.state {
            EnlargementState::Generating => self.generating(),
            EnlargementState::Simulating => self.simulating(),
            EnlargementState::Evaluating => self.evaluating(),
            EnlargementState::Enlarging => self.enlarging(),
            EnlargementState::Converged => Ok(EnlargementState::Converged),
            EnlargementState::Terminated => Err(MechanismError::Config(
                "model enlargement has already terminated".to_string(),
            )),
        };
        match next {
            Ok(state) => {
                debug!("{:?} -> {:?}", self.state, state);
                self.state = state;
                Ok(state)
            }
            Err(e) => {
                self.state = EnlargementState::Terminated;
                Err(e)
            }
        }
    }

    /// Runs enlargement cycles until the model converges or fails. On failure the model
    /// built so far is returned with the error.
    pub fn enlarge(&mut self) -> Result<EnlargementOutcome, EnlargementFailure> {
        if self.conditions.is_empty() && self.state != EnlargementState::Terminated {
            self.state = EnlargementState::Terminated;
            return Err(self.failure(MechanismError::Config("no reaction conditions given".to_string())));
        }
        info!(
            "model enlargement: {} seed species, {} conditions",
            self.registry.core_species_count(),
            self.conditions.len()
        );
        loop {
            match self.step() {
                Ok(EnlargementState::Converged) => {
                    info!(
                        "model converged after {} iterations: {} core species, {} core reactions",
                        self.iteration,
                        self.registry.core_species_count(),
                        self.registry.core_reactions().count()
                    );
                    return Ok(EnlargementOutcome {
                        model: self.snapshot(),
                        iterations: self.iteration,
                        capped: self.capped,
                        warnings: self.warnings.clone(),
                        history: self.history.clone(),
                    });
                }
                Ok(_) => continue,
                Err(e) => {
                    if e.is_fatal() {
                        error!("model enlargement aborted: {}", e);
                    } else {
                        warn!("model enlargement terminated: {}", e);
                    }
                    return Err(self.failure(e));
                }
            }
        }
    }

    fn failure(&self, error: MechanismError) -> EnlargementFailure {
        EnlargementFailure {
            error,
            model: self.snapshot(),
            iterations: self.iteration,
        }
    }
}
