//! Kinetic Simulator: isothermal, isochoric ideal-gas batch reactor over the core model.
//!
//! Only core reactions enter the integrated state. Edge reactions are evaluated against the
//! simulated core concentrations after every accepted step, and their rates are written to a
//! [`FluxRecord`] without ever being fed back into the core trajectory.
use crate::Kinetics::rate_constants::{R, RateExpression};
use crate::MechanismGeneration::errors::MechanismError;
use crate::MechanismGeneration::flux::{FluxNormalization, FluxRecord, flux_ratio};
use crate::MechanismGeneration::reaction::{Reaction, ReactionId};
use crate::MechanismGeneration::registry::Registry;
use crate::MechanismGeneration::species::SpeciesId;
use crate::Thermodynamics::nasa_poly::{NasaPolynomial, reaction_Kc};
use RustedSciThe::numerical::BDF::BDF_solver::BDF;
use RustedSciThe::numerical::BDF::common::NumberOrVec;
use log::{debug, info, warn};
use nalgebra::{DMatrix, DVector};
use rayon::prelude::*;
use std::collections::{BTreeMap, HashMap};
use std::rc::Rc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use thiserror::Error;

// smallest step accepted on the scaled time axis t / t_end
const MIN_SCALED_STEP: f64 = 1e-14;
// the BDF integrator never takes a step longer than this on its own time axis
const BDF_MAX_STEP: f64 = 1e-3;

/// Temperature, pressure and initial composition of one simulation
#[derive(Debug, Clone, PartialEq)]
pub struct ReactionCondition {
    /// K
    pub temperature: f64,
    /// Pa
    pub pressure: f64,
    /// initial mole fractions over core species, normalised before use
    pub mole_fractions: BTreeMap<SpeciesId, f64>,
    /// s
    pub end_time: f64,
}

impl ReactionCondition {
    pub fn new(temperature: f64, pressure: f64, mole_fractions: BTreeMap<SpeciesId, f64>, end_time: f64) -> Self {
        Self {
            temperature,
            pressure,
            mole_fractions,
            end_time,
        }
    }

    /// total concentration of the ideal gas, mol/m3
    pub fn total_concentration(&self) -> f64 {
        self.pressure / (R * self.temperature)
    }

    pub fn validate(&self, network: &CoreNetwork) -> Result<(), MechanismError> {
        let positive = |v: f64| v > 0.0 && v.is_finite();
        if !positive(self.temperature) || !positive(self.pressure) || !positive(self.end_time) {
            return Err(MechanismError::Config(format!(
                "condition needs positive temperature, pressure and end time (T = {}, P = {}, t_end = {})",
                self.temperature, self.pressure, self.end_time
            )));
        }
        let mut total = 0.0;
        for (id, x) in &self.mole_fractions {
            if network.core_index(*id).is_none() {
                return Err(MechanismError::Config(format!(
                    "initial composition refers to {}, which is not a core species",
                    id
                )));
            }
            if !(*x >= 0.0) || !x.is_finite() {
                return Err(MechanismError::Config(format!("mole fraction of {} is {}", id, x)));
            }
            total += x;
        }
        if !(total > 0.0) {
            return Err(MechanismError::Config("initial composition is empty".to_string()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SimulationSettings {
    pub atol: f64,
    pub rtol: f64,
    /// flux significance threshold, used for early termination and interrupts
    pub threshold: f64,
    pub normalization: FluxNormalization,
    /// Accepted integrator steps per run. The integrator advances at most 1/1000 of the
    /// end time per step, so every full run takes at least a thousand steps.
    pub max_solver_steps: usize,
    pub wall_clock_limit: Option<Duration>,
    /// Stop before the end time once the edge is quiet AND the core is steady: for
    /// `early_termination_steps` consecutive steps every edge species stays below
    /// `threshold`, and no core concentration could move by more than `atol + rtol * |c|`
    /// if its current rate held until the end time. A run with a quiet edge but a core still
    /// evolving goes on to the end time.
    pub early_termination: bool,
    /// consecutive quiet steps required before an early stop
    pub early_termination_steps: usize,
    /// stop as soon as any edge species reaches the threshold
    pub interrupt_on_significant: bool,
    pub record_history: bool,
    /// restarts with a smaller first step after the step size collapsed
    pub integration_retries: usize,
    pub parallel_conditions: bool,
}

impl Default for SimulationSettings {
    fn default() -> Self {
        Self {
            atol: 1e-12,
            rtol: 1e-6,
            threshold: 0.1,
            normalization: FluxNormalization::TotalFlux,
            max_solver_steps: 100_000,
            wall_clock_limit: None,
            early_termination: true,
            early_termination_steps: 20,
            interrupt_on_significant: false,
            record_history: false,
            integration_retries: 2,
            parallel_conditions: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NetworkSpecies {
    pub id: SpeciesId,
    pub label: String,
    pub thermo: Option<NasaPolynomial>,
    pub molar_mass: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NetworkReaction {
    pub id: ReactionId,
    pub reactants: Vec<SpeciesId>,
    pub products: Vec<SpeciesId>,
    /// rate with the degeneracy folded in
    pub rate: RateExpression,
    pub reversible: bool,
}

/// Read-only copy of the core model and the edge it is evaluated against.
/// Every simulation worker shares one of these; the registry itself is never touched.
#[derive(Debug, Clone, Default)]
pub struct CoreNetwork {
    species: BTreeMap<SpeciesId, NetworkSpecies>,
    core: Vec<SpeciesId>,
    edge: Vec<SpeciesId>,
    core_index: HashMap<SpeciesId, usize>,
    core_reactions: Vec<NetworkReaction>,
    edge_reactions: Vec<NetworkReaction>,
    irreversible_fallbacks: Vec<ReactionId>,
}

impl CoreNetwork {
    pub fn from_registry(registry: &Registry) -> Self {
        let species: BTreeMap<SpeciesId, NetworkSpecies> = registry
            .all_species()
            .iter()
            .map(|s| {
                (
                    s.id,
                    NetworkSpecies {
                        id: s.id,
                        label: s.label.clone(),
                        thermo: s.thermo.clone(),
                        molar_mass: s.molar_mass(),
                    },
                )
            })
            .collect();
        let core: Vec<SpeciesId> = registry.core_species().map(|s| s.id).collect();
        let edge: Vec<SpeciesId> = registry.edge_species().map(|s| s.id).collect();
        let core_index = core.iter().enumerate().map(|(i, id)| (*id, i)).collect();
        let to_network = |reaction: &Reaction| {
            let mut reversible = reaction.reversible;
            if reversible
                && reaction
                    .participants()
                    .any(|id| species.get(&id).is_none_or(|s| s.thermo.is_none()))
            {
                debug!("{} lacks thermo data, simulated as irreversible", reaction.id);
                reversible = false;
            }
            NetworkReaction {
                id: reaction.id,
                reactants: reaction.reactants.clone(),
                products: reaction.products.clone(),
                rate: reaction.effective_rate(),
                reversible,
            }
        };
        let core_reactions: Vec<NetworkReaction> = registry.core_reactions().map(&to_network).collect();
        let edge_reactions: Vec<NetworkReaction> = registry.edge_reactions().map(&to_network).collect();
        let irreversible_fallbacks = registry
            .all_reactions()
            .iter()
            .filter(|r| r.reversible)
            .filter(|r| {
                core_reactions
                    .iter()
                    .chain(edge_reactions.iter())
                    .any(|n| n.id == r.id && !n.reversible)
            })
            .map(|r| r.id)
            .collect();
        Self {
            species,
            core,
            edge,
            core_index,
            core_reactions,
            edge_reactions,
            irreversible_fallbacks,
        }
    }

    pub fn core_species(&self) -> &[SpeciesId] {
        &self.core
    }

    pub fn edge_species(&self) -> &[SpeciesId] {
        &self.edge
    }

    pub fn core_reactions(&self) -> &[NetworkReaction] {
        &self.core_reactions
    }

    pub fn edge_reactions(&self) -> &[NetworkReaction] {
        &self.edge_reactions
    }

    pub fn species(&self, id: SpeciesId) -> Option<&NetworkSpecies> {
        self.species.get(&id)
    }

    pub fn core_index(&self, id: SpeciesId) -> Option<usize> {
        self.core_index.get(&id).copied()
    }

    /// reversible reactions simulated one-way because a participant has no thermo data
    pub fn irreversible_fallbacks(&self) -> &[ReactionId] {
        &self.irreversible_fallbacks
    }

    /// true when there is anything on the edge to evaluate
    pub fn has_edge(&self) -> bool {
        !self.edge.is_empty() || !self.edge_reactions.is_empty()
    }
}

/// Why a simulation stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    EndTime,
    EarlySteadyState,
    SignificantEdgeFlux,
}

#[derive(Debug, Clone)]
pub struct SimulationOutcome {
    pub condition: usize,
    pub termination: Termination,
    pub final_time: f64,
    /// accepted integrator steps
    pub steps: usize,
    /// mol/m3
    pub final_concentrations: BTreeMap<SpeciesId, f64>,
    /// (t, core concentrations in core order); empty unless history recording is on
    pub trajectory: Vec<(f64, Vec<f64>)>,
    pub flux: FluxRecord,
    /// relative mass balance error at the final state, None when a core species has no molar mass
    pub conservation_residual: Option<f64>,
}

// reaction with its rate constants fixed for one temperature and pressure
struct CompiledReaction {
    id: ReactionId,
    // state index of each reactant and product; None is a species outside the core
    reactants: Vec<Option<usize>>,
    products: Vec<Option<usize>>,
    // net stoichiometry
    stoich: Vec<(SpeciesId, Option<usize>, f64)>,
    kf: f64,
    // rate expression and efficiency per core species when k depends on [M]
    third_body: Option<(RateExpression, Vec<f64>)>,
    inv_kc: Option<f64>,
}

fn all_finite<'a>(values: impl IntoIterator<Item = &'a f64>) -> bool {
    values.into_iter().all(|v| v.is_finite())
}

fn concentration(slot: Option<usize>, y: &DVector<f64>) -> f64 {
    slot.map_or(0.0, |i| y[i])
}

fn product_except(slots: &[Option<usize>], y: &DVector<f64>, skip: Option<usize>) -> f64 {
    slots
        .iter()
        .enumerate()
        .filter(|(p, _)| Some(*p) != skip)
        .map(|(_, slot)| concentration(*slot, y))
        .product()
}

impl CompiledReaction {
    fn new(network: &CoreNetwork, reaction: &NetworkReaction, T: f64, P: f64) -> Self {
        let slots = |ids: &[SpeciesId]| ids.iter().map(|id| network.core_index(*id)).collect::<Vec<_>>();
        let mut nu: BTreeMap<SpeciesId, f64> = BTreeMap::new();
        for id in &reaction.reactants {
            *nu.entry(*id).or_insert(0.0) -= 1.0;
        }
        for id in &reaction.products {
            *nu.entry(*id).or_insert(0.0) += 1.0;
        }
        let stoich = nu
            .into_iter()
            .filter(|(_, v)| *v != 0.0)
            .map(|(id, v)| (id, network.core_index(id), v))
            .collect();
        let third_body = if reaction.rate.needs_third_body() {
            let eff = reaction.rate.efficiencies();
            let efficiencies = network
                .core
                .iter()
                .map(|id| {
                    network
                        .species(*id)
                        .and_then(|s| eff.and_then(|e| e.get(&s.label)))
                        .copied()
                        .unwrap_or(1.0)
                })
                .collect();
            Some((reaction.rate.clone(), efficiencies))
        } else {
            None
        };
        let kf = reaction.rate.K_const(T, P, None);
        let inv_kc = if reaction.reversible {
            let thermo = |ids: &[SpeciesId]| -> Option<Vec<&NasaPolynomial>> {
                ids.iter()
                    .map(|id| network.species(*id).and_then(|s| s.thermo.as_ref()))
                    .collect()
            };
            match (thermo(&reaction.reactants), thermo(&reaction.products)) {
                (Some(r), Some(p)) => {
                    let kc = reaction_Kc(&r, &p, T);
                    (kc > 0.0 && kc.is_finite()).then(|| 1.0 / kc)
                }
                _ => None,
            }
        } else {
            None
        };
        Self {
            id: reaction.id,
            reactants: slots(&reaction.reactants),
            products: slots(&reaction.products),
            stoich,
            kf,
            third_body,
            inv_kc,
        }
    }

    fn rate_constants(&self, T: f64, P: f64, y: &DVector<f64>) -> (f64, f64) {
        let kf = match &self.third_body {
            None => self.kf,
            Some((rate, efficiencies)) => {
                let M: f64 = efficiencies.iter().zip(y.iter()).map(|(e, c)| e * c.max(0.0)).sum();
                rate.K_const(T, P, Some(M))
            }
        };
        (kf, self.inv_kc.map_or(0.0, |inv| kf * inv))
    }

    fn net_rate(&self, T: f64, P: f64, y: &DVector<f64>) -> f64 {
        let (kf, kr) = self.rate_constants(T, P, y);
        let forward = kf * product_except(&self.reactants, y, None);
        if kr == 0.0 {
            forward
        } else {
            forward - kr * product_except(&self.products, y, None)
        }
    }
}

// core rate equations of one condition; owned, so the integrator closures can share them
struct CoreOde {
    temperature: f64,
    pressure: f64,
    reactions: Vec<CompiledReaction>,
}

impl CoreOde {
    fn rhs(&self, y: &DVector<f64>) -> DVector<f64> {
        let mut dydt = DVector::zeros(y.len());
        for reaction in &self.reactions {
            let rate = reaction.net_rate(self.temperature, self.pressure, y);
            for (_, slot, nu) in &reaction.stoich {
                if let Some(i) = slot {
                    dydt[*i] += nu * rate;
                }
            }
        }
        dydt
    }

    // mass-action Jacobian with k held fixed
    fn jacobian(&self, y: &DVector<f64>) -> DMatrix<f64> {
        let mut jac = DMatrix::zeros(y.len(), y.len());
        for reaction in &self.reactions {
            let (kf, kr) = reaction.rate_constants(self.temperature, self.pressure, y);
            let sides = [(&reaction.reactants, kf), (&reaction.products, -kr)];
            for (slots, k) in sides {
                if k == 0.0 {
                    continue;
                }
                for (p, slot) in slots.iter().enumerate() {
                    let Some(i) = slot else { continue };
                    let d = k * product_except(slots, y, Some(p));
                    for (_, target, nu) in &reaction.stoich {
                        if let Some(j) = target {
                            jac[(*j, *i)] += nu * d;
                        }
                    }
                }
            }
        }
        jac
    }
}

// the core ODE of one condition plus the edge reactions evaluated against it
struct CompiledNetwork<'a> {
    network: &'a CoreNetwork,
    core: Rc<CoreOde>,
    edge: Vec<CompiledReaction>,
}

// rates of every reaction at one instant
struct Evaluation {
    core_rates: Vec<f64>,
    edge_rates: Vec<f64>,
    dydt: DVector<f64>,
}

impl<'a> CompiledNetwork<'a> {
    fn new(network: &'a CoreNetwork, condition: &ReactionCondition) -> Self {
        let (T, P) = (condition.temperature, condition.pressure);
        let compile = |reactions: &[NetworkReaction]| {
            reactions
                .iter()
                .map(|r| CompiledReaction::new(network, r, T, P))
                .collect::<Vec<_>>()
        };
        Self {
            network,
            core: Rc::new(CoreOde {
                temperature: T,
                pressure: P,
                reactions: compile(&network.core_reactions),
            }),
            edge: compile(&network.edge_reactions),
        }
    }

    fn initial_state(&self, condition: &ReactionCondition) -> DVector<f64> {
        let total: f64 = condition.mole_fractions.values().sum();
        let c_total = condition.total_concentration();
        let mut y = DVector::zeros(self.network.core.len());
        for (id, x) in &condition.mole_fractions {
            if let Some(i) = self.network.core_index(*id) {
                y[i] = c_total * x / total;
            }
        }
        y
    }

    fn evaluate(&self, y: &DVector<f64>) -> Evaluation {
        let (T, P) = (self.core.temperature, self.core.pressure);
        let core_rates: Vec<f64> = self.core.reactions.iter().map(|r| r.net_rate(T, P, y)).collect();
        let edge_rates = self.edge.iter().map(|r| r.net_rate(T, P, y)).collect();
        let mut dydt = DVector::zeros(y.len());
        for (reaction, rate) in self.core.reactions.iter().zip(core_rates.iter()) {
            for (_, slot, nu) in &reaction.stoich {
                if let Some(i) = slot {
                    dydt[*i] += nu * rate;
                }
            }
        }
        Evaluation {
            core_rates,
            edge_rates,
            dydt,
        }
    }

    fn normaliser(&self, normalization: &FluxNormalization, evaluation: &Evaluation) -> f64 {
        let all_rates = || {
            self.core
                .reactions
                .iter()
                .zip(evaluation.core_rates.iter())
                .chain(self.edge.iter().zip(evaluation.edge_rates.iter()))
        };
        match normalization {
            FluxNormalization::TotalFlux => all_rates().map(|(_, r)| r.abs()).sum(),
            FluxNormalization::CharacteristicCoreRate => evaluation.dydt.norm(),
            FluxNormalization::ReferenceSpecies(reference) => all_rates()
                .map(|(reaction, r)| {
                    reaction
                        .stoich
                        .iter()
                        .filter(|(id, _, _)| id == reference)
                        .map(|(_, _, nu)| (nu * r).abs())
                        .sum::<f64>()
                })
                .sum(),
        }
    }

    /// net production rate of every edge species through the edge reactions
    fn edge_species_rates(&self, evaluation: &Evaluation) -> BTreeMap<SpeciesId, f64> {
        let mut rates: BTreeMap<SpeciesId, f64> = self.network.edge.iter().map(|id| (*id, 0.0)).collect();
        for (reaction, r) in self.edge.iter().zip(evaluation.edge_rates.iter()) {
            for (id, slot, nu) in &reaction.stoich {
                if slot.is_none() {
                    *rates.entry(*id).or_insert(0.0) += nu * r;
                }
            }
        }
        rates
    }

    fn conservation_residual(&self, evaluation: &Evaluation) -> Option<f64> {
        let masses: Option<Vec<f64>> = self
            .network
            .core
            .iter()
            .map(|id| self.network.species(*id).and_then(|s| s.molar_mass))
            .collect();
        let masses = masses?;
        let net: f64 = masses.iter().zip(evaluation.dydt.iter()).map(|(m, d)| m * d).sum();
        let gross: f64 = masses.iter().zip(evaluation.dydt.iter()).map(|(m, d)| m * d.abs()).sum();
        Some(if gross > 0.0 { net.abs() / gross } else { 0.0 })
    }
}

/// What the step observer wants the integration loop to do next
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StepControl {
    Continue,
    Stop,
}

#[derive(Debug, Clone, Error, PartialEq)]
enum StepFailure {
    #[error("step size underflow at t = {t:e} s (h = {h:e} s)")]
    StepSizeUnderflow { t: f64, h: f64 },
    #[error("BDF integrator gave up at t = {t:e} s: {reason}")]
    GaveUp { t: f64, reason: &'static str },
    #[error("non-finite concentrations or rates at t = {t:e} s")]
    NonFinite { t: f64 },
    #[error("step budget of {steps} steps exhausted at t = {t:e} s")]
    BudgetExhausted { t: f64, steps: usize },
    #[error("wall-clock limit of {seconds} s exceeded at t = {t:e} s")]
    WallClock { t: f64, seconds: f64 },
    #[error("cancelled at t = {t:e} s")]
    Cancelled { t: f64 },
}

impl StepFailure {
    // a restart with a smaller first step may get past these
    fn retryable(&self) -> bool {
        matches!(self, StepFailure::StepSizeUnderflow { .. } | StepFailure::GaveUp { .. })
    }
}

// where a run ended
struct RunEnd {
    t: f64,
    y: DVector<f64>,
    steps: usize,
}

// mutable bookkeeping of one run, updated by the step observer
struct RunState {
    record: FluxRecord,
    trajectory: Vec<(f64, Vec<f64>)>,
    quiet_steps: usize,
    termination: Termination,
}

pub struct KineticSimulator {
    settings: SimulationSettings,
}

impl KineticSimulator {
    pub fn new(settings: SimulationSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &SimulationSettings {
        &self.settings
    }

    fn check_normalization(&self, network: &CoreNetwork) -> Result<(), MechanismError> {
        if let FluxNormalization::ReferenceSpecies(id) = &self.settings.normalization {
            if network.core_index(*id).is_none() {
                return Err(MechanismError::Config(format!(
                    "flux reference species {} is not in the core",
                    id
                )));
            }
        }
        Ok(())
    }

    // flux bookkeeping at one instant; returns Stop when the run may end here
    fn observe(
        &self,
        compiled: &CompiledNetwork<'_>,
        state: &mut RunState,
        t: f64,
        y: &DVector<f64>,
        t_end: f64,
    ) -> StepControl {
        let settings = &self.settings;
        let evaluation = compiled.evaluate(y);
        let normaliser = compiled.normaliser(&settings.normalization, &evaluation);
        let record_history = settings.record_history;
        let mut quiet = true;
        let mut significant = false;
        for (id, rate) in compiled.edge_species_rates(&evaluation) {
            let ratio = flux_ratio(rate, normaliser);
            quiet &= ratio < settings.threshold;
            significant |= ratio >= settings.threshold;
            if let Some(flux) = state.record.species.get_mut(&id) {
                flux.update(t, rate, ratio, record_history);
            }
        }
        for (reaction, rate) in compiled.edge.iter().zip(evaluation.edge_rates.iter()) {
            let ratio = flux_ratio(*rate, normaliser);
            if let Some(flux) = state.record.reactions.get_mut(&reaction.id) {
                flux.update(t, *rate, ratio, record_history);
            }
        }
        if record_history {
            state.trajectory.push((t, y.iter().copied().collect()));
        }
        if settings.interrupt_on_significant && significant {
            state.termination = Termination::SignificantEdgeFlux;
            return StepControl::Stop;
        }
        if settings.early_termination && t > 0.0 {
            let remaining = t_end - t;
            let steady = evaluation
                .dydt
                .iter()
                .zip(y.iter())
                .all(|(d, c)| d.abs() * remaining <= settings.atol + settings.rtol * c.abs());
            if quiet && steady {
                state.quiet_steps += 1;
            } else {
                state.quiet_steps = 0;
            }
            if state.quiet_steps >= settings.early_termination_steps.max(1) {
                state.termination = Termination::EarlySteadyState;
                return StepControl::Stop;
            }
        }
        StepControl::Continue
    }

    /// Drives RustedSciThe's variable-order BDF one step at a time and hands every accepted
    /// state to the flux observer. The integrator caps its step at 1e-3 of its own time axis,
    /// so it runs on the scaled time tau = t / t_end over [0, 1].
    fn integrate(
        &self,
        compiled: &CompiledNetwork<'_>,
        state: &mut RunState,
        y0: &DVector<f64>,
        t_end: f64,
        attempt: usize,
        cancel: Option<&AtomicBool>,
    ) -> Result<RunEnd, StepFailure> {
        let settings = &self.settings;
        // the integrator cannot report a blow-up of the initial rates
        if !all_finite(compiled.core.rhs(y0).iter()) || !all_finite(compiled.core.jacobian(y0).iter()) {
            return Err(StepFailure::NonFinite { t: 0.0 });
        }
        let rhs_ode = Rc::clone(&compiled.core);
        let jac_ode = Rc::clone(&compiled.core);
        let fun: Box<dyn Fn(f64, &DVector<f64>) -> DVector<f64>> =
            Box::new(move |_tau: f64, y: &DVector<f64>| rhs_ode.rhs(y) * t_end);
        let jac: Box<dyn Fn(f64, &DVector<f64>) -> DMatrix<f64>> =
            Box::new(move |_tau: f64, y: &DVector<f64>| jac_ode.jacobian(y) * t_end);
        // every retry starts a hundred times more carefully
        let first_step = (attempt > 0).then(|| 1e-8 * 0.01f64.powi(attempt as i32 - 1));
        let mut solver = BDF::new();
        solver.set_initial(
            fun,
            0.0,
            y0.clone(),
            1.0,
            BDF_MAX_STEP,
            NumberOrVec::Number(settings.rtol),
            NumberOrVec::Number(settings.atol),
            Some(jac),
            None,
            false,
            first_step,
        );

        let started = Instant::now();
        let mut steps = 0;
        let mut tau_prev = 0.0;
        let mut y_prev = y0.clone();
        loop {
            let t = tau_prev * t_end;
            if cancel.is_some_and(|flag| flag.load(Ordering::Relaxed)) {
                return Err(StepFailure::Cancelled { t });
            }
            if let Some(limit) = settings.wall_clock_limit {
                if started.elapsed() > limit {
                    return Err(StepFailure::WallClock {
                        t,
                        seconds: limit.as_secs_f64(),
                    });
                }
            }
            if steps >= settings.max_solver_steps {
                return Err(StepFailure::BudgetExhausted { t, steps });
            }
            let (accepted, reason) = solver._step_impl();
            if !accepted {
                return Err(StepFailure::GaveUp {
                    t,
                    reason: reason.unwrap_or("step failed"),
                });
            }
            steps += 1;
            let tau = solver.t;
            if !tau.is_finite() || !all_finite(solver.y.iter()) {
                return Err(StepFailure::NonFinite { t });
            }
            let h = tau - tau_prev;
            if !(h > MIN_SCALED_STEP) {
                return Err(StepFailure::StepSizeUnderflow { t, h: h * t_end });
            }
            if tau >= 1.0 {
                // the last step may pass the end time; interpolate back onto it
                let w = (1.0 - tau_prev) / h;
                let y = &y_prev + (&solver.y - &y_prev) * w;
                self.observe(compiled, state, t_end, &y, t_end);
                state.termination = Termination::EndTime;
                return Ok(RunEnd { t: t_end, y, steps });
            }
            let t_now = tau * t_end;
            if self.observe(compiled, state, t_now, &solver.y, t_end) == StepControl::Stop {
                return Ok(RunEnd {
                    t: t_now,
                    y: solver.y.clone(),
                    steps,
                });
            }
            tau_prev = tau;
            y_prev.copy_from(&solver.y);
        }
    }

    /// Integrates the core model under one condition and records edge flux along the way.
    /// `index` identifies the condition in errors and outcomes.
    pub fn simulate(
        &self,
        network: &CoreNetwork,
        condition: &ReactionCondition,
        index: usize,
        cancel: Option<&AtomicBool>,
    ) -> Result<SimulationOutcome, MechanismError> {
        condition.validate(network)?;
        self.check_normalization(network)?;
        let compiled = CompiledNetwork::new(network, condition);
        let y0 = compiled.initial_state(condition);
        let t_end = condition.end_time;
        debug!(
            "condition {}: T = {} K, P = {} Pa, {} core species, {} core reactions, {} edge reactions",
            index,
            condition.temperature,
            condition.pressure,
            network.core.len(),
            network.core_reactions.len(),
            network.edge_reactions.len()
        );

        let mut attempt = 0;
        let (end, state) = loop {
            let mut state = RunState {
                record: FluxRecord::new(
                    network.edge.iter().copied(),
                    network.edge_reactions.iter().map(|r| r.id),
                ),
                trajectory: Vec::new(),
                quiet_steps: 0,
                termination: Termination::EndTime,
            };
            if self.observe(&compiled, &mut state, 0.0, &y0, t_end) == StepControl::Stop {
                let end = RunEnd {
                    t: 0.0,
                    y: y0.clone(),
                    steps: 0,
                };
                break (end, state);
            }
            match self.integrate(&compiled, &mut state, &y0, t_end, attempt, cancel) {
                Ok(end) => break (end, state),
                Err(failure) => {
                    if failure.retryable() && attempt < self.settings.integration_retries {
                        attempt += 1;
                        warn!("condition {}: {}; retrying with a smaller first step", index, failure);
                        continue;
                    }
                    return Err(MechanismError::Integration {
                        condition: index,
                        message: failure.to_string(),
                    });
                }
            }
        };

        let final_evaluation = compiled.evaluate(&end.y);
        let final_concentrations = network
            .core
            .iter()
            .zip(end.y.iter())
            .map(|(id, c)| (*id, *c))
            .collect();
        let outcome = SimulationOutcome {
            condition: index,
            termination: state.termination,
            final_time: end.t,
            steps: end.steps,
            final_concentrations,
            trajectory: state.trajectory,
            conservation_residual: compiled.conservation_residual(&final_evaluation),
            flux: state.record,
        };
        info!(
            "condition {} finished at t = {:e} s ({:?}, {} steps, max edge species ratio {:.3e})",
            index,
            outcome.final_time,
            outcome.termination,
            outcome.steps,
            outcome.flux.max_species_ratio()
        );
        Ok(outcome)
    }

    /// Simulates every condition, in parallel when configured. Results are in condition order.
    pub fn simulate_all(
        &self,
        network: &CoreNetwork,
        conditions: &[ReactionCondition],
        cancel: Option<&AtomicBool>,
    ) -> Vec<Result<SimulationOutcome, MechanismError>> {
        if self.settings.parallel_conditions && conditions.len() > 1 {
            conditions
                .par_iter()
                .enumerate()
                .map(|(i, condition)| self.simulate(network, condition, i, cancel))
                .collect()
        } else {
            conditions
                .iter()
                .enumerate()
                .map(|(i, condition)| self.simulate(network, condition, i, cancel))
                .collect()
        }
    }
}
