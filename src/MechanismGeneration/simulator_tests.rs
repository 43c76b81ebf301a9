//////////////////////////////////////////////////////////////////////////////////////////////////
// KINETIC SIMULATOR TESTS
//////////////////////////////////////////////////////////////////////////////////////////////////
#[cfg(test)]
mod tests {
    use crate::Kinetics::rate_constants::{R, RateExpression, ThreeBodyStruct};
    use crate::MechanismGeneration::errors::MechanismError;
    use crate::MechanismGeneration::flux::{FluxNormalization, MergedFlux};
    use crate::MechanismGeneration::reaction::ReactionId;
    use crate::MechanismGeneration::registry::Registry;
    use crate::MechanismGeneration::simulator::{
        CoreNetwork, KineticSimulator, ReactionCondition, SimulationSettings, Termination,
    };
    use crate::MechanismGeneration::species::{SpeciesId, SpeciesStructure};
    use crate::Thermodynamics::nasa_poly::NasaPolynomial;
    use approx::assert_relative_eq;
    use std::collections::BTreeMap;
    use std::sync::atomic::AtomicBool;

    const ETHANE: &str = "1 C u0 {2,S} {3,S} {4,S} {5,S}
2 C u0 {1,S} {6,S} {7,S} {8,S}
3 H u0 {1,S}
4 H u0 {1,S}
5 H u0 {1,S}
6 H u0 {2,S}
7 H u0 {2,S}
8 H u0 {2,S}";

    const METHYL: &str = "multiplicity 2
1 C u1 {2,S} {3,S} {4,S}
2 H u0 {1,S}
3 H u0 {1,S}
4 H u0 {1,S}";

    fn label(name: &str) -> SpeciesStructure {
        SpeciesStructure::Label(name.to_string())
    }

    fn arrhenius(A: f64) -> RateExpression {
        RateExpression::arrhenius(A, 0.0, 0.0)
    }

    // tight tolerances, no early stop
    fn accurate() -> SimulationSettings {
        SimulationSettings {
            atol: 1e-14,
            rtol: 1e-8,
            early_termination: false,
            ..SimulationSettings::default()
        }
    }

    fn only(id: SpeciesId) -> BTreeMap<SpeciesId, f64> {
        BTreeMap::from([(id, 1.0)])
    }

    /// core A -> B (k = 1), optionally edge A -> C (k = 10)
    fn decay_model(with_edge: bool) -> (Registry, SpeciesId, SpeciesId) {
        let mut registry = Registry::new();
        let a = registry.add_seed("A", label("A"), true, None).unwrap();
        let b = registry.add_seed("B", label("B"), true, None).unwrap();
        registry
            .lookup_or_create_reaction(&[a], &[b], arrhenius(1.0), "f", 1, false)
            .unwrap();
        if with_edge {
            let (c, _) = registry.lookup_or_create(label("C"), None).unwrap();
            registry
                .lookup_or_create_reaction(&[a], &[c], arrhenius(10.0), "f", 1, false)
                .unwrap();
        }
        (registry, a, b)
    }

    #[test]
    fn test_edge_reactions_do_not_alter_core() {
        let run = |with_edge: bool| {
            let (registry, a, _) = decay_model(with_edge);
            let network = CoreNetwork::from_registry(&registry);
            let condition = ReactionCondition::new(1000.0, 1e5, only(a), 1.0);
            KineticSimulator::new(accurate())
                .simulate(&network, &condition, 0, None)
                .unwrap()
        };
        let plain = run(false);
        let with_edge = run(true);
        assert_eq!(plain.steps, with_edge.steps);
        for (id, c) in &plain.final_concentrations {
            assert_relative_eq!(*c, with_edge.final_concentrations[id], max_relative = 1e-12);
        }
        let c0 = 1e5 / (R * 1000.0);
        assert_relative_eq!(
            plain.final_concentrations[&SpeciesId(0)],
            c0 * (-1.0f64).exp(),
            max_relative = 1e-5
        );
        assert_eq!(with_edge.termination, Termination::EndTime);
        assert_relative_eq!(with_edge.final_time, 1.0);

        // C is fed ten times faster than the core reaction runs: 10 / 11 of all flux
        let c = SpeciesId(2);
        assert_relative_eq!(with_edge.flux.species_ratio(c).unwrap(), 10.0 / 11.0, max_relative = 1e-9);
        assert_relative_eq!(
            with_edge.flux.reaction_ratio(ReactionId(1)).unwrap(),
            10.0 / 11.0,
            max_relative = 1e-9
        );
        assert_relative_eq!(
            with_edge.flux.species[&c].final_rate,
            10.0 * with_edge.final_concentrations[&SpeciesId(0)],
            max_relative = 1e-9
        );
        assert!(plain.flux.species.is_empty());
    }

    #[test]
    fn test_slow_edge_under_tight_tolerances() {
        // core A -> B (k = 1), edge A -> C (k = 1e-3)
        let mut registry = Registry::new();
        let a = registry.add_seed("A", label("A"), true, None).unwrap();
        let b = registry.add_seed("B", label("B"), true, None).unwrap();
        registry
            .lookup_or_create_reaction(&[a], &[b], arrhenius(1.0), "f", 1, false)
            .unwrap();
        let (c, _) = registry.lookup_or_create(label("C"), None).unwrap();
        registry
            .lookup_or_create_reaction(&[a], &[c], arrhenius(1e-3), "f", 1, false)
            .unwrap();
        let network = CoreNetwork::from_registry(&registry);
        let c0 = 1e5 / (R * 1000.0);

        let tight = SimulationSettings {
            atol: 1e-16,
            rtol: 1e-8,
            early_termination: false,
            ..SimulationSettings::default()
        };
        let condition = ReactionCondition::new(1000.0, 1e5, only(a), 10.0);
        let outcome = KineticSimulator::new(tight)
            .simulate(&network, &condition, 0, None)
            .unwrap();
        assert_eq!(outcome.termination, Termination::EndTime);
        assert_eq!(outcome.final_time, 10.0);
        let (ca, cb) = (outcome.final_concentrations[&a], outcome.final_concentrations[&b]);
        assert_relative_eq!(ca, c0 * (-10.0f64).exp(), max_relative = 1e-4);
        assert_relative_eq!(ca + cb, c0, max_relative = 1e-8);
        assert_relative_eq!(
            outcome.flux.species_ratio(c).unwrap(),
            1e-3 / (1.0 + 1e-3),
            max_relative = 1e-9
        );

        // default settings over a long horizon stay well inside the step budget
        let condition = ReactionCondition::new(1000.0, 1e5, only(a), 100.0);
        let settings = SimulationSettings::default();
        let budget = settings.max_solver_steps;
        let outcome = KineticSimulator::new(settings)
            .simulate(&network, &condition, 0, None)
            .unwrap();
        assert!(outcome.steps < budget, "{} steps", outcome.steps);
        assert!(outcome.final_concentrations[&b] > 0.999 * c0);
    }

    #[test]
    fn test_flux_normalizations() {
        let (registry, a, b) = decay_model(true);
        let network = CoreNetwork::from_registry(&registry);
        let condition = ReactionCondition::new(1000.0, 1e5, only(a), 0.1);
        let c = SpeciesId(2);
        let ratio = |normalization: FluxNormalization| {
            let settings = SimulationSettings {
                normalization,
                ..accurate()
            };
            KineticSimulator::new(settings)
                .simulate(&network, &condition, 0, None)
                .unwrap()
                .flux
                .species_ratio(c)
                .unwrap()
        };
        // |dA/dt| = |dB/dt| = k1 [A]
        assert_relative_eq!(
            ratio(FluxNormalization::CharacteristicCoreRate),
            10.0 / 2.0f64.sqrt(),
            max_relative = 1e-9
        );
        // gross rate of A includes the edge reaction, gross rate of B does not
        assert_relative_eq!(ratio(FluxNormalization::ReferenceSpecies(a)), 10.0 / 11.0, max_relative = 1e-9);
        assert_relative_eq!(ratio(FluxNormalization::ReferenceSpecies(b)), 10.0, max_relative = 1e-9);

        let settings = SimulationSettings {
            normalization: FluxNormalization::ReferenceSpecies(c),
            ..accurate()
        };
        let result = KineticSimulator::new(settings).simulate(&network, &condition, 0, None);
        assert!(matches!(result, Err(MechanismError::Config(_))));
    }

    #[test]
    fn test_failed_condition_does_not_spoil_the_others() {
        let mut registry = Registry::new();
        let a = registry.add_seed("A", label("A"), true, None).unwrap();
        let b = registry.add_seed("B", label("B"), true, None).unwrap();
        // negative activation energy: k overflows at 300 K and is tiny at 2000 K
        registry
            .lookup_or_create_reaction(
                &[a],
                &[b],
                RateExpression::arrhenius(1e-60, 0.0, -2.0e6),
                "f",
                1,
                false,
            )
            .unwrap();
        let (c, _) = registry.lookup_or_create(label("C"), None).unwrap();
        registry
            .lookup_or_create_reaction(&[a], &[c], arrhenius(1.0), "f", 1, false)
            .unwrap();
        let network = CoreNetwork::from_registry(&registry);
        let conditions = vec![
            ReactionCondition::new(300.0, 1e5, only(a), 1.0),
            ReactionCondition::new(2000.0, 1e5, only(a), 1.0),
        ];
        let simulator = KineticSimulator::new(SimulationSettings::default());
        let results = simulator.simulate_all(&network, &conditions, None);
        assert_eq!(results.len(), 2);
        assert!(matches!(results[0], Err(MechanismError::Integration { condition: 0, .. })));
        let good = results[1].as_ref().unwrap();
        assert_eq!(good.condition, 1);
        assert_eq!(good.final_time, 1.0);
        assert!(good.flux.species_ratio(c).unwrap() > 0.99);

        let merged = MergedFlux::merge(results.iter().filter_map(|r| r.as_ref().ok()).map(|o| &o.flux));
        assert!(merged.significant_species(0.1).contains(&c));
    }

    #[test]
    fn test_sequential_and_parallel_runs_agree() {
        let (registry, a, _) = decay_model(true);
        let network = CoreNetwork::from_registry(&registry);
        let conditions: Vec<ReactionCondition> = [800.0, 1000.0, 1200.0, 1400.0]
            .iter()
            .map(|T| ReactionCondition::new(*T, 1e5, only(a), 0.5))
            .collect();
        let parallel = KineticSimulator::new(SimulationSettings {
            parallel_conditions: true,
            ..accurate()
        })
        .simulate_all(&network, &conditions, None);
        let sequential = KineticSimulator::new(SimulationSettings {
            parallel_conditions: false,
            ..accurate()
        })
        .simulate_all(&network, &conditions, None);
        for (p, s) in parallel.iter().zip(sequential.iter()) {
            let (p, s) = (p.as_ref().unwrap(), s.as_ref().unwrap());
            assert_eq!(p.condition, s.condition);
            assert_eq!(p.final_concentrations, s.final_concentrations);
            assert_eq!(p.flux, s.flux);
        }
    }

    #[test]
    fn test_mass_is_conserved_in_a_closed_system() {
        let mut registry = Registry::new();
        let ethane = registry
            .add_seed("C2H6", SpeciesStructure::from_adjacency_list(ETHANE).unwrap(), true, None)
            .unwrap();
        let methyl = registry
            .add_seed("CH3", SpeciesStructure::from_adjacency_list(METHYL).unwrap(), true, None)
            .unwrap();
        registry
            .lookup_or_create_reaction(&[ethane], &[methyl, methyl], arrhenius(5.0), "BondFission", 1, false)
            .unwrap();
        let network = CoreNetwork::from_registry(&registry);
        let condition = ReactionCondition::new(1500.0, 1e5, only(ethane), 0.2);
        let outcome = KineticSimulator::new(accurate())
            .simulate(&network, &condition, 0, None)
            .unwrap();
        let residual = outcome.conservation_residual.unwrap();
        assert!(residual < 1e-10, "residual {}", residual);
        // carbon balance of the final state
        let c0 = 1e5 / (R * 1500.0);
        let carbon = 2.0 * outcome.final_concentrations[&ethane] + outcome.final_concentrations[&methyl];
        assert_relative_eq!(carbon, 2.0 * c0, max_relative = 1e-8);
    }

    #[test]
    fn test_reversible_reaction_reaches_equilibrium() {
        // equal enthalpy, B has R ln 2 more entropy: Kc = 2
        let mut registry = Registry::new();
        let a = registry
            .add_seed("A", label("A"), true, Some(NasaPolynomial::constant_cp(0.0, 200.0, 30.0)))
            .unwrap();
        let b = registry
            .add_seed(
                "B",
                label("B"),
                true,
                Some(NasaPolynomial::constant_cp(0.0, 200.0 + R * 2.0f64.ln(), 30.0)),
            )
            .unwrap();
        registry
            .lookup_or_create_reaction(&[a], &[b], arrhenius(1.0), "f", 1, true)
            .unwrap();
        let network = CoreNetwork::from_registry(&registry);
        assert!(network.irreversible_fallbacks().is_empty());
        let condition = ReactionCondition::new(600.0, 1e5, only(a), 30.0);
        let outcome = KineticSimulator::new(accurate())
            .simulate(&network, &condition, 0, None)
            .unwrap();
        let (ca, cb) = (outcome.final_concentrations[&a], outcome.final_concentrations[&b]);
        assert_relative_eq!(cb / ca, 2.0, max_relative = 1e-5);
        // net flux vanishes at equilibrium
        assert!((ca - 0.5 * cb).abs() < 1e-5 * ca);
    }

    #[test]
    fn test_missing_thermo_makes_reaction_one_way() {
        let mut registry = Registry::new();
        let a = registry.add_seed("A", label("A"), true, None).unwrap();
        let b = registry.add_seed("B", label("B"), true, None).unwrap();
        let (id, _) = registry
            .lookup_or_create_reaction(&[a], &[b], arrhenius(1.0), "f", 1, true)
            .unwrap();
        let network = CoreNetwork::from_registry(&registry);
        assert_eq!(network.irreversible_fallbacks(), &[id]);
        let condition = ReactionCondition::new(600.0, 1e5, only(a), 30.0);
        let outcome = KineticSimulator::new(accurate())
            .simulate(&network, &condition, 0, None)
            .unwrap();
        assert!(outcome.final_concentrations[&a] < 1e-9 * outcome.final_concentrations[&b]);
    }

    #[test]
    fn test_third_body_rate_uses_total_concentration() {
        let mut registry = Registry::new();
        let a = registry.add_seed("A", label("A"), true, None).unwrap();
        let b = registry.add_seed("B", label("B"), true, None).unwrap();
        let rate = RateExpression::ThreeBody(ThreeBodyStruct::new(vec![1e-2, 0.0, 0.0], BTreeMap::new()));
        registry
            .lookup_or_create_reaction(&[a], &[b], rate, "f", 1, false)
            .unwrap();
        let network = CoreNetwork::from_registry(&registry);
        let condition = ReactionCondition::new(1000.0, 1e5, only(a), 1.0);
        let outcome = KineticSimulator::new(accurate())
            .simulate(&network, &condition, 0, None)
            .unwrap();
        // A -> B keeps the number of moles, so [M] stays at P / RT
        let c0 = condition.total_concentration();
        let expected = c0 * (-1e-2 * c0).exp();
        assert_relative_eq!(outcome.final_concentrations[&a], expected, max_relative = 1e-5);
    }

    #[test]
    fn test_early_termination_at_steady_state() {
        // nothing reacts and the edge is empty: steady from the start
        let mut registry = Registry::new();
        let a = registry.add_seed("A", label("A"), true, None).unwrap();
        let network = CoreNetwork::from_registry(&registry);
        let condition = ReactionCondition::new(1000.0, 1e5, only(a), 10.0);
        let settings = SimulationSettings {
            early_termination_steps: 3,
            record_history: true,
            ..SimulationSettings::default()
        };
        let outcome = KineticSimulator::new(settings)
            .simulate(&network, &condition, 0, None)
            .unwrap();
        assert_eq!(outcome.termination, Termination::EarlySteadyState);
        assert_eq!(outcome.steps, 3);
        assert!(outcome.final_time < 10.0);
        // t = 0 plus one entry per accepted step
        assert_eq!(outcome.trajectory.len(), 4);
    }

    #[test]
    fn test_quiet_edge_alone_does_not_stop_early() {
        // edge A -> C is far below the threshold, but the core keeps converting A into B
        let mut registry = Registry::new();
        let a = registry.add_seed("A", label("A"), true, None).unwrap();
        let b = registry.add_seed("B", label("B"), true, None).unwrap();
        registry
            .lookup_or_create_reaction(&[a], &[b], arrhenius(1.0), "f", 1, false)
            .unwrap();
        let (c, _) = registry.lookup_or_create(label("C"), None).unwrap();
        registry
            .lookup_or_create_reaction(&[a], &[c], arrhenius(1e-3), "f", 1, false)
            .unwrap();
        let network = CoreNetwork::from_registry(&registry);
        let condition = ReactionCondition::new(1000.0, 1e5, only(a), 5.0);
        let settings = SimulationSettings {
            early_termination_steps: 3,
            ..SimulationSettings::default()
        };
        let outcome = KineticSimulator::new(settings)
            .simulate(&network, &condition, 0, None)
            .unwrap();
        assert!(outcome.flux.species_ratio(c).unwrap() < 0.1);
        assert_eq!(outcome.termination, Termination::EndTime);
        assert_eq!(outcome.final_time, 5.0);
    }

    #[test]
    fn test_significant_edge_prevents_early_stop_or_interrupts() {
        let mut registry = Registry::new();
        let a = registry.add_seed("A", label("A"), true, None).unwrap();
        let (c, _) = registry.lookup_or_create(label("C"), None).unwrap();
        registry
            .lookup_or_create_reaction(&[a], &[c], arrhenius(1e-3), "f", 1, false)
            .unwrap();
        let network = CoreNetwork::from_registry(&registry);
        let condition = ReactionCondition::new(1000.0, 1e5, only(a), 10.0);

        let settings = SimulationSettings {
            early_termination_steps: 3,
            ..SimulationSettings::default()
        };
        let outcome = KineticSimulator::new(settings.clone())
            .simulate(&network, &condition, 0, None)
            .unwrap();
        assert_eq!(outcome.termination, Termination::EndTime);
        assert_eq!(outcome.final_time, 10.0);
        // the only reaction in the system: all of the flux
        assert_relative_eq!(outcome.flux.species_ratio(c).unwrap(), 1.0);

        let interrupting = SimulationSettings {
            interrupt_on_significant: true,
            ..settings
        };
        let outcome = KineticSimulator::new(interrupting)
            .simulate(&network, &condition, 0, None)
            .unwrap();
        assert_eq!(outcome.termination, Termination::SignificantEdgeFlux);
        assert_eq!(outcome.steps, 0);
    }

    #[test]
    fn test_invalid_conditions() {
        let (registry, a, _) = decay_model(true);
        let network = CoreNetwork::from_registry(&registry);
        let simulator = KineticSimulator::new(SimulationSettings::default());
        let edge_start = ReactionCondition::new(1000.0, 1e5, only(SpeciesId(2)), 1.0);
        assert!(matches!(
            simulator.simulate(&network, &edge_start, 0, None),
            Err(MechanismError::Config(_))
        ));
        let negative = ReactionCondition::new(1000.0, 1e5, BTreeMap::from([(a, -1.0)]), 1.0);
        assert!(matches!(
            simulator.simulate(&network, &negative, 0, None),
            Err(MechanismError::Config(_))
        ));
        let cold = ReactionCondition::new(0.0, 1e5, only(a), 1.0);
        assert!(cold.validate(&network).is_err());
    }

    #[test]
    fn test_budget_exhaustion_is_an_integration_error() {
        let (registry, a, _) = decay_model(true);
        let network = CoreNetwork::from_registry(&registry);
        let condition = ReactionCondition::new(1000.0, 1e5, only(a), 1.0);
        let simulator = KineticSimulator::new(SimulationSettings {
            max_solver_steps: 3,
            ..accurate()
        });
        let result = simulator.simulate(&network, &condition, 4, None);
        assert!(matches!(result, Err(MechanismError::Integration { condition: 4, .. })));
    }

    #[test]
    fn test_cancelled_run_is_an_integration_error() {
        let (registry, a, _) = decay_model(true);
        let network = CoreNetwork::from_registry(&registry);
        let condition = ReactionCondition::new(1000.0, 1e5, only(a), 1.0);
        let cancel = AtomicBool::new(true);
        let result = KineticSimulator::new(SimulationSettings::default()).simulate(&network, &condition, 2, Some(&cancel));
        let Err(MechanismError::Integration { condition, message }) = result else {
            panic!("a cancelled run must fail");
        };
        assert_eq!(condition, 2);
        assert!(message.contains("cancelled"), "{}", message);
    }
}
