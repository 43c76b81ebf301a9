use crate::Kinetics::rate_constants::RateExpression;
use crate::MechanismGeneration::controller::{EnlargementSettings, ReactionModel};
use crate::MechanismGeneration::errors::MechanismError;
use crate::MechanismGeneration::families::{
    BondFissionFamily, HydrogenAbstractionFamily, LibraryEntry, LibraryFamily, RadicalRecombinationFamily,
    ReactionFamily,
};
use crate::MechanismGeneration::rate_rules::RateRuleDatabase;
use crate::MechanismGeneration::simulator::ReactionCondition;
use crate::MechanismGeneration::species::SpeciesStructure;
use std::collections::BTreeMap;

const ETHANE: &str = "ethane
1 C u0 {2,S} {3,S} {4,S} {5,S}
2 C u0 {1,S} {6,S} {7,S} {8,S}
3 H u0 {1,S}
4 H u0 {1,S}
5 H u0 {1,S}
6 H u0 {2,S}
7 H u0 {2,S}
8 H u0 {2,S}";

fn pyrolysis_families() -> Vec<ReactionFamily> {
    vec![
        ReactionFamily::BondFission(BondFissionFamily {
            rate: RateExpression::arrhenius(1.0e16, 0.0, 3.6e5),
            reversible: true,
        }),
        ReactionFamily::RadicalRecombination(RadicalRecombinationFamily {
            rate: RateExpression::arrhenius(1.0e7, 0.0, 0.0),
            reversible: true,
        }),
        ReactionFamily::HydrogenAbstraction(HydrogenAbstractionFamily {
            rate: RateExpression::arrhenius(1.0e5, 0.0, 5.0e4),
            reversible: true,
        }),
    ]
}

/// ethane diluted in nitrogen at 1200 and 1300 K
fn ethane_pyrolysis(settings: EnlargementSettings) -> Result<ReactionModel, MechanismError> {
    let database = RateRuleDatabase::new(pyrolysis_families(), &BTreeMap::new(), BTreeMap::new())?;
    let mut model = ReactionModel::new(database, settings);
    let ethane = model.add_seed_species("C2H6", SpeciesStructure::from_adjacency_list(ETHANE)?, true, None)?;
    let n2 = model.add_seed_species("N2", SpeciesStructure::Label("N2".to_string()), false, None)?;
    let composition = BTreeMap::from([(ethane, 0.05), (n2, 0.95)]);
    model.set_conditions(vec![
        ReactionCondition::new(1200.0, 1e5, composition.clone(), 1e-2),
        ReactionCondition::new(1300.0, 1e5, composition, 1e-2),
    ])?;
    Ok(model)
}

pub fn mech_examples(task: usize) -> Result<(), MechanismError> {
    match task {
        0 => {
            // one library reaction A -> B + C: B and C carry all the flux and join the core
            let library = LibraryFamily::new(
                "decomposition",
                vec![LibraryEntry {
                    reactants: vec!["A".to_string()],
                    products: vec!["B".to_string(), "C".to_string()],
                    rate: RateExpression::arrhenius(1.0, 0.0, 0.0),
                    reversible: false,
                }],
            );
            let database = RateRuleDatabase::new(vec![ReactionFamily::Library(library)], &BTreeMap::new(), BTreeMap::new())?;
            let mut model = ReactionModel::new(database, EnlargementSettings::default());
            let a = model.add_seed_species("A", SpeciesStructure::Label("A".to_string()), true, None)?;
            model.set_conditions(vec![ReactionCondition::new(1000.0, 1e5, BTreeMap::from([(a, 1.0)]), 1.0)])?;
            let outcome = model.enlarge().map_err(|failure| failure.error)?;
            outcome.model.pretty_print();
            println!("converged after {} iterations", outcome.iterations);
        }
        1 => {
            // ethane pyrolysis from graph-based families
            let mut settings = EnlargementSettings {
                max_core_size: 12,
                max_iterations: 10,
                ..EnlargementSettings::default()
            };
            settings.simulation.threshold = 0.05;
            let mut model = ethane_pyrolysis(settings)?;
            let snapshot = match model.enlarge() {
                Ok(outcome) => {
                    println!("iterations: {}, capped: {}", outcome.iterations, outcome.capped);
                    outcome.model
                }
                Err(failure) => {
                    println!("{}", failure);
                    failure.model
                }
            };
            snapshot.core_only().pretty_print();
            for (equation, k) in snapshot.rate_table(1e5) {
                println!("{}: k = {}", equation, k);
            }
        }
        2 => {
            // the same first iteration under the three flux normalisations
            use crate::MechanismGeneration::flux::FluxNormalization;
            use crate::MechanismGeneration::simulator::{CoreNetwork, KineticSimulator};
            use prettytable::{Table, row};

            let mut model = ethane_pyrolysis(EnlargementSettings::default())?;
            // generate the first edge only
            model.step()?;
            let network = CoreNetwork::from_registry(model.registry());
            let ethane = model
                .registry()
                .find_by_label("C2H6")
                .ok_or_else(|| MechanismError::Config("C2H6 is missing".to_string()))?;
            let normalizations = [
                FluxNormalization::TotalFlux,
                FluxNormalization::CharacteristicCoreRate,
                FluxNormalization::ReferenceSpecies(ethane),
            ];
            let mut table = Table::new();
            table.add_row(row!["Normalization", "Edge species", "Max ratio"]);
            for normalization in normalizations {
                let mut settings = model.settings().simulation.clone();
                settings.normalization = normalization.clone();
                let simulator = KineticSimulator::new(settings);
                let outcome = simulator.simulate(&network, &model.conditions()[0], 0, None)?;
                for (id, flux) in &outcome.flux.species {
                    table.add_row(row![
                        format!("{:?}", normalization),
                        model.registry().label(*id),
                        format!("{:.3e}", flux.max_ratio)
                    ]);
                }
            }
            table.printstd();
        }
        _ => {
            return Err(MechanismError::Config(format!("there is no example {}", task)));
        }
    }
    Ok(())
}
