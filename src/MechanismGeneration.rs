/// Molecular graphs: atoms with radical electrons, single/double/triple bonds,
/// RMG-style adjacency lists and a canonical key that is equal exactly for isomorphic graphs.
///
///  # Examples
/// ```
/// use KiMech::MechanismGeneration::structure::MolecularGraph;
/// let methyl = MolecularGraph::from_adjacency_list(
///     "CH3\nmultiplicity 2\n1 C u1 {2,S} {3,S} {4,S}\n2 H u0 {1,S}\n3 H u0 {1,S}\n4 H u0 {1,S}",
/// )
/// .unwrap();
/// assert_eq!(methyl.formula(), "CH3");
/// assert_eq!(methyl.total_radicals(), 1);
/// ```
pub mod structure;
/// Species and their identity (molecular graph or plain label)
pub mod species;
pub mod reaction;
/// Arena of all species and reactions found so far, each tagged core or edge.
/// Deduplication goes through canonical keys; promotion is idempotent.
pub mod registry;
/// Reaction families (rate rules): reaction libraries, bond fission, radical recombination
/// and hydrogen abstraction, dispatched through the `ReactionFamilyRule` trait
pub mod families;
pub mod rate_rules;
/// Network Generator: explicit breadth-first work queue over core species and pairs
pub mod generator;
/// Kinetic Simulator: integrates the core model and evaluates edge flux one way
pub mod simulator;
pub mod flux;
/// Model Enlargement Controller (the `ReactionModel`)
///
///  # Examples
/// ```
/// use KiMech::Kinetics::rate_constants::RateExpression;
/// use KiMech::MechanismGeneration::controller::{EnlargementSettings, ReactionModel};
/// use KiMech::MechanismGeneration::families::{LibraryEntry, LibraryFamily, ReactionFamily};
/// use KiMech::MechanismGeneration::rate_rules::RateRuleDatabase;
/// use KiMech::MechanismGeneration::simulator::ReactionCondition;
/// use KiMech::MechanismGeneration::species::SpeciesStructure;
/// use std::collections::BTreeMap;
///
/// let library = LibraryFamily::new(
///     "decomposition",
///     vec![LibraryEntry {
///         reactants: vec!["A".to_string()],
///         products: vec!["B".to_string(), "C".to_string()],
///         rate: RateExpression::arrhenius(1.0, 0.0, 0.0),
///         reversible: false,
///     }],
/// );
/// let database =
///     RateRuleDatabase::new(vec![ReactionFamily::Library(library)], &BTreeMap::new(), BTreeMap::new()).unwrap();
/// let mut model = ReactionModel::new(database, EnlargementSettings::default());
/// let a = model
///     .add_seed_species("A", SpeciesStructure::Label("A".to_string()), true, None)
///     .unwrap();
/// model
///     .set_conditions(vec![ReactionCondition::new(1000.0, 1e5, BTreeMap::from([(a, 1.0)]), 1.0)])
///     .unwrap();
/// let outcome = model.enlarge().unwrap();
/// assert_eq!(outcome.model.core_species_count(), 3);
/// ```
pub mod controller;
/// Stable snapshot of the model for serializers: JSON, tables, symbolic rate constants
pub mod snapshot;
pub mod errors;

mod simulator_tests;
