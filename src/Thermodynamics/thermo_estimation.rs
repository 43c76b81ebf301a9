use crate::Kinetics::rate_constants::R;
use crate::MechanismGeneration::species::SpeciesStructure;
use crate::MechanismGeneration::structure::{BondOrder, MolecularGraph};
use crate::Thermodynamics::nasa_poly::NasaPolynomial;
use log::{debug, warn};
use std::collections::{BTreeMap, HashMap};

// gas-phase atom enthalpies of formation at 298 K, kJ/mol
const ATOM_ENTHALPIES: &[(&str, f64)] = &[
    ("H", 218.0),
    ("C", 716.7),
    ("N", 472.7),
    ("O", 249.2),
    ("F", 79.4),
    ("Si", 450.0),
    ("P", 316.5),
    ("S", 277.2),
    ("Cl", 121.3),
    ("Br", 111.9),
    ("I", 106.8),
];

// mean bond dissociation energies, kJ/mol; elements in alphabetical order
const BOND_ENERGIES: &[(&str, &str, BondOrder, f64)] = &[
    ("H", "H", BondOrder::Single, 436.0),
    ("C", "H", BondOrder::Single, 413.0),
    ("C", "C", BondOrder::Single, 348.0),
    ("C", "C", BondOrder::Double, 614.0),
    ("C", "C", BondOrder::Triple, 839.0),
    ("C", "O", BondOrder::Single, 358.0),
    ("C", "O", BondOrder::Double, 745.0),
    ("C", "O", BondOrder::Triple, 1072.0),
    ("H", "O", BondOrder::Single, 463.0),
    ("O", "O", BondOrder::Single, 146.0),
    ("O", "O", BondOrder::Double, 498.0),
    ("H", "N", BondOrder::Single, 391.0),
    ("C", "N", BondOrder::Single, 293.0),
    ("C", "N", BondOrder::Double, 615.0),
    ("C", "N", BondOrder::Triple, 891.0),
    ("N", "N", BondOrder::Single, 163.0),
    ("N", "N", BondOrder::Double, 418.0),
    ("N", "N", BondOrder::Triple, 945.0),
    ("N", "O", BondOrder::Single, 201.0),
    ("N", "O", BondOrder::Double, 607.0),
    ("Cl", "H", BondOrder::Single, 431.0),
    ("C", "Cl", BondOrder::Single, 328.0),
    ("H", "S", BondOrder::Single, 363.0),
    ("C", "S", BondOrder::Single, 272.0),
];

fn bond_energy(a: &str, b: &str, order: BondOrder) -> f64 {
    let (first, second) = if a <= b { (a, b) } else { (b, a) };
    BOND_ENERGIES
        .iter()
        .find(|(x, y, o, _)| *x == first && *y == second && *o == order)
        .map(|(_, _, _, e)| *e)
        .unwrap_or(match order {
            BondOrder::Single => 350.0,
            BondOrder::Double => 600.0,
            BondOrder::Triple => 850.0,
        })
}

/// Thermochemistry collaborator of the rate-rule database.
/// Lookup order: library entry by species label, library entry by structure,
/// then the additivity estimate for species with a molecular graph.
#[derive(Debug, Clone, Default)]
pub struct ThermoEstimator {
    by_label: BTreeMap<String, NasaPolynomial>,
    by_key: HashMap<String, NasaPolynomial>,
}

impl ThermoEstimator {
    /// `dictionary` gives structures of library labels so that library data also applies
    /// to the same molecule discovered under another name
    pub fn new(
        library: BTreeMap<String, NasaPolynomial>,
        dictionary: &BTreeMap<String, SpeciesStructure>,
    ) -> Self {
        let by_key = library
            .iter()
            .filter_map(|(label, poly)| {
                dictionary
                    .get(label)
                    .map(|structure| (structure.canonical_key(), poly.clone()))
            })
            .collect();
        Self {
            by_label: library,
            by_key,
        }
    }

    pub fn estimate_thermo(&self, label: &str, structure: &SpeciesStructure) -> Option<NasaPolynomial> {
        if let Some(poly) = self.by_label.get(label) {
            return Some(poly.clone());
        }
        if let Some(poly) = self.by_key.get(&structure.canonical_key()) {
            return Some(poly.clone());
        }
        match structure {
            SpeciesStructure::Graph(graph) => {
                let estimate = additivity_estimate(graph);
                if estimate.is_none() {
                    warn!("no thermo estimate for {}: unsupported element", label);
                }
                estimate
            }
            SpeciesStructure::Label(_) => {
                debug!("no thermo data for label species {}", label);
                None
            }
        }
    }
}

/// Bond-additivity estimate: enthalpy of formation from atomisation enthalpies minus bond
/// energies (radical sites simply lack a bond), entropy and heat capacity from atom counts
/// plus the spin degeneracy. Returned as a constant-Cp polynomial valid 300-3000 K.
pub fn additivity_estimate(graph: &MolecularGraph) -> Option<NasaPolynomial> {
    let atom_enthalpy: f64 = graph
        .atoms()
        .iter()
        .map(|atom| {
            ATOM_ENTHALPIES
                .iter()
                .find(|(el, _)| *el == atom.element)
                .map(|(_, h)| *h)
        })
        .sum::<Option<f64>>()?;
    let bond_enthalpy: f64 = graph
        .bond_list()
        .iter()
        .map(|(i, j, order)| bond_energy(&graph.atom(*i).element, &graph.atom(*j).element, *order))
        .sum();
    let H298 = (atom_enthalpy - bond_enthalpy) * 1.0e3;
    let n = graph.n_atoms() as f64;
    let S298 = 110.0 + 30.0 * (n - 1.0) + R * (graph.multiplicity() as f64).ln();
    let Cp = R * (3.5 + 1.5 * (n - 1.0));
    let mut poly = NasaPolynomial::constant_cp(H298, S298, Cp);
    poly.temperature_range = [300.0, 1000.0, 3000.0];
    Some(poly)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

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

    #[test]
    fn test_additivity_enthalpies() {
        let ethane = MolecularGraph::from_adjacency_list(ETHANE).unwrap();
        let methyl = MolecularGraph::from_adjacency_list(METHYL).unwrap();
        let h_ethane = additivity_estimate(&ethane).unwrap().dh(298.15);
        let h_methyl = additivity_estimate(&methyl).unwrap().dh(298.15);
        // reference values -84 and +146 kJ/mol
        assert_relative_eq!(h_ethane, -84.0e3, max_relative = 0.1);
        assert!(h_methyl > 100.0e3 && h_methyl < 160.0e3);
        // C-C fission is endothermic by the C-C bond energy
        assert_relative_eq!(2.0 * h_methyl - h_ethane, 348.0e3, max_relative = 1e-9);
    }

    #[test]
    fn test_lookup_order() {
        let ethane = SpeciesStructure::from_adjacency_list(ETHANE).unwrap();
        let library_poly = NasaPolynomial::constant_cp(-84.0e3, 229.0, 52.0);
        let library = BTreeMap::from([("ethane".to_string(), library_poly.clone())]);
        let dictionary = BTreeMap::from([("ethane".to_string(), ethane.clone())]);
        let estimator = ThermoEstimator::new(library, &dictionary);
        // by label
        assert_eq!(estimator.estimate_thermo("ethane", &ethane), Some(library_poly.clone()));
        // by structure under another name
        assert_eq!(estimator.estimate_thermo("C2H6", &ethane), Some(library_poly));
        // label species without library data
        assert!(estimator.estimate_thermo("A", &SpeciesStructure::Label("A".to_string())).is_none());
    }

    #[test]
    fn test_unsupported_element_gives_none() {
        let mut graph = MolecularGraph::new();
        graph.add_atom("Ar", 0);
        assert!(additivity_estimate(&graph).is_none());
    }
}
