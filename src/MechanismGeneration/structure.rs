//! Molecular graphs: atoms with radical electrons and charges, bonds with orders.
//! Graphs are read from and written to RMG-style adjacency lists:
//! ```text
//! multiplicity 2
//! 1 C u1 {2,S} {3,S} {4,S}
//! 2 H u0 {1,S}
//! 3 H u0 {1,S}
//! 4 H u0 {1,S}
//! ```
//! Identity of species is decided by `canonical_key`, which is equal for two graphs
//! exactly when they are isomorphic (same elements, radicals, charges and bond orders).
use crate::Kinetics::molmass::{hill_formula, molar_mass_of_composition, standard_valence};
use crate::MechanismGeneration::errors::MechanismError;
use regex::Regex;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum BondOrder {
    Single,
    Double,
    Triple,
}

impl BondOrder {
    pub fn valence(&self) -> u8 {
        match self {
            BondOrder::Single => 1,
            BondOrder::Double => 2,
            BondOrder::Triple => 3,
        }
    }
    pub fn symbol(&self) -> char {
        match self {
            BondOrder::Single => 'S',
            BondOrder::Double => 'D',
            BondOrder::Triple => 'T',
        }
    }
    pub fn from_symbol(symbol: &str) -> Result<Self, MechanismError> {
        match symbol {
            "S" => Ok(BondOrder::Single),
            "D" => Ok(BondOrder::Double),
            "T" => Ok(BondOrder::Triple),
            other => Err(MechanismError::Structural(format!(
                "unsupported bond order '{}'",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Atom {
    pub element: String,
    pub radicals: u8,
    pub charge: i8,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MolecularGraph {
    atoms: Vec<Atom>,
    // adjacency: bonds[i][j] = order of the bond i-j, stored on both atoms
    bonds: Vec<BTreeMap<usize, BondOrder>>,
}

impl MolecularGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_atom(&mut self, element: &str, radicals: u8) -> usize {
        self.atoms.push(Atom {
            element: element.to_string(),
            radicals,
            charge: 0,
        });
        self.bonds.push(BTreeMap::new());
        self.atoms.len() - 1
    }

    pub fn add_bond(&mut self, i: usize, j: usize, order: BondOrder) -> Result<(), MechanismError> {
        if i == j || i >= self.atoms.len() || j >= self.atoms.len() {
            return Err(MechanismError::Structural(format!(
                "invalid bond {}-{} in a graph of {} atoms",
                i + 1,
                j + 1,
                self.atoms.len()
            )));
        }
        if let Some(existing) = self.bonds[i].get(&j) {
            if *existing != order {
                return Err(MechanismError::Structural(format!(
                    "bond {}-{} is listed with two different orders",
                    i + 1,
                    j + 1
                )));
            }
            return Ok(());
        }
        self.bonds[i].insert(j, order);
        self.bonds[j].insert(i, order);
        Ok(())
    }

    pub fn remove_bond(&mut self, i: usize, j: usize) -> Option<BondOrder> {
        let order = self.bonds.get_mut(i)?.remove(&j)?;
        self.bonds[j].remove(&i);
        Some(order)
    }

    pub fn n_atoms(&self) -> usize {
        self.atoms.len()
    }

    pub fn atoms(&self) -> &[Atom] {
        &self.atoms
    }

    pub fn atom(&self, i: usize) -> &Atom {
        &self.atoms[i]
    }

    pub fn set_radicals(&mut self, i: usize, radicals: u8) {
        self.atoms[i].radicals = radicals;
    }

    pub fn neighbours(&self, i: usize) -> impl Iterator<Item = (usize, BondOrder)> + '_ {
        self.bonds[i].iter().map(|(j, order)| (*j, *order))
    }

    pub fn bond(&self, i: usize, j: usize) -> Option<BondOrder> {
        self.bonds.get(i)?.get(&j).copied()
    }

    /// every bond once, as (i, j, order) with i < j
    pub fn bond_list(&self) -> Vec<(usize, usize, BondOrder)> {
        self.bonds
            .iter()
            .enumerate()
            .flat_map(|(i, adj)| {
                adj.iter()
                    .filter(move |(j, _)| **j > i)
                    .map(move |(j, order)| (i, *j, *order))
            })
            .collect()
    }

    fn bond_order_sum(&self, i: usize) -> u8 {
        self.bonds[i].values().map(|o| o.valence()).sum()
    }

    pub fn total_radicals(&self) -> u32 {
        self.atoms.iter().map(|a| a.radicals as u32).sum()
    }

    pub fn multiplicity(&self) -> u32 {
        self.total_radicals() + 1
    }

    /// atoms carrying at least one unpaired electron
    pub fn radical_sites(&self) -> Vec<usize> {
        (0..self.atoms.len())
            .filter(|i| self.atoms[*i].radicals > 0)
            .collect()
    }

    pub fn element_counts(&self) -> BTreeMap<String, usize> {
        let mut counts = BTreeMap::new();
        for atom in &self.atoms {
            *counts.entry(atom.element.clone()).or_insert(0) += 1;
        }
        counts
    }

    pub fn formula(&self) -> String {
        hill_formula(&self.element_counts())
    }

    /// g/mol
    pub fn molar_mass(&self) -> Option<f64> {
        molar_mass_of_composition(&self.element_counts())
    }

    /// atom index sets of the connected components, each sorted, ordered by smallest index
    pub fn connected_components(&self) -> Vec<Vec<usize>> {
        let mut seen = vec![false; self.atoms.len()];
        let mut components = Vec::new();
        for start in 0..self.atoms.len() {
            if seen[start] {
                continue;
            }
            let mut component = vec![];
            let mut stack = vec![start];
            seen[start] = true;
            while let Some(i) = stack.pop() {
                component.push(i);
                for (j, _) in self.neighbours(i) {
                    if !seen[j] {
                        seen[j] = true;
                        stack.push(j);
                    }
                }
            }
            component.sort_unstable();
            components.push(component);
        }
        components
    }

    pub fn is_connected(&self) -> bool {
        self.connected_components().len() <= 1
    }

    /// graph induced by the given atoms, renumbered in the given order
    pub fn subgraph(&self, atoms: &[usize]) -> MolecularGraph {
        let index: BTreeMap<usize, usize> = atoms.iter().enumerate().map(|(new, old)| (*old, new)).collect();
        let mut graph = MolecularGraph::new();
        for old in atoms {
            graph.atoms.push(self.atoms[*old].clone());
            graph.bonds.push(BTreeMap::new());
        }
        for (new_i, old_i) in atoms.iter().enumerate() {
            for (old_j, order) in self.neighbours(*old_i) {
                if let Some(new_j) = index.get(&old_j) {
                    graph.bonds[new_i].insert(*new_j, order);
                }
            }
        }
        graph
    }

    /// disjoint union of two graphs; atoms of `other` are shifted by the returned offset
    pub fn merged(&self, other: &MolecularGraph) -> (MolecularGraph, usize) {
        let offset = self.atoms.len();
        let mut graph = self.clone();
        graph.atoms.extend(other.atoms.iter().cloned());
        for adj in &other.bonds {
            graph
                .bonds
                .push(adj.iter().map(|(j, order)| (j + offset, *order)).collect());
        }
        (graph, offset)
    }

    /// Checks that the graph describes one neutral molecule with sensible valences
    pub fn validate(&self) -> Result<(), MechanismError> {
        if self.atoms.is_empty() {
            return Err(MechanismError::Structural("molecule has no atoms".to_string()));
        }
        if !self.is_connected() {
            return Err(MechanismError::Structural(format!(
                "{} is not a single connected molecule",
                self.formula()
            )));
        }
        let total_charge: i32 = self.atoms.iter().map(|a| a.charge as i32).sum();
        if total_charge != 0 {
            return Err(MechanismError::Structural(format!(
                "{} carries a net charge of {}",
                self.formula(),
                total_charge
            )));
        }
        for (i, atom) in self.atoms.iter().enumerate() {
            let valence = standard_valence(&atom.element).ok_or_else(|| {
                MechanismError::Structural(format!(
                    "element {} of atom {} has no covalent valence",
                    atom.element,
                    i + 1
                ))
            })?;
            let limit = valence as i32 + (atom.charge as i32).abs();
            let used = self.bond_order_sum(i) as i32 + atom.radicals as i32;
            if used > limit {
                return Err(MechanismError::Structural(format!(
                    "atom {} ({}) exceeds its valence: {} > {}",
                    i + 1,
                    atom.element,
                    used,
                    limit
                )));
            }
        }
        Ok(())
    }

    /// Parses an adjacency list. An optional first line with a species name and an optional
    /// `multiplicity` line are accepted; lone-pair tokens (`p1`) are ignored.
    pub fn from_adjacency_list(text: &str) -> Result<MolecularGraph, MechanismError> {
        let line_re = Regex::new(r"^(\d+)\s+(?:\*\d*\s+)?([A-Z][a-z]?)\b\s*(.*)$")
            .map_err(|e| MechanismError::Structural(e.to_string()))?;
        let bond_re = Regex::new(r"^\{(\d+),([A-Za-z]+)\}$")
            .map_err(|e| MechanismError::Structural(e.to_string()))?;
        let mut graph = MolecularGraph::new();
        let mut bonds: Vec<(usize, usize, BondOrder)> = Vec::new();
        let mut multiplicity: Option<u32> = None;
        for (line_no, line) in text
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty() && !l.starts_with("//"))
            .enumerate()
        {
            if let Some(rest) = line.strip_prefix("multiplicity") {
                let value = rest.trim().parse::<u32>().map_err(|_| {
                    MechanismError::Structural(format!("bad multiplicity line '{}'", line))
                })?;
                multiplicity = Some(value);
                continue;
            }
            let Some(caps) = line_re.captures(line) else {
                if line_no == 0 && !line.contains('{') {
                    // species name line
                    continue;
                }
                return Err(MechanismError::Structural(format!(
                    "cannot parse adjacency list line '{}'",
                    line
                )));
            };
            let index: usize = caps[1]
                .parse()
                .map_err(|_| MechanismError::Structural(format!("bad atom index in '{}'", line)))?;
            if index != graph.n_atoms() + 1 {
                return Err(MechanismError::Structural(format!(
                    "atom indices must be consecutive from 1, found {} at position {}",
                    index,
                    graph.n_atoms() + 1
                )));
            }
            let element = caps[2].to_string();
            let mut radicals = 0u8;
            let mut charge = 0i8;
            for token in caps[3].split_whitespace() {
                if let Some(c) = bond_re.captures(token) {
                    let other: usize = c[1].parse().map_err(|_| {
                        MechanismError::Structural(format!("bad bond token '{}'", token))
                    })?;
                    if other == 0 {
                        return Err(MechanismError::Structural(format!("bad bond token '{}'", token)));
                    }
                    bonds.push((index - 1, other - 1, BondOrder::from_symbol(&c[2])?));
                } else if let Some(u) = token.strip_prefix('u') {
                    radicals = u.parse().map_err(|_| {
                        MechanismError::Structural(format!("bad radical token '{}'", token))
                    })?;
                } else if let Some(c) = token.strip_prefix('c') {
                    charge = c.trim_start_matches('+').parse().map_err(|_| {
                        MechanismError::Structural(format!("bad charge token '{}'", token))
                    })?;
                } else if token.starts_with('p') {
                    continue;
                } else {
                    return Err(MechanismError::Structural(format!(
                        "unknown token '{}' in line '{}'",
                        token, line
                    )));
                }
            }
            let i = graph.add_atom(&element, radicals);
            graph.atoms[i].charge = charge;
        }
        for (i, j, order) in bonds {
            graph.add_bond(i, j, order)?;
        }
        if let Some(m) = multiplicity {
            if m != graph.multiplicity() {
                return Err(MechanismError::Structural(format!(
                    "multiplicity {} does not match {} unpaired electrons",
                    m,
                    graph.total_radicals()
                )));
            }
        }
        graph.validate()?;
        Ok(graph)
    }

    pub fn to_adjacency_list(&self) -> String {
        let mut text = String::new();
        if self.total_radicals() > 0 {
            text.push_str(&format!("multiplicity {}\n", self.multiplicity()));
        }
        for (i, atom) in self.atoms.iter().enumerate() {
            text.push_str(&format!("{} {} u{}", i + 1, atom.element, atom.radicals));
            if atom.charge != 0 {
                text.push_str(&format!(" c{:+}", atom.charge));
            }
            for (j, order) in self.neighbours(i) {
                text.push_str(&format!(" {{{},{}}}", j + 1, order.symbol()));
            }
            text.push('\n');
        }
        text
    }

    /// Canonical string of the graph, equal for isomorphic graphs.
    /// Hydrogens are folded into their heavy atom so that only the heavy-atom skeleton is searched.
    pub fn canonical_key(&self) -> String {
        let skeleton = Skeleton::new(self);
        format!("{}:{}", self.formula(), skeleton.canonical_form())
    }

    pub fn is_isomorphic(&self, other: &MolecularGraph) -> bool {
        self.n_atoms() == other.n_atoms() && self.canonical_key() == other.canonical_key()
    }
}

impl fmt::Display for MolecularGraph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_adjacency_list())
    }
}

// hydrogen-suppressed view of a graph used for canonical labelling
struct Skeleton {
    // (element, h count, radicals, charge)
    labels: Vec<(String, usize, u8, i8)>,
    adjacency: Vec<Vec<(usize, BondOrder)>>,
}

impl Skeleton {
    fn new(graph: &MolecularGraph) -> Self {
        let heavy: Vec<usize> = (0..graph.n_atoms())
            .filter(|i| graph.atom(*i).element != "H")
            .collect();
        let kept = if heavy.is_empty() {
            (0..graph.n_atoms()).collect()
        } else {
            heavy
        };
        let local: BTreeMap<usize, usize> = kept.iter().enumerate().map(|(l, g)| (*g, l)).collect();
        let mut labels = Vec::with_capacity(kept.len());
        let mut adjacency = vec![Vec::new(); kept.len()];
        for (l, g) in kept.iter().enumerate() {
            let atom = graph.atom(*g);
            let mut h_count = 0;
            for (other, order) in graph.neighbours(*g) {
                match local.get(&other) {
                    Some(lo) => adjacency[l].push((*lo, order)),
                    None => h_count += 1,
                }
            }
            labels.push((atom.element.clone(), h_count, atom.radicals, atom.charge));
        }
        Self { labels, adjacency }
    }

    fn initial_colors(&self) -> Vec<usize> {
        let invariants: Vec<_> = self
            .labels
            .iter()
            .zip(&self.adjacency)
            .map(|(label, adj)| (label.clone(), adj.len()))
            .collect();
        let ranks: BTreeSet<_> = invariants.iter().cloned().collect();
        let ranks: Vec<_> = ranks.into_iter().collect();
        invariants
            .iter()
            .map(|inv| ranks.binary_search(inv).unwrap_or(0))
            .collect()
    }

    fn class_count(colors: &[usize]) -> usize {
        colors.iter().collect::<BTreeSet<_>>().len()
    }

    // colour refinement; keeps the relative order of existing classes
    fn refine(&self, mut colors: Vec<usize>) -> Vec<usize> {
        loop {
            let signatures: Vec<(usize, Vec<(usize, BondOrder)>)> = (0..colors.len())
                .map(|v| {
                    let mut neighbourhood: Vec<(usize, BondOrder)> = self.adjacency[v]
                        .iter()
                        .map(|(u, order)| (colors[*u], *order))
                        .collect();
                    neighbourhood.sort_unstable();
                    (colors[v], neighbourhood)
                })
                .collect();
            let ordered: Vec<_> = signatures
                .iter()
                .cloned()
                .collect::<BTreeSet<_>>()
                .into_iter()
                .collect();
            let refined: Vec<usize> = signatures
                .iter()
                .map(|s| ordered.binary_search(s).unwrap_or(0))
                .collect();
            if Self::class_count(&refined) == Self::class_count(&colors) {
                return refined;
            }
            colors = refined;
        }
    }

    fn serialize(&self, colors: &[usize]) -> String {
        let mut order: Vec<usize> = (0..colors.len()).collect();
        order.sort_by_key(|v| colors[*v]);
        let mut text = String::new();
        for v in &order {
            let (element, h, radicals, charge) = &self.labels[*v];
            text.push_str(&format!("{}H{}u{}c{}|", element, h, radicals, charge));
        }
        let mut bonds: Vec<(usize, usize, char)> = Vec::new();
        for (v, adj) in self.adjacency.iter().enumerate() {
            for (u, bond) in adj {
                let (a, b) = (colors[v], colors[*u]);
                if a < b {
                    bonds.push((a, b, bond.symbol()));
                }
            }
        }
        bonds.sort_unstable();
        for (a, b, symbol) in bonds {
            text.push_str(&format!("{}-{}{};", a, b, symbol));
        }
        text
    }

    // Individualisation-refinement search over the tie-breaks, keeping the smallest serialization.
    // Two leaves with the same serialization give an automorphism (the map between equally
    // labelled vertices). Automorphisms found below a node fix that node's individualised
    // vertices, so a child in the same orbit as an explored sibling yields the same leaves
    // and is skipped.
    fn search(&self, colors: Vec<usize>, state: &mut SearchState) -> Leaf {
        let colors = self.refine(colors);
        let n = colors.len();
        if Self::class_count(&colors) == n {
            state.leaves += 1;
            return Leaf {
                form: self.serialize(&colors),
                colors,
            };
        }
        let mut sizes = BTreeMap::new();
        for c in &colors {
            *sizes.entry(*c).or_insert(0usize) += 1;
        }
        let target = sizes
            .iter()
            .find(|(_, size)| **size > 1)
            .map(|(c, _)| *c)
            .unwrap_or(0);
        let found_before = state.automorphisms.len();
        let mut explored: Vec<usize> = Vec::new();
        let mut best: Option<Leaf> = None;
        for v in (0..n).filter(|v| colors[*v] == target) {
            if !explored.is_empty() {
                let orbits = Orbits::new(n, &state.automorphisms[found_before..]);
                if explored.iter().any(|u| orbits.same(*u, v)) {
                    continue;
                }
            }
            let individualised: Vec<usize> = colors
                .iter()
                .enumerate()
                .map(|(u, c)| if *c > target || (*c == target && u != v) { c + 1 } else { *c })
                .collect();
            let leaf = self.search(individualised, state);
            explored.push(v);
            if let Some(current) = best.as_ref().filter(|current| current.form == leaf.form) {
                let mut by_label = vec![0; n];
                for (x, label) in current.colors.iter().enumerate() {
                    by_label[*label] = x;
                }
                let automorphism = leaf.colors.iter().map(|label| by_label[*label]).collect();
                state.automorphisms.push(automorphism);
            } else if best.as_ref().is_none_or(|current| leaf.form < current.form) {
                best = Some(leaf);
            }
        }
        best.unwrap_or(Leaf {
            form: String::new(),
            colors,
        })
    }

    fn canonical_form(&self) -> String {
        if self.labels.is_empty() {
            return String::new();
        }
        let mut state = SearchState::default();
        self.search(self.initial_colors(), &mut state).form
    }
}

// smallest leaf below a search node and its discrete colouring
struct Leaf {
    form: String,
    colors: Vec<usize>,
}

#[derive(Default)]
struct SearchState {
    // vertex permutations preserving the labelled skeleton
    automorphisms: Vec<Vec<usize>>,
    leaves: usize,
}

// orbits of the group generated by a set of permutations (union-find)
struct Orbits {
    parent: Vec<usize>,
}

impl Orbits {
    fn new(n: usize, generators: &[Vec<usize>]) -> Self {
        let mut orbits = Self {
            parent: (0..n).collect(),
        };
        for permutation in generators {
            for (x, y) in permutation.iter().enumerate() {
                let (rx, ry) = (orbits.root(x), orbits.root(*y));
                if rx != ry {
                    orbits.parent[rx.max(ry)] = rx.min(ry);
                }
            }
        }
        orbits
    }

    fn root(&self, mut x: usize) -> usize {
        while self.parent[x] != x {
            x = self.parent[x];
        }
        x
    }

    fn same(&self, a: usize, b: usize) -> bool {
        self.root(a) == self.root(b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const METHYL: &str = "multiplicity 2
1 C u1 {2,S} {3,S} {4,S}
2 H u0 {1,S}
3 H u0 {1,S}
4 H u0 {1,S}";

    const ETHANOL: &str = "ethanol
1 C u0 {2,S} {4,S} {5,S} {6,S}
2 C u0 {1,S} {3,S} {7,S} {8,S}
3 O u0 p2 {2,S} {9,S}
4 H u0 {1,S}
5 H u0 {1,S}
6 H u0 {1,S}
7 H u0 {2,S}
8 H u0 {2,S}
9 H u0 {3,S}";

    // same molecule, atoms listed in another order
    const ETHANOL_SHUFFLED: &str = "1 O u0 {3,S} {2,S}
2 H u0 {1,S}
3 C u0 {1,S} {4,S} {5,S} {6,S}
4 H u0 {3,S}
5 H u0 {3,S}
6 C u0 {3,S} {7,S} {8,S} {9,S}
7 H u0 {6,S}
8 H u0 {6,S}
9 H u0 {6,S}";

    const DIMETHYL_ETHER: &str = "1 C u0 {2,S} {4,S} {5,S} {6,S}
2 O u0 {1,S} {3,S}
3 C u0 {2,S} {7,S} {8,S} {9,S}
4 H u0 {1,S}
5 H u0 {1,S}
6 H u0 {1,S}
7 H u0 {3,S}
8 H u0 {3,S}
9 H u0 {3,S}";

    #[test]
    fn test_parse_methyl() {
        let graph = MolecularGraph::from_adjacency_list(METHYL).unwrap();
        assert_eq!(graph.n_atoms(), 4);
        assert_eq!(graph.formula(), "CH3");
        assert_eq!(graph.total_radicals(), 1);
        assert_eq!(graph.radical_sites(), vec![0]);
        assert_eq!(graph.bond_list().len(), 3);
    }

    #[test]
    fn test_canonical_key_is_label_invariant() {
        let a = MolecularGraph::from_adjacency_list(ETHANOL).unwrap();
        let b = MolecularGraph::from_adjacency_list(ETHANOL_SHUFFLED).unwrap();
        assert_eq!(a.canonical_key(), b.canonical_key());
        assert!(a.is_isomorphic(&b));
    }

    #[test]
    fn test_isomers_have_different_keys() {
        let ethanol = MolecularGraph::from_adjacency_list(ETHANOL).unwrap();
        let ether = MolecularGraph::from_adjacency_list(DIMETHYL_ETHER).unwrap();
        assert_eq!(ethanol.formula(), ether.formula());
        assert_ne!(ethanol.canonical_key(), ether.canonical_key());
    }

    #[test]
    fn test_round_trip_keeps_identity() {
        let graph = MolecularGraph::from_adjacency_list(METHYL).unwrap();
        let text = graph.to_adjacency_list();
        let again = MolecularGraph::from_adjacency_list(&text).unwrap();
        assert_eq!(graph.canonical_key(), again.canonical_key());
    }

    #[test]
    fn test_hydrogen_only_molecules() {
        let h2 = MolecularGraph::from_adjacency_list("1 H u0 {2,S}\n2 H u0 {1,S}").unwrap();
        let h = MolecularGraph::from_adjacency_list("multiplicity 2\n1 H u1").unwrap();
        assert_ne!(h2.canonical_key(), h.canonical_key());
        assert_eq!(h2.formula(), "H2");
    }

    #[test]
    fn test_symmetric_ring_key_is_stable() {
        // cyclopropane written with two different numberings
        let mut a = MolecularGraph::new();
        let mut b = MolecularGraph::new();
        for g in [&mut a, &mut b] {
            for _ in 0..3 {
                g.add_atom("C", 0);
            }
        }
        a.add_bond(0, 1, BondOrder::Single).unwrap();
        a.add_bond(1, 2, BondOrder::Single).unwrap();
        a.add_bond(2, 0, BondOrder::Single).unwrap();
        b.add_bond(2, 1, BondOrder::Single).unwrap();
        b.add_bond(0, 2, BondOrder::Single).unwrap();
        b.add_bond(1, 0, BondOrder::Single).unwrap();
        for g in [&mut a, &mut b] {
            for c in 0..3 {
                for _ in 0..2 {
                    let h = g.add_atom("H", 0);
                    g.add_bond(c, h, BondOrder::Single).unwrap();
                }
            }
        }
        assert_eq!(a.canonical_key(), b.canonical_key());
    }

    #[test]
    fn test_structural_errors() {
        // five bonds on carbon
        let overvalent = "1 C u0 {2,S} {3,S} {4,S} {5,S} {6,S}
2 H u0 {1,S}
3 H u0 {1,S}
4 H u0 {1,S}
5 H u0 {1,S}
6 H u0 {1,S}";
        assert!(matches!(
            MolecularGraph::from_adjacency_list(overvalent),
            Err(MechanismError::Structural(_))
        ));
        // two fragments
        assert!(MolecularGraph::from_adjacency_list("1 H u1\n2 H u1").is_err());
        // multiplicity mismatch
        assert!(MolecularGraph::from_adjacency_list("multiplicity 3\n1 H u1").is_err());
        // inconsistent bond orders
        assert!(MolecularGraph::from_adjacency_list("1 O u0 {2,D}\n2 O u0 {1,S}").is_err());
        // unknown token
        assert!(MolecularGraph::from_adjacency_list("1 C u0 x7").is_err());
        // aromatic bonds are not supported
        assert!(MolecularGraph::from_adjacency_list("1 C u0 {2,B}\n2 C u0 {1,B}").is_err());
    }

    const NEOPENTANE: &str = "1 C u0 {2,S} {3,S} {4,S} {5,S}
2 C u0 {1,S} {6,S} {7,S} {8,S}
3 C u0 {1,S} {9,S} {10,S} {11,S}
4 C u0 {1,S} {12,S} {13,S} {14,S}
5 C u0 {1,S} {15,S} {16,S} {17,S}
6 H u0 {2,S}
7 H u0 {2,S}
8 H u0 {2,S}
9 H u0 {3,S}
10 H u0 {3,S}
11 H u0 {3,S}
12 H u0 {4,S}
13 H u0 {4,S}
14 H u0 {4,S}
15 H u0 {5,S}
16 H u0 {5,S}
17 H u0 {5,S}";

    // same molecule, atoms listed in reverse order
    const NEOPENTANE_REVERSED: &str = "1 H u0 {13,S}
2 H u0 {13,S}
3 H u0 {13,S}
4 H u0 {14,S}
5 H u0 {14,S}
6 H u0 {14,S}
7 H u0 {15,S}
8 H u0 {15,S}
9 H u0 {15,S}
10 H u0 {16,S}
11 H u0 {16,S}
12 H u0 {16,S}
13 C u0 {17,S} {3,S} {2,S} {1,S}
14 C u0 {17,S} {6,S} {5,S} {4,S}
15 C u0 {17,S} {9,S} {8,S} {7,S}
16 C u0 {17,S} {12,S} {11,S} {10,S}
17 C u0 {16,S} {15,S} {14,S} {13,S}";

    #[test]
    fn test_symmetric_branches_are_searched_once() {
        let neopentane = MolecularGraph::from_adjacency_list(NEOPENTANE).unwrap();
        let skeleton = Skeleton::new(&neopentane);
        let mut state = SearchState::default();
        let form = skeleton.search(skeleton.initial_colors(), &mut state).form;
        // every ordering of the four methyl groups would be a separate leaf
        assert!(state.leaves < 24, "{} leaves", state.leaves);
        assert!(!state.automorphisms.is_empty());
        assert_eq!(neopentane.canonical_key(), format!("C5H12:{}", form));
        let reversed = MolecularGraph::from_adjacency_list(NEOPENTANE_REVERSED).unwrap();
        assert_eq!(reversed.canonical_key(), neopentane.canonical_key());
        assert!(reversed.is_isomorphic(&neopentane));
    }

    #[test]
    fn test_components_and_subgraph() {
        let mut graph = MolecularGraph::from_adjacency_list(ETHANOL).unwrap();
        graph.remove_bond(0, 1).unwrap();
        let components = graph.connected_components();
        assert_eq!(components.len(), 2);
        let formulas: BTreeSet<String> = components
            .iter()
            .map(|c| graph.subgraph(c).formula())
            .collect();
        assert!(formulas.contains("CH3"));
        assert!(formulas.contains("CH3O"));
    }

    #[test]
    fn test_merged_offsets_atoms() {
        let methyl = MolecularGraph::from_adjacency_list(METHYL).unwrap();
        let (merged, offset) = methyl.merged(&methyl);
        assert_eq!(offset, 4);
        assert_eq!(merged.n_atoms(), 8);
        assert_eq!(merged.bond(4, 5), Some(BondOrder::Single));
        assert!(!merged.is_connected());
    }
}
