use crate::Kinetics::rate_constants::RateExpression;
use crate::MechanismGeneration::errors::MechanismError;
use crate::MechanismGeneration::reaction::{ProposedSpecies, ReactionSkeleton};
use crate::MechanismGeneration::species::{Species, SpeciesStructure};
use crate::MechanismGeneration::structure::{BondOrder, MolecularGraph};
use enum_dispatch::enum_dispatch;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One species (unimolecular templates) or an unordered pair (bimolecular templates)
#[derive(Debug, Clone, Copy)]
pub enum ReactantQuery<'a> {
    Single(&'a Species),
    Pair(&'a Species, &'a Species),
}

impl<'a> ReactantQuery<'a> {
    pub fn species(&self) -> Vec<&'a Species> {
        match self {
            ReactantQuery::Single(s) => vec![*s],
            ReactantQuery::Pair(a, b) => vec![*a, *b],
        }
    }

    /// sorted canonical keys of the queried species
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.species().iter().map(|s| s.key.clone()).collect();
        keys.sort();
        keys
    }

    fn proposed(&self) -> Vec<ProposedSpecies> {
        self.species()
            .iter()
            .map(|s| ProposedSpecies::new(s.structure.clone(), Some(s.label.clone())))
            .collect()
    }
}

#[enum_dispatch]
pub trait ReactionFamilyRule {
    fn family_name(&self) -> &str;
    fn validate(&self) -> Result<(), MechanismError>;
    /// All reactions of the template applicable to the queried species, in a deterministic order.
    /// Symmetry-equivalent sites are merged into one skeleton with the site count as degeneracy.
    fn match_templates(&self, query: ReactantQuery<'_>) -> Result<Vec<ReactionSkeleton>, MechanismError>;
}

/// Closed set of reaction families; `"kind"` selects the variant in JSON
#[enum_dispatch(ReactionFamilyRule)]
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum ReactionFamily {
    Library(LibraryFamily),
    BondFission(BondFissionFamily),
    RadicalRecombination(RadicalRecombinationFamily),
    HydrogenAbstraction(HydrogenAbstractionFamily),
}

fn default_true() -> bool {
    true
}

// groups skeletons with the same product set, counting how many sites produced them
#[derive(Default)]
struct SkeletonCollector {
    found: BTreeMap<Vec<String>, (Vec<ProposedSpecies>, u32)>,
}

impl SkeletonCollector {
    fn add(&mut self, products: Vec<MolecularGraph>) {
        let mut keyed: Vec<(String, MolecularGraph)> = products
            .into_iter()
            .map(|g| (SpeciesStructure::Graph(g.clone()).canonical_key(), g))
            .collect();
        keyed.sort_by(|a, b| a.0.cmp(&b.0));
        let keys: Vec<String> = keyed.iter().map(|(k, _)| k.clone()).collect();
        let entry = self.found.entry(keys).or_insert_with(|| {
            let proposed = keyed
                .into_iter()
                .map(|(_, g)| ProposedSpecies::new(SpeciesStructure::Graph(g), None))
                .collect();
            (proposed, 0)
        });
        entry.1 += 1;
    }

    fn into_skeletons(
        self,
        query: &ReactantQuery<'_>,
        rate: &RateExpression,
        family: &str,
        reversible: bool,
    ) -> Vec<ReactionSkeleton> {
        let reactant_keys = query.keys();
        self.found
            .into_iter()
            // a template that maps the reactants onto themselves is not a reaction
            .filter(|(keys, _)| *keys != reactant_keys)
            .map(|(_, (products, degeneracy))| ReactionSkeleton {
                reactants: query.proposed(),
                products,
                rate: rate.clone(),
                family: family.to_string(),
                degeneracy,
                reversible,
            })
            .collect()
    }
}

//////////////////////////////////LIBRARY/////////////////////////////////////////////
/// Reaction given explicitly by species labels; labels found in the species dictionary
/// are resolved to molecular graphs
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LibraryEntry {
    pub reactants: Vec<String>,
    pub products: Vec<String>,
    pub rate: RateExpression,
    #[serde(default)]
    pub reversible: bool,
}

#[derive(Debug, Clone)]
struct CompiledEntry {
    reactant_keys: Vec<String>,
    reactants: Vec<ProposedSpecies>,
    products: Vec<ProposedSpecies>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LibraryFamily {
    pub name: String,
    pub reactions: Vec<LibraryEntry>,
    #[serde(skip)]
    compiled: Vec<CompiledEntry>,
}

impl LibraryFamily {
    pub fn new(name: &str, reactions: Vec<LibraryEntry>) -> Self {
        let mut family = Self {
            name: name.to_string(),
            reactions,
            compiled: Vec::new(),
        };
        family.compile(&BTreeMap::new());
        family
    }

    /// resolves entry labels through the species dictionary
    pub fn compile(&mut self, dictionary: &BTreeMap<String, SpeciesStructure>) {
        let resolve = |label: &String| {
            let structure = dictionary
                .get(label)
                .cloned()
                .unwrap_or_else(|| SpeciesStructure::Label(label.clone()));
            ProposedSpecies::new(structure, Some(label.clone()))
        };
        self.compiled = self
            .reactions
            .iter()
            .map(|entry| {
                let reactants: Vec<ProposedSpecies> = entry.reactants.iter().map(&resolve).collect();
                let products = entry.products.iter().map(&resolve).collect();
                let mut reactant_keys: Vec<String> =
                    reactants.iter().map(|r| r.structure.canonical_key()).collect();
                reactant_keys.sort();
                CompiledEntry {
                    reactant_keys,
                    reactants,
                    products,
                }
            })
            .collect();
    }
}

impl ReactionFamilyRule for LibraryFamily {
    fn family_name(&self) -> &str {
        &self.name
    }

    fn validate(&self) -> Result<(), MechanismError> {
        if self.name.trim().is_empty() {
            return Err(MechanismError::Config("library family without a name".to_string()));
        }
        for (i, entry) in self.reactions.iter().enumerate() {
            if entry.reactants.is_empty() || entry.products.is_empty() {
                return Err(MechanismError::Structural(format!(
                    "reaction {} of library {} has an empty side",
                    i, self.name
                )));
            }
            entry.rate.validate().map_err(|e| {
                MechanismError::Config(format!("reaction {} of library {}: {}", i, self.name, e))
            })?;
        }
        Ok(())
    }

    fn match_templates(&self, query: ReactantQuery<'_>) -> Result<Vec<ReactionSkeleton>, MechanismError> {
        if self.compiled.len() != self.reactions.len() {
            return Err(MechanismError::Config(format!(
                "library {} was modified without being recompiled",
                self.name
            )));
        }
        let keys = query.keys();
        Ok(self
            .compiled
            .iter()
            .zip(&self.reactions)
            .filter(|(compiled, _)| compiled.reactant_keys == keys)
            .map(|(compiled, entry)| ReactionSkeleton {
                reactants: compiled.reactants.clone(),
                products: compiled.products.clone(),
                rate: entry.rate.clone(),
                family: self.name.clone(),
                degeneracy: 1,
                reversible: entry.reversible,
            })
            .collect())
    }
}

//////////////////////////////////BOND FISSION/////////////////////////////////////////
/// A-B -> A* + B*, for every single bond between two heavy atoms outside a ring
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BondFissionFamily {
    pub rate: RateExpression,
    #[serde(default = "default_true")]
    pub reversible: bool,
}

impl ReactionFamilyRule for BondFissionFamily {
    fn family_name(&self) -> &str {
        "BondFission"
    }

    fn validate(&self) -> Result<(), MechanismError> {
        self.rate
            .validate()
            .map_err(|e| MechanismError::Config(format!("BondFission: {}", e)))
    }

    fn match_templates(&self, query: ReactantQuery<'_>) -> Result<Vec<ReactionSkeleton>, MechanismError> {
        let ReactantQuery::Single(species) = query else {
            return Ok(Vec::new());
        };
        let Some(graph) = species.structure.as_graph() else {
            return Ok(Vec::new());
        };
        let mut collector = SkeletonCollector::default();
        for (i, j, order) in graph.bond_list() {
            if order != BondOrder::Single || graph.atom(i).element == "H" || graph.atom(j).element == "H" {
                continue;
            }
            let mut broken = graph.clone();
            broken.remove_bond(i, j);
            let components = broken.connected_components();
            if components.len() != 2 {
                continue;
            }
            let mut fragments = Vec::with_capacity(2);
            for component in &components {
                let mut fragment = broken.subgraph(component);
                for site in [i, j] {
                    if let Some(local) = component.iter().position(|a| *a == site) {
                        let radicals = fragment.atom(local).radicals;
                        fragment.set_radicals(local, radicals + 1);
                    }
                }
                fragments.push(fragment);
            }
            collector.add(fragments);
        }
        Ok(collector.into_skeletons(&query, &self.rate, self.family_name(), self.reversible))
    }
}

//////////////////////////////RADICAL RECOMBINATION///////////////////////////////////
/// A* + B* -> A-B
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RadicalRecombinationFamily {
    pub rate: RateExpression,
    #[serde(default = "default_true")]
    pub reversible: bool,
}

impl ReactionFamilyRule for RadicalRecombinationFamily {
    fn family_name(&self) -> &str {
        "R_Recombination"
    }

    fn validate(&self) -> Result<(), MechanismError> {
        self.rate
            .validate()
            .map_err(|e| MechanismError::Config(format!("R_Recombination: {}", e)))
    }

    fn match_templates(&self, query: ReactantQuery<'_>) -> Result<Vec<ReactionSkeleton>, MechanismError> {
        let ReactantQuery::Pair(a, b) = query else {
            return Ok(Vec::new());
        };
        let (Some(ga), Some(gb)) = (a.structure.as_graph(), b.structure.as_graph()) else {
            return Ok(Vec::new());
        };
        let mut collector = SkeletonCollector::default();
        for i in ga.radical_sites() {
            for j in gb.radical_sites() {
                let (mut product, offset) = ga.merged(gb);
                product.add_bond(i, offset + j, BondOrder::Single)?;
                product.set_radicals(i, ga.atom(i).radicals - 1);
                product.set_radicals(offset + j, gb.atom(j).radicals - 1);
                if product.validate().is_ok() {
                    collector.add(vec![product]);
                }
            }
        }
        Ok(collector.into_skeletons(&query, &self.rate, self.family_name(), self.reversible))
    }
}

////////////////////////////////H ABSTRACTION/////////////////////////////////////////
/// X* + H-R -> X-H + R*, tried with either partner as the radical
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HydrogenAbstractionFamily {
    pub rate: RateExpression,
    #[serde(default = "default_true")]
    pub reversible: bool,
}

impl HydrogenAbstractionFamily {
    fn abstract_from(radical: &MolecularGraph, donor: &MolecularGraph, collector: &mut SkeletonCollector) {
        for x in radical.radical_sites() {
            for h in 0..donor.n_atoms() {
                if donor.atom(h).element != "H" {
                    continue;
                }
                let neighbours: Vec<usize> = donor.neighbours(h).map(|(r, _)| r).collect();
                let &[r] = neighbours.as_slice() else {
                    continue;
                };
                let mut xh = radical.clone();
                let new_h = xh.add_atom("H", 0);
                xh.set_radicals(x, radical.atom(x).radicals - 1);
                if xh.add_bond(x, new_h, BondOrder::Single).is_err() || xh.validate().is_err() {
                    continue;
                }
                let kept: Vec<usize> = (0..donor.n_atoms()).filter(|a| *a != h).collect();
                let mut rest = donor.subgraph(&kept);
                let r_local = if r < h { r } else { r - 1 };
                rest.set_radicals(r_local, donor.atom(r).radicals + 1);
                if rest.validate().is_err() {
                    continue;
                }
                collector.add(vec![xh, rest]);
            }
        }
    }
}

impl ReactionFamilyRule for HydrogenAbstractionFamily {
    fn family_name(&self) -> &str {
        "H_Abstraction"
    }

    fn validate(&self) -> Result<(), MechanismError> {
        self.rate
            .validate()
            .map_err(|e| MechanismError::Config(format!("H_Abstraction: {}", e)))
    }

    fn match_templates(&self, query: ReactantQuery<'_>) -> Result<Vec<ReactionSkeleton>, MechanismError> {
        let ReactantQuery::Pair(a, b) = query else {
            return Ok(Vec::new());
        };
        let (Some(ga), Some(gb)) = (a.structure.as_graph(), b.structure.as_graph()) else {
            return Ok(Vec::new());
        };
        let mut collector = SkeletonCollector::default();
        Self::abstract_from(ga, gb, &mut collector);
        if a.key != b.key {
            Self::abstract_from(gb, ga, &mut collector);
        }
        Ok(collector.into_skeletons(&query, &self.rate, self.family_name(), self.reversible))
    }
}
