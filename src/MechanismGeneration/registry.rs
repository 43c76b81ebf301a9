use crate::Kinetics::molmass::create_elem_composition_matrix;
use crate::Kinetics::rate_constants::{ATM, RateExpression};
use crate::MechanismGeneration::errors::MechanismError;
use crate::MechanismGeneration::reaction::{Reaction, ReactionId, direction_key};
use crate::MechanismGeneration::species::{ModelStatus, Species, SpeciesId, SpeciesStructure};
use crate::Thermodynamics::nasa_poly::NasaPolynomial;
use log::{debug, info};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

/// temperature at which competing rate estimates of one reaction are compared
const REFINEMENT_TEMPERATURE: f64 = 1000.0;

/// anything that can be promoted from edge to core
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Entity {
    Species(SpeciesId),
    Reaction(ReactionId),
}

/// Species and reactions promoted by one call of `promote_with_closure`
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PromotionSummary {
    pub species: Vec<SpeciesId>,
    pub reactions: Vec<ReactionId>,
}

impl PromotionSummary {
    pub fn is_empty(&self) -> bool {
        self.species.is_empty() && self.reactions.is_empty()
    }
}

/// Arena of all species and reactions discovered so far.
/// Ids are indices into the arena and stay valid for the lifetime of the registry;
/// nothing is ever removed, and status only changes from edge to core.
#[derive(Debug, Clone, Default)]
pub struct Registry {
    species: Vec<Species>,
    reactions: Vec<Reaction>,
    species_by_key: HashMap<String, SpeciesId>,
    labels: HashSet<String>,
    // both orientations of reversible reactions are indexed
    reactions_by_direction: HashMap<(Vec<SpeciesId>, Vec<SpeciesId>), ReactionId>,
    iteration: usize,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// enlargement cycle stamped on newly created entities
    pub fn set_iteration(&mut self, iteration: usize) {
        self.iteration = iteration;
    }

    pub fn iteration(&self) -> usize {
        self.iteration
    }

    fn unique_label(&self, wanted: &str) -> String {
        if !self.labels.contains(wanted) {
            return wanted.to_string();
        }
        (2..)
            .map(|n| format!("{}({})", wanted, n))
            .find(|candidate| !self.labels.contains(candidate))
            .unwrap_or_else(|| format!("{}({})", wanted, self.species.len()))
    }

    /// Returns the registered species with the same canonical identity, or registers a new
    /// edge species. The flag is true when the species was created by this call.
    pub fn lookup_or_create(
        &mut self,
        structure: SpeciesStructure,
        label: Option<&str>,
    ) -> Result<(SpeciesId, bool), MechanismError> {
        structure.validate()?;
        let key = structure.canonical_key();
        if let Some(id) = self.species_by_key.get(&key) {
            return Ok((*id, false));
        }
        let id = SpeciesId(self.species.len());
        let wanted = label
            .map(|l| l.to_string())
            .unwrap_or_else(|| structure.default_label());
        let label = self.unique_label(&wanted);
        debug!("new species {} ({}) at iteration {}", label, key, self.iteration);
        self.labels.insert(label.clone());
        self.species_by_key.insert(key.clone(), id);
        self.species.push(Species {
            id,
            label,
            structure,
            key,
            thermo: None,
            status: ModelStatus::Edge,
            created_iteration: self.iteration,
            reactive: true,
        });
        Ok((id, true))
    }

    /// Registers a seed species directly in the core
    pub fn add_seed(
        &mut self,
        label: &str,
        structure: SpeciesStructure,
        reactive: bool,
        thermo: Option<NasaPolynomial>,
    ) -> Result<SpeciesId, MechanismError> {
        let (id, created) = self.lookup_or_create(structure, Some(label))?;
        if !created {
            return Err(MechanismError::Config(format!(
                "seed species {} duplicates the already registered {}",
                label,
                self.species[id.0].label
            )));
        }
        let species = &mut self.species[id.0];
        species.reactive = reactive;
        if thermo.is_some() {
            species.thermo = thermo;
        }
        self.promote(Entity::Species(id))?;
        info!("seed species {} registered as {}", label, id);
        Ok(id)
    }

    pub fn set_thermo(&mut self, id: SpeciesId, thermo: Option<NasaPolynomial>) -> Result<(), MechanismError> {
        let species = self
            .species
            .get_mut(id.0)
            .ok_or_else(|| MechanismError::RegistryConsistency(format!("unknown species {}", id)))?;
        species.thermo = thermo;
        Ok(())
    }

    fn check_species(&self, ids: &[SpeciesId]) -> Result<(), MechanismError> {
        match ids.iter().find(|id| id.0 >= self.species.len()) {
            Some(id) => Err(MechanismError::RegistryConsistency(format!(
                "reaction references unregistered species {}",
                id
            ))),
            None => Ok(()),
        }
    }

    fn all_core(&self, ids: impl IntoIterator<Item = SpeciesId>) -> bool {
        ids.into_iter().all(|id| self.species[id.0].is_core())
    }

    /// Reactions between molecular graphs must conserve every element
    fn check_atom_balance(
        &self,
        reactants: &[SpeciesId],
        products: &[SpeciesId],
        family: &str,
    ) -> Result<(), MechanismError> {
        let participants: Vec<&Species> = reactants
            .iter()
            .chain(products.iter())
            .map(|id| &self.species[id.0])
            .collect();
        if participants.iter().any(|s| s.structure.as_graph().is_none()) {
            return Ok(());
        }
        let compositions: Vec<BTreeMap<String, usize>> = participants
            .iter()
            .filter_map(|s| s.structure.element_counts())
            .collect();
        let (matrix, elements) = create_elem_composition_matrix(&compositions);
        for (j, element) in elements.iter().enumerate() {
            let net: f64 = (0..matrix.nrows())
                .map(|i| if i < reactants.len() { -matrix[(i, j)] } else { matrix[(i, j)] })
                .sum();
            if net != 0.0 {
                return Err(MechanismError::Structural(format!(
                    "reaction from family {} does not conserve {}",
                    family, element
                )));
            }
        }
        Ok(())
    }

    /// Returns the equivalent registered reaction or registers a new one. New reactions are core
    /// when all participants are core, edge otherwise. A duplicate proposed by another family
    /// in the same orientation refines the rate to the faster estimate.
    pub fn lookup_or_create_reaction(
        &mut self,
        reactants: &[SpeciesId],
        products: &[SpeciesId],
        rate: RateExpression,
        family: &str,
        degeneracy: u32,
        reversible: bool,
    ) -> Result<(ReactionId, bool), MechanismError> {
        if reactants.is_empty() || products.is_empty() {
            return Err(MechanismError::Structural(format!(
                "reaction from family {} has an empty side",
                family
            )));
        }
        if reactants.len() > 3 || products.len() > 3 {
            return Err(MechanismError::Structural(format!(
                "reaction from family {} has more than 3 species on one side",
                family
            )));
        }
        if degeneracy == 0 {
            return Err(MechanismError::Structural(format!(
                "reaction from family {} has zero degeneracy",
                family
            )));
        }
        self.check_species(reactants)?;
        self.check_species(products)?;
        let forward = direction_key(reactants, products);
        if forward.0 == forward.1 {
            return Err(MechanismError::Structural(format!(
                "reaction from family {} has identical reactants and products",
                family
            )));
        }
        self.check_atom_balance(reactants, products, family)?;
        if let Some(id) = self.reactions_by_direction.get(&forward).copied() {
            let new_k = degeneracy as f64 * rate.K_const(REFINEMENT_TEMPERATURE, ATM, None);
            let existing = &mut self.reactions[id.0];
            let same_orientation = existing.reactants == forward.0;
            if existing.family != family && !existing.alternative_families.iter().any(|f| f == family) {
                existing.alternative_families.push(family.to_string());
                if same_orientation {
                    let old_k = existing.forward_rate_constant(REFINEMENT_TEMPERATURE, ATM, None);
                    if new_k > old_k {
                        debug!("rate of {} refined by family {}", id, family);
                        existing.rate = rate;
                        existing.degeneracy = degeneracy;
                    }
                }
            }
            return Ok((id, false));
        }
        if reversible {
            let backward = (forward.1.clone(), forward.0.clone());
            if let Some(id) = self.reactions_by_direction.get(&backward).copied() {
                let existing = &mut self.reactions[id.0];
                if existing.family != family && !existing.alternative_families.iter().any(|f| f == family) {
                    existing.alternative_families.push(family.to_string());
                }
                return Ok((id, false));
            }
        }
        let id = ReactionId(self.reactions.len());
        let status = if self.all_core(forward.0.iter().chain(forward.1.iter()).copied()) {
            ModelStatus::Core
        } else {
            ModelStatus::Edge
        };
        if reversible {
            self.reactions_by_direction
                .insert((forward.1.clone(), forward.0.clone()), id);
        }
        self.reactions_by_direction.insert(forward.clone(), id);
        self.reactions.push(Reaction {
            id,
            reactants: forward.0,
            products: forward.1,
            rate,
            degeneracy,
            reversible,
            family: family.to_string(),
            alternative_families: Vec::new(),
            status,
            created_iteration: self.iteration,
        });
        Ok((id, true))
    }

    /// Moves an entity from edge to core. Promoting a core entity is a no-op (returns false).
    /// A reaction can only be promoted once all of its participants are core.
    pub fn promote(&mut self, entity: Entity) -> Result<bool, MechanismError> {
        match entity {
            Entity::Species(id) => {
                let species = self.species.get_mut(id.0).ok_or_else(|| {
                    MechanismError::RegistryConsistency(format!("cannot promote unknown species {}", id))
                })?;
                if species.is_core() {
                    return Ok(false);
                }
                species.status = ModelStatus::Core;
                Ok(true)
            }
            Entity::Reaction(id) => {
                let reaction = self.reactions.get(id.0).ok_or_else(|| {
                    MechanismError::RegistryConsistency(format!("cannot promote unknown reaction {}", id))
                })?;
                if reaction.is_core() {
                    return Ok(false);
                }
                if !self.all_core(reaction.participants()) {
                    return Err(MechanismError::RegistryConsistency(format!(
                        "cannot promote reaction {} before all of its species are core",
                        id
                    )));
                }
                self.reactions[id.0].status = ModelStatus::Core;
                Ok(true)
            }
        }
    }

    /// Promotes the given species and the edge species of the given reactions, then every edge
    /// reaction whose participants have all become core
    pub fn promote_with_closure(
        &mut self,
        species: &BTreeSet<SpeciesId>,
        reactions: &BTreeSet<ReactionId>,
    ) -> Result<PromotionSummary, MechanismError> {
        let mut summary = PromotionSummary::default();
        let mut to_promote: BTreeSet<SpeciesId> = species.clone();
        for id in reactions {
            let reaction = self.reaction(*id)?;
            to_promote.extend(reaction.participants());
        }
        for id in to_promote {
            if self.promote(Entity::Species(id))? {
                summary.species.push(id);
            }
        }
        let closing: Vec<ReactionId> = self
            .reactions
            .iter()
            .filter(|r| !r.is_core())
            .filter(|r| self.all_core(r.participants()))
            .map(|r| r.id)
            .collect();
        for id in closing {
            if self.promote(Entity::Reaction(id))? {
                summary.reactions.push(id);
            }
        }
        Ok(summary)
    }

    pub fn species(&self, id: SpeciesId) -> Result<&Species, MechanismError> {
        self.species
            .get(id.0)
            .ok_or_else(|| MechanismError::RegistryConsistency(format!("unknown species {}", id)))
    }

    pub fn reaction(&self, id: ReactionId) -> Result<&Reaction, MechanismError> {
        self.reactions
            .get(id.0)
            .ok_or_else(|| MechanismError::RegistryConsistency(format!("unknown reaction {}", id)))
    }

    pub fn find_by_label(&self, label: &str) -> Option<SpeciesId> {
        self.species.iter().find(|s| s.label == label).map(|s| s.id)
    }

    pub fn find_by_structure(&self, structure: &SpeciesStructure) -> Option<SpeciesId> {
        self.species_by_key.get(&structure.canonical_key()).copied()
    }

    pub fn label(&self, id: SpeciesId) -> String {
        self.species
            .get(id.0)
            .map(|s| s.label.clone())
            .unwrap_or_else(|| id.to_string())
    }

    pub fn all_species(&self) -> &[Species] {
        &self.species
    }

    pub fn all_reactions(&self) -> &[Reaction] {
        &self.reactions
    }

    pub fn core_species(&self) -> impl Iterator<Item = &Species> {
        self.species.iter().filter(|s| s.is_core())
    }

    pub fn edge_species(&self) -> impl Iterator<Item = &Species> {
        self.species.iter().filter(|s| !s.is_core())
    }

    pub fn core_reactions(&self) -> impl Iterator<Item = &Reaction> {
        self.reactions.iter().filter(|r| r.is_core())
    }

    pub fn edge_reactions(&self) -> impl Iterator<Item = &Reaction> {
        self.reactions.iter().filter(|r| !r.is_core())
    }

    pub fn core_species_count(&self) -> usize {
        self.core_species().count()
    }

    /// (core species, core reactions, edge species, edge reactions)
    pub fn sizes(&self) -> (usize, usize, usize, usize) {
        let core_species = self.core_species_count();
        let core_reactions = self.core_reactions().count();
        (
            core_species,
            core_reactions,
            self.species.len() - core_species,
            self.reactions.len() - core_reactions,
        )
    }

    /// Verifies the core/edge invariants of all reactions
    pub fn check_consistency(&self) -> Result<(), MechanismError> {
        for reaction in &self.reactions {
            self.check_species(&reaction.reactants)?;
            self.check_species(&reaction.products)?;
            let all_core = self.all_core(reaction.participants());
            if reaction.is_core() && !all_core {
                return Err(MechanismError::RegistryConsistency(format!(
                    "core reaction {} references an edge species",
                    reaction.id
                )));
            }
            if !reaction.is_core() && all_core {
                return Err(MechanismError::RegistryConsistency(format!(
                    "edge reaction {} has only core species",
                    reaction.id
                )));
            }
        }
        Ok(())
    }
}
