use crate::MechanismGeneration::errors::MechanismError;
use crate::MechanismGeneration::families::ReactantQuery;
use crate::MechanismGeneration::rate_rules::RateRuleDatabase;
use crate::MechanismGeneration::reaction::{ProposedSpecies, ReactionSkeleton};
use crate::MechanismGeneration::registry::Registry;
use crate::MechanismGeneration::species::SpeciesId;
use log::{debug, info};
use std::collections::{HashSet, VecDeque};

/// Unit of work of the generator: one species, or an unordered pair (smaller id first)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum GenerationTask {
    Unimolecular(SpeciesId),
    Bimolecular(SpeciesId, SpeciesId),
}

impl GenerationTask {
    pub fn pair(a: SpeciesId, b: SpeciesId) -> Self {
        if a <= b {
            GenerationTask::Bimolecular(a, b)
        } else {
            GenerationTask::Bimolecular(b, a)
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct GenerationReport {
    pub new_species: Vec<SpeciesId>,
    pub new_reactions: usize,
    pub tasks_processed: usize,
}

/// Network Generator: reacts core species (and optionally core-edge pairs) through the
/// rate-rule database and registers what it finds. Tasks already processed in earlier
/// iterations are remembered and never repeated.
#[derive(Debug, Clone, Default)]
pub struct NetworkGenerator {
    explored: HashSet<GenerationTask>,
    react_core_with_edge: bool,
}

impl NetworkGenerator {
    pub fn new(react_core_with_edge: bool) -> Self {
        Self {
            explored: HashSet::new(),
            react_core_with_edge,
        }
    }

    pub fn explored_count(&self) -> usize {
        self.explored.len()
    }

    /// Breadth-first queue of the tasks not yet explored, in deterministic order
    pub fn pending_tasks(&self, registry: &Registry) -> VecDeque<GenerationTask> {
        let core: Vec<SpeciesId> = registry
            .core_species()
            .filter(|s| s.reactive)
            .map(|s| s.id)
            .collect();
        let mut queue = VecDeque::new();
        let mut push = |task: GenerationTask| {
            if !self.explored.contains(&task) {
                queue.push_back(task);
            }
        };
        for id in &core {
            push(GenerationTask::Unimolecular(*id));
        }
        for (i, a) in core.iter().enumerate() {
            for b in &core[i..] {
                push(GenerationTask::pair(*a, *b));
            }
        }
        if self.react_core_with_edge {
            let edge: Vec<SpeciesId> = registry
                .edge_species()
                .filter(|s| s.reactive)
                .map(|s| s.id)
                .collect();
            for a in &core {
                for b in &edge {
                    push(GenerationTask::pair(*a, *b));
                }
            }
        }
        queue
    }

    /// One generation pass over the current core
    pub fn generate(
        &mut self,
        registry: &mut Registry,
        database: &RateRuleDatabase,
    ) -> Result<GenerationReport, MechanismError> {
        let mut queue = self.pending_tasks(registry);
        let mut report = GenerationReport::default();
        info!("generating: {} new tasks", queue.len());
        while let Some(task) = queue.pop_front() {
            let skeletons = {
                let query = match task {
                    GenerationTask::Unimolecular(id) => ReactantQuery::Single(registry.species(id)?),
                    GenerationTask::Bimolecular(a, b) => {
                        ReactantQuery::Pair(registry.species(a)?, registry.species(b)?)
                    }
                };
                database.match_templates(query)?
            };
            for skeleton in skeletons {
                self.register(registry, database, skeleton, &mut report)?;
            }
            self.explored.insert(task);
            report.tasks_processed += 1;
        }
        info!(
            "generation done: {} tasks, {} new species, {} new reactions",
            report.tasks_processed,
            report.new_species.len(),
            report.new_reactions
        );
        Ok(report)
    }

    fn register_species(
        registry: &mut Registry,
        database: &RateRuleDatabase,
        proposed: ProposedSpecies,
        report: &mut GenerationReport,
    ) -> Result<SpeciesId, MechanismError> {
        let (id, created) = registry.lookup_or_create(proposed.structure, proposed.label.as_deref())?;
        if created {
            let species = registry.species(id)?;
            let thermo = database.estimate_thermo(species);
            registry.set_thermo(id, thermo)?;
            report.new_species.push(id);
        }
        Ok(id)
    }

    fn register(
        &mut self,
        registry: &mut Registry,
        database: &RateRuleDatabase,
        skeleton: ReactionSkeleton,
        report: &mut GenerationReport,
    ) -> Result<(), MechanismError> {
        let mut reactants = Vec::with_capacity(skeleton.reactants.len());
        for proposed in skeleton.reactants {
            reactants.push(Self::register_species(registry, database, proposed, report)?);
        }
        let mut products = Vec::with_capacity(skeleton.products.len());
        for proposed in skeleton.products {
            products.push(Self::register_species(registry, database, proposed, report)?);
        }
        let (id, created) = registry.lookup_or_create_reaction(
            &reactants,
            &products,
            skeleton.rate,
            &skeleton.family,
            skeleton.degeneracy,
            skeleton.reversible,
        )?;
        if created {
            debug!(
                "new reaction {}: {} [{}]",
                id,
                registry.reaction(id)?.equation(|s| registry.label(s)),
                skeleton.family
            );
            report.new_reactions += 1;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Kinetics::rate_constants::RateExpression;
    use crate::MechanismGeneration::families::{LibraryEntry, LibraryFamily, ReactionFamily};
    use crate::MechanismGeneration::registry::Entity;
    use crate::MechanismGeneration::species::SpeciesStructure;
    use std::collections::BTreeMap;

    fn database(entries: &[(&[&str], &[&str])]) -> RateRuleDatabase {
        let reactions = entries
            .iter()
            .map(|(r, p)| LibraryEntry {
                reactants: r.iter().map(|s| s.to_string()).collect(),
                products: p.iter().map(|s| s.to_string()).collect(),
                rate: RateExpression::arrhenius(1.0, 0.0, 0.0),
                reversible: false,
            })
            .collect();
        let family = ReactionFamily::Library(LibraryFamily::new("lib", reactions));
        RateRuleDatabase::new(vec![family], &BTreeMap::new(), BTreeMap::new()).unwrap()
    }

    fn seed(registry: &mut Registry, label: &str, reactive: bool) -> SpeciesId {
        registry
            .add_seed(label, SpeciesStructure::Label(label.to_string()), reactive, None)
            .unwrap()
    }

    #[test]
    fn test_pending_tasks_cover_core_singles_and_pairs() {
        let mut registry = Registry::new();
        let a = seed(&mut registry, "A", true);
        let b = seed(&mut registry, "B", true);
        seed(&mut registry, "N2", false);
        let generator = NetworkGenerator::new(false);
        let tasks: Vec<GenerationTask> = generator.pending_tasks(&registry).into_iter().collect();
        assert_eq!(
            tasks,
            vec![
                GenerationTask::Unimolecular(a),
                GenerationTask::Unimolecular(b),
                GenerationTask::Bimolecular(a, a),
                GenerationTask::Bimolecular(a, b),
                GenerationTask::Bimolecular(b, b),
            ]
        );
        assert_eq!(GenerationTask::pair(b, a), GenerationTask::pair(a, b));
    }

    #[test]
    fn test_generation_registers_edge_once() {
        let mut registry = Registry::new();
        seed(&mut registry, "A", true);
        registry.set_iteration(1);
        let database = database(&[(&["A"], &["B", "C"]), (&["A", "A"], &["D"])]);
        let mut generator = NetworkGenerator::new(false);

        let report = generator.generate(&mut registry, &database).unwrap();
        assert_eq!(report.tasks_processed, 2);
        assert_eq!(report.new_species.len(), 3);
        assert_eq!(report.new_reactions, 2);
        assert_eq!(registry.sizes(), (1, 0, 3, 2));
        assert!(registry.edge_species().all(|s| s.created_iteration == 1));

        // nothing new to explore
        let report = generator.generate(&mut registry, &database).unwrap();
        assert_eq!(report, GenerationReport::default());
        assert_eq!(generator.explored_count(), 2);
        assert_eq!(registry.all_reactions().len(), 2);
    }

    #[test]
    fn test_new_core_species_only_adds_new_tasks() {
        let mut registry = Registry::new();
        seed(&mut registry, "A", true);
        let database = database(&[(&["A"], &["B"]), (&["A", "B"], &["C"])]);
        let mut generator = NetworkGenerator::new(false);
        generator.generate(&mut registry, &database).unwrap();
        let b = registry.find_by_label("B").unwrap();
        assert!(registry.find_by_label("C").is_none());

        registry.promote(Entity::Species(b)).unwrap();
        let report = generator.generate(&mut registry, &database).unwrap();
        // U(B), (A,B) and (B,B)
        assert_eq!(report.tasks_processed, 3);
        assert!(registry.find_by_label("C").is_some());
    }

    #[test]
    fn test_core_with_edge_pairs() {
        for react_core_with_edge in [false, true] {
            let mut registry = Registry::new();
            seed(&mut registry, "A", true);
            let mut generator = NetworkGenerator::new(react_core_with_edge);
            let database = database(&[(&["A"], &["B"]), (&["A", "B"], &["E"])]);
            generator.generate(&mut registry, &database).unwrap();
            generator.generate(&mut registry, &database).unwrap();
            assert_eq!(registry.find_by_label("E").is_some(), react_core_with_edge);
        }
    }
}
