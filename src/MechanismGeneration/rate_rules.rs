use crate::MechanismGeneration::errors::MechanismError;
use crate::MechanismGeneration::families::{ReactantQuery, ReactionFamily, ReactionFamilyRule};
use crate::MechanismGeneration::reaction::ReactionSkeleton;
use crate::MechanismGeneration::species::{Species, SpeciesStructure};
use crate::Thermodynamics::nasa_poly::NasaPolynomial;
use crate::Thermodynamics::thermo_estimation::ThermoEstimator;
use log::info;
use std::collections::{BTreeMap, BTreeSet};

/// Read-only collaborator answering "which reactions can these species undergo" and
/// "what is the thermochemistry of this species". Built once and shared by the generator.
#[derive(Debug, Clone)]
pub struct RateRuleDatabase {
    families: Vec<ReactionFamily>,
    thermo: ThermoEstimator,
}

impl RateRuleDatabase {
    pub fn new(
        mut families: Vec<ReactionFamily>,
        dictionary: &BTreeMap<String, SpeciesStructure>,
        thermo_library: BTreeMap<String, NasaPolynomial>,
    ) -> Result<Self, MechanismError> {
        let mut names = BTreeSet::new();
        for family in families.iter_mut() {
            family.validate()?;
            if !names.insert(family.family_name().to_string()) {
                return Err(MechanismError::Config(format!(
                    "reaction family {} is defined twice",
                    family.family_name()
                )));
            }
            if let ReactionFamily::Library(library) = family {
                library.compile(dictionary);
            }
        }
        for (label, poly) in &thermo_library {
            poly.validate()
                .map_err(|e| MechanismError::Thermo(format!("thermo library entry {}: {}", label, e)))?;
        }
        info!(
            "rate-rule database: {} families ({}), {} thermo entries",
            families.len(),
            names.into_iter().collect::<Vec<_>>().join(", "),
            thermo_library.len()
        );
        Ok(Self {
            families,
            thermo: ThermoEstimator::new(thermo_library, dictionary),
        })
    }

    pub fn families(&self) -> &[ReactionFamily] {
        &self.families
    }

    /// Lazily walks the families in declaration order; each family is only asked
    /// when the iterator reaches it
    pub fn react<'a>(
        &'a self,
        query: ReactantQuery<'a>,
    ) -> impl Iterator<Item = Result<ReactionSkeleton, MechanismError>> + 'a {
        self.families.iter().flat_map(move |family| {
            let results: Vec<Result<ReactionSkeleton, MechanismError>> = match family.match_templates(query) {
                Ok(skeletons) => skeletons.into_iter().map(Ok).collect(),
                Err(e) => vec![Err(e)],
            };
            results
        })
    }

    /// every skeleton of every family for the query
    pub fn match_templates(&self, query: ReactantQuery<'_>) -> Result<Vec<ReactionSkeleton>, MechanismError> {
        self.react(query).collect()
    }

    pub fn estimate_thermo(&self, species: &Species) -> Option<NasaPolynomial> {
        if species.thermo.is_some() {
            return species.thermo.clone();
        }
        self.thermo.estimate_thermo(&species.label, &species.structure)
    }

    /// thermo of a structure that is not registered yet
    pub fn estimate_thermo_for(&self, label: &str, structure: &SpeciesStructure) -> Option<NasaPolynomial> {
        self.thermo.estimate_thermo(label, structure)
    }
}
