use crate::Kinetics::rate_constants::RateExpression;
use crate::MechanismGeneration::species::{ModelStatus, SpeciesId, SpeciesStructure};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ReactionId(pub usize);

impl fmt::Display for ReactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "R{}", self.0)
    }
}

/// A product (or reactant) as proposed by a reaction family, before it is registered
#[derive(Debug, Clone, PartialEq)]
pub struct ProposedSpecies {
    pub structure: SpeciesStructure,
    /// preferred name, e.g. the label used in a reaction library
    pub label: Option<String>,
}

impl ProposedSpecies {
    pub fn new(structure: SpeciesStructure, label: Option<String>) -> Self {
        Self { structure, label }
    }
}

/// Reaction proposed by a family for a set of reactants; not yet part of the registry.
/// `rate` is the per-site estimate, the effective rate is `rate * degeneracy`.
#[derive(Debug, Clone)]
pub struct ReactionSkeleton {
    pub reactants: Vec<ProposedSpecies>,
    pub products: Vec<ProposedSpecies>,
    pub rate: RateExpression,
    pub family: String,
    pub degeneracy: u32,
    pub reversible: bool,
}

#[derive(Debug, Clone)]
pub struct Reaction {
    pub id: ReactionId,
    /// sorted multiset of reactant ids
    pub reactants: Vec<SpeciesId>,
    /// sorted multiset of product ids
    pub products: Vec<SpeciesId>,
    pub rate: RateExpression,
    pub degeneracy: u32,
    pub reversible: bool,
    pub family: String,
    /// other families that proposed the same reaction
    pub alternative_families: Vec<String>,
    pub status: ModelStatus,
    pub created_iteration: usize,
}

impl Reaction {
    pub fn is_core(&self) -> bool {
        self.status == ModelStatus::Core
    }

    /// reactants followed by products, with repetitions
    pub fn participants(&self) -> impl Iterator<Item = SpeciesId> + '_ {
        self.reactants.iter().chain(self.products.iter()).copied()
    }

    /// rate expression with the reaction-path degeneracy folded in
    pub fn effective_rate(&self) -> RateExpression {
        if self.degeneracy == 1 {
            self.rate.clone()
        } else {
            self.rate.scaled(self.degeneracy as f64)
        }
    }

    /// forward rate constant, SI units
    pub fn forward_rate_constant(&self, T: f64, P: f64, M: Option<f64>) -> f64 {
        self.degeneracy as f64 * self.rate.K_const(T, P, M)
    }

    /// net stoichiometric coefficients (products positive)
    pub fn stoichiometry(&self) -> BTreeMap<SpeciesId, i32> {
        let mut nu = BTreeMap::new();
        for r in &self.reactants {
            *nu.entry(*r).or_insert(0) -= 1;
        }
        for p in &self.products {
            *nu.entry(*p).or_insert(0) += 1;
        }
        nu
    }

    /// equation with species labels, e.g. "CH4 => CH3 + H" or "A + B <=> C"
    pub fn equation(&self, label: impl Fn(SpeciesId) -> String) -> String {
        let side = |ids: &[SpeciesId]| ids.iter().map(|id| label(*id)).collect::<Vec<_>>().join(" + ");
        let arrow = if self.reversible { "<=>" } else { "=>" };
        format!("{} {} {}", side(&self.reactants), arrow, side(&self.products))
    }
}

/// order-independent identity of one direction of a reaction
pub(crate) fn direction_key(reactants: &[SpeciesId], products: &[SpeciesId]) -> (Vec<SpeciesId>, Vec<SpeciesId>) {
    let mut r = reactants.to_vec();
    let mut p = products.to_vec();
    r.sort_unstable();
    p.sort_unstable();
    (r, p)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn sample() -> Reaction {
        Reaction {
            id: ReactionId(0),
            reactants: vec![SpeciesId(0), SpeciesId(0)],
            products: vec![SpeciesId(1)],
            rate: RateExpression::arrhenius(1.0e6, 0.0, 0.0),
            degeneracy: 2,
            reversible: false,
            family: "R_Recombination".to_string(),
            alternative_families: vec![],
            status: ModelStatus::Edge,
            created_iteration: 1,
        }
    }

    #[test]
    fn test_stoichiometry_and_equation() {
        let reaction = sample();
        let nu = reaction.stoichiometry();
        assert_eq!(nu[&SpeciesId(0)], -2);
        assert_eq!(nu[&SpeciesId(1)], 1);
        let equation = reaction.equation(|id| format!("X{}", id.0));
        assert_eq!(equation, "X0 + X0 => X1");
    }

    #[test]
    fn test_degeneracy_scales_rate() {
        let reaction = sample();
        assert_relative_eq!(reaction.forward_rate_constant(1000.0, 1e5, None), 2.0e6);
        assert_relative_eq!(reaction.effective_rate().K_const(1000.0, 1e5, None), 2.0e6);
    }

    #[test]
    fn test_direction_key_ignores_order() {
        let a = direction_key(&[SpeciesId(2), SpeciesId(1)], &[SpeciesId(3)]);
        let b = direction_key(&[SpeciesId(1), SpeciesId(2)], &[SpeciesId(3)]);
        assert_eq!(a, b);
    }
}
