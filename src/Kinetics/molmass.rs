use nalgebra::DMatrix;
use regex::Regex;
use std::collections::{BTreeMap, BTreeSet};

/// Element data: symbol, atomic mass (g/mol) and the usual covalent valence used to validate
/// molecular graphs (`None` for elements that never appear in a covalent mechanism).
pub struct Element {
    name: &'static str,
    atomic_mass: f64,
    valence: Option<u8>,
}

const ELEMENTS: &[Element] = &[
    Element { name: "H", atomic_mass: 1.008, valence: Some(1) },
    Element { name: "He", atomic_mass: 4.0026, valence: Some(0) },
    Element { name: "Li", atomic_mass: 6.94, valence: Some(1) },
    Element { name: "Be", atomic_mass: 9.0122, valence: Some(2) },
    Element { name: "B", atomic_mass: 10.81, valence: Some(3) },
    Element { name: "C", atomic_mass: 12.011, valence: Some(4) },
    Element { name: "N", atomic_mass: 14.007, valence: Some(3) },
    Element { name: "O", atomic_mass: 15.999, valence: Some(2) },
    Element { name: "F", atomic_mass: 18.998, valence: Some(1) },
    Element { name: "Ne", atomic_mass: 20.18, valence: Some(0) },
    Element { name: "Na", atomic_mass: 22.99, valence: Some(1) },
    Element { name: "Mg", atomic_mass: 24.305, valence: Some(2) },
    Element { name: "Al", atomic_mass: 26.98, valence: Some(3) },
    Element { name: "Si", atomic_mass: 28.085, valence: Some(4) },
    Element { name: "P", atomic_mass: 30.974, valence: Some(3) },
    Element { name: "S", atomic_mass: 32.065, valence: Some(2) },
    Element { name: "Cl", atomic_mass: 35.453, valence: Some(1) },
    Element { name: "Ar", atomic_mass: 39.948, valence: Some(0) },
    Element { name: "K", atomic_mass: 39.098, valence: Some(1) },
    Element { name: "Ca", atomic_mass: 40.078, valence: Some(2) },
    Element { name: "Ti", atomic_mass: 47.867, valence: None },
    Element { name: "Cr", atomic_mass: 51.996, valence: None },
    Element { name: "Mn", atomic_mass: 54.938, valence: None },
    Element { name: "Fe", atomic_mass: 55.845, valence: None },
    Element { name: "Co", atomic_mass: 58.933, valence: None },
    Element { name: "Ni", atomic_mass: 58.693, valence: None },
    Element { name: "Cu", atomic_mass: 63.546, valence: None },
    Element { name: "Zn", atomic_mass: 65.38, valence: None },
    Element { name: "Br", atomic_mass: 79.904, valence: Some(1) },
    Element { name: "Kr", atomic_mass: 83.798, valence: Some(0) },
    Element { name: "I", atomic_mass: 126.904, valence: Some(1) },
    Element { name: "Xe", atomic_mass: 131.293, valence: Some(0) },
];

fn find_element(symbol: &str) -> Option<&'static Element> {
    ELEMENTS.iter().find(|e| e.name == symbol)
}

pub fn atomic_mass(symbol: &str) -> Option<f64> {
    find_element(symbol).map(|e| e.atomic_mass)
}

pub fn standard_valence(symbol: &str) -> Option<u8> {
    find_element(symbol).and_then(|e| e.valence)
}

// phase marks like "(g)" or "(cr)" are parsing artifacts of thermo libraries
fn filter_phases_marks(formula: &str) -> &str {
    for mark in ["(g)", "(l)", "(s)", "(c)", "(cr)", "(aq)"] {
        if let Some(stripped) = formula.strip_suffix(mark) {
            return stripped;
        }
    }
    formula
}

/// Parses a formula with nested brackets into element counts, e.g. `Na(NO3)2` -> {Na:1, N:2, O:6}
pub fn parse_formula(formula: &str) -> Result<BTreeMap<String, usize>, String> {
    let formula = filter_phases_marks(formula.trim());
    if formula.is_empty() {
        return Err("empty formula".to_string());
    }
    let token = Regex::new(r"([A-Z][a-z]?)(\d*)|(\()|\)(\d*)").map_err(|e| e.to_string())?;
    let mut stack: Vec<BTreeMap<String, usize>> = vec![BTreeMap::new()];
    let mut consumed = 0;
    for caps in token.captures_iter(formula) {
        let whole = caps.get(0).ok_or("regex produced an empty match")?;
        if whole.start() != consumed {
            return Err(format!(
                "unexpected symbol '{}' in formula {}",
                &formula[consumed..whole.start()],
                formula
            ));
        }
        consumed = whole.end();
        if let Some(symbol) = caps.get(1) {
            if find_element(symbol.as_str()).is_none() {
                return Err(format!("unknown element {} in formula {}", symbol.as_str(), formula));
            }
            let count = parse_count(caps.get(2).map_or("", |m| m.as_str()))?;
            let current = stack.last_mut().ok_or("unbalanced brackets")?;
            *current.entry(symbol.as_str().to_string()).or_insert(0) += count;
        } else if caps.get(3).is_some() {
            stack.push(BTreeMap::new());
        } else {
            let multiplier = parse_count(caps.get(4).map_or("", |m| m.as_str()))?;
            let group = stack.pop().ok_or("unbalanced brackets")?;
            let outer = stack
                .last_mut()
                .ok_or_else(|| format!("unbalanced ')' in formula {}", formula))?;
            for (element, count) in group {
                *outer.entry(element).or_insert(0) += count * multiplier;
            }
        }
    }
    if consumed != formula.len() {
        return Err(format!("unexpected tail '{}' in formula {}", &formula[consumed..], formula));
    }
    if stack.len() != 1 {
        return Err(format!("unbalanced '(' in formula {}", formula));
    }
    stack.pop().ok_or_else(|| "unbalanced brackets".to_string())
}

fn parse_count(digits: &str) -> Result<usize, String> {
    if digits.is_empty() {
        Ok(1)
    } else {
        digits.parse::<usize>().map_err(|e| e.to_string())
    }
}

/// Molar mass in g/mol of an element-count map; `None` if an element is unknown
pub fn molar_mass_of_composition(counts: &BTreeMap<String, usize>) -> Option<f64> {
    counts
        .iter()
        .map(|(element, count)| atomic_mass(element).map(|m| m * *count as f64))
        .sum()
}

// Function to calculate the molar mass of a substance given its chemical formula
pub fn calculate_molar_mass(formula: &str) -> Result<(f64, BTreeMap<String, usize>), String> {
    let counts = parse_formula(formula)?;
    let molar_mass = molar_mass_of_composition(&counts)
        .ok_or_else(|| format!("unknown element in formula {}", formula))?;
    Ok((molar_mass, counts))
}

/// Hill-order formula: C first, H second, the rest alphabetically; without carbon everything is alphabetical
pub fn hill_formula(counts: &BTreeMap<String, usize>) -> String {
    let mut formula = String::new();
    let mut push = |element: &str, count: usize| {
        if count == 0 {
            return;
        }
        formula.push_str(element);
        if count > 1 {
            formula.push_str(&count.to_string());
        }
    };
    let has_carbon = counts.get("C").copied().unwrap_or(0) > 0;
    if has_carbon {
        push("C", counts["C"]);
        push("H", counts.get("H").copied().unwrap_or(0));
    }
    for (element, count) in counts {
        if has_carbon && (element == "C" || element == "H") {
            continue;
        }
        push(element, *count);
    }
    formula
}

/// Matrix (substances x elements) of atom counts, plus the element order of its columns
pub fn create_elem_composition_matrix(
    compositions: &[BTreeMap<String, usize>],
) -> (DMatrix<f64>, Vec<String>) {
    let unique_elements: Vec<String> = compositions
        .iter()
        .flat_map(|c| c.keys().cloned())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();
    let mut matrix = DMatrix::zeros(compositions.len(), unique_elements.len());
    for (i, composition) in compositions.iter().enumerate() {
        for (j, element) in unique_elements.iter().enumerate() {
            if let Some(count) = composition.get(element) {
                matrix[(i, j)] += *count as f64;
            }
        }
    }
    (matrix, unique_elements)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn counts(pairs: &[(&str, usize)]) -> BTreeMap<String, usize> {
        pairs.iter().map(|(e, c)| (e.to_string(), *c)).collect()
    }

    #[test]
    fn test_parse_formula() {
        assert_eq!(parse_formula("C6H8O6").unwrap(), counts(&[("C", 6), ("H", 8), ("O", 6)]));
        assert_eq!(parse_formula("Na(NO3)2").unwrap(), counts(&[("Na", 1), ("N", 2), ("O", 6)]));
        assert_eq!(parse_formula("H2O").unwrap(), counts(&[("H", 2), ("O", 1)]));
        assert_eq!(parse_formula("C5H6OOH").unwrap(), counts(&[("C", 5), ("H", 7), ("O", 2)]));
        assert_eq!(parse_formula("C(CH3)4").unwrap(), counts(&[("C", 5), ("H", 12)]));
    }

    #[test]
    fn test_parse_formula_errors() {
        assert!(parse_formula("").is_err());
        assert!(parse_formula("Xx2").is_err());
        assert!(parse_formula("Na(NO3").is_err());
        assert!(parse_formula("NO3)2").is_err());
        assert!(parse_formula("CH4+").is_err());
    }

    #[test]
    fn test_calculate_molar_mass() {
        let (molar_mass, _) = calculate_molar_mass("H2O(g)").unwrap();
        assert!((molar_mass - 18.01528).abs() < 1e-2);
        let (molar_mass, _) = calculate_molar_mass("NaCl").unwrap();
        assert!((molar_mass - 58.44).abs() < 1e-2);
        let (molar_mass, _) = calculate_molar_mass("C6H8O6").unwrap();
        assert!((molar_mass - 176.12).abs() < 1e-2);
        let (molar_mass, _) = calculate_molar_mass("Ca(NO3)2").unwrap();
        assert!((molar_mass - 164.093).abs() < 1e-2);
    }

    #[test]
    fn test_hill_formula() {
        assert_eq!(hill_formula(&counts(&[("H", 6), ("C", 2), ("O", 1)])), "C2H6O");
        assert_eq!(hill_formula(&counts(&[("H", 2), ("O", 1)])), "H2O");
        assert_eq!(hill_formula(&counts(&[("C", 1), ("H", 3)])), "CH3");
        assert_eq!(hill_formula(&counts(&[("H", 1)])), "H");
    }

    #[test]
    fn test_element_matrix() {
        let compositions: Vec<_> = ["H2O", "NaCl", "C3H8", "CH4"]
            .iter()
            .map(|f| parse_formula(f).unwrap())
            .collect();
        let (matrix, elements) = create_elem_composition_matrix(&compositions);
        assert_eq!(matrix.nrows(), 4);
        assert_eq!(matrix.ncols(), 5);
        assert_eq!(elements, vec!["C", "Cl", "H", "Na", "O"]);
        assert_eq!(matrix[(2, 0)], 3.0);
        assert_eq!(matrix[(2, 2)], 8.0);
    }

    #[test]
    fn test_valence_table() {
        assert_eq!(standard_valence("C"), Some(4));
        assert_eq!(standard_valence("O"), Some(2));
        assert_eq!(standard_valence("Fe"), None);
        assert_eq!(standard_valence("Zz"), None);
    }
}
