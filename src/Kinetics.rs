/// Rate-constant expressions attached to reactions and rate rules.
///
/// Four forms are supported, distinguished by the `"type"` tag in JSON:
/// simple Arrhenius (`"elem"`), pressure-dependent PLOG tables (`"pres"`),
/// third-body reactions (`"three-body"`) and Lindemann/Troe fall-off (`"falloff"`).
/// Every form can be evaluated numerically (`K_const`) or as a symbolic expression
/// of temperature (`K_sym`), which is used for printing rate tables.
///
///  # Examples
/// ```
/// use KiMech::Kinetics::rate_constants::{ElementaryStruct, RateExpression};
/// let k = RateExpression::Elementary(ElementaryStruct::new(vec![1e13, 0.0, 2.0e5]));
/// let k_1000 = k.K_const(1000.0, 101325.0, None);
/// assert!(k_1000 > 0.0);
/// ```
pub mod rate_constants;

/// Module to calculate the atomic composition and molar mass of a chemical formula
///
///  # Examples
/// ```
/// use KiMech::Kinetics::molmass::calculate_molar_mass;
/// let formula = "C6H8O6";
/// let (molar_mass, element_composition) = calculate_molar_mass(formula).unwrap();
/// println!("Element counts: {:?}", element_composition);
/// println!("Molar mass: {:?} g/mol", molar_mass);
/// use KiMech::Kinetics::molmass::parse_formula;
/// let atomic_composition = parse_formula("Na(NO3)2").unwrap();
/// println!("{:?}", atomic_composition);
/// ```
pub mod molmass;
