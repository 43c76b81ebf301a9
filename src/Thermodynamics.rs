/// NASA 7-coefficient polynomials: heat capacity, enthalpy, entropy, Gibbs energy
/// and the concentration equilibrium constant used for reverse rates.
///
///  # Examples
/// ```
/// use KiMech::Thermodynamics::nasa_poly::{NasaPolynomial, reaction_Kc};
/// let a = NasaPolynomial::constant_cp(0.0, 200.0, 30.0);
/// let b = NasaPolynomial::constant_cp(-10.0e3, 200.0, 30.0);
/// let kc = reaction_Kc(&[&a], &[&b], 1000.0);
/// assert!(kc > 1.0);
/// ```
pub mod nasa_poly;
/// Thermochemistry for species found during mechanism generation: seed data,
/// a user thermo library, or a bond/atom additivity estimate.
pub mod thermo_estimation;
