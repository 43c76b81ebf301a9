use crate::Kinetics::rate_constants::R;
use serde::{Deserialize, Serialize};

/// Standard-state pressure of the thermo data, Pa
pub const P_STANDARD: f64 = 1.0e5;
const T_REF: f64 = 298.15;

fn Cp(t: f64, a: &[f64; 7]) -> f64 {
    R * (a[0] + a[1] * t + a[2] * t.powi(2) + a[3] * t.powi(3) + a[4] * t.powi(4))
}
fn dh(t: f64, a: &[f64; 7]) -> f64 {
    R * t
        * (a[0]
            + a[1] * t / 2.0
            + a[2] * t.powi(2) / 3.0
            + a[3] * t.powi(3) / 4.0
            + a[4] * t.powi(4) / 5.0
            + a[5] / t)
}
fn ds(t: f64, a: &[f64; 7]) -> f64 {
    R * (a[0] * t.ln()
        + a[1] * t
        + a[2] * t.powi(2) / 2.0
        + a[3] * t.powi(3) / 3.0
        + a[4] * t.powi(4) / 4.0
        + a[6])
}

/// Two-range NASA 7-coefficient polynomial. `temperature_range` is [T_min, T_mid, T_max];
/// `low` applies below T_mid and `high` above it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NasaPolynomial {
    pub temperature_range: [f64; 3],
    pub low: [f64; 7],
    pub high: [f64; 7],
}

impl NasaPolynomial {
    /// Constant heat capacity polynomial reproducing H and S at 298.15 K.
    /// `H298` in J/mol, `S298` and `Cp` in J/(mol K).
    pub fn constant_cp(H298: f64, S298: f64, Cp: f64) -> Self {
        let a1 = Cp / R;
        let a6 = (H298 - Cp * T_REF) / R;
        let a7 = S298 / R - a1 * T_REF.ln();
        let coeffs = [a1, 0.0, 0.0, 0.0, 0.0, a6, a7];
        Self {
            temperature_range: [200.0, 1000.0, 6000.0],
            low: coeffs,
            high: coeffs,
        }
    }

    // outside the valid range the nearest polynomial is extrapolated
    fn coeffs(&self, T: f64) -> &[f64; 7] {
        if T < self.temperature_range[1] { &self.low } else { &self.high }
    }

    pub fn in_range(&self, T: f64) -> bool {
        T >= self.temperature_range[0] && T <= self.temperature_range[2]
    }

    /// heat capacity, J/(mol K)
    pub fn Cp(&self, T: f64) -> f64 {
        Cp(T, self.coeffs(T))
    }
    /// enthalpy, J/mol
    pub fn dh(&self, T: f64) -> f64 {
        dh(T, self.coeffs(T))
    }
    /// entropy at standard pressure, J/(mol K)
    pub fn ds(&self, T: f64) -> f64 {
        ds(T, self.coeffs(T))
    }
    /// Gibbs energy, J/mol
    pub fn dg(&self, T: f64) -> f64 {
        self.dh(T) - T * self.ds(T)
    }

    pub fn validate(&self) -> Result<(), String> {
        let [t_min, t_mid, t_max] = self.temperature_range;
        if !(t_min > 0.0 && t_min <= t_mid && t_mid <= t_max) {
            return Err(format!(
                "invalid NASA temperature range [{}, {}, {}]",
                t_min, t_mid, t_max
            ));
        }
        if self.low.iter().chain(self.high.iter()).any(|a| !a.is_finite()) {
            return Err("NASA coefficients must be finite".to_string());
        }
        Ok(())
    }
}

/// Concentration-based equilibrium constant Kc = exp(-dG/RT) * (P0/RT)^dn,
/// with dG in J/mol and Kc in (mol/m3)^dn
pub fn Kc(dG: f64, dn: i32, T: f64) -> f64 {
    f64::exp(-dG / (R * T)) * (P_STANDARD / (R * T)).powi(dn)
}

/// Kc of reactants -> products from the species polynomials (each entry is one molecule)
pub fn reaction_Kc(reactants: &[&NasaPolynomial], products: &[&NasaPolynomial], T: f64) -> f64 {
    let g_products: f64 = products.iter().map(|p| p.dg(T)).sum();
    let g_reactants: f64 = reactants.iter().map(|p| p.dg(T)).sum();
    let dn = products.len() as i32 - reactants.len() as i32;
    Kc(g_products - g_reactants, dn, T)
}
