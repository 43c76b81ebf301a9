use RustedSciThe::symbolic::symbolic_engine::Expr;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::f64;

/// Universal gas constant, J/(mol K)
pub const R: f64 = 8.314462618;
const Rsym: Expr = Expr::Const(8.314462618);
/// 1 atm in Pa; PLOG tables are keyed by pressure in atm
pub const ATM: f64 = 101325.0;

// A*T^n*exp(-E/(R*T)), parameters stored as [A, n, E]
fn arrhenius(params: &[f64], Temp: f64) -> f64 {
    match params {
        [A, n, E, ..] => A * Temp.powf(*n) * f64::exp(-E / (Temp * R)),
        _ => f64::NAN,
    }
}

fn arrhenius_sym(params: &[f64], T: Expr) -> Expr {
    match params {
        [A, n, E, ..] => {
            let k0 = Expr::Const(*A) * T.clone().pow(Expr::Const(*n));
            k0 * (-Expr::Const(*E) / (Rsym * T)).exp()
        }
        _ => Expr::Const(f64::NAN),
    }
}

fn check_arrhenius(params: &[f64], what: &str) -> Result<(), String> {
    if params.len() != 3 {
        return Err(format!("{} must have 3 parameters [A, n, E], got {}", what, params.len()));
    }
    if params.iter().any(|p| !p.is_finite()) {
        return Err(format!("{} contains non-finite parameters", what));
    }
    if params[0] < 0.0 {
        return Err(format!("{} has negative pre-exponential factor", what));
    }
    Ok(())
}

/////////////////////////ELEMENTARY KINETICS///////////////////////////////////////////////////////////////
// simplest form of kinetic constant - Arrhenius form  A*Temp.powf(n)*exp(-E/(Temp*R))
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct ElementaryStruct {
    pub Arrenius: Vec<f64>,
}

impl ElementaryStruct {
    pub fn new(Arrenius: Vec<f64>) -> Self {
        Self { Arrenius }
    }
    pub fn K_const(&self, Temp: f64) -> f64 {
        arrhenius(&self.Arrenius, Temp)
    }
    pub fn K_expr(&self, T: Expr) -> Expr {
        arrhenius_sym(&self.Arrenius, T)
    }
}

/////////////////////////FALLOFF KINETICS///////////////////////////////////////////////////////////////
// Lindemann form, or Troe form when `troe` holds [a, T3, T1] or [a, T3, T1, T2]
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct FalloffStruct {
    pub low_rate: Vec<f64>,
    pub high_rate: Vec<f64>,
    #[serde(default)]
    pub eff: BTreeMap<String, f64>,
    #[serde(default)]
    pub troe: Option<Vec<f64>>,
}

impl FalloffStruct {
    pub fn new(
        low_rate: Vec<f64>,
        high_rate: Vec<f64>,
        eff: BTreeMap<String, f64>,
        troe: Option<Vec<f64>>,
    ) -> Self {
        Self {
            low_rate,
            high_rate,
            eff,
            troe,
        }
    }

    fn F_cent(&self, Temp: f64) -> Option<f64> {
        match self.troe.as_deref() {
            Some([a, T_3, T_1]) => Some((1.0 - a) * f64::exp(-Temp / T_3) + a * f64::exp(-Temp / T_1)),
            Some([a, T_3, T_1, T_2]) => Some(
                (1.0 - a) * f64::exp(-Temp / T_3) + a * f64::exp(-Temp / T_1) + f64::exp(-T_2 / Temp),
            ),
            _ => None,
        }
    }

    /// `M` is the efficiency-weighted third-body concentration, mol/m3
    pub fn K_const(&self, Temp: f64, M: f64) -> f64 {
        let K0 = arrhenius(&self.low_rate, Temp);
        let K_inf = arrhenius(&self.high_rate, Temp);
        if K_inf == 0.0 {
            return 0.0;
        }
        let P_r = K0 * M / K_inf;
        if P_r <= 0.0 {
            return 0.0;
        }
        let lindemann = K_inf * (P_r / (1.0 + P_r));
        match self.F_cent(Temp) {
            Some(F_c) => {
                let log_Fc = F_c.log10();
                let C = -0.4 - 0.67 * log_Fc;
                let N = 0.75 - 1.27 * log_Fc;
                let f_1 = (P_r.log10() + C) / (N - 0.14 * (P_r.log10() + C));
                let F = 10.0_f64.powf(log_Fc / (1.0 + f_1 * f_1));
                lindemann * F
            }
            None => lindemann,
        }
    }

    pub fn K_expr(&self, Temp: Expr, M: Expr) -> Expr {
        let K0 = arrhenius_sym(&self.low_rate, Temp.clone());
        let K_inf = arrhenius_sym(&self.high_rate, Temp.clone());
        let P_r = K0 * M / K_inf.clone();
        let lindemann = K_inf * (P_r.clone() / (Expr::Const(1.0) + P_r.clone()));
        let F_c = match self.troe.as_deref() {
            Some([a, T_3, T_1]) => Some(
                Expr::Const(1.0 - a) * (-Temp.clone() / Expr::Const(*T_3)).exp()
                    + Expr::Const(*a) * (-Temp.clone() / Expr::Const(*T_1)).exp(),
            ),
            Some([a, T_3, T_1, T_2]) => Some(
                Expr::Const(1.0 - a) * (-Temp.clone() / Expr::Const(*T_3)).exp()
                    + Expr::Const(*a) * (-Temp.clone() / Expr::Const(*T_1)).exp()
                    + (-Expr::Const(*T_2) / Temp.clone()).exp(),
            ),
            _ => None,
        };
        match F_c {
            Some(F_c) => {
                let C = Expr::Const(-0.4) - Expr::Const(0.67) * F_c.clone().log10();
                let N = Expr::Const(0.75) - Expr::Const(1.27) * F_c.clone().log10();
                let f_1 = (P_r.clone().log10() + C.clone())
                    / (N - Expr::Const(0.14) * (P_r.log10() + C));
                let F = Expr::Const(10.0)
                    .pow(F_c.log10() / (Expr::Const(1.0) + f_1.pow(Expr::Const(2.0))));
                (lindemann * F).symplify()
            }
            None => lindemann.symplify(),
        }
    }
}

/////////////////////////////THREE-BODY KINETICS////////////////////////////////
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct ThreeBodyStruct {
    pub Arrenius: Vec<f64>,
    #[serde(default)]
    pub eff: BTreeMap<String, f64>,
}

impl ThreeBodyStruct {
    pub fn new(Arrenius: Vec<f64>, eff: BTreeMap<String, f64>) -> Self {
        Self { Arrenius, eff }
    }
    pub fn K_const(&self, Temp: f64, M: f64) -> f64 {
        M * arrhenius(&self.Arrenius, Temp)
    }
    pub fn K_expr(&self, Temp: Expr, M: Expr) -> Expr {
        (M * arrhenius_sym(&self.Arrenius, Temp)).symplify()
    }
}

/////////////////////////PRESSURE DEPENDENT KINETICS///////////////////////////////////////////////////////////////
// PLOG: Arrhenius parameters tabulated at several pressures (keys in atm),
// ln k is interpolated linearly in ln P and clamped outside the table
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct PressureStruct {
    pub Arrenius: BTreeMap<String, Vec<f64>>,
}

impl PressureStruct {
    pub fn new(Arrenius: BTreeMap<String, Vec<f64>>) -> Self {
        Self { Arrenius }
    }

    // (pressure in Pa, parameters), sorted by pressure; unparsable keys are skipped
    fn table(&self) -> Vec<(f64, &Vec<f64>)> {
        let mut table: Vec<(f64, &Vec<f64>)> = self
            .Arrenius
            .iter()
            .filter_map(|(p, params)| p.trim().parse::<f64>().ok().map(|p| (p * ATM, params)))
            .collect();
        table.sort_by(|a, b| a.0.total_cmp(&b.0));
        table
    }

    // bracketing entries and the ln-P interpolation weight of the upper one
    fn bracket(&self, P: f64) -> Option<(&Vec<f64>, &Vec<f64>, f64)> {
        let table = self.table();
        let (first, last) = (table.first()?, table.last()?);
        if P <= first.0 {
            return Some((first.1, first.1, 0.0));
        }
        if P >= last.0 {
            return Some((last.1, last.1, 0.0));
        }
        let i = table.iter().position(|(p, _)| *p >= P)?;
        let (p_low, arr_low) = table[i - 1];
        let (p_high, arr_high) = table[i];
        let w = (P.ln() - p_low.ln()) / (p_high.ln() - p_low.ln());
        Some((arr_low, arr_high, w))
    }

    /// `P` in Pa
    pub fn K_const(&self, Temp: f64, P: f64) -> f64 {
        match self.bracket(P) {
            Some((arr_low, arr_high, w)) => {
                let k_low = arrhenius(arr_low, Temp);
                if w == 0.0 {
                    return k_low;
                }
                let k_high = arrhenius(arr_high, Temp);
                if k_low <= 0.0 || k_high <= 0.0 {
                    return k_low + w * (k_high - k_low);
                }
                f64::exp(k_low.ln() + w * (k_high.ln() - k_low.ln()))
            }
            None => f64::NAN,
        }
    }

    pub fn K_expr(&self, Temp: Expr, P: f64) -> Expr {
        match self.bracket(P) {
            Some((arr_low, arr_high, w)) => {
                let k_low = arrhenius_sym(arr_low, Temp.clone());
                if w == 0.0 {
                    return k_low.symplify();
                }
                let k_high = arrhenius_sym(arr_high, Temp);
                (k_low.pow(Expr::Const(1.0 - w)) * k_high.pow(Expr::Const(w))).symplify()
            }
            None => Expr::Const(f64::NAN),
        }
    }
}

/// Rate constant of a reaction, SI units (m3, mol, s, J/mol)
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(tag = "type")]
pub enum RateExpression {
    #[serde(rename = "elem")]
    Elementary(ElementaryStruct),
    #[serde(rename = "pres", alias = "pressure")]
    Pressure(PressureStruct),
    #[serde(rename = "three-body", alias = "threebody")]
    ThreeBody(ThreeBodyStruct),
    #[serde(rename = "falloff")]
    Falloff(FalloffStruct),
}

impl RateExpression {
    pub fn arrhenius(A: f64, n: f64, E: f64) -> Self {
        RateExpression::Elementary(ElementaryStruct::new(vec![A, n, E]))
    }

    /// Numeric value at temperature `Temp` (K) and pressure `P` (Pa). `M` is the effective
    /// third-body concentration; when absent the ideal-gas total concentration P/(R T) is used.
    pub fn K_const(&self, Temp: f64, P: f64, M: Option<f64>) -> f64 {
        let M = M.unwrap_or(P / (R * Temp));
        match self {
            RateExpression::Elementary(elem) => elem.K_const(Temp),
            RateExpression::Pressure(pres) => pres.K_const(Temp, P),
            RateExpression::ThreeBody(tb) => tb.K_const(Temp, M),
            RateExpression::Falloff(falloff) => falloff.K_const(Temp, M),
        }
    }

    /// Symbolic rate constant as a function of the variable `T`; third-body forms keep `M` as a variable
    pub fn K_sym(&self, P: f64) -> Expr {
        let T = Expr::Var("T".to_string());
        let M = Expr::Var("M".to_string());
        match self {
            RateExpression::Elementary(elem) => elem.K_expr(T).symplify(),
            RateExpression::Pressure(pres) => pres.K_expr(T, P),
            RateExpression::ThreeBody(tb) => tb.K_expr(T, M),
            RateExpression::Falloff(falloff) => falloff.K_expr(T, M),
        }
    }

    /// true when the value depends on the third-body concentration
    pub fn needs_third_body(&self) -> bool {
        matches!(self, RateExpression::ThreeBody(_) | RateExpression::Falloff(_))
    }

    /// collision efficiencies keyed by species label (missing species count as 1.0)
    pub fn efficiencies(&self) -> Option<&BTreeMap<String, f64>> {
        match self {
            RateExpression::ThreeBody(tb) => Some(&tb.eff),
            RateExpression::Falloff(falloff) => Some(&falloff.eff),
            _ => None,
        }
    }

    /// The same expression with every pre-exponential factor multiplied by `factor`
    pub fn scaled(&self, factor: f64) -> RateExpression {
        let scale = |params: &[f64]| -> Vec<f64> {
            let mut params = params.to_vec();
            if let Some(A) = params.first_mut() {
                *A *= factor;
            }
            params
        };
        match self {
            RateExpression::Elementary(elem) => {
                RateExpression::Elementary(ElementaryStruct::new(scale(&elem.Arrenius)))
            }
            RateExpression::Pressure(pres) => RateExpression::Pressure(PressureStruct::new(
                pres.Arrenius
                    .iter()
                    .map(|(p, params)| (p.clone(), scale(params)))
                    .collect(),
            )),
            RateExpression::ThreeBody(tb) => {
                RateExpression::ThreeBody(ThreeBodyStruct::new(scale(&tb.Arrenius), tb.eff.clone()))
            }
            RateExpression::Falloff(falloff) => RateExpression::Falloff(FalloffStruct::new(
                scale(&falloff.low_rate),
                scale(&falloff.high_rate),
                falloff.eff.clone(),
                falloff.troe.clone(),
            )),
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        match self {
            RateExpression::Elementary(elem) => check_arrhenius(&elem.Arrenius, "Arrhenius"),
            RateExpression::Pressure(pres) => {
                if pres.Arrenius.is_empty() {
                    return Err("PLOG table is empty".to_string());
                }
                for (p, params) in &pres.Arrenius {
                    let p_value: f64 = p
                        .trim()
                        .parse()
                        .map_err(|_| format!("PLOG pressure key '{}' is not a number", p))?;
                    if p_value <= 0.0 {
                        return Err(format!("PLOG pressure {} must be positive", p));
                    }
                    check_arrhenius(params, &format!("PLOG entry at {} atm", p))?;
                }
                Ok(())
            }
            RateExpression::ThreeBody(tb) => check_arrhenius(&tb.Arrenius, "three-body Arrhenius"),
            RateExpression::Falloff(falloff) => {
                check_arrhenius(&falloff.low_rate, "fall-off low_rate")?;
                check_arrhenius(&falloff.high_rate, "fall-off high_rate")?;
                match falloff.troe.as_deref() {
                    None | Some([_, _, _]) | Some([_, _, _, _]) => Ok(()),
                    Some(other) => Err(format!(
                        "Troe parameters must have 3 or 4 entries, got {}",
                        other.len()
                    )),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_elementary_reaction() {
        let elementary_reaction = ElementaryStruct::new(vec![1.0, 2.0, 300.0]);
        let temp = 298.0;
        let expected_k_const = 1.0 * (298.0_f64).powf(2.0) * f64::exp(-300.0 / (298.0 * R));
        assert_relative_eq!(elementary_reaction.K_const(temp), expected_k_const, epsilon = 1e-9);
    }

    #[test]
    fn test_falloff_limits() {
        let falloff = FalloffStruct::new(
            vec![1.0e6, 0.0, 0.0],
            vec![1.0e3, 0.0, 0.0],
            BTreeMap::new(),
            None,
        );
        // low pressure limit: k -> k0*M
        assert_relative_eq!(falloff.K_const(1000.0, 1e-9), 1.0e6 * 1e-9, max_relative = 1e-5);
        // high pressure limit: k -> k_inf
        assert_relative_eq!(falloff.K_const(1000.0, 1e6), 1.0e3, max_relative = 1e-5);
    }

    #[test]
    fn test_troe_reduces_rate() {
        let lindemann = FalloffStruct::new(vec![1.0e6, 0.0, 0.0], vec![1.0e3, 0.0, 0.0], BTreeMap::new(), None);
        let troe = FalloffStruct {
            troe: Some(vec![0.5, 300.0, 1000.0]),
            ..lindemann.clone()
        };
        let k_l = lindemann.K_const(1000.0, 1e-3);
        let k_t = troe.K_const(1000.0, 1e-3);
        assert!(k_t > 0.0);
        assert!(k_t < k_l);
    }

    #[test]
    fn test_threebody_reaction() {
        let threebody_reaction = ThreeBodyStruct::new(
            vec![1.0, 2.0, 300.0],
            BTreeMap::from([("H2".to_string(), 2.0)]),
        );
        let k = threebody_reaction.K_const(298.0, 3.0);
        assert_relative_eq!(k, 3.0 * arrhenius(&[1.0, 2.0, 300.0], 298.0), max_relative = 1e-12);
    }

    #[test]
    fn test_plog_interpolation() {
        let plog = PressureStruct::new(BTreeMap::from([
            ("1.0".to_string(), vec![1.0e2, 0.0, 0.0]),
            ("10.0".to_string(), vec![1.0e4, 0.0, 0.0]),
        ]));
        // geometric mean at the log-midpoint
        let p_mid = ATM * 10f64.sqrt();
        assert_relative_eq!(plog.K_const(1000.0, p_mid), 1.0e3, max_relative = 1e-9);
        // clamped outside the table
        assert_relative_eq!(plog.K_const(1000.0, 0.1 * ATM), 1.0e2, max_relative = 1e-12);
        assert_relative_eq!(plog.K_const(1000.0, 100.0 * ATM), 1.0e4, max_relative = 1e-12);
        assert_relative_eq!(plog.K_const(1000.0, ATM), 1.0e2, max_relative = 1e-12);
    }

    #[test]
    fn test_deserialize_tagged_forms() {
        let json = r#"[
            {"type": "elem", "Arrenius": [1e13, 0.0, 200000.0]},
            {"type": "pres", "Arrenius": {"1.0": [1e10, 0.0, 0.0]}},
            {"type": "three-body", "Arrenius": [1e6, 0.0, 0.0], "eff": {"H2O": 6.0}},
            {"type": "falloff", "low_rate": [1e6, 0.0, 0.0], "high_rate": [1e3, 0.0, 0.0], "troe": [0.5, 300.0, 1000.0]}
        ]"#;
        let rates: Vec<RateExpression> = serde_json::from_str(json).unwrap();
        assert_eq!(rates.len(), 4);
        assert!(matches!(rates[0], RateExpression::Elementary(_)));
        assert!(matches!(rates[1], RateExpression::Pressure(_)));
        assert!(rates[2].needs_third_body());
        assert_eq!(rates[2].efficiencies().unwrap()["H2O"], 6.0);
        assert!(rates[3].needs_third_body());
        for rate in &rates {
            assert!(rate.validate().is_ok());
        }
    }

    #[test]
    fn test_validation_errors() {
        assert!(RateExpression::arrhenius(-1.0, 0.0, 0.0).validate().is_err());
        let short = RateExpression::Elementary(ElementaryStruct::new(vec![1.0, 0.0]));
        assert!(short.validate().is_err());
        let bad_plog = RateExpression::Pressure(PressureStruct::new(BTreeMap::from([(
            "one".to_string(),
            vec![1.0, 0.0, 0.0],
        )])));
        assert!(bad_plog.validate().is_err());
    }

    #[test]
    fn test_scaling_multiplies_rate() {
        let k = RateExpression::arrhenius(2.0e10, 0.5, 1.0e5);
        let k3 = k.scaled(3.0);
        assert_relative_eq!(
            k3.K_const(1200.0, ATM, None),
            3.0 * k.K_const(1200.0, ATM, None),
            max_relative = 1e-12
        );
    }

    #[test]
    fn test_symbolic_rate_prints() {
        let k = RateExpression::arrhenius(1.0e13, 0.0, 2.0e5);
        let printed = format!("{}", k.K_sym(ATM));
        assert!(printed.contains('T'));
    }
}
