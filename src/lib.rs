#[allow(non_snake_case)]
pub mod Examples;
#[allow(non_snake_case)]
pub mod Kinetics;
#[allow(non_snake_case)]
pub mod MechanismGeneration;
#[allow(non_snake_case)]
pub mod Thermodynamics;
pub mod cli;
pub mod settings;
