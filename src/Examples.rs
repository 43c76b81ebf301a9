/// Worked mechanism generation runs, reachable with `KiMech --example <n>`
pub mod mechanism_examples;
