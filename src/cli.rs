/// Command line front end: `KiMech <task.json> [--output <file>] [--log <file>]`
pub mod cli_main;
