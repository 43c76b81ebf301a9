use crate::Examples::mechanism_examples::mech_examples;
use crate::MechanismGeneration::controller::{EnlargementOutcome, IterationSummary};
use crate::MechanismGeneration::errors::MechanismError;
use crate::settings::TaskConfig;
use log::{LevelFilter, error, info, warn};
use prettytable::{Table, row};
use simplelog::{ColorChoice, CombinedLogger, ConfigBuilder, SharedLogger, TermLogger, TerminalMode, WriteLogger};
use std::fs::File;

const USAGE: &str = "usage: KiMech <task.json> [--output <model.json>] [--log <file>]
       KiMech --example <n>
       KiMech --help";

/// Parsed command line
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CliArgs {
    pub task: Option<String>,
    pub output: Option<String>,
    pub log_file: Option<String>,
    pub example: Option<usize>,
    pub help: bool,
}

/// `args` without the program name
pub fn parse_args(args: &[String]) -> Result<CliArgs, MechanismError> {
    let mut parsed = CliArgs::default();
    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        let mut value = |flag: &str| {
            iter.next()
                .cloned()
                .ok_or_else(|| MechanismError::Config(format!("{} needs a value", flag)))
        };
        match arg.as_str() {
            "--output" | "-o" => parsed.output = Some(value(arg)?),
            "--log" => parsed.log_file = Some(value(arg)?),
            "--example" => {
                let n = value(arg)?;
                parsed.example = Some(
                    n.parse()
                        .map_err(|_| MechanismError::Config(format!("bad example number {}", n)))?,
                );
            }
            "--help" | "-h" => parsed.help = true,
            flag if flag.starts_with('-') => {
                return Err(MechanismError::Config(format!("unknown option {}", flag)));
            }
            task => {
                if parsed.task.is_some() {
                    return Err(MechanismError::Config("only one task file can be given".to_string()));
                }
                parsed.task = Some(task.to_string());
            }
        }
    }
    if !parsed.help && parsed.task.is_none() && parsed.example.is_none() {
        return Err(MechanismError::Config("no task file given".to_string()));
    }
    Ok(parsed)
}

/// Terminal logger plus an optional log file. A second call keeps the first logger.
/// The BDF integrator reports every run setup at info level, so its records are left out.
pub fn init_logger(level: LevelFilter, log_file: Option<&str>) -> Result<(), MechanismError> {
    let config = ConfigBuilder::new().add_filter_ignore_str("RustedSciThe").build();
    let mut loggers: Vec<Box<dyn SharedLogger>> = vec![TermLogger::new(
        level,
        config.clone(),
        TerminalMode::Mixed,
        ColorChoice::Auto,
    )];
    if let Some(path) = log_file {
        loggers.push(WriteLogger::new(level, config, File::create(path)?));
    }
    if CombinedLogger::init(loggers).is_err() {
        info!("logger already initialised");
    }
    Ok(())
}

pub fn print_history(history: &[IterationSummary]) {
    let mut table = Table::new();
    table.add_row(row![
        "Iteration",
        "New species",
        "New reactions",
        "Conditions",
        "Failed",
        "Max flux ratio",
        "Promoted",
        "Core (sp/rx)",
        "Edge (sp/rx)"
    ]);
    for h in history {
        let (cs, cr, es, er) = h.sizes;
        table.add_row(row![
            h.iteration,
            h.new_species,
            h.new_reactions,
            h.conditions_simulated,
            h.conditions_failed,
            format!("{:.3e}", h.max_species_ratio),
            h.promoted_species.len(),
            format!("{}/{}", cs, cr),
            format!("{}/{}", es, er)
        ]);
    }
    table.printstd();
}

/// Runs the enlargement of a task. The model is written to `output` (or the task's
/// `output_file`) whether enlargement succeeds or not.
pub fn run_task(task: &TaskConfig, output: Option<&str>) -> Result<EnlargementOutcome, MechanismError> {
    let mut model = task.build_model()?;
    let output = output.map(str::to_string).or_else(|| task.output_file.clone());
    match model.enlarge() {
        Ok(outcome) => {
            outcome.model.core_only().pretty_print();
            print_history(&outcome.history);
            if outcome.capped {
                warn!("core size cap reached, the model may be incomplete");
            }
            for warning in &outcome.warnings {
                println!("warning: {}", warning);
            }
            if let Some(path) = &output {
                outcome.model.save_json(path)?;
            }
            Ok(outcome)
        }
        Err(failure) => {
            failure.model.core_only().pretty_print();
            print_history(model.history());
            if let Some(path) = &output {
                failure.model.save_json(path)?;
                warn!("partial model written to {}", path);
            }
            Err(failure.error)
        }
    }
}

/// Entry point of the binary; returns the process exit code
/// (0 success, 1 enlargement failed, 2 bad command line or task file)
pub fn run_from_args(args: Vec<String>) -> i32 {
    let parsed = match parse_args(&args) {
        Ok(parsed) => parsed,
        Err(e) => {
            eprintln!("{}\n{}", e, USAGE);
            return 2;
        }
    };
    if parsed.help {
        println!("{}", USAGE);
        return 0;
    }
    if let Some(n) = parsed.example {
        if let Err(e) = init_logger(LevelFilter::Info, parsed.log_file.as_deref()) {
            eprintln!("{}", e);
            return 2;
        }
        return match mech_examples(n) {
            Ok(()) => 0,
            Err(e) => {
                error!("example {} failed: {}", n, e);
                1
            }
        };
    }
    let Some(path) = parsed.task.as_deref() else {
        eprintln!("{}", USAGE);
        return 2;
    };
    let task = match TaskConfig::load(path) {
        Ok(task) => task,
        Err(e) => {
            eprintln!("cannot use task file {}: {}", path, e);
            return 2;
        }
    };
    let level = task.log_level().unwrap_or(LevelFilter::Info);
    if let Err(e) = init_logger(level, parsed.log_file.as_deref()) {
        eprintln!("{}", e);
        return 2;
    }
    match run_task(&task, parsed.output.as_deref()) {
        Ok(outcome) => {
            info!(
                "done: {} iterations, {} core species, {} core reactions",
                outcome.iterations,
                outcome.model.core_species_count(),
                outcome.model.core_reactions_count()
            );
            0
        }
        Err(e @ MechanismError::Config(_)) => {
            error!("{}", e);
            2
        }
        Err(e) => {
            error!("{}", e);
            1
        }
    }
}
