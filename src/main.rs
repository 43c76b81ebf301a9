use KiMech::cli::cli_main::run_from_args;

pub fn main() {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let code = run_from_args(args);
    std::process::exit(code);
}
