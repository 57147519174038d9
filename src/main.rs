/// LAE - Linear Algebra Engine CLI
use lae::{read_tree, write_output, EngineConfig, LaeResult, LinearAlgebraEngine, OutputDocument};
use std::env;
use std::io;
use std::path::{Path, PathBuf};
use std::process;
use tracing::{error, info, Level};

const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Log level variable (error, warn, info, debug, trace)
const LOG_ENV: &str = "LAE_LOG";

fn print_usage() {
    eprintln!("LAE v{}", VERSION);
    eprintln!();
    eprintln!("USAGE:");
    eprintln!("    lae [OPTIONS] <THREADS> <INPUT> <OUTPUT>");
    eprintln!();
    eprintln!("OPTIONS:");
    eprintln!("    -h, --help             Print this help message");
    eprintln!("    -V, --version          Print version information");
    eprintln!("    -c, --config <FILE>    Read engine settings from a TOML file");
    eprintln!("    --report               Print the worker report to stderr");
    eprintln!();
    eprintln!("ARGUMENTS:");
    eprintln!("    <THREADS>              Number of worker threads (overrides LAE_THREADS");
    eprintln!("                           and the config file)");
    eprintln!("    <INPUT>                Expression tree (JSON)");
    eprintln!("    <OUTPUT>               Result file (JSON)");
    eprintln!();
    eprintln!("ENVIRONMENT:");
    eprintln!("    LAE_LOG                Log level (default: warn)");
    eprintln!("    LAE_FATIGUE_SEED       Seed for worker fatigue factors");
    eprintln!();
    eprintln!("EXAMPLES:");
    eprintln!("    lae 4 input.json output.json");
    eprintln!("    lae --report --config lae.toml 8 input.json output.json");
}

fn print_version() {
    println!("LAE {}", VERSION);
}

struct Options {
    threads: usize,
    input: PathBuf,
    output: PathBuf,
    config: Option<PathBuf>,
    report: bool,
}

fn parse_args() -> Result<Options, String> {
    let args: Vec<String> = env::args().collect();

    let mut positional = Vec::new();
    let mut config = None;
    let mut report = false;
    let mut i = 1;

    while i < args.len() {
        match args[i].as_str() {
            "-h" | "--help" => {
                print_usage();
                process::exit(0);
            }
            "-V" | "--version" => {
                print_version();
                process::exit(0);
            }
            "-c" | "--config" => {
                i += 1;
                if i >= args.len() {
                    return Err("Missing config file after --config".to_string());
                }
                config = Some(PathBuf::from(&args[i]));
            }
            "--report" => {
                report = true;
            }
            arg if arg.starts_with('-') && arg.len() > 1 => {
                return Err(format!("Unknown option: {}", arg));
            }
            arg => positional.push(arg.to_string()),
        }
        i += 1;
    }

    let [threads, input, output] = <[String; 3]>::try_from(positional).map_err(|given| {
        format!(
            "Expected <THREADS> <INPUT> <OUTPUT>, got {} argument(s)",
            given.len()
        )
    })?;
    let threads = threads
        .parse()
        .map_err(|_| format!("Number of threads must be an integer, got '{}'", threads))?;

    Ok(Options {
        threads,
        input: PathBuf::from(input),
        output: PathBuf::from(output),
        config,
        report,
    })
}

fn init_logging() {
    let level = env::var(LOG_ENV)
        .ok()
        .and_then(|value| value.parse::<Level>().ok())
        .unwrap_or(Level::WARN);
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(io::stderr)
        .init();
}

fn load_config(path: Option<&Path>, threads: usize) -> LaeResult<EngineConfig> {
    let mut config = match path {
        Some(path) => EngineConfig::load(path)?,
        None => EngineConfig::default(),
    };
    config.apply_env();
    // The positional thread count always wins.
    config.threads = threads;
    config.validate()?;
    Ok(config)
}

fn evaluate(options: &Options) -> LaeResult<Vec<Vec<f64>>> {
    let tree = read_tree(&options.input)?;
    let config = load_config(options.config.as_deref(), options.threads)?;
    info!(threads = config.threads, input = %options.input.display(), "starting run");

    let mut engine = LinearAlgebraEngine::with_config(&config)?;
    let outcome = engine.run(tree);
    if options.report {
        eprint!("{}", engine.worker_report());
    }
    Ok(outcome?)
}

fn main() {
    init_logging();

    let options = match parse_args() {
        Ok(opts) => opts,
        Err(e) => {
            eprintln!("Error: {}", e);
            eprintln!();
            print_usage();
            process::exit(1);
        }
    };

    let outcome = evaluate(&options);
    if let Err(e) = &outcome {
        error!(error = %e, "run failed");
    }

    let document = OutputDocument::from(outcome);
    if let Err(e) = write_output(&options.output, &document) {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}
