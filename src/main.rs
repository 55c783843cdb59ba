//! cwl2compute CLI Entry Point
//!
//! Translates compiled workflows and submits them to the Compute service.
//!
//! # Usage
//!
//! ```bash
//! # Translate a compiled workflow next to its job inputs
//! cwl2compute translate autogenerated/viz.cwl autogenerated/viz_inputs.yml
//!
//! # Choose the mount roots and the output file
//! cwl2compute translate viz.cwl viz_inputs.yml --working-root /home/user/viz \
//!     --target-root /data/outputs --output compute/viz.json
//!
//! # Translate and submit in one go
//! cwl2compute translate viz.cwl viz_inputs.yml --submit
//!
//! # Submit an existing spec
//! cwl2compute submit compute/viz.json
//! ```

use std::env;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use log::{debug, error, info, warn};

use cwl2compute::registry::{PluginRegistry, PLUGIN_DIR};
use cwl2compute::submit::{ComputeClient, ComputeConfig};
use cwl2compute::translate::{ToolCatalog, Translator};
use cwl2compute::workflow::model::ComputeWorkflow;
use cwl2compute::workflow::parser::save_compute_workflow;
use cwl2compute::{TranslationConfig, APP_NAME, VERSION};

/// Default directory of materialized tool definitions.
const DEFAULT_TOOLS_DIR: &str = "cwl_adapters";

/// Subcommand selected on the command line.
#[derive(Debug)]
enum Command {
    Translate(TranslateArgs),
    Submit { spec_path: PathBuf },
}

/// Arguments of the `translate` subcommand.
#[derive(Debug, Default)]
struct TranslateArgs {
    workflow_path: PathBuf,
    job_inputs_path: PathBuf,
    config_path: Option<PathBuf>,
    tools_dir: Option<PathBuf>,
    plugins_dir: Option<PathBuf>,
    output_path: Option<PathBuf>,
    working_root: Option<PathBuf>,
    target_root: Option<PathBuf>,
    driver: Option<String>,
    structured_bindings: bool,
    location_attribute: bool,
    submit: bool,
}

/// Command-line configuration parsed from arguments.
#[derive(Debug)]
struct Cli {
    command: Command,
    verbose: bool,
}

/// Configures the logging system with appropriate formatting.
fn setup_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format(|buf, record| {
            use std::io::Write;

            match record.level() {
                log::Level::Warn | log::Level::Error => {
                    writeln!(buf, "[{}] {}", record.level(), record.args())
                }
                _ => writeln!(buf, "{}", record.args()),
            }
        })
        .init();
}

/// Prints usage information.
fn print_usage() {
    println!("Usage:");
    println!("  cwl2compute translate [OPTIONS] <WORKFLOW_FILE> <JOB_INPUTS_FILE>");
    println!("  cwl2compute submit [OPTIONS] <SPEC_FILE>");
    println!();
    println!("Translate options:");
    println!("  --config PATH         Translation settings (YAML)");
    println!("  --tools DIR           Tool definitions directory (default: {})", DEFAULT_TOOLS_DIR);
    println!("  --plugins DIR         Plugin manifest directory");
    println!("  --output PATH         Output spec file (default: <WORKFLOW_FILE>.json)");
    println!("  --working-root DIR    Root the workflow was compiled in");
    println!("  --target-root DIR     Mount root on the execution backend");
    println!("  --driver NAME         Backend driver tag (default: argo)");
    println!("  --structured-bindings Keep {{source: ...}} step bindings");
    println!("  --location            Emit Directory 'location' instead of 'path'");
    println!("  --submit              Submit the spec after translating it");
    println!();
    println!("Common options:");
    println!("  --verbose             Enable debug logging");
    println!("  --help                Show this help message");
    println!("  --version             Show version information");
    println!();
    println!("Submission reads COMPUTE_URL, ACCESS_TOKEN, COMPUTE_TOKEN_URL,");
    println!("COMPUTE_CLIENT_ID and COMPUTE_CLIENT_SECRET from the environment");
    println!("or from a .env file in the current directory or its parents.");
}

/// Returns the value following an option.
fn option_value(args: &[String], i: &mut usize, option: &str) -> Result<String, String> {
    *i += 1;
    args.get(*i)
        .cloned()
        .ok_or_else(|| format!("{} requires an argument", option))
}

/// Parses command-line arguments into a Cli struct.
fn parse_arguments(args: &[String]) -> Result<Cli, String> {
    let mut verbose = false;
    let mut subcommand: Option<String> = None;
    let mut positional: Vec<String> = Vec::new();
    let mut translate = TranslateArgs::default();
    let mut i = 1; // Skip program name

    while i < args.len() {
        let arg = &args[i];

        match arg.as_str() {
            "--help" | "-h" => {
                print_usage();
                std::process::exit(0);
            }
            "--version" | "-V" => {
                println!("{} {}", APP_NAME, VERSION);
                std::process::exit(0);
            }
            "--verbose" | "-v" => verbose = true,
            "--structured-bindings" => translate.structured_bindings = true,
            "--location" => translate.location_attribute = true,
            "--submit" => translate.submit = true,
            "--config" => translate.config_path = Some(option_value(args, &mut i, arg)?.into()),
            "--tools" => translate.tools_dir = Some(option_value(args, &mut i, arg)?.into()),
            "--plugins" => translate.plugins_dir = Some(option_value(args, &mut i, arg)?.into()),
            "--output" | "-o" => {
                translate.output_path = Some(option_value(args, &mut i, arg)?.into())
            }
            "--working-root" => {
                translate.working_root = Some(option_value(args, &mut i, arg)?.into())
            }
            "--target-root" => {
                translate.target_root = Some(option_value(args, &mut i, arg)?.into())
            }
            "--driver" => translate.driver = Some(option_value(args, &mut i, arg)?),
            arg if arg.starts_with('-') => {
                return Err(format!("Unknown option: {}", arg));
            }
            _ => {
                if subcommand.is_none() {
                    subcommand = Some(arg.clone());
                } else {
                    positional.push(arg.clone());
                }
            }
        }
        i += 1;
    }

    let command = match (subcommand.as_deref(), positional.as_slice()) {
        (Some("translate"), [workflow, job_inputs]) => {
            translate.workflow_path = PathBuf::from(workflow);
            translate.job_inputs_path = PathBuf::from(job_inputs);
            Command::Translate(translate)
        }
        (Some("translate"), _) => {
            return Err("translate expects <WORKFLOW_FILE> <JOB_INPUTS_FILE>".to_string())
        }
        (Some("submit"), [spec]) => Command::Submit {
            spec_path: PathBuf::from(spec),
        },
        (Some("submit"), _) => return Err("submit expects <SPEC_FILE>".to_string()),
        (Some(other), _) => return Err(format!("Unknown command: {}", other)),
        (None, _) => return Err("No command given".to_string()),
    };

    Ok(Cli { command, verbose })
}

/// Merges defaults, the settings file, environment and flags.
fn translation_config(args: &TranslateArgs) -> Result<TranslationConfig, Box<dyn std::error::Error>> {
    let config = match &args.config_path {
        Some(path) => TranslationConfig::from_file(path)?,
        None => TranslationConfig::default(),
    };
    let mut config = config.with_env_overrides();

    if let Some(root) = &args.working_root {
        config.working_root = root.clone();
    }
    if let Some(root) = &args.target_root {
        config.target_root = root.clone();
    }
    if let Some(driver) = &args.driver {
        config.driver = driver.clone();
    }
    if args.structured_bindings {
        config.paths_as_strings = false;
    }
    if args.location_attribute {
        config.directory_attribute_is_path = false;
    }

    info!(
        "Working root: {}, target root: {}, driver: {}",
        config.working_root.display(),
        config.target_root.display(),
        config.driver
    );
    Ok(config)
}

fn translate(args: &TranslateArgs) -> Result<ComputeWorkflow, Box<dyn std::error::Error>> {
    let config = translation_config(args)?;

    let tools_dir = args
        .tools_dir
        .clone()
        .unwrap_or_else(|| PathBuf::from(DEFAULT_TOOLS_DIR));
    let catalog = ToolCatalog::from_dir(&tools_dir)?;

    let plugins_dir = args.plugins_dir.clone().unwrap_or_else(|| PLUGIN_DIR.clone());
    let registry = PluginRegistry::load(plugins_dir)?;

    info!("Translating {}", args.workflow_path.display());
    let spec = Translator::new(config, &catalog, &registry)
        .translate_files(&args.workflow_path, &args.job_inputs_path)
        .map_err(|e| {
            error!("Translation failed ({:?}): {}", e.kind(), e);
            e
        })?;

    let output = args
        .output_path
        .clone()
        .unwrap_or_else(|| args.workflow_path.with_extension("json"));
    save_compute_workflow(&spec, &output)?;
    info!("Compute workflow written to {}", output.display());

    Ok(spec)
}

fn submit_spec(spec: &ComputeWorkflow) -> Result<(), Box<dyn std::error::Error>> {
    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(async {
        let client = ComputeClient::new(ComputeConfig::from_env()?)?;
        let submission = client.submit(spec).await?;
        info!("Submitted '{}': HTTP {}", spec.name, submission.status);
        Ok::<(), Box<dyn std::error::Error>>(())
    })
}

fn submit_file(path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(async {
        let client = ComputeClient::new(ComputeConfig::from_env()?)?;
        let submission = client.submit_file(path).await?;
        info!("Submitted {}: HTTP {}", path.display(), submission.status);
        Ok::<(), Box<dyn std::error::Error>>(())
    })
}

/// Main application entry point.
fn run() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = env::args().collect();

    let cli = parse_arguments(&args).map_err(|e| {
        eprintln!("Error: {}", e);
        eprintln!();
        print_usage();
        e
    })?;

    setup_logging(cli.verbose);
    info!("{} v{}", APP_NAME, VERSION);

    match dotenvy::dotenv() {
        Ok(path) => debug!("Loaded environment from {}", path.display()),
        Err(e) if e.not_found() => {}
        Err(e) => warn!("Ignoring .env file: {}", e),
    }

    match cli.command {
        Command::Translate(args) => {
            let spec = translate(&args)?;
            if args.submit {
                submit_spec(&spec)?;
            }
        }
        Command::Submit { spec_path } => submit_file(&spec_path)?,
    }

    Ok(())
}

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!();
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}
