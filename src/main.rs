use std::env;
use std::fs;
use std::io;
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result, bail};

use spectra_converter::baseline::AirPls;
use spectra_converter::data::loader::load_path;
use spectra_converter::processing::{
    DEFAULT_MOVING_AVERAGE_WINDOW, DEFAULT_SAVGOL_ORDER, DEFAULT_SAVGOL_WINDOW, ExperimentKind,
    Method, ProcessingSteps,
};
use spectra_converter::report::{build_report, write_report};
use spectra_converter::state::Workspace;

// ---------------------------------------------------------------------------
// Command-line arguments
// ---------------------------------------------------------------------------

enum Command {
    Process(ProcessArgs),
    List { input: PathBuf },
}

#[derive(Debug, Default)]
struct ProcessArgs {
    input: PathBuf,
    output: Option<PathBuf>,
    recipe: Option<PathBuf>,
    experiment: Option<ExperimentKind>,
    method: Option<String>,
    normalize: bool,
    lambda: Option<f64>,
    p: Option<f64>,
    max_iterations: Option<usize>,
    tolerance: Option<f64>,
    window: Option<usize>,
    order: Option<usize>,
    select: Vec<String>,
}

fn parse_cli(args: &[String]) -> Result<Option<Command>> {
    let Some(command) = args.first() else {
        print_help();
        return Ok(None);
    };
    if args.iter().any(|a| matches!(a.as_str(), "-h" | "--help")) {
        print_help();
        return Ok(None);
    }
    if args.iter().any(|a| matches!(a.as_str(), "-V" | "--version")) {
        println!("spectra-converter {}", env!("CARGO_PKG_VERSION"));
        return Ok(None);
    }

    let rest = &args[1..];
    match command.as_str() {
        "process" => Ok(Some(Command::Process(parse_process_args(rest)?))),
        "list" => Ok(Some(Command::List {
            input: parse_list_args(rest)?,
        })),
        other => bail!("unknown command '{other}'; expected 'process' or 'list'"),
    }
}

fn parse_process_args(tokens: &[String]) -> Result<ProcessArgs> {
    let mut args = ProcessArgs::default();
    let mut idx = 0usize;
    while idx < tokens.len() {
        let (flag, inline) = split_flag(&tokens[idx]);
        if flag == "--normalize" {
            if inline.is_some() {
                bail!("--normalize does not accept a value");
            }
            args.normalize = true;
            idx += 1;
            continue;
        }

        let value = take_value(flag, inline, tokens, &mut idx)?;
        match flag {
            "--input" => args.input = PathBuf::from(value),
            "--output" => args.output = Some(PathBuf::from(value)),
            "--recipe" => args.recipe = Some(PathBuf::from(value)),
            "--experiment" => args.experiment = Some(parse_experiment(&value)?),
            "--method" => args.method = Some(value),
            "--lambda" => args.lambda = Some(parse_num(&value, flag)?),
            "--p" => args.p = Some(parse_num(&value, flag)?),
            "--max-iter" => args.max_iterations = Some(parse_num(&value, flag)?),
            "--tol" => args.tolerance = Some(parse_num(&value, flag)?),
            "--window" => args.window = Some(parse_num(&value, flag)?),
            "--order" => args.order = Some(parse_num(&value, flag)?),
            "--select" => args.select.extend(
                value
                    .split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string),
            ),
            other => bail!("unknown option '{other}'"),
        }
    }

    if args.input.as_os_str().is_empty() {
        bail!("--input <folder|file> is required");
    }
    Ok(args)
}

/// `list` only takes `--input`.
fn parse_list_args(tokens: &[String]) -> Result<PathBuf> {
    let mut input = None;
    let mut idx = 0usize;
    while idx < tokens.len() {
        let (flag, inline) = split_flag(&tokens[idx]);
        match flag {
            "--input" => input = Some(PathBuf::from(take_value(flag, inline, tokens, &mut idx)?)),
            other => bail!("unknown option '{other}' for list; only --input is accepted"),
        }
    }
    input.context("--input <folder|file> is required")
}

/// Value of `flag`, either inline (`--flag=value`) or the next token.
/// Leaves `idx` on the token after the value.
fn take_value(
    flag: &str,
    inline: Option<String>,
    tokens: &[String],
    idx: &mut usize,
) -> Result<String> {
    if let Some(value) = inline {
        *idx += 1;
        return Ok(value);
    }
    let value = tokens
        .get(*idx + 1)
        .cloned()
        .with_context(|| format!("{flag} expects a value"))?;
    *idx += 2;
    Ok(value)
}

/// `--flag=value` → (`--flag`, Some(`value`)).
fn split_flag(token: &str) -> (&str, Option<String>) {
    match token.split_once('=') {
        Some((flag, value)) if flag.starts_with("--") => (flag, Some(value.to_string())),
        _ => (token, None),
    }
}

fn parse_num<T: std::str::FromStr>(raw: &str, flag: &str) -> Result<T> {
    raw.parse::<T>()
        .map_err(|_| anyhow::anyhow!("{flag} expects a number, got '{raw}'"))
}

fn parse_experiment(raw: &str) -> Result<ExperimentKind> {
    match raw {
        "absorption" | "uvvis" => Ok(ExperimentKind::Absorption),
        "luminescence" | "lumi" => Ok(ExperimentKind::Luminescence),
        other => bail!("unknown experiment '{other}'; expected absorption or luminescence"),
    }
}

/// Build the recipe from `--recipe` or from the individual flags.
fn steps_from_args(args: &ProcessArgs) -> Result<ProcessingSteps> {
    if let Some(path) = &args.recipe {
        if args.method.is_some() || args.normalize {
            bail!("--recipe cannot be combined with --method or --normalize");
        }
        let text = fs::read_to_string(path)
            .with_context(|| format!("reading recipe {}", path.display()))?;
        return serde_json::from_str(&text).context("parsing recipe JSON");
    }

    let method = match args.method.as_deref() {
        None | Some("none") => None,
        Some("min") => Some(Method::SubtractMin),
        Some("airpls") => {
            let defaults = AirPls::default();
            Some(Method::AirPls(AirPls {
                lambda: args.lambda.unwrap_or(defaults.lambda),
                p: args.p.unwrap_or(defaults.p),
                max_iterations: args.max_iterations.unwrap_or(defaults.max_iterations),
                tolerance: args.tolerance.unwrap_or(defaults.tolerance),
            }))
        }
        Some("moving-average") => Some(Method::MovingAverage {
            window: args.window.unwrap_or(DEFAULT_MOVING_AVERAGE_WINDOW),
        }),
        Some("savgol") => Some(Method::SavitzkyGolay {
            window: args.window.unwrap_or(DEFAULT_SAVGOL_WINDOW),
            order: args.order.unwrap_or(DEFAULT_SAVGOL_ORDER),
        }),
        Some(other) => bail!(
            "unknown method '{other}'; expected none, min, airpls, moving-average or savgol"
        ),
    };

    Ok(ProcessingSteps {
        normalize: args.normalize,
        method,
    })
}

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

fn run_process(args: ProcessArgs) -> Result<ExitCode> {
    let steps = steps_from_args(&args)?;
    match args.experiment {
        Some(kind) => steps.validate_for(kind)?,
        None => steps.validate()?,
    }

    let mut workspace = Workspace::default();
    workspace.set_dataset(load_path(&args.input)?);

    if !args.select.is_empty() {
        let unknown = workspace.select_only(args.select.iter().map(String::as_str));
        if !unknown.is_empty() {
            bail!("unknown spectra selected: {}", unknown.join(", "));
        }
    }

    let summary = workspace.apply(&steps);
    for (name, err) in &summary.failed {
        eprintln!("warning: {name}: {err}");
    }

    let report = build_report(&workspace, &steps);
    match &args.output {
        Some(path) => {
            let file = fs::File::create(path)
                .with_context(|| format!("creating {}", path.display()))?;
            write_report(&report, io::BufWriter::new(file))?;
            log::info!("Wrote report for {} spectra to {}", report.spectra.len(), path.display());
        }
        None => write_report(&report, io::stdout().lock())?,
    }
    workspace.mark_exported();

    if summary.processed == 0 && !summary.failed.is_empty() {
        return Ok(ExitCode::FAILURE);
    }
    Ok(ExitCode::SUCCESS)
}

fn run_list(input: PathBuf) -> Result<ExitCode> {
    let dataset = load_path(&input)?;
    for sp in &dataset.spectra {
        let first = sp.wavelength.first().copied().unwrap_or(f64::NAN);
        let last = sp.wavelength.last().copied().unwrap_or(f64::NAN);
        println!("{}\t{} points\t{first} – {last}", sp.name, sp.len());
    }
    Ok(ExitCode::SUCCESS)
}

fn print_help() {
    println!(
        "spectra-converter {}

USAGE:
  spectra-converter process --input <folder|file> [OPTIONS]
  spectra-converter list --input <folder|file>

PROCESS OPTIONS:
  --experiment <absorption|luminescence>  Restrict methods to the experiment type
  --method <none|min|airpls|moving-average|savgol>
  --lambda <f64>      airPLS smoothness (default 1e7)
  --p <f64>           airPLS asymmetry (default 0.01)
  --max-iter <n>      airPLS iteration cap (default 50)
  --tol <f64>         airPLS weight-change tolerance (default 1e-3)
  --window <n>        Smoothing window (moving average 5, Savitzky-Golay 11)
  --order <n>         Savitzky-Golay polynomial order (default 2)
  --normalize         Divide by the maximum intensity first
  --recipe <json>     Read the processing steps from a JSON file instead
  --select <a,b,...>  Only process these file names
  --output <path>     Write the JSON report here instead of stdout

Set RUST_LOG=debug for per-iteration airPLS logging.",
        env!("CARGO_PKG_VERSION")
    );
}

fn main() -> ExitCode {
    env_logger::init();

    let args: Vec<String> = env::args().skip(1).collect();
    let result = parse_cli(&args).and_then(|command| match command {
        None => Ok(ExitCode::SUCCESS),
        Some(Command::Process(args)) => run_process(args),
        Some(Command::List { input }) => run_list(input),
    });

    match result {
        Ok(code) => code,
        Err(e) => {
            log::error!("{e:#}");
            ExitCode::FAILURE
        }
    }
}
