// ============================================================================
// SpriteFE CLI — headless editing via command-line arguments
// ============================================================================
//
// Usage examples:
//   spritefe --input hero.sfe --script recolor.txt --output hero.sfe
//   spritefe -i new:32x32 --script draw.txt -o icon.png
//   spritefe -i "sprites/*.sfe" --script outline.txt --output-dir out/ --format png
//   spritefe -i hero.sfe -o hero.png --verbose
//
// Scripts hold one editor command per line (see `components::tools`).  The
// commands are replayed through the editor loop without sleeping, so paced
// undo and polygon selections finish before the file is written.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Instant;

use clap::Parser;

use crate::app::EditorApp;
use crate::project::Project;
use crate::settings::{EngineConfig, parse_numeric_field};

/// Extension of project files.
pub const PROJECT_EXTENSION: &str = "sfe";

/// Ticks a single script may take before the run is abandoned.
const MAX_TICKS: u64 = 1_000_000;

// ============================================================================
// CLI argument definition (clap Derive)
// ============================================================================

/// SpriteFE headless sprite editor.
#[derive(Parser, Debug)]
#[command(
    name = "spritefe",
    about = "SpriteFE headless sprite editor",
    long_about = "Replay editor command scripts on sprite projects and export the\n\
                  result as a project file or a flattened PNG.\n\n\
                  Example:\n  \
                  spritefe --input hero.sfe --script recolor.txt --output hero.png\n  \
                  spritefe -i new:16x16 --script draw.txt -o icon.sfe"
)]
pub struct CliArgs {
    /// Input project file(s). Glob patterns accepted (e.g. "*.sfe").
    /// `new:WxH` starts from a blank sprite instead.
    #[arg(short, long, required = true, num_args = 1..)]
    pub input: Vec<String>,

    /// Command script to replay on each input.
    #[arg(short, long, value_name = "SCRIPT")]
    pub script: Option<PathBuf>,

    /// Output file path. Only valid for single-file input.
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Output directory for batch processing.
    #[arg(long, value_name = "DIR")]
    pub output_dir: Option<PathBuf>,

    /// Output format: sfe or png.  Inferred from --output's extension when
    /// omitted, defaulting to sfe.
    #[arg(short, long, value_name = "FORMAT")]
    pub format: Option<String>,

    /// Settings file to use instead of the platform default.
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Undo frames kept per layer (overrides the settings file).
    #[arg(long, value_name = "N")]
    pub history: Option<usize>,

    /// Worker threads for polygon selections (overrides the settings file).
    #[arg(long, value_name = "N")]
    pub workers: Option<usize>,

    /// Resample rotated selections with anti-aliasing.
    #[arg(long)]
    pub anti_aliased: bool,

    /// Print per-file progress and mirror the session log to stderr.
    #[arg(short, long)]
    pub verbose: bool,
}

impl CliArgs {
    /// Settings file (or defaults) with command-line overrides applied.
    pub fn engine_config(&self) -> EngineConfig {
        let mut config = match &self.config {
            Some(path) => EngineConfig::load_from(path),
            None => EngineConfig::load(),
        };
        if let Some(n) = self.history {
            config.history_capacity = n.max(1);
        }
        if let Some(n) = self.workers {
            config.mask_workers = n;
        }
        if self.anti_aliased {
            config.anti_aliased = true;
        }
        config
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OutputFormat {
    Project,
    Png,
}

impl OutputFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            OutputFormat::Project => PROJECT_EXTENSION,
            OutputFormat::Png => "png",
        }
    }
}

/// Where one run starts from.
#[derive(Clone, Debug, PartialEq, Eq)]
enum Input {
    File(PathBuf),
    Blank { width: u32, height: u32 },
}

impl Input {
    fn describe(&self) -> String {
        match self {
            Input::File(p) => p.display().to_string(),
            Input::Blank { width, height } => format!("new {}x{}", width, height),
        }
    }
}

// ============================================================================
// Public entry point
// ============================================================================

/// Run all CLI processing and return an OS exit code.
/// `0` = all inputs succeeded, `1` = one or more failed.
pub fn run(args: CliArgs) -> ExitCode {
    let inputs = match resolve_inputs(&args.input) {
        Ok(inputs) => inputs,
        Err(e) => {
            eprintln!("error: {}", e);
            return ExitCode::FAILURE;
        }
    };
    if inputs.is_empty() {
        eprintln!("error: no input files matched the given pattern(s).");
        return ExitCode::FAILURE;
    }

    if inputs.len() > 1 && args.output.is_some() && args.output_dir.is_none() {
        eprintln!(
            "error: {} inputs given but --output only accepts a single file path.\n\
             Use --output-dir to specify a destination directory for batch processing.",
            inputs.len()
        );
        return ExitCode::FAILURE;
    }

    let format = parse_format(args.format.as_deref(), args.output.as_deref());
    let config = args.engine_config();

    let script_source: Option<String> = match &args.script {
        Some(path) => match std::fs::read_to_string(path) {
            Ok(src) => Some(src),
            Err(e) => {
                eprintln!("error: could not read script '{}': {}", path.display(), e);
                return ExitCode::FAILURE;
            }
        },
        None => None,
    };

    if let Some(dir) = &args.output_dir
        && let Err(e) = std::fs::create_dir_all(dir)
    {
        eprintln!(
            "error: could not create output directory '{}': {}",
            dir.display(),
            e
        );
        return ExitCode::FAILURE;
    }

    let total = inputs.len();
    let multi = total > 1;
    let mut any_failure = false;

    for (idx, input) in inputs.iter().enumerate() {
        if multi || args.verbose {
            println!("[{}/{}] {}", idx + 1, total, input.describe());
        }
        let file_start = Instant::now();

        let Some(output_path) =
            build_output_path(input, args.output.as_deref(), args.output_dir.as_deref(), format)
        else {
            eprintln!("  error: cannot determine output path for '{}'.", input.describe());
            any_failure = true;
            continue;
        };

        match run_one(input, &output_path, script_source.as_deref(), format, &config) {
            Ok(ticks) => {
                if args.verbose || multi {
                    println!(
                        "  → {} ({} ticks, {:.0}ms)",
                        output_path.display(),
                        ticks,
                        file_start.elapsed().as_secs_f64() * 1000.0
                    );
                }
            }
            Err(e) => {
                crate::log_err!("{}: {}", input.describe(), e);
                eprintln!("  error: {}", e);
                any_failure = true;
            }
        }
    }

    if any_failure { ExitCode::FAILURE } else { ExitCode::SUCCESS }
}

// ============================================================================
// Per-input pipeline
// ============================================================================

fn run_one(
    input: &Input,
    output: &Path,
    script: Option<&str>,
    format: OutputFormat,
    config: &EngineConfig,
) -> Result<u64, String> {
    // -- Step 1: Load ----------------------------------------------------
    let project = match input {
        Input::File(path) => {
            Project::open(path, config).map_err(|e| format!("load failed: {}", e))?
        }
        Input::Blank { width, height } => Project::new_untitled(1, *width, *height, config),
    };
    let mut app = EditorApp::new(project, config.clone());

    // -- Step 2: Replay script (optional) --------------------------------
    let mut ticks = 0;
    if let Some(src) = script {
        app.submit_script(src)
            .map_err(|e| format!("script error: {}", e))?;
        ticks = app.run_until_idle(MAX_TICKS);
        if !app.is_idle() {
            return Err(format!("script did not finish within {} ticks", MAX_TICKS));
        }
    }

    // -- Step 3: Save ----------------------------------------------------
    match format {
        OutputFormat::Project => app
            .project
            .save_as(output)
            .map_err(|e| format!("project save failed: {}", e))?,
        OutputFormat::Png => app
            .project
            .export_png(output)
            .map_err(|e| format!("PNG export failed: {}", e))?,
    }
    Ok(ticks)
}

// ============================================================================
// Helpers
// ============================================================================

/// Parse `new:WxH`.
fn parse_blank(spec: &str) -> Option<Result<Input, String>> {
    let dims = spec.strip_prefix("new:")?;
    let Some((w, h)) = dims.split_once(['x', 'X']) else {
        return Some(Err(format!("'{}' is not of the form new:WxH", spec)));
    };
    let max = crate::canvas::MAX_CANVAS_DIM;
    Some(
        parse_numeric_field(w, 1, max)
            .and_then(|width| parse_numeric_field(h, 1, max).map(|height| (width, height)))
            .map(|(width, height)| Input::Blank { width, height })
            .map_err(|e| format!("'{}': {}", spec, e)),
    )
}

/// Expand glob patterns, literal paths and `new:WxH` into a deduplicated,
/// ordered list.
fn resolve_inputs(patterns: &[String]) -> Result<Vec<Input>, String> {
    let mut result: Vec<Input> = Vec::new();
    let push = |input: Input, result: &mut Vec<Input>| {
        if !result.contains(&input) {
            result.push(input);
        }
    };

    for pattern in patterns {
        if let Some(blank) = parse_blank(pattern) {
            result.push(blank?);
            continue;
        }

        let as_path = Path::new(pattern);
        if as_path.exists() {
            push(Input::File(as_path.to_path_buf()), &mut result);
            continue;
        }

        match glob::glob(pattern) {
            Ok(entries) => {
                let mut matched = false;
                for entry in entries.flatten() {
                    push(Input::File(entry), &mut result);
                    matched = true;
                }
                if !matched {
                    eprintln!("warning: pattern '{}' matched no files.", pattern);
                }
            }
            Err(e) => {
                eprintln!("warning: invalid glob '{}': {}", pattern, e);
            }
        }
    }

    Ok(result)
}

/// Choose the output format from `--format` or the output file extension.
fn parse_format(format_arg: Option<&str>, output: Option<&Path>) -> OutputFormat {
    let from_name = |s: &str| match s.to_lowercase().as_str() {
        "png" => OutputFormat::Png,
        _ => OutputFormat::Project,
    };
    if let Some(f) = format_arg {
        return from_name(f);
    }
    output
        .and_then(|out| out.extension())
        .and_then(|e| e.to_str())
        .map(from_name)
        .unwrap_or(OutputFormat::Project)
}

/// Compute the output path for one input.
///
/// Priority:
/// 1. `--output` (explicit path, used for single input)
/// 2. `--output-dir` (batch directory, derives filename from input stem)
/// 3. Fallback: next to the input, with `_out` appended if it would
///    overwrite the input
fn build_output_path(
    input: &Input,
    output: Option<&Path>,
    output_dir: Option<&Path>,
    format: OutputFormat,
) -> Option<PathBuf> {
    if let Some(out) = output {
        return Some(out.to_path_buf());
    }

    let ext = format.extension();
    let (stem, parent) = match input {
        Input::File(p) => (
            p.file_stem()?.to_string_lossy().into_owned(),
            p.parent().unwrap_or(Path::new(".")).to_path_buf(),
        ),
        Input::Blank { width, height } => {
            (format!("untitled_{}x{}", width, height), PathBuf::from("."))
        }
    };

    if let Some(dir) = output_dir {
        return Some(dir.join(format!("{}.{}", stem, ext)));
    }

    let candidate = parent.join(format!("{}.{}", stem, ext));
    if matches!(input, Input::File(p) if *p == candidate) {
        Some(parent.join(format!("{}_out.{}", stem, ext)))
    } else {
        Some(candidate)
    }
}
