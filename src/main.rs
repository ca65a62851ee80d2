//! `repro` command-line tool
//!
//! The API key is read from the environment only; no flag accepts it.

use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process;

use repro_verify::config::{manifest_overrides, EffectiveConfig};
use repro_verify::figures::{FigureExtractor, FigurePlan};
use repro_verify::manifest::{verify_tree, BuildOptions, Manifest};
use repro_verify::package::{package_dataset, PackageOptions};
use repro_verify::verifier::{ApiVerifier, Credential, HttpTransport};
use repro_verify::{logging, ExitCode};

#[derive(Parser)]
#[command(name = "repro")]
#[command(about = "Reproducibility verification for the compression API report", version)]
struct Cli {
    /// Debug-level diagnostics on stderr (overridden by RUST_LOG)
    #[arg(long, short = 'v', global = true)]
    verbose: bool,

    /// Config file (default: ./repro.toml if present)
    #[arg(long, short = 'c', global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Smoke-test the remote API with real dataset vectors
    ///
    /// The API key is taken from the environment variable named by
    /// `verifier.api_key_env` (default AQEA_API_KEY).
    VerifyApi {
        #[arg(long)]
        base_url: Option<String>,

        /// AQED dataset export used for real-data sampling
        #[arg(long)]
        data_url: Option<String>,

        /// Number of vectors to sample
        #[arg(long)]
        sample: Option<usize>,

        /// Per-request timeout in seconds
        #[arg(long)]
        timeout_s: Option<u64>,

        /// Also run the optional quantized-compression check
        #[arg(long)]
        pq: bool,

        /// Print the report as JSON instead of progress lines
        #[arg(long)]
        json: bool,
    },

    /// Build or verify checksum manifests
    Manifest {
        #[command(subcommand)]
        action: ManifestCommands,
    },

    /// Extract series and render figures from a TOML figure plan
    Figures {
        plan: PathBuf,

        /// Artifact root the plan's source paths are relative to
        #[arg(long)]
        root: PathBuf,

        /// Output directory for SVGs and figures_data.json
        #[arg(long)]
        out: PathBuf,

        /// Only accept sources recorded in this manifest
        #[arg(long)]
        manifest: Option<PathBuf>,

        #[arg(long)]
        json: bool,
    },

    /// Assemble the dataset package and seal it with a manifest
    Package {
        #[arg(long)]
        source: PathBuf,

        /// Dataset card copied to README.md
        #[arg(long)]
        card: PathBuf,

        #[arg(long)]
        out: PathBuf,

        /// Dataset file name (repeatable; default: the published pair files)
        #[arg(long = "file")]
        files: Vec<String>,

        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
enum ManifestCommands {
    /// Write a manifest for an artifact tree
    Build {
        root: PathBuf,

        /// Output file (default: <ROOT>/<manifest.file_name>)
        #[arg(long)]
        out: Option<PathBuf>,

        /// Print the JSON rendition (with byte lengths) to stdout
        #[arg(long)]
        json: bool,

        /// Relative path that must be present (repeatable)
        #[arg(long = "require")]
        require: Vec<String>,

        /// Glob excluded from the scan (repeatable)
        #[arg(long = "exclude")]
        exclude: Vec<String>,
    },

    /// Rescan a tree and report added, removed and changed paths
    Verify {
        root: PathBuf,

        /// Manifest to compare against (default: <ROOT>/<manifest.file_name>)
        #[arg(long)]
        manifest: Option<PathBuf>,

        #[arg(long)]
        json: bool,

        /// Relative path that must be present (repeatable; same as at build time)
        #[arg(long = "require")]
        require: Vec<String>,

        /// Glob excluded from the scan (repeatable; same as at build time)
        #[arg(long = "exclude")]
        exclude: Vec<String>,
    },
}

fn main() {
    let cli = Cli::parse();
    logging::init(cli.verbose);

    let code = match cli.command {
        Commands::VerifyApi {
            base_url,
            data_url,
            sample,
            timeout_s,
            pq,
            json,
        } => {
            let mut verifier = serde_json::Map::new();
            if let Some(v) = base_url {
                verifier.insert("base_url".into(), v.into());
            }
            if let Some(v) = data_url {
                verifier.insert("data_url".into(), v.into());
            }
            if let Some(v) = sample {
                verifier.insert("sample".into(), v.into());
            }
            if let Some(v) = timeout_s {
                verifier.insert("timeout_s".into(), v.into());
            }
            if pq {
                verifier.insert("quantized_check".into(), true.into());
            }
            let overrides = serde_json::json!({ "verifier": verifier });
            run_verify_api(cli.config.as_deref(), overrides, json)
        }
        Commands::Manifest { action } => match action {
            ManifestCommands::Build {
                root,
                out,
                json,
                require,
                exclude,
            } => {
                let overrides = manifest_overrides(&require, &exclude);
                run_manifest_build(cli.config.as_deref(), overrides, &root, out, json)
            }
            ManifestCommands::Verify {
                root,
                manifest,
                json,
                require,
                exclude,
            } => {
                let overrides = manifest_overrides(&require, &exclude);
                run_manifest_verify(cli.config.as_deref(), overrides, &root, manifest, json)
            }
        },
        Commands::Figures {
            plan,
            root,
            out,
            manifest,
            json,
        } => run_figures(&plan, &root, &out, manifest, json),
        Commands::Package {
            source,
            card,
            out,
            files,
            json,
        } => run_package(PackageOptions::new(source, card, out).with_files(files), json),
    };

    process::exit(code.as_i32());
}

fn load_config(path: Option<&Path>, overrides: serde_json::Value) -> Result<EffectiveConfig, ExitCode> {
    EffectiveConfig::discover(path, Some(overrides)).map_err(|e| {
        eprintln!("Configuration error: {}", e);
        e.exit_code()
    })
}

fn print_json<T: serde::Serialize>(value: &T) -> ExitCode {
    match serde_json::to_string_pretty(value) {
        Ok(json) => {
            println!("{}", json);
            ExitCode::Success
        }
        Err(e) => {
            eprintln!("Error serializing output: {}", e);
            ExitCode::Io
        }
    }
}

fn run_verify_api(config_path: Option<&Path>, overrides: serde_json::Value, json: bool) -> ExitCode {
    let config = match load_config(config_path, overrides) {
        Ok(c) => c,
        Err(code) => return code,
    };
    let options = match config.verifier_options() {
        Ok(o) => o,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            return e.exit_code();
        }
    };
    let transport = match HttpTransport::new(config.request_timeout()) {
        Ok(t) => t,
        Err(e) => {
            eprintln!("Error creating HTTP client: {}", e);
            return ExitCode::Io;
        }
    };

    let credential = Credential::from_env(&options.api_key_env);
    let verifier = ApiVerifier::new(transport, options);
    let report = if json {
        verifier.run(credential.as_ref())
    } else {
        verifier.run_with(credential.as_ref(), |outcome| println!("{}", outcome.progress_line()))
    };

    if json {
        let code = print_json(&report);
        if !code.is_success() {
            return code;
        }
    } else {
        println!("{}", report.summary_line());
    }
    report.exit_code_enum()
}

/// Relative path of `file` under `root`, if it lies inside it
fn relative_inside(root: &Path, file: &Path) -> Option<String> {
    let root = root.canonicalize().ok()?;
    let parent = file.parent().filter(|p| !p.as_os_str().is_empty()).unwrap_or(Path::new("."));
    let parent = parent.canonicalize().ok()?;
    let rel = parent.strip_prefix(&root).ok()?.join(file.file_name()?);
    Some(rel.to_string_lossy().replace('\\', "/"))
}

fn manifest_options(config: &EffectiveConfig, extra_exclude: Option<String>) -> Result<BuildOptions, ExitCode> {
    let mut options = config.manifest_options().map_err(|e| {
        eprintln!("Configuration error: {}", e);
        e.exit_code()
    })?;
    if let Some(pattern) = extra_exclude {
        options.exclude = options.exclude.with_patterns(&[pattern]).map_err(|e| {
            eprintln!("Configuration error: {}", e);
            ExitCode::Usage
        })?;
    }
    Ok(options)
}

fn run_manifest_build(
    config_path: Option<&Path>,
    overrides: serde_json::Value,
    root: &Path,
    out: Option<PathBuf>,
    json: bool,
) -> ExitCode {
    let config = match load_config(config_path, overrides) {
        Ok(c) => c,
        Err(code) => return code,
    };
    let out = out.unwrap_or_else(|| root.join(&config.config.manifest.file_name));
    let options = match manifest_options(&config, relative_inside(root, &out)) {
        Ok(o) => o,
        Err(code) => return code,
    };

    let manifest = match Manifest::build(root, &options) {
        Ok(m) => m,
        Err(e) => {
            eprintln!("Manifest error: {}", e);
            return ExitCode::from(&e);
        }
    };
    if let Err(e) = manifest.write_to_file(&out) {
        eprintln!("Error writing {}: {}", out.display(), e);
        return ExitCode::Io;
    }

    if json {
        print_json(&manifest)
    } else {
        println!("Wrote {} record(s) to: {}", manifest.len(), out.display());
        println!("manifest sha256:{}", manifest.manifest_sha256);
        ExitCode::Success
    }
}

fn run_manifest_verify(
    config_path: Option<&Path>,
    overrides: serde_json::Value,
    root: &Path,
    manifest: Option<PathBuf>,
    json: bool,
) -> ExitCode {
    let config = match load_config(config_path, overrides) {
        Ok(c) => c,
        Err(code) => return code,
    };
    let path = manifest.unwrap_or_else(|| root.join(&config.config.manifest.file_name));
    let options = match manifest_options(&config, relative_inside(root, &path)) {
        Ok(o) => o,
        Err(code) => return code,
    };

    let expected = match Manifest::from_file(&path) {
        Ok(m) => m,
        Err(e) => {
            eprintln!("Error reading manifest {}: {}", path.display(), e);
            return ExitCode::from(&e);
        }
    };
    let report = match verify_tree(root, &expected, &options) {
        Ok(r) => r,
        Err(e) => {
            eprintln!("Manifest error: {}", e);
            return ExitCode::from(&e);
        }
    };

    if json {
        let code = print_json(&report);
        if !code.is_success() {
            return code;
        }
    } else {
        print!("{}", report);
        if report.is_match() {
            println!();
        }
    }
    if report.is_match() {
        ExitCode::Success
    } else {
        ExitCode::VerificationFailed
    }
}

fn run_figures(plan_path: &Path, root: &Path, out: &Path, manifest: Option<PathBuf>, json: bool) -> ExitCode {
    let plan = match FigurePlan::from_file(plan_path) {
        Ok(p) => p,
        Err(e) => {
            eprintln!("Figure plan error: {}", e);
            return ExitCode::Usage;
        }
    };
    let manifest = match manifest.map(|p| Manifest::from_file(&p)).transpose() {
        Ok(m) => m,
        Err(e) => {
            eprintln!("Error reading manifest: {}", e);
            return ExitCode::from(&e);
        }
    };

    let mut extractor = FigureExtractor::new(root);
    if let Some(m) = &manifest {
        extractor = extractor.with_manifest(m);
    }
    let report = match extractor.run(&plan, out) {
        Ok(r) => r,
        Err(e) => {
            eprintln!("Figure error: {}", e);
            return ExitCode::Io;
        }
    };

    if json {
        let code = print_json(&report);
        if !code.is_success() {
            return code;
        }
    } else {
        for outcome in &report.outcomes {
            println!("{}", outcome.progress_line());
        }
        println!("Data: {}", report.data_path);
    }
    report.exit_code()
}

fn run_package(options: PackageOptions, json: bool) -> ExitCode {
    match package_dataset(&options) {
        Ok(summary) => {
            if json {
                print_json(&summary)
            } else {
                for line in summary.lines() {
                    println!("{}", line);
                }
                ExitCode::Success
            }
        }
        Err(e) => {
            eprintln!("Package error: {}", e);
            e.exit_code()
        }
    }
}
