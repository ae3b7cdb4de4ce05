use clap::Parser;
use error_set::error_set;
use sf_delta::{DeltaPackager, DescriptorPolicy, PackageOptions};
use std::io::IsTerminal;
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "sf-delta")]
#[command(about = "Build incremental Salesforce deployment packages from git diffs")]
#[command(version)]
struct Cli {
    /// Baseline revision the package deploys against
    #[arg(short, long, default_value = "master")]
    target: String,

    /// Revision to package (defaults to the working copy)
    #[arg(short, long)]
    source: Option<String>,

    /// Destination directory for the converted package
    #[arg(short, long)]
    output: PathBuf,

    /// Drop files whose content changed only in whitespace
    #[arg(long)]
    ignore_whitespace: bool,

    /// Empty a populated output directory instead of prompting
    #[arg(long)]
    purge: bool,

    /// Report removals but skip the destructiveChanges.xml artifact
    #[arg(long)]
    skip_deletions: bool,

    /// Package even when the source revision is behind the target
    #[arg(long)]
    force: bool,

    /// Count bundle descriptors only when they exist at the revision
    #[arg(long)]
    probe_descriptors: bool,
}

error_set! {
    /// Errors from preparing the output directory
    OutputError := {
        #[display("Output directory {dir} already contains files; pass --purge or choose interactively")]
        Conflict { dir: String },
        #[display("Aborted; output directory {dir} left untouched")]
        Aborted { dir: String },
        #[display("Failed to purge {dir}: {message}")]
        PurgeFailed { dir: String, message: String },
        #[display("Failed to prepare {dir}: {message}")]
        PrepareFailed { dir: String, message: String },
        #[display("Prompt failed: {message}")]
        PromptFailed { message: String },
    }
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let cli = Cli::parse();
    if let Err(e) = run(cli) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    prepare_output(&cli.output, cli.purge)?;

    let current_dir = std::env::current_dir()?;
    let packager = DeltaPackager::discover(&current_dir)?;

    let opts = PackageOptions {
        target: cli.target,
        source: cli.source,
        output: cli.output,
        ignore_whitespace: cli.ignore_whitespace,
        skip_deletions: cli.skip_deletions,
        force: cli.force,
        descriptor_policy: if cli.probe_descriptors {
            DescriptorPolicy::Probe
        } else {
            DescriptorPolicy::Unconditional
        },
    };

    let plan = packager.plan(&opts)?;
    print!("{}", plan);

    let summary = packager.package(&plan, &opts)?;
    println!(
        "Packaged {} changed file(s) into {}",
        summary.changed,
        opts.output.display()
    );
    if summary.destructive {
        println!("Declared {} component removal(s)", summary.removed);
    }

    Ok(())
}

/// Resolve the state of the output directory before any packaging work.
///
/// A populated directory needs an explicit decision: `--purge`, an
/// interactive purge/merge/abort choice on a terminal, or an abort
/// otherwise. A failed purge is fatal.
fn prepare_output(dir: &Path, purge: bool) -> Result<(), OutputError> {
    let populated = match std::fs::read_dir(dir) {
        Ok(mut entries) => entries.next().is_some(),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            std::fs::create_dir_all(dir).map_err(|e| OutputError::PrepareFailed {
                dir: dir.display().to_string(),
                message: e.to_string(),
            })?;
            false
        }
        Err(e) => {
            return Err(OutputError::PrepareFailed {
                dir: dir.display().to_string(),
                message: e.to_string(),
            });
        }
    };

    if !populated {
        return Ok(());
    }

    if purge {
        return purge_dir(dir);
    }

    if !std::io::stdin().is_terminal() {
        return Err(OutputError::Conflict {
            dir: dir.display().to_string(),
        });
    }

    let choice = dialoguer::Select::new()
        .with_prompt(format!("Output directory {} is not empty", dir.display()))
        .items(&["Purge it", "Merge into it", "Abort"])
        .default(2)
        .interact()
        .map_err(|e| OutputError::PromptFailed {
            message: e.to_string(),
        })?;

    match choice {
        0 => purge_dir(dir),
        1 => Ok(()),
        _ => Err(OutputError::Aborted {
            dir: dir.display().to_string(),
        }),
    }
}

/// Remove everything inside `dir`, keeping the directory itself.
fn purge_dir(dir: &Path) -> Result<(), OutputError> {
    let fail = |e: std::io::Error| OutputError::PurgeFailed {
        dir: dir.display().to_string(),
        message: e.to_string(),
    };

    for entry in std::fs::read_dir(dir).map_err(fail)? {
        let entry = entry.map_err(fail)?;
        let path = entry.path();
        if entry.file_type().map_err(fail)?.is_dir() {
            std::fs::remove_dir_all(&path).map_err(fail)?;
        } else {
            std::fs::remove_file(&path).map_err(fail)?;
        }
    }
    Ok(())
}
