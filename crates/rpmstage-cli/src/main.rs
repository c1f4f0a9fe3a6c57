use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{bail, Result};
use clap::Parser;
use rpmstage_core::ProgressEmitter;
use rpmstage_engine::{run, RunOutcome, RunRequest, DEFAULT_INSTALL_ROOT, DEFAULT_SCRIPT_LOG};

#[derive(Parser, Debug)]
#[command(name = "rpmstage")]
#[command(
    about = "Execute a precomputed package transaction inside an install root",
    long_about = None
)]
struct Cli {
    #[arg(long)]
    arch: String,
    #[arg(long)]
    config: PathBuf,
    #[arg(long)]
    plan: PathBuf,
    #[arg(long)]
    releasever: String,
    #[arg(long, default_value = DEFAULT_INSTALL_ROOT)]
    installroot: PathBuf,
    #[arg(long, default_value = DEFAULT_SCRIPT_LOG)]
    scriptlog: PathBuf,
    #[arg(long)]
    test: bool,
    #[arg(long)]
    debug: bool,
    #[arg(long = "enableplugin", value_name = "PLUGIN")]
    plugins: Vec<String>,
    #[arg(long = "macro", num_args = 2, value_names = ["NAME", "VALUE"])]
    macros: Vec<String>,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let debug = cli.debug;

    let request = match build_request(cli) {
        Ok(request) => request,
        Err(err) => {
            let mut emitter = ProgressEmitter::new(std::io::stdout(), debug);
            let _ = emitter.error(&format!("{err:#}"));
            let _ = emitter.quit();
            return ExitCode::FAILURE;
        }
    };

    let mut emitter = ProgressEmitter::new(std::io::stdout(), request.debug);
    match run(&request, &mut emitter) {
        RunOutcome::Done => ExitCode::SUCCESS,
        RunOutcome::Failed => ExitCode::FAILURE,
    }
}

fn build_request(cli: Cli) -> Result<RunRequest> {
    Ok(RunRequest {
        target_arch: cli.arch,
        config_path: cli.config,
        plan_path: cli.plan,
        releasever: cli.releasever,
        install_root: cli.installroot,
        script_log_path: cli.scriptlog,
        dry_run: cli.test,
        debug: cli.debug,
        plugins: cli.plugins,
        macros: pair_macros(&cli.macros)?,
    })
}

fn pair_macros(values: &[String]) -> Result<Vec<(String, String)>> {
    if values.len() % 2 != 0 {
        bail!("--macro requires NAME VALUE pairs");
    }
    Ok(values
        .chunks(2)
        .map(|pair| (pair[0].clone(), pair[1].clone()))
        .collect())
}
