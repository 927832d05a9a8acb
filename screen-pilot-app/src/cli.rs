//! Command-line parsing.

use anyhow::{bail, Result};
use std::path::PathBuf;

pub const USAGE: &str = "\
Usage:
  screen-pilot run <instruction> [options]
  screen-pilot help

Options:
  -c, --config <path>    Agent config (YAML)
  --summarize            Summarize the run once it ends
  --physical-pointer     Send physical pixel coordinates to the pointer
  --log-level <level>    Log filter when RUST_LOG is unset (default: info)

Environment:
  SCREEN_PILOT_BASE_URL, SCREEN_PILOT_API_KEY, SCREEN_PILOT_MODEL";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Run(RunArgs),
    Help,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunArgs {
    pub instruction: String,
    pub config: Option<PathBuf>,
    pub summarize: bool,
    pub physical_pointer: bool,
    pub log_level: Option<String>,
}

/// Parse arguments after the program name.
pub fn parse_args(args: &[String]) -> Result<Command> {
    let Some((command, rest)) = args.split_first() else {
        return Ok(Command::Help);
    };

    match command.as_str() {
        "run" => parse_run(rest).map(Command::Run),
        "help" | "--help" | "-h" => Ok(Command::Help),
        other => bail!("Unknown command: {}", other),
    }
}

fn parse_run(args: &[String]) -> Result<RunArgs> {
    let mut run = RunArgs::default();
    let mut words = Vec::new();
    let mut iter = args.iter();

    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "-c" | "--config" => match iter.next() {
                Some(path) => run.config = Some(PathBuf::from(path)),
                None => bail!("{} requires a path", arg),
            },
            "--log-level" => match iter.next() {
                Some(level) => run.log_level = Some(level.clone()),
                None => bail!("--log-level requires a value"),
            },
            "--summarize" => run.summarize = true,
            "--physical-pointer" => run.physical_pointer = true,
            flag if flag.starts_with("--") => bail!("Unknown option: {}", flag),
            word => words.push(word),
        }
    }

    run.instruction = words.join(" ").trim().to_string();
    if run.instruction.is_empty() {
        bail!("run requires an instruction");
    }
    Ok(run)
}
