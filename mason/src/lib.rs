/*
 * Copyright 2020 Nikhil Marathe <nsm.nikhil@gmail.com>
 *
 * Licensed under the Apache License, Version 2.0 (the "License");
 * you may not use this file except in compliance with the License.
 * You may obtain a copy of the License at
 *
 *     http://www.apache.org/licenses/LICENSE-2.0
 *
 * Unless required by applicable law or agreed to in writing, software
 * distributed under the License is distributed on an "AS IS" BASIS,
 * WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 * See the License for the specific language governing permissions and
 * limitations under the License.
 */

use anyhow::{self, Context};
use console::style;
use thiserror::Error;
use tracing_subscriber::EnvFilter;

use mason_build::{Dependency, Engine};

pub mod architecture;
pub mod functions;

pub const USAGE: &str = "\
usage: mason [options] [targets...]

options:
  -C DIR   change to DIR before doing anything else
  -d MODE  enable debugging, repeatable:
             stats  print engine statistics after the build
             list   print the names of all rules
             graph  print the dependency graph in DOT format
  -v       show all log output
  -h       show this help
";

/// Log filter source. Falls back to `warn`, or `debug` with `-v`.
pub const LOG_ENV: &str = "MASON_LOG";

#[derive(Debug, PartialEq, Eq)]
pub enum DebugMode {
    List,
    Stats,
    Graph,
}

#[derive(Error, Debug)]
#[error("Unknown debug setting '{0}'")]
pub struct DebugModeError(String);

impl std::str::FromStr for DebugMode {
    type Err = DebugModeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "stats" => Ok(DebugMode::Stats),
            "list" => Ok(DebugMode::List),
            "graph" => Ok(DebugMode::Graph),
            e => Err(DebugModeError(e.to_owned())),
        }
    }
}

#[derive(Debug)]
pub struct Config {
    pub execution_dir: Option<String>,
    pub debug_modes: Vec<DebugMode>,
    pub verbose: bool,
    pub targets: Vec<String>,
}

impl Config {
    /// Parses the process arguments. Prints usage and exits for `-h`.
    pub fn from_args() -> anyhow::Result<Config> {
        let mut args = pico_args::Arguments::from_env();
        if args.contains(["-h", "--help"]) {
            print!("{}", USAGE);
            std::process::exit(0);
        }
        Config::from_arguments(args)
    }

    pub fn from_arguments(mut args: pico_args::Arguments) -> anyhow::Result<Config> {
        let execution_dir = args.opt_value_from_str("-C")?;
        let modes: Vec<String> = args.values_from_str("-d")?;
        let debug_modes = modes
            .iter()
            .map(|s| s.parse::<DebugMode>())
            .collect::<Result<Vec<_>, _>>()?;
        let verbose = args.contains("-v");
        let mut targets = args.free()?;
        if targets.is_empty() {
            targets.push("all".to_owned());
        }
        Ok(Config {
            execution_dir,
            debug_modes,
            verbose,
            targets,
        })
    }

    fn debug(&self, mode: DebugMode) -> bool {
        self.debug_modes.contains(&mode)
    }
}

/// Installs the global subscriber. Only the first call has any effect.
pub fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(default));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

/// Builds every requested target against the rules `describe` adds to a fresh engine.
pub fn run<F>(config: Config, describe: F) -> anyhow::Result<()>
where
    F: FnOnce(&mut Engine) -> anyhow::Result<()>,
{
    if let Some(dir) = &config.execution_dir {
        std::env::set_current_dir(&dir).with_context(|| format!("changing to {} for -C", &dir))?;
    }

    let mut engine = Engine::new();
    architecture::install(&mut engine);
    describe(&mut engine).context("adding rules")?;

    if config.debug(DebugMode::List) {
        for name in engine.rule_names() {
            println!("{}", name);
        }
    }

    for target in &config.targets {
        let value = engine
            .make(&Dependency::target(target.as_str()))
            .with_context(|| format!("making {}", target))?;
        tracing::info!(%target, %value, "made");
        println!("{} {}", style(format!(":{}", target)).bold(), value);
    }

    if config.debug(DebugMode::Graph) {
        println!("{}", engine.graph().to_dot());
    }
    if config.debug(DebugMode::Stats) {
        print!("{}", engine.metrics());
    }
    Ok(())
}
