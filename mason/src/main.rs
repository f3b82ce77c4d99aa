use mason::{init_logging, run, Config};

/// Without a build description only the builtin rules and the architecture probe are available,
/// e.g. `mason architecture` or `mason some/file`.
fn main() -> anyhow::Result<()> {
    let config = Config::from_args()?;
    init_logging(config.verbose);
    run(config, |_| Ok(()))
}
