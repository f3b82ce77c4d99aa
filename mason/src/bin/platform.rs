//! Platform-dependent rules. Each gated rule becomes available once its platform probe has run,
//! whether or not the probe succeeded.

use mason::{
    architecture::architecture,
    functions::{echo, touch, which},
    init_logging, run, Config,
};
use mason_build::{Engine, Rule, Spec, Value};

fn describe(engine: &mut Engine) -> anyhow::Result<()> {
    engine.rule(Rule::new(Spec::target("win32")).action(|_, _, _| {
        echo(&["The win32"])?;
        anyhow::bail!("Unsupported architecture")
    }));
    engine.rule(Rule::new(Spec::target("linux")).action(|_, _, _| {
        echo(&["The Linux"])?;
        Ok(Value::from("LINUX"))
    }));

    engine.gated_rule(
        "foo-linux",
        vec![Spec::target("linux")],
        Rule::new("foo").action(|_, _, _| {
            echo(&["Compiling for LINUX"])?;
            touch(&["foo"])?;
            Ok(Value::from("foo"))
        }),
    )?;
    engine.gated_rule(
        "foo-win32",
        vec![Spec::target("win32")],
        Rule::new("bar").action(|_, _, _| {
            echo(&["Compiling for WIN32"])?;
            touch(&["bar"])?;
            Ok(Value::from("bar"))
        }),
    )?;

    engine.rule(
        Rule::new(Spec::target("arch"))
            .needs(architecture())
            .action(|_, inputs, _| Ok(inputs[0].clone())),
    );

    engine.rule(Rule::new(Spec::target("compiler")).action(|_, _, _| {
        match which("gcc") {
            Ok(path) => Ok(Value::Text(path)),
            Err(_) => Ok(Value::Text(which("clang")?)),
        }
    }));

    engine.rule(
        Rule::new(Spec::target("all"))
            .needs("foo")
            .needs(Spec::target("arch"))
            .needs(Spec::optional(Spec::target("compiler")))
            .action(|_, inputs, _| {
                echo(&[inputs[0].to_string()])?;
                echo(&[inputs[1].to_string()])?;
                Ok(Value::List(inputs.to_vec()))
            }),
    );
    Ok(())
}

fn main() -> anyhow::Result<()> {
    let config = Config::from_args()?;
    init_logging(config.verbose);
    run(config, describe)
}
