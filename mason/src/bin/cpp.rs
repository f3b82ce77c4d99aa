//! Builds a small C++ program from `src/*.cpp` into `objects/` and links `main`.

use std::path::Path;

use anyhow::Context;
use mason::{
    functions::{echo, mkdirs, rm, shell},
    init_logging, run, Config,
};
use mason_build::{Engine, Rule, Spec, Value};

const FLAGS: &str = "-O2 -Wall";
const FLAGS_FILE: &str = "objects/flags";

fn describe(engine: &mut Engine) -> anyhow::Result<()> {
    engine.rule(Rule::new(Spec::target("sources")).action(|_, _, _| {
        Ok(shell(&["find src -name '*.cpp' -o -name '*.h'"])?.into())
    }));

    // source names into the matching object files.
    engine.rule(
        Rule::new(Spec::target("objects"))
            .needs(Spec::target("sources"))
            .action(|_, inputs, _| {
                let objects: Vec<String> = inputs[0]
                    .texts()
                    .into_iter()
                    .filter_map(|s| s.strip_prefix("src/")?.strip_suffix(".cpp"))
                    .map(|stem| format!("objects/{}.o", stem))
                    .collect();
                Ok(objects.into())
            }),
    );

    // Rewritten only when the flags change, so objects rebuild exactly then.
    engine.rule(Rule::new(FLAGS_FILE).action(|_, _, _| {
        let current = std::fs::read_to_string(FLAGS_FILE).unwrap_or_default();
        if current != FLAGS {
            mkdirs(&["objects"])?;
            std::fs::write(FLAGS_FILE, FLAGS).context("writing compiler flags")?;
        }
        Ok(Value::from(FLAGS_FILE))
    }));
    engine.depends(Spec::from("objects/%.o"), vec![Spec::from(FLAGS_FILE)]);

    engine.rule(
        Rule::new("objects/%.o")
            .needs("src/{1}.cpp")
            .action(|product, inputs, _| {
                let object = product.to_string();
                if let Some(dir) = Path::new(&object).parent() {
                    mkdirs(&[dir])?;
                }
                let source = inputs[0].as_text().context("source path")?;
                echo(&["Compiling", object.as_str()])?;
                shell(&["g++", FLAGS, "-c", "-o", object.as_str(), source])?;
                Ok(Value::Text(object))
            }),
    );

    // the product of :objects names the object files to link.
    engine.rule(
        Rule::new("main")
            .needs(Spec::make(Spec::target("objects")))
            .action(|_, inputs, _| {
                let objects = Value::List(inputs.to_vec());
                let objects = objects.texts().join(" ");
                echo(&["Linking", objects.as_str()])?;
                shell(&["g++", "-o", "main", objects.as_str()])?;
                Ok(Value::from("main"))
            }),
    );

    engine.rule(
        Rule::new(Spec::target("all"))
            .needs("main")
            .action(|_, inputs, _| {
                let main = inputs[0].as_text().context("executable path")?;
                let exe = format!("./{}", main);
                Ok(shell(&[exe.as_str(), "'Hello, World'"])?.into())
            }),
    );

    engine.rule(
        Rule::new(Spec::target("clean"))
            .needs(Spec::target("objects"))
            .action(|_, inputs, _| {
                rm(&inputs[0].texts())?;
                rm(&["main", "objects"])?;
                Ok(Value::Nil)
            }),
    );
    Ok(())
}

fn main() -> anyhow::Result<()> {
    let config = Config::from_args()?;
    init_logging(config.verbose);
    run(config, describe)
}
