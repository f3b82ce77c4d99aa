//! Probe of the host platform, available to every build as the `:architecture` target.

use std::{collections::BTreeMap, fmt};

use mason_build::{Dependency, Engine, Rule, Spec, Value};

use crate::functions::{shell, CommandResult};

pub const RULE_NAME: &str = "determine_architecture";
const TARGET: &str = "architecture";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Architecture {
    pub os: String,
    pub nodename: String,
    pub release: String,
    pub machine: String,
}

impl Architecture {
    /// Asks `uname`.
    pub fn determine() -> CommandResult<Architecture> {
        let uname = |flag: &str| -> CommandResult<String> { Ok(shell(&["uname", flag])?.concat()) };
        Ok(Architecture {
            os: uname("-o")?,
            nodename: uname("-n")?,
            release: uname("-r")?,
            machine: uname("-m")?,
        })
    }
}

impl fmt::Display for Architecture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Architecture(os={},nodename={},release={},machine={})",
            self.os, self.nodename, self.release, self.machine
        )
    }
}

impl From<Architecture> for Value {
    fn from(arch: Architecture) -> Self {
        let mut fields = BTreeMap::new();
        fields.insert("os".to_owned(), Value::Text(arch.os));
        fields.insert("nodename".to_owned(), Value::Text(arch.nodename));
        fields.insert("release".to_owned(), Value::Text(arch.release));
        fields.insert("machine".to_owned(), Value::Text(arch.machine));
        Value::Record(fields)
    }
}

/// The dependency whose product describes the host.
pub fn architecture() -> Dependency {
    Dependency::target(TARGET)
}

pub fn install(engine: &mut Engine) {
    engine.add_rule(
        RULE_NAME,
        Rule::new(Spec::target(TARGET)).action(|_, _, _| Ok(Architecture::determine()?.into())),
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_fields() {
        let arch = Architecture {
            os: "GNU/Linux".to_owned(),
            nodename: "builder".to_owned(),
            release: "6.1.0".to_owned(),
            machine: "x86_64".to_owned(),
        };
        assert_eq!(
            arch.to_string(),
            "Architecture(os=GNU/Linux,nodename=builder,release=6.1.0,machine=x86_64)"
        );
        let value = Value::from(arch);
        assert_eq!(value.field("machine"), Some(&Value::from("x86_64")));
        assert_eq!(value.field("os").and_then(Value::as_text), Some("GNU/Linux"));
        assert_eq!(value.field("cpu"), None);
    }

    #[test]
    fn probe_is_a_user_rule() {
        let mut engine = Engine::new();
        install(&mut engine);
        assert_eq!(engine.rule_names()[0], RULE_NAME);

        let value = engine.make(&architecture()).expect("uname works");
        let machine = value.field("machine").and_then(Value::as_text).expect("machine");
        assert!(!machine.is_empty());
        // memoized.
        assert_eq!(engine.value(&architecture()), Some(&value));
    }
}
