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

use std::{collections::HashSet, fmt::Display, path::Path};

use crate::{disk_interface::DiskInterface, error::MakeError, value::Value};

/// Identifies something the engine can produce or already has.
///
/// Used as the key of every table in the engine, so equality and hashing are purely structural.
#[derive(Debug, PartialOrd, Ord, Hash, Eq, PartialEq, Clone)]
pub enum Dependency {
    File(String),
    Target(String),
    /// Only used to gate dynamic rules.
    Rule(String),
    /// Resolve the wrapped dependency through a full `make` instead of a single rule application.
    Make(Box<Dependency>),
    /// Failure to produce the wrapped dependency is tolerated.
    Optional(Box<Dependency>),
    Composite(Vec<Dependency>),
}

impl Dependency {
    pub fn file<S: Into<String>>(path: S) -> Dependency {
        Dependency::File(path.into())
    }

    pub fn target<S: Into<String>>(name: S) -> Dependency {
        Dependency::Target(name.into())
    }

    pub fn rule<S: Into<String>>(name: S) -> Dependency {
        Dependency::Rule(name.into())
    }

    pub fn make(dependency: Dependency) -> Dependency {
        Dependency::Make(Box::new(dependency))
    }

    /// Optional dependencies never nest.
    pub fn optional(dependency: Dependency) -> Dependency {
        match dependency {
            Dependency::Optional(_) => dependency,
            other => Dependency::Optional(Box::new(other)),
        }
    }

    /// Duplicates are dropped here, keeping the first occurrence. `flatten` never de-duplicates.
    pub fn composite<I: IntoIterator<Item = Dependency>>(dependencies: I) -> Dependency {
        let mut seen = HashSet::new();
        Dependency::Composite(
            dependencies
                .into_iter()
                .filter(|d| seen.insert(d.clone()))
                .collect(),
        )
    }

    /// Converts a product back into the dependency it names.
    pub fn from_value(value: &Value) -> Result<Dependency, MakeError> {
        match value {
            Value::Text(path) => Ok(Dependency::file(path.as_str())),
            Value::Dependency(d) => Ok(d.clone()),
            Value::List(values) => Ok(Dependency::composite(
                values
                    .iter()
                    .map(Dependency::from_value)
                    .collect::<Result<Vec<_>, _>>()?,
            )),
            Value::Nil | Value::Record(_) => Err(MakeError::InvalidProduct(value.to_string())),
        }
    }

    pub fn is_file(&self) -> bool {
        matches!(self, Dependency::File(_))
    }

    pub fn is_composite(&self) -> bool {
        matches!(self, Dependency::Composite(_))
    }

    pub fn path(&self) -> Option<&Path> {
        match self {
            Dependency::File(ref path) => Some(Path::new(path)),
            _ => None,
        }
    }

    /// The dependency behind a wrapper, or `self` for anything else.
    pub fn unwrapped(&self) -> &Dependency {
        match self {
            Dependency::Make(ref d) | Dependency::Optional(ref d) => d,
            other => other,
        }
    }

    pub fn flatten(&self) -> Vec<Dependency> {
        let mut flat = Vec::new();
        self.flatten_into(&mut flat);
        flat
    }

    fn flatten_into(&self, flat: &mut Vec<Dependency>) {
        match self {
            Dependency::Composite(ref dependencies) => {
                for d in dependencies {
                    d.flatten_into(flat);
                }
            }
            other => flat.push(other.clone()),
        }
    }

    /// `None` means the answer is unknown. Only files that both exist can be compared.
    pub fn is_newer_than(&self, other: &Dependency, disk: &dyn DiskInterface) -> Option<bool> {
        match (self, other) {
            (Dependency::File(ref mine), Dependency::File(ref theirs)) => {
                let mine = disk.modified(Path::new(mine)).ok()?;
                let theirs = disk.modified(Path::new(theirs)).ok()?;
                Some(mine > theirs)
            }
            _ => None,
        }
    }

    /// The value this dependency already has without running anything, e.g. an existing file.
    pub fn existing_product(&self, disk: &dyn DiskInterface) -> Option<Value> {
        match self {
            Dependency::File(ref path) if disk.exists(Path::new(path)) => {
                Some(Value::Text(path.clone()))
            }
            Dependency::Optional(ref d) => d.existing_product(disk),
            _ => None,
        }
    }

    /// True if `product` has to be rebuilt given the dependencies it needs.
    ///
    /// A need whose age cannot be determined counts as newer, and a product with no needs at all
    /// is always considered out of date.
    pub fn is_older_than(product: &Dependency, needs: &[Dependency], disk: &dyn DiskInterface) -> bool {
        let product = match product {
            Dependency::Optional(ref d) => d,
            other => other,
        };
        let needs = Dependency::composite(needs.iter().cloned()).flatten();
        if needs.is_empty() {
            tracing::debug!(%product, "product has no needs, rebuilding");
            return true;
        }
        for need in &needs {
            let need = match need {
                Dependency::Optional(ref d) => d,
                other => other,
            };
            match need.is_newer_than(product, disk) {
                Some(false) => continue,
                Some(true) => {
                    tracing::debug!(%product, %need, "product is older than need");
                    return true;
                }
                None => {
                    tracing::debug!(%product, %need, "cannot compare ages, rebuilding");
                    return true;
                }
            }
        }
        false
    }
}

impl Display for Dependency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Dependency::File(path) => write!(f, "{}", path),
            Dependency::Target(name) => write!(f, ":{}", name),
            Dependency::Rule(name) => write!(f, "rule({})", name),
            Dependency::Make(d) => write!(f, "make({})", d),
            Dependency::Optional(d) => write!(f, "+{}", d),
            Dependency::Composite(ds) => {
                write!(f, "[")?;
                for (i, d) in ds.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", d)?;
                }
                write!(f, "]")
            }
        }
    }
}

impl From<&str> for Dependency {
    fn from(path: &str) -> Self {
        Dependency::file(path)
    }
}

impl From<String> for Dependency {
    fn from(path: String) -> Self {
        Dependency::File(path)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::disk_interface::MapDiskInterface;
    use insta::assert_snapshot;
    use std::{
        collections::hash_map::DefaultHasher,
        hash::{Hash, Hasher},
        time::{Duration, SystemTime},
    };

    fn hash_of(d: &Dependency) -> u64 {
        let mut hasher = DefaultHasher::new();
        d.hash(&mut hasher);
        hasher.finish()
    }

    #[test]
    fn equality_is_structural() {
        assert_eq!(Dependency::file("a.c"), Dependency::from("a.c"));
        assert_ne!(Dependency::file("a"), Dependency::target("a"));
        assert_ne!(Dependency::target("a"), Dependency::rule("a"));
        assert_eq!(
            Dependency::make(Dependency::target("x")),
            Dependency::make(Dependency::target("x"))
        );
        assert_ne!(
            Dependency::make(Dependency::target("x")),
            Dependency::optional(Dependency::target("x"))
        );
        assert_eq!(
            hash_of(&Dependency::composite(vec!["a".into(), "b".into()])),
            hash_of(&Dependency::composite(vec!["a".into(), "b".into()]))
        );
    }

    #[test]
    fn optional_does_not_nest() {
        let once = Dependency::optional(Dependency::target("t"));
        let twice = Dependency::optional(once.clone());
        assert_eq!(once, twice);
    }

    #[test]
    fn composite_dedups_at_construction_only() {
        let inner = Dependency::composite(vec!["b".into(), "a".into()]);
        let outer = Dependency::composite(vec!["a".into(), inner, "a".into()]);
        if let Dependency::Composite(ref ds) = outer {
            assert_eq!(ds.len(), 2);
        } else {
            panic!("Expected composite");
        }
        let flat = outer.flatten();
        assert_eq!(
            flat,
            vec![Dependency::file("a"), Dependency::file("b"), Dependency::file("a")]
        );
    }

    #[test]
    fn flatten_nested() {
        let d = Dependency::composite(vec![
            "A".into(),
            Dependency::composite(vec![
                "B".into(),
                Dependency::composite(vec!["C".into(), "D".into()]),
            ]),
            "E".into(),
        ]);
        let names: Vec<String> = d.flatten().iter().map(|d| d.to_string()).collect();
        assert_eq!(names, vec!["A", "B", "C", "D", "E"]);
    }

    #[test]
    fn display() {
        let d = Dependency::composite(vec![
            Dependency::file("main.o"),
            Dependency::target("all"),
            Dependency::optional(Dependency::rule("gcc")),
            Dependency::make(Dependency::target("objects")),
        ]);
        assert_snapshot!(d.to_string(), @"[main.o, :all, +rule(gcc), make(:objects)]");
    }

    #[test]
    fn from_value() {
        let value = Value::List(vec![
            Value::Text("a.o".to_owned()),
            Value::Text("b.o".to_owned()),
            Value::Text("a.o".to_owned()),
        ]);
        assert_eq!(
            Dependency::from_value(&value).expect("valid"),
            Dependency::Composite(vec!["a.o".into(), "b.o".into()])
        );
        assert!(matches!(
            Dependency::from_value(&Value::Nil),
            Err(MakeError::InvalidProduct(_))
        ));
    }

    #[test]
    fn newer_than_needs_both_files() {
        let disk = MapDiskInterface::default();
        let now = SystemTime::now();
        disk.touch("new", now);
        disk.touch("old", now - Duration::from_secs(10));
        let new = Dependency::file("new");
        let old = Dependency::file("old");
        assert_eq!(new.is_newer_than(&old, &disk), Some(true));
        assert_eq!(old.is_newer_than(&new, &disk), Some(false));
        assert_eq!(new.is_newer_than(&Dependency::file("missing"), &disk), None);
        assert_eq!(new.is_newer_than(&Dependency::target("new"), &disk), None);
    }

    #[test]
    fn older_than() {
        let disk = MapDiskInterface::default();
        let now = SystemTime::now();
        disk.touch("foo.o", now);
        disk.touch("foo.c", now - Duration::from_secs(10));
        disk.touch("foo.h", now + Duration::from_secs(10));
        let product = Dependency::file("foo.o");
        assert!(!Dependency::is_older_than(&product, &["foo.c".into()], &disk));
        assert!(Dependency::is_older_than(
            &product,
            &["foo.c".into(), "foo.h".into()],
            &disk
        ));
        assert!(Dependency::is_older_than(&product, &[], &disk));
        assert!(Dependency::is_older_than(
            &product,
            &[Dependency::target("x")],
            &disk
        ));
        // optional wrappers are looked through on both sides.
        assert!(!Dependency::is_older_than(
            &Dependency::optional(product.clone()),
            &[Dependency::optional("foo.c".into())],
            &disk
        ));
    }

    #[test]
    fn existing_product() {
        let disk = MapDiskInterface::default();
        disk.touch("there", SystemTime::now());
        assert_eq!(
            Dependency::file("there").existing_product(&disk),
            Some(Value::Text("there".to_owned()))
        );
        assert_eq!(Dependency::file("gone").existing_product(&disk), None);
        assert_eq!(Dependency::target("there").existing_product(&disk), None);
    }
}
