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

//! Dependency-graph build engine.
//!
//! Rules declare a product [`Spec`] and the specs of the inputs they need. Given a requested
//! [`Dependency`], the [`Engine`] finds the one rule that can produce it, resolves the full
//! transitive input graph, decides which nodes are stale and runs exactly the needed actions,
//! memoizing every product for the rest of the run.

pub mod dependency;
pub mod disk_interface;
pub mod engine;
pub mod error;
pub mod graph;
pub mod metrics;
pub mod rule;
pub mod spec;
pub mod value;


pub use dependency::Dependency;
pub use disk_interface::{DiskInterface, MapDiskInterface, SystemDiskInterface};
pub use engine::{Engine, EngineConfig};
pub use error::{MakeError, MakeResult};
pub use rule::Rule;
pub use spec::Spec;
pub use value::Value;
