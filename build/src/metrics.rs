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

use std::{fmt, time::Duration};

/// What the engine spends its time on during one build.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Metric {
    Match,
    Schedule,
    Apply,
    Reuse,
    Reschedule,
}

impl Metric {
    const ALL: [Metric; 5] = [
        Metric::Match,
        Metric::Schedule,
        Metric::Apply,
        Metric::Reuse,
        Metric::Reschedule,
    ];

    fn name(self) -> &'static str {
        match self {
            Metric::Match => "match rule",
            Metric::Schedule => "schedule",
            Metric::Apply => "apply rule",
            Metric::Reuse => "reuse product",
            Metric::Reschedule => "reschedule",
        }
    }

    fn index(self) -> usize {
        self as usize
    }
}

#[derive(Debug, Default, Clone, Copy)]
struct Entry {
    count: usize,
    sum: u128,
}

/// Per-engine counters and timings, printable as a table.
#[derive(Debug, Default)]
pub struct Metrics {
    entries: [Entry; 5],
}

impl Metrics {
    pub fn record(&mut self, metric: Metric, elapsed: Duration) {
        let entry = &mut self.entries[metric.index()];
        entry.count += 1;
        entry.sum += elapsed.as_micros();
    }

    pub fn count(&self, metric: Metric) -> usize {
        self.entries[metric.index()].count
    }
}

impl fmt::Display for Metrics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut name_width = 7; // To fit "metric ".
        for metric in &Metric::ALL {
            name_width = std::cmp::max(name_width, metric.name().len());
        }
        writeln!(
            f,
            "{:name_width$} {:>6} {:>9} {:>11}",
            "metric ",
            "count",
            "avg (us)",
            "total (us)",
            name_width = name_width
        )?;
        writeln!(
            f,
            "{:-<name_width$} {:-^6} {:-^9} {:-^11}",
            "",
            "",
            "",
            "",
            name_width = name_width
        )?;
        for metric in &Metric::ALL {
            let entry = self.entries[metric.index()];
            if entry.count == 0 {
                continue;
            }
            writeln!(
                f,
                "{:name_width$} {: >6} {:>9.3} {:>11}",
                metric.name(),
                entry.count,
                entry.sum as f64 / entry.count as f64,
                entry.sum,
                name_width = name_width
            )?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn counts_and_table() {
        let mut metrics = Metrics::default();
        metrics.record(Metric::Apply, Duration::from_micros(10));
        metrics.record(Metric::Apply, Duration::from_micros(30));
        metrics.record(Metric::Reuse, Duration::from_micros(0));
        assert_eq!(metrics.count(Metric::Apply), 2);
        assert_eq!(metrics.count(Metric::Schedule), 0);

        let table = metrics.to_string();
        let lines: Vec<&str> = table.lines().collect();
        // header, rule, and only the metrics that were recorded.
        assert_eq!(lines.len(), 4);
        assert!(lines[2].starts_with("apply rule"));
        assert!(lines[2].contains("20.000"));
        assert!(lines[2].trim_end().ends_with("40"));
        assert!(lines[3].starts_with("reuse product"));
    }
}
