//! Prometheus text-exposition rendering and parsing.
//!
//! Rendering follows the teacher's `strata_common::metrics::render_prometheus`
//! idiom (HELP/TYPE comment pairs, one line per label set, `writeln!`
//! into a pre-sized `String`). Parsing is the minimal subset the
//! controller needs to pull a single labeled gauge value back out of
//! that same text format (spec §4.3.1).

use std::fmt::Write as _;

/// One rendered gauge sample: `name{label=value,...} number`.
pub struct GaugeSample {
    pub labels: Vec<(String, String)>,
    pub value: f64,
}

impl GaugeSample {
    pub fn new(labels: &[(&str, &str)], value: f64) -> Self {
        Self {
            labels: labels
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            value,
        }
    }
}

/// Appends HELP/TYPE lines and the value lines for one gauge family.
pub fn write_gauge_family(out: &mut String, name: &str, help: &str, samples: &[GaugeSample]) {
    writeln!(out, "# HELP {name} {help}").unwrap();
    writeln!(out, "# TYPE {name} gauge").unwrap();
    for s in samples {
        write!(out, "{name}{{").unwrap();
        for (i, (k, v)) in s.labels.iter().enumerate() {
            if i > 0 {
                out.push(',');
            }
            write!(out, "{k}=\"{v}\"").unwrap();
        }
        writeln!(out, "}} {}", format_value(s.value)).unwrap();
    }
}

/// Appends the HELP/TYPE/bucket lines for one histogram family with a
/// fixed bucket boundary set, given cumulative bucket counts and the
/// sample count/sum.
pub fn write_histogram_family(
    out: &mut String,
    name: &str,
    help: &str,
    label_pairs: &[(&str, &str)],
    bucket_bounds: &[f64],
    cumulative_counts: &[u64],
    count: u64,
    sum: f64,
) {
    writeln!(out, "# HELP {name} {help}").unwrap();
    writeln!(out, "# TYPE {name} histogram").unwrap();

    let label_str = |extra: Option<(&str, String)>| -> String {
        let mut s = String::new();
        for (k, v) in label_pairs {
            if !s.is_empty() {
                s.push(',');
            }
            let _ = write!(s, "{k}=\"{v}\"");
        }
        if let Some((k, v)) = extra {
            if !s.is_empty() {
                s.push(',');
            }
            let _ = write!(s, "{k}=\"{v}\"");
        }
        s
    };

    for (bound, cumulative) in bucket_bounds.iter().zip(cumulative_counts.iter()) {
        writeln!(
            out,
            "{name}_bucket{{{}}} {cumulative}",
            label_str(Some(("le", format_value(*bound))))
        )
        .unwrap();
    }
    writeln!(
        out,
        "{name}_bucket{{{}}} {count}",
        label_str(Some(("le", "+Inf".to_string())))
    )
    .unwrap();
    writeln!(out, "{name}_sum{{{}}} {}", label_str(None), format_value(sum)).unwrap();
    writeln!(out, "{name}_count{{{}}} {count}", label_str(None)).unwrap();
}

fn format_value(v: f64) -> String {
    if v.fract() == 0.0 && v.abs() < 1e15 {
        format!("{v:.0}")
    } else {
        format!("{v:.3}")
    }
}

/// Finds the numeric value of the first line `metric_name{...label...}
/// value` where `label` matches the requested key/value, scanning the
/// given exposition text.
///
/// Matches the original's approach of scanning for a line that starts
/// with `"{metric_name}{"` and splitting on whitespace for the trailing
/// number (spec §4.3.1) — generalized here to also check the specific
/// label value rather than taking the first line blindly, since a
/// scrape may carry samples for multiple targets.
pub fn find_labeled_value(text: &str, metric_name: &str, label_key: &str, label_value: &str) -> Option<f64> {
    let prefix = format!("{metric_name}{{");
    let needle = format!("{label_key}=\"{label_value}\"");
    for line in text.lines() {
        if !line.starts_with(&prefix) {
            continue;
        }
        let Some(brace_end) = line.find('}') else {
            continue;
        };
        let labels_part = &line[..brace_end];
        if !labels_part.contains(&needle) {
            continue;
        }
        let value_part = line[brace_end + 1..].trim();
        if let Ok(v) = value_part.parse::<f64>() {
            return Some(v);
        }
    }
    None
}
