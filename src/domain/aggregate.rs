use crate::domain::models::Aggregate;
use std::collections::BTreeMap;

/// Builds an aggregate from grouped `(option, count)` rows.
///
/// Every entry of `known_options` appears in the result, zero-filled when nobody
/// picked it. Options present in `rows` but absent from `known_options` are kept,
/// so a poll edited after voting started still reports every ballot.
pub fn tally<S: AsRef<str>>(known_options: &[S], rows: &[(String, i64)]) -> Aggregate {
    let mut counts: BTreeMap<String, i64> = known_options
        .iter()
        .map(|opt| (opt.as_ref().to_string(), 0))
        .collect();

    for (option, count) in rows {
        *counts.entry(option.clone()).or_insert(0) += count;
    }

    let total: i64 = counts.values().sum();
    let percentages = counts
        .iter()
        .map(|(option, count)| (option.clone(), percentage(*count, total)))
        .collect();

    Aggregate {
        counts,
        percentages,
        total,
    }
}

pub fn percentage(count: i64, total: i64) -> i64 {
    if total <= 0 {
        return 0;
    }
    ((count as f64 / total as f64) * 100.0).round() as i64
}
