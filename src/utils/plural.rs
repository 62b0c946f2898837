//! Count labels for log lines and the admin report.

/// `"1 cached item"`, `"0 cached items"`, `"3 cached items"`.
pub fn plural_count(count: usize, noun: &str) -> String {
    if count == 1 {
        format!("1 {noun}")
    } else {
        format!("{count} {noun}s")
    }
}

/// Same as [`plural_count`] for nouns without a plain `s` plural.
pub fn plural_count_irregular(count: usize, singular: &str, plural: &str) -> String {
    format!("{} {}", count, if count == 1 { singular } else { plural })
}
