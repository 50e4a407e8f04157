//! Synthetic id allocation
//!
//! Rewrites add nodes to a symbol table that is addressed purely by id, so
//! every new id has to be checked against what already exists.

/// Returns `seed` if it is free, otherwise the first free `seed:N`.
///
/// The result is deterministic for the same seed and the same existence
/// predicate.
pub fn unique_id(seed: &str, exists: impl Fn(&str) -> bool) -> String {
    if !exists(seed) {
        return seed.to_string();
    }
    let mut suffix: u64 = 0;
    loop {
        let candidate = format!("{}:{}", seed, suffix);
        if !exists(&candidate) {
            return candidate;
        }
        suffix += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_free_seed_is_returned() {
        let taken: HashSet<&str> = HashSet::new();
        assert_eq!(unique_id("gbk/GBKO", |id| taken.contains(id)), "gbk/GBKO");
    }

    #[test]
    fn test_probes_numeric_suffixes() {
        let taken: HashSet<&str> = ["pc", "pc:0", "pc:1"].into_iter().collect();
        assert_eq!(unique_id("pc", |id| taken.contains(id)), "pc:2");
    }

    #[test]
    fn test_deterministic() {
        let taken: HashSet<&str> = ["a"].into_iter().collect();
        let first = unique_id("a", |id| taken.contains(id));
        let second = unique_id("a", |id| taken.contains(id));
        assert_eq!(first, second);
    }
}
