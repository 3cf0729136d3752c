use std::collections::HashSet;

use regex::Regex;

pub fn split_csv(s: &str) -> Vec<String> {
    s.split(',')
        .map(|x| x.trim().to_string())
        .filter(|x| !x.is_empty())
        .collect()
}

/// Narrow `available` to the requested tokens (all when none are named),
/// then to those matching `filter`. Requested order is kept with repeats
/// dropped; unknown tokens pass through so the batch reports them.
pub fn select_tokens(
    available: Vec<String>,
    requested: &[String],
    filter: Option<&Regex>,
) -> Vec<String> {
    let mut seen = HashSet::new();
    let requested: Vec<String> = requested
        .iter()
        .flat_map(|r| split_csv(r))
        .filter(|token| seen.insert(token.clone()))
        .collect();
    let base = if requested.is_empty() {
        available
    } else {
        requested
    };
    base.into_iter()
        .filter(|token| filter.is_none_or(|re| re.is_match(token)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(raw: &[&str]) -> Vec<String> {
        raw.iter().map(ToString::to_string).collect()
    }

    #[test]
    fn split_csv_trims_and_drops_empty() {
        assert_eq!(split_csv(" a, ,b ,"), strings(&["a", "b"]));
    }

    #[test]
    fn selects_all_when_nothing_requested() {
        let all = strings(&["s1", "s2", "x9"]);
        assert_eq!(select_tokens(all.clone(), &[], None), all);
    }

    #[test]
    fn requested_tokens_replace_listing() {
        let picked = select_tokens(strings(&["s1", "s2"]), &strings(&["s2,zz", "s1", "s2"]), None);
        assert_eq!(picked, strings(&["s2", "zz", "s1"]));
    }

    #[test]
    fn filter_applies_after_selection() {
        let re = Regex::new("^s").unwrap();
        let picked = select_tokens(strings(&["s1", "x9", "s2"]), &[], Some(&re));
        assert_eq!(picked, strings(&["s1", "s2"]));
    }
}
