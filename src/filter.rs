//! Filter engine: ordered include/exclude rules compiled to regexes once at
//! construction, plus size/age predicates applied after the rule verdict.
//!
//! `FilterRule`/`FilterList` follow a first-match-wins architecture with
//! rsync-flavored naming (`FilterAction`, `FilterDecision`). The matching
//! engine is a hand-rolled glob translator rather than `glob::Pattern`,
//! since the glob dialect here needs things `glob::Pattern` cannot express:
//! a distinct `**` from `*`, and `{a,b,c}` alternation.

use std::time::Duration;

use regex::Regex;

use crate::error::{RelayError, Result};

/// Whether a rule includes or excludes a matching path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterAction {
    Include,
    Exclude,
}

/// The final verdict for a candidate path after walking the rule list and
/// applying size/age predicates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterDecision {
    Include,
    Exclude,
}

/// One compiled glob rule.
#[derive(Debug, Clone)]
pub struct FilterRule {
    action: FilterAction,
    source: String,
    regex: Regex,
}

impl FilterRule {
    pub fn new(action: FilterAction, pattern: &str) -> Result<Self> {
        let regex = compile_glob(pattern)?;
        Ok(Self {
            action,
            source: pattern.to_string(),
            regex,
        })
    }

    pub fn action(&self) -> FilterAction {
        self.action
    }

    pub fn pattern(&self) -> &str {
        &self.source
    }

    fn matches(&self, path: &str) -> bool {
        self.regex.is_match(path)
    }
}

/// The ordered rule list plus size/age predicates.
#[derive(Debug, Clone, Default)]
pub struct FilterList {
    rules: Vec<FilterRule>,
    files_from: Option<std::collections::HashSet<String>>,
    min_size: Option<u64>,
    max_size: Option<u64>,
    min_age: Option<Duration>,
    max_age: Option<Duration>,
    saw_explicit_include: bool,
}

impl FilterList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_rule(&mut self, action: FilterAction, pattern: &str) -> Result<()> {
        if action == FilterAction::Include {
            self.saw_explicit_include = true;
        }
        self.rules.push(FilterRule::new(action, pattern)?);
        Ok(())
    }

    /// `--filter '!'`: clears every rule accumulated so far.
    pub fn clear_rules(&mut self) {
        self.rules.clear();
        self.saw_explicit_include = false;
    }

    /// `--files-from`: replaces all pattern filtering with a literal
    /// manifest of eligible paths. Size/age predicates still apply.
    pub fn set_files_from(&mut self, paths: impl IntoIterator<Item = String>) {
        self.files_from = Some(paths.into_iter().collect());
    }

    pub fn set_min_size(&mut self, bytes: u64) {
        self.min_size = Some(bytes);
    }

    pub fn set_max_size(&mut self, bytes: u64) {
        self.max_size = Some(bytes);
    }

    pub fn set_min_age(&mut self, age: Duration) {
        self.min_age = Some(age);
    }

    pub fn set_max_age(&mut self, age: Duration) {
        self.max_age = Some(age);
    }

    /// Evaluate the filter against one candidate. `age` is the object's
    /// elapsed time since its mod time, as measured at evaluation time.
    pub fn decide(&self, path: &str, size: i64, age: Option<Duration>) -> FilterDecision {
        let rule_verdict = self.rule_verdict(path);
        if rule_verdict == FilterDecision::Exclude {
            return FilterDecision::Exclude;
        }

        if let Some(min) = self.min_size {
            if size >= 0 && (size as u64) < min {
                return FilterDecision::Exclude;
            }
        }
        if let Some(max) = self.max_size {
            if size >= 0 && (size as u64) > max {
                return FilterDecision::Exclude;
            }
        }
        if let Some(min_age) = self.min_age {
            if let Some(age) = age {
                if age < min_age {
                    return FilterDecision::Exclude;
                }
            }
        }
        if let Some(max_age) = self.max_age {
            if let Some(age) = age {
                if age > max_age {
                    return FilterDecision::Exclude;
                }
            }
        }

        FilterDecision::Include
    }

    fn rule_verdict(&self, path: &str) -> FilterDecision {
        if let Some(manifest) = &self.files_from {
            return if manifest.contains(path) {
                FilterDecision::Include
            } else {
                FilterDecision::Exclude
            };
        }

        for rule in &self.rules {
            if rule.matches(path) {
                return match rule.action {
                    FilterAction::Include => FilterDecision::Include,
                    FilterAction::Exclude => FilterDecision::Exclude,
                };
            }
        }

        // Implicit trailing exclude *: once any explicit INCLUDE rule has
        // been added, an unmatched path defaults to EXCLUDE instead of
        // INCLUDE.
        if self.saw_explicit_include {
            FilterDecision::Exclude
        } else {
            FilterDecision::Include
        }
    }
}

/// Translate one glob pattern into an anchored `Regex`. Splits on `/`,
/// translates each segment, and rejoins
/// preserving the original anchoring; an unanchored pattern also matches as
/// a path suffix via an optional `(?:.*/)?` prefix.
fn compile_glob(pattern: &str) -> Result<Regex> {
    let pattern = pattern.trim_end_matches('/');
    let anchored = pattern.starts_with('/');
    let body = pattern.trim_start_matches('/');

    let translated = translate_segment(body)?;
    let full = if anchored {
        format!("^{}$", translated)
    } else {
        format!("^(?:.*/)?{}$", translated)
    };

    Regex::new(&full).map_err(|e| RelayError::Filter(format!("invalid pattern {:?}: {}", pattern, e)))
}

/// Translate a (possibly `/`-containing) glob body into a regex fragment.
/// `**` spans `/`; a bare `*` does not; `?` matches one non-`/` character;
/// `[...]` passes through; `{a,b,c}` expands to a non-capturing
/// alternation, recursively translating each branch; `\x` escapes `x`.
fn translate_segment(body: &str) -> Result<String> {
    let chars: Vec<char> = body.chars().collect();
    let mut out = String::new();
    let mut i = 0;

    while i < chars.len() {
        match chars[i] {
            '*' => {
                if i + 1 < chars.len() && chars[i + 1] == '*' {
                    out.push_str(".*");
                    i += 2;
                } else {
                    out.push_str("[^/]*");
                    i += 1;
                }
            }
            '?' => {
                out.push_str("[^/]");
                i += 1;
            }
            '[' => {
                let close = chars[i..]
                    .iter()
                    .position(|&c| c == ']')
                    .map(|p| i + p)
                    .ok_or_else(|| RelayError::Filter(format!("unterminated bracket in {:?}", body)))?;
                let class: String = chars[i..=close].iter().collect();
                out.push_str(&class);
                i = close + 1;
            }
            '{' => {
                let close = find_matching_brace(&chars, i)
                    .ok_or_else(|| RelayError::Filter(format!("unterminated brace in {:?}", body)))?;
                let inner: String = chars[i + 1..close].iter().collect();
                let branches: Result<Vec<String>> =
                    split_top_level_commas(&inner).into_iter().map(|b| translate_segment(&b)).collect();
                out.push_str("(?:");
                out.push_str(&branches?.join("|"));
                out.push(')');
                i = close + 1;
            }
            '\\' if i + 1 < chars.len() => {
                out.push_str(&regex::escape(&chars[i + 1].to_string()));
                i += 2;
            }
            '/' => {
                out.push('/');
                i += 1;
            }
            c => {
                out.push_str(&regex::escape(&c.to_string()));
                i += 1;
            }
        }
    }

    Ok(out)
}

fn find_matching_brace(chars: &[char], open: usize) -> Option<usize> {
    let mut depth = 0;
    for (offset, &c) in chars[open..].iter().enumerate() {
        match c {
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(open + offset);
                }
            }
            _ => {}
        }
    }
    None
}

fn split_top_level_commas(s: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut depth = 0;
    let mut current = String::new();
    for c in s.chars() {
        match c {
            '{' => {
                depth += 1;
                current.push(c);
            }
            '}' => {
                depth -= 1;
                current.push(c);
            }
            ',' if depth == 0 => {
                parts.push(std::mem::take(&mut current));
            }
            _ => current.push(c),
        }
    }
    parts.push(current);
    parts
}

/// Parse a size with binary-unit suffix (`k`=2^10, `M`=2^20, `G`=2^30).
pub fn parse_size(text: &str) -> Result<u64> {
    let text = text.trim();
    let (digits, mult) = match text.chars().last() {
        Some('k') | Some('K') => (&text[..text.len() - 1], 1u64 << 10),
        Some('M') => (&text[..text.len() - 1], 1u64 << 20),
        Some('G') => (&text[..text.len() - 1], 1u64 << 30),
        _ => (text, 1),
    };
    digits
        .trim()
        .parse::<u64>()
        .map(|n| n * mult)
        .map_err(|e| RelayError::Filter(format!("invalid size {:?}: {}", text, e)))
}

/// Parse a duration with suffix `ms,s,m,h,d,w,M,y` (`M` = 30 days, to
/// disambiguate from `m` = minutes).
pub fn parse_age(text: &str) -> Result<Duration> {
    let text = text.trim();
    if let Some(stripped) = text.strip_suffix("ms") {
        return stripped
            .parse::<u64>()
            .map(Duration::from_millis)
            .map_err(|e| RelayError::Filter(format!("invalid age {:?}: {}", text, e)));
    }

    let (digits, secs_per_unit) = match text.chars().last() {
        Some('s') => (&text[..text.len() - 1], 1u64),
        Some('m') => (&text[..text.len() - 1], 60),
        Some('h') => (&text[..text.len() - 1], 3600),
        Some('d') => (&text[..text.len() - 1], 86_400),
        Some('w') => (&text[..text.len() - 1], 7 * 86_400),
        Some('M') => (&text[..text.len() - 1], 30 * 86_400),
        Some('y') => (&text[..text.len() - 1], 365 * 86_400),
        _ => (text, 1),
    };

    digits
        .trim()
        .parse::<u64>()
        .map(|n| Duration::from_secs(n * secs_per_unit))
        .map_err(|e| RelayError::Filter(format!("invalid age {:?}: {}", text, e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unanchored_star_matches_suffix_not_slash() {
        let rule = FilterRule::new(FilterAction::Exclude, "*.tmp").unwrap();
        assert!(rule.matches("build/output.tmp"));
        assert!(!rule.matches("build/output.tmp.bak"));
    }

    #[test]
    fn double_star_crosses_slash_boundaries() {
        let rule = FilterRule::new(FilterAction::Exclude, "/cache/**").unwrap();
        assert!(rule.matches("cache/a/b/c.bin"));
        assert!(!rule.matches("other/cache/a"));
    }

    #[test]
    fn anchored_pattern_matches_only_from_root() {
        let rule = FilterRule::new(FilterAction::Exclude, "/secrets.txt").unwrap();
        assert!(rule.matches("secrets.txt"));
        assert!(!rule.matches("sub/secrets.txt"));
    }

    #[test]
    fn brace_alternation_expands_each_branch() {
        let rule = FilterRule::new(FilterAction::Include, "*.{jpg,png}").unwrap();
        assert!(rule.matches("photo.jpg"));
        assert!(rule.matches("icon.png"));
        assert!(!rule.matches("doc.pdf"));
    }

    #[test]
    fn first_match_wins_in_ordered_rule_list() {
        let mut list = FilterList::new();
        list.add_rule(FilterAction::Include, "/keep.txt").unwrap();
        list.add_rule(FilterAction::Exclude, "*.txt").unwrap();

        assert_eq!(list.decide("keep.txt", 10, None), FilterDecision::Include);
        assert_eq!(list.decide("drop.txt", 10, None), FilterDecision::Exclude);
    }

    #[test]
    fn implicit_trailing_exclude_kicks_in_after_explicit_include() {
        let mut list = FilterList::new();
        list.add_rule(FilterAction::Include, "*.keep").unwrap();

        assert_eq!(list.decide("a.keep", 1, None), FilterDecision::Include);
        assert_eq!(list.decide("a.other", 1, None), FilterDecision::Exclude);
    }

    #[test]
    fn default_is_include_with_no_explicit_include_rules() {
        let mut list = FilterList::new();
        list.add_rule(FilterAction::Exclude, "*.tmp").unwrap();

        assert_eq!(list.decide("a.tmp", 1, None), FilterDecision::Exclude);
        assert_eq!(list.decide("a.txt", 1, None), FilterDecision::Include);
    }

    #[test]
    fn size_predicates_and_compose_after_rule_verdict() {
        let mut list = FilterList::new();
        list.set_min_size(100);
        list.set_max_size(1000);

        assert_eq!(list.decide("f", 50, None), FilterDecision::Exclude);
        assert_eq!(list.decide("f", 500, None), FilterDecision::Include);
        assert_eq!(list.decide("f", 5000, None), FilterDecision::Exclude);
    }

    #[test]
    fn age_predicates_and_compose_after_rule_verdict() {
        let mut list = FilterList::new();
        list.set_max_age(Duration::from_secs(3600));

        assert_eq!(list.decide("f", 1, Some(Duration::from_secs(7200))), FilterDecision::Exclude);
        assert_eq!(list.decide("f", 1, Some(Duration::from_secs(60))), FilterDecision::Include);
    }

    #[test]
    fn files_from_overrides_pattern_rules() {
        let mut list = FilterList::new();
        list.add_rule(FilterAction::Exclude, "*").unwrap();
        list.set_files_from(["a.txt".to_string(), "b/c.txt".to_string()]);

        assert_eq!(list.decide("a.txt", 1, None), FilterDecision::Include);
        assert_eq!(list.decide("other.txt", 1, None), FilterDecision::Exclude);
    }

    #[test]
    fn parse_size_understands_binary_suffixes() {
        assert_eq!(parse_size("10k").unwrap(), 10 * 1024);
        assert_eq!(parse_size("2M").unwrap(), 2 * 1024 * 1024);
        assert_eq!(parse_size("1G").unwrap(), 1024 * 1024 * 1024);
        assert_eq!(parse_size("512").unwrap(), 512);
    }

    #[test]
    fn parse_age_understands_suffix_table() {
        assert_eq!(parse_age("500ms").unwrap(), Duration::from_millis(500));
        assert_eq!(parse_age("30s").unwrap(), Duration::from_secs(30));
        assert_eq!(parse_age("5m").unwrap(), Duration::from_secs(300));
        assert_eq!(parse_age("2h").unwrap(), Duration::from_secs(7200));
        assert_eq!(parse_age("1d").unwrap(), Duration::from_secs(86_400));
        assert_eq!(parse_age("1w").unwrap(), Duration::from_secs(7 * 86_400));
    }
}
