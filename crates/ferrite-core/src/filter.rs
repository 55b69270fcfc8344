//! RFC 1960 LDAP filter grammar: parsing, evaluation, and the key-set
//! extraction used to bucket listeners against
//! [`Properties`](crate::properties::Properties).
//!
//! Grounded on the recursive-descent parser used by the plugin framework
//! this crate descends from: the same five operators (`AND`, `OR`, `NOT`,
//! and the four simple comparisons `=`, `<=`, `>=`, `~=`), the same
//! wildcard-substring matching for `=`, and the same error messages
//! (`Null query`, `Trailing garbage`, `Unexpected end of query`,
//! `Malformed query`, `Undefined operator`).

use std::fmt;

use serde_json::Value;

use crate::error::{CoreError, CoreResult};
use crate::properties::Properties;

/// Internal sentinel substituted for a literal `*` inside an attribute
/// value while parsing, so a later substring match can distinguish an
/// escaped literal asterisk (`\*`) from a wildcard. Never appears in
/// ordinary input since it falls outside any realistic property value.
const WILDCARD: char = '\u{ffff}';

#[derive(Debug, Clone, PartialEq)]
enum Op {
    And(Vec<Filter>),
    Or(Vec<Filter>),
    Not(Box<Filter>),
    Eq(String, String),
    Le(String, String),
    Ge(String, String),
    Approx(String, String),
}

/// A parsed LDAP filter expression.
#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    op: Op,
}

impl Filter {
    /// Parses a filter string such as `(&(objectClass=Foo)(service.ranking>=5))`.
    pub fn parse(query: &str) -> CoreResult<Self> {
        let mut state = ParseState::new(query)?;
        let filter = state.parse_expr()?;
        state.skip_white();
        if !state.rest().is_empty() {
            return Err(CoreError::filter_parse(format!(
                "Trailing garbage '{}'",
                state.rest()
            )));
        }
        Ok(filter)
    }

    /// Evaluates the filter against a property map. When `match_case` is
    /// `false`, attribute lookup tries an exact-case match first and falls
    /// back to case-insensitive; when `true`, only the exact-case match is
    /// considered, mirroring the original's `evaluate(props, matchCase)`
    /// entry point used by its case-sensitive `matchCase()` API.
    pub fn matches(&self, props: &Properties, match_case: bool) -> bool {
        self.evaluate(props, match_case)
    }

    fn evaluate(&self, props: &Properties, match_case: bool) -> bool {
        match &self.op {
            Op::And(children) => children.iter().all(|c| c.evaluate(props, match_case)),
            Op::Or(children) => children.iter().any(|c| c.evaluate(props, match_case)),
            Op::Not(child) => !child.evaluate(props, match_case),
            Op::Eq(attr, value) => {
                let Some(actual) = lookup(props, attr, match_case) else {
                    return false;
                };
                compare(actual, value, Cmp::Eq)
            }
            Op::Le(attr, value) => {
                let Some(actual) = lookup(props, attr, match_case) else {
                    return false;
                };
                compare(actual, value, Cmp::Le)
            }
            Op::Ge(attr, value) => {
                let Some(actual) = lookup(props, attr, match_case) else {
                    return false;
                };
                compare(actual, value, Cmp::Ge)
            }
            Op::Approx(attr, value) => {
                let Some(actual) = lookup(props, attr, match_case) else {
                    return false;
                };
                compare(actual, value, Cmp::Approx)
            }
        }
    }

    /// Extracts the set of literal values `attr` must take for this filter
    /// to match, when that set can be determined exactly:
    ///
    /// - `(attr=literal)` with no wildcard yields `{literal}`.
    /// - An `AND` yields the intersection of its children's determined sets
    ///   (children silent on `attr` don't narrow it).
    /// - An `OR` yields the union, but only if every child yields a set —
    ///   one undetermined child makes the whole extraction fail, since the
    ///   filter could then match values none of the children named.
    /// - `NOT`, a wildcarded equality, and any simple term on a different
    ///   attribute are undetermined.
    fn matched_values_for(&self, attr: &str) -> Option<std::collections::HashSet<String>> {
        use std::collections::HashSet;
        match &self.op {
            Op::Eq(a, value) => {
                if a.eq_ignore_ascii_case(attr) && !value.contains(WILDCARD) {
                    Some(HashSet::from([value.clone()]))
                } else {
                    None
                }
            }
            Op::And(children) => {
                let mut result: Option<HashSet<String>> = None;
                for child in children {
                    if let Some(set) = child.matched_values_for(attr) {
                        result = Some(match result {
                            None => set,
                            Some(acc) => acc.intersection(&set).cloned().collect(),
                        });
                    }
                }
                result
            }
            Op::Or(children) => {
                let mut result = HashSet::new();
                for child in children {
                    let set = child.matched_values_for(attr)?;
                    result.extend(set);
                }
                Some(result)
            }
            _ => None,
        }
    }

    /// Extracts the set of `objectClass` values this filter requires for a
    /// match, when that set can be determined exactly. Used to decide
    /// whether a listener's filter can be indexed by class rather than
    /// scanned on every event. A narrower special case of
    /// [`Filter::cacheable_keys`], kept as its own entry point since
    /// `objectClass` lookup (`reference.classes()`) is a hot path distinct
    /// from the general key-set machinery.
    pub fn matched_object_classes(&self) -> Option<std::collections::HashSet<String>> {
        self.matched_values_for("objectclass")
    }

    /// Key-set extraction for listener-bucket caching: the attributes the
    /// registry indexes by are fixed — `objectclass`, `service.id`,
    /// `service.pid` — and this reduces the filter to the `(attribute,
    /// value)` pairs it pins to a determinable, non-wildcarded value under
    /// any of them. A filter like `(service.id=7)` yields
    /// `{("service.id", "7")}`; `(&(service.id=7)(objectClass=Foo))` yields
    /// both pairs, since either one alone is enough to place the listener
    /// where a matching event could reach it (the full filter is still
    /// re-evaluated before delivery). Returns `None` when no key attribute
    /// is determinable at all, meaning the filter can't be indexed and must
    /// fall back to the scanned list.
    pub fn cacheable_keys(&self) -> Option<std::collections::HashSet<(String, String)>> {
        const KEY_ATTRIBUTES: [&str; 3] = ["objectclass", "service.id", "service.pid"];
        let mut keys = std::collections::HashSet::new();
        for attr in KEY_ATTRIBUTES {
            if let Some(values) = self.matched_values_for(attr) {
                keys.extend(values.into_iter().map(|value| (attr.to_string(), value)));
            }
        }
        if keys.is_empty() {
            None
        } else {
            Some(keys)
        }
    }
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.op {
            Op::And(children) => {
                write!(f, "(&")?;
                for c in children {
                    write!(f, "{c}")?;
                }
                write!(f, ")")
            }
            Op::Or(children) => {
                write!(f, "(|")?;
                for c in children {
                    write!(f, "{c}")?;
                }
                write!(f, ")")
            }
            Op::Not(child) => write!(f, "(!{child})"),
            Op::Eq(attr, value) => write!(f, "({attr}={})", unescape_display(value)),
            Op::Le(attr, value) => write!(f, "({attr}<={})", unescape_display(value)),
            Op::Ge(attr, value) => write!(f, "({attr}>={})", unescape_display(value)),
            Op::Approx(attr, value) => write!(f, "({attr}~={})", unescape_display(value)),
        }
    }
}

fn unescape_display(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            WILDCARD => out.push('*'),
            '(' | ')' | '\\' => {
                out.push('\\');
                out.push(c);
            }
            _ => out.push(c),
        }
    }
    out
}

#[derive(Clone, Copy)]
enum Cmp {
    Eq,
    Le,
    Ge,
    Approx,
}

fn lookup<'a>(props: &'a Properties, attr: &str, match_case: bool) -> Option<&'a Value> {
    let exact = props.get_case_sensitive(attr);
    if match_case {
        exact
    } else {
        exact.or_else(|| props.get(attr))
    }
}

fn compare(actual: &Value, pattern: &str, op: Cmp) -> bool {
    if matches!(op, Cmp::Eq) && pattern.len() == 1 && pattern.chars().next() == Some(WILDCARD) {
        return true;
    }
    match actual {
        Value::String(s) => compare_string(s, pattern, op),
        Value::Bool(b) => match op {
            Cmp::Eq => pattern_matches_literal(pattern, &b.to_string()),
            Cmp::Approx => fixup(pattern) == fixup(&b.to_string()),
            // Booleans have no natural ordering; LE/GE never match.
            Cmp::Le | Cmp::Ge => false,
        },
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                compare_ordered(i, pattern, op)
            } else if let Some(f) = n.as_f64() {
                compare_ordered_f64(f, pattern, op)
            } else {
                false
            }
        }
        Value::Array(items) => items.iter().any(|item| compare(item, pattern, op)),
        Value::Null => false,
        Value::Object(_) => false,
    }
}

fn compare_ordered(actual: i64, pattern: &str, op: Cmp) -> bool {
    match pattern.parse::<i64>() {
        Ok(p) => match op {
            Cmp::Eq => actual == p,
            Cmp::Le => actual <= p,
            Cmp::Ge => actual >= p,
            Cmp::Approx => actual == p,
        },
        Err(_) => false,
    }
}

fn compare_ordered_f64(actual: f64, pattern: &str, op: Cmp) -> bool {
    match pattern.parse::<f64>() {
        Ok(p) => match op {
            Cmp::Eq => actual == p,
            Cmp::Le => actual <= p,
            Cmp::Ge => actual >= p,
            Cmp::Approx => actual == p,
        },
        Err(_) => false,
    }
}

fn compare_string(actual: &str, pattern: &str, op: Cmp) -> bool {
    match op {
        Cmp::Le => actual <= pattern,
        Cmp::Ge => actual >= pattern,
        Cmp::Eq => pattern_matches_literal(pattern, actual),
        Cmp::Approx => fixup(pattern) == fixup(actual),
    }
}

fn pattern_matches_literal(pattern: &str, literal: &str) -> bool {
    if !pattern.contains(WILDCARD) {
        return pattern == literal;
    }
    pat_substr(
        &pattern.chars().collect::<Vec<_>>(),
        &literal.chars().collect::<Vec<_>>(),
    )
}

fn pat_substr(pattern: &[char], value: &[char]) -> bool {
    if pattern.is_empty() {
        return value.is_empty();
    }
    if pattern[0] == WILDCARD {
        if pattern.len() == 1 {
            return true;
        }
        for start in 0..=value.len() {
            if pat_substr(&pattern[1..], &value[start..]) {
                return true;
            }
        }
        false
    } else {
        if value.is_empty() || pattern[0] != value[0] {
            return false;
        }
        pat_substr(&pattern[1..], &value[1..])
    }
}

/// Case-fold and collapse interior whitespace the way approximate-match
/// comparison does: lowercase, and all whitespace runs reduced to a single
/// space.
fn fixup(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut last_was_space = false;
    for c in s.trim().chars() {
        if c.is_whitespace() {
            if !last_was_space {
                out.push(' ');
            }
            last_was_space = true;
        } else {
            out.extend(c.to_lowercase());
            last_was_space = false;
        }
    }
    out
}

struct ParseState<'a> {
    chars: Vec<char>,
    pos: usize,
    source: &'a str,
}

impl<'a> ParseState<'a> {
    fn new(source: &'a str) -> CoreResult<Self> {
        if source.trim().is_empty() {
            return Err(CoreError::filter_parse("Null query"));
        }
        Ok(ParseState {
            chars: source.chars().collect(),
            pos: 0,
            source,
        })
    }

    fn rest(&self) -> String {
        self.chars[self.pos..].iter().collect()
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn skip_white(&mut self) {
        while matches!(self.peek(), Some(c) if c.is_whitespace()) {
            self.pos += 1;
        }
    }

    fn expect(&mut self, c: char) -> CoreResult<()> {
        self.skip_white();
        if self.peek() == Some(c) {
            self.pos += 1;
            Ok(())
        } else if self.peek().is_none() {
            Err(CoreError::filter_parse("Unexpected end of query"))
        } else {
            Err(CoreError::filter_parse("Malformed query"))
        }
    }

    fn parse_expr(&mut self) -> CoreResult<Filter> {
        self.skip_white();
        self.expect('(')?;
        self.skip_white();
        let filter = match self.peek() {
            Some('&') => {
                self.pos += 1;
                Filter {
                    op: Op::And(self.parse_filter_list()?),
                }
            }
            Some('|') => {
                self.pos += 1;
                Filter {
                    op: Op::Or(self.parse_filter_list()?),
                }
            }
            Some('!') => {
                self.pos += 1;
                let child = self.parse_expr()?;
                Filter {
                    op: Op::Not(Box::new(child)),
                }
            }
            Some(_) => self.parse_simple()?,
            None => return Err(CoreError::filter_parse("Unexpected end of query")),
        };
        self.expect(')')?;
        Ok(filter)
    }

    fn parse_filter_list(&mut self) -> CoreResult<Vec<Filter>> {
        let mut filters = Vec::new();
        self.skip_white();
        while self.peek() == Some('(') {
            filters.push(self.parse_expr()?);
            self.skip_white();
        }
        if filters.is_empty() {
            return Err(CoreError::filter_parse("Malformed query"));
        }
        Ok(filters)
    }

    fn parse_simple(&mut self) -> CoreResult<Filter> {
        let attr = self.parse_attribute_name()?;
        self.skip_white();
        let op_start = self.pos;
        let op = match self.peek() {
            Some('=') => {
                self.pos += 1;
                "="
            }
            Some('<') if self.chars.get(self.pos + 1) == Some(&'=') => {
                self.pos += 2;
                "<="
            }
            Some('>') if self.chars.get(self.pos + 1) == Some(&'=') => {
                self.pos += 2;
                ">="
            }
            Some('~') if self.chars.get(self.pos + 1) == Some(&'=') => {
                self.pos += 2;
                "~="
            }
            Some(_) => return Err(CoreError::filter_parse("Undefined operator")),
            None => return Err(CoreError::filter_parse("Unexpected end of query")),
        };
        let _ = op_start;
        let value = self.parse_attribute_value()?;
        let op = match op {
            "=" => Op::Eq(attr, value),
            "<=" => Op::Le(attr, value),
            ">=" => Op::Ge(attr, value),
            "~=" => Op::Approx(attr, value),
            _ => unreachable!(),
        };
        Ok(Filter { op })
    }

    fn parse_attribute_name(&mut self) -> CoreResult<String> {
        self.skip_white();
        let start = self.pos;
        while let Some(c) = self.peek() {
            if c == '=' || c == '<' || c == '>' || c == '~' || c == '(' || c == ')' || c.is_whitespace() {
                break;
            }
            self.pos += 1;
        }
        if self.pos == start {
            return Err(CoreError::filter_parse("Malformed query"));
        }
        Ok(self.chars[start..self.pos].iter().collect())
    }

    fn parse_attribute_value(&mut self) -> CoreResult<String> {
        let mut value = String::new();
        loop {
            match self.peek() {
                None => return Err(CoreError::filter_parse("Unexpected end of query")),
                Some(')') => break,
                Some('\\') => {
                    self.pos += 1;
                    match self.peek() {
                        Some(c) => {
                            value.push(c);
                            self.pos += 1;
                        }
                        None => return Err(CoreError::filter_parse("Unexpected end of query")),
                    }
                }
                Some('*') => {
                    value.push(WILDCARD);
                    self.pos += 1;
                }
                Some(c) => {
                    value.push(c);
                    self.pos += 1;
                }
            }
        }
        let _ = self.source;
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn props(pairs: &[(&str, Value)]) -> Properties {
        Properties::from_pairs(pairs.iter().map(|(k, v)| (k.to_string(), v.clone()))).unwrap()
    }

    #[test]
    fn rejects_empty_query() {
        assert!(Filter::parse("").is_err());
        assert!(Filter::parse("   ").is_err());
    }

    #[test]
    fn rejects_trailing_garbage() {
        let err = Filter::parse("(objectClass=Foo)junk").unwrap_err();
        assert!(matches!(err, CoreError::FilterParse(_)));
    }

    #[test]
    fn simple_equality_matches() {
        let f = Filter::parse("(objectClass=Foo)").unwrap();
        assert!(f.matches(&props(&[("objectClass", json!("Foo"))]), false));
        assert!(!f.matches(&props(&[("objectClass", json!("Bar"))]), false));
    }

    #[test]
    fn wildcard_substring_matches() {
        let f = Filter::parse("(name=Fo*ar)").unwrap();
        assert!(f.matches(&props(&[("name", json!("Foobar"))]), false));
        assert!(!f.matches(&props(&[("name", json!("Foo"))]), false));
    }

    #[test]
    fn and_or_not_compose() {
        let f = Filter::parse("(&(objectClass=Foo)(|(service.ranking>=5)(!(service.ranking>=0))))").unwrap();
        assert!(f.matches(&props(&[
            ("objectClass", json!("Foo")),
            ("service.ranking", json!(10)),
        ]), false));
        assert!(!f.matches(&props(&[
            ("objectClass", json!("Foo")),
            ("service.ranking", json!(2)),
        ]), false));
    }

    #[test]
    fn approx_folds_case_and_whitespace() {
        let f = Filter::parse("(name~=  Hello   World )").unwrap();
        assert!(f.matches(&props(&[("name", json!("hello world"))]), false));
    }

    #[test]
    fn match_case_true_disables_case_insensitive_fallback() {
        let f = Filter::parse("(Name=Foo)").unwrap();
        let p = props(&[("name", json!("Foo"))]);
        assert!(f.matches(&p, false));
        assert!(!f.matches(&p, true));
    }

    #[test]
    fn matched_object_classes_for_and_or() {
        let f = Filter::parse("(&(objectClass=Foo)(service.ranking>=0))").unwrap();
        let classes = f.matched_object_classes().unwrap();
        assert_eq!(classes, std::collections::HashSet::from(["Foo".to_string()]));

        let or_f = Filter::parse("(|(objectClass=Foo)(objectClass=Bar))").unwrap();
        let or_classes = or_f.matched_object_classes().unwrap();
        assert_eq!(
            or_classes,
            std::collections::HashSet::from(["Foo".to_string(), "Bar".to_string()])
        );

        let undetermined = Filter::parse("(|(objectClass=Foo)(service.ranking>=0))").unwrap();
        assert!(undetermined.matched_object_classes().is_none());
    }

    #[test]
    fn cacheable_keys_covers_service_id_and_pid_alongside_object_class() {
        let by_id = Filter::parse("(service.id=7)").unwrap();
        assert_eq!(
            by_id.cacheable_keys().unwrap(),
            std::collections::HashSet::from([("service.id".to_string(), "7".to_string())])
        );

        let mixed = Filter::parse("(&(service.id=7)(objectClass=Foo))").unwrap();
        assert_eq!(
            mixed.cacheable_keys().unwrap(),
            std::collections::HashSet::from([
                ("service.id".to_string(), "7".to_string()),
                ("objectclass".to_string(), "Foo".to_string()),
            ])
        );

        let undetermined = Filter::parse("(service.ranking>=0)").unwrap();
        assert!(undetermined.cacheable_keys().is_none());
    }

    #[test]
    fn lone_wildcard_matches_any_present_value_regardless_of_type() {
        let f = Filter::parse("(service.id=*)").unwrap();
        assert!(f.matches(&props(&[("service.id", json!(7))]), false));
        assert!(f.matches(&props(&[("service.id", json!(7.5))]), false));
        assert!(f.matches(&props(&[("service.id", json!(true))]), false));
        assert!(!f.matches(&props(&[("other", json!(1))]), false));

        let ranking = Filter::parse("(service.ranking=*)").unwrap();
        assert!(ranking.matches(&props(&[("service.ranking", json!([1, 2]))]), false));
    }

    #[test]
    fn display_round_trips() {
        let original = "(&(objectClass=Foo)(name=Fo\\*ar))";
        let f = Filter::parse(original).unwrap();
        assert_eq!(f.to_string(), original);
    }

}
