//! Clause compiler.
//!
//! A search is a JSON object whose entries are clauses, implicitly ANDed.
//! Clause names resolve through a table built once per entity kind from the
//! attribute declarations in [`crate::schema`]; the tables are never mutated
//! afterwards.

use std::collections::HashMap;
use std::sync::LazyLock;

use librarian_state::{SECONDS_PER_DAY, epoch_secs};
use serde_json::{Map, Value};

use crate::error::{SearchError, SearchResult, json_type_name};
use crate::like::LikePattern;
use crate::predicate::{NumberTest, Predicate, TextTest};
use crate::schema::{AttrType, Attribute, FileAttr, ObsAttr};

#[derive(Debug, Clone, Copy)]
enum ClauseKind<A> {
    And,
    Or,
    NoneOf,
    AlwaysTrue,
    AlwaysFalse,
    TextIsExactly(A),
    TextIsNot(A),
    TextMatches(A),
    IntIsExactly(A),
    IntIsNot(A),
    GreaterThan(A),
    LessThan(A),
    InRange(A),
    NotInRange(A),
    /// Payload is a full observation search.
    ObsMatches,
    /// An observation clause used directly in a file search.
    ObsProxy,
    NotOlderThan,
    NotNewerThan,
}

type ClauseTable<A> = HashMap<String, ClauseKind<A>>;

/// Observation clause prefixes that file searches may use without nesting.
const OBS_PROXY_PREFIXES: &[&str] = &["start-time-jd", "stop-time-jd", "start-lst-hr", "session-id"];

fn attribute_table<A: Attribute>() -> ClauseTable<A> {
    let mut table = HashMap::new();
    table.insert("and".to_string(), ClauseKind::And);
    table.insert("or".to_string(), ClauseKind::Or);
    table.insert("none-of".to_string(), ClauseKind::NoneOf);
    table.insert("always-true".to_string(), ClauseKind::AlwaysTrue);
    table.insert("always-false".to_string(), ClauseKind::AlwaysFalse);

    for &(attr, stem, ty) in A::ALL {
        let stem = stem.replace('_', "-");
        let mut add = |suffix: &str, kind| {
            table.insert(format!("{stem}-{suffix}"), kind);
        };
        match ty {
            AttrType::Text => {
                add("is-exactly", ClauseKind::TextIsExactly(attr));
                add("is-not", ClauseKind::TextIsNot(attr));
                add("matches", ClauseKind::TextMatches(attr));
            }
            AttrType::Int | AttrType::Float => {
                if ty == AttrType::Int {
                    add("is-exactly", ClauseKind::IntIsExactly(attr));
                    add("is-not", ClauseKind::IntIsNot(attr));
                }
                add("greater-than", ClauseKind::GreaterThan(attr));
                add("less-than", ClauseKind::LessThan(attr));
                add("in-range", ClauseKind::InRange(attr));
                add("not-in-range", ClauseKind::NotInRange(attr));
            }
        }
    }
    table
}

static OBS_CLAUSES: LazyLock<ClauseTable<ObsAttr>> = LazyLock::new(attribute_table);

static FILE_CLAUSES: LazyLock<ClauseTable<FileAttr>> = LazyLock::new(|| {
    let mut table = attribute_table();
    table.insert("obs-matches".to_string(), ClauseKind::ObsMatches);
    table.insert(
        "name-like".to_string(),
        ClauseKind::TextMatches(FileAttr::Name),
    );
    table.insert(
        "source-is".to_string(),
        ClauseKind::TextIsExactly(FileAttr::Source),
    );
    for name in OBS_CLAUSES.keys() {
        if OBS_PROXY_PREFIXES.iter().any(|p| name.starts_with(p)) {
            table.insert(name.clone(), ClauseKind::ObsProxy);
        }
    }
    table.insert("not-older-than".to_string(), ClauseKind::NotOlderThan);
    table.insert("not-newer-than".to_string(), ClauseKind::NotNewerThan);
    table
});

/// Compiles parsed searches into predicates.
///
/// Time-window clauses are resolved against the compiler's notion of "now",
/// fixed when the compiler is created.
#[derive(Debug, Clone, Copy)]
pub struct SearchCompiler {
    now: u64,
}

impl Default for SearchCompiler {
    fn default() -> Self {
        Self::new()
    }
}

impl SearchCompiler {
    pub fn new() -> Self {
        Self::at(epoch_secs())
    }

    /// A compiler whose "now" is the given epoch second.
    pub fn at(now: u64) -> Self {
        Self { now }
    }

    pub fn compile_files(&self, search: &Value) -> SearchResult<Predicate<FileAttr>> {
        self.compile(&FILE_CLAUSES, search)
    }

    pub fn compile_observations(&self, search: &Value) -> SearchResult<Predicate<ObsAttr>> {
        self.compile(&OBS_CLAUSES, search)
    }

    fn compile<A: Copy>(&self, table: &ClauseTable<A>, search: &Value) -> SearchResult<Predicate<A>> {
        if !search.is_object() {
            return Err(SearchError::Parse(format!(
                "can't parse search: data must be an object; got {}",
                json_type_name(search)
            )));
        }
        self.clause(table, "and", search)
    }

    fn clause<A: Copy>(
        &self,
        table: &ClauseTable<A>,
        name: &str,
        payload: &Value,
    ) -> SearchResult<Predicate<A>> {
        let kind = table.get(name).ok_or_else(|| {
            SearchError::Parse(format!("can't parse search: unrecognized clause {name:?}"))
        })?;

        let predicate = match *kind {
            ClauseKind::And => Predicate::All(self.sub_clauses(table, name, payload)?),
            ClauseKind::Or => Predicate::Any(self.sub_clauses(table, name, payload)?),
            ClauseKind::NoneOf => Predicate::NoneOf(self.sub_clauses(table, name, payload)?),
            ClauseKind::AlwaysTrue => Predicate::Const(true),
            ClauseKind::AlwaysFalse => Predicate::Const(false),
            ClauseKind::TextIsExactly(attr) => Predicate::Text {
                attr,
                test: TextTest::IsExactly(text(name, payload)?.to_string()),
            },
            ClauseKind::TextIsNot(attr) => Predicate::Text {
                attr,
                test: TextTest::IsNot(text(name, payload)?.to_string()),
            },
            ClauseKind::TextMatches(attr) => Predicate::Text {
                attr,
                test: TextTest::Matches(LikePattern::new(text(name, payload)?)?),
            },
            ClauseKind::IntIsExactly(attr) => Predicate::Number {
                attr,
                test: NumberTest::Equals(integer(name, payload)?),
            },
            ClauseKind::IntIsNot(attr) => Predicate::Number {
                attr,
                test: NumberTest::NotEquals(integer(name, payload)?),
            },
            ClauseKind::GreaterThan(attr) => Predicate::Number {
                attr,
                test: NumberTest::GreaterThan(numeric(name, payload)?),
            },
            ClauseKind::LessThan(attr) => Predicate::Number {
                attr,
                test: NumberTest::LessThan(numeric(name, payload)?),
            },
            ClauseKind::InRange(attr) => {
                let (lo, hi) = range(name, payload)?;
                Predicate::Number {
                    attr,
                    test: NumberTest::InRange(lo, hi),
                }
            }
            ClauseKind::NotInRange(attr) => {
                let (lo, hi) = range(name, payload)?;
                Predicate::Number {
                    attr,
                    test: NumberTest::NotInRange(lo, hi),
                }
            }
            ClauseKind::ObsMatches => {
                Predicate::Observation(Box::new(self.compile(&OBS_CLAUSES, payload)?))
            }
            ClauseKind::ObsProxy => {
                Predicate::Observation(Box::new(self.clause(&OBS_CLAUSES, name, payload)?))
            }
            ClauseKind::NotOlderThan => Predicate::CreatedAfter(self.cutoff(name, payload)?),
            ClauseKind::NotNewerThan => Predicate::CreatedBefore(self.cutoff(name, payload)?),
        };
        Ok(predicate)
    }

    fn sub_clauses<A: Copy>(
        &self,
        table: &ClauseTable<A>,
        name: &str,
        payload: &Value,
    ) -> SearchResult<Vec<Predicate<A>>> {
        let entries: &Map<String, Value> = payload
            .as_object()
            .filter(|map| !map.is_empty())
            .ok_or_else(|| SearchError::clause(name, "a non-empty object", payload))?;
        entries
            .iter()
            .map(|(sub_name, sub_payload)| self.clause(table, sub_name, sub_payload))
            .collect()
    }

    /// Epoch second `days` before now.
    fn cutoff(&self, name: &str, payload: &Value) -> SearchResult<u64> {
        let days = numeric(name, payload)?;
        let cutoff = self.now as f64 - days * SECONDS_PER_DAY as f64;
        Ok(cutoff.max(0.0) as u64)
    }
}

fn text<'a>(name: &str, payload: &'a Value) -> SearchResult<&'a str> {
    payload
        .as_str()
        .ok_or_else(|| SearchError::clause(name, "text", payload))
}

fn integer(name: &str, payload: &Value) -> SearchResult<i64> {
    payload
        .as_i64()
        .ok_or_else(|| SearchError::clause(name, "an integer", payload))
}

fn numeric(name: &str, payload: &Value) -> SearchResult<f64> {
    payload
        .as_f64()
        .ok_or_else(|| SearchError::clause(name, "numeric", payload))
}

/// A two-number list, returned low bound first.
fn range(name: &str, payload: &Value) -> SearchResult<(f64, f64)> {
    let bounds = payload
        .as_array()
        .filter(|items| items.len() == 2)
        .and_then(|items| Some((items[0].as_f64()?, items[1].as_f64()?)))
        .ok_or_else(|| SearchError::clause(name, "a list of two numbers", payload))?;
    let (a, b) = bounds;
    Ok(if a > b { (b, a) } else { (a, b) })
}
