//! Compiled search predicates.
//!
//! Evaluation follows SQL's three-valued logic: a comparison against a null
//! attribute is unknown, unknown propagates through `and`/`or`/negation, and a
//! record is selected only when its predicate is definitely true.

use crate::like::LikePattern;
use crate::schema::{AttrValue, ObsAttr, Record};

#[derive(Debug, Clone)]
pub enum TextTest {
    IsExactly(String),
    IsNot(String),
    Matches(LikePattern),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum NumberTest {
    Equals(i64),
    NotEquals(i64),
    GreaterThan(f64),
    LessThan(f64),
    /// Inclusive; bounds are stored low then high.
    InRange(f64, f64),
    NotInRange(f64, f64),
}

#[derive(Debug, Clone)]
pub enum Predicate<A> {
    Const(bool),
    All(Vec<Predicate<A>>),
    Any(Vec<Predicate<A>>),
    NoneOf(Vec<Predicate<A>>),
    Text { attr: A, test: TextTest },
    Number { attr: A, test: NumberTest },
    /// Record created strictly after this epoch second.
    CreatedAfter(u64),
    /// Record created strictly before this epoch second.
    CreatedBefore(u64),
    /// The record's observation satisfies the inner predicate.
    Observation(Box<Predicate<ObsAttr>>),
}

impl<A: Copy> Predicate<A> {
    /// True when the record is selected.
    pub fn matches<R: Record<Attr = A>>(&self, record: &R) -> bool {
        self.eval(record) == Some(true)
    }

    /// Three-valued evaluation; `None` is SQL's unknown.
    pub fn eval<R: Record<Attr = A>>(&self, record: &R) -> Option<bool> {
        match self {
            Predicate::Const(value) => Some(*value),
            Predicate::All(parts) => all(parts.iter().map(|p| p.eval(record))),
            Predicate::Any(parts) => any(parts.iter().map(|p| p.eval(record))),
            Predicate::NoneOf(parts) => any(parts.iter().map(|p| p.eval(record))).map(|v| !v),
            Predicate::Text { attr, test } => match record.value(*attr) {
                AttrValue::Text(value) => Some(match test {
                    TextTest::IsExactly(expected) => value == expected,
                    TextTest::IsNot(expected) => value != expected,
                    TextTest::Matches(pattern) => pattern.is_match(value),
                }),
                _ => None,
            },
            Predicate::Number { attr, test } => match record.value(*attr) {
                AttrValue::Int(value) => Some(test.check_int(value)),
                AttrValue::Float(value) => Some(test.check_float(value)),
                _ => None,
            },
            Predicate::CreatedAfter(cutoff) => record.created_at().map(|t| t > *cutoff),
            Predicate::CreatedBefore(cutoff) => record.created_at().map(|t| t < *cutoff),
            Predicate::Observation(inner) => record.observation().map(|obs| inner.matches(&obs)),
        }
    }
}

impl NumberTest {
    fn check_int(&self, value: i64) -> bool {
        match *self {
            NumberTest::Equals(expected) => value == expected,
            NumberTest::NotEquals(expected) => value != expected,
            _ => self.check_float(value as f64),
        }
    }

    fn check_float(&self, value: f64) -> bool {
        match *self {
            NumberTest::Equals(expected) => value == expected as f64,
            NumberTest::NotEquals(expected) => value != expected as f64,
            NumberTest::GreaterThan(bound) => value > bound,
            NumberTest::LessThan(bound) => value < bound,
            NumberTest::InRange(lo, hi) => lo <= value && value <= hi,
            NumberTest::NotInRange(lo, hi) => value < lo || value > hi,
        }
    }
}

fn all(values: impl Iterator<Item = Option<bool>>) -> Option<bool> {
    let mut unknown = false;
    for value in values {
        match value {
            Some(false) => return Some(false),
            None => unknown = true,
            Some(true) => {}
        }
    }
    if unknown { None } else { Some(true) }
}

fn any(values: impl Iterator<Item = Option<bool>>) -> Option<bool> {
    let mut unknown = false;
    for value in values {
        match value {
            Some(true) => return Some(true),
            None => unknown = true,
            Some(false) => {}
        }
    }
    if unknown { None } else { Some(false) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{Attribute, AttrType};

    #[derive(Debug, Clone, Copy)]
    enum Attr {
        Label,
        Count,
    }

    impl Attribute for Attr {
        const ALL: &'static [(Self, &'static str, AttrType)] =
            &[(Attr::Label, "label", AttrType::Text), (Attr::Count, "count", AttrType::Int)];
    }

    struct Row {
        label: Option<&'static str>,
        count: Option<i64>,
    }

    impl Record for Row {
        type Attr = Attr;

        fn value(&self, attr: Attr) -> AttrValue<'_> {
            match attr {
                Attr::Label => self.label.map_or(AttrValue::Null, AttrValue::Text),
                Attr::Count => self.count.map_or(AttrValue::Null, AttrValue::Int),
            }
        }
    }

    fn count_is(n: i64) -> Predicate<Attr> {
        Predicate::Number {
            attr: Attr::Count,
            test: NumberTest::Equals(n),
        }
    }

    #[test]
    fn null_comparisons_are_unknown() {
        let row = Row { label: None, count: None };
        let not_x = Predicate::Text {
            attr: Attr::Label,
            test: TextTest::IsNot("x".into()),
        };
        assert_eq!(not_x.eval(&row), None);
        assert!(!not_x.matches(&row));
        assert!(!Predicate::NoneOf(vec![count_is(1)]).matches(&row));
    }

    #[test]
    fn unknown_does_not_mask_definite_results() {
        let row = Row { label: None, count: Some(3) };
        let unknown = Predicate::Text {
            attr: Attr::Label,
            test: TextTest::IsExactly("x".into()),
        };
        assert_eq!(Predicate::Any(vec![unknown.clone(), count_is(3)]).eval(&row), Some(true));
        assert_eq!(Predicate::All(vec![unknown.clone(), count_is(4)]).eval(&row), Some(false));
        assert_eq!(Predicate::All(vec![unknown, count_is(3)]).eval(&row), None);
    }

    #[test]
    fn range_bounds_are_inclusive() {
        let row = Row { label: Some("a"), count: Some(5) };
        let in_range = |lo, hi| Predicate::Number {
            attr: Attr::Count,
            test: NumberTest::InRange(lo, hi),
        };
        assert!(in_range(5.0, 9.0).matches(&row));
        assert!(in_range(1.0, 5.0).matches(&row));
        assert!(!in_range(5.5, 9.0).matches(&row));
    }

    #[test]
    fn records_without_creation_time_never_match_windows() {
        let row = Row { label: Some("a"), count: Some(1) };
        assert!(!Predicate::<Attr>::CreatedAfter(0).matches(&row));
        assert!(!Predicate::<Attr>::Observation(Box::new(Predicate::Const(true))).matches(&row));
    }
}
