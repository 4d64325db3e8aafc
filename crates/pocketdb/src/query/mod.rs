//! Composable document predicates
//!
//! A query is built in two stages: a [`Path`] names a field (and optionally
//! transforms it), then a terminal operator such as [`Path::eq`] or
//! [`Path::any`] turns it into a [`Query`]. Queries combine with `&`, `|`
//! and `!`.
//!
//! ```
//! use pocketdb::query::field;
//! use serde_json::json;
//!
//! let adult = field("age").ge(18);
//! let named = field("name").exists();
//! let q = adult & named;
//!
//! let doc = json!({"name": "Ada", "age": 36});
//! assert!(q.evaluate(doc.as_object().unwrap()).unwrap());
//! ```
//!
//! Every query carries an optional [`LookupKey`] describing its structure.
//! Queries with a key are cacheable: a table memoizes their results and
//! two queries with the same key are considered the same query. Queries
//! that wrap caller code (`test`, `map`, predicate conditions) have no key
//! and are never cached.

mod parser;

use std::borrow::Cow;
use std::collections::BTreeSet;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::ops::{BitAnd, BitOr, Not};
use std::sync::Arc;

use regex::{Regex, RegexBuilder};
use serde_json::Value;

use crate::document::Fields;
use crate::error::{PredicateError, Result};
use crate::frozen::{freeze, Frozen};

pub use parser::parse_path;

type TestFn = Arc<dyn Fn(&Fields) -> Result<bool> + Send + Sync>;
type ValueTestFn = Arc<dyn Fn(&Value) -> Result<bool> + Send + Sync>;

/// Transformation applied by [`Path::map`]
pub type MapFn = Arc<dyn Fn(&Value) -> Value + Send + Sync>;

/// Structural identity of a query
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum LookupKey {
    /// A terminal operator applied to a field path
    Op {
        /// Operator name (`"=="`, `"exists"`, `"any"`, ...)
        op: &'static str,
        /// Field names from the document root
        path: Vec<String>,
        /// Frozen argument of the operator
        operand: Operand,
    },
    /// Both sides hold
    And(Box<LookupKey>, Box<LookupKey>),
    /// Either side holds
    Or(Box<LookupKey>, Box<LookupKey>),
    /// Negation
    Not(Box<LookupKey>),
    /// Matches everything
    Noop,
}

/// Argument part of a [`LookupKey::Op`]
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Operand {
    /// Operator takes no argument
    None,
    /// A frozen literal
    Value(Frozen),
    /// A nested query (for `any`/`all`)
    Query(Box<LookupKey>),
}

/// Which operator a query was built from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryKind {
    /// `==`, `!=`, `<`, `<=`, `>`, `>=`
    Comparison(CmpOp),
    /// Field is present
    Exists,
    /// Full-string regex match
    Matches,
    /// Substring regex search
    Search,
    /// Caller-supplied test function
    Test,
    /// Some element satisfies a condition
    Any,
    /// Every element satisfies a condition
    All,
    /// Value is one of a set
    OneOf,
    /// Object contains the given key/value pairs
    Fragment,
    /// Conjunction
    And,
    /// Disjunction
    Or,
    /// Negation
    Not,
    /// Matches everything
    Noop,
}

/// Comparison operators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    /// `==`
    Eq,
    /// `!=`
    Ne,
    /// `<`
    Lt,
    /// `<=`
    Le,
    /// `>`
    Gt,
    /// `>=`
    Ge,
}

impl CmpOp {
    fn symbol(self) -> &'static str {
        match self {
            CmpOp::Eq => "==",
            CmpOp::Ne => "!=",
            CmpOp::Lt => "<",
            CmpOp::Le => "<=",
            CmpOp::Gt => ">",
            CmpOp::Ge => ">=",
        }
    }

    fn holds(self, lhs: &Frozen, rhs: &Frozen) -> bool {
        use std::cmp::Ordering::*;
        match self {
            CmpOp::Eq => lhs == rhs,
            CmpOp::Ne => lhs != rhs,
            CmpOp::Lt => lhs.query_cmp(rhs) == Some(Less),
            CmpOp::Le => matches!(lhs.query_cmp(rhs), Some(Less | Equal)),
            CmpOp::Gt => lhs.query_cmp(rhs) == Some(Greater),
            CmpOp::Ge => matches!(lhs.query_cmp(rhs), Some(Greater | Equal)),
        }
    }
}

/// Regex options for [`Path::matches_with`] and [`Path::search_with`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RegexFlags {
    /// Case-insensitive matching
    pub case_insensitive: bool,
    /// `^` and `$` match at line boundaries
    pub multi_line: bool,
    /// `.` also matches `\n`
    pub dot_all: bool,
}

impl RegexFlags {
    /// Case-insensitive flags
    pub fn ignore_case() -> Self {
        Self {
            case_insensitive: true,
            ..Self::default()
        }
    }

    fn bits(self) -> i64 {
        (self.case_insensitive as i64) | (self.multi_line as i64) << 1 | (self.dot_all as i64) << 2
    }

    fn build(self, pattern: &str) -> Result<Regex> {
        Ok(RegexBuilder::new(pattern)
            .case_insensitive(self.case_insensitive)
            .multi_line(self.multi_line)
            .dot_matches_new_line(self.dot_all)
            .build()?)
    }
}

/// Condition accepted by [`Path::any`] and [`Path::all`]
#[derive(Clone)]
pub enum Condition {
    /// Elements are objects that must satisfy the query
    Query(Query),
    /// Elements must satisfy the predicate
    Predicate(Arc<dyn Fn(&Value) -> bool + Send + Sync>),
    /// Elements must be one of these values
    Values(BTreeSet<Frozen>),
}

impl Condition {
    /// Wrap a predicate over single elements
    pub fn predicate<F>(f: F) -> Self
    where
        F: Fn(&Value) -> bool + Send + Sync + 'static,
    {
        Condition::Predicate(Arc::new(f))
    }

    /// Accept any of the given literal values
    pub fn values<I, T>(values: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<Value>,
    {
        Condition::Values(values.into_iter().map(|v| freeze(&v.into())).collect())
    }

    fn operand(&self) -> Option<Operand> {
        match self {
            Condition::Query(q) => q.key.clone().map(|k| Operand::Query(Box::new(k))),
            Condition::Predicate(_) => None,
            Condition::Values(values) => Some(Operand::Value(Frozen::Set(values.clone()))),
        }
    }

    fn check(&self, element: &Value) -> Result<bool> {
        match self {
            Condition::Query(q) => match element {
                Value::Object(fields) => q.evaluate(fields),
                _ => Ok(false),
            },
            Condition::Predicate(f) => Ok(f(element)),
            Condition::Values(values) => Ok(values.contains(&freeze(element))),
        }
    }

    fn is_empty_literal(&self) -> bool {
        matches!(self, Condition::Values(values) if values.is_empty())
    }
}

impl From<Query> for Condition {
    fn from(q: Query) -> Self {
        Condition::Query(q)
    }
}

impl From<&Query> for Condition {
    fn from(q: &Query) -> Self {
        Condition::Query(q.clone())
    }
}

impl<T: Into<Value>> From<Vec<T>> for Condition {
    fn from(values: Vec<T>) -> Self {
        Condition::values(values)
    }
}

impl<T: Into<Value>, const N: usize> From<[T; N]> for Condition {
    fn from(values: [T; N]) -> Self {
        Condition::values(values)
    }
}

impl fmt::Debug for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Condition::Query(q) => f.debug_tuple("Query").field(q).finish(),
            Condition::Predicate(_) => f.write_str("Predicate(..)"),
            Condition::Values(v) => f.debug_tuple("Values").field(v).finish(),
        }
    }
}

#[derive(Clone)]
enum Step {
    Field(String),
    Map(MapFn),
}

/// A field path, the first half of a query
#[derive(Clone)]
pub struct Path {
    steps: Vec<Step>,
}

/// Start a path at a top-level field
pub fn field(name: impl Into<String>) -> Path {
    Path {
        steps: vec![Step::Field(name.into())],
    }
}

impl Path {
    /// Parse a dotted path such as `address.city`
    pub fn parse(path: &str) -> Result<Path> {
        Ok(Path {
            steps: parse_path(path)?.into_iter().map(Step::Field).collect(),
        })
    }

    /// Descend into a sub-field
    pub fn field(&self, name: impl Into<String>) -> Path {
        let mut next = self.clone();
        next.steps.push(Step::Field(name.into()));
        next
    }

    /// Transform the value before the terminal operator sees it
    ///
    /// Queries built from a mapped path are not cacheable.
    pub fn map<F>(&self, f: F) -> Path
    where
        F: Fn(&Value) -> Value + Send + Sync + 'static,
    {
        let mut next = self.clone();
        next.steps.push(Step::Map(Arc::new(f)));
        next
    }

    /// Field names, or `None` if the path contains a `map` step
    fn key_path(&self) -> Option<Vec<String>> {
        self.steps
            .iter()
            .map(|step| match step {
                Step::Field(name) => Some(name.clone()),
                Step::Map(_) => None,
            })
            .collect()
    }

    /// Walk the path; `None` if a field is missing or a non-object is in the way
    fn resolve<'a>(&self, doc: &'a Fields) -> Option<Cow<'a, Value>> {
        let mut steps = self.steps.iter();
        let mut current: Cow<'a, Value> = match steps.next()? {
            Step::Field(name) => Cow::Borrowed(doc.get(name)?),
            Step::Map(f) => Cow::Owned(f(&Value::Object(doc.clone()))),
        };

        for step in steps {
            current = match step {
                Step::Field(name) => match current {
                    Cow::Borrowed(Value::Object(map)) => Cow::Borrowed(map.get(name)?),
                    Cow::Owned(Value::Object(mut map)) => Cow::Owned(map.remove(name)?),
                    _ => return None,
                },
                Step::Map(f) => Cow::Owned(f(&*current)),
            };
        }

        Some(current)
    }

    fn build(&self, kind: QueryKind, op: &'static str, operand: Option<Operand>, test: ValueTestFn) -> Query {
        let key = match (self.key_path(), operand) {
            (Some(path), Some(operand)) => Some(LookupKey::Op { op, path, operand }),
            _ => None,
        };

        let path = self.clone();
        Query {
            kind,
            key,
            test: Arc::new(move |doc: &Fields| match path.resolve(doc) {
                Some(value) => test(&*value),
                None => Ok(false),
            }),
        }
    }

    fn compare(&self, op: CmpOp, rhs: Value) -> Query {
        let rhs = freeze(&rhs);
        let operand = Operand::Value(rhs.clone());
        self.build(
            QueryKind::Comparison(op),
            op.symbol(),
            Some(operand),
            Arc::new(move |value: &Value| Ok(op.holds(&freeze(value), &rhs))),
        )
    }

    /// Field equals `rhs`
    pub fn eq(&self, rhs: impl Into<Value>) -> Query {
        self.compare(CmpOp::Eq, rhs.into())
    }

    /// Field exists and differs from `rhs`
    pub fn ne(&self, rhs: impl Into<Value>) -> Query {
        self.compare(CmpOp::Ne, rhs.into())
    }

    /// Field is less than `rhs`
    pub fn lt(&self, rhs: impl Into<Value>) -> Query {
        self.compare(CmpOp::Lt, rhs.into())
    }

    /// Field is less than or equal to `rhs`
    pub fn le(&self, rhs: impl Into<Value>) -> Query {
        self.compare(CmpOp::Le, rhs.into())
    }

    /// Field is greater than `rhs`
    pub fn gt(&self, rhs: impl Into<Value>) -> Query {
        self.compare(CmpOp::Gt, rhs.into())
    }

    /// Field is greater than or equal to `rhs`
    pub fn ge(&self, rhs: impl Into<Value>) -> Query {
        self.compare(CmpOp::Ge, rhs.into())
    }

    /// Field is present
    pub fn exists(&self) -> Query {
        self.build(
            QueryKind::Exists,
            "exists",
            Some(Operand::None),
            Arc::new(|_: &Value| Ok(true)),
        )
    }

    /// Field is a string fully matched by `pattern`
    pub fn matches(&self, pattern: &str) -> Result<Query> {
        self.matches_with(pattern, RegexFlags::default())
    }

    /// [`matches`](Self::matches) with regex flags
    pub fn matches_with(&self, pattern: &str, flags: RegexFlags) -> Result<Query> {
        let regex = flags.build(&format!(r"\A(?:{})\z", pattern))?;
        Ok(self.regex(QueryKind::Matches, "matches", pattern, flags, regex))
    }

    /// Field is a string containing a match for `pattern`
    pub fn search(&self, pattern: &str) -> Result<Query> {
        self.search_with(pattern, RegexFlags::default())
    }

    /// [`search`](Self::search) with regex flags
    pub fn search_with(&self, pattern: &str, flags: RegexFlags) -> Result<Query> {
        let regex = flags.build(pattern)?;
        Ok(self.regex(QueryKind::Search, "search", pattern, flags, regex))
    }

    fn regex(&self, kind: QueryKind, op: &'static str, pattern: &str, flags: RegexFlags, regex: Regex) -> Query {
        let operand = Operand::Value(Frozen::Seq(vec![
            Frozen::Str(pattern.to_string()),
            freeze(&Value::from(flags.bits())),
        ]));
        self.build(
            kind,
            op,
            Some(operand),
            Arc::new(move |value: &Value| Ok(value.as_str().map_or(false, |s| regex.is_match(s)))),
        )
    }

    /// Field exists and `f` returns true for it
    ///
    /// Not cacheable.
    pub fn test<F>(&self, f: F) -> Query
    where
        F: Fn(&Value) -> bool + Send + Sync + 'static,
    {
        self.build(QueryKind::Test, "test", None, Arc::new(move |value: &Value| Ok(f(value))))
    }

    /// Like [`test`](Self::test), but `f` may fail; its error is returned
    /// unchanged from evaluation as [`Error::Predicate`](crate::Error::Predicate)
    pub fn try_test<F>(&self, f: F) -> Query
    where
        F: Fn(&Value) -> std::result::Result<bool, PredicateError> + Send + Sync + 'static,
    {
        self.build(
            QueryKind::Test,
            "test",
            None,
            Arc::new(move |value: &Value| f(value).map_err(crate::Error::Predicate)),
        )
    }

    /// Field is an array with at least one element satisfying `cond`
    pub fn any(&self, cond: impl Into<Condition>) -> Query {
        let cond = cond.into();
        let operand = cond.operand();
        self.build(
            QueryKind::Any,
            "any",
            operand,
            Arc::new(move |value: &Value| {
                let Value::Array(items) = value else {
                    return Ok(false);
                };
                for item in items {
                    if cond.check(item)? {
                        return Ok(true);
                    }
                }
                Ok(false)
            }),
        )
    }

    /// Field is an array whose elements all satisfy `cond`
    ///
    /// An empty array passes; an empty list of literal values never does.
    pub fn all(&self, cond: impl Into<Condition>) -> Query {
        let cond = cond.into();
        let operand = cond.operand();
        self.build(
            QueryKind::All,
            "all",
            operand,
            Arc::new(move |value: &Value| {
                let Value::Array(items) = value else {
                    return Ok(false);
                };
                if cond.is_empty_literal() {
                    return Ok(false);
                }
                for item in items {
                    if !cond.check(item)? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }),
        )
    }

    /// Field equals one of `items`
    pub fn one_of<I, T>(&self, items: I) -> Query
    where
        I: IntoIterator<Item = T>,
        T: Into<Value>,
    {
        let items: BTreeSet<Frozen> = items.into_iter().map(|v| freeze(&v.into())).collect();
        let operand = Operand::Value(Frozen::Set(items.clone()));
        self.build(
            QueryKind::OneOf,
            "one_of",
            Some(operand),
            Arc::new(move |value: &Value| Ok(items.contains(&freeze(value)))),
        )
    }

    /// Field is an object containing every key of `partial` with an equal value
    pub fn fragment(&self, partial: Fields) -> Query {
        let operand = Operand::Value(freeze(&partial));
        self.build(
            QueryKind::Fragment,
            "fragment",
            Some(operand),
            Arc::new(move |value: &Value| {
                Ok(matches!(value, Value::Object(map) if contains_fragment(map, &partial)))
            }),
        )
    }
}

impl fmt::Debug for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<&str> = self
            .steps
            .iter()
            .map(|step| match step {
                Step::Field(name) => name.as_str(),
                Step::Map(_) => "<map>",
            })
            .collect();
        write!(f, "Path({})", parts.join("."))
    }
}

fn contains_fragment(doc: &Fields, partial: &Fields) -> bool {
    partial
        .iter()
        .all(|(k, v)| doc.get(k).map_or(false, |dv| freeze(dv) == freeze(v)))
}

/// A predicate over documents
///
/// Equality and hashing use only the [`LookupKey`].
#[derive(Clone)]
pub struct Query {
    kind: QueryKind,
    key: Option<LookupKey>,
    test: TestFn,
}

impl Query {
    /// Matches every document
    pub fn noop() -> Query {
        Query {
            kind: QueryKind::Noop,
            key: Some(LookupKey::Noop),
            test: Arc::new(|_: &Fields| Ok(true)),
        }
    }

    /// Document contains every key of `partial` with an equal value
    pub fn fragment(partial: Fields) -> Query {
        let operand = Operand::Value(freeze(&partial));
        Query {
            kind: QueryKind::Fragment,
            key: Some(LookupKey::Op {
                op: "fragment",
                path: Vec::new(),
                operand,
            }),
            test: Arc::new(move |doc: &Fields| Ok(contains_fragment(doc, &partial))),
        }
    }

    /// Evaluate against a document's fields
    pub fn evaluate(&self, doc: &Fields) -> Result<bool> {
        (self.test)(doc)
    }

    /// The operator this query was built from
    pub fn kind(&self) -> QueryKind {
        self.kind
    }

    /// Structural key, `None` for queries that wrap caller code
    pub fn lookup_key(&self) -> Option<&LookupKey> {
        self.key.as_ref()
    }

    /// Whether results of this query may be cached
    pub fn is_cacheable(&self) -> bool {
        self.key.is_some()
    }

    fn combine(kind: QueryKind, lhs: Query, rhs: Query) -> Query {
        let key = match (lhs.key.clone(), rhs.key.clone()) {
            (Some(a), Some(b)) => Some(match kind {
                QueryKind::And => LookupKey::And(Box::new(a), Box::new(b)),
                _ => LookupKey::Or(Box::new(a), Box::new(b)),
            }),
            _ => None,
        };

        let test: TestFn = match kind {
            QueryKind::And => Arc::new(move |doc: &Fields| Ok(lhs.evaluate(doc)? && rhs.evaluate(doc)?)),
            _ => Arc::new(move |doc: &Fields| Ok(lhs.evaluate(doc)? || rhs.evaluate(doc)?)),
        };

        Query { kind, key, test }
    }
}

impl BitAnd for Query {
    type Output = Query;

    fn bitand(self, rhs: Query) -> Query {
        Query::combine(QueryKind::And, self, rhs)
    }
}

impl BitOr for Query {
    type Output = Query;

    fn bitor(self, rhs: Query) -> Query {
        Query::combine(QueryKind::Or, self, rhs)
    }
}

impl BitAnd for &Query {
    type Output = Query;

    fn bitand(self, rhs: &Query) -> Query {
        Query::combine(QueryKind::And, self.clone(), rhs.clone())
    }
}

impl BitOr for &Query {
    type Output = Query;

    fn bitor(self, rhs: &Query) -> Query {
        Query::combine(QueryKind::Or, self.clone(), rhs.clone())
    }
}

impl Not for Query {
    type Output = Query;

    fn not(self) -> Query {
        let key = self.key.clone().map(|k| LookupKey::Not(Box::new(k)));
        Query {
            kind: QueryKind::Not,
            key,
            test: Arc::new(move |doc: &Fields| Ok(!self.evaluate(doc)?)),
        }
    }
}

impl Not for &Query {
    type Output = Query;

    fn not(self) -> Query {
        !self.clone()
    }
}

impl PartialEq for Query {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
    }
}

impl Eq for Query {}

impl Hash for Query {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key.hash(state);
    }
}

impl fmt::Debug for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.key {
            Some(key) => write!(f, "Query({:?})", key),
            None => write!(f, "Query({:?}, not cacheable)", self.kind),
        }
    }
}
