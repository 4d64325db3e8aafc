//! Ready-made document transforms for [`Table::update`](crate::Table::update)
//!
//! ```
//! use pocketdb::{operations::increment, query::field, Database};
//! use serde_json::json;
//!
//! let db = Database::in_memory();
//! let counters = db.table("counters");
//! counters.insert(json!({"name": "hits", "n": 1})).unwrap();
//! counters.update(increment("n"), field("name").eq("hits")).unwrap();
//! ```

use std::fmt;
use std::sync::Arc;

use serde_json::{Number, Value};

use crate::document::Fields;
use crate::error::{Error, Result};

type TransformFn = Arc<dyn Fn(&mut Fields) -> Result<()> + Send + Sync>;

/// An in-place document transform
#[derive(Clone)]
pub struct Operation {
    name: &'static str,
    apply: TransformFn,
}

impl Operation {
    /// Wrap a custom transform
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&mut Fields) -> Result<()> + Send + Sync + 'static,
    {
        Self {
            name: "custom",
            apply: Arc::new(f),
        }
    }

    /// Apply to a document
    pub fn apply(&self, doc: &mut Fields) -> Result<()> {
        (self.apply)(doc)
    }
}

impl fmt::Debug for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Operation({})", self.name)
    }
}

fn named<F>(name: &'static str, f: F) -> Operation
where
    F: Fn(&mut Fields) -> Result<()> + Send + Sync + 'static,
{
    Operation {
        name,
        apply: Arc::new(f),
    }
}

/// Remove `field`
pub fn delete(field: impl Into<String>) -> Operation {
    let field = field.into();
    named("delete", move |doc| {
        doc.remove(&field)
            .map(drop)
            .ok_or_else(|| Error::FieldNotFound(field.clone()))
    })
}

/// Add `amount` to the numeric `field`
pub fn add(field: impl Into<String>, amount: impl Into<Value>) -> Operation {
    arithmetic("add", field.into(), amount.into(), false)
}

/// Subtract `amount` from the numeric `field`
pub fn subtract(field: impl Into<String>, amount: impl Into<Value>) -> Operation {
    arithmetic("subtract", field.into(), amount.into(), true)
}

/// Set `field` to `value`, creating it if missing
pub fn set(field: impl Into<String>, value: impl Into<Value>) -> Operation {
    let field = field.into();
    let value = value.into();
    named("set", move |doc| {
        doc.insert(field.clone(), value.clone());
        Ok(())
    })
}

/// Add one to the numeric `field`
pub fn increment(field: impl Into<String>) -> Operation {
    arithmetic("increment", field.into(), Value::from(1), false)
}

/// Subtract one from the numeric `field`
pub fn decrement(field: impl Into<String>) -> Operation {
    arithmetic("decrement", field.into(), Value::from(1), true)
}

fn arithmetic(name: &'static str, field: String, amount: Value, negate: bool) -> Operation {
    named(name, move |doc| {
        let current = doc
            .get_mut(&field)
            .ok_or_else(|| Error::FieldNotFound(field.clone()))?;

        let (Value::Number(lhs), Value::Number(rhs)) = (&*current, &amount) else {
            return Err(Error::NotNumeric(field.clone()));
        };

        *current = combine(lhs, rhs, negate);
        Ok(())
    })
}

/// Integer arithmetic while both sides are integers and it does not
/// overflow, float arithmetic otherwise
fn combine(lhs: &Number, rhs: &Number, negate: bool) -> Value {
    if let (Some(a), Some(b)) = (lhs.as_i64(), rhs.as_i64()) {
        let result = if negate { a.checked_sub(b) } else { a.checked_add(b) };
        if let Some(n) = result {
            return Value::from(n);
        }
    }

    let a = lhs.as_f64().unwrap_or(f64::NAN);
    let b = rhs.as_f64().unwrap_or(f64::NAN);
    let result = if negate { a - b } else { a + b };
    Number::from_f64(result).map(Value::Number).unwrap_or(Value::Null)
}
