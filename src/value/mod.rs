//! # Scalar Value Model
//!
//! A tagged union of the scalar types a graph attribute or record slot can
//! hold: null, bool, int64, double, string, point, array, map, vector.
//!
//! Cross-variant comparison follows [`Value::type_rank`], a fixed total
//! order used when encoding index keys (so that, e.g., every `Int64` sorts
//! before every `String` regardless of value).
//!
//! ## Usage
//!
//! ```rust
//! use graphcore::value::Value;
//!
//! let v = Value::Array(vec![Value::Int64(1), Value::String("x".into())]);
//! assert!(v.is_array());
//! ```

mod attribute_set;
mod point;

pub use attribute_set::{AttributeId, AttributeSet};
pub use point::Point;

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// A single map entry, kept as a sorted `(key, value)` pair so that map
/// equality and hashing are order-independent without paying for a
/// `HashMap` allocation on every small map value.
pub type MapEntries = BTreeMap<Arc<str>, Value>;

/// Tagged-union scalar value.
///
/// Free functions (not trait objects) dispatch on the variant throughout
/// this crate, per the design notes: this keeps `Value` `Copy`-free but
/// cheap to clone (strings and arrays are `Arc`-shared).
#[derive(Debug, Clone)]
pub enum Value {
    Null,
    Bool(bool),
    Int64(i64),
    Double(f64),
    String(Arc<str>),
    Point(Point),
    Array(Vec<Value>),
    Map(MapEntries),
    Vector(Arc<[f32]>),
}

impl Value {
    /// Fixed total order over variants, used for cross-type comparison and
    /// index-key encoding. Lower rank sorts first.
    fn type_rank(&self) -> u8 {
        match self {
            Value::Null => 0,
            Value::Bool(_) => 1,
            Value::Int64(_) => 2,
            Value::Double(_) => 3,
            Value::String(_) => 4,
            Value::Point(_) => 5,
            Value::Array(_) => 6,
            Value::Map(_) => 7,
            Value::Vector(_) => 8,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn is_array(&self) -> bool {
        matches!(self, Value::Array(_))
    }

    pub fn is_map(&self) -> bool {
        matches!(self, Value::Map(_))
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_int64(&self) -> Option<i64> {
        match self {
            Value::Int64(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_double(&self) -> Option<f64> {
        match self {
            Value::Double(d) => Some(*d),
            Value::Int64(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array(a) => Some(a),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&MapEntries> {
        match self {
            Value::Map(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_vector(&self) -> Option<&[f32]> {
        match self {
            Value::Vector(v) => Some(v),
            _ => None,
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int64(i)
    }
}

impl From<f64> for Value {
    fn from(d: f64) -> Self {
        Value::Double(d)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(Arc::from(s))
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(Arc::from(s.as_str()))
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int64(i) => write!(f, "{i}"),
            Value::Double(d) => write!(f, "{d}"),
            Value::String(s) => write!(f, "{s:?}"),
            Value::Point(p) => write!(f, "point({}, {})", p.latitude, p.longitude),
            Value::Array(a) => {
                write!(f, "[")?;
                for (i, v) in a.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{v}")?;
                }
                write!(f, "]")
            }
            Value::Map(m) => {
                write!(f, "{{")?;
                for (i, (k, v)) in m.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{k}: {v}")?;
                }
                write!(f, "}}")
            }
            Value::Vector(v) => {
                write!(f, "vecf32[{}]", v.len())
            }
        }
    }
}

/// Bitwise equality of doubles for `Eq`/`Hash` purposes (NaN == NaN here,
/// matching the total order used for index-key encoding rather than IEEE
/// comparison semantics used by the expression evaluator).
fn double_key(d: f64) -> u64 {
    if d.is_nan() {
        u64::MAX
    } else {
        d.to_bits()
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.cmp_total(other) == Ordering::Equal
    }
}

impl Eq for Value {}

impl PartialOrd for Value {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp_total(other))
    }
}

impl Ord for Value {
    fn cmp(&self, other: &Self) -> Ordering {
        self.cmp_total(other)
    }
}

impl Value {
    /// Total order used across variants: documented by spec as the order
    /// backing index-key encoding. Same-variant comparisons use the
    /// natural order of the contained type; cross-variant comparisons fall
    /// back to `type_rank`.
    fn cmp_total(&self, other: &Self) -> Ordering {
        use Value::*;
        match (self, other) {
            (Null, Null) => Ordering::Equal,
            (Bool(a), Bool(b)) => a.cmp(b),
            (Int64(a), Int64(b)) => a.cmp(b),
            (Double(a), Double(b)) => double_key(*a).cmp(&double_key(*b)),
            (Int64(a), Double(b)) => double_key(*a as f64).cmp(&double_key(*b)),
            (Double(a), Int64(b)) => double_key(*a).cmp(&double_key(*b as f64)),
            (String(a), String(b)) => a.cmp(b),
            (Point(a), Point(b)) => a.cmp(b),
            (Array(a), Array(b)) => a.cmp(b),
            (Map(a), Map(b)) => a.cmp(b),
            (Vector(a), Vector(b)) => {
                let a_bits: Vec<u32> = a.iter().map(|f| f.to_bits()).collect();
                let b_bits: Vec<u32> = b.iter().map(|f| f.to_bits()).collect();
                a_bits.cmp(&b_bits)
            }
            _ => self.type_rank().cmp(&other.type_rank()),
        }
    }
}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.type_rank().hash(state);
        match self {
            Value::Null => {}
            Value::Bool(b) => b.hash(state),
            Value::Int64(i) => i.hash(state),
            Value::Double(d) => double_key(*d).hash(state),
            Value::String(s) => s.hash(state),
            Value::Point(p) => p.hash(state),
            Value::Array(a) => a.hash(state),
            Value::Map(m) => {
                for (k, v) in m {
                    k.hash(state);
                    v.hash(state);
                }
            }
            Value::Vector(v) => {
                for f in v.iter() {
                    f.to_bits().hash(state);
                }
            }
        }
    }
}
