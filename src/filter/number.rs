//! Generic numeric filter targets and their conversion to column types.

use std::fmt;

/// A filter target before it is narrowed to a column's primitive type.
#[derive(Debug, Clone, PartialEq)]
pub enum NumberObj {
    /// 8-bit integer.
    Byte(i8),
    /// 16-bit integer.
    Short(i16),
    /// 32-bit integer.
    Int(i32),
    /// 64-bit integer.
    Long(i64),
    /// 32-bit float.
    Float(f32),
    /// 64-bit float.
    Double(f64),
    /// Text that should parse as a number.
    String(String),
}

impl NumberObj {
    /// The value as an i64, if it is an integral number in range.
    pub fn to_i64(&self) -> Option<i64> {
        match self {
            NumberObj::Byte(v) => Some(*v as i64),
            NumberObj::Short(v) => Some(*v as i64),
            NumberObj::Int(v) => Some(*v as i64),
            NumberObj::Long(v) => Some(*v),
            NumberObj::Float(v) => integral_f64(*v as f64),
            NumberObj::Double(v) => integral_f64(*v),
            NumberObj::String(s) => {
                let s = s.trim();
                s.parse::<i64>().ok().or_else(|| s.parse::<f64>().ok().and_then(integral_f64))
            }
        }
    }

    /// The value as an f64.
    pub fn to_f64(&self) -> Option<f64> {
        match self {
            NumberObj::Byte(v) => Some(*v as f64),
            NumberObj::Short(v) => Some(*v as f64),
            NumberObj::Int(v) => Some(*v as f64),
            NumberObj::Long(v) => Some(*v as f64),
            NumberObj::Float(v) => Some(*v as f64),
            NumberObj::Double(v) => Some(*v),
            NumberObj::String(s) => s.trim().parse::<f64>().ok(),
        }
    }
}

fn integral_f64(v: f64) -> Option<i64> {
    if v.is_finite() && v.fract() == 0.0 && v >= i64::MIN as f64 && v < i64::MAX as f64 {
        Some(v as i64)
    } else {
        None
    }
}

macro_rules! number_obj_from {
    ($($t:ty => $variant:ident),* $(,)?) => {
        $(impl From<$t> for NumberObj {
            fn from(v: $t) -> Self {
                NumberObj::$variant(v)
            }
        })*
    };
}

number_obj_from!(i8 => Byte, i16 => Short, i32 => Int, i64 => Long, f32 => Float, f64 => Double, String => String);

impl From<&str> for NumberObj {
    fn from(v: &str) -> Self {
        NumberObj::String(v.to_string())
    }
}

/// A primitive column type that number filters can be narrowed to.
pub trait NumberPrimitive: Copy + PartialOrd + fmt::Debug + Send + Sync + 'static {
    /// Whether EQUAL / NOT_EQUAL may be decided by an index on this type.
    const SUPPORTS_EQUALITY: bool;

    /// Narrow a filter target; `None` if it is not representable.
    fn from_number(obj: &NumberObj) -> Option<Self>;
}

macro_rules! integer_primitive {
    ($($t:ty),*) => {
        $(impl NumberPrimitive for $t {
            const SUPPORTS_EQUALITY: bool = true;

            fn from_number(obj: &NumberObj) -> Option<Self> {
                <$t>::try_from(obj.to_i64()?).ok()
            }
        })*
    };
}

integer_primitive!(i8, i16, i32, i64);

impl NumberPrimitive for f32 {
    const SUPPORTS_EQUALITY: bool = false;

    fn from_number(obj: &NumberObj) -> Option<Self> {
        let v = obj.to_f64()?;
        if v.is_finite() && (v as f32).is_infinite() {
            return None;
        }
        Some(v as f32)
    }
}

impl NumberPrimitive for f64 {
    const SUPPORTS_EQUALITY: bool = false;

    fn from_number(obj: &NumberObj) -> Option<Self> {
        obj.to_f64()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_integer_narrowing() {
        assert_eq!(i8::from_number(&NumberObj::Int(100)), Some(100));
        assert_eq!(i8::from_number(&NumberObj::Int(300)), None);
        assert_eq!(i16::from_number(&NumberObj::Long(-40_000)), None);
        assert_eq!(i32::from_number(&NumberObj::Double(12.0)), Some(12));
        assert_eq!(i32::from_number(&NumberObj::Double(12.5)), None);
        assert_eq!(i64::from_number(&"42".into()), Some(42));
        assert_eq!(i64::from_number(&"4e1".into()), Some(40));
        assert_eq!(i64::from_number(&"abc".into()), None);
    }

    #[test]
    fn test_float_narrowing() {
        assert_eq!(f64::from_number(&NumberObj::Long(3)), Some(3.0));
        assert_eq!(f32::from_number(&NumberObj::Double(1e300)), None);
        assert_eq!(f32::from_number(&" 2.5 ".into()), Some(2.5));
        assert_eq!(f64::from_number(&"x".into()), None);
    }
}
