//! Typed decoding of column values and rows.

use crate::error::{Error, Result};
use crate::protocol::types::{ColumnInfo, Row, Value};

/// Trait for decoding a column value into a Rust type.
pub trait FromValue: Sized {
    /// Decode from NULL.
    ///
    /// Default implementation returns an error. Override for types that can
    /// represent NULL (like `Option<T>`).
    fn from_null() -> Result<Self> {
        Err(Error::Decode("unexpected NULL value".into()))
    }

    /// Decode from a non-NULL value.
    fn from_value(value: &Value) -> Result<Self>;
}

fn mismatch<T>(value: &Value, target: &str) -> Result<T> {
    Err(Error::Decode(format!("cannot decode {:?} as {}", value, target)))
}

impl<T: FromValue> FromValue for Option<T> {
    fn from_null() -> Result<Self> {
        Ok(None)
    }

    fn from_value(value: &Value) -> Result<Self> {
        T::from_value(value).map(Some)
    }
}

impl FromValue for bool {
    fn from_value(value: &Value) -> Result<Self> {
        match value {
            Value::Bool(v) => Ok(*v),
            other => mismatch(other, "bool"),
        }
    }
}

impl FromValue for i64 {
    fn from_value(value: &Value) -> Result<Self> {
        match value {
            Value::Int(v) => Ok(*v),
            Value::Uint(v) => {
                i64::try_from(*v).map_err(|_| Error::Decode(format!("i64 overflow: {}", v)))
            }
            other => mismatch(other, "i64"),
        }
    }
}

impl FromValue for i32 {
    fn from_value(value: &Value) -> Result<Self> {
        let v = i64::from_value(value)?;
        i32::try_from(v).map_err(|_| Error::Decode(format!("i32 overflow: {}", v)))
    }
}

impl FromValue for u64 {
    fn from_value(value: &Value) -> Result<Self> {
        match value {
            Value::Uint(v) => Ok(*v),
            Value::Int(v) => {
                u64::try_from(*v).map_err(|_| Error::Decode(format!("u64 overflow: {}", v)))
            }
            other => mismatch(other, "u64"),
        }
    }
}

impl FromValue for f64 {
    fn from_value(value: &Value) -> Result<Self> {
        match value {
            Value::Double(v) => Ok(*v),
            other => mismatch(other, "f64"),
        }
    }
}

impl FromValue for String {
    fn from_value(value: &Value) -> Result<Self> {
        match value {
            Value::Text(v) => Ok(v.clone()),
            Value::Bytes(v) => String::from_utf8(v.clone())
                .map_err(|e| Error::Decode(format!("invalid UTF-8: {}", e))),
            other => mismatch(other, "String"),
        }
    }
}

impl FromValue for Vec<u8> {
    fn from_value(value: &Value) -> Result<Self> {
        match value {
            Value::Bytes(v) => Ok(v.clone()),
            Value::Text(v) => Ok(v.as_bytes().to_vec()),
            other => mismatch(other, "Vec<u8>"),
        }
    }
}

impl FromValue for Value {
    fn from_null() -> Result<Self> {
        Ok(Value::Null)
    }

    fn from_value(value: &Value) -> Result<Self> {
        Ok(value.clone())
    }
}

/// Decode a single column value.
pub fn decode_value<T: FromValue>(value: Option<&Value>) -> Result<T> {
    match value {
        None | Some(Value::Null) => T::from_null(),
        Some(value) => T::from_value(value),
    }
}

/// Trait for decoding a row into a Rust type.
pub trait FromRow: Sized {
    /// Decode a row using column metadata.
    fn from_row(cols: &[ColumnInfo], row: &Row) -> Result<Self>;
}

macro_rules! impl_from_row_for_tuple {
    ($len:expr; $($t:ident => $idx:tt),+) => {
        impl<$($t: FromValue),+> FromRow for ($($t,)+) {
            fn from_row(cols: &[ColumnInfo], row: &Row) -> Result<Self> {
                if cols.len() < $len || row.len() < $len {
                    return Err(Error::Decode("not enough columns for tuple".into()));
                }
                Ok(($(decode_value::<$t>(row.value($idx))?,)+))
            }
        }
    };
}

impl_from_row_for_tuple!(1; T1 => 0);
impl_from_row_for_tuple!(2; T1 => 0, T2 => 1);
impl_from_row_for_tuple!(3; T1 => 0, T2 => 1, T3 => 2);
impl_from_row_for_tuple!(4; T1 => 0, T2 => 1, T3 => 2, T4 => 3);
impl_from_row_for_tuple!(5; T1 => 0, T2 => 1, T3 => 2, T4 => 3, T5 => 4);
impl_from_row_for_tuple!(6; T1 => 0, T2 => 1, T3 => 2, T4 => 3, T5 => 4, T6 => 5);
impl_from_row_for_tuple!(7; T1 => 0, T2 => 1, T3 => 2, T4 => 3, T5 => 4, T6 => 5, T7 => 6);
impl_from_row_for_tuple!(8; T1 => 0, T2 => 1, T3 => 2, T4 => 3, T5 => 4, T6 => 5, T7 => 6, T8 => 7);

#[cfg(test)]
mod tests {
    use super::*;

    fn cols(n: usize) -> Vec<ColumnInfo> {
        (0..n)
            .map(|i| ColumnInfo::new(format!("c{}", i), "Utf8"))
            .collect()
    }

    #[test]
    fn test_decode_tuple() {
        let row = Row::new(vec![
            Value::Int(7),
            Value::Text("seven".into()),
            Value::Null,
        ]);
        let (n, s, missing): (i32, String, Option<u64>) = FromRow::from_row(&cols(3), &row).unwrap();
        assert_eq!(n, 7);
        assert_eq!(s, "seven");
        assert_eq!(missing, None);
    }

    #[test]
    fn test_null_into_non_option_fails() {
        let row = Row::new(vec![Value::Null]);
        let decoded: Result<(i64,)> = FromRow::from_row(&cols(1), &row);
        assert!(matches!(decoded, Err(Error::Decode(_))));
    }

    #[test]
    fn test_not_enough_columns() {
        let row = Row::new(vec![Value::Int(1)]);
        let decoded: Result<(i64, i64)> = FromRow::from_row(&cols(1), &row);
        assert!(decoded.is_err());
    }

    #[test]
    fn test_integer_conversions() {
        assert_eq!(i64::from_value(&Value::Uint(5)).unwrap(), 5);
        assert!(i32::from_value(&Value::Int(i64::MAX)).is_err());
        assert!(u64::from_value(&Value::Int(-1)).is_err());
        assert!(bool::from_value(&Value::Int(1)).is_err());
    }
}
