//! Conversions between Rust types and [`Value`] through `rmp-serde`.
//!
//! Structs travel as maps with named fields. Byte buffers (`bytes::Bytes`,
//! `serde_bytes`-style fields) become [`Value::Bytes`].

use serde::de::DeserializeOwned;
use serde::Serialize;

use super::{decode, encode_with, BytesRepr, Value};
use crate::{Result, RpcError};

/// Convert any serializable value into a codec [`Value`].
pub fn to_value<T: Serialize + ?Sized>(value: &T) -> Result<Value> {
    // ---
    let packed =
        rmp_serde::to_vec_named(value).map_err(|e| RpcError::Serialization(e.to_string()))?;
    decode(&packed).map_err(|e| RpcError::Serialization(e.to_string()))
}

/// Convert a codec [`Value`] into a deserializable Rust type.
pub fn from_value<T: DeserializeOwned>(value: &Value) -> Result<T> {
    // ---
    let packed =
        encode_with(value, BytesRepr::Bin).map_err(|e| RpcError::Serialization(e.to_string()))?;
    rmp_serde::from_slice(&packed).map_err(|e| RpcError::Serialization(e.to_string()))
}

/// Flatten call arguments into a positional list.
///
/// Arguments are given as anything that serializes to a sequence: a tuple
/// (`(a, b)`, `(a,)`), an array or a `Vec`. `()` means no arguments.
pub(crate) fn to_args<A: Serialize + ?Sized>(args: &A) -> Result<Vec<Value>> {
    // ---
    match to_value(args)? {
        Value::Array(items) => Ok(items),
        Value::Nil => Ok(Vec::new()),
        other => Err(RpcError::Serialization(format!(
            "call arguments must serialize to a sequence (use a tuple), got {}",
            other.kind()
        ))),
    }
}

/// Inverse of [`to_args`] for handler parameters.
pub(crate) fn from_args<A: DeserializeOwned>(args: Vec<Value>) -> Result<A> {
    // ---
    if args.is_empty() {
        // `()` deserializes from nil, sequences from an empty array.
        if let Ok(unit) = from_value(&Value::Nil) {
            return Ok(unit);
        }
    }
    from_value(&Value::Array(args))
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use bytes::Bytes;
    use serde::Deserialize;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Reading {
        sensor: String,
        value: f64,
        raw: Bytes,
        tags: Option<Vec<String>>,
    }

    #[test]
    fn struct_becomes_named_map() {
        // ---
        let reading = Reading {
            sensor: "t1".into(),
            value: 21.5,
            raw: Bytes::from_static(b"\x01\x02"),
            tags: None,
        };

        let value = to_value(&reading).unwrap();
        assert_eq!(value.get("sensor"), Some(&Value::from("t1")));
        assert_eq!(value.get("value"), Some(&Value::Float(21.5)));
        assert_eq!(
            value.get("raw"),
            Some(&Value::Bytes(Bytes::from_static(b"\x01\x02")))
        );
        assert_eq!(value.get("tags"), Some(&Value::Nil));

        let back: Reading = from_value(&value).unwrap();
        assert_eq!(back, reading);
    }

    #[test]
    fn integers_widen_into_floats() {
        // ---
        let f: f64 = from_value(&Value::Int(3)).unwrap();
        assert_eq!(f, 3.0);
    }

    #[test]
    fn value_passes_through_unchanged() {
        // ---
        let v = Value::map([("blob", Value::Bytes(Bytes::from_static(b"xyz")))]);
        assert_eq!(to_value(&v).unwrap(), v);
        assert_eq!(from_value::<Value>(&v).unwrap(), v);
    }

    #[test]
    fn tuples_flatten_to_positional_args() {
        // ---
        assert_eq!(
            to_args(&(2, "x")).unwrap(),
            vec![Value::Int(2), Value::from("x")]
        );
        assert_eq!(to_args(&()).unwrap(), Vec::<Value>::new());
        assert!(to_args(&5).is_err());

        let (a, b): (i64, String) = from_args(vec![Value::Int(2), Value::from("x")]).unwrap();
        assert_eq!((a, b.as_str()), (2, "x"));

        let unit: () = from_args(Vec::new()).unwrap();
        assert_eq!(unit, ());
    }

    #[test]
    fn mismatched_shape_is_a_serialization_error() {
        // ---
        let err = from_value::<i64>(&Value::from("nope")).unwrap_err();
        assert!(matches!(err, RpcError::Serialization(_)));
    }
}
