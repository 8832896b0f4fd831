//! Helpers for the conventional record payload, `{"desc": ..., "data": ...}`.
//!
//! The composition core never looks inside a record. Collaborator stages use
//! these to agree on the envelope.

use serde::{Deserialize, Serialize, de::DeserializeOwned};

use crate::Record;
use crate::error::Result;

/// The conventional record envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope<T> {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub desc: Option<serde_json::Value>,
    pub data: T,
}

/// Encode `data` as `{"data": data}`.
pub fn wrap<T: Serialize>(data: &T) -> Result<Record> {
    Ok(serde_json::to_vec(&Envelope {
        desc: None,
        data,
    })?)
}

/// Decode the `data` field of an enveloped record.
pub fn unwrap<T: DeserializeOwned>(record: &[u8]) -> Result<T> {
    let envelope: Envelope<T> = serde_json::from_slice(record)?;
    Ok(envelope.data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn wrap_omits_missing_desc() {
        let record = wrap(&json!({"url": "file:///tmp/a"})).unwrap();
        assert_eq!(
            String::from_utf8(record).unwrap(),
            r#"{"data":{"url":"file:///tmp/a"}}"#
        );
    }

    #[test]
    fn unwrap_ignores_desc() {
        let data: Vec<i32> = unwrap(br#"{"desc": {"n": 3}, "data": [1, 2, 3]}"#).unwrap();
        assert_eq!(data, vec![1, 2, 3]);
    }

    #[test]
    fn unwrap_requires_data() {
        assert!(unwrap::<serde_json::Value>(br#"{"desc": 1}"#).is_err());
    }
}
