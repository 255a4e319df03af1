//! Typed meta-data documents exchanged during the session handshake.
//!
//! The wire format is JSON text. Maps are `BTreeMap` so member iteration is
//! name-sorted, which keeps binding order and response order deterministic
//! across re-binds.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::attribute::Attribute;
use crate::error::CoreError;

/// A client's meta-data request.
///
/// Absent unit fields fall back to the protocol defaults when resolved; the
/// `send` and `receive` maps go from object name to attribute name list.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RequestMetaData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub world: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub length_unit: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub angle_unit: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mass_unit: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_unit: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub handedness: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub send: BTreeMap<String, Vec<String>>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub receive: BTreeMap<String, Vec<String>>,
}

impl RequestMetaData {
    /// Parses a handshake payload.
    ///
    /// Returns `None` for keep-alive probes: empty payloads, payloads not
    /// starting with `{`, the bare `{}`, and anything that fails to parse.
    pub fn from_payload(payload: &[u8]) -> Option<RequestMetaData> {
        if payload.is_empty() || payload[0] != b'{' || is_empty_object(payload) {
            return None;
        }
        serde_json::from_slice(payload).ok()
    }

    /// Unions another request's send/receive declarations into this one.
    ///
    /// Used when two clients share a simulation identity: the merged document
    /// is what the surviving session renegotiates with.
    pub fn merge_from(&mut self, other: &RequestMetaData) {
        for (into, from) in [(&mut self.send, &other.send), (&mut self.receive, &other.receive)] {
            for (object, attributes) in from {
                let entry = into.entry(object.clone()).or_default();
                for attribute in attributes {
                    if !entry.contains(attribute) {
                        entry.push(attribute.clone());
                    }
                }
            }
        }
    }
}

/// True when the payload is exactly the two-byte close/probe object `{}`.
pub fn is_empty_object(payload: &[u8]) -> bool {
    payload.len() == 2 && payload[0] == b'{' && payload[1] == b'}'
}

/// The hub's meta-data response: the request echoed back with attribute name
/// lists replaced by current per-axis values in the client's unit frame.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResponseMetaData {
    pub world: String,
    pub angle_unit: String,
    pub length_unit: String,
    pub mass_unit: String,
    pub time_unit: String,
    pub handedness: String,
    pub time: f64,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub send: BTreeMap<String, BTreeMap<String, Vec<f64>>>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub receive: BTreeMap<String, BTreeMap<String, Vec<f64>>>,
}

impl ResponseMetaData {
    pub fn to_payload(&self) -> Vec<u8> {
        // Serialization of a map-and-scalar document cannot fail.
        serde_json::to_vec(self).unwrap_or_default()
    }
}

/// Resolves an object → attribute-name map into typed attributes, keeping the
/// client's declaration order within each object.
pub fn parse_attribute_map(
    raw: &BTreeMap<String, Vec<String>>,
) -> Result<BTreeMap<String, Vec<Attribute>>, CoreError> {
    let mut parsed = BTreeMap::new();
    for (object, names) in raw {
        let mut attributes = Vec::with_capacity(names.len());
        for name in names {
            let attribute =
                Attribute::from_name(name).ok_or_else(|| CoreError::UnknownAttribute(name.clone()))?;
            attributes.push(attribute);
        }
        parsed.insert(object.clone(), attributes);
    }
    Ok(parsed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keep_alive_payloads() {
        assert!(RequestMetaData::from_payload(b"").is_none());
        assert!(RequestMetaData::from_payload(b"{}").is_none());
        assert!(RequestMetaData::from_payload(b"ping").is_none());
        assert!(RequestMetaData::from_payload(b"{not json").is_none());
    }

    #[test]
    fn test_request_defaults() {
        let request = RequestMetaData::from_payload(br#"{"name": "sim"}"#).unwrap();
        assert_eq!(request.name.as_deref(), Some("sim"));
        assert!(request.world.is_none());
        assert!(request.send.is_empty());
        assert!(request.receive.is_empty());
    }

    #[test]
    fn test_request_full_document() {
        let request = RequestMetaData::from_payload(
            br#"{
                "name": "mujoco",
                "world": "lab",
                "length_unit": "cm",
                "handedness": "lhs",
                "send": {"box": ["position", "quaternion"]},
                "receive": {"": [""]}
            }"#,
        )
        .unwrap();
        assert_eq!(request.world.as_deref(), Some("lab"));
        assert_eq!(request.send["box"], vec!["position", "quaternion"]);
        assert_eq!(request.receive[""], vec![""]);
    }

    #[test]
    fn test_merge_unions_attribute_lists() {
        let mut merged = RequestMetaData::from_payload(
            br#"{"name": "a", "send": {"box": ["position"]}, "receive": {"box": ["force"]}}"#,
        )
        .unwrap();
        let other = RequestMetaData::from_payload(
            br#"{"name": "a", "send": {"box": ["position", "quaternion"], "lid": ["position"]}}"#,
        )
        .unwrap();

        merged.merge_from(&other);
        assert_eq!(merged.send["box"], vec!["position", "quaternion"]);
        assert_eq!(merged.send["lid"], vec!["position"]);
        assert_eq!(merged.receive["box"], vec!["force"]);
    }

    #[test]
    fn test_response_round_trip() {
        let mut response = ResponseMetaData {
            world: "world".into(),
            angle_unit: "rad".into(),
            length_unit: "m".into(),
            mass_unit: "kg".into(),
            time_unit: "s".into(),
            handedness: "rhs".into(),
            time: 1.5,
            ..Default::default()
        };
        response
            .send
            .entry("box".into())
            .or_default()
            .insert("position".into(), vec![0.1, 0.2, 0.3]);

        let payload = response.to_payload();
        let parsed: ResponseMetaData = serde_json::from_slice(&payload).unwrap();
        assert_eq!(parsed, response);

        // Empty sections stay off the wire.
        assert!(!String::from_utf8(payload).unwrap().contains("receive"));
    }

    #[test]
    fn test_parse_attribute_map_rejects_unknown() {
        let mut raw: BTreeMap<String, Vec<String>> = BTreeMap::new();
        raw.insert("box".into(), vec!["position".into(), "warp_drive".into()]);
        assert_eq!(
            parse_attribute_map(&raw),
            Err(CoreError::UnknownAttribute("warp_drive".into()))
        );
    }
}
