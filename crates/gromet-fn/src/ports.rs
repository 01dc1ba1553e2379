//! Ports and wires.

use serde::{Deserialize, Serialize};

/// An attachment point on a box.
///
/// `id` is the port's 1-based position among the ports of the *same box*
/// within one table; it is computed by the append helpers in
/// [`crate::network`], never chosen by callers. `box_id` is the 1-based
/// position of the owning box in its box table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GrometPort {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(rename = "box")]
    pub box_id: usize,
    /// Default value for ports backing defaulted formal parameters.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_value: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<usize>,
}

impl GrometPort {
    /// An anonymous port on the given box.
    pub fn new(box_id: usize) -> Self {
        Self {
            id: None,
            name: None,
            box_id,
            default_value: None,
            metadata: None,
        }
    }

    /// A named port on the given box.
    pub fn named(name: impl Into<String>, box_id: usize) -> Self {
        Self {
            name: Some(name.into()),
            ..Self::new(box_id)
        }
    }

    pub fn with_metadata(mut self, metadata: Option<usize>) -> Self {
        self.metadata = metadata;
        self
    }
}

/// A directed edge between two port-table positions.
///
/// Endpoints are 1-based table positions. `None` is the documented
/// unresolved/dangling endpoint, which serializes as `-1`; consumers must
/// treat `-1` as a sentinel, never as a valid index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GrometWire {
    #[serde(with = "wire_endpoint")]
    pub src: Option<usize>,
    #[serde(with = "wire_endpoint")]
    pub tgt: Option<usize>,
}

impl GrometWire {
    /// A wire with both endpoints resolved.
    pub fn connected(src: usize, tgt: usize) -> Self {
        Self {
            src: Some(src),
            tgt: Some(tgt),
        }
    }

    /// A wire whose target producer is structurally absent.
    pub fn dangling_tgt(src: usize) -> Self {
        Self {
            src: Some(src),
            tgt: None,
        }
    }

    pub fn is_resolved(&self) -> bool {
        self.src.is_some() && self.tgt.is_some()
    }
}

/// Serde adapter for the `-1` unresolved-endpoint sentinel.
mod wire_endpoint {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(v: &Option<usize>, s: S) -> Result<S::Ok, S::Error> {
        match v {
            Some(n) => s.serialize_i64(*n as i64),
            None => s.serialize_i64(-1),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<usize>, D::Error> {
        let n = i64::deserialize(d)?;
        if n < 0 {
            Ok(None)
        } else {
            Ok(Some(n as usize))
        }
    }
}
