/// Socket and port definitions
///
/// Sockets are the typed endpoints connections attach to. Compatibility is a
/// symmetric predicate with a universal `any` type; trigger sockets mark the
/// control-flow edges the ControlFlow engine walks.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Wire-level data type carried by a socket
///
/// `Any` is compatible with every other type. `Trigger` sockets carry no data
/// at all; a connection between two trigger sockets is a control-flow edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataType {
    Any,
    String,
    Number,
    Boolean,
    Object,
    Trigger,
}

/// A typed connection endpoint definition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Socket {
    /// Socket name (usually mirrors the port key)
    pub name: String,
    /// Carried data type, checked at connection time
    pub data_type: DataType,
    /// Whether this socket tolerates fan-in/fan-out beyond a single wire
    pub allows_multiple: bool,
}

impl Socket {
    pub fn new(name: impl Into<String>, data_type: DataType) -> Self {
        Self {
            name: name.into(),
            data_type,
            allows_multiple: false,
        }
    }

    /// Symmetric compatibility check
    ///
    /// True if either side is the universal `any` type or the types are
    /// identical. Connection creation consults this and rejects mismatches
    /// with a non-fatal notification, never a hard error.
    pub fn is_compatible_with(&self, other: &Socket) -> bool {
        self.data_type == DataType::Any
            || other.data_type == DataType::Any
            || self.data_type == other.data_type
    }
}

/// Authoring-control metadata attached to an input port
///
/// The `default` value backfills the input when no connection supplies it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControlDescriptor {
    /// Control widget kind (e.g. "text", "number"); opaque to the runtime
    pub kind: String,
    /// Fallback value used by input resolution when the port is unconnected
    pub default: Option<Value>,
}

/// A named connection point on a node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Port {
    pub socket: Socket,
    /// Human-readable label for editor collaborators
    pub label: String,
    /// Multi-connection ports resolve to arrays; single ports to one value
    pub multiple_connections: bool,
    /// Optional control descriptor supplying an input default
    pub control: Option<ControlDescriptor>,
}

impl Port {
    /// Single-connection data port
    pub fn data(label: impl Into<String>, data_type: DataType) -> Self {
        let label = label.into();
        Self {
            socket: Socket::new(label.clone(), data_type),
            label,
            multiple_connections: false,
            control: None,
        }
    }

    /// Data port accepting multiple connections (resolves to an array)
    pub fn multi(label: impl Into<String>, data_type: DataType) -> Self {
        let mut port = Self::data(label, data_type);
        port.socket.allows_multiple = true;
        port.multiple_connections = true;
        port
    }

    /// Control-flow trigger port
    pub fn trigger(label: impl Into<String>) -> Self {
        let mut port = Self::data(label, DataType::Trigger);
        port.socket.allows_multiple = true;
        port.multiple_connections = true;
        port
    }

    /// Attach a control descriptor with a default value
    pub fn with_default(mut self, kind: impl Into<String>, default: Value) -> Self {
        self.control = Some(ControlDescriptor {
            kind: kind.into(),
            default: Some(default),
        });
        self
    }

    pub fn is_trigger(&self) -> bool {
        self.socket.data_type == DataType::Trigger
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_types_are_compatible() {
        let a = Socket::new("a", DataType::String);
        let b = Socket::new("b", DataType::String);
        assert!(a.is_compatible_with(&b));
        assert!(b.is_compatible_with(&a));
    }

    #[test]
    fn any_is_compatible_with_everything() {
        let any = Socket::new("any", DataType::Any);
        for dt in [
            DataType::String,
            DataType::Number,
            DataType::Boolean,
            DataType::Object,
            DataType::Trigger,
        ] {
            let other = Socket::new("x", dt);
            assert!(any.is_compatible_with(&other));
            assert!(other.is_compatible_with(&any));
        }
    }

    #[test]
    fn mismatched_types_are_rejected() {
        let s = Socket::new("s", DataType::String);
        let n = Socket::new("n", DataType::Number);
        assert!(!s.is_compatible_with(&n));
        assert!(!n.is_compatible_with(&s));
    }

    #[test]
    fn trigger_ports_are_flagged() {
        assert!(Port::trigger("exec").is_trigger());
        assert!(!Port::data("value", DataType::Any).is_trigger());
    }
}
