//! Core data types for destra-rs
//!
//! # Main Types
//!
//! - [`Variable`] - A resolved, observable program variable: absolute
//!   address, size and encoding
//! - [`AddressStatus`] - How (or whether) the variable's address was
//!   determined from its location expression
//!
//! Variables are produced by symbol resolution and consumed by the
//! transport session, which peeks/pokes `size` bytes at `address` and
//! decodes them by `base_type`.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Outcome of resolving a variable's location
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum AddressStatus {
    /// Fixed address from a direct-address location expression
    #[default]
    Static,
    /// Stack variable; no absolute address exists
    FrameRelative,
    /// No location at all (extern, optimized out, register-resident)
    NoLocation,
    /// A location expression this resolver does not evaluate
    Unsupported,
}

impl AddressStatus {
    /// Only static addresses can be peeked/poked meaningfully
    pub fn is_readable(self) -> bool {
        self == AddressStatus::Static
    }
}

impl fmt::Display for AddressStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AddressStatus::Static => "static",
            AddressStatus::FrameRelative => "frame-relative",
            AddressStatus::NoLocation => "no location",
            AddressStatus::Unsupported => "unsupported location",
        };
        f.write_str(s)
    }
}

/// A resolved program variable
///
/// One exists per top-level symbol, per array element (`name[i]`) and per
/// struct member (`name.member`, recursively). Unresolvable addresses are
/// recorded as 0 with a non-static [`AddressStatus`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Variable {
    /// Unique key, including element/member suffixes
    pub name: String,
    /// Absolute target address
    pub address: u16,
    /// Size in bytes of the whole object
    pub size: u64,
    /// Primitive tag (`uint16`, `float`, ...), or `struct` / `union`; the
    /// aggregate's own name is in `struct_name`
    pub base_type: String,
    pub signed: bool,
    pub is_pointer: bool,
    /// Subrange lengths when the variable is an array
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub array_dimensions: Option<Vec<u64>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub struct_name: Option<String>,
    #[serde(default)]
    pub status: AddressStatus,
}

impl Variable {
    pub fn is_array(&self) -> bool {
        self.array_dimensions.is_some()
    }

    pub fn is_struct(&self) -> bool {
        self.struct_name.is_some()
    }

    /// A scalar that fits a single peek/poke frame
    pub fn is_scalar(&self) -> bool {
        !self.is_array() && !self.is_struct()
    }
}

impl Default for Variable {
    fn default() -> Self {
        Self {
            name: String::new(),
            address: 0,
            size: 0,
            base_type: String::new(),
            signed: false,
            is_pointer: false,
            array_dimensions: None,
            struct_name: None,
            status: AddressStatus::Static,
        }
    }
}

impl fmt::Display for Variable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} @0x{:04X} ({} byte(s), {}",
            self.name, self.address, self.size, self.base_type
        )?;
        if let Some(dims) = &self.array_dimensions {
            for d in dims {
                write!(f, "[{}]", d)?;
            }
        }
        if self.status != AddressStatus::Static {
            write!(f, ", {}", self.status)?;
        }
        write!(f, ")")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_variable_display() {
        let var = Variable {
            name: "buf".to_string(),
            address: 0x0120,
            size: 8,
            base_type: "uint16".to_string(),
            array_dimensions: Some(vec![4]),
            ..Default::default()
        };
        assert_eq!(var.to_string(), "buf @0x0120 (8 byte(s), uint16[4])");
        assert!(!var.is_scalar());
    }

    #[test]
    fn test_non_static_status_shown() {
        let var = Variable {
            name: "local".to_string(),
            size: 2,
            base_type: "int16".to_string(),
            status: AddressStatus::FrameRelative,
            ..Default::default()
        };
        assert!(var.to_string().contains("frame-relative"));
        assert!(!var.status.is_readable());
    }

    #[test]
    fn test_variable_json_omits_empty_options() {
        let var = Variable {
            name: "x".to_string(),
            size: 1,
            base_type: "uint8".to_string(),
            ..Default::default()
        };
        let json = serde_json::to_string(&var).unwrap();
        assert!(!json.contains("array_dimensions"));
        let back: Variable = serde_json::from_str(&json).unwrap();
        assert_eq!(back, var);
    }
}
