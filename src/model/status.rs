//! Closed enums stored as labels.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::db::FieldValue;

/// Macro to generate a label enum with `as_str`, `FromStr` and `Display`.
macro_rules! label_enum {
    (
        $(#[$meta:meta])*
        $name:ident { $($variant:ident => $label:literal),+ $(,)? }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum $name {
            $(
                #[serde(rename = $label)]
                $variant,
            )+
        }

        impl $name {
            /// Stored label.
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $label,)+
                }
            }
        }

        impl FromStr for $name {
            type Err = UnknownLabel;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($label => Ok(Self::$variant),)+
                    other => Err(UnknownLabel {
                        kind: stringify!($name),
                        label: other.to_string(),
                    }),
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl From<$name> for FieldValue {
            fn from(v: $name) -> Self {
                FieldValue::Enum(v.as_str())
            }
        }
    };
}

/// A stored label that matches no variant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownLabel {
    pub kind: &'static str,
    pub label: String,
}

impl fmt::Display for UnknownLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown {} `{}`", self.kind, self.label)
    }
}

impl std::error::Error for UnknownLabel {}

label_enum!(
    /// Lifecycle state of a license.
    LicenseStatus {
        Active => "ACTIVE",
        Pending => "PENDING",
        Expired => "EXPIRED",
        Suspended => "SUSPENDED",
        Revoked => "REVOKED",
    }
);

label_enum!(
    /// Outcome of a compliance check.
    ComplianceStatus {
        Compliant => "COMPLIANT",
        NonCompliant => "NON_COMPLIANT",
        Pending => "PENDING",
        NeedsAttention => "NEEDS_ATTENTION",
    }
);
