use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Invalid {field} value: {value}")]
pub struct ParseEnumError {
    pub field: String,
    pub value: String,
}

/// Macro to generate enum with as_str + std::str::FromStr pattern
macro_rules! str_enum {
    ($name:ident { $($variant:ident => $s:literal),+ $(,)? }) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum $name {
            $(#[serde(rename = $s)] $variant),+
        }

        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $s),+
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl std::str::FromStr for $name {
            type Err = ParseEnumError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($s => Ok(Self::$variant)),+,
                    _ => Err(ParseEnumError {
                        field: stringify!($name).into(),
                        value: s.into(),
                    }),
                }
            }
        }
    };
}

str_enum!(Role {
    Doctor => "doctor",
    Receptionist => "receptionist",
});

str_enum!(Severity {
    Info => "info",
    Warning => "warning",
    Error => "error",
});

impl Role {
    /// Web route of the role's dashboard.
    pub fn home_path(&self) -> String {
        format!("/{}", self.as_str())
    }
}

impl Default for Role {
    fn default() -> Self {
        Self::Receptionist
    }
}

impl Default for Severity {
    fn default() -> Self {
        Self::Info
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn role_round_trips_through_str() {
        for role in [Role::Doctor, Role::Receptionist] {
            assert_eq!(Role::from_str(role.as_str()).unwrap(), role);
        }
        let err = Role::from_str("nurse").unwrap_err();
        assert_eq!(err.to_string(), "Invalid Role value: nurse");
    }

    #[test]
    fn role_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&Role::Doctor).unwrap(), "\"doctor\"");
        let role: Role = serde_json::from_str("\"receptionist\"").unwrap();
        assert_eq!(role, Role::Receptionist);
        assert_eq!(Role::Doctor.home_path(), "/doctor");
    }

    #[test]
    fn defaults() {
        assert_eq!(Role::default(), Role::Receptionist);
        assert_eq!(Severity::default(), Severity::Info);
        assert_eq!(Severity::Warning.to_string(), "warning");
    }
}
