pub mod booking;
pub mod events;
pub mod seat;
pub mod trip;

/// Implements `as_str`, `Display` and `FromStr` for a fieldless status enum
/// using the same snake_case names serde writes.
macro_rules! status_strings {
    ($ty:ident { $($variant:ident => $name:literal),+ $(,)? }) => {
        impl $ty {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $($ty::$variant => $name),+
                }
            }
        }

        impl std::fmt::Display for $ty {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl std::str::FromStr for $ty {
            type Err = crate::UnknownStatus;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($name => Ok($ty::$variant),)+
                    other => Err(crate::UnknownStatus(other.to_string())),
                }
            }
        }
    };
}

pub(crate) use status_strings;
