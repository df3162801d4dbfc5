use derive_more::{Display, Into};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Error;

/// Backend-assigned user identifier.
///
/// Guaranteed valid by construction: holding a `UserId` proves the id is a
/// positive integer. The backend sends ids either as JSON numbers or as
/// numeric strings; both are accepted. `null`, `""`, `0`, negative numbers and
/// non-numeric strings are rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Display, Into)]
pub struct UserId(u64);

impl UserId {
    #[must_use]
    pub fn get(self) -> u64 {
        self.0
    }
}

impl TryFrom<u64> for UserId {
    type Error = Error;

    fn try_from(id: u64) -> Result<Self, Self::Error> {
        if id > 0 {
            Ok(Self(id))
        } else {
            Err(Error::InvalidUserId(id.to_string()))
        }
    }
}

impl TryFrom<i64> for UserId {
    type Error = Error;

    fn try_from(id: i64) -> Result<Self, Self::Error> {
        u64::try_from(id)
            .map_err(|_| Error::InvalidUserId(id.to_string()))
            .and_then(Self::try_from)
    }
}

impl std::str::FromStr for UserId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if let Ok(n) = trimmed.parse::<u64>() {
            return Self::try_from(n);
        }
        // Numeric strings like "12.0" are still ids.
        match trimmed.parse::<f64>() {
            Ok(f) if f.is_finite() && f >= 1.0 && f.fract() == 0.0 && f <= u64::MAX as f64 => {
                Ok(Self(f as u64))
            }
            _ => Err(Error::InvalidUserId(s.to_owned())),
        }
    }
}

impl TryFrom<&Value> for UserId {
    type Error = Error;

    fn try_from(value: &Value) -> Result<Self, Self::Error> {
        match value {
            Value::Number(n) => {
                if let Some(u) = n.as_u64() {
                    Self::try_from(u)
                } else if let Some(i) = n.as_i64() {
                    Self::try_from(i)
                } else {
                    n.to_string().parse()
                }
            }
            Value::String(s) => s.parse(),
            other => Err(Error::InvalidUserId(other.to_string())),
        }
    }
}

impl Serialize for UserId {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(self.0)
    }
}

impl<'de> Deserialize<'de> for UserId {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Self::try_from(&value).map_err(serde::de::Error::custom)
    }
}

/// Returns `true` when `value` would be accepted as a [`UserId`].
#[must_use]
pub fn is_valid_user_id(value: &Value) -> bool {
    UserId::try_from(value).is_ok()
}
