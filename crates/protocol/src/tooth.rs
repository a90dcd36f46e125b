use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use std::fmt;

/// Tooth identifier as reported by the imaging pipeline.
///
/// Numeric ids (JSON numbers or numeric strings) take part in range compression; anything else
/// is carried through as a label. Missing, null and `"unknown"` ids collapse to [`ToothId::Unknown`].
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ToothId {
    Number(u32),
    Label(String),
    #[default]
    Unknown,
}

impl ToothId {
    #[must_use]
    pub fn from_json(value: Option<&Value>) -> Self {
        match value {
            Some(Value::Number(n)) => n
                .as_u64()
                .and_then(|n| u32::try_from(n).ok())
                .map_or_else(|| Self::Label(n.to_string()), Self::Number),
            Some(Value::String(s)) => Self::parse(s),
            _ => Self::Unknown,
        }
    }

    #[must_use]
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();
        if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("unknown") {
            return Self::Unknown;
        }
        trimmed
            .parse::<u32>()
            .map_or_else(|_| Self::Label(trimmed.to_string()), Self::Number)
    }

    #[must_use]
    pub const fn as_number(&self) -> Option<u32> {
        match self {
            Self::Number(n) => Some(*n),
            _ => None,
        }
    }

    #[must_use]
    pub const fn is_numeric(&self) -> bool {
        matches!(self, Self::Number(_))
    }
}

impl fmt::Display for ToothId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{n}"),
            Self::Label(label) => f.write_str(label),
            Self::Unknown => f.write_str("Unknown"),
        }
    }
}

impl Serialize for ToothId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Number(n) => serializer.serialize_u32(*n),
            Self::Label(label) => serializer.serialize_str(label),
            Self::Unknown => serializer.serialize_str("unknown"),
        }
    }
}

impl<'de> Deserialize<'de> for ToothId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Ok(Self::from_json(Some(&value)))
    }
}
