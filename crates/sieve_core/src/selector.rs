//! Label selector requirements.
//!
//! A requirement is one `key <operator> values` clause of a label selector.
//! Construction validates the key and values against the Kubernetes label
//! charset and checks that the value count matches what the operator expects,
//! so anything holding a [`Requirement`] can rely on both. Operands of numeric
//! comparisons are exempt from the charset and are parsed at translation.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::{SieveError, SieveResult};

const MAX_NAME_LEN: usize = 63;
const MAX_PREFIX_LEN: usize = 253;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "&'static str")]
pub enum Operator {
    Exists,
    DoesNotExist,
    Equals,
    DoubleEquals,
    NotEquals,
    In,
    NotIn,
    GreaterThan,
    LessThan,
}

/// How many values an operator accepts.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Arity {
    None,
    One,
    AtLeastOne,
}

impl Operator {
    pub const ALL: [Operator; 9] = [
        Operator::Exists,
        Operator::DoesNotExist,
        Operator::Equals,
        Operator::DoubleEquals,
        Operator::NotEquals,
        Operator::In,
        Operator::NotIn,
        Operator::GreaterThan,
        Operator::LessThan,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Operator::Exists => "exists",
            Operator::DoesNotExist => "!",
            Operator::Equals => "=",
            Operator::DoubleEquals => "==",
            Operator::NotEquals => "!=",
            Operator::In => "in",
            Operator::NotIn => "notin",
            Operator::GreaterThan => "gt",
            Operator::LessThan => "lt",
        }
    }

    pub fn arity(self) -> Arity {
        match self {
            Operator::Exists | Operator::DoesNotExist => Arity::None,
            Operator::Equals
            | Operator::DoubleEquals
            | Operator::NotEquals
            | Operator::GreaterThan
            | Operator::LessThan => Arity::One,
            Operator::In | Operator::NotIn => Arity::AtLeastOne,
        }
    }

    /// Operators that compare the label value as an integer. Their operand is
    /// checked when the requirement is translated, not against the label
    /// charset.
    pub fn is_numeric(self) -> bool {
        matches!(self, Operator::GreaterThan | Operator::LessThan)
    }

    /// Operators whose match is the absence of a label row.
    pub fn is_negated(self) -> bool {
        matches!(
            self,
            Operator::DoesNotExist | Operator::NotEquals | Operator::NotIn
        )
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Operator {
    type Err = SieveError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "exists" => Ok(Operator::Exists),
            "!" => Ok(Operator::DoesNotExist),
            "=" => Ok(Operator::Equals),
            "==" => Ok(Operator::DoubleEquals),
            "!=" => Ok(Operator::NotEquals),
            "in" => Ok(Operator::In),
            "notin" => Ok(Operator::NotIn),
            "gt" | ">" => Ok(Operator::GreaterThan),
            "lt" | "<" => Ok(Operator::LessThan),
            other => Err(SieveError::unsupported_operator(other)),
        }
    }
}

impl TryFrom<String> for Operator {
    type Error = SieveError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Operator> for &'static str {
    fn from(value: Operator) -> Self {
        value.as_str()
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawRequirement", into = "RawRequirement")]
pub struct Requirement {
    key: String,
    operator: Operator,
    values: BTreeSet<String>,
}

/// Unvalidated wire form of a [`Requirement`].
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RawRequirement {
    pub key: String,
    pub operator: Operator,
    #[serde(default)]
    pub values: Vec<String>,
}

impl Requirement {
    pub fn new<I, S>(key: impl Into<String>, operator: Operator, values: I) -> SieveResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let key = key.into();
        validate_label_key(&key)?;
        let values = values
            .into_iter()
            .map(Into::into)
            .collect::<BTreeSet<String>>();
        if !operator.is_numeric() {
            for value in &values {
                validate_label_value(value)?;
            }
        }
        let count = values.len();
        let ok = match operator.arity() {
            Arity::None => count == 0,
            Arity::One => count == 1,
            Arity::AtLeastOne => count >= 1,
        };
        if !ok {
            return Err(SieveError::invalid_requirement(format!(
                "operator {operator} on '{key}' does not accept {count} value(s)"
            )));
        }
        Ok(Self {
            key,
            operator,
            values,
        })
    }

    pub fn exists(key: impl Into<String>) -> SieveResult<Self> {
        Self::new(key, Operator::Exists, Vec::<String>::new())
    }

    pub fn does_not_exist(key: impl Into<String>) -> SieveResult<Self> {
        Self::new(key, Operator::DoesNotExist, Vec::<String>::new())
    }

    pub fn equals(key: impl Into<String>, value: impl Into<String>) -> SieveResult<Self> {
        let value: String = value.into();
        Self::new(key, Operator::Equals, [value])
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn operator(&self) -> Operator {
        self.operator
    }

    pub fn values(&self) -> &BTreeSet<String> {
        &self.values
    }

    /// The single operand of a one-value operator.
    pub fn first_value(&self) -> Option<&str> {
        self.values.iter().next().map(String::as_str)
    }
}

impl TryFrom<RawRequirement> for Requirement {
    type Error = SieveError;

    fn try_from(raw: RawRequirement) -> Result<Self, Self::Error> {
        Requirement::new(raw.key, raw.operator, raw.values)
    }
}

impl From<Requirement> for RawRequirement {
    fn from(value: Requirement) -> Self {
        Self {
            key: value.key,
            operator: value.operator,
            values: value.values.into_iter().collect(),
        }
    }
}

impl fmt::Display for Requirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let joined = || self.values.iter().cloned().collect::<Vec<_>>().join(",");
        match self.operator {
            Operator::Exists => write!(f, "{}", self.key),
            Operator::DoesNotExist => write!(f, "!{}", self.key),
            Operator::Equals | Operator::DoubleEquals | Operator::NotEquals => {
                write!(f, "{}{}{}", self.key, self.operator, joined())
            }
            Operator::In => write!(f, "{} in ({})", self.key, joined()),
            Operator::NotIn => write!(f, "{} notin ({})", self.key, joined()),
            Operator::GreaterThan => write!(f, "{}>{}", self.key, joined()),
            Operator::LessThan => write!(f, "{}<{}", self.key, joined()),
        }
    }
}

pub fn validate_label_key(key: &str) -> SieveResult<()> {
    let (prefix, name) = match key.split_once('/') {
        Some((prefix, name)) => (Some(prefix), name),
        None => (None, key),
    };
    if let Some(prefix) = prefix
        && !is_dns_subdomain(prefix)
    {
        return Err(SieveError::invalid_requirement(format!(
            "label key prefix '{prefix}' must be a DNS subdomain"
        )));
    }
    if name.is_empty() || !is_qualified_name(name) {
        return Err(SieveError::invalid_requirement(format!(
            "label key '{key}' must be 1-{MAX_NAME_LEN} alphanumeric characters, '-', '_' or '.'"
        )));
    }
    Ok(())
}

pub fn validate_label_value(value: &str) -> SieveResult<()> {
    if value.is_empty() || is_qualified_name(value) {
        Ok(())
    } else {
        Err(SieveError::invalid_requirement(format!(
            "label value '{value}' must be empty or a label name of at most {MAX_NAME_LEN} chars"
        )))
    }
}

fn is_qualified_name(name: &str) -> bool {
    let bytes = name.as_bytes();
    let (Some(first), Some(last)) = (bytes.first(), bytes.last()) else {
        return false;
    };
    bytes.len() <= MAX_NAME_LEN
        && first.is_ascii_alphanumeric()
        && last.is_ascii_alphanumeric()
        && bytes
            .iter()
            .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'-' | b'_' | b'.'))
}

fn is_dns_subdomain(prefix: &str) -> bool {
    !prefix.is_empty()
        && prefix.len() <= MAX_PREFIX_LEN
        && prefix.split('.').all(|part| {
            let bytes = part.as_bytes();
            match (bytes.first(), bytes.last()) {
                (Some(first), Some(last)) => {
                    first.is_ascii_alphanumeric()
                        && last.is_ascii_alphanumeric()
                        && bytes
                            .iter()
                            .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || *b == b'-')
                }
                _ => false,
            }
        })
}
