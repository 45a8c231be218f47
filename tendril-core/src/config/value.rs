//! Conversions between typed property values and JSON
//!
//! Every type stored in a [`Property`](super::Property) implements
//! [`ConfigValue`]. Conversion from JSON is fallible: a value of the wrong
//! shape yields `None` and the property keeps its previous value.

use alloc::format;
use alloc::string::String;

use embassy_time::{Duration, TICK_HZ};
use serde_json::Value;

/// A type that can live in a configuration property
pub trait ConfigValue: Clone {
    /// Parse a JSON value, `None` when it has the wrong shape
    fn from_json(value: &Value) -> Option<Self>;

    /// Canonical JSON form
    fn to_json(&self) -> Value;
}

impl ConfigValue for bool {
    fn from_json(value: &Value) -> Option<Self> {
        value.as_bool()
    }

    fn to_json(&self) -> Value {
        Value::Bool(*self)
    }
}

macro_rules! unsigned_config_value {
    ($($t:ty),*) => {
        $(
            impl ConfigValue for $t {
                fn from_json(value: &Value) -> Option<Self> {
                    value.as_u64().and_then(|n| <$t>::try_from(n).ok())
                }

                fn to_json(&self) -> Value {
                    Value::from(*self)
                }
            }
        )*
    };
}

macro_rules! signed_config_value {
    ($($t:ty),*) => {
        $(
            impl ConfigValue for $t {
                fn from_json(value: &Value) -> Option<Self> {
                    value.as_i64().and_then(|n| <$t>::try_from(n).ok())
                }

                fn to_json(&self) -> Value {
                    Value::from(*self)
                }
            }
        )*
    };
}

unsigned_config_value!(u8, u16, u32, u64);
signed_config_value!(i8, i16, i32, i64);

impl ConfigValue for f32 {
    fn from_json(value: &Value) -> Option<Self> {
        value.as_f64().map(|f| f as f32)
    }

    fn to_json(&self) -> Value {
        Value::from(*self)
    }
}

impl ConfigValue for f64 {
    fn from_json(value: &Value) -> Option<Self> {
        value.as_f64()
    }

    fn to_json(&self) -> Value {
        Value::from(*self)
    }
}

impl ConfigValue for String {
    fn from_json(value: &Value) -> Option<Self> {
        value.as_str().map(String::from)
    }

    fn to_json(&self) -> Value {
        Value::String(self.clone())
    }
}

/// `null` maps to `None`
impl<T: ConfigValue> ConfigValue for Option<T> {
    fn from_json(value: &Value) -> Option<Self> {
        match value {
            Value::Null => Some(None),
            other => T::from_json(other).map(Some),
        }
    }

    fn to_json(&self) -> Value {
        match self {
            Some(value) => value.to_json(),
            None => Value::Null,
        }
    }
}

/// Longest duration a property accepts, in seconds
///
/// Half the tick range, so a timer deadline can still be added to the
/// current instant.
pub const MAX_DURATION_SECS: u64 = u64::MAX / TICK_HZ / 2;

fn duration_from_secs(secs: u64) -> Option<Duration> {
    (secs <= MAX_DURATION_SECS).then(|| Duration::from_secs(secs))
}

fn duration_from_millis(millis: u64) -> Option<Duration> {
    (millis / 1000 <= MAX_DURATION_SECS).then(|| Duration::from_millis(millis))
}

/// Durations load from a number of seconds or from a string with a unit
/// suffix (`ms`, `s`, `m`/`min`, `h`). They are stored as whole seconds
/// when possible, otherwise as milliseconds with the `ms` suffix.
/// Amounts above [`MAX_DURATION_SECS`] are rejected.
impl ConfigValue for Duration {
    fn from_json(value: &Value) -> Option<Self> {
        match value {
            Value::Number(n) => n.as_u64().and_then(duration_from_secs),
            Value::String(text) => parse_duration(text),
            _ => None,
        }
    }

    fn to_json(&self) -> Value {
        let millis = self.as_millis();
        if millis % 1000 == 0 {
            Value::from(millis / 1000)
        } else {
            Value::String(format!("{millis}ms"))
        }
    }
}

/// Parse a duration such as `"30"`, `"250ms"`, `"5min"` or `"1h"`
///
/// A bare number is seconds.
pub fn parse_duration(text: &str) -> Option<Duration> {
    let text = text.trim();
    let split = text
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(text.len());
    let (digits, unit) = text.split_at(split);
    let amount: u64 = digits.parse().ok()?;
    match unit.trim() {
        "ms" => duration_from_millis(amount),
        "" | "s" => duration_from_secs(amount),
        "m" | "min" => amount.checked_mul(60).and_then(duration_from_secs),
        "h" => amount.checked_mul(3600).and_then(duration_from_secs),
        _ => None,
    }
}

/// An embedded JSON document kept in serialized form
///
/// The outer schema treats it as opaque; its owner (a plugin factory)
/// parses it when needed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawJson(String);

impl RawJson {
    /// Serialize a JSON value
    pub fn from_value(value: &Value) -> Self {
        RawJson(serde_json::to_string(value).unwrap_or_default())
    }

    /// The serialized text
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Parse the embedded document
    pub fn parse(&self) -> Result<Value, serde_json::Error> {
        serde_json::from_str(&self.0)
    }
}

impl ConfigValue for RawJson {
    fn from_json(value: &Value) -> Option<Self> {
        serde_json::to_string(value).ok().map(RawJson)
    }

    fn to_json(&self) -> Value {
        self.parse().unwrap_or(Value::Null)
    }
}

/// Verbosity of published logs
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum LogLevel {
    None = 0,
    Error = 1,
    Warning = 2,
    Info = 3,
    Debug = 4,
    Verbose = 5,
}

impl LogLevel {
    /// Level used when the configuration does not name one
    pub const fn default_level() -> Self {
        if cfg!(feature = "debug") {
            LogLevel::Verbose
        } else {
            LogLevel::Info
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            LogLevel::None => "none",
            LogLevel::Error => "error",
            LogLevel::Warning => "warning",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Verbose => "verbose",
        }
    }

    fn from_name(name: &str) -> Option<Self> {
        match name {
            "none" => Some(LogLevel::None),
            "error" => Some(LogLevel::Error),
            "warning" | "warn" => Some(LogLevel::Warning),
            "info" => Some(LogLevel::Info),
            "debug" => Some(LogLevel::Debug),
            "verbose" | "trace" => Some(LogLevel::Verbose),
            _ => None,
        }
    }

    fn from_u64(value: u64) -> Option<Self> {
        match value {
            0 => Some(LogLevel::None),
            1 => Some(LogLevel::Error),
            2 => Some(LogLevel::Warning),
            3 => Some(LogLevel::Info),
            4 => Some(LogLevel::Debug),
            5 => Some(LogLevel::Verbose),
            _ => None,
        }
    }
}

impl ConfigValue for LogLevel {
    fn from_json(value: &Value) -> Option<Self> {
        match value {
            Value::String(name) => LogLevel::from_name(name),
            Value::Number(n) => n.as_u64().and_then(LogLevel::from_u64),
            _ => None,
        }
    }

    fn to_json(&self) -> Value {
        Value::from(self.as_str())
    }
}
