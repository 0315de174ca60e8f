//! Parameter typing: maps native Rust parameter types to tool schema kinds and
//! converts raw JSON argument values back into them.

use crate::{Error, ErrorContext, Result};
use serde::de::DeserializeOwned;
use serde_json::Value;

/// Semantic category of a parameter type, as seen by the schema compiler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SemanticType {
    Integer,
    Number,
    Boolean,
    String,
    /// Enumeration with its natural member names, in declaration order.
    Enum(&'static [&'static str]),
    /// Any other type. Rejected at registration time.
    Unsupported(&'static str),
}

/// A native type that can appear as a tool parameter.
///
/// `absent` supplies the value used when the caller omits the argument: the type's
/// default for value kinds, `None` for `Option<T>`. Absence never fails a call.
pub trait ToolParam: Sized + Send + 'static {
    fn semantic_type() -> SemanticType;

    /// `true` when absence is part of the type itself (`Option<T>`), which makes the
    /// parameter optional without an explicit marker.
    fn optional_by_type() -> bool {
        false
    }

    fn absent() -> Self;

    fn coerce(name: &str, raw: &Value) -> Result<Self>;
}

/// A fieldless enumeration usable as a tool parameter. Implemented by [`tool_enum!`].
///
/// [`tool_enum!`]: crate::tool_enum
pub trait ToolEnum: Sized + Copy + Send + 'static {
    const VARIANTS: &'static [&'static str];

    fn from_index(index: usize) -> Option<Self>;

    fn name(&self) -> &'static str;
}

/// Deserialize a raw argument into `T`, reporting incompatibility as a coercion error.
pub fn deserialize_arg<T: DeserializeOwned>(name: &str, raw: &Value) -> Result<T> {
    serde_json::from_value(raw.clone()).map_err(|e| Error::coercion(name, e.to_string()))
}

/// Case-insensitive member-name match for enum parameters.
pub fn coerce_enum<E: ToolEnum>(name: &str, raw: &Value) -> Result<E> {
    let text = match raw {
        Value::String(s) => s.as_str(),
        _ => "",
    };
    E::VARIANTS
        .iter()
        .position(|v| v.eq_ignore_ascii_case(text.trim()))
        .and_then(E::from_index)
        .ok_or_else(|| {
            Error::invalid_call_with_context(
                format!(
                    "Invalid enum value for parameter '{}'. Available options are: {}",
                    name,
                    E::VARIANTS.join(", ")
                ),
                ErrorContext::new()
                    .with_field_path(format!("arguments.{}", name))
                    .with_details(raw.to_string())
                    .with_source("argument_coercer"),
            )
        })
}

macro_rules! scalar_param {
    ($kind:ident => $($ty:ty),+ $(,)?) => {
        $(
            impl ToolParam for $ty {
                fn semantic_type() -> SemanticType {
                    SemanticType::$kind
                }

                fn absent() -> Self {
                    <$ty>::default()
                }

                fn coerce(name: &str, raw: &Value) -> Result<Self> {
                    deserialize_arg(name, raw)
                }
            }
        )+
    };
}

scalar_param!(Integer => i8, i16, i32, i64, isize, u8, u16, u32, u64, usize);
scalar_param!(Number => f32, f64);
scalar_param!(Boolean => bool);
scalar_param!(String => String, char, uuid::Uuid);
scalar_param!(String => chrono::DateTime<chrono::Utc>, chrono::NaiveDate, chrono::NaiveDateTime);

impl ToolParam for url::Url {
    fn semantic_type() -> SemanticType {
        SemanticType::String
    }

    fn absent() -> Self {
        url::Url::parse("about:blank").unwrap_or_else(|e| unreachable!("about:blank: {e}"))
    }

    fn coerce(name: &str, raw: &Value) -> Result<Self> {
        deserialize_arg(name, raw)
    }
}

/// Durations travel as `[-][d.]hh:mm:ss[.fffffff]` strings.
impl ToolParam for chrono::Duration {
    fn semantic_type() -> SemanticType {
        SemanticType::String
    }

    fn absent() -> Self {
        chrono::Duration::zero()
    }

    fn coerce(name: &str, raw: &Value) -> Result<Self> {
        raw.as_str()
            .and_then(parse_duration)
            .ok_or_else(|| {
                Error::coercion(
                    name,
                    format!("expected a duration like 'hh:mm:ss', got {}", raw),
                )
            })
    }
}

/// Parse `[-][d.]hh:mm:ss[.fffffff]`. Hours must be below 24 when days are given.
pub fn parse_duration(text: &str) -> Option<chrono::Duration> {
    let text = text.trim();
    let (negative, body) = match text.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, text),
    };

    let mut parts = body.split(':');
    let (head, minutes, seconds) = (parts.next()?, parts.next()?, parts.next()?);
    if parts.next().is_some() {
        return None;
    }

    let (days, hours) = match head.split_once('.') {
        Some((days, hours)) => {
            let hours = number(hours)?;
            if hours >= 24 {
                return None;
            }
            (number(days)?, hours)
        }
        None => (0, number(head)?),
    };
    let minutes = number(minutes)?;
    let (seconds, nanos) = match seconds.split_once('.') {
        Some((whole, fraction)) => (number(whole)?, fraction_nanos(fraction)?),
        None => (number(seconds)?, 0),
    };
    if minutes >= 60 || seconds >= 60 {
        return None;
    }

    let total = days
        .checked_mul(86_400)?
        .checked_add(hours.checked_mul(3_600)?)?
        .checked_add(minutes * 60 + seconds)?;
    let duration = chrono::Duration::try_seconds(i64::try_from(total).ok()?)?
        .checked_add(&chrono::Duration::nanoseconds(nanos))?;
    Some(if negative { -duration } else { duration })
}

/// Render a duration in the form [`parse_duration`] accepts.
pub fn format_duration(duration: &chrono::Duration) -> String {
    let sign = if *duration < chrono::Duration::zero() { "-" } else { "" };
    let seconds = duration.num_seconds().unsigned_abs();
    let nanos = duration.subsec_nanos().unsigned_abs();
    let (days, rest) = (seconds / 86_400, seconds % 86_400);

    let mut text = String::from(sign);
    if days > 0 {
        text.push_str(&format!("{}.", days));
    }
    text.push_str(&format!(
        "{:02}:{:02}:{:02}",
        rest / 3_600,
        rest % 3_600 / 60,
        rest % 60
    ));
    if nanos > 0 {
        let fraction = format!("{:09}", nanos);
        text.push('.');
        text.push_str(fraction.trim_end_matches('0'));
    }
    text
}

fn number(digits: &str) -> Option<u64> {
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

fn fraction_nanos(digits: &str) -> Option<i64> {
    if digits.is_empty() || digits.len() > 9 || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    format!("{:0<9}", digits).parse().ok()
}

impl<T: ToolParam> ToolParam for Option<T> {
    fn semantic_type() -> SemanticType {
        T::semantic_type()
    }

    fn optional_by_type() -> bool {
        true
    }

    fn absent() -> Self {
        None
    }

    fn coerce(name: &str, raw: &Value) -> Result<Self> {
        if raw.is_null() {
            return Ok(None);
        }
        T::coerce(name, raw).map(Some)
    }
}

impl<T: DeserializeOwned + Send + 'static> ToolParam for Vec<T> {
    fn semantic_type() -> SemanticType {
        SemanticType::Unsupported(std::any::type_name::<Self>())
    }

    fn absent() -> Self {
        Vec::new()
    }

    fn coerce(name: &str, raw: &Value) -> Result<Self> {
        deserialize_arg(name, raw)
    }
}

impl ToolParam for Value {
    fn semantic_type() -> SemanticType {
        SemanticType::Unsupported("serde_json::Value")
    }

    fn absent() -> Self {
        Value::Null
    }

    fn coerce(_name: &str, raw: &Value) -> Result<Self> {
        Ok(raw.clone())
    }
}

/// Declare a fieldless enum usable as a tool parameter (and tool result).
///
/// Member names become the schema's `enum` values; argument matching is
/// case-insensitive. The first member is used when the argument is omitted.
///
/// ```rust
/// ai_lib_realtime::tool_enum! {
///     pub enum Color { Red, Green, Blue }
/// }
/// ```
#[macro_export]
macro_rules! tool_enum {
    ($(#[$meta:meta])* $vis:vis enum $name:ident { $first:ident $(, $variant:ident)* $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        $vis enum $name {
            $first,
            $($variant),*
        }

        impl $crate::tools::ToolEnum for $name {
            const VARIANTS: &'static [&'static str] =
                &[stringify!($first) $(, stringify!($variant))*];

            fn from_index(index: usize) -> Option<Self> {
                [Self::$first $(, Self::$variant)*].get(index).copied()
            }

            fn name(&self) -> &'static str {
                match self {
                    Self::$first => stringify!($first),
                    $(Self::$variant => stringify!($variant),)*
                }
            }
        }

        impl $crate::tools::ToolParam for $name {
            fn semantic_type() -> $crate::tools::SemanticType {
                $crate::tools::SemanticType::Enum(
                    <Self as $crate::tools::ToolEnum>::VARIANTS,
                )
            }

            fn absent() -> Self {
                Self::$first
            }

            fn coerce(
                name: &str,
                raw: &$crate::__private::serde_json::Value,
            ) -> $crate::Result<Self> {
                $crate::tools::coerce_enum(name, raw)
            }
        }

        impl $crate::tools::ToolReturn for $name {
            fn render(&self) -> Option<String> {
                Some(<Self as $crate::tools::ToolEnum>::name(self).to_string())
            }
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    crate::tool_enum! {
        enum Color { Red, Green, Blue }
    }

    #[test]
    fn test_semantic_type_mapping() {
        assert_eq!(i32::semantic_type(), SemanticType::Integer);
        assert_eq!(u64::semantic_type(), SemanticType::Integer);
        assert_eq!(f64::semantic_type(), SemanticType::Number);
        assert_eq!(bool::semantic_type(), SemanticType::Boolean);
        assert_eq!(String::semantic_type(), SemanticType::String);
        assert_eq!(uuid::Uuid::semantic_type(), SemanticType::String);
        assert_eq!(url::Url::semantic_type(), SemanticType::String);
        assert_eq!(chrono::NaiveDate::semantic_type(), SemanticType::String);
        assert_eq!(chrono::Duration::semantic_type(), SemanticType::String);
        assert_eq!(Option::<i64>::semantic_type(), SemanticType::Integer);
        assert_eq!(
            Color::semantic_type(),
            SemanticType::Enum(&["Red", "Green", "Blue"])
        );
        assert!(matches!(
            Vec::<i32>::semantic_type(),
            SemanticType::Unsupported(_)
        ));
    }

    #[test]
    fn test_absent_values() {
        assert_eq!(i64::absent(), 0);
        assert!(!bool::absent());
        assert_eq!(String::absent(), "");
        assert_eq!(Option::<String>::absent(), None);
        assert_eq!(Color::absent(), Color::Red);
        assert_eq!(url::Url::absent().as_str(), "about:blank");
        assert_eq!(chrono::Duration::absent(), chrono::Duration::zero());
    }

    #[test]
    fn test_enum_matching_is_case_insensitive() {
        assert_eq!(coerce_enum::<Color>("c", &json!("red")).unwrap(), Color::Red);
        assert_eq!(coerce_enum::<Color>("c", &json!("BLUE")).unwrap(), Color::Blue);
    }

    #[test]
    fn test_unknown_enum_value_lists_options() {
        let err = coerce_enum::<Color>("color", &json!("purple")).unwrap_err();
        let text = err.to_string();
        assert!(matches!(err, Error::InvalidCall { .. }));
        assert!(text.contains("Red, Green, Blue"), "{}", text);
        assert!(text.contains("'color'"));
    }

    #[test]
    fn test_scalar_coercion_failure_is_coercion_error() {
        let err = i32::coerce("a", &json!("twelve")).unwrap_err();
        assert!(matches!(err, Error::Coercion { ref parameter, .. } if parameter == "a"));
        assert_eq!(Option::<i32>::coerce("a", &json!(null)).unwrap(), None);
        assert_eq!(Option::<i32>::coerce("a", &json!(7)).unwrap(), Some(7));
    }

    #[test]
    fn test_duration_forms() {
        let parsed = parse_duration("01:30:05").unwrap();
        assert_eq!(parsed, chrono::Duration::seconds(5_405));
        assert_eq!(
            parse_duration("2.03:00:00.25").unwrap(),
            chrono::Duration::hours(51) + chrono::Duration::milliseconds(250)
        );
        assert_eq!(parse_duration("-00:00:10").unwrap(), chrono::Duration::seconds(-10));
        for bad in ["", "90", "00:60:00", "1.24:00:00", "aa:bb:cc", "00:00:01.1234567890"] {
            assert!(parse_duration(bad).is_none(), "{}", bad);
        }
    }

    #[test]
    fn test_duration_rendering() {
        assert_eq!(format_duration(&chrono::Duration::seconds(5_405)), "01:30:05");
        assert_eq!(
            format_duration(&(chrono::Duration::hours(51) + chrono::Duration::milliseconds(250))),
            "2.03:00:00.25"
        );
        assert_eq!(format_duration(&chrono::Duration::seconds(-10)), "-00:00:10");
        assert_eq!(format_duration(&chrono::Duration::zero()), "00:00:00");
    }

    #[test]
    fn test_duration_coercion_failure() {
        let err = chrono::Duration::coerce("delay", &json!(90)).unwrap_err();
        assert!(matches!(err, Error::Coercion { ref parameter, .. } if parameter == "delay"));
    }
}
