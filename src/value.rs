/// LiveGrid Value Implementation
///
/// A Value is a single scalar stored in a row field. Rows come from an external
/// data source with loosely typed fields, so the pipeline needs the same
/// coercions the data source assumes:
///
/// - the *string form* used by substring filters and group ordering
/// - the *numeric form* used by `gt`/`lt`/`gte`/`lte` filters
/// - *strict equality* (no coercion) used by `equals` filters and bucketing
/// - the *native ordering* used by the sort engine
///
/// A field that is absent from a row is represented as `None` at call sites
/// (`Option<&Value>`), which is distinct from an explicit `Value::Null`.
///
/// # Examples
///
/// ```
/// use livegrid::Value;
///
/// assert_eq!(Value::from(100).to_string_form(), "100");
/// assert_eq!(Value::from(" 42 ").to_number(), 42.0);
/// assert_eq!(Value::string_form_of(None), "undefined");
/// ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// Scalar field value.
///
/// Serialized untagged, so rows travel as plain JSON objects. Dates are the
/// exception: they are written as `{"$date": "<RFC 3339>"}` so they survive a
/// serialization round trip without degrading into strings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Bool(bool),
    Number(f64),
    Date(#[serde(with = "tagged_date")] DateTime<Utc>),
    String(String),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Number(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_date(&self) -> Option<DateTime<Utc>> {
        match self {
            Value::Date(v) => Some(*v),
            _ => None,
        }
    }

    /// String form of a present value.
    pub fn to_string_form(&self) -> String {
        match self {
            Value::Null => "null".to_string(),
            Value::Bool(b) => b.to_string(),
            Value::Number(n) => number_to_string(*n),
            Value::Date(d) => d.to_rfc3339(),
            Value::String(s) => s.clone(),
        }
    }

    /// String form of a possibly missing field. Missing fields render as
    /// `"undefined"` and nulls as `"null"`, so both take part in substring
    /// matching instead of being excluded.
    pub fn string_form_of(value: Option<&Value>) -> String {
        match value {
            Some(v) => v.to_string_form(),
            None => "undefined".to_string(),
        }
    }

    /// Numeric form of a present value. Unparseable strings yield NaN.
    pub fn to_number(&self) -> f64 {
        match self {
            Value::Null => 0.0,
            Value::Bool(true) => 1.0,
            Value::Bool(false) => 0.0,
            Value::Number(n) => *n,
            Value::Date(d) => d.timestamp_millis() as f64,
            Value::String(s) => parse_number(s),
        }
    }

    /// Numeric form of a possibly missing field. Missing fields are NaN, so
    /// every numeric comparison against them is false.
    pub fn number_of(value: Option<&Value>) -> f64 {
        value.map(Value::to_number).unwrap_or(f64::NAN)
    }

    /// Strict equality with no type coercion. `1` never equals `"1"`, NaN
    /// never equals itself, and a missing field equals nothing.
    pub fn strict_eq(field: Option<&Value>, other: &Value) -> bool {
        match field {
            Some(value) => value == other,
            None => false,
        }
    }

    /// Native relational ordering of two possibly missing values.
    ///
    /// Two strings compare lexically. Any other pairing compares numerically
    /// after coercion. Returns `None` when the values are neither less nor
    /// greater than each other (e.g. NaN, a missing field, a non-numeric
    /// string against a number). Callers treat `None` as a tie, which is not
    /// transitive across heterogeneous types.
    pub fn native_cmp(a: Option<&Value>, b: Option<&Value>) -> Option<Ordering> {
        match (a, b) {
            (Some(Value::String(a)), Some(Value::String(b))) => Some(a.cmp(b)),
            _ => Value::number_of(a).partial_cmp(&Value::number_of(b)),
        }
    }

    /// Hashable identity used to bucket rows by exact value.
    pub fn bucket_key(value: Option<&Value>) -> BucketKey {
        match value {
            None => BucketKey::Missing,
            Some(Value::Null) => BucketKey::Null,
            Some(Value::Bool(b)) => BucketKey::Bool(*b),
            Some(Value::Number(n)) => BucketKey::Number(canonical_bits(*n)),
            Some(Value::Date(d)) => BucketKey::Date(d.timestamp_millis()),
            Some(Value::String(s)) => BucketKey::String(s.clone()),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_string_form())
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Number(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Number(v as f64)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Number(v as f64)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(v: DateTime<Utc>) -> Self {
        Value::Date(v)
    }
}

/// Exact-equality key for grouping. Numbers use their bit pattern with `-0`
/// folded into `0` and every NaN folded into one key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum BucketKey {
    Missing,
    Null,
    Bool(bool),
    Number(u64),
    Date(i64),
    String(String),
}

fn canonical_bits(n: f64) -> u64 {
    if n.is_nan() {
        f64::NAN.to_bits()
    } else if n == 0.0 {
        0.0f64.to_bits()
    } else {
        n.to_bits()
    }
}

/// Number to string the way JavaScript's `String(n)` does it: positional
/// notation for decimal exponents in `-7..21`, otherwise `d.ddde±x`.
fn number_to_string(n: f64) -> String {
    if n.is_nan() {
        return "NaN".to_string();
    }
    if n.is_infinite() {
        let text = if n > 0.0 { "Infinity" } else { "-Infinity" };
        return text.to_string();
    }
    if n == 0.0 {
        return "0".to_string();
    }

    // Shortest round-trip digits, e.g. "1.2345e2"
    let scientific = format!("{:e}", n.abs());
    let (mantissa, exponent) = scientific.split_once('e').unwrap_or((scientific.as_str(), "0"));
    let digits: String = mantissa.chars().filter(|c| *c != '.').collect();
    let k = digits.len() as i32;
    // Position of the decimal point relative to the first digit
    let point = exponent.parse::<i32>().unwrap_or(0) + 1;

    let body = if k <= point && point <= 21 {
        format!("{}{}", digits, "0".repeat((point - k) as usize))
    } else if 0 < point && point <= 21 {
        let (int, frac) = digits.split_at(point as usize);
        format!("{}.{}", int, frac)
    } else if -6 < point && point <= 0 {
        format!("0.{}{}", "0".repeat(point.unsigned_abs() as usize), digits)
    } else {
        let (first, rest) = digits.split_at(1);
        let exp = point - 1;
        let exp_sign = if exp < 0 { '-' } else { '+' };
        if rest.is_empty() {
            format!("{}e{}{}", first, exp_sign, exp.abs())
        } else {
            format!("{}.{}e{}{}", first, rest, exp_sign, exp.abs())
        }
    };

    if n < 0.0 {
        format!("-{}", body)
    } else {
        body
    }
}

fn parse_number(s: &str) -> f64 {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        return 0.0;
    }
    match trimmed {
        "Infinity" | "+Infinity" => return f64::INFINITY,
        "-Infinity" => return f64::NEG_INFINITY,
        _ => {}
    }
    // Rust accepts "inf" and "nan" spellings that are not numbers here.
    if trimmed.chars().any(|c| c.is_ascii_alphabetic() && c != 'e' && c != 'E') {
        return f64::NAN;
    }
    trimmed.parse::<f64>().unwrap_or(f64::NAN)
}

mod tagged_date {
    use chrono::{DateTime, Utc};
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    #[derive(Serialize, Deserialize)]
    struct Tagged {
        #[serde(rename = "$date")]
        date: DateTime<Utc>,
    }

    pub fn serialize<S: Serializer>(date: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
        Tagged { date: *date }.serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
        Tagged::deserialize(deserializer).map(|t| t.date)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_string_form() {
        assert_eq!(Value::from(100).to_string_form(), "100");
        assert_eq!(Value::from(1.5).to_string_form(), "1.5");
        assert_eq!(Value::from(-0.0).to_string_form(), "0");
        assert_eq!(Value::from(f64::NAN).to_string_form(), "NaN");
        assert_eq!(Value::from(true).to_string_form(), "true");
        assert_eq!(Value::Null.to_string_form(), "null");
        assert_eq!(Value::string_form_of(None), "undefined");
    }

    #[test]
    fn test_number_string_form_switches_to_exponent() {
        let cases = [
            (1e21, "1e+21"),
            (1.5e21, "1.5e+21"),
            (123456789012345680000.0, "123456789012345680000"),
            (1e-7, "1e-7"),
            (-2.5e-8, "-2.5e-8"),
            (0.000001, "0.000001"),
            (0.1, "0.1"),
            (-42.125, "-42.125"),
        ];
        for (n, expected) in cases {
            assert_eq!(Value::from(n).to_string_form(), expected);
        }
    }

    #[test]
    fn test_numeric_coercion() {
        assert_eq!(Value::from("  12.5 ").to_number(), 12.5);
        assert_eq!(Value::from("").to_number(), 0.0);
        assert_eq!(Value::Null.to_number(), 0.0);
        assert_eq!(Value::from(true).to_number(), 1.0);
        assert!(Value::from("abc").to_number().is_nan());
        assert!(Value::from("inf").to_number().is_nan());
        assert_eq!(Value::from("Infinity").to_number(), f64::INFINITY);
        assert_eq!(Value::from("1e3").to_number(), 1000.0);
        assert!(Value::number_of(None).is_nan());
    }

    #[test]
    fn test_strict_equality_has_no_coercion() {
        assert!(Value::strict_eq(Some(&Value::from(1)), &Value::from(1)));
        assert!(!Value::strict_eq(Some(&Value::from(1)), &Value::from("1")));
        assert!(!Value::strict_eq(Some(&Value::from(f64::NAN)), &Value::from(f64::NAN)));
        assert!(!Value::strict_eq(None, &Value::Null));
        assert!(Value::strict_eq(Some(&Value::Null), &Value::Null));
    }

    #[test]
    fn test_native_ordering() {
        let a = Value::from("apple");
        let b = Value::from("banana");
        assert_eq!(Value::native_cmp(Some(&a), Some(&b)), Some(Ordering::Less));

        // "10" < "9" lexically, but 10 > 9 numerically
        let s10 = Value::from("10");
        let s9 = Value::from("9");
        assert_eq!(Value::native_cmp(Some(&s10), Some(&s9)), Some(Ordering::Less));
        assert_eq!(
            Value::native_cmp(Some(&Value::from(10)), Some(&Value::from(9))),
            Some(Ordering::Greater)
        );

        // Mixed pairing coerces; non-numeric text is incomparable
        assert_eq!(
            Value::native_cmp(Some(&Value::from("5")), Some(&Value::from(7))),
            Some(Ordering::Less)
        );
        assert_eq!(Value::native_cmp(Some(&Value::from("x")), Some(&Value::from(7))), None);
        assert_eq!(Value::native_cmp(None, Some(&Value::from(7))), None);
    }

    #[test]
    fn test_bucket_key_folds_zero_and_nan() {
        assert_eq!(
            Value::bucket_key(Some(&Value::from(0.0))),
            Value::bucket_key(Some(&Value::from(-0.0)))
        );
        assert_eq!(
            Value::bucket_key(Some(&Value::from(f64::NAN))),
            Value::bucket_key(Some(&Value::from(-f64::NAN)))
        );
        assert_ne!(
            Value::bucket_key(Some(&Value::from(1))),
            Value::bucket_key(Some(&Value::from("1")))
        );
        assert_ne!(Value::bucket_key(None), Value::bucket_key(Some(&Value::Null)));
    }

    #[test]
    fn test_json_shape() {
        let date = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
        let values = vec![
            Value::Null,
            Value::from(true),
            Value::from(2.5),
            Value::from("text"),
            Value::from(date),
        ];
        let json = serde_json::to_string(&values).unwrap();
        assert_eq!(
            json,
            r#"[null,true,2.5,"text",{"$date":"2024-03-01T12:00:00Z"}]"#
        );

        let back: Vec<Value> = serde_json::from_str(&json).unwrap();
        assert_eq!(back, values);

        // Integers in JSON become numbers
        let n: Value = serde_json::from_str("7").unwrap();
        assert_eq!(n, Value::from(7));
    }
}
