//! Custom serde helpers for venue wire formats.

/// Deserializes Unix-millis into `DateTime<Utc>`.
///
/// Venues send event times as epoch milliseconds, either as a JSON number or
/// as a numeric string.
pub mod timestamp_ms {
    use chrono::{DateTime, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    pub(super) enum Millis {
        Num(i64),
        Str(String),
    }

    impl Millis {
        pub(super) fn into_datetime<E: serde::de::Error>(self) -> Result<DateTime<Utc>, E> {
            let millis = match self {
                Millis::Num(n) => n,
                Millis::Str(s) => s
                    .parse::<i64>()
                    .map_err(|_| E::custom(format!("Invalid timestamp: {}", s)))?,
            };
            DateTime::<Utc>::from_timestamp_millis(millis)
                .ok_or_else(|| E::custom(format!("Invalid timestamp: {}", millis)))
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Millis::deserialize(deserializer)?.into_datetime()
    }

    pub fn serialize<S>(value: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_i64(value.timestamp_millis())
    }
}

/// Optional variant of [`timestamp_ms`]. `null` and a missing field (with
/// `#[serde(default)]`) both read as `None`.
pub mod timestamp_ms_opt {
    use super::timestamp_ms::Millis;
    use chrono::{DateTime, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Option::<Millis>::deserialize(deserializer)?
            .map(Millis::into_datetime)
            .transpose()
    }

    pub fn serialize<S>(value: &Option<DateTime<Utc>>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match value {
            Some(dt) => serializer.serialize_some(&dt.timestamp_millis()),
            None => serializer.serialize_none(),
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::{DateTime, Utc};
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Serialize, Deserialize)]
    struct Stamped {
        #[serde(with = "super::timestamp_ms")]
        ts: DateTime<Utc>,
    }

    #[test]
    fn test_timestamp_ms_number_and_string() {
        let a: Stamped = serde_json::from_str(r#"{"ts":1700000000000}"#).unwrap();
        let b: Stamped = serde_json::from_str(r#"{"ts":"1700000000000"}"#).unwrap();
        assert_eq!(a.ts, b.ts);
        assert_eq!(a.ts.timestamp(), 1_700_000_000);
        assert_eq!(serde_json::to_string(&a).unwrap(), r#"{"ts":1700000000000}"#);
    }

    #[derive(Debug, Deserialize)]
    struct MaybeStamped {
        #[serde(default, with = "super::timestamp_ms_opt")]
        ts: Option<DateTime<Utc>>,
    }

    #[test]
    fn test_timestamp_ms_opt() {
        let a: MaybeStamped = serde_json::from_str(r#"{"ts":"1700000000000"}"#).unwrap();
        let b: MaybeStamped = serde_json::from_str(r#"{"ts":1700000000000}"#).unwrap();
        assert_eq!(a.ts, b.ts);
        assert!(a.ts.is_some());
        assert!(serde_json::from_str::<MaybeStamped>(r#"{"ts":null}"#).unwrap().ts.is_none());
        assert!(serde_json::from_str::<MaybeStamped>("{}").unwrap().ts.is_none());
        assert!(serde_json::from_str::<MaybeStamped>(r#"{"ts":"later"}"#).is_err());
    }

    #[test]
    fn test_timestamp_ms_rejects_garbage() {
        assert!(serde_json::from_str::<Stamped>(r#"{"ts":"soon"}"#).is_err());
    }
}
