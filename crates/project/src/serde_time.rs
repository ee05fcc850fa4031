use chrono::{DateTime, SecondsFormat, Utc};
use serde::de::{Error as DeError, Visitor};
use serde::{Deserializer, Serializer};

/// Serialises a timestamp as an ISO-8601 string with millisecond precision
/// and a `Z` suffix.
/// 以毫秒精度與 `Z` 結尾的 ISO-8601 字串輸出時間戳記。
pub fn serialize<S>(value: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_str(&value.to_rfc3339_opts(SecondsFormat::Millis, true))
}

/// Parses any RFC 3339 timestamp and normalises it to UTC.
/// 解析任意 RFC 3339 時間並轉為 UTC。
pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    struct TimestampVisitor;

    impl<'de> Visitor<'de> for TimestampVisitor {
        type Value = DateTime<Utc>;

        fn expecting(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
            formatter.write_str("an RFC 3339 timestamp string")
        }

        fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
        where
            E: DeError,
        {
            DateTime::parse_from_rfc3339(v)
                .map(|parsed| parsed.with_timezone(&Utc))
                .map_err(|err| E::custom(format!("invalid timestamp {v:?}: {err}")))
        }
    }

    deserializer.deserialize_str(TimestampVisitor)
}
