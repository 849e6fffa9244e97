use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, de::Error as _};
use std::{fmt::Display, str::FromStr};

/// Deserialize a `String` as the desired type.
pub fn de_str<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: FromStr,
    T::Err: Display,
{
    let data: &str = Deserialize::deserialize(deserializer)?;
    data.parse::<T>().map_err(D::Error::custom)
}

/// Deserialize a `u64` milliseconds value as `DateTime<Utc>`.
pub fn de_u64_epoch_ms_as_datetime_utc<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    let epoch_ms = u64::deserialize(deserializer)?;
    let epoch_ms = i64::try_from(epoch_ms).map_err(D::Error::custom)?;
    DateTime::<Utc>::from_timestamp_millis(epoch_ms)
        .ok_or_else(|| D::Error::custom(format!("epoch ms out of range: {epoch_ms}")))
}
