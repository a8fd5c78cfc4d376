/*!
Wire representations of dates and timestamps.

Use these with `#[serde(with = "...")]` on entity fields.
*/
use serde::{de::Error as _, ser::Error as _, Deserialize, Deserializer, Serializer};
use time::{Date, OffsetDateTime};

use crate::{DATE_FMT, STAMP_FMT};

/// Clock used for every `createdAt`/`updatedAt`/`addedAt` stamp.
pub fn now() -> OffsetDateTime {
    OffsetDateTime::now_utc()
}

pub fn format_day(d: &Date) -> Result<String, String> {
    d.format(DATE_FMT)
        .map_err(|e| format!("Unable to format {:?} as date: {}", d, &e))
}

pub fn parse_day(s: &str) -> Result<Date, String> {
    Date::parse(s, DATE_FMT)
        .map_err(|e| format!("Unable to parse {:?} as date: {}", s, &e))
}

pub fn format_stamp(t: &OffsetDateTime) -> Result<String, String> {
    t.to_offset(time::UtcOffset::UTC)
        .format(STAMP_FMT)
        .map_err(|e| format!("Unable to format {:?} as timestamp: {}", t, &e))
}

pub fn parse_stamp(s: &str) -> Result<OffsetDateTime, String> {
    OffsetDateTime::parse(s, STAMP_FMT)
        .map_err(|e| format!("Unable to parse {:?} as timestamp: {}", s, &e))
}

/// `YYYY-MM-DD` dates.
pub mod day {
    use super::*;

    pub fn serialize<S: Serializer>(d: &Date, s: S) -> Result<S::Ok, S::Error> {
        let text = format_day(d).map_err(S::Error::custom)?;
        s.serialize_str(&text)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Date, D::Error> {
        let text = String::deserialize(d)?;
        parse_day(&text).map_err(D::Error::custom)
    }
}

/// Fixed-width UTC timestamps.
pub mod stamp {
    use super::*;

    pub fn serialize<S: Serializer>(t: &OffsetDateTime, s: S) -> Result<S::Ok, S::Error> {
        let text = format_stamp(t).map_err(S::Error::custom)?;
        s.serialize_str(&text)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<OffsetDateTime, D::Error> {
        let text = String::deserialize(d)?;
        parse_stamp(&text).map_err(D::Error::custom)
    }

    /// For timestamps a schemaless document may be missing.
    pub mod option {
        use super::*;

        pub fn serialize<S: Serializer>(
            t: &Option<OffsetDateTime>,
            s: S
        ) -> Result<S::Ok, S::Error> {
            match t {
                Some(t) => super::serialize(t, s),
                None => s.serialize_none(),
            }
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(
            d: D
        ) -> Result<Option<OffsetDateTime>, D::Error> {
            match Option::<String>::deserialize(d)? {
                Some(text) => parse_stamp(&text).map(Some).map_err(D::Error::custom),
                None => Ok(None),
            }
        }
    }
}
