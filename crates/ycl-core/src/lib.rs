//! Core domain model for the YC company ledger: source records and ledger rows.

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

pub const CRATE_NAME: &str = "ycl-core";

/// Ledger header, in the fixed column order every row is written in.
pub const LEDGER_COLUMNS: [&str; 18] = [
    "id",
    "name",
    "slug",
    "website",
    "batch",
    "stage",
    "status",
    "industry",
    "subindustry",
    "all_locations",
    "team_size",
    "launched_at_date",
    "one_liner",
    "url",
    "api",
    "tags",
    "regions",
    "industries",
];

/// Separator used when flattening list-valued fields into a single cell.
pub const LIST_SEPARATOR: &str = ", ";

/// One company entry as published by the remote listing.
///
/// Every field is optional and decoded leniently: a field of an unexpected
/// JSON type degrades to `None` (or an empty list) instead of failing the
/// whole document.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CompanyRecord {
    #[serde(default, deserialize_with = "lenient::identifier")]
    pub id: Option<String>,
    #[serde(default, deserialize_with = "lenient::text")]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "lenient::text")]
    pub slug: Option<String>,
    #[serde(default, deserialize_with = "lenient::text")]
    pub website: Option<String>,
    #[serde(default, deserialize_with = "lenient::text")]
    pub batch: Option<String>,
    #[serde(default, deserialize_with = "lenient::text")]
    pub stage: Option<String>,
    #[serde(default, deserialize_with = "lenient::text")]
    pub status: Option<String>,
    #[serde(default, deserialize_with = "lenient::text")]
    pub industry: Option<String>,
    #[serde(default, deserialize_with = "lenient::text")]
    pub subindustry: Option<String>,
    #[serde(default, deserialize_with = "lenient::text")]
    pub all_locations: Option<String>,
    #[serde(default, deserialize_with = "lenient::text")]
    pub team_size: Option<String>,
    /// Launch instant in epoch seconds.
    #[serde(default, deserialize_with = "lenient::timestamp")]
    pub launched_at: Option<f64>,
    #[serde(default, deserialize_with = "lenient::text")]
    pub one_liner: Option<String>,
    #[serde(default, deserialize_with = "lenient::text")]
    pub url: Option<String>,
    #[serde(default, deserialize_with = "lenient::text")]
    pub api: Option<String>,
    #[serde(default, deserialize_with = "lenient::string_list")]
    pub tags: Vec<String>,
    #[serde(default, deserialize_with = "lenient::string_list")]
    pub regions: Vec<String>,
    #[serde(default, deserialize_with = "lenient::string_list")]
    pub industries: Vec<String>,
}

impl CompanyRecord {
    /// String form of the identifier used for new-record detection.
    pub fn ledger_id(&self) -> Option<&str> {
        self.id.as_deref().filter(|id| !id.is_empty())
    }
}

/// Flattened, stable-schema projection of a [`CompanyRecord`].
///
/// Field order matches [`LEDGER_COLUMNS`]; the CSV writer relies on it.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct LedgerRow {
    pub id: String,
    pub name: String,
    pub slug: String,
    pub website: String,
    pub batch: String,
    pub stage: String,
    pub status: String,
    pub industry: String,
    pub subindustry: String,
    pub all_locations: String,
    pub team_size: String,
    pub launched_at_date: String,
    pub one_liner: String,
    pub url: String,
    pub api: String,
    pub tags: String,
    pub regions: String,
    pub industries: String,
}

impl LedgerRow {
    /// Project a record onto the ledger schema. Absent values become empty cells.
    pub fn from_record(record: &CompanyRecord) -> Self {
        let text = |value: &Option<String>| value.clone().unwrap_or_default();
        Self {
            id: text(&record.id),
            name: text(&record.name),
            slug: text(&record.slug),
            website: text(&record.website),
            batch: text(&record.batch),
            stage: text(&record.stage),
            status: text(&record.status),
            industry: text(&record.industry),
            subindustry: text(&record.subindustry),
            all_locations: text(&record.all_locations),
            team_size: text(&record.team_size),
            launched_at_date: launch_date(record.launched_at),
            one_liner: text(&record.one_liner),
            url: text(&record.url),
            api: text(&record.api),
            tags: join_list(&record.tags),
            regions: join_list(&record.regions),
            industries: join_list(&record.industries),
        }
    }

    pub fn as_cells(&self) -> [&str; 18] {
        [
            &self.id,
            &self.name,
            &self.slug,
            &self.website,
            &self.batch,
            &self.stage,
            &self.status,
            &self.industry,
            &self.subindustry,
            &self.all_locations,
            &self.team_size,
            &self.launched_at_date,
            &self.one_liner,
            &self.url,
            &self.api,
            &self.tags,
            &self.regions,
            &self.industries,
        ]
    }
}

pub fn join_list(items: &[String]) -> String {
    items.join(LIST_SEPARATOR)
}

/// Render an epoch-seconds launch timestamp as a UTC `YYYY-MM-DD` date.
///
/// Missing, non-finite and out-of-range values all yield an empty string.
pub fn launch_date(timestamp: Option<f64>) -> String {
    timestamp
        .and_then(utc_date_from_epoch)
        .map(|date| date.format("%Y-%m-%d").to_string())
        .unwrap_or_default()
}

fn utc_date_from_epoch(seconds: f64) -> Option<NaiveDate> {
    if !seconds.is_finite() {
        return None;
    }
    let whole = seconds.floor();
    if whole < i64::MIN as f64 || whole >= i64::MAX as f64 {
        return None;
    }
    let instant = DateTime::<Utc>::from_timestamp(whole as i64, 0)?;
    let date = instant.date_naive();
    (1..=9999).contains(&date.year()).then_some(date)
}

mod lenient {
    use serde::{Deserialize, Deserializer};
    use serde_json::Value;

    use super::LIST_SEPARATOR;

    pub fn identifier<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Value::deserialize(deserializer)?;
        Ok(match value {
            Value::String(s) => Some(s),
            Value::Number(n) => Some(n.to_string()),
            Value::Bool(b) => Some(b.to_string()),
            Value::Null | Value::Array(_) | Value::Object(_) => None,
        })
    }

    pub fn text<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Value::deserialize(deserializer)?;
        Ok(match value {
            Value::Null => None,
            Value::Array(items) => Some(
                items
                    .iter()
                    .filter_map(scalar_text)
                    .collect::<Vec<_>>()
                    .join(LIST_SEPARATOR),
            ),
            Value::Object(_) => Some(value.to_string()),
            other => scalar_text(&other),
        })
    }

    pub fn timestamp<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Value::deserialize(deserializer)?;
        Ok(value.as_f64())
    }

    pub fn string_list<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Value::deserialize(deserializer)?;
        Ok(match value {
            Value::Array(items) => items.iter().filter_map(scalar_text).collect(),
            _ => Vec::new(),
        })
    }

    fn scalar_text(value: &Value) -> Option<String> {
        match value {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            Value::Bool(b) => Some(b.to_string()),
            Value::Null | Value::Array(_) | Value::Object(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn parse(value: serde_json::Value) -> CompanyRecord {
        serde_json::from_value(value).expect("record")
    }

    #[test]
    fn numeric_and_string_ids_coerce_to_same_text() {
        let numeric = parse(json!({ "id": 42 }));
        let text = parse(json!({ "id": "42" }));
        assert_eq!(numeric.ledger_id(), Some("42"));
        assert_eq!(numeric.ledger_id(), text.ledger_id());
    }

    #[test]
    fn missing_or_structured_id_has_no_ledger_id() {
        assert_eq!(parse(json!({ "name": "Acme" })).ledger_id(), None);
        assert_eq!(parse(json!({ "id": null })).ledger_id(), None);
        assert_eq!(parse(json!({ "id": [1, 2] })).ledger_id(), None);
        assert_eq!(parse(json!({ "id": "" })).ledger_id(), None);
    }

    #[test]
    fn launch_date_converts_epoch_seconds_in_utc() {
        assert_eq!(launch_date(Some(1_577_836_800.0)), "2020-01-01");
        assert_eq!(launch_date(Some(1_577_836_799.5)), "2019-12-31");
        assert_eq!(launch_date(Some(-86_400.0)), "1969-12-31");
    }

    #[test]
    fn launch_date_blanks_missing_and_out_of_range_values() {
        assert_eq!(launch_date(None), "");
        assert_eq!(launch_date(Some(1e20)), "");
        assert_eq!(launch_date(Some(f64::INFINITY)), "");
        assert_eq!(launch_date(Some(f64::NAN)), "");
        // Representable instant, but past year 9999.
        assert_eq!(launch_date(Some(253_402_300_800.0)), "");
    }

    #[test]
    fn non_numeric_timestamp_decodes_as_missing() {
        let record = parse(json!({ "id": 1, "launched_at": "yesterday" }));
        assert_eq!(record.launched_at, None);
        assert_eq!(LedgerRow::from_record(&record).launched_at_date, "");
    }

    #[test]
    fn collections_join_and_default_to_empty() {
        let record = parse(json!({
            "id": 7,
            "tags": ["ai", "devtools"],
            "regions": "not a list",
            "industries": null,
        }));
        let row = LedgerRow::from_record(&record);
        assert_eq!(row.tags, "ai, devtools");
        assert_eq!(row.regions, "");
        assert_eq!(row.industries, "");

        let absent = LedgerRow::from_record(&parse(json!({ "id": 8 })));
        assert_eq!(absent.tags, "");
    }

    #[test]
    fn projection_fills_every_column_in_order() {
        let record = parse(json!({
            "id": 271,
            "name": "Airbnb",
            "slug": "airbnb",
            "website": "https://airbnb.com",
            "batch": "Winter 2009",
            "stage": "Public",
            "status": "Public",
            "industry": "Consumer",
            "subindustry": "Consumer -> Travel, Leisure and Tourism",
            "all_locations": "San Francisco, CA, USA",
            "team_size": 6132,
            "launched_at": 1_577_836_800,
            "one_liner": "Book accommodations around the world.",
            "url": "https://www.ycombinator.com/companies/airbnb",
            "api": "https://yc-oss.github.io/api/companies/airbnb.json",
            "tags": ["Marketplace", "Travel"],
            "regions": ["United States of America", "America / Canada"],
            "industries": ["Consumer", "Travel, Leisure and Tourism"],
            "former_names": ["AirBed & Breakfast"],
        }));
        let row = LedgerRow::from_record(&record);
        assert_eq!(
            row.as_cells(),
            [
                "271",
                "Airbnb",
                "airbnb",
                "https://airbnb.com",
                "Winter 2009",
                "Public",
                "Public",
                "Consumer",
                "Consumer -> Travel, Leisure and Tourism",
                "San Francisco, CA, USA",
                "6132",
                "2020-01-01",
                "Book accommodations around the world.",
                "https://www.ycombinator.com/companies/airbnb",
                "https://yc-oss.github.io/api/companies/airbnb.json",
                "Marketplace, Travel",
                "United States of America, America / Canada",
                "Consumer, Travel, Leisure and Tourism",
            ]
        );
    }

    #[test]
    fn odd_scalar_shapes_degrade_to_text() {
        let record = parse(json!({
            "id": 3,
            "all_locations": ["Paris", "Berlin"],
            "stage": { "round": "A" },
            "name": true,
            "website": null,
        }));
        let row = LedgerRow::from_record(&record);
        assert_eq!(row.all_locations, "Paris, Berlin");
        assert_eq!(row.stage, r#"{"round":"A"}"#);
        assert_eq!(row.name, "true");
        assert_eq!(row.website, "");
    }
}
