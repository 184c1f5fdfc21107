use crate::models::lenient;
use chrono::NaiveDate;
use csv::StringRecord;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::str::FromStr;
use strum::{Display, EnumString};
use validator::Validate;

/// Terminal outcome of a startup
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, EnumString, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum Outcome {
    /// Positive class
    Acquired,
    /// Negative class
    Closed,
}

impl Outcome {
    /// Binary class label (acquired = 1)
    pub fn label(self) -> usize {
        match self {
            Outcome::Acquired => 1,
            Outcome::Closed => 0,
        }
    }
}

/// Number of passthrough numeric columns
pub const N_NUMERIC: usize = 31;

/// Numeric columns carried through to the feature table unchanged, in order
pub const NUMERIC_COLUMNS: [&str; N_NUMERIC] = [
    "age_first_funding_year",
    "age_last_funding_year",
    "age_first_milestone_year",
    "age_last_milestone_year",
    "relationships",
    "funding_rounds",
    "funding_total_usd",
    "milestones",
    "is_CA",
    "is_NY",
    "is_MA",
    "is_TX",
    "is_otherstate",
    "is_software",
    "is_web",
    "is_mobile",
    "is_enterprise",
    "is_advertising",
    "is_gamesvideo",
    "is_ecommerce",
    "is_biotech",
    "is_consulting",
    "is_othercategory",
    "has_VC",
    "has_angel",
    "has_roundA",
    "has_roundB",
    "has_roundC",
    "has_roundD",
    "avg_participants",
    "is_top500",
];

/// One raw company row, as found in the training CSV or a prediction request
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, Validate)]
pub struct StartupRecord {
    #[serde(default, deserialize_with = "lenient::date")]
    pub founded_at: Option<NaiveDate>,
    #[serde(default, deserialize_with = "lenient::date")]
    pub first_funding_at: Option<NaiveDate>,
    #[serde(default, deserialize_with = "lenient::date")]
    pub last_funding_at: Option<NaiveDate>,

    #[serde(default, deserialize_with = "lenient::number")]
    pub age_first_funding_year: Option<f64>,
    #[serde(default, deserialize_with = "lenient::number")]
    pub age_last_funding_year: Option<f64>,
    #[serde(default, deserialize_with = "lenient::number")]
    pub age_first_milestone_year: Option<f64>,
    #[serde(default, deserialize_with = "lenient::number")]
    pub age_last_milestone_year: Option<f64>,

    #[validate(range(min = 0.0))]
    #[serde(default, deserialize_with = "lenient::number")]
    pub relationships: Option<f64>,
    #[validate(range(min = 0.0))]
    #[serde(default, deserialize_with = "lenient::number")]
    pub funding_rounds: Option<f64>,
    #[validate(range(min = 0.0))]
    #[serde(default, deserialize_with = "lenient::number")]
    pub funding_total_usd: Option<f64>,
    #[validate(range(min = 0.0))]
    #[serde(default, deserialize_with = "lenient::number")]
    pub milestones: Option<f64>,

    #[serde(default, rename = "is_CA", deserialize_with = "lenient::number")]
    pub is_ca: Option<f64>,
    #[serde(default, rename = "is_NY", deserialize_with = "lenient::number")]
    pub is_ny: Option<f64>,
    #[serde(default, rename = "is_MA", deserialize_with = "lenient::number")]
    pub is_ma: Option<f64>,
    #[serde(default, rename = "is_TX", deserialize_with = "lenient::number")]
    pub is_tx: Option<f64>,
    #[serde(default, deserialize_with = "lenient::number")]
    pub is_otherstate: Option<f64>,

    #[serde(default, deserialize_with = "lenient::number")]
    pub is_software: Option<f64>,
    #[serde(default, deserialize_with = "lenient::number")]
    pub is_web: Option<f64>,
    #[serde(default, deserialize_with = "lenient::number")]
    pub is_mobile: Option<f64>,
    #[serde(default, deserialize_with = "lenient::number")]
    pub is_enterprise: Option<f64>,
    #[serde(default, deserialize_with = "lenient::number")]
    pub is_advertising: Option<f64>,
    #[serde(default, deserialize_with = "lenient::number")]
    pub is_gamesvideo: Option<f64>,
    #[serde(default, deserialize_with = "lenient::number")]
    pub is_ecommerce: Option<f64>,
    #[serde(default, deserialize_with = "lenient::number")]
    pub is_biotech: Option<f64>,
    #[serde(default, deserialize_with = "lenient::number")]
    pub is_consulting: Option<f64>,
    #[serde(default, deserialize_with = "lenient::number")]
    pub is_othercategory: Option<f64>,

    #[serde(default, rename = "has_VC", deserialize_with = "lenient::number")]
    pub has_vc: Option<f64>,
    #[serde(default, deserialize_with = "lenient::number")]
    pub has_angel: Option<f64>,
    #[serde(default, rename = "has_roundA", deserialize_with = "lenient::number")]
    pub has_round_a: Option<f64>,
    #[serde(default, rename = "has_roundB", deserialize_with = "lenient::number")]
    pub has_round_b: Option<f64>,
    #[serde(default, rename = "has_roundC", deserialize_with = "lenient::number")]
    pub has_round_c: Option<f64>,
    #[serde(default, rename = "has_roundD", deserialize_with = "lenient::number")]
    pub has_round_d: Option<f64>,

    #[validate(range(min = 0.0))]
    #[serde(default, deserialize_with = "lenient::number")]
    pub avg_participants: Option<f64>,
    #[serde(default, deserialize_with = "lenient::number")]
    pub is_top500: Option<f64>,

    /// Sector code (e.g. "software", "biotech")
    #[serde(default, deserialize_with = "lenient::text")]
    pub category_code: Option<String>,

    /// Known outcome; absent for records being scored
    #[serde(default, skip_serializing)]
    pub status: Option<Outcome>,
}

impl StartupRecord {
    /// Build a record from a CSV row, looking columns up by header name.
    ///
    /// Unknown columns are ignored and unreadable cells become missing.
    pub fn from_csv_row(headers: &StringRecord, row: &StringRecord) -> Self {
        let cells: HashMap<&str, &str> = headers.iter().zip(row.iter()).collect();

        let num = |name: &str| cells.get(name).and_then(|v| lenient::parse_number(v));
        let date = |name: &str| cells.get(name).and_then(|v| lenient::parse_date(v));

        Self {
            founded_at: date("founded_at"),
            first_funding_at: date("first_funding_at"),
            last_funding_at: date("last_funding_at"),
            age_first_funding_year: num("age_first_funding_year"),
            age_last_funding_year: num("age_last_funding_year"),
            age_first_milestone_year: num("age_first_milestone_year"),
            age_last_milestone_year: num("age_last_milestone_year"),
            relationships: num("relationships"),
            funding_rounds: num("funding_rounds"),
            funding_total_usd: num("funding_total_usd"),
            milestones: num("milestones"),
            is_ca: num("is_CA"),
            is_ny: num("is_NY"),
            is_ma: num("is_MA"),
            is_tx: num("is_TX"),
            is_otherstate: num("is_otherstate"),
            is_software: num("is_software"),
            is_web: num("is_web"),
            is_mobile: num("is_mobile"),
            is_enterprise: num("is_enterprise"),
            is_advertising: num("is_advertising"),
            is_gamesvideo: num("is_gamesvideo"),
            is_ecommerce: num("is_ecommerce"),
            is_biotech: num("is_biotech"),
            is_consulting: num("is_consulting"),
            is_othercategory: num("is_othercategory"),
            has_vc: num("has_VC"),
            has_angel: num("has_angel"),
            has_round_a: num("has_roundA"),
            has_round_b: num("has_roundB"),
            has_round_c: num("has_roundC"),
            has_round_d: num("has_roundD"),
            avg_participants: num("avg_participants"),
            is_top500: num("is_top500"),
            category_code: cells.get("category_code").and_then(|v| lenient::parse_text(v)),
            status: cells
                .get("status")
                .and_then(|v| Outcome::from_str(v.trim()).ok()),
        }
    }

    /// Passthrough numeric values in `NUMERIC_COLUMNS` order, NaN when missing
    pub fn numeric_values(&self) -> [f64; N_NUMERIC] {
        [
            self.age_first_funding_year,
            self.age_last_funding_year,
            self.age_first_milestone_year,
            self.age_last_milestone_year,
            self.relationships,
            self.funding_rounds,
            self.funding_total_usd,
            self.milestones,
            self.is_ca,
            self.is_ny,
            self.is_ma,
            self.is_tx,
            self.is_otherstate,
            self.is_software,
            self.is_web,
            self.is_mobile,
            self.is_enterprise,
            self.is_advertising,
            self.is_gamesvideo,
            self.is_ecommerce,
            self.is_biotech,
            self.is_consulting,
            self.is_othercategory,
            self.has_vc,
            self.has_angel,
            self.has_round_a,
            self.has_round_b,
            self.has_round_c,
            self.has_round_d,
            self.avg_participants,
            self.is_top500,
        ]
        .map(|v| v.unwrap_or(f64::NAN))
    }

    /// Round flags `has_*`, NaN when missing
    pub fn round_flags(&self) -> [f64; 6] {
        [
            self.has_vc,
            self.has_angel,
            self.has_round_a,
            self.has_round_b,
            self.has_round_c,
            self.has_round_d,
        ]
        .map(|v| v.unwrap_or(f64::NAN))
    }
}
