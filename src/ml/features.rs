use crate::error::{AppError, Result};
use crate::ml::encoding::{CategoryEncoder, CategoryEncoding};
use crate::ml::preprocessing::nan_quantile;
use crate::models::{StartupRecord, NUMERIC_COLUMNS};
use chrono::NaiveDate;
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

const DAYS_PER_YEAR: f64 = 365.25;

/// Lower clip for year spans in the advanced feature set
const EPSILON: f64 = 0.01;

/// Engineered columns of the basic feature set, after the passthrough block
const BASIC_COLUMNS: [&str; 4] = [
    "category_code",
    "funding_velocity_days",
    "funding_momentum",
    "milestone_velocity",
];

/// Engineered columns of the advanced feature set, after the passthrough block
const ADVANCED_COLUMNS: [&str; 29] = [
    "category_code",
    "category_frequency",
    "days_to_first_funding",
    "days_funding_active",
    "days_since_founding",
    "funding_momentum",
    "avg_funding_per_round",
    "funding_concentration",
    "funding_growth_rate",
    "milestone_velocity",
    "milestones_per_year_active",
    "milestone_density",
    "relationships_per_year",
    "relationship_efficiency",
    "network_strength",
    "funding_x_relationships",
    "rounds_x_participants",
    "milestones_x_relationships",
    "top500_x_funding",
    "total_rounds_reached",
    "reached_late_stage",
    "early_stage_only",
    "slow_milestone",
    "low_participation",
    "same_day_funding",
    "quick_first_funding",
    "long_founding_period",
    "funding_squared",
    "relationships_squared",
];

/// Which engineered feature table to build
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, EnumString, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum FeatureSet {
    /// Passthrough columns plus funding/milestone velocity
    Basic,
    /// Ratios, interactions, stage flags and frequency encoding
    Advanced,
}

/// Batch statistics frozen at fit time
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FeatureStats {
    /// Median total funding of the training rows
    pub funding_median: f64,

    /// 25th percentile of milestone velocity of the training rows
    pub milestone_velocity_q25: f64,
}

/// Deterministic record -> feature vector transformation shared by training
/// and serving
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeatureEngineer {
    feature_set: FeatureSet,
    encoder: CategoryEncoder,
    stats: FeatureStats,
    fitted: bool,
}

impl FeatureEngineer {
    pub fn new(feature_set: FeatureSet, encoding: CategoryEncoding) -> Self {
        Self {
            feature_set,
            encoder: CategoryEncoder::new(encoding),
            stats: FeatureStats::default(),
            fitted: false,
        }
    }

    /// Fit the category encoder and batch statistics on training records
    pub fn fit(&mut self, records: &[StartupRecord]) -> Result<()> {
        if records.is_empty() {
            return Err(AppError::Data(
                "Cannot fit feature engineer on zero records".to_string(),
            ));
        }

        self.encoder
            .fit(records.iter().map(|r| r.category_code.as_deref()))?;

        let funding: Array1<f64> = records
            .iter()
            .map(|r| r.funding_total_usd.unwrap_or(f64::NAN))
            .collect();
        let velocity: Array1<f64> = records
            .iter()
            .map(|r| finite_or_nan(clipped_milestone_velocity(r)))
            .collect();

        self.stats = FeatureStats {
            funding_median: nan_quantile(funding.view(), 0.5),
            milestone_velocity_q25: nan_quantile(velocity.view(), 0.25),
        };
        self.fitted = true;

        tracing::debug!(
            feature_set = %self.feature_set,
            n_records = records.len(),
            funding_median = self.stats.funding_median,
            milestone_velocity_q25 = self.stats.milestone_velocity_q25,
            "Feature engineer fitted"
        );

        Ok(())
    }

    /// Transform a batch of records into an (n_records × n_features) table
    pub fn transform(&self, records: &[StartupRecord]) -> Result<Array2<f64>> {
        if !self.fitted {
            return Err(AppError::NotFitted(
                "FeatureEngineer must be fitted before transform".to_string(),
            ));
        }

        let n_features = self.n_features();
        let mut table = Array2::from_elem((records.len(), n_features), f64::NAN);

        for (i, record) in records.iter().enumerate() {
            let row = self.row(record);
            debug_assert_eq!(row.len(), n_features);
            for (j, value) in row.into_iter().enumerate() {
                table[[i, j]] = finite_or_nan(value);
            }
        }

        Ok(table)
    }

    /// Fit and transform in one step
    pub fn fit_transform(&mut self, records: &[StartupRecord]) -> Result<Array2<f64>> {
        self.fit(records)?;
        self.transform(records)
    }

    /// Transform a single record into a one-row table
    pub fn transform_one(&self, record: &StartupRecord) -> Result<Array2<f64>> {
        self.transform(std::slice::from_ref(record))
    }

    /// Column names, in table order
    pub fn feature_names(&self) -> Vec<String> {
        feature_names(self.feature_set)
    }

    pub fn n_features(&self) -> usize {
        NUMERIC_COLUMNS.len() + engineered_columns(self.feature_set).len()
    }

    pub fn feature_set(&self) -> FeatureSet {
        self.feature_set
    }

    pub fn is_fitted(&self) -> bool {
        self.fitted
    }

    fn row(&self, record: &StartupRecord) -> Vec<f64> {
        let mut row = Vec::with_capacity(self.n_features());
        row.extend_from_slice(&record.numeric_values());

        match self.feature_set {
            FeatureSet::Basic => self.basic_features(record, &mut row),
            FeatureSet::Advanced => self.advanced_features(record, &mut row),
        }

        row
    }

    fn basic_features(&self, record: &StartupRecord, row: &mut Vec<f64>) {
        let funding = value(record.funding_total_usd);
        let milestones = value(record.milestones);

        let age_in_years = replace_zero(
            days_between(record.first_funding_at, record.last_funding_at) / DAYS_PER_YEAR,
            1.0 / DAYS_PER_YEAR,
        );
        let milestone_age_years = replace_zero(
            value(record.age_last_milestone_year) - value(record.age_first_milestone_year),
            1.0 / DAYS_PER_YEAR,
        );

        row.push(self.encoder.encode(record.category_code.as_deref()));
        row.push(days_between(record.founded_at, record.first_funding_at));
        row.push(funding / age_in_years);
        row.push(milestones / milestone_age_years);
    }

    fn advanced_features(&self, record: &StartupRecord, row: &mut Vec<f64>) {
        let funding = value(record.funding_total_usd);
        let rounds = value(record.funding_rounds);
        let milestones = value(record.milestones);
        let relationships = value(record.relationships);
        let participants = value(record.avg_participants);
        let top500 = value(record.is_top500);

        let days_to_first = days_between(record.founded_at, record.first_funding_at);
        let days_active = days_between(record.first_funding_at, record.last_funding_at);
        let days_since = days_between(record.founded_at, record.last_funding_at);

        let years_active = clip_lower(days_active / DAYS_PER_YEAR, EPSILON);
        let years_since = clip_lower(days_since / DAYS_PER_YEAR, EPSILON);
        let milestone_years = clip_lower(
            value(record.age_last_milestone_year) - value(record.age_first_milestone_year),
            EPSILON,
        );

        let avg_per_round = funding / replace_zero(rounds, 1.0);
        let milestone_velocity = milestones / milestone_years;

        // Rounds A-D only; VC and angel flags are not stages
        let stage_flags = &record.round_flags()[2..];
        let total_rounds: f64 = stage_flags.iter().filter(|v| !v.is_nan()).sum();
        let late_stage = stage_flags[2] == 1.0 || stage_flags[3] == 1.0;

        row.push(self.encoder.encode(record.category_code.as_deref()));
        row.push(self.encoder.frequency(record.category_code.as_deref()));
        row.push(days_to_first);
        row.push(days_active);
        row.push(days_since);
        row.push(funding / years_active);
        row.push(avg_per_round);
        row.push(avg_per_round / (funding + 1.0));
        row.push(funding / years_since);
        row.push(milestone_velocity);
        row.push(milestones / years_active);
        row.push(milestones / (days_since + 1.0));
        row.push(relationships / years_active);
        row.push(relationships / (rounds + 1.0));
        row.push(relationships * participants);
        row.push(funding * relationships);
        row.push(rounds * participants);
        row.push(milestones * relationships);
        row.push(top500 * funding);
        row.push(total_rounds);
        row.push(flag(late_stage));
        row.push(flag(rounds <= 2.0 && funding < self.stats.funding_median));
        row.push(flag(milestone_velocity < self.stats.milestone_velocity_q25));
        row.push(flag(participants < 2.0));
        row.push(flag(days_active == 0.0));
        row.push(flag(days_to_first < 30.0));
        row.push(flag(days_to_first > 365.0));
        row.push(funding.ln_1p().powi(2));
        row.push(relationships.powi(2));
    }
}

/// Column names for a feature set, in table order
pub fn feature_names(feature_set: FeatureSet) -> Vec<String> {
    NUMERIC_COLUMNS
        .iter()
        .chain(engineered_columns(feature_set).iter())
        .map(|name| name.to_string())
        .collect()
}

fn engineered_columns(feature_set: FeatureSet) -> &'static [&'static str] {
    match feature_set {
        FeatureSet::Basic => &BASIC_COLUMNS,
        FeatureSet::Advanced => &ADVANCED_COLUMNS,
    }
}

fn clipped_milestone_velocity(record: &StartupRecord) -> f64 {
    let span = clip_lower(
        value(record.age_last_milestone_year) - value(record.age_first_milestone_year),
        EPSILON,
    );
    value(record.milestones) / span
}

fn value(v: Option<f64>) -> f64 {
    v.unwrap_or(f64::NAN)
}

fn days_between(start: Option<NaiveDate>, end: Option<NaiveDate>) -> f64 {
    match (start, end) {
        (Some(start), Some(end)) => (end - start).num_days() as f64,
        _ => f64::NAN,
    }
}

/// NaN stays NaN, like a dataframe clip
fn clip_lower(v: f64, lower: f64) -> f64 {
    if v.is_nan() {
        v
    } else {
        v.max(lower)
    }
}

fn replace_zero(v: f64, replacement: f64) -> f64 {
    if v == 0.0 {
        replacement
    } else {
        v
    }
}

/// Comparisons involving NaN are false, so missing inputs yield 0
fn flag(condition: bool) -> f64 {
    if condition {
        1.0
    } else {
        0.0
    }
}

fn finite_or_nan(v: f64) -> f64 {
    if v.is_finite() {
        v
    } else {
        f64::NAN
    }
}
