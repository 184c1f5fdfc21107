use crate::models::record::StartupRecord;
use serde::{Deserialize, Serialize};
use strum::Display;
use validator::Validate;

/// Body of `POST /predict`
#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct PredictRequest {
    /// Optional display name, echoed back in the response
    #[serde(default)]
    #[validate(length(max = 255))]
    pub name: Option<String>,

    #[serde(flatten)]
    #[validate(nested)]
    pub record: StartupRecord,
}

impl PredictRequest {
    pub fn into_record(self) -> StartupRecord {
        self.record
    }
}

/// Binary label as exposed on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
pub enum PredictionLabel {
    Success,
    Failure,
}

impl PredictionLabel {
    pub fn from_positive(positive: bool) -> Self {
        if positive {
            PredictionLabel::Success
        } else {
            PredictionLabel::Failure
        }
    }
}

/// Risk band derived from the success probability
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

impl RiskLevel {
    pub fn from_probability(probability: f64) -> Self {
        if probability >= 0.7 {
            RiskLevel::Low
        } else if probability >= 0.4 {
            RiskLevel::Medium
        } else {
            RiskLevel::High
        }
    }
}

/// How far the probability sits from the decision threshold
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
pub enum Confidence {
    High,
    Medium,
    Low,
}

impl Confidence {
    pub fn from_margin(probability: f64, threshold: f64) -> Self {
        let margin = (probability - threshold).abs();
        if margin >= 0.25 {
            Confidence::High
        } else if margin >= 0.10 {
            Confidence::Medium
        } else {
            Confidence::Low
        }
    }
}

/// Qualitative investment guidance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
pub enum Recommendation {
    #[serde(rename = "Strong Invest")]
    #[strum(serialize = "Strong Invest")]
    StrongInvest,
    Invest,
    Monitor,
    Pass,
}

impl Recommendation {
    /// Probability at or above which a positive call becomes a strong one
    pub const STRONG_PROBABILITY: f64 = 0.8;

    /// Width of the band below the threshold that still warrants monitoring
    pub const MONITOR_BAND: f64 = 0.15;

    pub fn derive(probability: f64, threshold: f64) -> Self {
        if probability >= threshold {
            if probability >= Self::STRONG_PROBABILITY.max(threshold) {
                Recommendation::StrongInvest
            } else {
                Recommendation::Invest
            }
        } else if probability >= threshold - Self::MONITOR_BAND {
            Recommendation::Monitor
        } else {
            Recommendation::Pass
        }
    }

    pub fn summary(&self) -> &'static str {
        match self {
            Recommendation::StrongInvest => {
                "Core metrics closely match startups that went on to be acquired."
            }
            Recommendation::Invest => {
                "Metrics clear the decision threshold; proceed with standard diligence."
            }
            Recommendation::Monitor => {
                "Just below the decision threshold; revisit after the next funding event or milestone."
            }
            Recommendation::Pass => {
                "Key indicators align with startups that closed; review funding and milestone pace."
            }
        }
    }
}

/// Body returned by the prediction endpoints
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PredictionResponse {
    #[serde(default)]
    pub name: Option<String>,
    pub prediction_label: PredictionLabel,
    /// Success probability as a percentage, rounded to two decimals
    pub success_probability: f64,
    pub probability: f64,
    pub threshold: f64,
    pub risk_level: RiskLevel,
    pub confidence: Confidence,
    pub recommendation: Recommendation,
    pub recommendation_summary: String,
}

impl PredictionResponse {
    pub fn new(name: Option<String>, probability: f64, threshold: f64) -> Self {
        let recommendation = Recommendation::derive(probability, threshold);
        Self {
            name,
            prediction_label: PredictionLabel::from_positive(probability >= threshold),
            success_probability: (probability * 100.0 * 100.0).round() / 100.0,
            probability,
            threshold,
            risk_level: RiskLevel::from_probability(probability),
            confidence: Confidence::from_margin(probability, threshold),
            recommendation,
            recommendation_summary: recommendation.summary().to_string(),
        }
    }
}
