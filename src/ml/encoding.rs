use crate::error::{AppError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use strum::{Display, EnumString};

/// Placeholder used for a missing sector code at label-encoding time
const MISSING_CATEGORY: &str = "nan";

/// Strategy for turning the sector code into a number
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, EnumString, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum CategoryEncoding {
    /// Index into the sorted list of training categories
    Label,
    /// Relative frequency of the category in training data
    Frequency,
}

/// Fitted sector code encoder
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CategoryEncoder {
    encoding: CategoryEncoding,

    /// Sorted category -> label index
    labels: BTreeMap<String, usize>,

    /// Category -> share of non-missing training rows
    frequencies: BTreeMap<String, f64>,

    fitted: bool,
}

impl CategoryEncoder {
    pub fn new(encoding: CategoryEncoding) -> Self {
        Self {
            encoding,
            labels: BTreeMap::new(),
            frequencies: BTreeMap::new(),
            fitted: false,
        }
    }

    /// Learn the label vocabulary and frequency table
    pub fn fit<'a, I>(&mut self, categories: I) -> Result<()>
    where
        I: IntoIterator<Item = Option<&'a str>>,
    {
        let mut counts: BTreeMap<String, usize> = BTreeMap::new();
        let mut seen_any = false;
        let mut present = 0usize;

        for category in categories {
            seen_any = true;
            let key = category.unwrap_or(MISSING_CATEGORY).to_string();
            if category.is_some() {
                present += 1;
            }
            *counts.entry(key).or_insert(0) += 1;
        }

        if !seen_any {
            return Err(AppError::Data(
                "Cannot fit category encoder on an empty dataset".to_string(),
            ));
        }

        // BTreeMap iteration is sorted, matching lexicographic label order
        self.labels = counts
            .keys()
            .enumerate()
            .map(|(idx, category)| (category.clone(), idx))
            .collect();

        self.frequencies = counts
            .iter()
            .filter(|(category, _)| category.as_str() != MISSING_CATEGORY)
            .map(|(category, &count)| (category.clone(), count as f64 / present.max(1) as f64))
            .collect();

        self.fitted = true;
        Ok(())
    }

    /// Encode with the configured strategy; unseen categories become NaN
    pub fn encode(&self, category: Option<&str>) -> f64 {
        match self.encoding {
            CategoryEncoding::Label => self.label(category),
            CategoryEncoding::Frequency => self.frequency(category),
        }
    }

    /// Label index, NaN when the category was never seen in training
    pub fn label(&self, category: Option<&str>) -> f64 {
        let key = category.unwrap_or(MISSING_CATEGORY);
        self.labels
            .get(key)
            .map(|&idx| idx as f64)
            .unwrap_or(f64::NAN)
    }

    /// Training frequency, NaN for missing or unseen categories
    pub fn frequency(&self, category: Option<&str>) -> f64 {
        category
            .and_then(|c| self.frequencies.get(c).copied())
            .unwrap_or(f64::NAN)
    }

    pub fn encoding(&self) -> CategoryEncoding {
        self.encoding
    }

    pub fn is_fitted(&self) -> bool {
        self.fitted
    }

    /// Categories known to the encoder, in label order
    pub fn classes(&self) -> Vec<&str> {
        self.labels.keys().map(String::as_str).collect()
    }
}
