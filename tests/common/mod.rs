//! Shared fixtures for integration tests

#![allow(dead_code)]

use startup_predictor::ml::{BoostingParams, ForestParams, ModelType, TrainingConfig};
use std::io::Write;
use std::path::Path;

const HEADER: &str = "name,status,founded_at,first_funding_at,last_funding_at,\
age_first_milestone_year,age_last_milestone_year,relationships,funding_rounds,\
funding_total_usd,milestones,has_roundA,has_roundB,avg_participants,is_top500,category_code";

/// One CSV line per company; every third one closed, the rest acquired,
/// plus a few still-operating rows that training must ignore
pub fn synthetic_csv(n: usize) -> String {
    let mut out = String::from(HEADER);
    out.push('\n');
    for i in 0..n {
        let acquired = i % 3 != 0;
        let status = if acquired { "acquired" } else { "closed" };
        let last_year = if acquired { 2008 + (i % 3) } else { 2005 };
        let relationships = if acquired { 12 + i % 4 } else { 3 + i % 4 };
        let rounds = if acquired { 3 } else { 1 };
        let funding = if acquired { 8_000_000 + 100_000 * (i % 5) } else { 500_000 + 10_000 * (i % 5) };
        let category = ["web", "software", "mobile"][i % 3];

        out.push_str(&format!(
            "Company {i},{status},1/1/2005,2005-04-01,{last_year}-0{month}-15,1,{milestone_end},\
{relationships},{rounds},{funding},{milestones},1,{round_b},{participants},{top500},{category}\n",
            month = 1 + i % 9,
            milestone_end = 2 + i % 3,
            milestones = i % 4,
            round_b = u8::from(acquired),
            participants = 1 + i % 5,
            top500 = u8::from(acquired),
        ));
    }
    out.push_str("Stealth Co,operating,3/15/2011,,,,,2,1,,0,0,0,1,0,software\n");
    out.push_str("Garbage Co,operating,not a date,,,,,many,1,unknown,0,0,0,1,0,\n");
    out
}

pub fn write_csv(path: &Path, n: usize) {
    let mut file = std::fs::File::create(path).unwrap();
    file.write_all(synthetic_csv(n).as_bytes()).unwrap();
}

/// Small ensembles so the tests stay quick
pub fn fast_config(model_type: ModelType) -> TrainingConfig {
    TrainingConfig {
        model_type,
        cv_folds: 3,
        boosting: BoostingParams {
            n_estimators: 15,
            max_depth: 3,
            ..Default::default()
        },
        forest: ForestParams {
            n_estimators: 10,
            max_depth: 4,
            ..Default::default()
        },
        ..Default::default()
    }
}
