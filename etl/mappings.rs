//! # Canonical Lookup Tables
//!
//! Every rule the normalizer applies lives in a `Mappings` value. The built-in
//! tables describe the 2022 survey wording; a TOML file with the same shape can
//! replace them without rebuilding. The value is loaded once, validated, and
//! handed to the normalizer by reference. Nothing here is global or mutable.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::Path;

use crate::error::PrepError;

/// Exact text-to-{0,1} coding for a group of yes/no style columns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BinaryCoding {
    pub columns: Vec<String>,
    /// Text coded as `1`.
    pub one: String,
    /// Text coded as `0`.
    pub zero: String,
}

/// Ordered categories; the first level is coded `1`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrdinalScale {
    pub column: String,
    pub levels: Vec<String>,
}

/// A single text predicate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "pattern", rename_all = "snake_case")]
pub enum Matcher {
    Exact(String),
    Contains(String),
    Prefix(String),
    AnyOf(Vec<Matcher>),
}

impl Matcher {
    pub fn matches(&self, text: &str) -> bool {
        match self {
            Matcher::Exact(p) => text == p,
            Matcher::Contains(p) => text.contains(p.as_str()),
            Matcher::Prefix(p) => text.starts_with(p.as_str()),
            Matcher::AnyOf(options) => options.iter().any(|m| m.matches(text)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LadderRule {
    pub matcher: Matcher,
    pub label: String,
}

/// Free-text consolidation for one column. Rules are tried top-down and the
/// first match wins; the order matters because patterns overlap.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ladder {
    pub column: String,
    pub rules: Vec<LadderRule>,
}

impl Ladder {
    pub fn consolidate<'a>(&'a self, text: &str) -> Option<&'a str> {
        self.rules
            .iter()
            .find(|rule| rule.matcher.matches(text))
            .map(|rule| rule.label.as_str())
    }
}

/// Shared ordinal scale for smoking and e-cigarette use, plus the names of the
/// derived columns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TobaccoMapping {
    pub smoker_column: String,
    pub ecig_column: String,
    pub levels: Vec<String>,
    pub smoker_ord_column: String,
    pub ecig_ord_column: String,
    pub combined_column: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegionGroup {
    pub name: String,
    pub states: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegionMapping {
    pub state_column: String,
    pub region_column: String,
    pub regions: Vec<RegionGroup>,
}

/// The complete normalizer configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Mappings {
    pub binary: Vec<BinaryCoding>,
    pub ordinals: Vec<OrdinalScale>,
    pub ladders: Vec<Ladder>,
    pub tobacco: TobaccoMapping,
    pub region: RegionMapping,
}

impl Mappings {
    pub fn from_toml_str(text: &str) -> Result<Self, PrepError> {
        let mappings: Mappings = toml::from_str(text)?;
        mappings.validate()?;
        Ok(mappings)
    }

    pub fn from_path(path: &Path) -> Result<Self, PrepError> {
        let text = fs::read_to_string(path)?;
        let mappings = Self::from_toml_str(&text)?;
        log::info!("Loaded normalization mappings from '{}'", path.display());
        Ok(mappings)
    }

    pub fn to_toml_string(&self) -> Result<String, PrepError> {
        Ok(toml::to_string(self)?)
    }

    /// Rejects tables that cannot be applied unambiguously.
    pub fn validate(&self) -> Result<(), PrepError> {
        for coding in &self.binary {
            if coding.one == coding.zero {
                return Err(PrepError::Mappings(format!(
                    "binary coding for {:?} uses '{}' for both 0 and 1",
                    coding.columns, coding.one
                )));
            }
        }

        for scale in &self.ordinals {
            ensure_unique_levels(&scale.column, &scale.levels)?;
        }
        ensure_unique_levels(&self.tobacco.smoker_column, &self.tobacco.levels)?;

        for ladder in &self.ladders {
            if ladder.rules.is_empty() {
                return Err(PrepError::Mappings(format!(
                    "ladder for '{}' has no rules",
                    ladder.column
                )));
            }
        }

        let mut seen: HashMap<&str, &str> = HashMap::new();
        for group in &self.region.regions {
            for state in &group.states {
                if let Some(previous) = seen.insert(state.as_str(), group.name.as_str()) {
                    if previous != group.name {
                        return Err(PrepError::Mappings(format!(
                            "state '{state}' is assigned to both '{previous}' and '{}'",
                            group.name
                        )));
                    }
                }
            }
        }
        Ok(())
    }
}

fn ensure_unique_levels(column: &str, levels: &[String]) -> Result<(), PrepError> {
    if levels.is_empty() {
        return Err(PrepError::Mappings(format!(
            "ordinal scale for '{column}' has no levels"
        )));
    }
    for (i, level) in levels.iter().enumerate() {
        if levels[..i].contains(level) {
            return Err(PrepError::Mappings(format!(
                "ordinal scale for '{column}' lists '{level}' more than once"
            )));
        }
    }
    Ok(())
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

fn rule(matcher: Matcher, label: &str) -> LadderRule {
    LadderRule {
        matcher,
        label: label.to_string(),
    }
}

fn exact(p: &str) -> Matcher {
    Matcher::Exact(p.to_string())
}

fn contains(p: &str) -> Matcher {
    Matcher::Contains(p.to_string())
}

fn prefix(p: &str) -> Matcher {
    Matcher::Prefix(p.to_string())
}

pub const YES_NO_COLUMNS: [&str; 21] = [
    "HadHeartAttack",
    "HadAngina",
    "HadStroke",
    "HadAsthma",
    "HadCOPD",
    "HadDepressiveDisorder",
    "HadKidneyDisease",
    "HadArthritis",
    "DeafOrHardOfHearing",
    "BlindOrVisionDifficulty",
    "DifficultyConcentrating",
    "DifficultyWalking",
    "DifficultyDressingBathing",
    "DifficultyErrands",
    "ChestScan",
    "AlcoholDrinkers",
    "HIVTesting",
    "FluVaxLast12",
    "PneumoVaxEver",
    "TetanusLast10Tdap",
    "HighRiskLastYear",
];

pub const AGE_LEVELS: [&str; 13] = [
    "18-24",
    "25-29",
    "30-34",
    "35-39",
    "40-44",
    "45-49",
    "50-54",
    "55-59",
    "60-64",
    "65-69",
    "70-74",
    "75-79",
    "80 or older",
];

impl Default for Mappings {
    fn default() -> Self {
        Self {
            binary: vec![
                BinaryCoding {
                    columns: strings(&YES_NO_COLUMNS),
                    one: "Yes".to_string(),
                    zero: "No".to_string(),
                },
                BinaryCoding {
                    columns: strings(&["Sex"]),
                    one: "Male".to_string(),
                    zero: "Female".to_string(),
                },
            ],
            ordinals: vec![
                OrdinalScale {
                    column: "GeneralHealth".to_string(),
                    levels: strings(&["Poor", "Fair", "Good", "Very good", "Excellent"]),
                },
                OrdinalScale {
                    column: "RemovedTeeth".to_string(),
                    levels: strings(&["None of them", "1 to 5", "6 or more, but not all", "All"]),
                },
                OrdinalScale {
                    column: "AgeCategory".to_string(),
                    levels: strings(&AGE_LEVELS),
                },
            ],
            ladders: vec![
                Ladder {
                    column: "LastCheckupTime".to_string(),
                    rules: vec![
                        rule(contains("anytime less than 12 months"), "Within past year"),
                        rule(contains("less than 2 years"), "Within past 2 years"),
                        rule(
                            Matcher::AnyOf(vec![
                                exact("5 or more years ago"),
                                contains("less than 5 years"),
                            ]),
                            "Over 2 years ago",
                        ),
                    ],
                },
                Ladder {
                    column: "TetanusLast10Tdap".to_string(),
                    rules: vec![
                        rule(prefix("No, did not receive"), "No"),
                        rule(exact("Yes, received Tdap"), "Yes-Tdap"),
                        rule(
                            exact("Yes, received tetanus shot, but not Tdap"),
                            "Yes-not Tdap",
                        ),
                        rule(
                            prefix("Yes, received tetanus shot but not sure"),
                            "Yes-type unknown",
                        ),
                    ],
                },
                Ladder {
                    column: "SmokerStatus".to_string(),
                    rules: vec![
                        rule(exact("Never smoked"), "Never"),
                        rule(exact("Former smoker"), "Former"),
                        rule(contains("some days"), "Some days"),
                        rule(contains("every day"), "Every day"),
                    ],
                },
                Ladder {
                    column: "ECigaretteUsage".to_string(),
                    rules: vec![
                        rule(exact("Never used e-cigarettes in my entire life"), "Never"),
                        rule(exact("Not at all (right now)"), "Former"),
                        rule(exact("Use them some days"), "Some days"),
                        rule(exact("Use them every day"), "Every day"),
                    ],
                },
            ],
            tobacco: TobaccoMapping {
                smoker_column: "SmokerStatus".to_string(),
                ecig_column: "ECigaretteUsage".to_string(),
                levels: strings(&["Never", "Former", "Some days", "Every day"]),
                smoker_ord_column: "SmokerStatus_ord".to_string(),
                ecig_ord_column: "ECigaretteUsage_ord".to_string(),
                combined_column: "SmokerOrECig_ord".to_string(),
            },
            region: RegionMapping {
                state_column: "State".to_string(),
                region_column: "Region".to_string(),
                regions: default_regions(),
            },
        }
    }
}

fn default_regions() -> Vec<RegionGroup> {
    let group = |name: &str, states: &[&str]| RegionGroup {
        name: name.to_string(),
        states: strings(states),
    };
    vec![
        group(
            "New_England",
            &[
                "Maine",
                "New Hampshire",
                "Vermont",
                "Massachusetts",
                "Rhode Island",
                "Connecticut",
            ],
        ),
        group("Middle_Atlantic", &["New York", "New Jersey", "Pennsylvania"]),
        group(
            "East_North_Central",
            &["Ohio", "Michigan", "Indiana", "Wisconsin", "Illinois"],
        ),
        group(
            "South_Atlantic",
            &[
                "Delaware",
                "Maryland",
                "District of Columbia",
                "Washington, DC",
                "West Virginia",
                "Virginia",
                "North Carolina",
                "South Carolina",
                "Georgia",
                "Florida",
            ],
        ),
        group(
            "East_South_Central",
            &["Kentucky", "Tennessee", "Alabama", "Mississippi"],
        ),
        group(
            "West_South_Central",
            &["Arkansas", "Louisiana", "Oklahoma", "Texas"],
        ),
        group(
            "West_North_Central",
            &[
                "Minnesota",
                "Iowa",
                "Missouri",
                "North Dakota",
                "South Dakota",
                "Nebraska",
                "Kansas",
            ],
        ),
        group(
            "Mountain",
            &[
                "New Mexico",
                "Arizona",
                "Colorado",
                "Utah",
                "Nevada",
                "Wyoming",
                "Idaho",
                "Montana",
            ],
        ),
        group(
            "Pacific",
            &["Washington", "Oregon", "California", "Alaska", "Hawaii"],
        ),
    ]
}
