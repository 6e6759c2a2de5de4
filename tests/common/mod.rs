//! Synthetic survey fixtures shared by the integration tests.

use rand::Rng;
use rand::SeedableRng;
use rand::rngs::StdRng;
use std::fmt::Write as FmtWrite;
use std::fs;
use std::path::Path;

pub const HEADER: [&str; 20] = [
    "State",
    "Sex",
    "GeneralHealth",
    "PhysicalHealthDays",
    "MentalHealthDays",
    "LastCheckupTime",
    "SleepHours",
    "RemovedTeeth",
    "HadHeartAttack",
    "HadAngina",
    "HadStroke",
    "HadCOPD",
    "SmokerStatus",
    "ECigaretteUsage",
    "AgeCategory",
    "HeightInMeters",
    "WeightInKilograms",
    "BMI",
    "TetanusLast10Tdap",
    "ChestScan",
];

const STATES: [&str; 6] = ["Alabama", "Oregon", "Maine", "Texas", "Washington, DC", "Guam"];
const HEALTH: [&str; 5] = ["Poor", "Fair", "Good", "Very good", "Excellent"];
const CHECKUP: [&str; 4] = [
    "Within past year (anytime less than 12 months ago)",
    "Within past 2 years (1 year but less than 2 years ago)",
    "Within past 5 years (2 years but less than 5 years ago)",
    "5 or more years ago",
];
const TEETH: [&str; 4] = ["None of them", "1 to 5", "6 or more, but not all", "All"];
const SMOKER: [&str; 4] = [
    "Never smoked",
    "Former smoker",
    "Current smoker - now smokes some days",
    "Current smoker - now smokes every day",
];
const ECIG: [&str; 4] = [
    "Never used e-cigarettes in my entire life",
    "Not at all (right now)",
    "Use them some days",
    "Use them every day",
];
const AGES: [&str; 13] = [
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
const TETANUS: [&str; 4] = [
    "No, did not receive any tetanus shot in the past 10 years",
    "Yes, received Tdap",
    "Yes, received tetanus shot, but not Tdap",
    "Yes, received tetanus shot but not sure what type",
];

fn pick<'a>(rng: &mut StdRng, options: &[&'a str]) -> &'a str {
    options[rng.gen_range(0..options.len())]
}

fn yes_no(rng: &mut StdRng, p_yes: f64) -> &'static str {
    if rng.gen_bool(p_yes) { "Yes" } else { "No" }
}

/// Comma-separated survey text with `rows` respondents and roughly 6% heart attacks.
pub fn survey_csv(rows: usize, seed: u64) -> String {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut out = String::new();
    out.push_str(&HEADER.join(","));
    out.push('\n');
    for _ in 0..rows {
        let height: f64 = rng.gen_range(1.45..2.05);
        let weight: f64 = rng.gen_range(45.0..140.0);
        let fields = [
            format!("\"{}\"", pick(&mut rng, &STATES)),
            pick(&mut rng, &["Male", "Female"]).to_string(),
            pick(&mut rng, &HEALTH).to_string(),
            rng.gen_range(0..=30).to_string(),
            rng.gen_range(0..=30).to_string(),
            format!("\"{}\"", pick(&mut rng, &CHECKUP)),
            rng.gen_range(3..=12).to_string(),
            format!("\"{}\"", pick(&mut rng, &TEETH)),
            yes_no(&mut rng, 0.06).to_string(),
            yes_no(&mut rng, 0.07).to_string(),
            yes_no(&mut rng, 0.04).to_string(),
            yes_no(&mut rng, 0.08).to_string(),
            pick(&mut rng, &SMOKER).to_string(),
            format!("\"{}\"", pick(&mut rng, &ECIG)),
            pick(&mut rng, &AGES).to_string(),
            format!("{height:.2}"),
            format!("{weight:.2}"),
            format!("{:.2}", weight / (height * height)),
            format!("\"{}\"", pick(&mut rng, &TETANUS)),
            yes_no(&mut rng, 0.4).to_string(),
        ];
        writeln!(out, "{}", fields.join(",")).expect("write to string");
    }
    out
}

pub fn write_survey(path: &Path, rows: usize, seed: u64) {
    fs::write(path, survey_csv(rows, seed)).expect("write synthetic survey");
}
