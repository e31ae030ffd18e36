//! Advice prompt construction and response parsing.

use std::fmt::Write as _;

use crate::domain::{FactorSource, KeyFactor};
use crate::ports::RiskSummary;

/// System message sent with every advice request.
pub const SYSTEM_PROMPT: &str = "You are a diabetes prevention health advisor. Provide evidence-based, personalized advice. Be concise, actionable, and empathetic.";

/// Most recommendations returned to the caller.
pub const MAX_RECOMMENDATIONS: usize = 5;

/// List items at or below this length are treated as noise.
const MIN_RECOMMENDATION_CHARS: usize = 20;

const DEFAULT_RECOMMENDATIONS: [&str; 5] = [
    "Maintain a healthy diet rich in vegetables, whole grains, and lean proteins",
    "Engage in at least 150 minutes of moderate physical activity per week",
    "Monitor your blood glucose levels regularly",
    "Get adequate sleep (7-9 hours per night)",
    "Schedule regular check-ups with your healthcare provider",
];

/// Build the user prompt for an advice request.
#[must_use]
pub fn build_advice_prompt(summary: &RiskSummary, key_factors: &[KeyFactor]) -> String {
    let level = summary.risk_category.as_str().replace('_', " ");
    let mut prompt = String::new();

    let _ = writeln!(
        prompt,
        "You are a diabetes prevention expert. Based on the following assessment, provide personalized, actionable advice.\n"
    );
    let _ = writeln!(prompt, "**Risk Assessment:**");
    let _ = writeln!(
        prompt,
        "- Overall Risk Score: {:.2} ({level} risk)",
        summary.combined_risk
    );
    let _ = writeln!(prompt, "- Risk Level: {}", summary.risk_category);
    let _ = writeln!(
        prompt,
        "- Retinal Risk: {:.2}, Lifestyle Risk: {:.2}\n",
        summary.retinal_risk, summary.lifestyle_risk
    );

    let _ = writeln!(prompt, "**Identified Risk Factors:**");
    for (i, factor) in key_factors.iter().take(MAX_RECOMMENDATIONS).enumerate() {
        let _ = writeln!(prompt, "{}. [{}] {}", i + 1, factor.source, factor.name);
    }

    let _ = writeln!(prompt, "\n**Current Lifestyle:**");
    if let Some(bmi) = summary.bmi {
        let _ = writeln!(prompt, "- BMI: {bmi:.1}");
    }
    if let Some(minutes) = summary.physical_activity {
        let _ = writeln!(prompt, "- Physical Activity: {minutes:.0} min/week");
    }
    if let Some(hours) = summary.sleep_hours {
        let _ = writeln!(prompt, "- Sleep: {hours:.1} hours/night");
    }
    if let Some(age) = summary.age {
        let _ = writeln!(prompt, "- Age: {age:.0} years");
    }
    if summary.smoking == Some(true) {
        let _ = writeln!(prompt, "- Smoker");
    }

    if let Some(severity) = summary.dr_severity.filter(|s| *s != crate::domain::DrSeverity::None) {
        let _ = writeln!(
            prompt,
            "\n**Retinal Findings:** Diabetic retinopathy signs detected ({severity})"
        );
    }

    let modifiable: Vec<&str> = key_factors
        .iter()
        .filter(|f| f.source == FactorSource::Lifestyle && f.modifiable)
        .take(3)
        .map(|f| f.name.as_str())
        .collect();

    prompt.push_str(
        "
**Please provide personalized recommendations in this EXACT format:**

## Personalized Recommendations

List 5-7 complete, actionable recommendations. Each recommendation should be ONE complete statement including the action AND why it matters. Format as a simple numbered list:

1. [Complete recommendation with action and brief reason in one sentence]
2. [Complete recommendation with action and brief reason in one sentence]
...

**Important formatting rules:**
- Each recommendation must be ONE complete sentence
- Do NOT use sub-bullets or nested formatting
- Do NOT use ** for bold inside recommendations
",
    );
    if !modifiable.is_empty() {
        let _ = writeln!(prompt, "\nFocus on modifiable factors: {}", modifiable.join(", "));
    }
    prompt.push_str("\nMake it evidence-based, practical, and encouraging.\n");
    prompt
}

#[derive(Clone, Copy, PartialEq)]
enum Section {
    Preamble,
    Recommendations,
    Other,
}

fn is_list_item(line: &str) -> bool {
    line.starts_with(['-', '•', '*'])
        || (line.chars().count() > 10 && line.starts_with(|c: char| c.is_ascii_digit()))
}

/// Extract recommendations from free text.
///
/// Headings (`#`, `|`, `**`) switch sections. List items are kept while in
/// a recommendations section, or before any heading at all. Leading list
/// markers are stripped and short items dropped.
#[must_use]
pub fn parse_recommendations(text: &str) -> Vec<String> {
    let mut section = Section::Preamble;
    let mut out = Vec::new();

    for line in text.lines().map(str::trim).filter(|l| !l.is_empty()) {
        if line.starts_with('#') || line.starts_with('|') || line.starts_with("**") {
            section = if line.to_lowercase().contains("recommendation") {
                Section::Recommendations
            } else {
                Section::Other
            };
            continue;
        }
        if section == Section::Other || !is_list_item(line) {
            continue;
        }
        let cleaned = line
            .trim_start_matches(|c: char| "-•*. ".contains(c) || c.is_ascii_digit())
            .trim();
        if cleaned.chars().count() > MIN_RECOMMENDATION_CHARS {
            out.push(cleaned.to_string());
        }
        if out.len() == MAX_RECOMMENDATIONS {
            break;
        }
    }
    out
}

/// Rule-based recommendations tailored by key factors.
#[must_use]
pub fn default_recommendations(key_factors: &[KeyFactor]) -> Vec<String> {
    let mut recs: Vec<String> = DEFAULT_RECOMMENDATIONS.iter().map(|s| (*s).to_string()).collect();
    for factor in key_factors {
        let name = factor.name.to_lowercase();
        let tailored = if name.contains("bmi") {
            Some("Work towards achieving a healthy BMI through balanced diet and exercise")
        } else if name.contains("sleep") {
            Some("Improve sleep quality by maintaining a consistent sleep schedule")
        } else if name.contains("physical activity") {
            Some("Gradually increase daily physical activity, starting with walking")
        } else if name.contains("smoking") {
            Some("Seek support to quit smoking, which improves insulin sensitivity")
        } else {
            None
        };
        if let Some(rec) = tailored {
            recs.insert(0, rec.to_string());
        }
    }
    recs.truncate(MAX_RECOMMENDATIONS);
    recs
}
