//! Verdict types.
//!
//! [`ModelVerdict`] is what an inference candidate returns; it is parsed
//! leniently because model output is untrusted. [`AnalysisResult`] is the
//! stable caller-visible verdict, built from a model verdict or synthesized as
//! the neutral fallback.

use crate::heuristics;
use schemars::JsonSchema;
use serde::{Deserialize, Deserializer, Serialize};

/// Score used when nothing better is known.
pub const NEUTRAL_SCORE: u8 = 50;

/// Heuristic score at or above which a flag is raised.
const FLAG_THRESHOLD: u8 = 70;

pub const FALLBACK_FLAG: &str = "Analysis could not be completed - using fallback. Please try again.";
pub const FALLBACK_EXPLANATION: &str =
    "Unable to complete full analysis due to technical issues. Please try again later.";
const GENERIC_EXPLANATION: &str = "The model returned a verdict without an explanation.";

/// Classification outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "UPPERCASE")]
pub enum Prediction {
    #[serde(alias = "fake", alias = "Fake")]
    Fake,
    #[serde(alias = "real", alias = "Real")]
    Real,
    #[serde(alias = "uncertain", alias = "Uncertain")]
    Uncertain,
}

/// Structured answer requested from an inference candidate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelVerdict {
    pub prediction: Prediction,
    #[serde(default = "neutral", deserialize_with = "lenient_score")]
    pub confidence: f64,
    #[serde(default, deserialize_with = "lenient_text")]
    pub reasoning: String,
    #[serde(default, deserialize_with = "lenient_list")]
    pub flags: Vec<String>,
    #[serde(default, deserialize_with = "lenient_list")]
    pub factual_concerns: Vec<String>,
    #[serde(default = "neutral", deserialize_with = "lenient_score")]
    pub credibility_score: f64,
}

fn neutral() -> f64 {
    f64::from(NEUTRAL_SCORE)
}

/// Accepts a number or a numeric string; anything else becomes neutral.
fn lenient_score<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
    let value = serde_json::Value::deserialize(deserializer)?;
    let score = match value {
        serde_json::Value::Number(n) => n.as_f64(),
        serde_json::Value::String(s) => s.trim().trim_end_matches('%').parse().ok(),
        _ => None,
    };
    Ok(score.filter(|s| s.is_finite()).unwrap_or_else(neutral))
}

fn lenient_text<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(match value {
        serde_json::Value::String(s) => s,
        serde_json::Value::Null => String::new(),
        other => other.to_string(),
    })
}

/// Accepts an array (keeping string items) or a single string.
fn lenient_list<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<String>, D::Error> {
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(match value {
        serde_json::Value::Array(items) => items
            .into_iter()
            .filter_map(|item| match item {
                serde_json::Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
                _ => None,
            })
            .collect(),
        serde_json::Value::String(s) if !s.trim().is_empty() => vec![s.trim().to_string()],
        _ => Vec::new(),
    })
}

/// Sub-signal scores, each 0..=100.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Signals {
    pub ml_score: u8,
    pub sentiment_score: u8,
    pub clickbait_score: u8,
    pub source_score: u8,
    pub bias_score: u8,
}

impl Signals {
    pub fn neutral() -> Self {
        Self {
            ml_score: NEUTRAL_SCORE,
            sentiment_score: NEUTRAL_SCORE,
            clickbait_score: NEUTRAL_SCORE,
            source_score: NEUTRAL_SCORE,
            bias_score: NEUTRAL_SCORE,
        }
    }
}

/// Caller-visible verdict.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisResult {
    pub prediction: Prediction,
    pub confidence: u8,
    pub overall_score: u8,
    pub signals: Signals,
    pub flags: Vec<String>,
    #[serde(default)]
    pub factual_concerns: Vec<String>,
    pub explanation: String,
    /// Candidate that produced the verdict.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

fn clamp_score(value: f64) -> u8 {
    if value.is_finite() { value.round().clamp(0.0, 100.0) as u8 } else { NEUTRAL_SCORE }
}

impl AnalysisResult {
    /// Combine a model verdict with the lexical signals of the analyzed text.
    pub fn from_verdict(verdict: ModelVerdict, text: &str, candidate: &str) -> Self {
        let confidence = clamp_score(verdict.confidence);
        let credibility = clamp_score(verdict.credibility_score);

        let signals = Signals {
            ml_score: confidence,
            sentiment_score: heuristics::sentiment_score(text),
            clickbait_score: heuristics::clickbait_score(text),
            source_score: credibility,
            bias_score: heuristics::bias_score(text),
        };

        let mut flags: Vec<String> = Vec::with_capacity(verdict.flags.len() + 3);
        for flag in verdict.flags {
            if !flags.contains(&flag) {
                flags.push(flag);
            }
        }
        for (score, flag) in [
            (signals.clickbait_score, "Clickbait-style language detected"),
            (signals.sentiment_score, "Emotionally charged language detected"),
            (signals.bias_score, "Absolutist or loaded wording detected"),
        ] {
            if score >= FLAG_THRESHOLD {
                flags.push(flag.to_string());
            }
        }

        let explanation = match verdict.reasoning.trim() {
            "" => GENERIC_EXPLANATION.to_string(),
            reasoning => reasoning.to_string(),
        };

        Self {
            prediction: verdict.prediction,
            confidence,
            overall_score: credibility,
            signals,
            flags,
            factual_concerns: verdict.factual_concerns,
            explanation,
            model: Some(candidate.to_string()),
        }
    }

    /// Neutral verdict returned when analysis could not be completed.
    pub fn fallback() -> Self {
        Self {
            prediction: Prediction::Uncertain,
            confidence: NEUTRAL_SCORE,
            overall_score: NEUTRAL_SCORE,
            signals: Signals::neutral(),
            flags: vec![FALLBACK_FLAG.to_string()],
            factual_concerns: Vec::new(),
            explanation: FALLBACK_EXPLANATION.to_string(),
            model: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_model_verdict_full() {
        let json = r#"{
            "prediction": "FAKE",
            "confidence": 87,
            "reasoning": "Claims contradict public records.",
            "flags": ["unsourced claim"],
            "factualConcerns": ["date is wrong"],
            "credibilityScore": 12
        }"#;
        let verdict: ModelVerdict = serde_json::from_str(json).unwrap();
        assert_eq!(verdict.prediction, Prediction::Fake);
        assert_eq!(verdict.confidence, 87.0);
        assert_eq!(verdict.flags, vec!["unsourced claim".to_string()]);
        assert_eq!(verdict.factual_concerns, vec!["date is wrong".to_string()]);
        assert_eq!(verdict.credibility_score, 12.0);
    }

    #[test]
    fn test_model_verdict_lenient_fields() {
        let json = r#"{"prediction": "real", "confidence": "91%", "flags": "single flag", "credibilityScore": null}"#;
        let verdict: ModelVerdict = serde_json::from_str(json).unwrap();
        assert_eq!(verdict.prediction, Prediction::Real);
        assert_eq!(verdict.confidence, 91.0);
        assert_eq!(verdict.flags, vec!["single flag".to_string()]);
        assert_eq!(verdict.credibility_score, 50.0);
        assert!(verdict.reasoning.is_empty());
    }

    #[test]
    fn test_model_verdict_requires_prediction() {
        let result: Result<ModelVerdict, _> = serde_json::from_str(r#"{"confidence": 80}"#);
        assert!(result.is_err());

        let result: Result<ModelVerdict, _> = serde_json::from_str(r#"{"prediction": "MAYBE"}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_from_verdict_clamps_and_flags() {
        let verdict = ModelVerdict {
            prediction: Prediction::Fake,
            confidence: 140.0,
            reasoning: "  ".into(),
            flags: vec!["dup".into(), "dup".into()],
            factual_concerns: vec![],
            credibility_score: -5.0,
        };
        let result = AnalysisResult::from_verdict(verdict, "SHOCKING!!! You won't believe this miracle", "model-a");

        assert_eq!(result.confidence, 100);
        assert_eq!(result.overall_score, 0);
        assert_eq!(result.signals.ml_score, 100);
        assert_eq!(result.signals.source_score, 0);
        assert_eq!(result.flags[0], "dup");
        assert_eq!(result.flags.iter().filter(|f| *f == "dup").count(), 1);
        assert!(result.flags.iter().any(|f| f.contains("Clickbait")));
        assert_eq!(result.explanation, GENERIC_EXPLANATION);
        assert_eq!(result.model.as_deref(), Some("model-a"));
    }

    #[test]
    fn test_fallback_is_neutral() {
        let fallback = AnalysisResult::fallback();
        assert_eq!(fallback.prediction, Prediction::Uncertain);
        assert_eq!(fallback.confidence, 50);
        assert_eq!(fallback.overall_score, 50);
        assert_eq!(fallback.signals, Signals::neutral());
        assert_eq!(fallback.flags, vec![FALLBACK_FLAG.to_string()]);
        assert!(fallback.model.is_none());
    }

    #[test]
    fn test_result_serializes_camel_case() {
        let json = serde_json::to_value(AnalysisResult::fallback()).unwrap();
        assert_eq!(json["prediction"], "UNCERTAIN");
        assert_eq!(json["overallScore"], 50);
        assert_eq!(json["signals"]["clickbaitScore"], 50);
        assert!(json.get("model").is_none());
    }
}
