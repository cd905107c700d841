use serde::Serialize;

use crate::remote::DiseasePrediction;

pub const NOT_A_LEAF: &str = "Not a leaf";

/// Successful answers of `POST /classify`.
#[derive(Debug, Serialize, PartialEq)]
#[serde(untagged)]
pub enum ClassifyResponse {
    NotLeaf {
        output: &'static str,
    },
    Diagnosis {
        disease_name: String,
        confidence_score: f64,
        output: String,
    },
}

impl ClassifyResponse {
    pub fn not_leaf() -> Self {
        ClassifyResponse::NotLeaf { output: NOT_A_LEAF }
    }

    pub fn diagnosis(prediction: DiseasePrediction) -> Self {
        let confidence = round_confidence(prediction.score);
        let output = format!(
            "Plant Disease: {}, Confidence Score: {:.4}",
            prediction.label, confidence
        );
        ClassifyResponse::Diagnosis {
            disease_name: prediction.label,
            confidence_score: confidence,
            output,
        }
    }
}

/// Clamps a provider score into `[0, 1]` and rounds it to 4 decimals.
pub fn round_confidence(score: f64) -> f64 {
    if !score.is_finite() {
        return 0.0;
    }
    (score.clamp(0.0, 1.0) * 10_000.0).round() / 10_000.0
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub model_loaded: bool,
}

impl HealthResponse {
    pub fn new(model_loaded: bool) -> Self {
        HealthResponse {
            status: "healthy",
            model_loaded,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn prediction(label: &str, score: f64) -> DiseasePrediction {
        DiseasePrediction {
            label: label.to_string(),
            score,
        }
    }

    #[test]
    fn diagnosis_matches_wire_format() {
        let body = serde_json::to_value(ClassifyResponse::diagnosis(prediction(
            "Tomato_healthy",
            0.87,
        )))
        .unwrap();

        assert_eq!(
            body,
            json!({
                "disease_name": "Tomato_healthy",
                "confidence_score": 0.87,
                "output": "Plant Disease: Tomato_healthy, Confidence Score: 0.8700"
            })
        );
    }

    #[test]
    fn not_leaf_has_only_output() {
        let body = serde_json::to_value(ClassifyResponse::not_leaf()).unwrap();
        assert_eq!(body, json!({ "output": "Not a leaf" }));
    }

    #[test]
    fn unknown_placeholder_reads_zero() {
        match ClassifyResponse::diagnosis(DiseasePrediction::unknown()) {
            ClassifyResponse::Diagnosis {
                disease_name,
                confidence_score,
                output,
            } => {
                assert_eq!(disease_name, "Unknown");
                assert_eq!(confidence_score, 0.0);
                assert_eq!(output, "Plant Disease: Unknown, Confidence Score: 0.0000");
            }
            other => panic!("unexpected response {:?}", other),
        }
    }

    #[test]
    fn confidence_is_rounded_and_bounded() {
        assert_eq!(round_confidence(0.123456), 0.1235);
        assert_eq!(round_confidence(0.99996), 1.0);
        assert_eq!(round_confidence(1.7), 1.0);
        assert_eq!(round_confidence(-0.2), 0.0);
        assert_eq!(round_confidence(f64::NAN), 0.0);
    }

    #[test]
    fn health_body() {
        let body = serde_json::to_value(HealthResponse::new(false)).unwrap();
        assert_eq!(body, json!({ "status": "healthy", "model_loaded": false }));
    }
}
