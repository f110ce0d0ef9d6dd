use crate::config::ClassificationConfig;
use crate::detector::Detection;
use serde::{Deserialize, Serialize};

/// Inspection verdict for one processed frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Status {
    #[serde(rename = "PASS")]
    Pass,
    #[serde(rename = "NG")]
    Ng,
}

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Pass => "PASS",
            Status::Ng => "NG",
        }
    }
}

/// Label-matching policy deciding which detections count as defects.
///
/// The match is deliberately loose and entirely data-driven: a label is a
/// defect if it equals one of the configured spellings or contains one of
/// the configured substrings, case-insensitively. The default substring
/// set includes `sg`, which also matches unrelated labels such as `msg`;
/// tightening that is a deployment decision, made in configuration.
#[derive(Debug, Clone)]
pub struct DefectRules {
    exact: Vec<String>,
    substrings: Vec<String>,
}

impl DefectRules {
    pub fn new(config: &ClassificationConfig) -> Self {
        Self {
            exact: config
                .defect_labels
                .iter()
                .map(|s| s.to_lowercase())
                .collect(),
            substrings: config
                .defect_substrings
                .iter()
                .map(|s| s.to_lowercase())
                .collect(),
        }
    }

    pub fn is_defect(&self, label: &str) -> bool {
        let label = label.to_lowercase();
        self.exact.iter().any(|spelling| *spelling == label)
            || self.substrings.iter().any(|needle| label.contains(needle))
    }

    /// Flags each detection and derives the frame verdict: NG iff any
    /// detection in the frame is a defect.
    pub fn evaluate(&self, detections: &[Detection]) -> (Vec<bool>, Status) {
        let flags: Vec<bool> = detections
            .iter()
            .map(|d| self.is_defect(&d.label))
            .collect();
        let status = if flags.iter().any(|&defect| defect) {
            Status::Ng
        } else {
            Status::Pass
        };
        (flags, status)
    }
}

impl Default for DefectRules {
    fn default() -> Self {
        Self::new(&ClassificationConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn detection(label: &str) -> Detection {
        Detection {
            label: label.to_string(),
            confidence: 0.9,
            x1: 0.0,
            y1: 0.0,
            x2: 10.0,
            y2: 10.0,
        }
    }

    #[test]
    fn exact_spellings_match_case_insensitively() {
        let rules = DefectRules::default();
        assert!(rules.is_defect("SG-Defect"));
        assert!(rules.is_defect("sg_defect"));
        assert!(rules.is_defect("SG DEFECT"));
        assert!(rules.is_defect("sgdefect"));
        assert!(rules.is_defect("Defect"));
    }

    #[test]
    fn substrings_match_anywhere_in_label() {
        let rules = DefectRules::default();
        assert!(rules.is_defect("surface-defect-02"));
        // "msg" contains "sg", so the over-broad default flags it.
        assert!(rules.is_defect("msg"));
    }

    #[test]
    fn unrelated_labels_pass() {
        let rules = DefectRules::default();
        assert!(!rules.is_defect("phone"));
        assert!(!rules.is_defect("person"));
        // `signal` has no `sg` adjacency despite containing both letters.
        assert!(!rules.is_defect("signal"));
    }

    #[test]
    fn custom_rules_replace_defaults() {
        let rules = DefectRules::new(&ClassificationConfig {
            defect_labels: vec!["crack".to_string()],
            defect_substrings: vec!["scratch".to_string()],
        });
        assert!(rules.is_defect("Crack"));
        assert!(rules.is_defect("deep-scratch"));
        assert!(!rules.is_defect("sg-defect"));
    }

    #[test]
    fn frame_is_ng_iff_any_detection_is_a_defect() {
        let rules = DefectRules::default();

        let (flags, status) = rules.evaluate(&[detection("phone"), detection("sg-defect")]);
        assert_eq!(flags, vec![false, true]);
        assert_eq!(status, Status::Ng);

        let (flags, status) = rules.evaluate(&[detection("phone"), detection("person")]);
        assert_eq!(flags, vec![false, false]);
        assert_eq!(status, Status::Pass);
    }

    #[test]
    fn empty_frame_passes() {
        let (_, status) = DefectRules::default().evaluate(&[]);
        assert_eq!(status, Status::Pass);
    }
}
