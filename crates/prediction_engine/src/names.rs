//! Feature-name resolver: transformed column index → display name.

use tracing::warn;

use crate::artifact::{ModelInfo, Preprocessor};

/// Raw identifiers of the transformed feature space, in column order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeatureNames {
    raw: Vec<String>,
    categorical: Vec<String>,
}

impl FeatureNames {
    /// Numerical column names, then `<field>_<category>` for every encoded
    /// category, both in encoder order. The sidecar must list the same
    /// columns in the same order; otherwise names stay empty and lookups
    /// fall back to `feature_N`.
    pub fn build(pre: &Preprocessor, info: Option<&ModelInfo>) -> Self {
        let categorical: Vec<String> = pre.categorical.iter().map(|c| c.name.clone()).collect();
        let Some(info) = info else {
            return Self { raw: Vec::new(), categorical };
        };

        let numerical: Vec<&str> = pre.numerical.iter().map(|c| c.name.as_str()).collect();
        if info.numerical_features != numerical || info.categorical_features != categorical {
            warn!(
                sidecar_numerical = ?info.numerical_features,
                sidecar_categorical = ?info.categorical_features,
                encoder_numerical = ?numerical,
                encoder_categorical = ?categorical,
                "sidecar feature names disagree with the encoder"
            );
            return Self { raw: Vec::new(), categorical };
        }

        let mut raw: Vec<String> = numerical.iter().map(|n| n.to_string()).collect();
        for col in &pre.categorical {
            raw.extend(col.categories.iter().map(|c| format!("{}_{c}", col.name)));
        }
        Self { raw, categorical }
    }

    pub fn len(&self) -> usize {
        self.raw.len()
    }

    pub fn is_empty(&self) -> bool {
        self.raw.is_empty()
    }

    pub fn raw(&self, index: usize) -> Option<&str> {
        self.raw.get(index).map(String::as_str)
    }

    /// Never fails: unknown positions render as `feature_N`.
    pub fn display(&self, index: usize) -> String {
        match self.raw(index) {
            Some(raw) => resolve(raw, &self.categorical),
            None => format!("feature_{index}"),
        }
    }
}

/// `venue_MCG` → `Venue: MCG`, `runs_required` → `Runs Required`.
///
/// The longest matching categorical prefix wins, so `toss_winner_India`
/// never splits as `toss` + `winner_India`.
pub fn resolve(raw: &str, categorical: &[String]) -> String {
    let field = categorical
        .iter()
        .filter(|f| {
            raw.len() > f.len() + 1 && raw.starts_with(f.as_str()) && raw.as_bytes()[f.len()] == b'_'
        })
        .max_by_key(|f| f.len());

    match field {
        Some(f) => format!("{}: {}", title_case(f), &raw[f.len() + 1..]),
        None => title_case(raw),
    }
}

fn title_case(s: &str) -> String {
    s.split(['_', ' '])
        .filter(|w| !w.is_empty())
        .map(|w| {
            let mut chars = w.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<String>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifact::fixtures;

    fn fields() -> Vec<String> {
        ["batting_team", "bowling_team", "venue", "toss_winner", "toss_decision"]
            .iter()
            .map(|s| s.to_string())
            .collect()
    }

    #[test]
    fn categorical_expansion_renders_field_and_value() {
        assert_eq!(resolve("venue_MCG", &fields()), "Venue: MCG");
        assert_eq!(resolve("batting_team_New Zealand", &fields()), "Batting Team: New Zealand");
        assert_eq!(resolve("toss_decision_field", &fields()), "Toss Decision: field");
    }

    #[test]
    fn value_keeps_its_own_underscores() {
        assert_eq!(resolve("venue_Eden_Gardens", &fields()), "Venue: Eden_Gardens");
    }

    #[test]
    fn plain_identifiers_are_title_cased() {
        assert_eq!(resolve("runs_required", &fields()), "Runs Required");
        assert_eq!(resolve("current_run_rate", &fields()), "Current Run Rate");
        assert_eq!(resolve("venue", &fields()), "Venue");
    }

    #[test]
    fn fixture_names_follow_column_order() {
        let artifact = fixtures::artifact();
        let names = artifact.feature_names();
        assert_eq!(names.len(), 16);
        assert_eq!(names.raw(0), Some("runs_required"));
        assert_eq!(names.raw(7), Some("batting_team_India"));
        assert_eq!(names.display(10), "Venue: MCG");
        assert_eq!(names.display(15), "Toss Decision: field");
    }

    #[test]
    fn missing_sidecar_falls_back_to_positional_labels() {
        let pipeline = fixtures::pipeline();
        let names = FeatureNames::build(&pipeline.preprocessor, None);
        assert!(names.is_empty());
        assert_eq!(names.display(3), "feature_3");
    }

    #[test]
    fn sidecar_disagreeing_with_encoder_is_ignored() {
        let pipeline = fixtures::pipeline();
        let mut info = fixtures::info();
        info.numerical_features.pop();
        let names = FeatureNames::build(&pipeline.preprocessor, Some(&info));
        assert!(names.is_empty());
        assert_eq!(names.display(0), "feature_0");

        let mut info = fixtures::info();
        info.categorical_features.push("umpire".to_string());
        assert!(FeatureNames::build(&pipeline.preprocessor, Some(&info)).is_empty());
    }

    #[test]
    fn sidecar_in_a_different_order_is_ignored() {
        let pipeline = fixtures::pipeline();
        let mut info = fixtures::info();
        info.categorical_features.swap(0, 2);
        let names = FeatureNames::build(&pipeline.preprocessor, Some(&info));
        assert!(names.is_empty());
        assert_eq!(names.display(6), "feature_6");
        assert_eq!(names.display(10), "feature_10");

        let mut info = fixtures::info();
        info.numerical_features.swap(0, 1);
        assert!(FeatureNames::build(&pipeline.preprocessor, Some(&info)).is_empty());
    }

    #[test]
    fn names_follow_encoder_vocabulary() {
        let artifact = fixtures::artifact();
        let names = artifact.feature_names();
        for (i, col) in artifact.preprocessor().numerical.iter().enumerate() {
            assert_eq!(names.raw(i), Some(col.name.as_str()));
        }
        assert_eq!(names.raw(6), Some("batting_team_Australia"));
        assert_eq!(names.raw(10), Some("venue_MCG"));
    }
}
