use serde::{Deserialize, Serialize};

/// Recruitment cohort ("期生") of a member.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub enum Generation {
    #[serde(rename = "1期生")]
    First,
    #[serde(rename = "2期生")]
    Second,
    #[serde(rename = "3期生")]
    Third,
    #[serde(rename = "4期生")]
    Fourth,
    #[serde(rename = "5期生")]
    Fifth,
    #[serde(rename = "6期生")]
    Sixth,
}

impl Generation {
    pub const ALL: [Generation; 6] = [
        Generation::First,
        Generation::Second,
        Generation::Third,
        Generation::Fourth,
        Generation::Fifth,
        Generation::Sixth,
    ];

    /// The most recent cohort; used when the feed sends an unknown label.
    pub const NEWEST: Generation = Generation::Sixth;

    pub fn label(&self) -> &'static str {
        match self {
            Generation::First => "1期生",
            Generation::Second => "2期生",
            Generation::Third => "3期生",
            Generation::Fourth => "4期生",
            Generation::Fifth => "5期生",
            Generation::Sixth => "6期生",
        }
    }

    pub fn from_wire(cate: &str) -> Self {
        Generation::ALL
            .iter()
            .copied()
            .find(|g| g.label() == cate)
            .unwrap_or(Generation::NEWEST)
    }
}

impl std::fmt::Display for Generation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// A group member. Reference data, fetched once per session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct Member {
    pub code: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub english_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kana: Option<String>,
    pub generation: Generation,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile_link: Option<String>,
    #[serde(default)]
    pub is_graduated: bool,
}

impl Member {
    /// "Name (English Name)" when an English name is known.
    pub fn display_name(&self) -> String {
        match &self.english_name {
            Some(en) => format!("{} ({})", self.name, en),
            None => self.name.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generation_from_wire() {
        assert_eq!(Generation::from_wire("1期生"), Generation::First);
        assert_eq!(Generation::from_wire("5期生"), Generation::Fifth);
        assert_eq!(Generation::from_wire("7期生"), Generation::Sixth);
        assert_eq!(Generation::from_wire(""), Generation::Sixth);
    }

    #[test]
    fn test_generation_ordering() {
        assert!(Generation::First < Generation::Sixth);
        let mut gens = vec![Generation::Third, Generation::First, Generation::Fifth];
        gens.sort();
        assert_eq!(gens, vec![Generation::First, Generation::Third, Generation::Fifth]);
    }

    #[test]
    fn test_generation_serde_uses_labels() {
        let json = serde_json::to_string(&Generation::Fourth).unwrap();
        assert_eq!(json, "\"4期生\"");
        let parsed: Generation = serde_json::from_str("\"2期生\"").unwrap();
        assert_eq!(parsed, Generation::Second);
    }
}
