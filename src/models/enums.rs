use crate::db::DatabaseError;
use serde::{Deserialize, Serialize};

/// Macro to generate enum with as_str + std::str::FromStr pattern
macro_rules! str_enum {
    ($name:ident { $($variant:ident => $s:literal),+ $(,)? }) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(rename_all = "snake_case")]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $s),+
                }
            }

            pub fn all() -> &'static [$name] {
                &[$(Self::$variant),+]
            }
        }

        impl std::str::FromStr for $name {
            type Err = DatabaseError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($s => Ok(Self::$variant)),+,
                    _ => Err(DatabaseError::InvalidEnum {
                        field: stringify!($name).into(),
                        value: s.into(),
                    }),
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

str_enum!(DocumentStatus {
    Draft => "draft",
    InReview => "in_review",
    Approved => "approved",
    Rejected => "rejected",
});

str_enum!(IndexState {
    Pending => "pending",
    Processing => "processing",
    Completed => "completed",
    Failed => "failed",
});

str_enum!(Role {
    Viewer => "viewer",
    Submitter => "submitter",
    Reviewer => "reviewer",
    Admin => "admin",
});

str_enum!(Level {
    Low => "low",
    Medium => "medium",
    High => "high",
});

str_enum!(RuleStatus {
    Draft => "draft",
    Active => "active",
    Retired => "retired",
});

str_enum!(RiskStatus {
    Open => "open",
    Mitigated => "mitigated",
    Accepted => "accepted",
    Closed => "closed",
});

str_enum!(MitigationStatus {
    Planned => "planned",
    InProgress => "in_progress",
    Done => "done",
});

impl DocumentStatus {
    /// Parse a user-supplied status, accepting `in_review`, `inReview` and `in-review`.
    pub fn parse_loose(raw: &str) -> Option<Self> {
        let folded: String = raw
            .trim()
            .chars()
            .filter(|c| *c != '_' && *c != '-' && !c.is_whitespace())
            .flat_map(char::to_lowercase)
            .collect();
        Self::all()
            .iter()
            .copied()
            .find(|s| s.as_str().replace('_', "") == folded)
    }
}

impl Level {
    /// Coerce free text from a model ("High", "moderate", "70%", "0.2") to a level.
    /// Unrecognised values fall back to `Low`.
    pub fn coerce(raw: &str) -> Self {
        let text = raw.trim().to_lowercase();
        if text.is_empty() {
            return Self::Low;
        }

        let numeric = text.trim_end_matches('%').trim();
        if let Ok(value) = numeric.parse::<f32>() {
            let fraction = if text.ends_with('%') || value > 1.0 {
                value / 100.0
            } else {
                value
            };
            return if fraction >= 0.66 {
                Self::High
            } else if fraction >= 0.33 {
                Self::Medium
            } else {
                Self::Low
            };
        }

        let tokens: Vec<&str> = text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
            .collect();

        // First level word wins; "not"/"no" flips it, "very likely" is high.
        for (i, token) in tokens.iter().enumerate() {
            let previous = i.checked_sub(1).map(|p| tokens[p]);
            let level = match *token {
                "likely" if previous.is_some_and(|p| INTENSIFIERS.contains(&p)) => Self::High,
                word => match Self::from_word(word) {
                    Some(level) => level,
                    None => continue,
                },
            };
            return if previous.is_some_and(|p| NEGATIONS.contains(&p)) {
                level.negated()
            } else {
                level
            };
        }
        Self::Low
    }

    fn from_word(word: &str) -> Option<Self> {
        match word {
            "high" | "critical" | "catastrophic" | "severe" | "major" | "certain" => Some(Self::High),
            "medium" | "moderate" | "mid" | "med" | "likely" | "possible" => Some(Self::Medium),
            "low" | "minor" | "minimal" | "negligible" | "unlikely" | "rare" => Some(Self::Low),
            _ => None,
        }
    }

    fn negated(self) -> Self {
        match self {
            Self::Low => Self::Medium,
            Self::Medium | Self::High => Self::Low,
        }
    }
}

const NEGATIONS: &[&str] = &["not", "no"];
const INTENSIFIERS: &[&str] = &["very", "highly", "extremely"];
