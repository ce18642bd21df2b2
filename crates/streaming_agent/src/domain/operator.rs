use std::cmp::Ordering;

/// Comparison a rule condition applies between a payload field and its value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComparisonOperator {
    GreaterThan,
    GreaterThanOrEqual,
    LessThan,
    LessThanOrEqual,
    Equal,
    NotEqual,
}

impl ComparisonOperator {
    /// Case-insensitive lookup over symbols and names.
    pub fn parse(operator: &str) -> Option<Self> {
        let op = match operator.trim().to_ascii_lowercase().as_str() {
            ">" | "greaterthan" => Self::GreaterThan,
            ">=" | "greaterthanorequal" => Self::GreaterThanOrEqual,
            "<" | "lessthan" => Self::LessThan,
            "<=" | "lessthanorequal" => Self::LessThanOrEqual,
            "=" | "==" | "equal" | "equals" => Self::Equal,
            "!=" | "<>" | "notequal" | "notequals" => Self::NotEqual,
            _ => return None,
        };
        Some(op)
    }

    /// Whether `left <op> right` holds given `left.cmp(right)`.
    pub fn holds(self, ordering: Ordering) -> bool {
        match self {
            Self::GreaterThan => ordering == Ordering::Greater,
            Self::GreaterThanOrEqual => ordering != Ordering::Less,
            Self::LessThan => ordering == Ordering::Less,
            Self::LessThanOrEqual => ordering != Ordering::Greater,
            Self::Equal => ordering == Ordering::Equal,
            Self::NotEqual => ordering != Ordering::Equal,
        }
    }

    pub fn compare_numbers(self, left: f64, right: f64) -> bool {
        left.partial_cmp(&right)
            .map(|ordering| self.holds(ordering))
            .unwrap_or(false)
    }

    /// Ordinal comparison after upper-casing both sides.
    pub fn compare_text(self, left: &str, right: &str) -> bool {
        let ordering = left
            .chars()
            .flat_map(char::to_uppercase)
            .cmp(right.chars().flat_map(char::to_uppercase));
        self.holds(ordering)
    }

    /// Phrase used in match descriptions.
    pub fn phrase(self) -> &'static str {
        match self {
            Self::GreaterThan => "greater than",
            Self::GreaterThanOrEqual => "greater than or equal to",
            Self::LessThan => "less than",
            Self::LessThanOrEqual => "less than or equal to",
            Self::Equal => "equal to",
            Self::NotEqual => "not equal to",
        }
    }
}
