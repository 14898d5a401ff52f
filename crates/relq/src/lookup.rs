//! Lookup operators (the last segment of `field__op` keys).

use std::fmt;

/// A lookup operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operator {
    Eq,
    Ne,
    Lt,
    Lte,
    Gt,
    Gte,
    In,
    NotIn,
    /// `LIKE '%v%'` on text; `@>` on JSON.
    Contains,
    IContains,
    StartsWith,
    IStartsWith,
    EndsWith,
    IEndsWith,
    Range,
    Year,
    Month,
    Day,
    Regex,
    IRegex,
    /// `null` and `isnull`; takes a boolean.
    IsNull,
    HasKey,
    HasKeys,
    HasAnyKeys,
    ContainedBy,
}

impl Operator {
    /// Parse an operator token.
    pub fn parse(token: &str) -> Option<Self> {
        let op = match token {
            "eq" => Self::Eq,
            "ne" => Self::Ne,
            "lt" => Self::Lt,
            "lte" => Self::Lte,
            "gt" => Self::Gt,
            "gte" => Self::Gte,
            "in" => Self::In,
            "notin" => Self::NotIn,
            "contains" => Self::Contains,
            "icontains" => Self::IContains,
            "startswith" => Self::StartsWith,
            "istartswith" => Self::IStartsWith,
            "endswith" => Self::EndsWith,
            "iendswith" => Self::IEndsWith,
            "range" => Self::Range,
            "year" => Self::Year,
            "month" => Self::Month,
            "day" => Self::Day,
            "regex" => Self::Regex,
            "iregex" => Self::IRegex,
            "null" | "isnull" => Self::IsNull,
            "has_key" => Self::HasKey,
            "has_keys" => Self::HasKeys,
            "has_any_keys" => Self::HasAnyKeys,
            "contained_by" => Self::ContainedBy,
            _ => return None,
        };
        Some(op)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Eq => "eq",
            Self::Ne => "ne",
            Self::Lt => "lt",
            Self::Lte => "lte",
            Self::Gt => "gt",
            Self::Gte => "gte",
            Self::In => "in",
            Self::NotIn => "notin",
            Self::Contains => "contains",
            Self::IContains => "icontains",
            Self::StartsWith => "startswith",
            Self::IStartsWith => "istartswith",
            Self::EndsWith => "endswith",
            Self::IEndsWith => "iendswith",
            Self::Range => "range",
            Self::Year => "year",
            Self::Month => "month",
            Self::Day => "day",
            Self::Regex => "regex",
            Self::IRegex => "iregex",
            Self::IsNull => "isnull",
            Self::HasKey => "has_key",
            Self::HasKeys => "has_keys",
            Self::HasAnyKeys => "has_any_keys",
            Self::ContainedBy => "contained_by",
        }
    }

    /// `EXTRACT` field name for date-part operators.
    pub fn date_part(self) -> Option<&'static str> {
        match self {
            Self::Year => Some("YEAR"),
            Self::Month => Some("MONTH"),
            Self::Day => Some("DAY"),
            _ => None,
        }
    }

    /// Operators allowed after a date part (`published__year__gte`).
    pub fn is_comparison(self) -> bool {
        matches!(
            self,
            Self::Eq
                | Self::Ne
                | Self::Lt
                | Self::Lte
                | Self::Gt
                | Self::Gte
                | Self::In
                | Self::NotIn
                | Self::Range
        )
    }

    /// Operators that only make sense on JSON columns.
    pub fn is_json_only(self) -> bool {
        matches!(
            self,
            Self::HasKey | Self::HasKeys | Self::HasAnyKeys | Self::ContainedBy
        )
    }

    /// Operators evaluated on the `jsonb` value rather than extracted text.
    pub fn is_json_native(self) -> bool {
        self.is_json_only() || self == Self::Contains
    }

    /// LIKE pattern shape: (case-insensitive, leading %, trailing %).
    pub(crate) fn like_shape(self) -> Option<(bool, bool, bool)> {
        match self {
            Self::Contains => Some((false, true, true)),
            Self::IContains => Some((true, true, true)),
            Self::StartsWith => Some((false, false, true)),
            Self::IStartsWith => Some((true, false, true)),
            Self::EndsWith => Some((false, true, false)),
            Self::IEndsWith => Some((true, true, false)),
            _ => None,
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Escape LIKE wildcards (`\`, `%`, `_`) with a backslash.
pub fn escape_like(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for ch in s.chars() {
        if matches!(ch, '\\' | '%' | '_') {
            out.push('\\');
        }
        out.push(ch);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_round_trips_names() {
        for token in [
            "eq", "ne", "lt", "lte", "gt", "gte", "in", "notin", "contains", "icontains",
            "startswith", "istartswith", "endswith", "iendswith", "range", "year", "month", "day",
            "regex", "iregex", "isnull", "has_key", "has_keys", "has_any_keys", "contained_by",
        ] {
            assert_eq!(Operator::parse(token).unwrap().as_str(), token);
        }
        assert_eq!(Operator::parse("null"), Some(Operator::IsNull));
        assert_eq!(Operator::parse("like"), None);
    }

    #[test]
    fn escape_like_wildcards() {
        assert_eq!(escape_like(r"50%_a\b"), r"50\%\_a\\b");
        assert_eq!(escape_like("o'"), "o'");
    }
}
