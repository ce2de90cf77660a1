//! Static schema registry: field names, datatypes, obligatory/nullable
//! status, declared order, and per-field predicates.
//!
//! Predicates are a single tagged union rather than a trait hierarchy —
//! there is exactly one axis of variation here, and a `Custom` escape
//! hatch covers anything the built-in kinds don't.

use chrono::NaiveDate;
use regex::Regex;
use std::sync::OnceLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataType {
    Str,
    Int,
    Float,
}

/// A coerced field value, handed to a [`Predicate`] after datatype coercion
/// has already succeeded.
#[derive(Debug, Clone)]
pub enum Coerced {
    Str(String),
    Int(i64),
    Float(f64),
}

impl Coerced {
    pub fn coerce(datatype: DataType, raw: &str) -> Result<Coerced, String> {
        match datatype {
            DataType::Str => Ok(Coerced::Str(raw.to_string())),
            DataType::Int => raw
                .parse::<i64>()
                .map(Coerced::Int)
                .map_err(|_| format!("expected an integer, found `{raw}`")),
            DataType::Float => raw
                .parse::<f64>()
                .map(Coerced::Float)
                .map_err(|_| format!("expected a number, found `{raw}`")),
        }
    }

    fn as_str(&self) -> Option<&str> {
        match self {
            Coerced::Str(s) => Some(s.as_str()),
            _ => None,
        }
    }
}

/// Built-in predicate kinds, plus a function escape hatch.
#[derive(Clone)]
pub enum Predicate {
    InSet(&'static [&'static str]),
    Regex(&'static str),
    IntRange { min: i64, max: i64 },
    /// Non-negative integer, or a bucket `A-B` with `A <= B`.
    AgeBucketOrInt,
    /// `YYYY` or `DD.MM.YYYY`.
    Date,
    Custom(fn(&Coerced) -> Result<(), String>),
}

impl Predicate {
    pub fn evaluate(&self, value: &Coerced) -> Result<(), String> {
        match self {
            Predicate::InSet(allowed) => {
                let s = value.as_str().ok_or_else(|| "expected a string".to_string())?;
                if allowed.contains(&s) {
                    Ok(())
                } else {
                    Err(format!("expected one of {allowed:?}, found `{s}`"))
                }
            }
            Predicate::Regex(pattern) => {
                let s = value.as_str().ok_or_else(|| "expected a string".to_string())?;
                let re = Regex::new(pattern).expect("invalid predicate regex");
                if re.is_match(s) {
                    Ok(())
                } else {
                    Err(format!("does not match expected pattern `{pattern}`"))
                }
            }
            Predicate::IntRange { min, max } => match value {
                Coerced::Int(n) => {
                    if n >= min && n <= max {
                        Ok(())
                    } else {
                        Err(format!("expected an integer in [{min}, {max}], found `{n}`"))
                    }
                }
                _ => Err("expected an integer".to_string()),
            },
            Predicate::AgeBucketOrInt => {
                let s = value.as_str().ok_or_else(|| "expected a string".to_string())?;
                validate_age_bucket(s)
            }
            Predicate::Date => {
                let s = value.as_str().ok_or_else(|| "expected a string".to_string())?;
                parse_date(s)
                    .map(|_| ())
                    .ok_or_else(|| format!("expected `YYYY` or `DD.MM.YYYY`, found `{s}`"))
            }
            Predicate::Custom(f) => f(value),
        }
    }
}

fn validate_age_bucket(s: &str) -> Result<(), String> {
    if let Ok(n) = s.parse::<i64>() {
        return if n >= 0 {
            Ok(())
        } else {
            Err(format!("expected a non-negative age, found `{n}`"))
        };
    }
    match s.split_once('-') {
        Some((a, b)) => {
            let a: i64 = a
                .parse()
                .map_err(|_| format!("invalid age bucket `{s}`"))?;
            let b: i64 = b
                .parse()
                .map_err(|_| format!("invalid age bucket `{s}`"))?;
            if a <= b {
                Ok(())
            } else {
                Err(format!("invalid age bucket `{s}`: lower bound exceeds upper bound"))
            }
        }
        None => Err(format!("expected a non-negative integer or an `A-B` bucket, found `{s}`")),
    }
}

/// Normalizes `YYYY` or `DD.MM.YYYY` to a `NaiveDate`, used both by the
/// predicate and by `validate::validate_date_range`.
pub fn parse_date(s: &str) -> Option<NaiveDate> {
    static YEAR_ONLY: OnceLock<Regex> = OnceLock::new();
    static FULL_DATE: OnceLock<Regex> = OnceLock::new();
    let year_only = YEAR_ONLY.get_or_init(|| Regex::new(r"^\d{4}$").unwrap());
    let full_date = FULL_DATE.get_or_init(|| Regex::new(r"^\d{2}\.\d{2}\.\d{4}$").unwrap());

    if year_only.is_match(s) {
        let year: i32 = s.parse().ok()?;
        return NaiveDate::from_ymd_opt(year, 1, 1);
    }
    if full_date.is_match(s) {
        let mut parts = s.split('.');
        let day: u32 = parts.next()?.parse().ok()?;
        let month: u32 = parts.next()?.parse().ok()?;
        let year: i32 = parts.next()?.parse().ok()?;
        return NaiveDate::from_ymd_opt(year, month, day);
    }
    None
}

#[derive(Clone)]
pub struct FieldSchema {
    pub name: &'static str,
    pub datatype: DataType,
    pub obligatory: bool,
    pub nullable: bool,
    pub predicate: Option<Predicate>,
}

impl FieldSchema {
    const fn req(name: &'static str, datatype: DataType) -> Self {
        FieldSchema {
            name,
            datatype,
            obligatory: true,
            nullable: false,
            predicate: None,
        }
    }

    const fn opt(name: &'static str, datatype: DataType) -> Self {
        FieldSchema {
            name,
            datatype,
            obligatory: false,
            nullable: true,
            predicate: None,
        }
    }

    fn with(mut self, predicate: Predicate) -> Self {
        self.predicate = Some(predicate);
        self
    }

    fn not_nullable(mut self) -> Self {
        self.nullable = false;
        self
    }
}

/// An ordered field list for one section. Order in this `Vec` is the
/// canonical order the "order" pass compares declared fields against.
pub struct SectionSchema(pub Vec<FieldSchema>);

impl SectionSchema {
    pub fn field(&self, name: &str) -> Option<&FieldSchema> {
        self.0.iter().find(|f| f.name == name)
    }

    pub fn obligatory_fields(&self) -> impl Iterator<Item = &FieldSchema> {
        self.0.iter().filter(|f| f.obligatory)
    }

    pub fn canonical_order(&self) -> Vec<&'static str> {
        self.0.iter().map(|f| f.name).collect()
    }
}

/// `key` is a historical META artifact: present in some files, never
/// flagged as unknown, and never validated.
pub const META_IGNORED_FIELD: &str = "key";

pub fn meta_schema() -> SectionSchema {
    use DataType::*;
    SectionSchema(vec![
        FieldSchema::req("description", Str),
        FieldSchema::req("country", Str),
        FieldSchema::req("unit", Str),
        FieldSchema::req("instance", Str),
        FieldSchema::req("num_projects", Int),
        FieldSchema::req("num_votes", Int),
        FieldSchema::req("budget", Float),
        FieldSchema::req("vote_type", Str).with(Predicate::InSet(&[
            "ordinal",
            "approval",
            "cumulative",
            "choose-1",
        ])),
        FieldSchema::req("rule", Str),
        FieldSchema::req("date_begin", Str).with(Predicate::Date),
        FieldSchema::req("date_end", Str).with(Predicate::Date),
        FieldSchema::opt("fully_funded", Int).with(Predicate::IntRange { min: 1, max: 1 }),
        FieldSchema::opt("max_length", Int),
        FieldSchema::opt("min_length", Int),
        FieldSchema::opt("max_length_unit", Int),
        FieldSchema::opt("min_length_unit", Int),
        FieldSchema::opt("max_length_district", Int),
        FieldSchema::opt("min_length_district", Int),
        FieldSchema::opt("max_sum_cost", Float),
        FieldSchema::opt("max_sum_points", Float),
        FieldSchema::opt("min_project_score_threshold", Float),
        FieldSchema::opt("comment", Str).with(Predicate::Regex(r"^#1: ")),
        FieldSchema::opt("language", Str),
        FieldSchema::opt("currency", Str),
        FieldSchema::opt("edition", Str),
        FieldSchema::opt("subunit", Str),
    ])
}

pub fn projects_schema() -> SectionSchema {
    use DataType::*;
    SectionSchema(vec![
        FieldSchema::req("project_id", Str),
        FieldSchema::req("cost", Float),
        FieldSchema::req("name", Str),
        FieldSchema::opt("category", Str),
        FieldSchema::opt("target", Str),
        FieldSchema::opt("selected", Int).with(Predicate::IntRange { min: 0, max: 2 }),
        FieldSchema::opt("votes", Int),
        FieldSchema::opt("score", Float),
        FieldSchema::opt("longitude", Float),
        FieldSchema::opt("latitude", Float),
    ])
}

pub fn votes_schema() -> SectionSchema {
    use DataType::*;
    SectionSchema(vec![
        FieldSchema::req("voter_id", Str),
        FieldSchema::req("vote", Str).not_nullable(),
        FieldSchema::opt("age", Str).with(Predicate::AgeBucketOrInt),
        FieldSchema::opt("sex", Str).with(Predicate::InSet(&["M", "F", "O"])),
        FieldSchema::opt("voting_method", Str),
        FieldSchema::opt("points", Str),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vote_type_predicate_accepts_known_values() {
        let schema = meta_schema();
        let field = schema.field("vote_type").unwrap();
        let coerced = Coerced::coerce(field.datatype, "cumulative").unwrap();
        assert!(field.predicate.as_ref().unwrap().evaluate(&coerced).is_ok());
    }

    #[test]
    fn vote_type_predicate_rejects_unknown_values() {
        let schema = meta_schema();
        let field = schema.field("vote_type").unwrap();
        let coerced = Coerced::coerce(field.datatype, "lottery").unwrap();
        assert!(field.predicate.as_ref().unwrap().evaluate(&coerced).is_err());
    }

    #[test]
    fn age_bucket_accepts_range_and_rejects_inverted_range() {
        assert!(validate_age_bucket("18-29").is_ok());
        assert!(validate_age_bucket("5").is_ok());
        assert!(validate_age_bucket("30-18").is_err());
        assert!(validate_age_bucket("abc").is_err());
    }

    #[test]
    fn date_predicate_accepts_year_and_full_date() {
        assert!(parse_date("2020").is_some());
        assert!(parse_date("31.12.2020").is_some());
        assert!(parse_date("not-a-date").is_none());
    }

    #[test]
    fn comment_regex_requires_hash1_prefix() {
        let schema = meta_schema();
        let field = schema.field("comment").unwrap();
        let ok = Coerced::coerce(field.datatype, "#1: some comment").unwrap();
        let bad = Coerced::coerce(field.datatype, "some comment").unwrap();
        assert!(field.predicate.as_ref().unwrap().evaluate(&ok).is_ok());
        assert!(field.predicate.as_ref().unwrap().evaluate(&bad).is_err());
    }
}
