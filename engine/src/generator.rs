//! Value-Generator Registry: a closed catalogue of named generators,
//! each a deterministic routine seeded from the obfuscator's own RNG so
//! that a run is reproducible given a fixed seed.
//!
//! `mutation_kwargs` is an arbitrary JSON object; each generator pulls
//! out the keys it recognizes and ignores the rest. A `unique: true`
//! kwarg routes the draw through [`UniqueTracker`], retrying until a
//! fresh value is found or the retry budget is exhausted.

use std::collections::HashSet;

use chrono::{Datelike, Duration, NaiveDate, Utc};
use rand::rngs::StdRng;
use rand::seq::IndexedRandom;
use rand::{Rng, SeedableRng};
use serde_json::Value;
use uuid::Uuid;

use crate::error::{ObfuscateError, Result};

/// Minimum number of draws a `unique`-flagged generator must attempt
/// before giving up.
const UNIQUE_RETRY_BUDGET: u32 = 1000;

const FIRST_NAMES: &[&str] = &[
    "James", "Mary", "Robert", "Patricia", "John", "Jennifer", "Michael", "Linda", "David",
    "Elizabeth", "William", "Barbara", "Richard", "Susan", "Joseph", "Jessica", "Thomas",
    "Sarah", "Charles", "Karen",
];

const MIDDLE_NAMES: &[&str] = &[
    "Lee", "Ann", "Marie", "Allen", "James", "Lynn", "Ray", "Grace", "Dean", "Rose",
];

const LAST_NAMES: &[&str] = &[
    "Smith", "Johnson", "Williams", "Brown", "Jones", "Garcia", "Miller", "Davis", "Rodriguez",
    "Martinez", "Hernandez", "Lopez", "Gonzalez", "Wilson", "Anderson", "Thomas", "Taylor",
    "Moore", "Jackson", "Martin",
];

const STREET_NAMES: &[&str] = &[
    "Main St", "Oak Ave", "Maple Dr", "Cedar Ln", "Elm St", "Washington Blvd", "Park Rd",
    "Lake St", "Hill Ave", "Sunset Dr",
];

const CITIES: &[&str] = &[
    "Springfield", "Riverside", "Fairview", "Georgetown", "Madison", "Franklin", "Clinton",
    "Greenville", "Salem", "Arlington",
];

const STATES: &[&str] = &[
    "AL", "AK", "AZ", "AR", "CA", "CO", "CT", "DE", "FL", "GA", "HI", "ID", "IL", "IN", "IA",
];

const EMAIL_DOMAINS: &[&str] = &["example.com", "example.org", "example.net", "mail.test"];

const URI_SCHEMES: &[&str] = &["https", "http"];

/// The closed catalogue of mutation names the registry can dispatch,
/// kept in lockstep with the `match` in [`generate_once`] so a directive
/// can be validated against it at parse time, before any row is seen.
const KNOWN_MUTATIONS: &[&str] = &[
    "email",
    "full_name",
    "first_name",
    "middle_name",
    "last_name",
    "address",
    "past_date",
    "future_date",
    "uri",
    "ipv4_public",
    "ipv4_private",
    "ipv6",
    "phone_number",
    "fixed_value",
    "empty_string",
    "null",
    "integer",
    "decimal",
    "real",
    "random_choice",
    "uuid_v4",
    "uuid_v5",
];

/// Per-run tracker of values already emitted by `unique`-flagged draws,
/// namespaced by mutation name so `unique` on `email` and `unique` on
/// `phone_number` never collide with each other.
#[derive(Debug, Default)]
pub struct UniqueTracker {
    seen: HashSet<(String, String)>,
}

impl UniqueTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Call `draw` until it produces a value not yet seen for `mutation`,
    /// or the retry budget is exhausted.
    fn unique_draw(
        &mut self,
        mutation: &str,
        mut draw: impl FnMut() -> String,
    ) -> Result<String> {
        for _ in 0..UNIQUE_RETRY_BUDGET {
            let candidate = draw();
            let key = (mutation.to_string(), candidate.clone());
            if !self.seen.contains(&key) {
                self.seen.insert(key);
                return Ok(candidate);
            }
        }
        Err(ObfuscateError::UniquenessExhausted {
            mutation: mutation.to_string(),
            attempts: UNIQUE_RETRY_BUDGET,
        })
    }
}

/// Owns the RNG and unique-value tracker for a single run. Locale is
/// threaded through for forward compatibility; the shipped catalogue is
/// locale-invariant ASCII.
pub struct GeneratorRegistry {
    rng: StdRng,
    unique: UniqueTracker,
    #[allow(dead_code)]
    locale: String,
}

impl GeneratorRegistry {
    pub fn new(seed: u64, locale: impl Into<String>) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            unique: UniqueTracker::new(),
            locale: locale.into(),
        }
    }

    /// Whether `mutation_name` is in the registry's closed catalogue.
    /// Used to validate directives at parse time, before any row data is
    /// seen, rather than deferring the check to the first row that fires
    /// the entry.
    pub fn is_known(&self, mutation_name: &str) -> bool {
        KNOWN_MUTATIONS.contains(&mutation_name)
    }

    /// Generate a replacement value for `mutation_name` using `kwargs`,
    /// with access to the row's already-obfuscated fields for generators
    /// that derive from another column (`uuid_v5`).
    pub fn generate(
        &mut self,
        mutation_name: &str,
        kwargs: &Value,
        row_so_far: &dyn Fn(&str) -> Option<String>,
    ) -> Result<String> {
        let unique = kwargs.get("unique").and_then(Value::as_bool).unwrap_or(false);

        if unique {
            let rng = &mut self.rng;
            let mutation_name_owned = mutation_name.to_string();
            self.unique.unique_draw(mutation_name, || {
                generate_once(rng, &mutation_name_owned, kwargs, row_so_far).unwrap_or_default()
            })
        } else {
            generate_once(&mut self.rng, mutation_name, kwargs, row_so_far)
        }
    }
}

fn generate_once(
    rng: &mut StdRng,
    mutation_name: &str,
    kwargs: &Value,
    row_so_far: &dyn Fn(&str) -> Option<String>,
) -> Result<String> {
    match mutation_name {
        "email" => Ok(gen_email(rng)),
        "full_name" => Ok(format!(
            "{} {}",
            pick(rng, FIRST_NAMES),
            pick(rng, LAST_NAMES)
        )),
        "first_name" => Ok(pick(rng, FIRST_NAMES).to_string()),
        "middle_name" => Ok(pick(rng, MIDDLE_NAMES).to_string()),
        "last_name" => Ok(pick(rng, LAST_NAMES).to_string()),
        "address" => Ok(gen_address(rng)),
        "past_date" => gen_relative_date(rng, kwargs, "start_date", "-30d", true),
        "future_date" => gen_relative_date(rng, kwargs, "end_date", "+30d", false),
        "uri" => Ok(gen_uri(rng, kwargs)),
        "ipv4_public" => Ok(gen_ipv4_public(rng)),
        "ipv4_private" => Ok(gen_ipv4_private(rng)),
        "ipv6" => Ok(gen_ipv6(rng)),
        "phone_number" => gen_phone_number(rng, kwargs, mutation_name),
        "fixed_value" => gen_fixed_value(kwargs, mutation_name),
        "empty_string" => Ok(String::new()),
        "null" => Ok("\\N".to_string()),
        "integer" => gen_integer(rng, kwargs),
        "decimal" | "real" => gen_real(rng, kwargs),
        "random_choice" => gen_random_choice(rng, kwargs, mutation_name),
        "uuid_v4" => Ok(Uuid::new_v4().to_string()),
        "uuid_v5" => gen_uuid_v5(kwargs, mutation_name, row_so_far),
        other => Err(ObfuscateError::UnknownMutation(other.to_string())),
    }
}

fn pick<'a>(rng: &mut StdRng, items: &'a [&'a str]) -> &'a str {
    items.choose(rng).copied().unwrap_or_default()
}

fn gen_email(rng: &mut StdRng) -> String {
    let first = pick(rng, FIRST_NAMES).to_lowercase();
    let last = pick(rng, LAST_NAMES).to_lowercase();
    let suffix: u32 = rng.random_range(0..10_000);
    let domain = pick(rng, EMAIL_DOMAINS);
    format!("{first}.{last}{suffix}@{domain}")
}

fn gen_address(rng: &mut StdRng) -> String {
    let number: u32 = rng.random_range(1..9999);
    let street = pick(rng, STREET_NAMES);
    let city = pick(rng, CITIES);
    let state = pick(rng, STATES);
    let zip: u32 = rng.random_range(10000..99999);
    format!("{number} {street}, {city}, {state} {zip}")
}

fn gen_uri(rng: &mut StdRng, kwargs: &Value) -> String {
    let max_length = kwargs
        .get("max_length")
        .and_then(Value::as_u64)
        .unwrap_or(2048) as usize;
    let scheme = pick(rng, URI_SCHEMES);
    let host = format!("{}.test", pick(rng, CITIES).to_lowercase());
    let path_segment: u32 = rng.random_range(0..100_000);
    let uri = format!("{scheme}://{host}/path/{path_segment}");
    uri.chars().take(max_length).collect()
}

fn gen_ipv4_public(rng: &mut StdRng) -> String {
    loop {
        let octets: [u8; 4] = rng.random();
        if !is_private_v4(octets) && octets[0] != 0 && octets[0] != 127 {
            return octets
                .iter()
                .map(u8::to_string)
                .collect::<Vec<_>>()
                .join(".");
        }
    }
}

fn gen_ipv4_private(rng: &mut StdRng) -> String {
    let blocks: [(u8, std::ops::Range<u8>); 3] =
        [(10, 0..255), (172, 16..32), (192, 168..169)];
    let (first, second_range) = blocks.choose(rng).cloned().unwrap();
    let second: u8 = if second_range.start == second_range.end {
        second_range.start
    } else {
        rng.random_range(second_range)
    };
    let third: u8 = rng.random();
    let fourth: u8 = rng.random_range(1..255);
    format!("{first}.{second}.{third}.{fourth}")
}

fn is_private_v4(octets: [u8; 4]) -> bool {
    matches!(
        octets,
        [10, ..] | [172, 16..=31, ..] | [192, 168, ..]
    )
}

fn gen_ipv6(rng: &mut StdRng) -> String {
    let groups: [u16; 8] = std::array::from_fn(|_| rng.random());
    groups
        .iter()
        .map(|g| format!("{g:x}"))
        .collect::<Vec<_>>()
        .join(":")
}

fn gen_phone_number(rng: &mut StdRng, kwargs: &Value, mutation_name: &str) -> Result<String> {
    let format = kwargs
        .get("format")
        .and_then(Value::as_str)
        .ok_or_else(|| ObfuscateError::GeneratorFailure {
            mutation: mutation_name.to_string(),
            reason: "missing required kwarg `format`".to_string(),
        })?;
    Ok(format
        .chars()
        .map(|c| {
            if c == '#' {
                char::from_digit(rng.random_range(0..10), 10).unwrap_or('0')
            } else {
                c
            }
        })
        .collect())
}

fn gen_fixed_value(kwargs: &Value, mutation_name: &str) -> Result<String> {
    let value = kwargs
        .get("value")
        .ok_or_else(|| ObfuscateError::GeneratorFailure {
            mutation: mutation_name.to_string(),
            reason: "missing required kwarg `value`".to_string(),
        })?;
    Ok(match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    })
}

fn gen_integer(rng: &mut StdRng, kwargs: &Value) -> Result<String> {
    let min = kwargs.get("min").and_then(Value::as_i64).unwrap_or(0);
    let max = kwargs.get("max").and_then(Value::as_i64).unwrap_or(i32::MAX as i64);
    Ok(rng.random_range(min..=max).to_string())
}

fn gen_real(rng: &mut StdRng, kwargs: &Value) -> Result<String> {
    let min = kwargs.get("min").and_then(Value::as_f64).unwrap_or(0.0);
    let max = kwargs.get("max").and_then(Value::as_f64).unwrap_or(1.0);
    let precision = kwargs.get("precision").and_then(Value::as_u64).unwrap_or(2) as usize;
    let value: f64 = rng.random_range(min..max);
    Ok(format!("{value:.precision$}"))
}

fn gen_random_choice(rng: &mut StdRng, kwargs: &Value, mutation_name: &str) -> Result<String> {
    let choices = kwargs
        .get("choices")
        .and_then(Value::as_array)
        .filter(|a| !a.is_empty())
        .ok_or_else(|| ObfuscateError::GeneratorFailure {
            mutation: mutation_name.to_string(),
            reason: "missing or empty kwarg `choices`".to_string(),
        })?;
    let chosen = choices.choose(rng).expect("non-empty checked above");
    Ok(match chosen {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    })
}

fn gen_uuid_v5(
    kwargs: &Value,
    mutation_name: &str,
    row_so_far: &dyn Fn(&str) -> Option<String>,
) -> Result<String> {
    let source_column =
        kwargs
            .get("source_column")
            .and_then(Value::as_str)
            .ok_or_else(|| ObfuscateError::GeneratorFailure {
                mutation: mutation_name.to_string(),
                reason: "missing required kwarg `source_column`".to_string(),
            })?;
    let source_value = row_so_far(source_column).unwrap_or_default();
    let today = Utc::now().date_naive();
    let name = format!("{source_value}:{today}");
    Ok(Uuid::new_v5(&Uuid::NAMESPACE_URL, name.as_bytes()).to_string())
}

/// Parse the small relative-offset grammar (`-30d`, `+1y`, `today`, `now`)
/// into a concrete date and format it, for `past_date`/`future_date`.
fn gen_relative_date(
    rng: &mut StdRng,
    kwargs: &Value,
    bound_key: &str,
    default_offset: &str,
    past: bool,
) -> Result<String> {
    let offset_str = kwargs
        .get(bound_key)
        .and_then(Value::as_str)
        .unwrap_or(default_offset);
    let date_format = kwargs
        .get("date_format")
        .and_then(Value::as_str)
        .unwrap_or("%Y-%m-%d");

    let today = Utc::now().date_naive();
    let bound = apply_relative_offset(today, offset_str);

    let date = if past {
        let earliest = bound.min(today);
        let span_days = (today - earliest).num_days().max(1);
        let offset = rng.random_range(0..=span_days);
        today - Duration::days(offset)
    } else {
        let latest = bound.max(today);
        let span_days = (latest - today).num_days().max(1);
        let offset = rng.random_range(0..=span_days);
        today + Duration::days(offset)
    };

    Ok(strftime_like(date, date_format))
}

fn apply_relative_offset(base: NaiveDate, offset: &str) -> NaiveDate {
    let trimmed = offset.trim();
    if trimmed.eq_ignore_ascii_case("today") || trimmed.eq_ignore_ascii_case("now") {
        return base;
    }

    let (sign, rest) = match trimmed.as_bytes().first() {
        Some(b'-') => (-1i64, &trimmed[1..]),
        Some(b'+') => (1i64, &trimmed[1..]),
        _ => (1i64, trimmed),
    };

    let Some(unit) = rest.chars().last() else {
        return base;
    };
    let amount: i64 = rest[..rest.len() - unit.len_utf8()]
        .parse()
        .unwrap_or(0);
    let signed = sign * amount;

    match unit {
        'd' => base + Duration::days(signed),
        'w' => base + Duration::weeks(signed),
        'y' => shift_years(base, signed),
        'm' => shift_months(base, signed),
        _ => base,
    }
}

fn shift_years(base: NaiveDate, years: i64) -> NaiveDate {
    let target_year = base.year() + years as i32;
    NaiveDate::from_ymd_opt(target_year, base.month(), base.day())
        .unwrap_or_else(|| NaiveDate::from_ymd_opt(target_year, base.month(), 28).unwrap())
}

fn shift_months(base: NaiveDate, months: i64) -> NaiveDate {
    let total_months = base.month0() as i64 + months;
    let year = base.year() + (total_months.div_euclid(12)) as i32;
    let month0 = total_months.rem_euclid(12) as u32;
    NaiveDate::from_ymd_opt(year, month0 + 1, base.day())
        .unwrap_or_else(|| NaiveDate::from_ymd_opt(year, month0 + 1, 28).unwrap())
}

/// A small strftime-equivalent: supports the handful of directives the
/// directive grammar actually uses (`%Y`, `%m`, `%d`).
fn strftime_like(date: NaiveDate, format: &str) -> String {
    format
        .replace("%Y", &date.year().to_string())
        .replace("%m", &format!("{:02}", date.month()))
        .replace("%d", &format!("{:02}", date.day()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn deterministic_given_same_seed() {
        let mut a = GeneratorRegistry::new(42, "en_US");
        let mut b = GeneratorRegistry::new(42, "en_US");
        let va = a.generate("email", &json!({}), &|_| None).unwrap();
        let vb = b.generate("email", &json!({}), &|_| None).unwrap();
        assert_eq!(va, vb);
    }

    #[test]
    fn null_emits_sql_null_marker() {
        let mut reg = GeneratorRegistry::new(1, "en_US");
        assert_eq!(reg.generate("null", &json!({}), &|_| None).unwrap(), "\\N");
    }

    #[test]
    fn empty_string_is_empty() {
        let mut reg = GeneratorRegistry::new(1, "en_US");
        assert_eq!(
            reg.generate("empty_string", &json!({}), &|_| None).unwrap(),
            ""
        );
    }

    #[test]
    fn fixed_value_returns_configured_value() {
        let mut reg = GeneratorRegistry::new(1, "en_US");
        let out = reg
            .generate("fixed_value", &json!({"value": "redacted"}), &|_| None)
            .unwrap();
        assert_eq!(out, "redacted");
    }

    #[test]
    fn unknown_mutation_is_an_error() {
        let mut reg = GeneratorRegistry::new(1, "en_US");
        let err = reg.generate("not_a_real_mutation", &json!({}), &|_| None);
        assert!(matches!(err, Err(ObfuscateError::UnknownMutation(_))));
    }

    #[test]
    fn is_known_reflects_the_dispatch_catalogue() {
        let reg = GeneratorRegistry::new(1, "en_US");
        assert!(reg.is_known("email"));
        assert!(reg.is_known("uuid_v5"));
        assert!(!reg.is_known("not_a_real_mutation"));
    }

    #[test]
    fn unique_draws_never_repeat() {
        let mut reg = GeneratorRegistry::new(7, "en_US");
        let mut seen = HashSet::new();
        for _ in 0..20 {
            let v = reg
                .generate("random_choice", &json!({"unique": true, "choices": ["a","b","c","d","e","f","g","h","i","j","k","l","m","n","o","p","q","r","s","t"]}), &|_| None)
                .unwrap();
            assert!(seen.insert(v));
        }
    }

    #[test]
    fn uuid_v5_is_derived_from_source_column() {
        let mut reg = GeneratorRegistry::new(1, "en_US");
        let row = std::collections::HashMap::from([("email".to_string(), "a@b.com".to_string())]);
        let v1 = reg
            .generate(
                "uuid_v5",
                &json!({"source_column": "email"}),
                &|c| row.get(c).cloned(),
            )
            .unwrap();
        let v2 = reg
            .generate(
                "uuid_v5",
                &json!({"source_column": "email"}),
                &|c| row.get(c).cloned(),
            )
            .unwrap();
        assert_eq!(v1, v2);
    }

    #[test]
    fn phone_number_replaces_hash_marks_with_digits() {
        let mut reg = GeneratorRegistry::new(3, "en_US");
        let out = reg
            .generate("phone_number", &json!({"format": "+1 (###) ###-####"}), &|_| None)
            .unwrap();
        assert_eq!(out.len(), "+1 (###) ###-####".len());
        assert!(out.chars().filter(|c| c.is_ascii_digit()).count() == 10);
    }
}
