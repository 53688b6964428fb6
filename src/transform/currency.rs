//! Dollar-literal to localized BRL conversion.
//!
//! Every `$<number>` literal in the transformed HTML becomes
//! `R$<number × rate>` with two decimals and a comma separator. Conversion
//! must be idempotent: converted output contains no `$<number>` pattern a
//! second pass would pick up, which is what the leading guard class enforces.

use std::sync::OnceLock;

use regex::{Captures, Regex};

fn dollar_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        // The `R` exclusion keeps `R$55,90` from re-matching.
        Regex::new(r"(^|[^R])\$(\d+(?:\.\d{1,2})?)").expect("currency regex")
    })
}

/// Replace every dollar literal with its localized BRL equivalent.
pub fn convert_currency(input: &str, rate: f64) -> String {
    dollar_pattern()
        .replace_all(input, |caps: &Captures| {
            let prefix = caps.get(1).map_or("", |m| m.as_str());
            let amount: f64 = caps[2].parse().unwrap_or(0.0);
            format!("{prefix}R${}", format_brl(amount * rate))
        })
        .into_owned()
}

/// Two decimals, comma as the decimal separator.
fn format_brl(value: f64) -> String {
    format!("{value:.2}").replace('.', ",")
}
