//! Locale-aware number formatting.
//!
//! Formatting never groups digits and rounds half-to-even. Locale symbols
//! cover the decimal separator and the digit glyphs, which is why numbers are
//! always routed through a [`NumberFormatter`] instead of `to_string`.

use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

use crate::value::Number;

#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct Locale {
    language: String,
    country: Option<String>,
}

impl Locale {
    pub fn new<L: AsRef<str>>(language: L, country: Option<&str>) -> Self {
        Self {
            language: language.as_ref().to_ascii_lowercase(),
            country: country.map(str::to_ascii_uppercase),
        }
    }

    /// Parses tags like `en`, `en_US` or `de-CH`.
    pub fn parse(tag: &str) -> Self {
        let mut parts = tag.split(['_', '-']);
        let language = parts.next().unwrap_or_default();
        let country = parts.next().filter(|c| !c.is_empty());
        Self::new(language, country)
    }

    pub fn language(&self) -> &str {
        &self.language
    }

    pub fn country(&self) -> Option<&str> {
        self.country.as_deref()
    }

    pub fn english() -> Self {
        Self::new("en", Some("US"))
    }
}

impl std::fmt::Display for Locale {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.country {
            Some(country) => write!(f, "{}_{}", self.language, country),
            None => write!(f, "{}", self.language),
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct NumberSymbols {
    pub decimal_separator: char,
    pub minus_sign: char,
    pub zero_digit: char,
}

impl NumberSymbols {
    pub fn for_locale(locale: &Locale) -> Self {
        let latin = |decimal_separator| Self {
            decimal_separator,
            minus_sign: '-',
            zero_digit: '0',
        };
        match (locale.language(), locale.country()) {
            ("de", Some("CH" | "LI")) => latin('.'),
            (
                "de" | "fr" | "es" | "it" | "pt" | "ru" | "pl" | "nl" | "tr" | "sv" | "da" | "fi"
                | "nb" | "cs" | "uk",
                _,
            ) => latin(','),
            ("ar", _) => Self {
                decimal_separator: '\u{066B}',
                minus_sign: '-',
                zero_digit: '\u{0660}',
            },
            ("fa", _) => Self {
                decimal_separator: '\u{066B}',
                minus_sign: '-',
                zero_digit: '\u{06F0}',
            },
            _ => latin('.'),
        }
    }

    fn digit(&self, ascii: u8) -> char {
        let offset = u32::from(ascii.saturating_sub(b'0'));
        char::from_u32(u32::from(self.zero_digit) + offset).unwrap_or(char::from(ascii))
    }
}

/// A formatter bound to one locale and one fraction digit range.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NumberFormatter {
    locale: Locale,
    symbols: NumberSymbols,
    min_fraction_digits: usize,
    max_fraction_digits: usize,
}

impl NumberFormatter {
    pub fn new(locale: Locale, min_fraction_digits: usize, max_fraction_digits: usize) -> Self {
        let symbols = NumberSymbols::for_locale(&locale);
        Self {
            locale,
            symbols,
            min_fraction_digits,
            max_fraction_digits: max_fraction_digits.max(min_fraction_digits),
        }
    }

    pub fn locale(&self) -> &Locale {
        &self.locale
    }

    pub fn format(&self, number: &Number) -> String {
        let (negative, int_digits, frac_digits) = match *number {
            Number::Int(value) => (value < 0, value.unsigned_abs().to_string(), String::new()),
            Number::Float(value) if value.is_nan() => return "NaN".to_string(),
            Number::Float(value) if value.is_infinite() => {
                return if value < 0.0 {
                    format!("{}\u{221E}", self.symbols.minus_sign)
                } else {
                    "\u{221E}".to_string()
                };
            }
            Number::Float(value) => {
                // Display gives the shortest round-tripping digits, never an exponent.
                let repr = format!("{}", value.abs());
                let (int_part, frac_part) = repr.split_once('.').unwrap_or((repr.as_str(), ""));
                (
                    value.is_sign_negative(),
                    int_part.to_string(),
                    frac_part.to_string(),
                )
            }
        };

        let (int_digits, mut frac_digits) =
            round_half_even(int_digits, frac_digits, self.max_fraction_digits);
        while frac_digits.len() > self.min_fraction_digits && frac_digits.ends_with('0') {
            frac_digits.pop();
        }
        while frac_digits.len() < self.min_fraction_digits {
            frac_digits.push('0');
        }

        let is_zero = int_digits.bytes().chain(frac_digits.bytes()).all(|b| b == b'0');
        let mut out = String::with_capacity(int_digits.len() + frac_digits.len() + 2);
        if negative && !is_zero {
            out.push(self.symbols.minus_sign);
        }
        out.extend(int_digits.bytes().map(|b| self.symbols.digit(b)));
        if !frac_digits.is_empty() {
            out.push(self.symbols.decimal_separator);
            out.extend(frac_digits.bytes().map(|b| self.symbols.digit(b)));
        }
        out
    }
}

/// Rounds the decimal digit strings to `max_frac` fraction digits.
fn round_half_even(int_digits: String, frac_digits: String, max_frac: usize) -> (String, String) {
    if frac_digits.len() <= max_frac {
        return (int_digits, frac_digits);
    }
    let (kept, dropped) = frac_digits.split_at(max_frac);
    let mut dropped = dropped.bytes();
    let first = dropped.next().unwrap_or(b'0');
    let rest_nonzero = dropped.any(|b| b != b'0');

    let last_kept = kept
        .bytes()
        .last()
        .or_else(|| int_digits.bytes().last())
        .unwrap_or(b'0');
    let last_is_odd = (last_kept.saturating_sub(b'0')) % 2 == 1;
    let round_up = first > b'5' || (first == b'5' && (rest_nonzero || last_is_odd));

    let mut digits: Vec<u8> = int_digits.bytes().chain(kept.bytes()).collect();
    if round_up {
        let mut carry = true;
        for digit in digits.iter_mut().rev() {
            if *digit == b'9' {
                *digit = b'0';
            } else {
                *digit += 1;
                carry = false;
                break;
            }
        }
        if carry {
            digits.insert(0, b'1');
        }
    }
    let split = digits.len() - max_frac;
    let frac = digits.split_off(split);
    (
        String::from_utf8(digits).unwrap_or_default(),
        String::from_utf8(frac).unwrap_or_default(),
    )
}

#[derive(Debug)]
struct CachedFormatter {
    formatter: NumberFormatter,
}

/// Per-node formatter cell, rebuilt whenever the render locale changes.
/// The fraction digit bounds are fixed when the cell is created.
///
/// Readers clone the current snapshot under a shared lock. A miss takes the
/// rebuild lock, re-checks the snapshot, and publishes a fully built
/// formatter, so concurrent renders never observe one under construction.
#[derive(Debug)]
pub struct FormatterCache {
    min_fraction_digits: usize,
    max_fraction_digits: usize,
    current: RwLock<Option<Arc<CachedFormatter>>>,
    rebuild: Mutex<()>,
}

impl FormatterCache {
    /// A `max_fraction_digits` below the minimum is raised to it.
    pub fn new(min_fraction_digits: usize, max_fraction_digits: usize) -> Self {
        Self {
            min_fraction_digits,
            max_fraction_digits: max_fraction_digits.max(min_fraction_digits),
            current: RwLock::new(None),
            rebuild: Mutex::new(()),
        }
    }

    pub const fn fraction_digits(&self) -> (usize, usize) {
        (self.min_fraction_digits, self.max_fraction_digits)
    }

    fn snapshot(&self, locale: &Locale) -> Option<Arc<CachedFormatter>> {
        self.current
            .read()
            .as_ref()
            .filter(|cached| cached.formatter.locale() == locale)
            .cloned()
    }

    /// Formats `number` for `locale` using the cached formatter, building
    /// it on first use or when the locale differs from the cached one.
    pub fn format(&self, number: &Number, locale: &Locale) -> String {
        if let Some(cached) = self.snapshot(locale) {
            return cached.formatter.format(number);
        }

        let _rebuild = self.rebuild.lock();
        let cached = match self.snapshot(locale) {
            Some(cached) => cached,
            None => {
                tracing::debug!(%locale, "building number formatter");
                let cached = Arc::new(CachedFormatter {
                    formatter: NumberFormatter::new(
                        locale.clone(),
                        self.min_fraction_digits,
                        self.max_fraction_digits,
                    ),
                });
                *self.current.write() = Some(Arc::clone(&cached));
                cached
            }
        };
        cached.formatter.format(number)
    }

    pub fn cached_locale(&self) -> Option<Locale> {
        self.current
            .read()
            .as_ref()
            .map(|cached| cached.formatter.locale().clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fmt(locale: &str, min: usize, max: usize, number: Number) -> String {
        NumberFormatter::new(Locale::parse(locale), min, max).format(&number)
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_locale_parse() {
        let locale = Locale::parse("de-ch");
        assert_eq!(locale.language(), "de");
        assert_eq!(locale.country(), Some("CH"));
        assert_eq!(locale.to_string(), "de_CH");
        assert_eq!(Locale::parse("fr").country(), None);
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_decimal_separators() {
        assert_eq!(fmt("en_US", 0, 50, Number::Float(1.5)), "1.5");
        assert_eq!(fmt("de_DE", 0, 50, Number::Float(1.5)), "1,5");
        assert_eq!(fmt("de_CH", 0, 50, Number::Float(1.5)), "1.5");
        assert_eq!(fmt("fr", 0, 50, Number::Float(-0.25)), "-0,25");
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_no_grouping() {
        assert_eq!(fmt("en_US", 0, 3, Number::Int(1234567)), "1234567");
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_arabic_digits() {
        assert_eq!(
            fmt("ar_EG", 0, 50, Number::Float(12.5)),
            "\u{0661}\u{0662}\u{066B}\u{0665}"
        );
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_fraction_digit_bounds() {
        assert_eq!(fmt("en", 2, 2, Number::Int(3)), "3.00");
        assert_eq!(fmt("en", 1, 3, Number::Float(2.0)), "2.0");
        assert_eq!(fmt("en", 0, 2, Number::Float(1.239)), "1.24");
        assert_eq!(fmt("en", 0, 0, Number::Float(9.7)), "10");
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_half_even_rounding() {
        assert_eq!(fmt("en", 0, 0, Number::Float(2.5)), "2");
        assert_eq!(fmt("en", 0, 0, Number::Float(3.5)), "4");
        assert_eq!(fmt("en", 0, 1, Number::Float(0.25)), "0.2");
        assert_eq!(fmt("en", 0, 1, Number::Float(0.35)), "0.4");
        assert_eq!(fmt("en", 0, 1, Number::Float(0.251)), "0.3");
        assert_eq!(fmt("en", 0, 2, Number::Float(99.999)), "100");
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_negative_zero_after_rounding() {
        assert_eq!(fmt("en", 0, 1, Number::Float(-0.01)), "0");
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_non_finite() {
        assert_eq!(fmt("en", 0, 2, Number::Float(f64::NAN)), "NaN");
        assert_eq!(fmt("en", 0, 2, Number::Float(f64::NEG_INFINITY)), "-\u{221E}");
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_cache_rebuilds_on_locale_change() {
        let cache = FormatterCache::new(0, 50);
        assert!(cache.cached_locale().is_none());

        let en = Locale::parse("en_US");
        let de = Locale::parse("de_DE");
        assert_eq!(cache.format(&Number::Float(0.5), &en), "0.5");
        assert_eq!(cache.cached_locale(), Some(en.clone()));
        assert_eq!(cache.format(&Number::Float(0.5), &de), "0,5");
        assert_eq!(cache.cached_locale(), Some(de));
        assert_eq!(cache.format(&Number::Float(0.5), &en), "0.5");
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_caches_keep_their_own_digit_bounds() {
        let en = Locale::english();
        let unbounded = FormatterCache::new(0, 50);
        let two_digits = FormatterCache::new(2, 2);
        assert_eq!(unbounded.format(&Number::Float(1.23456), &en), "1.23456");
        assert_eq!(two_digits.format(&Number::Float(1.23456), &en), "1.23");
        assert_eq!(two_digits.format(&Number::Int(1), &en), "1.00");
        assert_eq!(unbounded.format(&Number::Float(1.23456), &en), "1.23456");

        let raised = FormatterCache::new(3, 1);
        assert_eq!(raised.fraction_digits(), (3, 3));
        assert_eq!(raised.format(&Number::Float(0.5), &en), "0.500");
    }

    #[test]
    #[ntest::timeout(5000)]
    fn test_cache_under_concurrent_locales() {
        let cache = FormatterCache::new(0, 50);
        let en = Locale::parse("en_US");
        let de = Locale::parse("de_DE");

        std::thread::scope(|scope| {
            for locale in [&en, &de, &en, &de] {
                let cache = &cache;
                scope.spawn(move || {
                    let expected = if locale.language() == "de" { "3,25" } else { "3.25" };
                    for _ in 0..500 {
                        assert_eq!(
                            cache.format(&Number::Float(3.25), locale),
                            expected,
                            "formatter of another locale leaked into this render"
                        );
                    }
                });
            }
        });
    }
}
