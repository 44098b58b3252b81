//! Strings drawn from the language of a regular expression

use regex::Regex;
use regex_syntax::hir::{Class, Hir, HirKind};

use crate::error::{Result, SearchError};
use crate::search::randomness::Randomness;

/// Repetitions drawn past the minimum of a quantifier
const MAX_EXTRA_REPETITIONS: u32 = 4;
/// Printable ASCII, preferred whenever a class allows it
const PRINTABLE: (u32, u32) = (0x20, 0x7e);

fn parse(regex: &Regex) -> Result<Hir> {
    regex_syntax::Parser::new()
        .parse(regex.as_str())
        .map_err(|e| SearchError::Configuration(format!("Invalid pattern {}: {}", regex.as_str(), e)))
}

/// Random string built by walking the pattern. Anchors and word boundaries
/// produce nothing, so callers check the result with `regex.is_match`.
pub fn random_match(regex: &Regex, rng: &mut Randomness) -> Result<String> {
    let hir = parse(regex)?;
    let mut out = String::new();
    generate(&hir, Some(rng), &mut out);
    Ok(out)
}

/// Deterministic short member of the language: fewest repetitions, first
/// alternative, lowest printable character of each class
pub fn shortest_match(regex: &Regex) -> Result<String> {
    let hir = parse(regex)?;
    let mut out = String::new();
    generate(&hir, None, &mut out);
    Ok(out)
}

/// Whether the pattern can only ever produce one string
pub fn has_single_match(regex: &Regex) -> Result<bool> {
    Ok(is_single(&parse(regex)?))
}

fn generate(hir: &Hir, mut rng: Option<&mut Randomness>, out: &mut String) {
    match hir.kind() {
        HirKind::Empty | HirKind::Look(_) => {}
        HirKind::Literal(lit) => out.push_str(&String::from_utf8_lossy(&lit.0)),
        HirKind::Class(class) => {
            if let Some(c) = pick_char(&class_ranges(class), rng) {
                out.push(c);
            }
        }
        HirKind::Repetition(rep) => {
            let upper = rep
                .max
                .unwrap_or(u32::MAX)
                .min(rep.min.saturating_add(MAX_EXTRA_REPETITIONS));
            let n = match rng.as_deref_mut() {
                Some(r) => r.next_int(rep.min as i64, upper as i64) as u32,
                None => rep.min,
            };
            for _ in 0..n {
                generate(&rep.sub, rng.as_deref_mut(), out);
            }
        }
        HirKind::Capture(cap) => generate(&cap.sub, rng, out),
        HirKind::Concat(parts) => {
            for p in parts {
                generate(p, rng.as_deref_mut(), out);
            }
        }
        HirKind::Alternation(branches) => {
            let i = match rng.as_deref_mut() {
                Some(r) => r.next_index(branches.len()),
                None => 0,
            };
            if let Some(b) = branches.get(i) {
                generate(b, rng, out);
            }
        }
    }
}

fn class_ranges(class: &Class) -> Vec<(u32, u32)> {
    match class {
        Class::Unicode(c) => c
            .ranges()
            .iter()
            .map(|r| (r.start() as u32, r.end() as u32))
            .collect(),
        // bytes above ASCII cannot stand alone in a `String`
        Class::Bytes(c) => c
            .ranges()
            .iter()
            .filter(|r| r.start() < 0x80)
            .map(|r| (r.start() as u32, r.end().min(0x7f) as u32))
            .collect(),
    }
}

fn pick_char(ranges: &[(u32, u32)], rng: Option<&mut Randomness>) -> Option<char> {
    let printable: Vec<(u32, u32)> = ranges
        .iter()
        .map(|(s, e)| ((*s).max(PRINTABLE.0), (*e).min(PRINTABLE.1)))
        .filter(|(s, e)| s <= e)
        .collect();
    let pool: &[(u32, u32)] = if printable.is_empty() { ranges } else { &printable };

    let code = match rng {
        Some(r) => {
            let (s, e) = *r.choose(pool)?;
            r.next_int(s as i64, e as i64) as u32
        }
        None => pool.first()?.0,
    };
    // a range may straddle the surrogate gap
    char::from_u32(code).or_else(|| pool.first().and_then(|(s, _)| char::from_u32(*s)))
}

fn is_single(hir: &Hir) -> bool {
    match hir.kind() {
        HirKind::Empty | HirKind::Look(_) | HirKind::Literal(_) => true,
        HirKind::Class(class) => {
            let ranges = class_ranges(class);
            ranges.len() == 1 && ranges[0].0 == ranges[0].1
        }
        HirKind::Repetition(rep) => rep.max == Some(0) || (rep.max == Some(rep.min) && is_single(&rep.sub)),
        HirKind::Capture(cap) => is_single(&cap.sub),
        HirKind::Concat(parts) => parts.iter().all(is_single),
        HirKind::Alternation(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn regex(p: &str) -> Regex {
        Regex::new(p).unwrap()
    }

    #[test]
    fn test_random_values_match_the_pattern() {
        let mut rng = Randomness::with_seed(5);
        for p in [
            r"^[0-9]{3}-[0-9]{4}$",
            r"^(foo|bar)+\d?$",
            r"^[A-Z][a-z]*@example\.(com|org)$",
            r"^\w{2,5}\s\S+$",
            r"^(?i)abc$",
        ] {
            let re = regex(p);
            for _ in 0..50 {
                let s = random_match(&re, &mut rng).unwrap();
                assert!(re.is_match(&s), "{:?} does not match {}", s, p);
            }
        }
    }

    #[test]
    fn test_random_values_vary() {
        let re = regex(r"^[0-9]{3}-[0-9]{4}$");
        let mut rng = Randomness::with_seed(6);
        let distinct: HashSet<String> = (0..50).map(|_| random_match(&re, &mut rng).unwrap()).collect();
        assert!(distinct.len() > 40);
    }

    #[test]
    fn test_shortest_match() {
        assert_eq!(shortest_match(&regex(r"^[0-9]{3}-[0-9]{4}$")).unwrap(), "000-0000");
        assert_eq!(shortest_match(&regex(r"^a+(b|c)x*$")).unwrap(), "ab");
        let any = regex(r"^.{2}$");
        assert!(any.is_match(&shortest_match(&any).unwrap()));
    }

    #[test]
    fn test_single_match_languages() {
        assert!(has_single_match(&regex(r"^abc$")).unwrap());
        assert!(has_single_match(&regex(r"^(ab){2}$")).unwrap());
        assert!(!has_single_match(&regex(r"^ab?$")).unwrap());
        assert!(!has_single_match(&regex(r"^[ab]$")).unwrap());
        assert!(!has_single_match(&regex(r"^(a|b)$")).unwrap());
    }
}
