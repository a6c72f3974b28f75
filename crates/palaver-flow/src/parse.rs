// SPDX-FileCopyrightText: 2026 Palaver Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Free-text parsers for flow inputs: dates, times, yes/no, e-mail addresses.
//!
//! All parsers accept English and French phrasing and return `None` instead
//! of failing, so an unrecognized answer becomes a re-prompt.

use chrono::{Datelike, Duration, NaiveDate, NaiveTime, Weekday};

const WEEKDAYS: &[(&str, Weekday)] = &[
    ("monday", Weekday::Mon),
    ("lundi", Weekday::Mon),
    ("tuesday", Weekday::Tue),
    ("mardi", Weekday::Tue),
    ("wednesday", Weekday::Wed),
    ("mercredi", Weekday::Wed),
    ("thursday", Weekday::Thu),
    ("jeudi", Weekday::Thu),
    ("friday", Weekday::Fri),
    ("vendredi", Weekday::Fri),
    ("saturday", Weekday::Sat),
    ("samedi", Weekday::Sat),
    ("sunday", Weekday::Sun),
    ("dimanche", Weekday::Sun),
];

const YES: &[&str] = &[
    "yes", "y", "yeah", "yep", "yup", "sure", "ok", "okay", "confirm", "confirmed", "correct",
    "oui", "ouais", "d'accord", "dac", "parfait", "exactement", "confirme", "confirmé",
];

const NO: &[&str] = &["no", "n", "nope", "nah", "non", "pas"];

const CANCEL: &[&str] = &[
    "cancel", "stop", "quit", "exit", "never mind", "nevermind", "forget it", "annuler",
    "laisse tomber", "arrête", "arrete", "arrêter", "arreter",
];

const SKIP: &[&str] = &["skip", "no", "none", "non", "aucun", "aucune", "pas", "-", "passer"];

fn normalize(input: &str) -> String {
    input
        .trim()
        .to_lowercase()
        .trim_end_matches(['.', '!', '?', ' '])
        .to_string()
}

fn tokens(input: &str) -> impl Iterator<Item = &str> {
    input
        .split_whitespace()
        .map(|t| t.trim_matches(|c: char| matches!(c, ',' | '.' | '!' | '?' | ';' | '(' | ')')))
        .filter(|t| !t.is_empty())
}

/// Whether the message asks to leave the current flow.
pub fn is_cancel_request(input: &str) -> bool {
    let lower = normalize(input);
    CANCEL.contains(&lower.as_str())
}

/// Whether the message declines an optional question.
pub fn is_skip(input: &str) -> bool {
    let lower = normalize(input);
    SKIP.contains(&lower.as_str())
}

/// Interpret a yes/no answer from its first word.
pub fn parse_yes_no(input: &str) -> Option<bool> {
    let lower = normalize(input);
    if lower == "d'accord" || lower.starts_with("that's right") || lower.starts_with("c'est bon") {
        return Some(true);
    }
    let first = tokens(&lower).next()?.to_string();
    if YES.contains(&first.as_str()) {
        Some(true)
    } else if NO.contains(&first.as_str()) {
        Some(false)
    } else {
        None
    }
}

/// Parse a calendar date relative to `today`.
///
/// Understands `today`/`tomorrow` (and French equivalents), weekday names
/// (the next such day, never today), ISO `YYYY-MM-DD`, and `DD/MM[/YYYY]`
/// with `/`, `-` or `.` separators. A day-month without a year that has
/// already passed this year rolls into next year.
pub fn parse_date(input: &str, today: NaiveDate) -> Option<NaiveDate> {
    let lower = normalize(input);

    if lower.contains("after tomorrow")
        || lower.contains("après-demain")
        || lower.contains("apres-demain")
        || lower.contains("après demain")
    {
        return Some(today + Duration::days(2));
    }
    if lower.contains("tomorrow") || lower.contains("demain") {
        return Some(today + Duration::days(1));
    }
    if lower.contains("today") || lower.contains("aujourd'hui") || lower.contains("aujourdhui") {
        return Some(today);
    }

    for token in tokens(&lower) {
        if let Some((_, weekday)) = WEEKDAYS.iter().find(|(name, _)| *name == token) {
            let ahead = (7 + weekday.num_days_from_monday() as i64
                - today.weekday().num_days_from_monday() as i64)
                % 7;
            let ahead = if ahead == 0 { 7 } else { ahead };
            return Some(today + Duration::days(ahead));
        }
        if let Some(date) = parse_numeric_date(token, today) {
            return Some(date);
        }
    }
    None
}

fn parse_numeric_date(token: &str, today: NaiveDate) -> Option<NaiveDate> {
    if let Ok(date) = NaiveDate::parse_from_str(token, "%Y-%m-%d") {
        return Some(date);
    }
    let parts: Vec<&str> = token.split(['/', '-', '.']).collect();
    let number = |s: &str| -> Option<u32> {
        if s.is_empty() || s.len() > 4 || !s.chars().all(|c| c.is_ascii_digit()) {
            return None;
        }
        s.parse().ok()
    };
    match parts.as_slice() {
        [d, m] => {
            let (day, month) = (number(d)?, number(m)?);
            let this_year = NaiveDate::from_ymd_opt(today.year(), month, day)?;
            if this_year < today {
                NaiveDate::from_ymd_opt(today.year() + 1, month, day)
            } else {
                Some(this_year)
            }
        }
        [d, m, y] => {
            let (day, month, mut year) = (number(d)?, number(m)?, number(y)? as i32);
            if year < 100 {
                year += 2000;
            }
            NaiveDate::from_ymd_opt(year, month, day)
        }
        _ => None,
    }
}

/// Parse a time of day: `15:00`, `15h`, `15h30`, `3pm`, `3:30 pm`, `noon`,
/// or a bare hour `15`.
pub fn parse_time(input: &str) -> Option<NaiveTime> {
    let lower = normalize(input)
        .replace("p.m", "pm")
        .replace("a.m", "am")
        .replace(" pm", "pm")
        .replace(" am", "am");
    if lower.contains("noon") || lower.contains("midi") {
        return NaiveTime::from_hms_opt(12, 0, 0);
    }
    tokens(&lower).find_map(parse_time_token)
}

fn parse_time_token(token: &str) -> Option<NaiveTime> {
    let hm = |h: &str, m: &str| -> Option<(u32, u32)> {
        let all_digits = |s: &str| !s.is_empty() && s.len() <= 2 && s.chars().all(|c| c.is_ascii_digit());
        if !all_digits(h) || !(m.is_empty() || all_digits(m)) {
            return None;
        }
        let minute = if m.is_empty() { 0 } else { m.parse().ok()? };
        Some((h.parse().ok()?, minute))
    };

    let twelve_hour = token
        .strip_suffix("pm")
        .map(|rest| (rest, true))
        .or_else(|| token.strip_suffix("am").map(|rest| (rest, false)));
    if let Some((rest, pm)) = twelve_hour {
        let (h, m) = rest.split_once(':').unwrap_or((rest, ""));
        let (hour, minute) = hm(h, m)?;
        if !(1..=12).contains(&hour) {
            return None;
        }
        let hour = match (hour, pm) {
            (12, false) => 0,
            (12, true) => 12,
            (h, true) => h + 12,
            (h, false) => h,
        };
        return NaiveTime::from_hms_opt(hour, minute, 0);
    }

    let (h, m) = token
        .split_once(':')
        .or_else(|| token.split_once('h'))
        .unwrap_or((token, ""));
    let (hour, minute) = hm(h, m)?;
    NaiveTime::from_hms_opt(hour, minute, 0)
}

/// Extract an e-mail address from the message.
pub fn parse_email(input: &str) -> Option<String> {
    tokens(input)
        .map(|t| t.trim_matches(|c: char| matches!(c, '<' | '>' | '"' | '\'')))
        .find(|t| {
            let Some((local, domain)) = t.split_once('@') else {
                return false;
            };
            !local.is_empty()
                && !domain.contains('@')
                && domain.contains('.')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
        })
        .map(str::to_lowercase)
}
