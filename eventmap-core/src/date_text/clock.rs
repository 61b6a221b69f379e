//! Clock tokens: `h[:mm](am|pm)`, plus `noon` and `midnight`.

use chrono::NaiveTime;
use once_cell::sync::Lazy;
use regex::Regex;

static TOKEN_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^(\d{1,2})(?::(\d{2}))?\s*(?:([ap])\.?m\.?)?$").expect("static regex")
});

static RANGE_SEPARATOR_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\s*(?:-|–|—|\bto\b)\s*").expect("static regex"));

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Meridiem {
    Am,
    Pm,
}

#[derive(Debug, Clone, Copy)]
struct Token {
    hour: u32,
    minute: u32,
    meridiem: Option<Meridiem>,
}

impl Token {
    fn parse(s: &str) -> Option<Token> {
        let s = s.trim();
        match s.to_ascii_lowercase().as_str() {
            "noon" => return Some(Token { hour: 12, minute: 0, meridiem: Some(Meridiem::Pm) }),
            "midnight" => return Some(Token { hour: 12, minute: 0, meridiem: Some(Meridiem::Am) }),
            _ => {}
        }

        let caps = TOKEN_RE.captures(s)?;
        let hour: u32 = caps.get(1)?.as_str().parse().ok()?;
        let minute: u32 = match caps.get(2) {
            Some(m) => m.as_str().parse().ok()?,
            None => 0,
        };
        let meridiem = caps.get(3).map(|m| {
            if m.as_str().eq_ignore_ascii_case("a") {
                Meridiem::Am
            } else {
                Meridiem::Pm
            }
        });

        if !(1..=12).contains(&hour) || minute > 59 {
            return None;
        }
        Some(Token { hour, minute, meridiem })
    }

    /// 12am is hour 0, 12pm is hour 12. Without its own meridiem the token
    /// borrows `fallback`; with neither it is not a valid clock value.
    fn to_time(self, fallback: Option<Meridiem>) -> Option<NaiveTime> {
        let hour = match (self.meridiem.or(fallback)?, self.hour) {
            (Meridiem::Am, 12) => 0,
            (Meridiem::Am, h) => h,
            (Meridiem::Pm, 12) => 12,
            (Meridiem::Pm, h) => h + 12,
        };
        NaiveTime::from_hms_opt(hour, self.minute, 0)
    }
}

/// Split `"<start>-<end>"` at the first range separator.
pub(crate) fn split_range(s: &str) -> (&str, Option<&str>) {
    let s = s.trim();
    match RANGE_SEPARATOR_RE.find(s) {
        Some(m) if m.start() > 0 => (&s[..m.start()], Some(&s[m.end()..])),
        _ => (s, None),
    }
}

/// Parse a start token and optional end token. A start token without
/// meridiem inherits the end token's ("7-10pm").
pub(crate) fn parse_parts(start: &str, end: Option<&str>) -> Option<(NaiveTime, Option<NaiveTime>)> {
    let start = Token::parse(start)?;
    match end {
        None => Some((start.to_time(None)?, None)),
        Some(end) => {
            let end = Token::parse(end)?;
            let end_time = end.to_time(None)?;
            Some((start.to_time(end.meridiem)?, Some(end_time)))
        }
    }
}

/// Parse `"<start>[-<end>]"`.
pub(crate) fn parse_range(s: &str) -> Option<(NaiveTime, Option<NaiveTime>)> {
    let (start, end) = split_range(s);
    parse_parts(start, end)
}
