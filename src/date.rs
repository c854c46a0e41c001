//! Date field parsing. RFC 5322 dates appear in a large family of layouts
//! built from optional weekday prefixes, one- or two-digit days, two- or
//! four-digit years, optional seconds and three kinds of zone. The layouts
//! are tried in order and the first match wins; the canonical output is
//! always `Mon, 02 Jan 2006 15:04:05 -0700`.

use chrono::{DateTime, FixedOffset, NaiveDateTime, TimeZone};

use crate::strings;

/// Obsolete named zones from RFC 822/5322, plus the handful of others seen
/// in the wild. Per RFC 5322, unknown alphabetic zones mean -0000.
fn named_zone(name: &str) -> Option<&'static str> {
    let offset = match name.to_ascii_uppercase().as_str() {
        "UT" | "GMT" | "UTC" | "Z" => "+0000",
        "EST" => "-0500",
        "EDT" => "-0400",
        "CST" => "-0600",
        "CDT" => "-0500",
        "MST" => "-0700",
        "MDT" => "-0600",
        "PST" => "-0800",
        "PDT" => "-0700",
        "CET" | "MET" => "+0100",
        "CEST" | "MEST" => "+0200",
        "BST" => "+0100",
        "JST" => "+0900",
        "KST" => "+0900",
        _ => return None,
    };
    Some(offset)
}

fn strip_comments(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut depth = 0;
    for c in s.chars() {
        match c {
            '(' => depth += 1,
            ')' => {
                if depth > 0 {
                    depth -= 1;
                }
            }
            _ if depth == 0 => out.push(c),
            _ => {}
        }
    }
    out
}

fn is_numeric_zone(tok: &str) -> bool {
    let b = tok.as_bytes();
    (b.first() == Some(&b'+') || b.first() == Some(&b'-'))
        && b.len() >= 3
        && b.len() <= 5
        && b[1..].iter().all(|c| c.is_ascii_digit())
}

/// Pads short numeric zones ("+200") out to the four digits chrono expects.
fn normalize_zone(tok: &str) -> String {
    let (sign, digits) = tok.split_at(1);
    match digits.len() {
        2 => format!("{}00{}", sign, digits),
        3 => format!("{}0{}", sign, digits),
        _ => tok.to_string(),
    }
}

const WEEKDAYS: [&str; 7] = ["mon", "tue", "wed", "thu", "fri", "sat", "sun"];

const ZONED_FORMATS: [&str; 2] = ["%d %b %Y %H:%M:%S %z", "%d %b %Y %H:%M %z"];

// asctime()-style dates, with the year last and no zone
const BARE_FORMATS: [&str; 4] = [
    "%b %d %H:%M:%S %Y",
    "%b %d %H:%M %Y",
    "%d %b %Y %H:%M:%S",
    "%d %b %Y %H:%M",
];

/// Parses one of the accepted date layouts. Returns None if none match.
pub fn parse_date(s: &str) -> Option<DateTime<FixedOffset>> {
    let s = strings::simplify(&strip_comments(s));
    if s.is_empty() {
        return None;
    }

    let mut tokens: Vec<String> = s
        .split(|c| c == ' ' || c == ',')
        .filter(|t| !t.is_empty())
        .map(|t| t.to_string())
        .collect();

    if let Some(first) = tokens.first() {
        let day = first.to_ascii_lowercase();
        if WEEKDAYS.iter().any(|&w| day.starts_with(w)) && !day.chars().next()?.is_ascii_digit() {
            tokens.remove(0);
        }
    }
    if tokens.len() < 4 {
        return None;
    }

    // two- and three-digit years, per RFC 5322 obsolete syntax
    if tokens[2].len() < 4 && tokens[2].bytes().all(|c| c.is_ascii_digit()) {
        if let Ok(y) = tokens[2].parse::<u32>() {
            let full = if y < 50 {
                y + 2000
            } else if y < 1000 {
                y + 1900
            } else {
                y
            };
            tokens[2] = full.to_string();
        }
    }

    let mut zoned = false;
    if let Some(last) = tokens.last().cloned() {
        if is_numeric_zone(&last) {
            let n = tokens.len();
            tokens[n - 1] = normalize_zone(&last);
            zoned = true;
        } else if let Some(offset) = named_zone(&last) {
            let n = tokens.len();
            tokens[n - 1] = offset.to_string();
            zoned = true;
        } else if last.chars().all(|c| c.is_ascii_alphabetic()) {
            // an unknown alphabetic zone; -0000 per RFC 5322
            let n = tokens.len();
            tokens[n - 1] = "+0000".to_string();
            zoned = true;
        }
    }
    let joined = tokens.join(" ");

    if zoned {
        for fmt in &ZONED_FORMATS {
            if let Ok(d) = DateTime::parse_from_str(&joined, fmt) {
                return Some(d);
            }
        }
    }
    for fmt in &BARE_FORMATS {
        if let Ok(d) = NaiveDateTime::parse_from_str(&joined, fmt) {
            let utc = FixedOffset::east_opt(0)?;
            if let chrono::LocalResult::Single(dt) = utc.from_local_datetime(&d) {
                return Some(dt);
            }
        }
    }
    None
}

/// The canonical RFC 2822 form, e.g. `Mon, 02 Jan 2006 15:04:05 -0700`.
pub fn format_date(d: &DateTime<FixedOffset>) -> String {
    d.format("%a, %d %b %Y %H:%M:%S %z").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn canon(s: &str) -> String {
        format_date(&parse_date(s).expect(s))
    }

    #[test]
    fn standard_layouts() {
        assert_eq!(
            canon("Mon, 02 Jan 2006 15:04:05 -0700"),
            "Mon, 02 Jan 2006 15:04:05 -0700"
        );
        assert_eq!(
            canon("2 Jan 2006 15:04:05 -0700"),
            "Mon, 02 Jan 2006 15:04:05 -0700"
        );
        assert_eq!(
            canon("Mon, 2 Jan 06 15:04 -0700"),
            "Mon, 02 Jan 2006 15:04:00 -0700"
        );
    }

    #[test]
    fn named_zones() {
        assert_eq!(
            canon("Sun, 25 Sep 2016 18:36:33 EDT"),
            "Sun, 25 Sep 2016 18:36:33 -0400"
        );
        assert_eq!(
            canon("Sun, 25 Sep 2016 18:36:33 GMT"),
            "Sun, 25 Sep 2016 18:36:33 +0000"
        );
        // unknown alphabetic zone means -0000
        assert_eq!(
            canon("Sun, 25 Sep 2016 18:36:33 XYZ"),
            "Sun, 25 Sep 2016 18:36:33 +0000"
        );
    }

    #[test]
    fn zone_with_comment() {
        assert_eq!(
            canon("Mon, 02 Jan 2006 15:04:05 -0700 (MST)"),
            "Mon, 02 Jan 2006 15:04:05 -0700"
        );
    }

    #[test]
    fn asctime_layout() {
        assert_eq!(
            canon("Jan 2 15:04:05 2006"),
            "Mon, 02 Jan 2006 15:04:05 +0000"
        );
    }

    #[test]
    fn garbage_is_rejected() {
        assert!(parse_date("").is_none());
        assert!(parse_date("not a date").is_none());
        assert!(parse_date("32 Jan 2006 15:04:05 -0700").is_none());
    }
}
