// src/self_query/dates.rs
// Resolves natural-language relative date expressions (`"last month"`,
// `"q2 2023"`) found behind `RELATIVE:` markers in self-query filters.

use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc};
use regex::Regex;
use std::sync::OnceLock;

struct DatePattern {
    regex: Regex,
    resolve: fn(&regex::Captures, DateTime<Utc>) -> Option<DateTime<Utc>>,
}

fn patterns() -> &'static Vec<DatePattern> {
    static PATTERNS: OnceLock<Vec<DatePattern>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        vec![
            DatePattern {
                regex: Regex::new(r"last\s+(\d+)\s+days?").unwrap(),
                resolve: |caps, now| {
                    let n: i64 = caps.get(1)?.as_str().parse().ok()?;
                    Some(now - Duration::days(n))
                },
            },
            DatePattern {
                regex: Regex::new(r"last\s+(\d+)\s+weeks?").unwrap(),
                resolve: |caps, now| {
                    let n: i64 = caps.get(1)?.as_str().parse().ok()?;
                    Some(now - Duration::weeks(n))
                },
            },
            DatePattern {
                regex: Regex::new(r"last\s+(\d+)\s+months?").unwrap(),
                resolve: |caps, now| {
                    let n: i64 = caps.get(1)?.as_str().parse().ok()?;
                    Some(now - Duration::days(n * 30))
                },
            },
            DatePattern {
                regex: Regex::new(r"last\s+week").unwrap(),
                resolve: |_, now| Some(now - Duration::weeks(1)),
            },
            DatePattern {
                regex: Regex::new(r"last\s+month").unwrap(),
                resolve: |_, now| Some(now - Duration::days(30)),
            },
            DatePattern {
                regex: Regex::new(r"this\s+week").unwrap(),
                resolve: |_, now| Some(now - Duration::days(now.weekday().num_days_from_monday() as i64)),
            },
            DatePattern {
                regex: Regex::new(r"this\s+month").unwrap(),
                resolve: |_, now| start_of_month(now, now.year(), now.month()),
            },
            DatePattern {
                regex: Regex::new(r"yesterday").unwrap(),
                resolve: |_, now| Some(now - Duration::days(1)),
            },
            DatePattern {
                regex: Regex::new(r"today").unwrap(),
                resolve: |_, now| Some(midnight(now)),
            },
            DatePattern {
                regex: Regex::new(r"q1\s*(\d{4})?").unwrap(),
                resolve: |caps, now| quarter_start(1, caps, now),
            },
            DatePattern {
                regex: Regex::new(r"q2\s*(\d{4})?").unwrap(),
                resolve: |caps, now| quarter_start(2, caps, now),
            },
            DatePattern {
                regex: Regex::new(r"q3\s*(\d{4})?").unwrap(),
                resolve: |caps, now| quarter_start(3, caps, now),
            },
            DatePattern {
                regex: Regex::new(r"q4\s*(\d{4})?").unwrap(),
                resolve: |caps, now| quarter_start(4, caps, now),
            },
        ]
    })
}

fn midnight(now: DateTime<Utc>) -> DateTime<Utc> {
    now.date_naive().and_hms_opt(0, 0, 0).unwrap().and_utc()
}

fn start_of_month(now: DateTime<Utc>, year: i32, month: u32) -> Option<DateTime<Utc>> {
    let date = NaiveDate::from_ymd_opt(year, month, 1)?;
    Some(date.and_time(now.time()).and_utc())
}

fn quarter_start(quarter: u32, caps: &regex::Captures, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    let year = caps
        .get(1)
        .and_then(|m| m.as_str().parse::<i32>().ok())
        .unwrap_or_else(|| now.year());
    let month = (quarter - 1) * 3 + 1;
    let date = NaiveDate::from_ymd_opt(year, month, 1)?;
    Some(date.and_hms_opt(0, 0, 0)?.and_utc())
}

/// Resolve a relative date expression. Returns `None` if nothing matches,
/// in which case the caller should pass the original text through unchanged.
pub fn parse_date_expression(expr: &str) -> Option<DateTime<Utc>> {
    parse_date_expression_at(expr, Utc::now())
}

fn parse_date_expression_at(expr: &str, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    let lowered = expr.to_lowercase();
    for pattern in patterns() {
        if let Some(caps) = pattern.regex.captures(&lowered) {
            if let Some(resolved) = (pattern.resolve)(&caps, now) {
                return Some(resolved);
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixed_now() -> DateTime<Utc> {
        "2024-06-15T12:00:00Z".parse().unwrap()
    }

    #[test]
    fn last_n_days_subtracts_days() {
        let resolved = parse_date_expression_at("last 5 days", fixed_now()).unwrap();
        assert_eq!(resolved, fixed_now() - Duration::days(5));
    }

    #[test]
    fn last_month_is_thirty_days() {
        let resolved = parse_date_expression_at("last month", fixed_now()).unwrap();
        assert_eq!(resolved, fixed_now() - Duration::days(30));
    }

    #[test]
    fn today_truncates_to_midnight() {
        let resolved = parse_date_expression_at("today", fixed_now()).unwrap();
        assert_eq!(resolved.format("%H:%M:%S").to_string(), "00:00:00");
    }

    #[test]
    fn quarter_with_explicit_year() {
        let resolved = parse_date_expression_at("q3 2022", fixed_now()).unwrap();
        assert_eq!(resolved.format("%Y-%m-%d").to_string(), "2022-07-01");
    }

    #[test]
    fn quarter_without_year_uses_current_year() {
        let resolved = parse_date_expression_at("q1", fixed_now()).unwrap();
        assert_eq!(resolved.format("%Y-%m-%d").to_string(), "2024-01-01");
    }

    #[test]
    fn unmatched_expression_returns_none() {
        assert!(parse_date_expression_at("the day after tomorrow", fixed_now()).is_none());
    }
}
