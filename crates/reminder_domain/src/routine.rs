use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveTime, TimeZone, Utc, Weekday};
use serde::{Deserialize, Serialize};

use crate::item::{ItemKind, NotificationRequest};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum IntervalUnit {
    Day,
    Week,
    Month,
    Year,
}

/// When a routine repeats.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum RepeatPattern {
    Daily,
    Weekdays,
    Weekends,
    Days(Vec<Weekday>),
    /// Every `amount` units counted from the routine's start date.
    Every { amount: u32, unit: IntervalUnit },
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RepeatPatternError {
    #[error("repeat pattern is empty")]
    Empty,
    #[error("unknown weekday `{0}` in repeat pattern")]
    UnknownWeekday(String),
    #[error("invalid interval `{0}`; expected +<n><d|w|m|y>")]
    InvalidInterval(String),
}

impl RepeatPattern {
    pub fn occurs_on(&self, date: NaiveDate, anchor: NaiveDate) -> bool {
        if date < anchor {
            return false;
        }
        match self {
            Self::Daily => true,
            Self::Weekdays => !matches!(date.weekday(), Weekday::Sat | Weekday::Sun),
            Self::Weekends => matches!(date.weekday(), Weekday::Sat | Weekday::Sun),
            Self::Days(days) => days.contains(&date.weekday()),
            Self::Every { amount, unit } => {
                let amount = i64::from((*amount).max(1));
                match unit {
                    IntervalUnit::Day => (date - anchor).num_days() % amount == 0,
                    IntervalUnit::Week => (date - anchor).num_days() % (7 * amount) == 0,
                    IntervalUnit::Month => {
                        let months = i64::from(date.year() - anchor.year()) * 12
                            + i64::from(date.month()) - i64::from(anchor.month());
                        date.day() == anchor.day() && months % amount == 0
                    }
                    IntervalUnit::Year => {
                        date.month() == anchor.month()
                            && date.day() == anchor.day()
                            && i64::from(date.year() - anchor.year()) % amount == 0
                    }
                }
            }
        }
    }
}

impl FromStr for RepeatPattern {
    type Err = RepeatPatternError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_ascii_lowercase();
        match normalized.as_str() {
            "" => Err(RepeatPatternError::Empty),
            "daily" => Ok(Self::Daily),
            "weekdays" => Ok(Self::Weekdays),
            "weekends" => Ok(Self::Weekends),
            token if token.starts_with('+') => parse_interval(token),
            list => {
                let mut days = Vec::new();
                for part in list.split(',').map(str::trim).filter(|p| !p.is_empty()) {
                    let day = part
                        .parse::<Weekday>()
                        .map_err(|_| RepeatPatternError::UnknownWeekday(part.to_string()))?;
                    if !days.contains(&day) {
                        days.push(day);
                    }
                }
                if days.is_empty() {
                    return Err(RepeatPatternError::Empty);
                }
                days.sort_by_key(|day| day.num_days_from_monday());
                Ok(Self::Days(days))
            }
        }
    }
}

impl fmt::Display for RepeatPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Daily => f.write_str("daily"),
            Self::Weekdays => f.write_str("weekdays"),
            Self::Weekends => f.write_str("weekends"),
            Self::Days(days) => {
                let names: Vec<String> = days
                    .iter()
                    .map(|day| day.to_string().to_ascii_lowercase())
                    .collect();
                f.write_str(&names.join(","))
            }
            Self::Every { amount, unit } => {
                let suffix = match unit {
                    IntervalUnit::Day => 'd',
                    IntervalUnit::Week => 'w',
                    IntervalUnit::Month => 'm',
                    IntervalUnit::Year => 'y',
                };
                write!(f, "+{amount}{suffix}")
            }
        }
    }
}

fn parse_interval(token: &str) -> Result<RepeatPattern, RepeatPatternError> {
    let invalid = || RepeatPatternError::InvalidInterval(token.to_string());
    let rest = token.trim_start_matches('+');
    let digits_len = rest.chars().take_while(|c| c.is_ascii_digit()).count();
    if digits_len == 0 {
        return Err(invalid());
    }
    let amount: u32 = rest[..digits_len].parse().map_err(|_| invalid())?;
    let unit = match &rest[digits_len..] {
        "d" => IntervalUnit::Day,
        "w" => IntervalUnit::Week,
        "m" => IntervalUnit::Month,
        "y" => IntervalUnit::Year,
        _ => return Err(invalid()),
    };
    Ok(RepeatPattern::Every {
        amount: amount.max(1),
        unit,
    })
}

/// A recurring habit the user wants to be reminded of.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Routine {
    pub id: String,
    pub title: String,
    pub note: String,
    pub time_of_day: NaiveTime,
    pub starts_on: NaiveDate,
    pub pattern: RepeatPattern,
}

impl Routine {
    /// Future fire times within `lookahead_days` days starting today in `tz`.
    pub fn occurrences<Tz: TimeZone>(
        &self,
        now: DateTime<Utc>,
        tz: &Tz,
        lookahead_days: u32,
    ) -> Vec<DateTime<Utc>> {
        let today = now.with_timezone(tz).date_naive();
        (0..i64::from(lookahead_days))
            .filter_map(|offset| today.checked_add_signed(Duration::days(offset)))
            .filter(|date| self.pattern.occurs_on(*date, self.starts_on))
            .filter_map(|date| {
                tz.from_local_datetime(&date.and_time(self.time_of_day))
                    .earliest()
                    .map(|local| local.with_timezone(&Utc))
            })
            .filter(|fire_at| *fire_at > now)
            .collect()
    }

    /// One recurring reminder request per upcoming occurrence.
    pub fn reminder_requests<Tz: TimeZone>(
        &self,
        now: DateTime<Utc>,
        tz: &Tz,
        lookahead_days: u32,
    ) -> Vec<NotificationRequest> {
        let body = if self.note.trim().is_empty() {
            format!("Time for {}", self.title)
        } else {
            self.note.trim().to_string()
        };
        let pattern = self.pattern.to_string();
        self.occurrences(now, tz, lookahead_days)
            .into_iter()
            .map(|fire_at| {
                NotificationRequest::new(
                    self.id.clone(),
                    ItemKind::Routine,
                    self.title.clone(),
                    body.clone(),
                    fire_at,
                )
                .recurring(Some(pattern.clone()))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::FixedOffset;

    fn routine(pattern: &str) -> Routine {
        Routine {
            id: "stretch".into(),
            title: "Stretch".into(),
            note: String::new(),
            time_of_day: NaiveTime::from_hms_opt(6, 30, 0).unwrap(),
            starts_on: NaiveDate::from_ymd_opt(2025, 11, 3).unwrap(),
            pattern: pattern.parse().unwrap(),
        }
    }

    #[test]
    fn parses_named_list_and_interval_patterns() {
        assert_eq!("Daily".parse::<RepeatPattern>().unwrap(), RepeatPattern::Daily);
        assert_eq!(
            "fri, mon,mon".parse::<RepeatPattern>().unwrap(),
            RepeatPattern::Days(vec![Weekday::Mon, Weekday::Fri])
        );
        assert_eq!(
            "+2w".parse::<RepeatPattern>().unwrap(),
            RepeatPattern::Every {
                amount: 2,
                unit: IntervalUnit::Week
            }
        );
        assert!(matches!(
            "+2x".parse::<RepeatPattern>(),
            Err(RepeatPatternError::InvalidInterval(_))
        ));
        assert!(matches!(
            "mon,funday".parse::<RepeatPattern>(),
            Err(RepeatPatternError::UnknownWeekday(_))
        ));
        assert_eq!(" ".parse::<RepeatPattern>(), Err(RepeatPatternError::Empty));
    }

    #[test]
    fn display_round_trips() {
        for raw in ["daily", "weekdays", "weekends", "mon,wed,fri", "+3d", "+1m"] {
            let pattern: RepeatPattern = raw.parse().unwrap();
            assert_eq!(pattern.to_string(), raw);
        }
    }

    #[test]
    fn daily_routine_yields_one_occurrence_per_future_day() {
        // Friday 2025-11-07 08:00 UTC; today's 06:30 already passed.
        let now = Utc.with_ymd_and_hms(2025, 11, 7, 8, 0, 0).unwrap();
        let fires = routine("daily").occurrences(now, &Utc, 7);
        assert_eq!(fires.len(), 6);
        assert_eq!(fires[0], Utc.with_ymd_and_hms(2025, 11, 8, 6, 30, 0).unwrap());
    }

    #[test]
    fn weekday_routine_skips_weekend_and_honours_timezone() {
        let tz = FixedOffset::east_opt(9 * 3600).unwrap();
        // Friday 2025-11-07 05:00 local (+09:00).
        let now = Utc.with_ymd_and_hms(2025, 11, 6, 20, 0, 0).unwrap();
        let fires = routine("weekdays").occurrences(now, &tz, 4);
        // Fri, (Sat, Sun skipped), Mon
        assert_eq!(fires.len(), 2);
        assert_eq!(fires[0], Utc.with_ymd_and_hms(2025, 11, 6, 21, 30, 0).unwrap());
        assert_eq!(fires[1], Utc.with_ymd_and_hms(2025, 11, 9, 21, 30, 0).unwrap());
    }

    #[test]
    fn interval_counts_from_start_date() {
        let anchor = NaiveDate::from_ymd_opt(2025, 11, 3).unwrap();
        let every_other = RepeatPattern::Every {
            amount: 2,
            unit: IntervalUnit::Day,
        };
        assert!(every_other.occurs_on(anchor, anchor));
        assert!(!every_other.occurs_on(anchor + Duration::days(1), anchor));
        assert!(every_other.occurs_on(anchor + Duration::days(4), anchor));
        assert!(!every_other.occurs_on(anchor - Duration::days(2), anchor));

        let monthly = RepeatPattern::Every {
            amount: 1,
            unit: IntervalUnit::Month,
        };
        assert!(monthly.occurs_on(NaiveDate::from_ymd_opt(2026, 1, 3).unwrap(), anchor));
        assert!(!monthly.occurs_on(NaiveDate::from_ymd_opt(2026, 1, 4).unwrap(), anchor));
    }

    #[test]
    fn reminder_requests_carry_pattern_metadata() {
        let now = Utc.with_ymd_and_hms(2025, 11, 7, 8, 0, 0).unwrap();
        let requests = routine("mon,wed,fri").reminder_requests(now, &Utc, 8);
        assert_eq!(requests.len(), 3);
        for request in &requests {
            assert_eq!(request.item_kind, ItemKind::Routine);
            assert!(request.is_recurring);
            assert_eq!(request.repeat_pattern.as_deref(), Some("mon,wed,fri"));
            assert_eq!(request.body, "Time for Stretch");
        }
    }
}
