use std::sync::OnceLock;

use anyhow::{
  Context,
  anyhow
};
use chrono::{
  DateTime,
  Datelike,
  Duration,
  Local,
  LocalResult,
  NaiveDate,
  NaiveDateTime,
  TimeZone,
  Utc,
  Weekday
};
use regex::Regex;

/// Parses a deadline typed by a user, interpreting wall-clock forms in
/// the local timezone.
pub fn parse_deadline(
  input: &str,
  now: DateTime<Utc>
) -> anyhow::Result<DateTime<Utc>> {
  parse_deadline_in(input, now, &Local)
}

/// Accepted forms: RFC 3339, `YYYY-MM-DD`, `YYYY-MM-DDTHH:MM`,
/// `YYYY-MM-DD HH:MM`, `now`, `today`, `tomorrow`, weekday names,
/// and offsets `+Nd`, `+Nh`, `+Nm`.
#[tracing::instrument(skip(now, tz), fields(input = input))]
pub fn parse_deadline_in<Tz: TimeZone>(
  input: &str,
  now: DateTime<Utc>,
  tz: &Tz
) -> anyhow::Result<DateTime<Utc>> {
  let token = input.trim();
  let lower = token.to_ascii_lowercase();

  match lower.as_str() {
    | "" => {
      return Err(anyhow!(
        "deadline cannot be empty"
      ));
    }
    | "now" => return Ok(now),
    | "today" => {
      return local_midnight(
        now.with_timezone(tz).date_naive(),
        tz
      );
    }
    | "tomorrow" => {
      let today =
        now.with_timezone(tz).date_naive();
      let next = today
        .succ_opt()
        .ok_or_else(|| {
          anyhow!("date out of range")
        })?;
      return local_midnight(next, tz);
    }
    | _ => {}
  }

  if let Some(offset) = parse_offset(&lower)? {
    return now.checked_add_signed(offset).ok_or_else(
      || anyhow!("deadline out of range")
    );
  }

  if let Ok(parsed) =
    DateTime::parse_from_rfc3339(token)
  {
    return Ok(parsed.with_timezone(&Utc));
  }

  for format in [
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M:%S"
  ] {
    if let Ok(naive) =
      NaiveDateTime::parse_from_str(
        token, format
      )
    {
      return to_utc(naive, tz, token);
    }
  }

  if let Ok(date) =
    NaiveDate::parse_from_str(token, "%Y-%m-%d")
  {
    return local_midnight(date, tz);
  }

  if let Some(weekday) =
    parse_weekday_name(&lower)
  {
    let today =
      now.with_timezone(tz).date_naive();
    return local_midnight(
      next_weekday_date(today, weekday),
      tz
    );
  }

  Err(anyhow!(
    "unrecognised deadline: {token}"
  ))
}

/// Renders a stored instant in local time for display.
#[must_use]
pub fn format_local(dt: DateTime<Utc>) -> String {
  dt.with_timezone(&Local)
    .format("%Y-%m-%d %H:%M")
    .to_string()
}

fn parse_offset(
  lower: &str
) -> anyhow::Result<Option<Duration>> {
  static OFFSET: OnceLock<Option<Regex>> =
    OnceLock::new();
  let re = OFFSET
    .get_or_init(|| {
      Regex::new(r"^\+(\d+)\s*([dhm])$").ok()
    })
    .as_ref()
    .ok_or_else(|| {
      anyhow!("internal regex compile failure")
    })?;

  let Some(caps) = re.captures(lower) else {
    return Ok(None);
  };
  let amount: i64 = caps[1]
    .parse()
    .context("offset amount out of range")?;
  let offset = match &caps[2] {
    | "d" => Duration::try_days(amount),
    | "h" => Duration::try_hours(amount),
    | _ => Duration::try_minutes(amount)
  };
  offset
    .map(Some)
    .ok_or_else(|| anyhow!("offset too large"))
}

fn local_midnight<Tz: TimeZone>(
  date: NaiveDate,
  tz: &Tz
) -> anyhow::Result<DateTime<Utc>> {
  let midnight = date
    .and_hms_opt(0, 0, 0)
    .ok_or_else(|| {
      anyhow!(
        "failed to construct midnight"
      )
    })?;
  to_utc(midnight, tz, "midnight")
}

fn to_utc<Tz: TimeZone>(
  local_naive: NaiveDateTime,
  tz: &Tz,
  context: &str
) -> anyhow::Result<DateTime<Utc>> {
  match tz.from_local_datetime(&local_naive) {
    | LocalResult::Single(local_dt) => {
      Ok(local_dt.with_timezone(&Utc))
    }
    | LocalResult::Ambiguous(first, second) => {
      tracing::warn!(
        context,
        "ambiguous local datetime; using earliest"
      );
      let first = first.with_timezone(&Utc);
      let second = second.with_timezone(&Utc);
      Ok(first.min(second))
    }
    | LocalResult::None => {
      Err(anyhow!(
        "local datetime does not exist: \
         {context}"
      ))
    }
  }
}

fn parse_weekday_name(
  lower: &str
) -> Option<Weekday> {
  match lower {
    | "mon" | "monday" => Some(Weekday::Mon),
    | "tue" | "tuesday" => Some(Weekday::Tue),
    | "wed" | "wednesday" => {
      Some(Weekday::Wed)
    }
    | "thu" | "thursday" => {
      Some(Weekday::Thu)
    }
    | "fri" | "friday" => Some(Weekday::Fri),
    | "sat" | "saturday" => {
      Some(Weekday::Sat)
    }
    | "sun" | "sunday" => Some(Weekday::Sun),
    | _ => None
  }
}

/// Next occurrence strictly after `today`.
fn next_weekday_date(
  today: NaiveDate,
  target: Weekday
) -> NaiveDate {
  let current =
    today.weekday().num_days_from_monday();
  let wanted = target.num_days_from_monday();
  let mut delta = (7 + wanted - current) % 7;
  if delta == 0 {
    delta = 7;
  }
  today + Duration::days(i64::from(delta))
}

#[cfg(test)]
mod tests {
  use chrono::TimeZone;

  use super::*;

  fn now() -> DateTime<Utc> {
    Utc
      .with_ymd_and_hms(2026, 2, 17, 12, 0, 0)
      .unwrap()
  }

  fn parse(input: &str) -> DateTime<Utc> {
    parse_deadline_in(input, now(), &Utc)
      .unwrap()
  }

  #[test]
  fn parses_calendar_forms() {
    assert_eq!(
      parse("2026-03-01"),
      Utc
        .with_ymd_and_hms(2026, 3, 1, 0, 0, 0)
        .unwrap()
    );
    assert_eq!(
      parse("2026-03-01T17:30"),
      Utc
        .with_ymd_and_hms(2026, 3, 1, 17, 30, 0)
        .unwrap()
    );
    assert_eq!(
      parse("2026-03-01 17:30"),
      parse("2026-03-01T17:30")
    );
    assert_eq!(
      parse("2026-03-01T17:30:00+02:00"),
      Utc
        .with_ymd_and_hms(2026, 3, 1, 15, 30, 0)
        .unwrap()
    );
  }

  #[test]
  fn parses_relative_forms() {
    assert_eq!(parse("now"), now());
    assert_eq!(
      parse("+10m"),
      now() + Duration::minutes(10)
    );
    assert_eq!(
      parse("+2d"),
      now() + Duration::days(2)
    );
    assert_eq!(
      parse("tomorrow"),
      Utc
        .with_ymd_and_hms(2026, 2, 18, 0, 0, 0)
        .unwrap()
    );
    // 2026-02-17 is a Tuesday
    assert_eq!(
      parse("tuesday"),
      Utc
        .with_ymd_and_hms(2026, 2, 24, 0, 0, 0)
        .unwrap()
    );
  }

  #[test]
  fn rejects_garbage() {
    assert!(
      parse_deadline_in("soonish", now(), &Utc)
        .is_err()
    );
    assert!(
      parse_deadline_in("  ", now(), &Utc)
        .is_err()
    );
  }

  #[test]
  fn offset_past_calendar_range_is_an_error() {
    let err = parse_deadline_in(
      "+99999999d",
      now(),
      &Utc
    )
    .unwrap_err();
    assert!(
      err.to_string().contains("out of range")
    );
  }
}
