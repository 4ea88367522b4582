use anyhow::{
  Context,
  anyhow
};
use chrono::{
  Datelike,
  Days,
  Local,
  NaiveDate,
  Weekday
};
use regex::Regex;

pub const DUE_DATE_FORMAT: &str =
  "%Y-%m-%d";

#[must_use]
pub fn today_local() -> NaiveDate {
  Local::now().date_naive()
}

#[must_use]
pub fn format_due_date(
  date: NaiveDate
) -> String {
  date
    .format(DUE_DATE_FORMAT)
    .to_string()
}

/// Parses a due date as typed on the
/// command line.
///
/// Accepts `YYYY-MM-DD`, `today`,
/// `tomorrow`, `yesterday`, a weekday
/// name (the next such day after
/// `today`), or a relative offset such
/// as `+3d` or `-1w`.
#[tracing::instrument(skip(today))]
pub fn parse_due_date(
  expr: &str,
  today: NaiveDate
) -> anyhow::Result<NaiveDate> {
  let token =
    expr.trim().to_ascii_lowercase();
  if token.is_empty() {
    return Err(anyhow!(
      "due date cannot be empty"
    ));
  }

  match token.as_str() {
    | "today" => return Ok(today),
    | "tomorrow" => {
      return today
        .checked_add_days(Days::new(1))
        .ok_or_else(|| {
          anyhow!("date out of range")
        });
    }
    | "yesterday" => {
      return today
        .checked_sub_days(Days::new(1))
        .ok_or_else(|| {
          anyhow!("date out of range")
        });
    }
    | _ => {}
  }

  if let Some(weekday) =
    parse_weekday(&token)
  {
    let current =
      today.weekday().num_days_from_monday();
    let target =
      weekday.num_days_from_monday();
    let mut delta =
      (7 + target - current) % 7;
    if delta == 0 {
      delta = 7;
    }
    return today
      .checked_add_days(Days::new(
        u64::from(delta)
      ))
      .ok_or_else(|| {
        anyhow!("date out of range")
      });
  }

  let rel_re = Regex::new(
    r"^(?P<sign>[+-])(?P<num>\d+)(?P<unit>[dw])$"
  )
  .map_err(|e| {
    anyhow!(
      "internal regex compile \
       failure: {e}"
    )
  })?;

  if let Some(caps) =
    rel_re.captures(&token)
  {
    let num: u64 = caps["num"]
      .parse()
      .context(
        "invalid relative number"
      )?;
    let days = match &caps["unit"] {
      | "w" => num
        .checked_mul(7)
        .ok_or_else(|| {
          anyhow!("date out of range")
        })?,
      | _ => num
    };
    let shifted = if &caps["sign"] == "-"
    {
      today
        .checked_sub_days(Days::new(days))
    } else {
      today
        .checked_add_days(Days::new(days))
    };
    return shifted.ok_or_else(|| {
      anyhow!("date out of range")
    });
  }

  NaiveDate::parse_from_str(
    &token,
    DUE_DATE_FORMAT
  )
  .with_context(|| {
    format!(
      "unrecognised due date: {expr}"
    )
  })
}

fn parse_weekday(
  token: &str
) -> Option<Weekday> {
  match token {
    | "mon" | "monday" => {
      Some(Weekday::Mon)
    }
    | "tue" | "tuesday" => {
      Some(Weekday::Tue)
    }
    | "wed" | "wednesday" => {
      Some(Weekday::Wed)
    }
    | "thu" | "thursday" => {
      Some(Weekday::Thu)
    }
    | "fri" | "friday" => {
      Some(Weekday::Fri)
    }
    | "sat" | "saturday" => {
      Some(Weekday::Sat)
    }
    | "sun" | "sunday" => {
      Some(Weekday::Sun)
    }
    | _ => None
  }
}

/// Serde adapter for optional due dates.
/// Blank strings read as absent.
pub mod due_date_serde {
  use chrono::NaiveDate;
  use serde::{
    Deserialize,
    Deserializer,
    Serializer
  };

  use super::DUE_DATE_FORMAT;

  pub fn serialize<S>(
    date: &Option<NaiveDate>,
    serializer: S
  ) -> Result<S::Ok, S::Error>
  where
    S: Serializer
  {
    match date {
      | Some(value) => {
        serializer.serialize_str(
          &value
            .format(DUE_DATE_FORMAT)
            .to_string()
        )
      }
      | None => {
        serializer.serialize_none()
      }
    }
  }

  pub fn deserialize<'de, D>(
    deserializer: D
  ) -> Result<Option<NaiveDate>, D::Error>
  where
    D: Deserializer<'de>
  {
    let raw = Option::<String>::deserialize(
      deserializer
    )?;
    match raw.as_deref().map(str::trim) {
      | None | Some("") => Ok(None),
      | Some(text) => {
        NaiveDate::parse_from_str(
          text,
          DUE_DATE_FORMAT
        )
        .map(Some)
        .map_err(serde::de::Error::custom)
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use chrono::NaiveDate;

  use super::parse_due_date;

  fn day(
    y: i32,
    m: u32,
    d: u32
  ) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d)
      .expect("valid date")
  }

  #[test]
  fn parses_iso_date() {
    let parsed = parse_due_date(
      "2024-03-01",
      day(2024, 1, 1)
    )
    .expect("parse iso");
    assert_eq!(parsed, day(2024, 3, 1));
  }

  #[test]
  fn parses_named_days() {
    let today = day(2026, 2, 17);
    assert_eq!(
      parse_due_date("today", today)
        .expect("today"),
      today
    );
    assert_eq!(
      parse_due_date("Tomorrow", today)
        .expect("tomorrow"),
      day(2026, 2, 18)
    );
  }

  #[test]
  fn weekday_is_strictly_after_today() {
    // 2026-02-17 is a Tuesday.
    let today = day(2026, 2, 17);
    assert_eq!(
      parse_due_date("wednesday", today)
        .expect("weekday"),
      day(2026, 2, 18)
    );
    assert_eq!(
      parse_due_date("tue", today)
        .expect("same weekday"),
      day(2026, 2, 24)
    );
  }

  #[test]
  fn parses_relative_offsets() {
    let today = day(2026, 2, 17);
    assert_eq!(
      parse_due_date("+3d", today)
        .expect("+3d"),
      day(2026, 2, 20)
    );
    assert_eq!(
      parse_due_date("-1w", today)
        .expect("-1w"),
      day(2026, 2, 10)
    );
  }

  #[test]
  fn huge_offsets_are_out_of_range() {
    let today = day(2026, 2, 17);
    for expr in [
      "+3000000000000000000w",
      "-3000000000000000000w",
      "+99999999999d"
    ] {
      let err = parse_due_date(expr, today)
        .expect_err(expr);
      assert!(
        err
          .to_string()
          .contains("out of range"),
        "{expr}: {err}"
      );
    }
  }

  #[test]
  fn rejects_garbage() {
    assert!(
      parse_due_date(
        "someday",
        day(2026, 2, 17)
      )
      .is_err()
    );
    assert!(
      parse_due_date(
        "  ",
        day(2026, 2, 17)
      )
      .is_err()
    );
  }
}
