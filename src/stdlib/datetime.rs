//! Date and time builtins
//!
//! The four temporal variants stay disjoint: arithmetic is defined only
//! through these functions, never through operators. Patterns are strftime
//! specifiers; `formatDate` accepts an optional BCP-47 locale tag;
//! `convertTimezone` resolves IANA zone names.

use super::{fail, fndef, Args, FnCtx, Registry};
use crate::error::EngineResult;
use crate::udm::{Udm, UdmKind};
use chrono::{
    DateTime, Datelike, Duration, Locale, Months, NaiveDate, NaiveDateTime, NaiveTime, TimeZone,
    Utc,
};
use chrono_tz::Tz;

pub(crate) fn register(registry: &mut Registry) {
    fndef!(registry, "now", 0..=0, [], now);
    fndef!(registry, "parseDate", 1..=2, ["string", "pattern"], parse_date);
    fndef!(registry, "formatDate", 2..=3, ["date", "pattern", "locale"], format_date);
    fndef!(registry, "addDays", 2..=2, ["date", "days"], add_days);
    fndef!(registry, "addMonths", 2..=2, ["date", "months"], add_months);
    fndef!(registry, "addYears", 2..=2, ["date", "years"], add_years);
    fndef!(registry, "addHours", 2..=2, ["date-time", "hours"], add_hours);
    fndef!(registry, "addMinutes", 2..=2, ["date-time", "minutes"], add_minutes);
    fndef!(registry, "addSeconds", 2..=2, ["date-time", "seconds"], add_seconds);
    fndef!(registry, "diffDays", 2..=2, ["date", "date"], diff_days);
    fndef!(registry, "diffMonths", 2..=2, ["date", "date"], diff_months);
    fndef!(registry, "diffYears", 2..=2, ["date", "date"], diff_years);
    fndef!(registry, "diffHours", 2..=2, ["date-time", "date-time"], diff_hours);
    fndef!(registry, "diffMinutes", 2..=2, ["date-time", "date-time"], diff_minutes);
    fndef!(registry, "diffSeconds", 2..=2, ["date-time", "date-time"], diff_seconds);
    fndef!(registry, "convertTimezone", 2..=2, ["date-time", "zone"], convert_timezone);
    fndef!(registry, "startOfDay", 1..=1, ["date-time"], start_of_day);
    fndef!(registry, "endOfDay", 1..=1, ["date-time"], end_of_day);
    fndef!(registry, "startOfMonth", 1..=1, ["date-time"], start_of_month);
    fndef!(registry, "endOfMonth", 1..=1, ["date-time"], end_of_month);
    fndef!(registry, "startOfYear", 1..=1, ["date-time"], start_of_year);
    fndef!(registry, "endOfYear", 1..=1, ["date-time"], end_of_year);
    fndef!(registry, "isBefore", 2..=2, ["date-time", "date-time"], is_before);
    fndef!(registry, "isAfter", 2..=2, ["date-time", "date-time"], is_after);
    fndef!(registry, "isSameDay", 2..=2, ["date-time", "date-time"], is_same_day);
    fndef!(registry, "age", 1..=2, ["birth date", "as-of date"], age);
}

/// A temporal value in one of the four disjoint shapes
#[derive(Debug, Clone, Copy)]
enum Temporal {
    Date(NaiveDate),
    Time(NaiveTime),
    Local(NaiveDateTime),
    Zoned(DateTime<Utc>),
}

impl Temporal {
    fn into_udm(self) -> Udm {
        match self {
            Temporal::Date(d) => Udm::date(d),
            Temporal::Time(t) => Udm::time(t),
            Temporal::Local(dt) => Udm::local_date_time(dt),
            Temporal::Zoned(dt) => Udm::date_time(dt),
        }
    }

    /// A common axis for differences and comparisons
    fn as_naive(self) -> NaiveDateTime {
        match self {
            Temporal::Date(d) => d.and_hms_opt(0, 0, 0).expect("midnight"),
            Temporal::Time(t) => NaiveDate::from_ymd_opt(1970, 1, 1)
                .expect("epoch")
                .and_time(t),
            Temporal::Local(dt) => dt,
            Temporal::Zoned(dt) => dt.naive_utc(),
        }
    }

    fn date(self) -> NaiveDate {
        self.as_naive().date()
    }
}

/// Coerces a value to a temporal, parsing strings by the default rules
fn temporal(function: &'static str, value: &Udm) -> EngineResult<Temporal> {
    match &value.kind {
        UdmKind::Date(d) => Ok(Temporal::Date(*d)),
        UdmKind::Time(t) => Ok(Temporal::Time(*t)),
        UdmKind::LocalDateTime(dt) => Ok(Temporal::Local(*dt)),
        UdmKind::DateTime(dt) => Ok(Temporal::Zoned(*dt)),
        UdmKind::Str(s) => parse_default(s).ok_or_else(|| {
            fail(
                function,
                "a date, time or date-time",
                format!("unparseable string {:?}", s),
                "use parseDate with an explicit pattern",
            )
        }),
        _ => Err(fail(
            function,
            "a date, time or date-time",
            value.type_name(),
            "",
        )),
    }
}

fn parse_default(s: &str) -> Option<Temporal> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(Temporal::Zoned(dt.with_timezone(&Utc)));
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f") {
        return Some(Temporal::Local(dt));
    }
    if let Ok(d) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return Some(Temporal::Date(d));
    }
    if let Ok(t) = NaiveTime::parse_from_str(s, "%H:%M:%S%.f") {
        return Some(Temporal::Time(t));
    }
    None
}

/// The host clock. The single deliberately impure builtin.
fn now(_: &mut dyn FnCtx, _: Vec<Udm>) -> EngineResult<Udm> {
    Ok(Udm::date_time(Utc::now()))
}

fn parse_date(_: &mut dyn FnCtx, args: Vec<Udm>) -> EngineResult<Udm> {
    let mut args = Args::new("parseDate", args);
    let s = args.next_str()?;
    match args.opt_next() {
        None => parse_default(&s).map(Temporal::into_udm).ok_or_else(|| {
            fail(
                "parseDate",
                "an ISO-8601 date, time or date-time",
                format!("{:?}", s),
                "pass a pattern as the second argument for other layouts",
            )
        }),
        Some(pattern) => {
            let pattern = pattern.as_str().map(str::to_string).ok_or_else(|| {
                fail("parseDate", "a pattern string", pattern.type_name(), "")
            })?;
            if let Ok(dt) = DateTime::parse_from_str(&s, &pattern) {
                return Ok(Udm::date_time(dt.with_timezone(&Utc)));
            }
            if let Ok(dt) = NaiveDateTime::parse_from_str(&s, &pattern) {
                return Ok(Udm::local_date_time(dt));
            }
            if let Ok(d) = NaiveDate::parse_from_str(&s, &pattern) {
                return Ok(Udm::date(d));
            }
            if let Ok(t) = NaiveTime::parse_from_str(&s, &pattern) {
                return Ok(Udm::time(t));
            }
            Err(fail(
                "parseDate",
                format!("a value matching pattern {:?}", pattern),
                format!("{:?}", s),
                "pattern uses strftime specifiers, e.g. %d/%m/%Y",
            ))
        }
    }
}

/// BCP-47 tags map onto chrono's CLDR-derived locale data
fn resolve_locale(tag: &str) -> EngineResult<Locale> {
    let normalised = tag.replace('-', "_");
    Locale::try_from(normalised.as_str()).map_err(|_| {
        fail(
            "formatDate",
            "a known BCP-47 locale tag",
            tag.to_string(),
            "e.g. en-US, de-DE, fr-FR",
        )
    })
}

fn format_date(_: &mut dyn FnCtx, args: Vec<Udm>) -> EngineResult<Udm> {
    let mut args = Args::new("formatDate", args);
    let value = args.next()?;
    let t = temporal("formatDate", &value)?;
    let pattern = args.next_str()?;
    let locale = match args.opt_next() {
        Some(tag) => Some(resolve_locale(tag.as_str().unwrap_or_default())?),
        None => None,
    };
    let rendered = match (t, locale) {
        (Temporal::Date(d), None) => d.format(&pattern).to_string(),
        (Temporal::Date(d), Some(l)) => d.format_localized(&pattern, l).to_string(),
        (Temporal::Time(t), None) => t.format(&pattern).to_string(),
        (Temporal::Time(t), Some(l)) => {
            let dt = NaiveDate::from_ymd_opt(1970, 1, 1).expect("epoch").and_time(t);
            dt.and_utc().format_localized(&pattern, l).to_string()
        }
        (Temporal::Local(dt), None) => dt.format(&pattern).to_string(),
        (Temporal::Local(dt), Some(l)) => dt.and_utc().format_localized(&pattern, l).to_string(),
        (Temporal::Zoned(dt), None) => dt.format(&pattern).to_string(),
        (Temporal::Zoned(dt), Some(l)) => dt.format_localized(&pattern, l).to_string(),
    };
    Ok(Udm::string(rendered))
}

fn shift(
    function: &'static str,
    args: Vec<Udm>,
    by: impl Fn(Temporal, i64) -> Option<Temporal>,
) -> EngineResult<Udm> {
    let mut args = Args::new(function, args);
    let value = args.next()?;
    let t = temporal(function, &value)?;
    let n = args.next_int()?;
    by(t, n)
        .map(Temporal::into_udm)
        .ok_or_else(|| fail(function, "a representable result", "overflow", ""))
}

fn add_days(_: &mut dyn FnCtx, args: Vec<Udm>) -> EngineResult<Udm> {
    shift("addDays", args, |t, n| {
        let d = Duration::try_days(n)?;
        Some(match t {
            Temporal::Date(v) => Temporal::Date(v.checked_add_signed(d)?),
            Temporal::Local(v) => Temporal::Local(v.checked_add_signed(d)?),
            Temporal::Zoned(v) => Temporal::Zoned(v.checked_add_signed(d)?),
            Temporal::Time(_) => return None,
        })
    })
}

fn add_months_impl(t: Temporal, n: i64) -> Option<Temporal> {
    let forward = n >= 0;
    let months = Months::new(n.unsigned_abs() as u32);
    Some(match t {
        Temporal::Date(v) => Temporal::Date(if forward {
            v.checked_add_months(months)?
        } else {
            v.checked_sub_months(months)?
        }),
        Temporal::Local(v) => Temporal::Local(if forward {
            v.checked_add_months(months)?
        } else {
            v.checked_sub_months(months)?
        }),
        Temporal::Zoned(v) => Temporal::Zoned(if forward {
            v.checked_add_months(months)?
        } else {
            v.checked_sub_months(months)?
        }),
        Temporal::Time(_) => return None,
    })
}

fn add_months(_: &mut dyn FnCtx, args: Vec<Udm>) -> EngineResult<Udm> {
    shift("addMonths", args, add_months_impl)
}

fn add_years(_: &mut dyn FnCtx, args: Vec<Udm>) -> EngineResult<Udm> {
    shift("addYears", args, |t, n| add_months_impl(t, n.checked_mul(12)?))
}

fn shift_time(
    function: &'static str,
    args: Vec<Udm>,
    unit: impl Fn(i64) -> Option<Duration>,
) -> EngineResult<Udm> {
    shift(function, args, |t, n| {
        let d = unit(n)?;
        Some(match t {
            Temporal::Time(v) => Temporal::Time(v.overflowing_add_signed(d).0),
            Temporal::Local(v) => Temporal::Local(v.checked_add_signed(d)?),
            Temporal::Zoned(v) => Temporal::Zoned(v.checked_add_signed(d)?),
            Temporal::Date(_) => return None,
        })
    })
}

fn add_hours(_: &mut dyn FnCtx, args: Vec<Udm>) -> EngineResult<Udm> {
    shift_time("addHours", args, Duration::try_hours)
}

fn add_minutes(_: &mut dyn FnCtx, args: Vec<Udm>) -> EngineResult<Udm> {
    shift_time("addMinutes", args, Duration::try_minutes)
}

fn add_seconds(_: &mut dyn FnCtx, args: Vec<Udm>) -> EngineResult<Udm> {
    shift_time("addSeconds", args, Duration::try_seconds)
}

fn pair(function: &'static str, args: Vec<Udm>) -> EngineResult<(Temporal, Temporal)> {
    let mut args = Args::new(function, args);
    let a = args.next()?;
    let b = args.next()?;
    Ok((temporal(function, &a)?, temporal(function, &b)?))
}

fn diff_days(_: &mut dyn FnCtx, args: Vec<Udm>) -> EngineResult<Udm> {
    let (a, b) = pair("diffDays", args)?;
    Ok(Udm::int((a.as_naive() - b.as_naive()).num_days()))
}

/// Whole calendar months between the two dates
fn diff_months(_: &mut dyn FnCtx, args: Vec<Udm>) -> EngineResult<Udm> {
    let (a, b) = pair("diffMonths", args)?;
    let (a, b) = (a.date(), b.date());
    let mut months =
        (a.year() as i64 - b.year() as i64) * 12 + (a.month() as i64 - b.month() as i64);
    if months > 0 && a.day() < b.day() {
        months -= 1;
    } else if months < 0 && a.day() > b.day() {
        months += 1;
    }
    Ok(Udm::int(months))
}

fn diff_years(_: &mut dyn FnCtx, args: Vec<Udm>) -> EngineResult<Udm> {
    let (a, b) = pair("diffYears", args)?;
    let (a, b) = (a.date(), b.date());
    let mut years = a.year() as i64 - b.year() as i64;
    if years > 0 && (a.month(), a.day()) < (b.month(), b.day()) {
        years -= 1;
    } else if years < 0 && (a.month(), a.day()) > (b.month(), b.day()) {
        years += 1;
    }
    Ok(Udm::int(years))
}

fn diff_hours(_: &mut dyn FnCtx, args: Vec<Udm>) -> EngineResult<Udm> {
    let (a, b) = pair("diffHours", args)?;
    Ok(Udm::int((a.as_naive() - b.as_naive()).num_hours()))
}

fn diff_minutes(_: &mut dyn FnCtx, args: Vec<Udm>) -> EngineResult<Udm> {
    let (a, b) = pair("diffMinutes", args)?;
    Ok(Udm::int((a.as_naive() - b.as_naive()).num_minutes()))
}

fn diff_seconds(_: &mut dyn FnCtx, args: Vec<Udm>) -> EngineResult<Udm> {
    let (a, b) = pair("diffSeconds", args)?;
    Ok(Udm::int((a.as_naive() - b.as_naive()).num_seconds()))
}

/// Renders an absolute instant as the wall-clock time of an IANA zone.
/// A zoneless input is taken to be UTC.
fn convert_timezone(_: &mut dyn FnCtx, args: Vec<Udm>) -> EngineResult<Udm> {
    let mut args = Args::new("convertTimezone", args);
    let value = args.next()?;
    let t = temporal("convertTimezone", &value)?;
    let zone = args.next_str()?;
    let tz: Tz = zone.parse().map_err(|_| {
        fail(
            "convertTimezone",
            "an IANA time zone name",
            zone.clone(),
            "e.g. America/New_York, Europe/Paris",
        )
    })?;
    let instant = match t {
        Temporal::Zoned(dt) => dt,
        Temporal::Local(dt) => Utc.from_utc_datetime(&dt),
        _ => {
            return Err(fail(
                "convertTimezone",
                "a date-time",
                value.type_name(),
                "dates and times without a time component cannot be zone-shifted",
            ));
        }
    };
    Ok(Udm::local_date_time(instant.with_timezone(&tz).naive_local()))
}

fn truncate(
    function: &'static str,
    args: Vec<Udm>,
    by: impl Fn(NaiveDateTime) -> Option<NaiveDateTime>,
) -> EngineResult<Udm> {
    let mut args = Args::new(function, args);
    let value = args.next()?;
    let result = match temporal(function, &value)? {
        Temporal::Date(d) => by(d.and_hms_opt(0, 0, 0).expect("midnight"))
            .map(Temporal::Local),
        Temporal::Local(dt) => by(dt).map(Temporal::Local),
        Temporal::Zoned(dt) => by(dt.naive_utc())
            .map(|n| Temporal::Zoned(Utc.from_utc_datetime(&n))),
        Temporal::Time(_) => None,
    };
    result.map(Temporal::into_udm).ok_or_else(|| {
        fail(function, "a date or date-time", value.type_name(), "")
    })
}

fn start_of_day(_: &mut dyn FnCtx, args: Vec<Udm>) -> EngineResult<Udm> {
    truncate("startOfDay", args, |dt| dt.date().and_hms_opt(0, 0, 0))
}

fn end_of_day(_: &mut dyn FnCtx, args: Vec<Udm>) -> EngineResult<Udm> {
    truncate("endOfDay", args, |dt| dt.date().and_hms_opt(23, 59, 59))
}

fn start_of_month(_: &mut dyn FnCtx, args: Vec<Udm>) -> EngineResult<Udm> {
    truncate("startOfMonth", args, |dt| {
        NaiveDate::from_ymd_opt(dt.year(), dt.month(), 1)?.and_hms_opt(0, 0, 0)
    })
}

fn end_of_month(_: &mut dyn FnCtx, args: Vec<Udm>) -> EngineResult<Udm> {
    truncate("endOfMonth", args, |dt| {
        let first = NaiveDate::from_ymd_opt(dt.year(), dt.month(), 1)?;
        let last = first.checked_add_months(Months::new(1))?.pred_opt()?;
        last.and_hms_opt(23, 59, 59)
    })
}

fn start_of_year(_: &mut dyn FnCtx, args: Vec<Udm>) -> EngineResult<Udm> {
    truncate("startOfYear", args, |dt| {
        NaiveDate::from_ymd_opt(dt.year(), 1, 1)?.and_hms_opt(0, 0, 0)
    })
}

fn end_of_year(_: &mut dyn FnCtx, args: Vec<Udm>) -> EngineResult<Udm> {
    truncate("endOfYear", args, |dt| {
        NaiveDate::from_ymd_opt(dt.year(), 12, 31)?.and_hms_opt(23, 59, 59)
    })
}

fn is_before(_: &mut dyn FnCtx, args: Vec<Udm>) -> EngineResult<Udm> {
    let (a, b) = pair("isBefore", args)?;
    Ok(Udm::bool(a.as_naive() < b.as_naive()))
}

fn is_after(_: &mut dyn FnCtx, args: Vec<Udm>) -> EngineResult<Udm> {
    let (a, b) = pair("isAfter", args)?;
    Ok(Udm::bool(a.as_naive() > b.as_naive()))
}

fn is_same_day(_: &mut dyn FnCtx, args: Vec<Udm>) -> EngineResult<Udm> {
    let (a, b) = pair("isSameDay", args)?;
    Ok(Udm::bool(a.date() == b.date()))
}

/// Whole years lived from the birth date until the as-of date (today by
/// default)
fn age(_: &mut dyn FnCtx, args: Vec<Udm>) -> EngineResult<Udm> {
    let mut args = Args::new("age", args);
    let birth_value = args.next()?;
    let birth = temporal("age", &birth_value)?.date();
    let as_of = match args.opt_next() {
        Some(value) => temporal("age", &value)?.date(),
        None => Utc::now().date_naive(),
    };
    let mut years = as_of.year() as i64 - birth.year() as i64;
    if (as_of.month(), as_of.day()) < (birth.month(), birth.day()) {
        years -= 1;
    }
    Ok(Udm::int(years))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stdlib::FnCtx;
    use crate::udm::LambdaValue;
    use chrono::Timelike;

    struct NoCtx;
    impl FnCtx for NoCtx {
        fn apply(&mut self, _: &LambdaValue, _: Vec<Udm>) -> EngineResult<Udm> {
            unreachable!("datetime builtins take no lambdas")
        }
    }

    fn date(y: i32, m: u32, d: u32) -> Udm {
        Udm::date(NaiveDate::from_ymd_opt(y, m, d).unwrap())
    }

    #[test]
    fn parse_date_default_rules() {
        let parsed = parse_date(&mut NoCtx, vec![Udm::string("2026-03-14")]).unwrap();
        assert_eq!(parsed, date(2026, 3, 14));
        let parsed =
            parse_date(&mut NoCtx, vec![Udm::string("2026-03-14T10:30:00Z")]).unwrap();
        assert!(matches!(parsed.kind, UdmKind::DateTime(_)));
        let parsed = parse_date(&mut NoCtx, vec![Udm::string("10:30:00")]).unwrap();
        assert!(matches!(parsed.kind, UdmKind::Time(_)));
    }

    #[test]
    fn parse_date_with_pattern() {
        let parsed = parse_date(
            &mut NoCtx,
            vec![Udm::string("14/03/2026"), Udm::string("%d/%m/%Y")],
        )
        .unwrap();
        assert_eq!(parsed, date(2026, 3, 14));
    }

    #[test]
    fn format_date_renders_patterns() {
        let out = format_date(
            &mut NoCtx,
            vec![date(2026, 3, 14), Udm::string("%Y/%m/%d")],
        )
        .unwrap();
        assert_eq!(out, Udm::string("2026/03/14"));
    }

    #[test]
    fn add_and_diff_days() {
        let shifted = add_days(&mut NoCtx, vec![date(2026, 2, 27), Udm::int(2)]).unwrap();
        assert_eq!(shifted, date(2026, 3, 1));
        let diff = diff_days(&mut NoCtx, vec![date(2026, 3, 1), date(2026, 2, 27)]).unwrap();
        assert_eq!(diff, Udm::int(2));
    }

    #[test]
    fn add_months_clamps_at_month_end() {
        let shifted = add_months(&mut NoCtx, vec![date(2026, 1, 31), Udm::int(1)]).unwrap();
        assert_eq!(shifted, date(2026, 2, 28));
    }

    #[test]
    fn convert_timezone_shifts_wall_clock() {
        let instant = Udm::date_time(
            Utc.with_ymd_and_hms(2026, 1, 1, 12, 0, 0).unwrap(),
        );
        let local = convert_timezone(
            &mut NoCtx,
            vec![instant, Udm::string("America/New_York")],
        )
        .unwrap();
        match local.kind {
            UdmKind::LocalDateTime(dt) => assert_eq!(dt.hour(), 7),
            other => panic!("expected local date-time, got {:?}", other),
        }
    }

    #[test]
    fn unknown_zone_is_rejected() {
        let instant = Udm::date_time(Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap());
        assert!(
            convert_timezone(&mut NoCtx, vec![instant, Udm::string("Mars/Olympus")]).is_err()
        );
    }

    #[test]
    fn age_counts_whole_years() {
        let years = age(&mut NoCtx, vec![date(2000, 6, 15), date(2026, 6, 14)]).unwrap();
        assert_eq!(years, Udm::int(25));
        let years = age(&mut NoCtx, vec![date(2000, 6, 15), date(2026, 6, 15)]).unwrap();
        assert_eq!(years, Udm::int(26));
    }

    #[test]
    fn month_boundaries() {
        let end = end_of_month(&mut NoCtx, vec![date(2026, 2, 10)]).unwrap();
        match end.kind {
            UdmKind::LocalDateTime(dt) => {
                assert_eq!(dt.date(), NaiveDate::from_ymd_opt(2026, 2, 28).unwrap());
                assert_eq!(dt.hour(), 23);
            }
            other => panic!("unexpected {:?}", other),
        }
    }
}
