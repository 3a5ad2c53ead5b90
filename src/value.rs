use super::codec::{BufExt, BufMutExt};
use super::error::{DriverError, DriverResult};
use super::protocol::ColumnType;
use bytes::{Buf, BufMut};
use std::cmp::Ordering;
use std::fmt;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Date {
  pub year: u16,
  pub month: u8,
  pub day: u8,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DateTime {
  pub year: u16,
  pub month: u8,
  pub day: u8,
  pub hour: u8,
  pub minute: u8,
  pub second: u8,
  pub micros: u32,
}

/// A signed duration, as stored in TIME columns (-838:59:59 to 838:59:59).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Time {
  pub negative: bool,
  pub days: u32,
  pub hours: u8,
  pub minutes: u8,
  pub seconds: u8,
  pub micros: u32,
}

impl Time {
  pub fn total_micros(&self) -> i128 {
    let secs = self.days as i128 * 86_400
      + self.hours as i128 * 3_600
      + self.minutes as i128 * 60
      + self.seconds as i128;
    let micros = secs * 1_000_000 + self.micros as i128;
    if self.negative {
      -micros
    } else {
      micros
    }
  }
}

impl PartialOrd for Time {
  fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
    Some(self.cmp(other))
  }
}

impl Ord for Time {
  fn cmp(&self, other: &Self) -> Ordering {
    self
      .total_micros()
      .cmp(&other.total_micros())
      // -00:00:00 sorts right below 00:00:00.
      .then(other.negative.cmp(&self.negative))
  }
}

impl From<Date> for DateTime {
  fn from(d: Date) -> Self {
    DateTime {
      year: d.year,
      month: d.month,
      day: d.day,
      ..Default::default()
    }
  }
}

/// A column value or a statement parameter.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
  Null,
  UInt(u64),
  Int(i64),
  Float(f32),
  Double(f64),
  Bytes(Vec<u8>),
  Date(Date),
  DateTime(DateTime),
  Time(Time),
}

/// Values of different kinds never compare, rather than being ordered by kind.
impl PartialOrd for Value {
  fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
    match (self, other) {
      (Value::Null, Value::Null) => Some(Ordering::Equal),
      (Value::UInt(a), Value::UInt(b)) => a.partial_cmp(b),
      (Value::Int(a), Value::Int(b)) => a.partial_cmp(b),
      (Value::Float(a), Value::Float(b)) => a.partial_cmp(b),
      (Value::Double(a), Value::Double(b)) => a.partial_cmp(b),
      (Value::Bytes(a), Value::Bytes(b)) => a.partial_cmp(b),
      (Value::Date(a), Value::Date(b)) => a.partial_cmp(b),
      (Value::DateTime(a), Value::DateTime(b)) => a.partial_cmp(b),
      (Value::Time(a), Value::Time(b)) => a.partial_cmp(b),
      _ => None,
    }
  }
}

impl Value {
  pub fn is_null(&self) -> bool {
    matches!(self, Value::Null)
  }

  pub fn as_u64(&self) -> Option<u64> {
    match *self {
      Value::UInt(x) => Some(x),
      Value::Int(x) => u64::try_from(x).ok(),
      _ => None,
    }
  }

  pub fn as_i64(&self) -> Option<i64> {
    match *self {
      Value::Int(x) => Some(x),
      Value::UInt(x) => i64::try_from(x).ok(),
      _ => None,
    }
  }

  pub fn as_f64(&self) -> Option<f64> {
    match *self {
      Value::Float(x) => Some(x as f64),
      Value::Double(x) => Some(x),
      _ => None,
    }
  }

  pub fn as_bytes(&self) -> Option<&[u8]> {
    match self {
      Value::Bytes(b) => Some(b.as_slice()),
      _ => None,
    }
  }

  pub fn as_str(&self) -> Option<&str> {
    self.as_bytes().and_then(|b| std::str::from_utf8(b).ok())
  }

  pub fn as_date(&self) -> Option<Date> {
    match *self {
      Value::Date(d) => Some(d),
      _ => None,
    }
  }

  pub fn as_datetime(&self) -> Option<DateTime> {
    match *self {
      Value::DateTime(dt) => Some(dt),
      Value::Date(d) => Some(d.into()),
      _ => None,
    }
  }

  pub fn as_time(&self) -> Option<Time> {
    match *self {
      Value::Time(t) => Some(t),
      _ => None,
    }
  }

  /// Decodes one field of a text row.
  /// https://dev.mysql.com/doc/dev/mysql-server/latest/page_protocol_com_query_response_text_resultset_row.html
  pub fn parse_text(field: &[u8], ct: ColumnType, unsigned: bool) -> DriverResult<Self> {
    let malformed = || {
      DriverError::MalformedPacket(format!(
        "invalid {:?} text value {:?}",
        ct,
        String::from_utf8_lossy(field)
      ))
    };
    let text = || std::str::from_utf8(field).map_err(|_| malformed());

    match ct {
      ColumnType::MYSQL_TYPE_NULL => Ok(Value::Null),
      ColumnType::MYSQL_TYPE_TINY
      | ColumnType::MYSQL_TYPE_SHORT
      | ColumnType::MYSQL_TYPE_INT24
      | ColumnType::MYSQL_TYPE_LONG
      | ColumnType::MYSQL_TYPE_LONGLONG
        if unsigned =>
      {
        text()?.parse().map(Value::UInt).map_err(|_| malformed())
      }
      ColumnType::MYSQL_TYPE_TINY
      | ColumnType::MYSQL_TYPE_SHORT
      | ColumnType::MYSQL_TYPE_INT24
      | ColumnType::MYSQL_TYPE_LONG
      | ColumnType::MYSQL_TYPE_LONGLONG => {
        text()?.parse().map(Value::Int).map_err(|_| malformed())
      }
      ColumnType::MYSQL_TYPE_YEAR => text()?.parse().map(Value::UInt).map_err(|_| malformed()),
      ColumnType::MYSQL_TYPE_FLOAT => text()?.parse().map(Value::Float).map_err(|_| malformed()),
      ColumnType::MYSQL_TYPE_DOUBLE => text()?.parse().map(Value::Double).map_err(|_| malformed()),
      ColumnType::MYSQL_TYPE_DATE | ColumnType::MYSQL_TYPE_NEWDATE => parse_text_date(text()?)
        .map(Value::Date)
        .ok_or_else(malformed),
      ColumnType::MYSQL_TYPE_DATETIME
      | ColumnType::MYSQL_TYPE_DATETIME2
      | ColumnType::MYSQL_TYPE_TIMESTAMP
      | ColumnType::MYSQL_TYPE_TIMESTAMP2 => parse_text_datetime(text()?)
        .map(Value::DateTime)
        .ok_or_else(malformed),
      ColumnType::MYSQL_TYPE_TIME | ColumnType::MYSQL_TYPE_TIME2 => parse_text_time(text()?)
        .map(Value::Time)
        .ok_or_else(malformed),
      _ => Ok(Value::Bytes(field.to_vec())),
    }
  }

  /// Decodes one non-NULL field of a binary row.
  /// https://dev.mysql.com/doc/dev/mysql-server/latest/page_protocol_binary_resultset.html
  pub fn parse_binary<B: Buf>(b: &mut B, ct: ColumnType, unsigned: bool) -> DriverResult<Self> {
    match ct {
      ColumnType::MYSQL_TYPE_NULL => Ok(Value::Null),
      ColumnType::MYSQL_TYPE_TINY if unsigned => Ok(Value::UInt(b.safe_get_u8()? as u64)),
      ColumnType::MYSQL_TYPE_TINY => Ok(Value::Int(b.safe_get_i8()? as i64)),
      ColumnType::MYSQL_TYPE_YEAR => Ok(Value::UInt(b.safe_get_u16_le()? as u64)),
      ColumnType::MYSQL_TYPE_SHORT if unsigned => Ok(Value::UInt(b.safe_get_u16_le()? as u64)),
      ColumnType::MYSQL_TYPE_SHORT => Ok(Value::Int(b.safe_get_i16_le()? as i64)),
      ColumnType::MYSQL_TYPE_LONG | ColumnType::MYSQL_TYPE_INT24 if unsigned => {
        Ok(Value::UInt(b.safe_get_u32_le()? as u64))
      }
      ColumnType::MYSQL_TYPE_LONG | ColumnType::MYSQL_TYPE_INT24 => {
        Ok(Value::Int(b.safe_get_i32_le()? as i64))
      }
      ColumnType::MYSQL_TYPE_LONGLONG if unsigned => Ok(Value::UInt(b.safe_get_u64_le()?)),
      ColumnType::MYSQL_TYPE_LONGLONG => Ok(Value::Int(b.safe_get_i64_le()?)),
      ColumnType::MYSQL_TYPE_FLOAT => Ok(Value::Float(b.safe_get_f32_le()?)),
      ColumnType::MYSQL_TYPE_DOUBLE => Ok(Value::Double(b.safe_get_f64_le()?)),
      ColumnType::MYSQL_TYPE_DATE | ColumnType::MYSQL_TYPE_NEWDATE => {
        let dt = parse_binary_datetime(b)?;
        Ok(Value::Date(Date {
          year: dt.year,
          month: dt.month,
          day: dt.day,
        }))
      }
      ColumnType::MYSQL_TYPE_DATETIME
      | ColumnType::MYSQL_TYPE_DATETIME2
      | ColumnType::MYSQL_TYPE_TIMESTAMP
      | ColumnType::MYSQL_TYPE_TIMESTAMP2 => Ok(Value::DateTime(parse_binary_datetime(b)?)),
      ColumnType::MYSQL_TYPE_TIME | ColumnType::MYSQL_TYPE_TIME2 => {
        Ok(Value::Time(parse_binary_time(b)?))
      }
      _ => Ok(Value::Bytes(b.safe_get_lenc_bytes()?.to_vec())),
    }
  }

  /// Type announced for this value when bound as a statement parameter, and whether it is unsigned.
  pub fn binary_type(&self) -> (ColumnType, bool) {
    match self {
      Value::Null => (ColumnType::MYSQL_TYPE_NULL, false),
      Value::UInt(_) => (ColumnType::MYSQL_TYPE_LONGLONG, true),
      Value::Int(_) => (ColumnType::MYSQL_TYPE_LONGLONG, false),
      Value::Float(_) => (ColumnType::MYSQL_TYPE_FLOAT, false),
      Value::Double(_) => (ColumnType::MYSQL_TYPE_DOUBLE, false),
      Value::Bytes(_) => (ColumnType::MYSQL_TYPE_STRING, false),
      Value::Date(_) => (ColumnType::MYSQL_TYPE_DATE, false),
      Value::DateTime(_) => (ColumnType::MYSQL_TYPE_DATETIME, false),
      Value::Time(_) => (ColumnType::MYSQL_TYPE_TIME, false),
    }
  }

  /// Writes the binary protocol encoding of a parameter. NULL is carried by the null bitmap and
  /// writes nothing.
  pub fn write_binary<B: BufMut>(&self, b: &mut B) {
    match self {
      Value::Null => {}
      Value::UInt(x) => b.put_u64_le(*x),
      Value::Int(x) => b.put_i64_le(*x),
      Value::Float(x) => b.put_f32_le(*x),
      Value::Double(x) => b.put_f64_le(*x),
      Value::Bytes(x) => b.put_lenc_bytes(x),
      Value::Date(d) => write_binary_datetime(b, &(*d).into(), true),
      Value::DateTime(dt) => write_binary_datetime(b, dt, false),
      Value::Time(t) => write_binary_time(b, t),
    }
  }
}

fn write_binary_datetime<B: BufMut>(b: &mut B, dt: &DateTime, date_only: bool) {
  let len = if dt.micros != 0 {
    11
  } else if dt.hour != 0 || dt.minute != 0 || dt.second != 0 {
    7
  } else if dt.year != 0 || dt.month != 0 || dt.day != 0 {
    4
  } else {
    0
  };
  let len = if date_only { len.min(4) } else { len };

  b.put_u8(len);
  if len >= 4 {
    b.put_u16_le(dt.year);
    b.put_u8(dt.month);
    b.put_u8(dt.day);
  }
  if len >= 7 {
    b.put_u8(dt.hour);
    b.put_u8(dt.minute);
    b.put_u8(dt.second);
  }
  if len == 11 {
    b.put_u32_le(dt.micros);
  }
}

fn write_binary_time<B: BufMut>(b: &mut B, t: &Time) {
  let len = if t.micros != 0 {
    12
  } else if t.negative || t.days != 0 || t.hours != 0 || t.minutes != 0 || t.seconds != 0 {
    8
  } else {
    0
  };

  b.put_u8(len);
  if len >= 8 {
    b.put_u8(t.negative as u8);
    b.put_u32_le(t.days);
    b.put_u8(t.hours);
    b.put_u8(t.minutes);
    b.put_u8(t.seconds);
  }
  if len == 12 {
    b.put_u32_le(t.micros);
  }
}

fn parse_binary_datetime<B: Buf>(b: &mut B) -> DriverResult<DateTime> {
  let len = b.safe_get_u8()?;
  if !matches!(len, 0 | 4 | 7 | 11) {
    return Err(DriverError::MalformedPacket(format!(
      "invalid datetime length {}",
      len
    )));
  }

  let mut dt = DateTime::default();
  if len >= 4 {
    dt.year = b.safe_get_u16_le()?;
    dt.month = b.safe_get_u8()?;
    dt.day = b.safe_get_u8()?;
  }
  if len >= 7 {
    dt.hour = b.safe_get_u8()?;
    dt.minute = b.safe_get_u8()?;
    dt.second = b.safe_get_u8()?;
  }
  if len == 11 {
    dt.micros = b.safe_get_u32_le()?;
  }
  Ok(dt)
}

fn parse_binary_time<B: Buf>(b: &mut B) -> DriverResult<Time> {
  let len = b.safe_get_u8()?;
  if !matches!(len, 0 | 8 | 12) {
    return Err(DriverError::MalformedPacket(format!(
      "invalid time length {}",
      len
    )));
  }

  let mut t = Time::default();
  if len >= 8 {
    t.negative = b.safe_get_u8()? == 1;
    t.days = b.safe_get_u32_le()?;
    t.hours = b.safe_get_u8()?;
    t.minutes = b.safe_get_u8()?;
    t.seconds = b.safe_get_u8()?;
  }
  if len == 12 {
    t.micros = b.safe_get_u32_le()?;
  }
  Ok(t)
}

// `12:34:56.789` becomes ("12:34:56", 789000).
fn split_micros(s: &str) -> Option<(&str, u32)> {
  match s.split_once('.') {
    None => Some((s, 0)),
    Some((_, frac)) if frac.is_empty() || frac.len() > 6 => None,
    Some((whole, frac)) => {
      if !frac.bytes().all(|c| c.is_ascii_digit()) {
        return None;
      }
      let micros = frac.parse::<u32>().ok()? * 10u32.pow(6 - frac.len() as u32);
      Some((whole, micros))
    }
  }
}

fn parse_text_date(s: &str) -> Option<Date> {
  let mut parts = s.split('-');
  let year = parts.next()?.parse().ok()?;
  let month = parts.next()?.parse().ok()?;
  let day = parts.next()?.parse().ok()?;
  if parts.next().is_some() {
    return None;
  }
  Some(Date { year, month, day })
}

fn parse_text_datetime(s: &str) -> Option<DateTime> {
  let (date, time) = match s.split_once(' ') {
    Some((date, time)) => (date, Some(time)),
    None => (s, None),
  };

  let mut dt = DateTime::from(parse_text_date(date)?);
  if let Some(time) = time {
    let (hms, micros) = split_micros(time)?;
    let mut parts = hms.split(':');
    dt.hour = parts.next()?.parse().ok()?;
    dt.minute = parts.next()?.parse().ok()?;
    dt.second = parts.next()?.parse().ok()?;
    if parts.next().is_some() {
      return None;
    }
    dt.micros = micros;
  }
  Some(dt)
}

fn parse_text_time(s: &str) -> Option<Time> {
  let (negative, s) = match s.strip_prefix('-') {
    Some(rest) => (true, rest),
    None => (false, s),
  };
  let (hms, micros) = split_micros(s)?;
  let mut parts = hms.split(':');
  let hours: u32 = parts.next()?.parse().ok()?;
  let minutes = parts.next()?.parse().ok()?;
  let seconds = parts.next()?.parse().ok()?;
  if parts.next().is_some() {
    return None;
  }

  Some(Time {
    negative,
    days: hours / 24,
    hours: (hours % 24) as u8,
    minutes,
    seconds,
    micros,
  })
}

impl fmt::Display for Date {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{:04}-{:02}-{:02}", self.year, self.month, self.day)
  }
}

impl fmt::Display for DateTime {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(
      f,
      "{:04}-{:02}-{:02} {:02}:{:02}:{:02}",
      self.year, self.month, self.day, self.hour, self.minute, self.second
    )?;
    if self.micros != 0 {
      write!(f, ".{:06}", self.micros)?;
    }
    Ok(())
  }
}

impl fmt::Display for Time {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let hours = self.days as u64 * 24 + self.hours as u64;
    let sign = if self.negative { "-" } else { "" };
    write!(f, "{}{:02}:{:02}:{:02}", sign, hours, self.minutes, self.seconds)?;
    if self.micros != 0 {
      write!(f, ".{:06}", self.micros)?;
    }
    Ok(())
  }
}

impl fmt::Display for Value {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Value::Null => f.write_str("NULL"),
      Value::UInt(x) => write!(f, "{}", x),
      Value::Int(x) => write!(f, "{}", x),
      Value::Float(x) => write!(f, "{}", x),
      Value::Double(x) => write!(f, "{}", x),
      Value::Bytes(x) => f.write_str(&String::from_utf8_lossy(x)),
      Value::Date(x) => write!(f, "{}", x),
      Value::DateTime(x) => write!(f, "{}", x),
      Value::Time(x) => write!(f, "{}", x),
    }
  }
}

macro_rules! impl_from_int {
  ($variant:ident, $target:ty, $($t:ty),+) => {
    $(
      impl From<$t> for Value {
        fn from(x: $t) -> Self {
          Value::$variant(x as $target)
        }
      }
    )+
  };
}

impl_from_int!(Int, i64, i8, i16, i32, i64);
impl_from_int!(UInt, u64, u8, u16, u32, u64);

impl From<bool> for Value {
  fn from(x: bool) -> Self {
    Value::Int(x as i64)
  }
}

impl From<f32> for Value {
  fn from(x: f32) -> Self {
    Value::Float(x)
  }
}

impl From<f64> for Value {
  fn from(x: f64) -> Self {
    Value::Double(x)
  }
}

impl From<&str> for Value {
  fn from(x: &str) -> Self {
    Value::Bytes(x.as_bytes().to_vec())
  }
}

impl From<String> for Value {
  fn from(x: String) -> Self {
    Value::Bytes(x.into_bytes())
  }
}

impl From<&[u8]> for Value {
  fn from(x: &[u8]) -> Self {
    Value::Bytes(x.to_vec())
  }
}

impl From<Vec<u8>> for Value {
  fn from(x: Vec<u8>) -> Self {
    Value::Bytes(x)
  }
}

impl From<Date> for Value {
  fn from(x: Date) -> Self {
    Value::Date(x)
  }
}

impl From<DateTime> for Value {
  fn from(x: DateTime) -> Self {
    Value::DateTime(x)
  }
}

impl From<Time> for Value {
  fn from(x: Time) -> Self {
    Value::Time(x)
  }
}

impl<T: Into<Value>> From<Option<T>> for Value {
  fn from(x: Option<T>) -> Self {
    x.map(Into::into).unwrap_or(Value::Null)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use bytes::BytesMut;

  fn binary(v: &Value) -> Vec<u8> {
    let mut b = BytesMut::new();
    v.write_binary(&mut b);
    b.to_vec()
  }

  #[test]
  fn compares_structurally() {
    assert_eq!(Value::from(1), Value::Int(1));
    assert_ne!(Value::Int(1), Value::UInt(1));
    assert_ne!(Value::Null, Value::Int(0));
    assert_eq!(Value::Null.partial_cmp(&Value::Int(0)), None);
    assert_eq!(Value::Null.partial_cmp(&Value::Null), Some(Ordering::Equal));
    assert!(Value::Int(-1) < Value::Int(2));
    assert!(Value::from("abc") < Value::from("abd"));
    assert_eq!(Value::from(None::<i32>), Value::Null);
    assert_eq!(Value::from(Some("x")).as_str(), Some("x"));
  }

  #[test]
  fn orders_signed_times() {
    let minus_one = Time {
      negative: true,
      seconds: 1,
      ..Default::default()
    };
    let plus_one = Time {
      seconds: 1,
      ..Default::default()
    };
    let a_day = Time {
      days: 1,
      ..Default::default()
    };
    assert!(minus_one < Time::default());
    assert!(plus_one > minus_one);
    assert!(a_day > plus_one);
    assert_eq!(a_day.total_micros(), 86_400_000_000);
  }

  #[test]
  fn parses_text_fields() {
    let ct = ColumnType::MYSQL_TYPE_LONGLONG;
    assert_eq!(Value::parse_text(b"1", ct, false).unwrap(), Value::Int(1));
    assert_eq!(Value::parse_text(b"-42", ct, false).unwrap(), Value::Int(-42));
    assert_eq!(
      Value::parse_text(b"18446744073709551615", ct, true).unwrap(),
      Value::UInt(u64::MAX)
    );
    assert!(Value::parse_text(b"abc", ct, false).is_err());
    assert_eq!(
      Value::parse_text(b"2.5", ColumnType::MYSQL_TYPE_DOUBLE, false).unwrap(),
      Value::Double(2.5)
    );
    assert_eq!(
      Value::parse_text(b"2.5", ColumnType::MYSQL_TYPE_FLOAT, false).unwrap(),
      Value::Float(2.5)
    );
    assert_eq!(
      Value::parse_text(b"1.50", ColumnType::MYSQL_TYPE_NEWDECIMAL, false).unwrap(),
      Value::Bytes(b"1.50".to_vec())
    );
    assert_eq!(
      Value::parse_text(b"2024", ColumnType::MYSQL_TYPE_YEAR, true).unwrap(),
      Value::UInt(2024)
    );
  }

  #[test]
  fn parses_text_temporals() {
    assert_eq!(
      Value::parse_text(b"2010-02-15", ColumnType::MYSQL_TYPE_DATE, false).unwrap(),
      Value::Date(Date {
        year: 2010,
        month: 2,
        day: 15
      })
    );
    assert_eq!(
      Value::parse_text(
        b"2010-02-15 02:10:05.012300",
        ColumnType::MYSQL_TYPE_DATETIME,
        false
      )
      .unwrap(),
      Value::DateTime(DateTime {
        year: 2010,
        month: 2,
        day: 15,
        hour: 2,
        minute: 10,
        second: 5,
        micros: 12_300,
      })
    );
    assert_eq!(
      Value::parse_text(b"-838:59:58.5", ColumnType::MYSQL_TYPE_TIME, false).unwrap(),
      Value::Time(Time {
        negative: true,
        days: 34,
        hours: 22,
        minutes: 59,
        seconds: 58,
        micros: 500_000,
      })
    );
    assert!(Value::parse_text(b"2010-02", ColumnType::MYSQL_TYPE_DATE, false).is_err());
    assert!(Value::parse_text(b"10:00:00.1234567", ColumnType::MYSQL_TYPE_TIME, false).is_err());
  }

  #[test]
  fn parses_binary_fields() {
    let mut b = &[0xFF][..];
    assert_eq!(
      Value::parse_binary(&mut b, ColumnType::MYSQL_TYPE_TINY, false).unwrap(),
      Value::Int(-1)
    );
    let mut b = &[0xFF][..];
    assert_eq!(
      Value::parse_binary(&mut b, ColumnType::MYSQL_TYPE_TINY, true).unwrap(),
      Value::UInt(255)
    );
    let mut b = &[0xFE, 0xFF, 0xFF, 0xFF][..];
    assert_eq!(
      Value::parse_binary(&mut b, ColumnType::MYSQL_TYPE_LONG, false).unwrap(),
      Value::Int(-2)
    );
    let mut b = &[0x03, b'a', b'b', b'c', 0x99][..];
    assert_eq!(
      Value::parse_binary(&mut b, ColumnType::MYSQL_TYPE_VAR_STRING, false).unwrap(),
      Value::from("abc")
    );
    assert_eq!(b, &[0x99]);

    let mut b = &[0x0B, 0xDA, 0x07, 0x0A, 0x11, 0x13, 0x1B, 0x1E, 0x01, 0x00, 0x00, 0x00][..];
    assert_eq!(
      Value::parse_binary(&mut b, ColumnType::MYSQL_TYPE_DATETIME, false).unwrap(),
      Value::DateTime(DateTime {
        year: 2010,
        month: 10,
        day: 17,
        hour: 19,
        minute: 27,
        second: 30,
        micros: 1,
      })
    );

    let mut b = &[0x00][..];
    assert_eq!(
      Value::parse_binary(&mut b, ColumnType::MYSQL_TYPE_DATE, false).unwrap(),
      Value::Date(Date::default())
    );

    let mut b = &[0x08, 0x01, 0x78, 0x00, 0x00, 0x00, 0x13, 0x1B, 0x1E][..];
    assert_eq!(
      Value::parse_binary(&mut b, ColumnType::MYSQL_TYPE_TIME, false).unwrap(),
      Value::Time(Time {
        negative: true,
        days: 120,
        hours: 19,
        minutes: 27,
        seconds: 30,
        micros: 0,
      })
    );
  }

  #[test]
  fn rejects_malformed_binary_fields() {
    let mut b = &[0x05, 0x00, 0x00, 0x00, 0x00, 0x00][..];
    assert!(matches!(
      Value::parse_binary(&mut b, ColumnType::MYSQL_TYPE_DATETIME, false),
      Err(DriverError::MalformedPacket(_))
    ));
    let mut b = &[0x07, 0xDA, 0x07][..];
    assert!(matches!(
      Value::parse_binary(&mut b, ColumnType::MYSQL_TYPE_DATETIME, false),
      Err(DriverError::IncompleteMessage)
    ));
    let mut b = &[0x01, 0x02][..];
    assert!(matches!(
      Value::parse_binary(&mut b, ColumnType::MYSQL_TYPE_LONGLONG, false),
      Err(DriverError::IncompleteMessage)
    ));
  }

  #[test]
  fn writes_binary_parameters() {
    assert_eq!(binary(&Value::Null), Vec::<u8>::new());
    assert_eq!(binary(&Value::Int(-2)), vec![0xFE, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF]);
    assert_eq!(binary(&Value::UInt(1)), vec![1, 0, 0, 0, 0, 0, 0, 0]);
    assert_eq!(binary(&Value::Float(1.0)), vec![0x00, 0x00, 0x80, 0x3F]);
    assert_eq!(binary(&Value::from("ab")), vec![0x02, b'a', b'b']);
    assert_eq!(
      binary(&Value::Date(Date {
        year: 2010,
        month: 10,
        day: 17
      })),
      vec![0x04, 0xDA, 0x07, 0x0A, 0x11]
    );
    assert_eq!(binary(&Value::Date(Date::default())), vec![0x00]);
    assert_eq!(
      binary(&Value::DateTime(DateTime {
        year: 2010,
        month: 10,
        day: 17,
        hour: 19,
        minute: 27,
        second: 30,
        micros: 0,
      })),
      vec![0x07, 0xDA, 0x07, 0x0A, 0x11, 0x13, 0x1B, 0x1E]
    );
    assert_eq!(
      binary(&Value::Time(Time {
        negative: false,
        days: 0,
        hours: 1,
        minutes: 0,
        seconds: 0,
        micros: 5,
      })),
      vec![0x0C, 0x00, 0, 0, 0, 0, 0x01, 0x00, 0x00, 0x05, 0, 0, 0]
    );
    assert_eq!(binary(&Value::Time(Time::default())), vec![0x00]);

    assert_eq!(
      Value::UInt(1).binary_type(),
      (ColumnType::MYSQL_TYPE_LONGLONG, true)
    );
    assert_eq!(Value::Null.binary_type(), (ColumnType::MYSQL_TYPE_NULL, false));
  }

  #[test]
  fn binary_parameters_decode_back() {
    let time = |negative, days, hours, minutes, seconds, micros| {
      Value::Time(Time {
        negative,
        days,
        hours,
        minutes,
        seconds,
        micros,
      })
    };
    let values = vec![
      Value::Null,
      Value::Int(i64::MIN),
      Value::UInt(u64::MAX),
      Value::Float(-1.5),
      Value::Double(-0.25),
      Value::from(vec![0u8; 300]),
      Value::from(""),
      Value::Date(Date {
        year: 2024,
        month: 2,
        day: 29,
      }),
      Value::Date(Date::default()),
      Value::DateTime(DateTime {
        year: 1999,
        month: 12,
        day: 31,
        hour: 23,
        minute: 59,
        second: 59,
        micros: 999_999,
      }),
      Value::DateTime(DateTime::default()),
      time(false, 0, 0, 0, 0, 0),
      time(true, 0, 0, 0, 0, 0),
      time(false, 34, 22, 59, 59, 0),
      time(true, 1, 2, 3, 4, 0),
      time(true, 0, 0, 0, 1, 250_000),
    ];
    for v in values {
      let encoded = binary(&v);
      let (ct, unsigned) = v.binary_type();
      let decoded = Value::parse_binary(&mut &encoded[..], ct, unsigned).unwrap();
      assert_eq!(decoded, v);
    }
  }

  #[test]
  fn negative_zero_time_sorts_below_zero() {
    let zero = Time::default();
    let negative_zero = Time {
      negative: true,
      ..zero
    };
    let negative_second = Time {
      negative: true,
      seconds: 1,
      ..zero
    };
    assert!(negative_zero < zero);
    assert!(negative_second < negative_zero);
    assert_eq!(
      binary(&Value::Time(negative_zero)),
      vec![0x08, 0x01, 0, 0, 0, 0, 0x00, 0x00, 0x00]
    );
  }

  #[test]
  fn displays_values() {
    assert_eq!(Value::Null.to_string(), "NULL");
    assert_eq!(Value::from("héllo").to_string(), "héllo");
    assert_eq!(
      Value::Time(Time {
        negative: true,
        days: 1,
        hours: 2,
        minutes: 3,
        seconds: 4,
        micros: 0,
      })
      .to_string(),
      "-26:03:04"
    );
    assert_eq!(
      Value::DateTime(DateTime {
        year: 2020,
        month: 1,
        day: 2,
        hour: 3,
        minute: 4,
        second: 5,
        micros: 60,
      })
      .to_string(),
      "2020-01-02 03:04:05.000060"
    );
  }
}
