use chrono::{DateTime, Datelike, Local, TimeZone, Timelike};

const MONTH_NAMES: [&str; 12] = [
    "January",
    "February",
    "March",
    "April",
    "May",
    "June",
    "July",
    "August",
    "September",
    "October",
    "November",
    "December",
];

const DAY_NAMES: [&str; 7] = [
    "Sunday",
    "Monday",
    "Tuesday",
    "Wednesday",
    "Thursday",
    "Friday",
    "Saturday",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Token {
    Year4,
    Year2,
    MonthName,
    MonthAbbr,
    Month2,
    Month,
    DayName,
    DayAbbr,
    Day2,
    Day,
    Hour24Pad,
    Hour24,
    Hour12Pad,
    Hour12,
    Minute2,
    Minute,
    Second2,
    Second,
    Millis3,
    Centis2,
    MeridiemUpper,
    MeridiemUpperShort,
    MeridiemLower,
    MeridiemLowerShort,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Piece {
    Literal(String),
    Token(Token),
}

/// Formats epoch milliseconds in local time using `yyyy-mm-dd HH:MM:ss`
/// style masks.
pub fn format_millis(millis: i64, mask: &str) -> Option<String> {
    let datetime = Local.timestamp_millis_opt(millis).single()?;
    Some(format_datetime(&datetime, mask))
}

pub fn format_datetime(datetime: &DateTime<Local>, mask: &str) -> String {
    let mut out = String::new();
    for piece in tokenize(mask) {
        match piece {
            Piece::Literal(text) => out.push_str(&text),
            Piece::Token(token) => out.push_str(&render_token(token, datetime)),
        }
    }
    out
}

fn tokenize(mask: &str) -> Vec<Piece> {
    let chars: Vec<char> = mask.chars().collect();
    let mut pieces = Vec::new();
    let mut literal = String::new();
    let mut i = 0usize;

    while i < chars.len() {
        let ch = chars[i];

        if ch == '\'' || ch == '"' {
            if let Some(end) = chars[i + 1..].iter().position(|c| *c == ch) {
                literal.extend(&chars[i + 1..i + 1 + end]);
                i += end + 2;
                continue;
            }
        }

        let run = chars[i..].iter().take_while(|c| **c == ch).count();
        match match_token(ch, run) {
            Some((token, used)) => {
                if !literal.is_empty() {
                    pieces.push(Piece::Literal(std::mem::take(&mut literal)));
                }
                pieces.push(Piece::Token(token));
                i += used;
            }
            None => {
                literal.push(ch);
                i += 1;
            }
        }
    }

    if !literal.is_empty() {
        pieces.push(Piece::Literal(literal));
    }
    pieces
}

fn match_token(ch: char, run: usize) -> Option<(Token, usize)> {
    let token = match (ch, run) {
        ('y', n) if n >= 4 => (Token::Year4, 4),
        ('y', n) if n >= 2 => (Token::Year2, 2),
        ('m', n) if n >= 4 => (Token::MonthName, 4),
        ('m', 3) => (Token::MonthAbbr, 3),
        ('m', 2) => (Token::Month2, 2),
        ('m', _) => (Token::Month, 1),
        ('d', n) if n >= 4 => (Token::DayName, 4),
        ('d', 3) => (Token::DayAbbr, 3),
        ('d', 2) => (Token::Day2, 2),
        ('d', _) => (Token::Day, 1),
        ('H', n) if n >= 2 => (Token::Hour24Pad, 2),
        ('H', _) => (Token::Hour24, 1),
        ('h', n) if n >= 2 => (Token::Hour12Pad, 2),
        ('h', _) => (Token::Hour12, 1),
        ('M', n) if n >= 2 => (Token::Minute2, 2),
        ('M', _) => (Token::Minute, 1),
        ('s', n) if n >= 2 => (Token::Second2, 2),
        ('s', _) => (Token::Second, 1),
        ('l', _) => (Token::Millis3, 1),
        ('L', _) => (Token::Centis2, 1),
        ('T', n) if n >= 2 => (Token::MeridiemUpper, 2),
        ('T', _) => (Token::MeridiemUpperShort, 1),
        ('t', n) if n >= 2 => (Token::MeridiemLower, 2),
        ('t', _) => (Token::MeridiemLowerShort, 1),
        _ => return None,
    };
    Some(token)
}

fn render_token(token: Token, d: &DateTime<Local>) -> String {
    let hour12 = match d.hour() % 12 {
        0 => 12,
        h => h,
    };
    let pm = d.hour() >= 12;
    let millis = d.timestamp_subsec_millis().min(999);

    match token {
        Token::Year4 => format!("{:04}", d.year()),
        Token::Year2 => format!("{:02}", d.year().rem_euclid(100)),
        Token::MonthName => MONTH_NAMES[d.month0() as usize].to_string(),
        Token::MonthAbbr => MONTH_NAMES[d.month0() as usize][..3].to_string(),
        Token::Month2 => format!("{:02}", d.month()),
        Token::Month => d.month().to_string(),
        Token::DayName => DAY_NAMES[d.weekday().num_days_from_sunday() as usize].to_string(),
        Token::DayAbbr => {
            DAY_NAMES[d.weekday().num_days_from_sunday() as usize][..3].to_string()
        }
        Token::Day2 => format!("{:02}", d.day()),
        Token::Day => d.day().to_string(),
        Token::Hour24Pad => format!("{:02}", d.hour()),
        Token::Hour24 => d.hour().to_string(),
        Token::Hour12Pad => format!("{:02}", hour12),
        Token::Hour12 => hour12.to_string(),
        Token::Minute2 => format!("{:02}", d.minute()),
        Token::Minute => d.minute().to_string(),
        Token::Second2 => format!("{:02}", d.second()),
        Token::Second => d.second().to_string(),
        Token::Millis3 => format!("{:03}", millis),
        Token::Centis2 => format!("{:02}", millis / 10),
        Token::MeridiemUpper => if pm { "PM" } else { "AM" }.to_string(),
        Token::MeridiemUpperShort => if pm { "P" } else { "A" }.to_string(),
        Token::MeridiemLower => if pm { "pm" } else { "am" }.to_string(),
        Token::MeridiemLowerShort => if pm { "p" } else { "a" }.to_string(),
    }
}
