//! The line-oriented protocol spoken by the traced target.
//!
//! ```text
//! A,<task>,<device time>,<core>
//! B,<server>,<device time>,<core>,<remaining budget>
//! ```
//!
//! Every line is turned into a [`Record`]. Nothing here fails: a line
//! that cannot be understood becomes [`Record::Ignored`] so that a noisy
//! link never stops ingestion.
use sched_scope_api::{CoreId, Timestamp};

pub type TaskName = String;
pub type ServerName = String;
pub type Budget = i64;

/// A task switch: `task` started running on `core` at `time`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActivityEvent {
    pub task: TaskName,
    pub time: Timestamp,
    pub core: CoreId,
}

/// A remaining-budget sample of a CBS server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BudgetEvent {
    pub server: ServerName,
    pub time: Timestamp,
    pub core: CoreId,
    pub remaining: Budget,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Record {
    Activity(ActivityEvent),
    Budget(BudgetEvent),
    Ignored(IgnoreReason),
}

impl Record {
    /// Device time of an accepted record.
    pub fn time(&self) -> Option<Timestamp> {
        match self {
            Record::Activity(a) => Some(a.time),
            Record::Budget(b) => Some(b.time),
            Record::Ignored(_) => None,
        }
    }
}

/// Why a line did not produce a record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IgnoreReason {
    /// Nothing but whitespace.
    Empty,
    /// A tag other than `A` or `B`. Reserved for future record types.
    UnknownTag(char),
    /// Not valid UTF-8.
    Undecodable,
    /// Known tag, but the fields do not parse.
    Malformed(String),
}

impl IgnoreReason {
    pub fn is_malformed(&self) -> bool {
        matches!(self, Self::Malformed(_) | Self::Undecodable)
    }
}

const ACTIVITY_TAG: char = 'A';
const BUDGET_TAG: char = 'B';
const ACTIVITY_FIELDS: usize = 3;
const BUDGET_FIELDS: usize = 4;

/// Longest line accepted, in bytes, excluding the terminator. Sources
/// cut longer lines off after this many bytes plus one.
pub const MAX_LINE_LENGTH: usize = 4 * 1024;

/// Decodes and parses a raw line as received from a source.
pub fn parse_bytes(line: &[u8]) -> Record {
    if line.len() > MAX_LINE_LENGTH {
        return Record::Ignored(IgnoreReason::Malformed(format!(
            "line exceeds {} bytes",
            MAX_LINE_LENGTH
        )));
    }

    match std::str::from_utf8(line) {
        Ok(line) => parse_line(line),
        Err(_) => Record::Ignored(IgnoreReason::Undecodable),
    }
}

/// Parses a single decoded line. Trailing whitespace (including the
/// line terminator) is stripped first.
pub fn parse_line(line: &str) -> Record {
    let line = line.trim_end();
    let first = match line.chars().next() {
        Some(c) => c,
        None => return Record::Ignored(IgnoreReason::Empty),
    };

    // The tag is the first character only; whatever else precedes the
    // first comma is not looked at.
    let fields: Vec<&str> = line.split(',').skip(1).collect();

    let parsed = match first {
        ACTIVITY_TAG => parse_activity(&fields).map(Record::Activity),
        BUDGET_TAG => parse_budget(&fields).map(Record::Budget),
        _ => return Record::Ignored(IgnoreReason::UnknownTag(first)),
    };

    parsed.unwrap_or_else(|reason| Record::Ignored(IgnoreReason::Malformed(reason)))
}

fn expect_fields(fields: &[&str], n: usize, kind: &str) -> Result<(), String> {
    if fields.len() != n {
        return Err(format!(
            "{} record takes {} fields, got {}",
            kind,
            n,
            fields.len()
        ));
    }

    Ok(())
}

fn integer<T: std::str::FromStr>(field: &str, what: &str) -> Result<T, String> {
    field
        .trim()
        .parse()
        .map_err(|_| format!("{} {:?} is not an integer", what, field))
}

fn parse_activity(fields: &[&str]) -> Result<ActivityEvent, String> {
    expect_fields(fields, ACTIVITY_FIELDS, "activity")?;
    Ok(ActivityEvent {
        task: fields[0].to_string(),
        time: integer(fields[1], "device time")?,
        core: integer(fields[2], "core index")?,
    })
}

fn parse_budget(fields: &[&str]) -> Result<BudgetEvent, String> {
    expect_fields(fields, BUDGET_FIELDS, "budget")?;
    Ok(BudgetEvent {
        server: fields[0].to_string(),
        time: integer(fields[1], "device time")?,
        core: integer(fields[2], "core index")?,
        remaining: integer(fields[3], "remaining budget")?,
    })
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn activity_record() {
        assert_eq!(
            parse_line("A,Tmr Svc,1234,1\r\n"),
            Record::Activity(ActivityEvent {
                task: "Tmr Svc".to_string(),
                time: 1234,
                core: 1,
            })
        );
    }

    #[test]
    fn budget_record() {
        assert_eq!(
            parse_line("B,S1,200,0,-3"),
            Record::Budget(BudgetEvent {
                server: "S1".to_string(),
                time: 200,
                core: 0,
                remaining: -3,
            })
        );
    }

    #[test]
    fn malformed_lines_are_ignored() {
        for line in [
            "A,Foo,bar,0",
            "A,Foo,100",
            "A,Foo,100,0,7",
            "A,Foo,100,-1",
            "B,S1,100,0",
            "B,S1,100,0,lots",
            "A",
        ] {
            match parse_line(line) {
                Record::Ignored(reason) => assert!(reason.is_malformed(), "{}", line),
                r => panic!("{:?} parsed into {:?}", line, r),
            }
        }
    }

    #[test]
    fn unknown_tags_and_noise() {
        assert_eq!(
            parse_line("C,whatever,1,2"),
            Record::Ignored(IgnoreReason::UnknownTag('C'))
        );
        assert_eq!(
            parse_line("boot: hello"),
            Record::Ignored(IgnoreReason::UnknownTag('b'))
        );
        assert_eq!(parse_line("   \n"), Record::Ignored(IgnoreReason::Empty));
        assert_eq!(
            parse_bytes(&[b'A', b',', 0xff, 0xfe, b'\n']),
            Record::Ignored(IgnoreReason::Undecodable)
        );
    }

    #[test]
    fn overlong_lines_are_malformed() {
        let mut line = b"A,TaskX,100,0".to_vec();
        line.resize(MAX_LINE_LENGTH + 1, b' ');
        assert!(matches!(
            parse_bytes(&line),
            Record::Ignored(IgnoreReason::Malformed(_))
        ));

        line.truncate(MAX_LINE_LENGTH);
        assert!(matches!(parse_bytes(&line), Record::Activity(_)));
    }
}
