//! Parsers for `mmcli` text output.
//!
//! Detail views (`mmcli -m N`, `mmcli -s N`) are tables of the form
//!
//! ```text
//!   --------------------------------
//!   Status   |                state: registered
//!            |       signal quality: 75% (recent)
//!   --------------------------------
//!   3GPP     |                 imei: 867962041234567
//! ```
//!
//! A blank section label continues the previous section, and a line whose
//! text starts at or past the previous value column continues that value.

use chrono::{DateTime, Local, NaiveDateTime, TimeZone};
use serde::{Deserialize, Serialize};

// ── Detail tables ───────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
struct Field {
    section: String,
    key: String,
    value: String,
}

/// A parsed `mmcli` detail view. Lookups are case-insensitive.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Record {
    fields: Vec<Field>,
}

impl Record {
    pub fn parse(text: &str) -> Self {
        let mut fields: Vec<Field> = Vec::new();
        let mut section = String::new();
        // Column (within the right-hand side) where the last value started.
        let mut value_col: Option<usize> = None;

        for line in text.lines() {
            let Some((label, rest)) = line.split_once('|') else {
                continue;
            };

            let label = label.trim();
            if !label.is_empty() {
                section = label.to_ascii_lowercase();
                value_col = None;
            }

            let indent = rest.len() - rest.trim_start().len();
            let body = rest.trim();
            if body.is_empty() {
                continue;
            }

            if let (Some(col), Some(last)) = (value_col, fields.last_mut()) {
                if indent >= col {
                    last.value.push('\n');
                    last.value.push_str(body);
                    continue;
                }
            }

            let Some((key, value)) = rest.split_once(':') else {
                continue;
            };
            let value_start = key.len() + 1 + (value.len() - value.trim_start().len());
            value_col = Some(value_start);
            fields.push(Field {
                section: section.clone(),
                key: key.trim().to_ascii_lowercase(),
                value: value.trim().to_string(),
            });
        }

        Self { fields }
    }

    /// The first value of `key` in `section`.
    pub fn get(&self, section: &str, key: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|f| f.section.eq_ignore_ascii_case(section) && f.key.eq_ignore_ascii_case(key))
            .map(|f| f.value.as_str())
            .filter(|v| !v.is_empty() && *v != "--")
    }
}

// ── Object paths ────────────────────────────────────────────────────

fn trailing_ids<'a>(text: &'a str, marker: &'a str) -> impl Iterator<Item = String> + 'a {
    text.lines().filter_map(move |line| {
        let (_, tail) = line.split_once(marker)?;
        let digits: String = tail.chars().take_while(char::is_ascii_digit).collect();
        (!digits.is_empty()).then_some(digits)
    })
}

/// Modem indices from `mmcli -L`.
pub fn modem_ids(list: &str) -> Vec<String> {
    trailing_ids(list, "/org/freedesktop/ModemManager1/Modem/").collect()
}

/// SMS indices from `mmcli -m N --messaging-list-sms`.
pub fn sms_ids(list: &str) -> Vec<String> {
    trailing_ids(list, "/SMS/").collect()
}

/// The new SMS index from `--messaging-create-sms` output
/// (`Successfully created new SMS: /org/freedesktop/ModemManager1/SMS/21`).
pub fn created_sms_id(output: &str) -> Option<String> {
    trailing_ids(output, "messaging/sms/")
        .next()
        .or_else(|| trailing_ids(output, "/SMS/").next())
}

// ── Modems ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModemStatus {
    Ready,
    NotReady,
}

impl ModemStatus {
    /// `registered` and `connected` modems can send and receive.
    pub fn from_state(state: &str) -> Self {
        let state = state.to_ascii_lowercase();
        if state.contains("registered") || state.contains("connected") {
            ModemStatus::Ready
        } else {
            ModemStatus::NotReady
        }
    }
}

impl std::fmt::Display for ModemStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ModemStatus::Ready => write!(f, "ready"),
            ModemStatus::NotReady => write!(f, "not_ready"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModemInfo {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<ModemStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub imei: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub operator: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signal_quality: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_path: Option<String>,
}

impl ModemInfo {
    /// Build from the `mmcli -m <id>` view.
    pub fn from_record(id: &str, record: &Record) -> Self {
        let signal_quality = record.get("status", "signal quality").and_then(|v| {
            let digits: String = v.chars().take_while(char::is_ascii_digit).collect();
            digits.parse().ok()
        });
        Self {
            id: id.to_string(),
            status: record.get("status", "state").map(ModemStatus::from_state),
            imei: record.get("3gpp", "imei").map(str::to_string),
            operator: record.get("3gpp", "operator name").map(str::to_string),
            signal_quality,
            device_path: record.get("system", "primary port").map(str::to_string),
        }
    }

    pub fn is_ready(&self) -> bool {
        self.status == Some(ModemStatus::Ready)
    }
}

// ── Received SMS ────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InboundSms {
    pub id: String,
    pub sender: String,
    pub message: String,
    /// Local wall-clock time; `None` when mmcli gave no usable timestamp.
    pub timestamp: Option<NaiveDateTime>,
}

impl InboundSms {
    /// Build from the `mmcli -s <id>` view. Messages without a sender or
    /// text yield `None`.
    pub fn from_record(id: &str, record: &Record) -> Option<Self> {
        let sender = record.get("content", "number")?;
        let message = record.get("content", "text")?;
        Some(Self {
            id: id.to_string(),
            sender: sender.to_string(),
            message: message.to_string(),
            timestamp: record.get("properties", "timestamp").and_then(parse_timestamp),
        })
    }
}

const OFFSET_FORMATS: [&str; 2] = ["%Y-%m-%d %H:%M:%S%z", "%Y-%m-%dT%H:%M:%S%z"];
const NAIVE_FORMATS: [&str; 2] = ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"];

/// Parse an SMS timestamp into local wall-clock time.
///
/// Offsets are honoured and converted; timestamps without one are taken as
/// local already.
pub fn parse_timestamp(raw: &str) -> Option<NaiveDateTime> {
    let raw = raw.trim();
    let to_local = |dt: DateTime<chrono::FixedOffset>| {
        Local.from_utc_datetime(&dt.naive_utc()).naive_local()
    };

    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(to_local(dt));
    }
    for fmt in OFFSET_FORMATS {
        if let Ok(dt) = DateTime::parse_from_str(raw, fmt) {
            return Some(to_local(dt));
        }
    }
    NAIVE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
}
