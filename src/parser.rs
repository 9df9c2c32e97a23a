//! Event parser for the camera feed's `Code=...;action=...;index=...;data={...}`
//! text records.
//!
//! Parsing is a pure function of the accumulated buffer: field markers are
//! located in sequence and the JSON payload is delimited by brace matching, so
//! trailing stream noise (boundary lines, headers of the next part) never ends
//! up inside the payload.

use serde_json::Value;
use tracing::{debug, error};

const CODE_MARKER: &str = "Code=";
const ACTION_MARKER: &str = ";action=";
const INDEX_MARKER: &str = ";index=";
const DATA_MARKER: &str = ";data=";

const MOTION_CODE: &str = "VideoMotion";
const START_ACTION: &str = "Start";
const UNKNOWN: &str = "Unknown";

/// Structured view of one event record, borrowed from the scanned buffer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawEventRecord<'a> {
    pub code: &'a str,
    pub action: &'a str,
    pub index: &'a str,
    /// JSON object text, braces included
    pub data: &'a str,
}

/// Why a buffer yielded no record
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanError {
    /// No `Code=...;data=` sequence in the buffer
    NoRecord,
    /// `data=` present but not followed by a complete `{...}` object
    UnterminatedPayload,
}

/// Fixed parts of the rendered alert text
#[derive(Debug, Clone)]
pub struct AlertTemplate {
    pub title: String,
    pub site: Option<String>,
}

impl AlertTemplate {
    pub fn new<S: Into<String>>(title: S) -> Self {
        Self {
            title: title.into(),
            site: None,
        }
    }

    pub fn with_site<S: Into<String>>(mut self, site: S) -> Self {
        let site = site.into();
        self.site = if site.trim().is_empty() {
            None
        } else {
            Some(site)
        };
        self
    }

    fn render(&self, source: &str, payload: &Value) -> String {
        let heading = match &self.site {
            Some(site) => format!("{} at {}", self.title, site),
            None => self.title.clone(),
        };

        format!(
            "🚨 {}!\n📅 Local Time: {}\n📍 Camera: {}\n🤖 Smart Motion Enabled: {}",
            heading,
            display_field(payload, "LocaleTime"),
            source,
            display_field(payload, "SmartMotionEnable"),
        )
    }
}

impl Default for AlertTemplate {
    fn default() -> Self {
        Self::new("Motion Detected")
    }
}

/// Parse a buffer with the default alert template
pub fn parse(buffer: &str, source: &str) -> Option<String> {
    parse_with_template(buffer, source, &AlertTemplate::default())
}

/// Parse a buffer into a rendered alert message.
///
/// Yields `None` for buffers without a record, for malformed payloads, and for
/// every code/action pair other than `VideoMotion`/`Start`.
pub fn parse_with_template(buffer: &str, source: &str, template: &AlertTemplate) -> Option<String> {
    let record = match scan_record(buffer) {
        Ok(record) => record,
        Err(ScanError::NoRecord) => {
            debug!("No event record in buffer from {}", source);
            return None;
        }
        Err(ScanError::UnterminatedPayload) => {
            error!("Unterminated event payload from {}", source);
            return None;
        }
    };

    debug!(
        "Parsed event from {}: code={}, action={}, index={}",
        source, record.code, record.action, record.index
    );

    let payload: Value = match serde_json::from_str(record.data) {
        Ok(value) => value,
        Err(e) => {
            error!("Failed to parse JSON data from {}: {}", source, e);
            return None;
        }
    };

    if record.code != MOTION_CODE || record.action != START_ACTION {
        debug!(
            "Ignoring {}/{} event from {}",
            record.code, record.action, source
        );
        return None;
    }

    Some(template.render(source, &payload))
}

/// Locate the first event record in `buffer`
pub fn scan_record(buffer: &str) -> Result<RawEventRecord<'_>, ScanError> {
    let mut search_from = 0;

    // A stray "Code=" without the rest of the sequence must not hide a later
    // complete record.
    while let Some(offset) = buffer[search_from..].find(CODE_MARKER) {
        let code_start = search_from + offset + CODE_MARKER.len();
        match scan_fields(buffer, code_start) {
            Some(fields) => return fields,
            None => search_from = code_start,
        }
    }

    Err(ScanError::NoRecord)
}

fn scan_fields(buffer: &str, code_start: usize) -> Option<Result<RawEventRecord<'_>, ScanError>> {
    let (code, action_start) = field_until(buffer, code_start, ACTION_MARKER)?;
    let (action, index_start) = field_until(buffer, action_start, INDEX_MARKER)?;
    let (index, data_start) = field_until(buffer, index_start, DATA_MARKER)?;

    let rest = &buffer[data_start..];
    let trimmed = rest.trim_start();
    if !trimmed.starts_with('{') {
        return Some(Err(ScanError::UnterminatedPayload));
    }
    let object_start = data_start + (rest.len() - trimmed.len());

    Some(match matching_brace(&buffer[object_start..]) {
        Some(len) => Ok(RawEventRecord {
            code: code.trim(),
            action: action.trim(),
            index: index.trim(),
            data: &buffer[object_start..object_start + len],
        }),
        None => Err(ScanError::UnterminatedPayload),
    })
}

/// Token from `start` up to `marker`, and the offset just past the marker.
/// Tokens never span lines or contain `;`.
fn field_until<'a>(buffer: &'a str, start: usize, marker: &str) -> Option<(&'a str, usize)> {
    let end = start + buffer[start..].find(marker)?;
    let token = &buffer[start..end];
    if token.contains(['\n', ';']) {
        return None;
    }
    Some((token, end + marker.len()))
}

/// Byte length of the JSON object at the start of `text`, closing brace
/// included. Braces inside string literals do not count.
fn matching_brace(text: &str) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, c) in text.char_indices() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }

        match c {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(i + c.len_utf8());
                }
            }
            _ => {}
        }
    }

    None
}

fn display_field(payload: &Value, key: &str) -> String {
    match payload.get(key) {
        None | Some(Value::Null) => UNKNOWN.to_string(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MOTION_START: &str = "--myboundary\n\
        Content-Type: text/plain\n\
        Content-Length: 97\n\
        Code=VideoMotion;action=Start;index=0;data={\n\
        \"LocaleTime\" : \"2024-11-02 14:03:11\",\n\
        \"SmartMotionEnable\" : false,\n\
        \"RegionName\" : [ \"Region1\" ]\n\
        }\n\
        --myboundary\n";

    #[test]
    fn test_motion_start_renders_alert() {
        let message = parse(MOTION_START, "FMCG wall").unwrap();

        assert!(message.contains("FMCG wall"));
        assert!(message.contains("📅 Local Time: 2024-11-02 14:03:11"));
        assert!(message.contains("🤖 Smart Motion Enabled: false"));
        assert!(message.starts_with("🚨 Motion Detected!"));
    }

    #[test]
    fn test_site_name_in_title() {
        let template = AlertTemplate::new("Motion Detected").with_site("galaxy store");
        let message = parse_with_template(MOTION_START, "Gate", &template).unwrap();

        assert!(message.starts_with("🚨 Motion Detected at galaxy store!"));
    }

    #[test]
    fn test_blank_site_name_is_ignored() {
        let template = AlertTemplate::new("Motion").with_site("  ");
        assert!(template.site.is_none());
    }

    #[test]
    fn test_missing_fields_render_unknown() {
        let buffer = "Code=VideoMotion;action=Start;index=1;data={}\n--myboundary\n";
        let message = parse(buffer, "Back yard").unwrap();

        assert!(message.contains("Local Time: Unknown"));
        assert!(message.contains("Smart Motion Enabled: Unknown"));
        assert!(message.contains("Back yard"));
    }

    #[test]
    fn test_other_code_action_pairs_yield_nothing() {
        for (code, action) in [
            ("VideoMotion", "Stop"),
            ("AlarmLocal", "Start"),
            ("VideoBlind", "Pulse"),
        ] {
            let buffer = format!(
                "Code={};action={};index=0;data={{\"LocaleTime\":\"x\"}}\n--myboundary\n",
                code, action
            );
            assert_eq!(parse(&buffer, "Cam"), None, "{}/{}", code, action);
        }
    }

    #[test]
    fn test_heartbeat_buffer_yields_nothing() {
        let buffer = "--myboundary\nContent-Type: text/plain\nContent-Length: 9\nHeartbeat\n";
        assert_eq!(scan_record(buffer), Err(ScanError::NoRecord));
        assert_eq!(parse(buffer, "Cam"), None);
    }

    #[test]
    fn test_malformed_json_yields_nothing() {
        let buffer = "Code=VideoMotion;action=Start;index=0;data={\"LocaleTime\": }\n--myboundary\n";
        assert_eq!(parse(buffer, "Cam"), None);
    }

    #[test]
    fn test_unterminated_payload_yields_nothing() {
        let buffer = "Code=VideoMotion;action=Start;index=0;data={\"a\": {\"b\": 1}\n--myboundary\n";
        assert_eq!(scan_record(buffer), Err(ScanError::UnterminatedPayload));
        assert_eq!(parse(buffer, "Cam"), None);
    }

    #[test]
    fn test_nested_braces_and_braces_in_strings() {
        let buffer = "Code=VideoMotion;action=Start;index=3;data={\"Object\":{\"Rect\":[1,2]},\
            \"LocaleTime\":\"a } b { \\\"c\\\"\"}\n--myboundary\n{trailing}";
        let record = scan_record(buffer).unwrap();

        assert_eq!(record.code, "VideoMotion");
        assert_eq!(record.action, "Start");
        assert_eq!(record.index, "3");
        assert!(record.data.starts_with('{'));
        assert!(record.data.ends_with("\"}"));

        let message = parse(buffer, "Cam").unwrap();
        assert!(message.contains("Local Time: a } b { \"c\""));
    }

    #[test]
    fn test_payload_containing_boundary_token() {
        let buffer = "Code=VideoMotion;action=Start;index=0;data={\"Note\":\"--myboundary\",\"LocaleTime\":\"t\"}\n--myboundary\n";
        let message = parse(buffer, "Cam").unwrap();
        assert!(message.contains("Local Time: t"));
    }

    #[test]
    fn test_stray_code_marker_before_record() {
        let buffer = "X-Code=none\nCode=VideoMotion;action=Start;index=0;data={\"LocaleTime\":\"t\"}\n";
        let record = scan_record(buffer).unwrap();
        assert_eq!(record.code, "VideoMotion");
    }

    #[test]
    fn test_matching_brace() {
        assert_eq!(matching_brace("{}"), Some(2));
        assert_eq!(matching_brace("{\"a\":{\"b\":\"}\"}} tail"), Some(15));
        assert_eq!(matching_brace("{\"a\":1"), None);
        assert_eq!(matching_brace("}{"), None);
    }

    #[test]
    fn test_first_of_several_records_wins() {
        let buffer = "Code=VideoMotion;action=Stop;index=0;data={}\n\
            Code=VideoMotion;action=Start;index=0;data={}\n";
        let record = scan_record(buffer).unwrap();

        assert_eq!(record.action, "Stop");
        assert_eq!(parse(buffer, "Cam"), None);
    }

    #[test]
    fn test_non_string_values_render_as_json() {
        let buffer = "Code=VideoMotion;action=Start;index=0;data={\"LocaleTime\":17,\"SmartMotionEnable\":true}";
        let message = parse(buffer, "Cam").unwrap();

        assert!(message.contains("Local Time: 17"));
        assert!(message.contains("Smart Motion Enabled: true"));
    }
}
