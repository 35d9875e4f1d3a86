//! Two-stage line parser: structured JSON first, legacy pipe format second.

use crate::event::{LifecycleEvent, WireMessage};
use nudge_core::{SessionId, SessionState};

/// Parses one line into a lifecycle event.
///
/// Returns `None` for empty/whitespace-only lines. Every other line yields
/// an event; undecodable input becomes [`LifecycleEvent::Unknown`] so the
/// caller can log it without the server ever hard-failing on bad input.
///
/// The type tag is trusted, the payload is not: a line that declares a known
/// type but is missing that type's required fields is `Unknown`, not an
/// error.
pub fn parse(line: &str) -> Option<LifecycleEvent> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return None;
    }

    // Structured format first; legacy only when the line is not JSON at all.
    if let Ok(wire) = serde_json::from_str::<WireMessage>(trimmed) {
        return Some(from_structured(wire, trimmed));
    }

    Some(parse_legacy(trimmed))
}

fn from_structured(wire: WireMessage, raw: &str) -> LifecycleEvent {
    let unknown = || LifecycleEvent::Unknown {
        raw: raw.to_string(),
    };

    let Some(session_id) = wire.session_id else {
        return unknown();
    };

    match wire.msg_type.as_str() {
        "START" => {
            let (Some(tool), Some(project_name), Some(pid)) =
                (wire.tool, wire.project_name, wire.pid)
            else {
                return unknown();
            };
            LifecycleEvent::Start {
                session_id: SessionId::new(session_id),
                tool,
                project_name,
                pid,
            }
        }

        "STATE" => {
            let Some(state) = wire.state.as_deref().and_then(SessionState::from_wire) else {
                return unknown();
            };
            LifecycleEvent::StateChange {
                session_id: SessionId::new(session_id),
                state,
                details: wire.details.unwrap_or_default(),
                working_duration_secs: wire.working_duration_secs,
            }
        }

        "END" => {
            let Some(exit_code) = wire.exit_code else {
                return unknown();
            };
            LifecycleEvent::End {
                session_id: SessionId::new(session_id),
                exit_code,
            }
        }

        _ => unknown(),
    }
}

/// Legacy pipe-delimited format: `TYPE|field1|field2|...`.
///
/// Layouts: `START|id|tool|project|pid`, `STATE|id|state|details[|secs]`,
/// `END|id|exitCode`. A literal `|` inside a field is escaped as `\|`.
fn parse_legacy(trimmed: &str) -> LifecycleEvent {
    let unknown = || LifecycleEvent::Unknown {
        raw: trimmed.to_string(),
    };

    let parts = split_unescaped(trimmed);

    let Some(tag) = parts.first() else {
        return unknown();
    };

    match tag.as_str() {
        "START" => {
            if parts.len() < 5 {
                return unknown();
            }
            let Ok(pid) = parts[4].parse::<u32>() else {
                return unknown();
            };
            LifecycleEvent::Start {
                session_id: SessionId::new(parts[1].as_str()),
                tool: parts[2].clone(),
                project_name: parts[3].clone(),
                pid,
            }
        }

        "STATE" => {
            if parts.len() < 4 {
                return unknown();
            }
            let Some(state) = SessionState::from_wire(&parts[2]) else {
                return unknown();
            };
            // A trailing duration field is advisory; a bad value degrades
            // to "no duration" rather than poisoning the whole event.
            let working_duration_secs = parts.get(4).and_then(|s| s.parse().ok());
            LifecycleEvent::StateChange {
                session_id: SessionId::new(parts[1].as_str()),
                state,
                details: parts[3].clone(),
                working_duration_secs,
            }
        }

        "END" => {
            if parts.len() < 3 {
                return unknown();
            }
            let Ok(exit_code) = parts[2].parse::<i32>() else {
                return unknown();
            };
            LifecycleEvent::End {
                session_id: SessionId::new(parts[1].as_str()),
                exit_code,
            }
        }

        _ => unknown(),
    }
}

/// Splits on unescaped `|`, resolving `\|` to a literal `|` in place.
fn split_unescaped(s: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut chars = s.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '\\' if chars.peek() == Some(&'|') => {
                chars.next();
                current.push('|');
            }
            '|' => fields.push(std::mem::take(&mut current)),
            _ => current.push(c),
        }
    }
    fields.push(current);
    fields
}
