//! Contract boundary for untrusted specialist output
//!
//! Specialist model output is free text. This module is where that text
//! becomes a validated `SpecialistResult` (or a tool directive); any parse
//! or schema failure surfaces as `ContractViolation`, never a crash.

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

use crate::error::AssessorError;
use crate::models::{Domain, EventDetails, Intent, SpecialistResult, TimeWindow, WriteOp};
use crate::Result;

const MSG_BOTH_FOLLOWUPS: &str =
    "`esclarecer` and `acompanhamento` must not both be populated";

/// One specialist model turn: a tool directive or the final contract object.
#[derive(Debug, Clone)]
pub enum SpecialistTurn {
    ToolCall { name: String, args: Value },
    Final(SpecialistResult),
}

fn violation(message: impl Into<String>) -> AssessorError {
    AssessorError::ContractViolation(message.into())
}

/// Strip a markdown ```json fence wrapping, if present.
pub fn strip_code_fences(raw: &str) -> &str {
    raw.trim()
        .trim_start_matches("```json")
        .trim_start_matches("```")
        .trim_end_matches("```")
        .trim()
}

/// Decode one specialist turn. An object with a `tool` key is a tool
/// directive; anything else must be the final contract.
pub fn decode_specialist_turn(expected: Domain, raw: &str) -> Result<SpecialistTurn> {
    let cleaned = strip_code_fences(raw);

    let value: Value = serde_json::from_str(cleaned).map_err(|e| {
        violation(format!(
            "specialist output is not valid JSON: {} | raw={}",
            e,
            raw.trim()
        ))
    })?;

    let object = value
        .as_object()
        .ok_or_else(|| violation("specialist output is not a JSON object"))?;

    if let Some(tool) = object.get("tool") {
        let name = tool
            .as_str()
            .ok_or_else(|| violation("tool directive field `tool` must be a string"))?
            .to_string();
        let args = object
            .get("args")
            .cloned()
            .unwrap_or_else(|| Value::Object(Map::new()));
        if !args.is_object() {
            return Err(violation("tool directive field `args` must be an object"));
        }
        return Ok(SpecialistTurn::ToolCall { name, args });
    }

    Ok(SpecialistTurn::Final(validate_result(expected, object)?))
}

/// Decode and validate a final specialist contract from raw text.
pub fn decode_specialist_result(expected: Domain, raw: &str) -> Result<SpecialistResult> {
    let cleaned = strip_code_fences(raw);

    let value: Value = serde_json::from_str(cleaned).map_err(|e| {
        violation(format!("specialist result is not valid JSON: {}", e))
    })?;

    let object = value
        .as_object()
        .ok_or_else(|| violation("specialist result is not a JSON object"))?;

    validate_result(expected, object)
}

fn validate_result(expected: Domain, object: &Map<String, Value>) -> Result<SpecialistResult> {
    let domain_label = required_str(object, "dominio")?;
    let domain = Domain::parse(domain_label)
        .ok_or_else(|| violation(format!("unknown domain `{}`", domain_label)))?;
    if domain != expected {
        return Err(violation(format!(
            "specialist for `{}` returned domain `{}`",
            expected, domain
        )));
    }

    let intent_label = required_str(object, "intencao")?;
    let intent = Intent::for_domain(domain, intent_label).ok_or_else(|| {
        violation(format!(
            "intent `{}` is not valid for domain `{}`",
            intent_label, domain
        ))
    })?;

    let reply = required_str(object, "resposta")?.trim().to_string();
    if reply.is_empty() {
        return Err(violation("field `resposta` must not be empty"));
    }

    // `recomendacao` may be empty, but the key must be present.
    let recommendation = required_str(object, "recomendacao")?.trim().to_string();

    let followup = optional_str(object, "acompanhamento")?;
    let clarify_question = optional_str(object, "esclarecer")?;
    if followup.is_some() && clarify_question.is_some() {
        return Err(violation(MSG_BOTH_FOLLOWUPS));
    }

    let time_window = match object.get("janela_tempo") {
        Some(value) => Some(decode_time_window(value)?),
        None => None,
    };

    let event = match object.get("evento") {
        Some(value) => Some(decode_event(value)?),
        None => None,
    };

    let write_op = match object.get("escrita") {
        Some(value) => Some(
            serde_json::from_value::<WriteOp>(value.clone())
                .map_err(|e| violation(format!("invalid `escrita` object: {}", e)))?,
        ),
        None => None,
    };

    let metrics = match object.get("indicadores") {
        Some(value) => Some(decode_metrics(value)?),
        None => None,
    };

    Ok(SpecialistResult {
        domain,
        intent,
        reply,
        recommendation,
        followup,
        clarify_question,
        time_window,
        event,
        write_op,
        metrics,
    })
}

fn required_str<'a>(object: &'a Map<String, Value>, key: &str) -> Result<&'a str> {
    object
        .get(key)
        .ok_or_else(|| violation(format!("missing required field `{}`", key)))?
        .as_str()
        .ok_or_else(|| violation(format!("field `{}` must be a string", key)))
}

fn optional_str(object: &Map<String, Value>, key: &str) -> Result<Option<String>> {
    match object.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                Ok(None)
            } else {
                Ok(Some(trimmed.to_string()))
            }
        }
        Some(_) => Err(violation(format!("field `{}` must be a string", key))),
    }
}

fn decode_time_window(value: &Value) -> Result<TimeWindow> {
    let window: TimeWindow = serde_json::from_value(value.clone())
        .map_err(|e| violation(format!("invalid `janela_tempo` object: {}", e)))?;

    for (key, bound) in [("de", &window.from), ("ate", &window.to)] {
        if !is_well_formed_date_or_datetime(bound) {
            return Err(violation(format!(
                "`janela_tempo.{}` is not YYYY-MM-DD or YYYY-MM-DDTHH:MM: `{}`",
                key, bound
            )));
        }
    }

    Ok(window)
}

fn decode_event(value: &Value) -> Result<EventDetails> {
    let event: EventDetails = serde_json::from_value(value.clone())
        .map_err(|e| violation(format!("invalid `evento` object: {}", e)))?;

    if let Some(date) = &event.date {
        if NaiveDate::parse_from_str(date, "%Y-%m-%d").is_err() {
            return Err(violation(format!(
                "`evento.data` is not YYYY-MM-DD: `{}`",
                date
            )));
        }
    }
    for (key, time) in [("inicio", &event.start), ("fim", &event.end)] {
        if let Some(time) = time {
            if NaiveTime::parse_from_str(time, "%H:%M").is_err() {
                return Err(violation(format!(
                    "`evento.{}` is not HH:MM: `{}`",
                    key, time
                )));
            }
        }
    }

    Ok(event)
}

fn decode_metrics(value: &Value) -> Result<BTreeMap<String, f64>> {
    let object = value
        .as_object()
        .ok_or_else(|| violation("`indicadores` must be an object"))?;

    let mut metrics = BTreeMap::new();
    for (key, entry) in object {
        let number = entry.as_f64().ok_or_else(|| {
            violation(format!("`indicadores.{}` must be numeric", key))
        })?;
        metrics.insert(key.clone(), number);
    }
    Ok(metrics)
}

fn is_well_formed_date_or_datetime(s: &str) -> bool {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").is_ok()
        || NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M").is_ok()
}
