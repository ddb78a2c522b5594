//! vCard text parser

use super::{Param, Property, VCard};
use crate::error::{ContactsError, Result};

/// Parse exactly one card
pub fn parse_vcard(input: &str) -> Result<VCard> {
    let mut cards = parse_vcards(input)?;
    match cards.len() {
        1 => Ok(cards.remove(0)),
        0 => Err(ContactsError::Parse("no BEGIN:VCARD found".to_string())),
        n => Err(ContactsError::Parse(format!("expected one card, found {}", n))),
    }
}

/// Parse a stream that may hold several cards back to back
pub fn parse_vcards(input: &str) -> Result<Vec<VCard>> {
    let mut cards = Vec::new();
    let mut current: Option<Vec<Property>> = None;

    for (lineno, line) in unfold(input).into_iter().enumerate() {
        if line.trim().is_empty() {
            continue;
        }

        if is_marker(&line, "BEGIN") {
            if current.is_some() {
                return Err(ContactsError::Parse(format!(
                    "line {}: nested BEGIN:VCARD",
                    lineno + 1
                )));
            }
            current = Some(Vec::new());
            continue;
        }

        if is_marker(&line, "END") {
            let properties = current.take().ok_or_else(|| {
                ContactsError::Parse(format!("line {}: END:VCARD without BEGIN", lineno + 1))
            })?;
            cards.push(VCard::from_properties(properties));
            continue;
        }

        let properties = current.as_mut().ok_or_else(|| {
            ContactsError::Parse(format!("line {}: content outside of a card", lineno + 1))
        })?;
        let property = parse_content_line(&line)
            .map_err(|e| ContactsError::Parse(format!("line {}: {}", lineno + 1, e)))?;
        properties.push(property);
    }

    if current.is_some() {
        return Err(ContactsError::Parse("missing END:VCARD".to_string()));
    }

    Ok(cards)
}

fn is_marker(line: &str, marker: &str) -> bool {
    match line.split_once(':') {
        Some((name, value)) => {
            name.trim().eq_ignore_ascii_case(marker) && value.trim().eq_ignore_ascii_case("VCARD")
        }
        None => false,
    }
}

/// Join folded continuation lines
fn unfold(input: &str) -> Vec<String> {
    let mut lines: Vec<String> = Vec::new();
    for raw in input.split('\n') {
        let raw = raw.strip_suffix('\r').unwrap_or(raw);
        match raw.chars().next() {
            Some(' ') | Some('\t') if !lines.is_empty() => {
                if let Some(last) = lines.last_mut() {
                    last.push_str(&raw[1..]);
                }
            }
            _ => lines.push(raw.to_string()),
        }
    }
    lines
}

/// Parse `[group.]NAME[;PARAM...]:value`
fn parse_content_line(line: &str) -> std::result::Result<Property, String> {
    let (head, value) = split_head(line).ok_or_else(|| "missing ':' separator".to_string())?;

    let mut segments = split_outside_quotes(head, ';').into_iter();
    let full_name = segments.next().unwrap_or_default().trim();
    if full_name.is_empty() {
        return Err("empty property name".to_string());
    }

    let (group, name) = match full_name.split_once('.') {
        Some((group, name)) if !group.is_empty() && !name.is_empty() => {
            (Some(group.to_string()), name.to_string())
        }
        _ => (None, full_name.to_string()),
    };

    let params = segments.filter(|s| !s.trim().is_empty()).map(parse_param).collect();

    Ok(Property {
        group,
        name,
        params,
        value: value.to_string(),
    })
}

/// Split at the first colon that is not inside a quoted parameter value
fn split_head(line: &str) -> Option<(&str, &str)> {
    let mut in_quotes = false;
    for (idx, c) in line.char_indices() {
        match c {
            '"' => in_quotes = !in_quotes,
            ':' if !in_quotes => return Some((&line[..idx], &line[idx + 1..])),
            _ => {}
        }
    }
    None
}

fn split_outside_quotes(input: &str, sep: char) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut in_quotes = false;
    let mut start = 0;
    for (idx, c) in input.char_indices() {
        if c == '"' {
            in_quotes = !in_quotes;
        } else if c == sep && !in_quotes {
            parts.push(&input[start..idx]);
            start = idx + c.len_utf8();
        }
    }
    parts.push(&input[start..]);
    parts
}

fn parse_param(segment: &str) -> Param {
    let segment = segment.trim();
    match segment.split_once('=') {
        Some((name, values)) => Param {
            name: name.trim().to_ascii_uppercase(),
            values: split_outside_quotes(values, ',')
                .into_iter()
                .map(|v| v.trim().trim_matches('"').to_string())
                .collect(),
        },
        // vCard 2.1 bare parameters: `;HOME`, `;BASE64`
        None => {
            let upper = segment.to_ascii_uppercase();
            match upper.as_str() {
                "BASE64" | "B" | "QUOTED-PRINTABLE" | "8BIT" => Param::new("ENCODING", segment),
                _ => Param::new("TYPE", segment),
            }
        }
    }
}
