//! vCard serializer

use super::{Param, Property, VCard};
use std::fmt;

/// Maximum octets per physical line before folding
const FOLD_WIDTH: usize = 75;

impl VCard {
    /// Serialize to the interchange text format (CRLF line endings, folded)
    pub fn serialize(&self) -> String {
        let mut out = String::new();
        out.push_str("BEGIN:VCARD\r\n");
        for property in &self.properties {
            fold_into(&mut out, &content_line(property));
        }
        out.push_str("END:VCARD\r\n");
        out
    }
}

impl fmt::Display for VCard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.serialize())
    }
}

fn content_line(property: &Property) -> String {
    let mut line = String::new();
    if let Some(group) = &property.group {
        line.push_str(group);
        line.push('.');
    }
    line.push_str(&property.name);
    for param in &property.params {
        line.push(';');
        write_param(&mut line, param);
    }
    line.push(':');
    line.push_str(&property.value);
    line
}

fn write_param(out: &mut String, param: &Param) {
    out.push_str(&param.name);
    out.push('=');
    let values: Vec<String> = param
        .values
        .iter()
        .map(|v| {
            if v.contains([':', ';', ',']) {
                format!("\"{}\"", v.replace('"', ""))
            } else {
                v.clone()
            }
        })
        .collect();
    out.push_str(&values.join(","));
}

/// Append a logical line, folding at [`FOLD_WIDTH`] octets on char boundaries
fn fold_into(out: &mut String, line: &str) {
    let mut width = 0;
    for c in line.chars() {
        let len = c.len_utf8();
        if width + len > FOLD_WIDTH {
            out.push_str("\r\n ");
            width = 1;
        }
        out.push(c);
        width += len;
    }
    out.push_str("\r\n");
}
