use std::fmt::Write as _;

use serde::{Deserialize, Serialize};

use super::arena::{GeneArena, GeneId};
use super::kind::GeneKind;
use super::utils::padded;
use crate::error::Result;
use crate::types::OutputFormat;

/// Escaping applied when a value is embedded in a given representation.
/// Modes without a dedicated escaping pass the raw string through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EscapeMode {
    Uri,
    Sql,
    Assertion,
    Expectation,
    Json,
    Text,
    Xml,
    Body,
    None,
    XWwwFormUrlencoded,
    BooleanSelectionMode,
    BooleanSelectionNestedMode,
    GqlInputMode,
    GqlInputArrayMode,
    BooleanSelectionUnionInterfaceObjectMode,
    BooleanSelectionUnionInterfaceObjectFieldsMode,
    GqlStrValue,
    GqlNoneMode,
}

impl EscapeMode {
    pub fn is_graphql(&self) -> bool {
        matches!(
            self,
            EscapeMode::BooleanSelectionMode
                | EscapeMode::BooleanSelectionNestedMode
                | EscapeMode::GqlInputMode
                | EscapeMode::GqlInputArrayMode
                | EscapeMode::BooleanSelectionUnionInterfaceObjectMode
                | EscapeMode::BooleanSelectionUnionInterfaceObjectFieldsMode
                | EscapeMode::GqlStrValue
        )
    }

    pub fn is_boolean_selection(&self) -> bool {
        matches!(
            self,
            EscapeMode::BooleanSelectionMode
                | EscapeMode::BooleanSelectionNestedMode
                | EscapeMode::BooleanSelectionUnionInterfaceObjectMode
                | EscapeMode::BooleanSelectionUnionInterfaceObjectFieldsMode
        )
    }
}

pub fn apply_escapes(s: &str, mode: EscapeMode, format: OutputFormat) -> String {
    match mode {
        EscapeMode::Uri => {
            let ret = s.replace('\\', "%5C").replace('"', "%22").replace('\n', "%0A");
            if format.is_kotlin() {
                ret.replace('$', "%24")
            } else {
                ret
            }
        }
        EscapeMode::Sql => {
            let ret = s.replace('\\', "\\\\").replace('"', "\\\\\"");
            kotlin_dollar(ret, format)
        }
        EscapeMode::Assertion | EscapeMode::Text => kotlin_dollar(escape_control(s), format),
        EscapeMode::Expectation => {
            let ret = s.replace('\\', "\\\\\\\\").replace('"', "\\\"").replace('\n', "\\n");
            kotlin_dollar(ret, format)
        }
        EscapeMode::Json => escape_control(s),
        EscapeMode::Body => kotlin_dollar(escape_control(s), format).replace("\\\\u", "\\u"),
        EscapeMode::Xml => escape_xml(s),
        EscapeMode::GqlStrValue => s.replace('"', "\\\\\""),
        EscapeMode::None
        | EscapeMode::XWwwFormUrlencoded
        | EscapeMode::BooleanSelectionMode
        | EscapeMode::BooleanSelectionNestedMode
        | EscapeMode::BooleanSelectionUnionInterfaceObjectMode
        | EscapeMode::BooleanSelectionUnionInterfaceObjectFieldsMode
        | EscapeMode::GqlNoneMode
        | EscapeMode::GqlInputArrayMode
        | EscapeMode::GqlInputMode => s.to_string(),
    }
}

fn escape_control(s: &str) -> String {
    s.replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace('\n', "\\n")
        .replace('\r', "\\r")
        .replace('\u{8}', "\\b")
        .replace('\t', "\\t")
}

fn kotlin_dollar(s: String, format: OutputFormat) -> String {
    if format.is_kotlin() {
        s.replace('$', "\\$")
    } else {
        s
    }
}

fn escape_xml(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            c => out.push(c),
        }
    }
    out
}

fn form_encode(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for b in s.bytes() {
        match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'*' => out.push(b as char),
            b' ' => out.push('+'),
            _ => {
                let _ = write!(out, "%{:02X}", b);
            }
        }
    }
    out
}

/// Value of `id` with no quoting and no escaping
pub fn raw_value(arena: &GeneArena, id: GeneId) -> Result<String> {
    print(arena, id, None, None)
}

/// Render the value of `id` for embedding in a test.
///
/// With `format == None` text values are neither quoted nor escaped.
pub fn print(
    arena: &GeneArena,
    id: GeneId,
    mode: Option<EscapeMode>,
    format: Option<OutputFormat>,
) -> Result<String> {
    render(arena, id, mode, format, format.is_some())
}

fn render(
    arena: &GeneArena,
    id: GeneId,
    mode: Option<EscapeMode>,
    format: Option<OutputFormat>,
    quoted: bool,
) -> Result<String> {
    let node = arena.get(id)?;
    let out = match &node.kind {
        GeneKind::Integer(g) => g.value.to_string(),
        GeneKind::Long(g) => g.value.to_string(),
        GeneKind::Double(g) => {
            if g.is_float {
                (g.value as f32).to_string()
            } else {
                g.value.to_string()
            }
        }
        GeneKind::Boolean(g) => g.value.to_string(),
        GeneKind::String(g) => text(g.current(), mode, format, quoted),
        GeneKind::Enum(g) => {
            if mode.map(|m| m.is_graphql()).unwrap_or(false) {
                g.current().to_string()
            } else {
                text(g.current(), mode, format, quoted)
            }
        }
        GeneKind::Date(d) => {
            let s = format!(
                "{}-{}-{}",
                padded(arena.int_value(d.year)?, 4),
                padded(arena.int_value(d.month)?, 2),
                padded(arena.int_value(d.day)?, 2)
            );
            text(&s, mode, format, quoted)
        }
        GeneKind::Time(t) => {
            let s = format!(
                "{}:{}:{}",
                padded(arena.int_value(t.hour)?, 2),
                padded(arena.int_value(t.minute)?, 2),
                padded(arena.int_value(t.second)?, 2)
            );
            text(&s, mode, format, quoted)
        }
        GeneKind::Object(o) => match mode {
            Some(EscapeMode::Xml) => {
                let mut out = String::new();
                for f in &o.fields {
                    if !is_present(arena, *f)? {
                        continue;
                    }
                    let name = arena.name(*f)?;
                    let value = render(arena, *f, mode, format, false)?;
                    let _ = write!(out, "<{}>{}</{}>", name, value, name);
                }
                out
            }
            Some(EscapeMode::XWwwFormUrlencoded) => {
                let mut parts = Vec::new();
                for f in &o.fields {
                    if !is_present(arena, *f)? {
                        continue;
                    }
                    let value = render(arena, *f, mode, None, false)?;
                    parts.push(format!("{}={}", form_encode(arena.name(*f)?), form_encode(&value)));
                }
                parts.join("&")
            }
            Some(m) if m.is_boolean_selection() => {
                let mut selected = Vec::new();
                for f in &o.fields {
                    if let Some(s) = selection(arena, *f, m)? {
                        selected.push(s);
                    }
                }
                format!("{{{}}}", selected.join(","))
            }
            Some(EscapeMode::GqlInputMode) | Some(EscapeMode::GqlInputArrayMode) => {
                let mut parts = Vec::new();
                for f in &o.fields {
                    if !is_present(arena, *f)? {
                        continue;
                    }
                    let value = render(arena, *f, Some(EscapeMode::GqlInputMode), format, true)?;
                    parts.push(format!("{}:{}", arena.name(*f)?, value));
                }
                format!("{{{}}}", parts.join(","))
            }
            _ => {
                let child_mode = mode.or(Some(EscapeMode::Json));
                let mut parts = Vec::new();
                for f in &o.fields {
                    if !is_present(arena, *f)? {
                        continue;
                    }
                    let value = render(arena, *f, child_mode, format, true)?;
                    parts.push(format!("\"{}\":{}", arena.name(*f)?, value));
                }
                format!("{{{}}}", parts.join(","))
            }
        },
        GeneKind::Array(a) => {
            let child_mode = match mode {
                Some(EscapeMode::GqlInputArrayMode) => Some(EscapeMode::GqlInputMode),
                Some(m) => Some(m),
                None => Some(EscapeMode::Json),
            };
            let mut parts = Vec::new();
            for e in &a.elements {
                parts.push(render(arena, *e, child_mode, format, true)?);
            }
            match mode {
                Some(EscapeMode::Xml) => parts.concat(),
                _ => format!("[{}]", parts.join(",")),
            }
        }
        GeneKind::Tuple(t) => {
            let mut parts = Vec::new();
            for e in &t.elements {
                parts.push(render(arena, *e, mode.or(Some(EscapeMode::Json)), format, true)?);
            }
            format!("[{}]", parts.join(","))
        }
        GeneKind::Optional(o) => {
            if o.is_active {
                render(arena, o.gene, mode, format, quoted)?
            } else {
                "null".to_string()
            }
        }
        GeneKind::Cycle | GeneKind::Limit | GeneKind::SqlAutoIncrement => "null".to_string(),
        GeneKind::SqlPrimaryKey(pk) => render(arena, pk.gene, mode, format, quoted)?,
        GeneKind::SqlForeignKey(fk) => match fk.unique_id_of_primary_key {
            Some(uid) => uid.to_string(),
            None => "null".to_string(),
        },
    };
    Ok(out)
}

fn text(s: &str, mode: Option<EscapeMode>, format: Option<OutputFormat>, quoted: bool) -> String {
    let escaped = match (mode, format) {
        (Some(EscapeMode::Xml), _) => return escape_xml(s),
        (Some(EscapeMode::XWwwFormUrlencoded), _) => return form_encode(s),
        (Some(m), Some(f)) => apply_escapes(s, m, f),
        _ => s.to_string(),
    };
    if quoted {
        format!("\"{}\"", escaped)
    } else {
        escaped
    }
}

fn is_present(arena: &GeneArena, id: GeneId) -> Result<bool> {
    Ok(match arena.kind(id)? {
        GeneKind::Optional(o) => o.is_active,
        GeneKind::Cycle | GeneKind::Limit => false,
        _ => true,
    })
}

/// Field of a boolean-selection object, `None` when not selected
fn selection(arena: &GeneArena, id: GeneId, mode: EscapeMode) -> Result<Option<String>> {
    let name = arena.name(id)?;
    Ok(match arena.kind(id)? {
        GeneKind::Boolean(b) => b.value.then(|| name.to_string()),
        GeneKind::Optional(o) if o.is_active => match arena.kind(o.gene)? {
            GeneKind::Object(_) => Some(format!("{}{}", name, render(arena, o.gene, Some(mode), None, false)?)),
            GeneKind::Boolean(b) => b.value.then(|| name.to_string()),
            _ => Some(name.to_string()),
        },
        // only the last element of a tuple carries the selection
        GeneKind::Tuple(t) => match t.elements.last() {
            Some(last) => match arena.kind(*last)? {
                GeneKind::Boolean(b) => b.value.then(|| name.to_string()),
                GeneKind::Optional(o) if o.is_active => match arena.kind(o.gene)? {
                    GeneKind::Object(_) => {
                        Some(format!("{}{}", name, render(arena, o.gene, Some(mode), None, false)?))
                    }
                    _ => Some(name.to_string()),
                },
                _ => None,
            },
            None => None,
        },
        _ => None,
    })
}

/// A gene is printable unless it would expose a placeholder or an
/// unresolved mandatory reference
pub fn is_printable(arena: &GeneArena, id: GeneId) -> Result<bool> {
    Ok(match arena.kind(id)? {
        GeneKind::Cycle | GeneKind::Limit => false,
        GeneKind::SqlAutoIncrement => false,
        GeneKind::SqlForeignKey(fk) => fk.nullable || fk.unique_id_of_primary_key.is_some(),
        GeneKind::Optional(o) => !o.is_active || is_printable(arena, o.gene)?,
        kind => {
            for c in kind.children() {
                if is_present(arena, c)? && !is_printable(arena, c)? {
                    return Ok(false);
                }
            }
            true
        }
    })
}
