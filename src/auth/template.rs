//! Argument templates for the custom command authorizer.
//!
//! Arguments may reference `{{.Endpoint}}` and `{{.TenantID}}`. Templates are
//! parsed once; rendering cannot fail.

use std::sync::OnceLock;

use regex::Regex;

use crate::{Error, Result};

fn field_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^-?\s*\.([A-Za-z_][A-Za-z0-9_]*)\s*-?$").expect("valid field regex")
    })
}

/// Values available to a template.
#[derive(Debug, Clone, Copy)]
pub struct TemplateContext<'a> {
    pub endpoint: &'a str,
    pub tenant_id: &'a str,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    Endpoint,
    TenantId,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Text(String),
    Field(Field),
}

/// A parsed argv template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArgsTemplate {
    args: Vec<Vec<Segment>>,
}

impl ArgsTemplate {
    pub fn parse<S: AsRef<str>>(argv: &[S]) -> Result<Self> {
        let args = argv
            .iter()
            .enumerate()
            .map(|(index, arg)| parse_arg(arg.as_ref(), index))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { args })
    }

    pub fn render(&self, context: &TemplateContext<'_>) -> Vec<String> {
        self.args
            .iter()
            .map(|segments| {
                segments
                    .iter()
                    .map(|segment| match segment {
                        Segment::Text(text) => text.as_str(),
                        Segment::Field(Field::Endpoint) => context.endpoint,
                        Segment::Field(Field::TenantId) => context.tenant_id,
                    })
                    .collect()
            })
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.args.is_empty()
    }
}

fn parse_arg(arg: &str, index: usize) -> Result<Vec<Segment>> {
    let mut segments = Vec::new();
    let mut rest = arg;

    while let Some(start) = rest.find("{{") {
        if start > 0 {
            segments.push(Segment::Text(rest[..start].to_string()));
        }
        let after_open = &rest[start + 2..];
        let end = after_open.find("}}").ok_or_else(|| {
            Error::Template(format!("argument {} ({:?}): unclosed action", index, arg))
        })?;
        segments.push(Segment::Field(parse_action(&after_open[..end], arg, index)?));
        rest = &after_open[end + 2..];
    }

    if !rest.is_empty() {
        segments.push(Segment::Text(rest.to_string()));
    }
    Ok(segments)
}

fn parse_action(action: &str, arg: &str, index: usize) -> Result<Field> {
    let captures = field_regex().captures(action).ok_or_else(|| {
        Error::Template(format!(
            "argument {} ({:?}): unexpected {:?} in action, expected a field such as .TenantID",
            index,
            arg,
            action.trim()
        ))
    })?;

    match &captures[1] {
        "Endpoint" => Ok(Field::Endpoint),
        "TenantID" => Ok(Field::TenantId),
        other => Err(Error::Template(format!(
            "argument {} ({:?}): unknown field .{}, expected .Endpoint or .TenantID",
            index, arg, other
        ))),
    }
}
