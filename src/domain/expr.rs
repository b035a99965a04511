//! Blocker and trigger declarations
//!
//! A declaration is a whitespace-separated sequence of clauses. Each clause is
//! a finder (which tasks) followed by a condition (blockers) or an action
//! (triggers):
//!
//! ```text
//! BLOCKER: ids(TEST-1 TEST-2) todo?(DONE) children !todo?(|TODO|NEXT)
//! TRIGGER: ids(IMPL-1) todo!(NEXT) parent set-property!(STATUS ready)
//! ```
//!
//! Blocker clauses are AND-combined left to right; trigger clauses run in
//! order. In a blocker, a finder with no condition after it means "every
//! target is DONE or CANCELLED".
//!
//! Parsing is all-or-nothing: any malformed clause fails the whole
//! declaration with the offending fragment and its byte offset.

use std::fmt;
use thiserror::Error;

use super::id::TaskId;
use super::task::{Task, TaskState};

/// Malformed declaration
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message} at byte {offset} ('{fragment}')")]
pub struct ParseError {
    pub message: String,
    pub fragment: String,
    pub offset: usize,
}

impl ParseError {
    fn new(message: impl Into<String>, fragment: impl Into<String>, offset: usize) -> Self {
        Self {
            message: message.into(),
            fragment: fragment.into(),
            offset,
        }
    }

    fn at(message: impl Into<String>, token: &Token<'_>) -> Self {
        Self::new(message, token.text, token.start)
    }
}

/// Selects target tasks relative to the declaring task
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Finder {
    Ids(Vec<TaskId>),
    Children,
    Parent,
    Siblings,
    NextSibling,
    PreviousSibling,
    SelfTask,
    Ancestors,
    Descendants,
}

impl fmt::Display for Finder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Finder::Ids(ids) => {
                let ids: Vec<_> = ids.iter().map(TaskId::as_str).collect();
                write!(f, "ids({})", ids.join(" "))
            }
            Finder::Children => f.write_str("children"),
            Finder::Parent => f.write_str("parent"),
            Finder::Siblings => f.write_str("siblings"),
            Finder::NextSibling => f.write_str("next-sibling"),
            Finder::PreviousSibling => f.write_str("previous-sibling"),
            Finder::SelfTask => f.write_str("self"),
            Finder::Ancestors => f.write_str("ancestors"),
            Finder::Descendants => f.write_str("descendants"),
        }
    }
}

/// Predicate over a target task
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Condition {
    /// Target is in any of the listed states
    InState(Vec<TaskState>),
    HasProperty { name: String, value: Option<String> },
    /// Implicit blocker condition: target is DONE or CANCELLED
    Closed,
    Not(Box<Condition>),
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Condition::InState(states) if states.len() == 1 => write!(f, "todo?({})", states[0]),
            Condition::InState(states) => {
                f.write_str("todo?(")?;
                for state in states {
                    write!(f, "|{}", state)?;
                }
                f.write_str(")")
            }
            Condition::HasProperty { name, value: None } => write!(f, "has-property?({})", name),
            Condition::HasProperty {
                name,
                value: Some(value),
            } => write!(f, "has-property?({} {})", name, value),
            Condition::Closed => f.write_str("closed"),
            Condition::Not(inner) => write!(f, "!{}", inner),
        }
    }
}

/// Mutation applied to a target task
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    SetState(TaskState),
    SetProperty { name: String, value: String },
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::SetState(state) => write!(f, "todo!({})", state),
            Action::SetProperty { name, value } => write!(f, "set-property!({} {})", name, value),
        }
    }
}

/// One finder paired with its condition or action
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Clause<Op> {
    pub finder: Finder,
    pub op: Op,
    /// Source text of the clause, used when reporting it
    pub text: String,
    pub offset: usize,
}

impl<Op> fmt::Display for Clause<Op> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

/// Parsed blocker: all clauses must hold
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Blocker {
    pub clauses: Vec<Clause<Condition>>,
}

/// Parsed trigger: clauses run in order
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Trigger {
    pub clauses: Vec<Clause<Action>>,
}

/// Parse result for both declarations of one task, compiled once at load
#[derive(Debug, Clone, Default)]
pub struct Declarations {
    pub blocker: Option<Result<Blocker, ParseError>>,
    pub trigger: Option<Result<Trigger, ParseError>>,
}

impl Declarations {
    pub fn compile(task: &Task) -> Self {
        Self {
            blocker: task.blocker.as_deref().map(parse_blocker),
            trigger: task.trigger.as_deref().map(parse_trigger),
        }
    }

    pub fn blocker_error(&self) -> Option<&ParseError> {
        self.blocker.as_ref().and_then(|b| b.as_ref().err())
    }

    pub fn trigger_error(&self) -> Option<&ParseError> {
        self.trigger.as_ref().and_then(|t| t.as_ref().err())
    }
}

#[derive(Debug, Clone, Copy)]
struct Token<'a> {
    name: &'a str,
    args: Option<&'a str>,
    /// Full token text including arguments
    text: &'a str,
    start: usize,
    end: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Kind {
    Finder,
    Condition,
    Action,
    Unknown,
}

const FINDERS: &[&str] = &[
    "ids",
    "children",
    "parent",
    "siblings",
    "next-sibling",
    "previous-sibling",
    "self",
    "ancestors",
    "descendants",
];

fn kind_of(token: &Token<'_>) -> Kind {
    let name = token.name;
    if FINDERS.contains(&name) {
        Kind::Finder
    } else if matches!(name.trim_start_matches('!'), "todo?" | "has-property?") {
        Kind::Condition
    } else if matches!(name, "todo!" | "set-property!") {
        Kind::Action
    } else {
        Kind::Unknown
    }
}

fn tokenize(input: &str) -> Result<Vec<Token<'_>>, ParseError> {
    let bytes = input.as_bytes();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < bytes.len() {
        if bytes[i].is_ascii_whitespace() {
            i += 1;
            continue;
        }

        let start = i;
        while i < bytes.len()
            && !bytes[i].is_ascii_whitespace()
            && bytes[i] != b'('
            && bytes[i] != b')'
        {
            i += 1;
        }

        if i == start {
            return Err(ParseError::new(
                format!("unexpected '{}'", bytes[i] as char),
                &input[start..],
                start,
            ));
        }

        let name = &input[start..i];
        let mut args = None;

        if i < bytes.len() && bytes[i] == b'(' {
            let open = i;
            let close = input[open..]
                .find(')')
                .map(|pos| open + pos)
                .ok_or_else(|| ParseError::new("unterminated argument list", &input[start..], start))?;

            args = Some(&input[open + 1..close]);
            i = close + 1;
        }

        tokens.push(Token {
            name,
            args,
            text: &input[start..i],
            start,
            end: i,
        });
    }

    Ok(tokens)
}

fn parse_finder(token: &Token<'_>) -> Result<Finder, ParseError> {
    if token.name == "ids" {
        let args = token
            .args
            .filter(|a| !a.trim().is_empty())
            .ok_or_else(|| ParseError::at("ids() needs at least one task id", token))?;

        let ids = args
            .split_whitespace()
            .map(|s| s.parse::<TaskId>())
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| ParseError::at(e.to_string(), token))?;

        return Ok(Finder::Ids(ids));
    }

    if token.args.is_some() {
        return Err(ParseError::at(
            format!("finder '{}' takes no arguments", token.name),
            token,
        ));
    }

    Ok(match token.name {
        "children" => Finder::Children,
        "parent" => Finder::Parent,
        "siblings" => Finder::Siblings,
        "next-sibling" => Finder::NextSibling,
        "previous-sibling" => Finder::PreviousSibling,
        "self" => Finder::SelfTask,
        "ancestors" => Finder::Ancestors,
        "descendants" => Finder::Descendants,
        other => return Err(ParseError::at(format!("unknown finder '{}'", other), token)),
    })
}

fn parse_state(raw: &str, token: &Token<'_>) -> Result<TaskState, ParseError> {
    raw.trim()
        .parse()
        .map_err(|e: super::task::UnknownState| ParseError::at(e.to_string(), token))
}

fn parse_condition(token: &Token<'_>) -> Result<Condition, ParseError> {
    let (negated, base) = match token.name.strip_prefix('!') {
        Some(rest) => (true, rest),
        None => (false, token.name),
    };

    let args = token
        .args
        .ok_or_else(|| ParseError::at(format!("'{}' needs an argument list", base), token))?;

    let condition = match base {
        "todo?" => {
            let states = args
                .split('|')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(|s| parse_state(s, token))
                .collect::<Result<Vec<_>, _>>()?;

            if states.is_empty() {
                return Err(ParseError::at("todo?() needs at least one state", token));
            }
            Condition::InState(states)
        }
        "has-property?" => {
            let mut parts = args.trim().splitn(2, char::is_whitespace);
            let name = parts
                .next()
                .filter(|n| !n.is_empty())
                .ok_or_else(|| ParseError::at("has-property?() needs a property name", token))?;
            let value = parts.next().map(str::trim).filter(|v| !v.is_empty());

            Condition::HasProperty {
                name: name.to_string(),
                value: value.map(str::to_string),
            }
        }
        other => return Err(ParseError::at(format!("unknown condition '{}'", other), token)),
    };

    Ok(if negated {
        Condition::Not(Box::new(condition))
    } else {
        condition
    })
}

fn parse_action(token: &Token<'_>) -> Result<Action, ParseError> {
    let args = token
        .args
        .ok_or_else(|| ParseError::at(format!("'{}' needs an argument list", token.name), token))?;

    match token.name {
        "todo!" => Ok(Action::SetState(parse_state(args, token)?)),
        "set-property!" => {
            let mut parts = args.trim().splitn(2, char::is_whitespace);
            let name = parts.next().filter(|n| !n.is_empty());
            let value = parts.next().map(str::trim).filter(|v| !v.is_empty());

            match (name, value) {
                (Some(name), Some(value)) => Ok(Action::SetProperty {
                    name: name.to_string(),
                    value: value.to_string(),
                }),
                _ => Err(ParseError::at("set-property!() needs a name and a value", token)),
            }
        }
        other => Err(ParseError::at(format!("unknown action '{}'", other), token)),
    }
}

fn unexpected(token: &Token<'_>, expected: &str) -> ParseError {
    match kind_of(token) {
        Kind::Unknown => ParseError::at(format!("unknown keyword '{}'", token.name), token),
        _ => ParseError::at(format!("expected {}, found '{}'", expected, token.name), token),
    }
}

/// Parses a blocker declaration
pub fn parse_blocker(input: &str) -> Result<Blocker, ParseError> {
    let tokens = tokenize(input)?;
    let mut clauses = Vec::new();
    let mut i = 0;

    while i < tokens.len() {
        let head = &tokens[i];
        if kind_of(head) != Kind::Finder {
            return Err(unexpected(head, "a finder"));
        }
        let finder = parse_finder(head)?;

        let (op, end) = match tokens.get(i + 1) {
            Some(next) if kind_of(next) == Kind::Condition => {
                i += 2;
                (parse_condition(next)?, next.end)
            }
            Some(next) if kind_of(next) != Kind::Finder => {
                return Err(unexpected(next, "a condition"));
            }
            _ => {
                i += 1;
                (Condition::Closed, head.end)
            }
        };

        clauses.push(Clause {
            finder,
            op,
            text: input[head.start..end].to_string(),
            offset: head.start,
        });
    }

    Ok(Blocker { clauses })
}

/// Parses a trigger declaration
pub fn parse_trigger(input: &str) -> Result<Trigger, ParseError> {
    let tokens = tokenize(input)?;
    let mut clauses = Vec::new();
    let mut i = 0;

    while i < tokens.len() {
        let head = &tokens[i];
        if kind_of(head) != Kind::Finder {
            return Err(unexpected(head, "a finder"));
        }
        let finder = parse_finder(head)?;

        let next = tokens.get(i + 1).ok_or_else(|| {
            ParseError::at(format!("finder '{}' has no action", head.name), head)
        })?;
        if kind_of(next) != Kind::Action {
            return Err(unexpected(next, "an action"));
        }
        let op = parse_action(next)?;

        clauses.push(Clause {
            finder,
            op,
            text: input[head.start..next.end].to_string(),
            offset: head.start,
        });
        i += 2;
    }

    Ok(Trigger { clauses })
}
