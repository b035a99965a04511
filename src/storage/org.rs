//! Org outline task source
//!
//! ```text
//! * Release                                  <- no keyword: project node
//! ** TODO [#A] Write tests          :qa:
//!    :PROPERTIES:
//!    :ID:       TEST-1
//!    :TRIGGER:  ids(IMPL-1) todo!(NEXT)
//!    :END:
//! ** TODO Implement
//!    :PROPERTIES:
//!    :ID:       IMPL-1
//!    :BLOCKER:  ids(TEST-1) todo?(DONE)
//!    :END:
//! ```
//!
//! Saving patches the file in place: heading keywords and drawer properties
//! are rewritten, every other byte is left alone.

use std::collections::{HashMap, HashSet};
use std::fmt::Write as _;
use std::ops::Range;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, bail, Context, Result};
use tracing::debug;

use super::source::{TaskLoader, TaskWriter};
use super::{read_locked, write_atomic};
use crate::domain::{Priority, Task, TaskId, TaskRecord, TaskState};

const KEYWORDS: [&str; 6] = ["TODO", "NEXT", "IN-PROGRESS", "IN_PROGRESS", "DONE", "CANCELLED"];

/// Drawer keys that map to record fields rather than properties
const RESERVED: [&str; 4] = ["ID", "BLOCKER", "TRIGGER", "DEPENDS"];

#[derive(Debug, Clone)]
pub struct OrgSource {
    path: PathBuf,
}

impl OrgSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl TaskLoader for OrgSource {
    fn load_tasks(&self) -> Result<Vec<TaskRecord>> {
        let Some(text) = read_locked(&self.path)? else {
            return Ok(Vec::new());
        };

        let outline = parse_outline(&text)
            .with_context(|| format!("Failed to parse Org file: {}", self.path.display()))?;

        debug!(path = %self.path.display(), count = outline.records.len(), "loaded Org tasks");
        Ok(outline.records)
    }
}

impl TaskWriter for OrgSource {
    fn save_tasks(&self, tasks: &[&Task]) -> Result<()> {
        let content = match read_locked(&self.path)? {
            Some(text) if !text.trim().is_empty() => {
                let outline = parse_outline(&text)
                    .with_context(|| format!("Failed to parse Org file: {}", self.path.display()))?;
                patch(&text, &outline, tasks)
            }
            _ => render(tasks),
        };

        write_atomic(&self.path, &content)
    }
}

struct Heading {
    level: usize,
    /// State and its byte range within the line
    keyword: Option<(TaskState, Range<usize>)>,
    priority: Option<Priority>,
    title: String,
    tags: Vec<String>,
}

struct Drawer {
    end: usize,
    /// (line, name, value)
    props: Vec<(usize, String, String)>,
    indent: String,
}

struct Entry {
    id: TaskId,
    line: usize,
    keyword: Option<Range<usize>>,
    drawer: Option<Drawer>,
    /// Where a new drawer goes if there is none
    drawer_at: usize,
}

struct Outline {
    records: Vec<TaskRecord>,
    entries: Vec<Entry>,
}

fn parse_heading(line: &str) -> Option<Heading> {
    let level = line.bytes().take_while(|b| *b == b'*').count();
    if level == 0 || !line[level..].starts_with(' ') {
        return None;
    }

    let body_start = level + (line[level..].len() - line[level..].trim_start().len());
    let body = line[body_start..].trim_end();

    let word_end = body.find(' ').unwrap_or(body.len());
    let word = &body[..word_end];
    let (keyword, mut text) = match word.parse::<TaskState>() {
        Ok(state) if KEYWORDS.contains(&word) => (
            Some((state, body_start..body_start + word_end)),
            body[word_end..].trim_start(),
        ),
        _ => (None, body),
    };

    let mut priority = None;
    if let Some(rest) = text.strip_prefix("[#") {
        if let Some(close) = rest.find(']') {
            if let Ok(p) = rest[..close].parse::<Priority>() {
                priority = Some(p);
                text = rest[close + 1..].trim_start();
            }
        }
    }

    let mut tags = Vec::new();
    if let Some(last) = text.rsplit(' ').next() {
        if last.len() > 1 && last.starts_with(':') && last.ends_with(':') && last != text {
            tags = last
                .split(':')
                .filter(|t| !t.is_empty())
                .map(str::to_string)
                .collect();
            text = text[..text.len() - last.len()].trim_end();
        }
    }

    Some(Heading {
        level,
        keyword,
        priority,
        title: text.to_string(),
        tags,
    })
}

fn is_planning(line: &str) -> bool {
    let trimmed = line.trim_start();
    ["SCHEDULED:", "DEADLINE:", "CLOSED:"]
        .iter()
        .any(|p| trimmed.starts_with(p))
}

fn parse_property(line: &str) -> Option<(String, String)> {
    let rest = line.trim().strip_prefix(':')?;
    let end = rest.find(':')?;
    let name = &rest[..end];
    if name.is_empty() || name.contains(char::is_whitespace) {
        return None;
    }
    Some((name.to_string(), rest[end + 1..].trim().to_string()))
}

fn reserved(name: &str) -> bool {
    RESERVED.iter().any(|r| r.eq_ignore_ascii_case(name))
}

fn parse_outline(text: &str) -> Result<Outline> {
    let lines: Vec<&str> = text.lines().collect();
    let mut records = Vec::new();
    let mut entries = Vec::new();
    let mut stack: Vec<(usize, TaskId, String)> = Vec::new();
    let mut derived: HashSet<TaskId> = HashSet::new();

    let mut i = 0;
    while i < lines.len() {
        let Some(heading) = parse_heading(lines[i]) else {
            i += 1;
            continue;
        };
        let line_no = i;
        i += 1;

        while i < lines.len() && is_planning(lines[i]) {
            i += 1;
        }
        let drawer_at = i;

        let mut drawer = None;
        if i < lines.len() && lines[i].trim().eq_ignore_ascii_case(":PROPERTIES:") {
            let open = i;
            let indent: String = lines[i].chars().take_while(|c| c.is_whitespace()).collect();
            let mut props = Vec::new();
            i += 1;
            loop {
                if i >= lines.len() || parse_heading(lines[i]).is_some() {
                    bail!("line {}: property drawer is never closed", open + 1);
                }
                if lines[i].trim().eq_ignore_ascii_case(":END:") {
                    break;
                }
                if let Some((name, value)) = parse_property(lines[i]) {
                    props.push((i, name, value));
                }
                i += 1;
            }
            drawer = Some(Drawer {
                end: i,
                props,
                indent,
            });
            i += 1;
        }

        while stack.last().is_some_and(|(level, _, _)| *level >= heading.level) {
            stack.pop();
        }
        let parent = stack.last().map(|(_, id, _)| id.clone());
        let outline_path = match stack.last() {
            Some((_, _, path)) => format!("{}/{}", path, heading.title),
            None => heading.title.clone(),
        };

        let prop = |key: &str| {
            drawer.as_ref().and_then(|d| {
                d.props
                    .iter()
                    .find(|(_, name, _)| name.eq_ignore_ascii_case(key))
                    .map(|(_, _, value)| value.clone())
            })
        };

        let id = match prop("ID").filter(|v| !v.is_empty()) {
            Some(raw) => raw
                .parse::<TaskId>()
                .map_err(|e| anyhow!("line {}: invalid ID '{}': {}", line_no + 1, raw, e))?,
            None => {
                let mut id = TaskId::derive(&outline_path);
                if !derived.insert(id.clone()) {
                    id = TaskId::derive(&format!("{}#{}", outline_path, line_no + 1));
                    derived.insert(id.clone());
                }
                id
            }
        };

        let mut record = match &heading.keyword {
            Some((state, _)) => TaskRecord::new(id.clone(), heading.title.clone()).with_state(*state),
            None => TaskRecord::container(id.clone(), heading.title.clone()),
        };
        record.parent_id = parent;
        record.priority = heading.priority;
        record.tags = heading.tags;
        record.blocker = prop("BLOCKER").or_else(|| {
            prop("DEPENDS")
                .map(|deps| deps.split_whitespace().collect::<Vec<_>>().join(" "))
                .filter(|deps| !deps.is_empty())
                .map(|deps| format!("ids({}) todo?(DONE)", deps))
        });
        record.trigger = prop("TRIGGER");
        if let Some(d) = &drawer {
            for (_, name, value) in d.props.iter().filter(|(_, name, _)| !reserved(name)) {
                record.properties.insert(name.clone(), value.clone());
            }
        }

        stack.push((heading.level, id.clone(), outline_path));
        records.push(record);
        entries.push(Entry {
            id,
            line: line_no,
            keyword: heading.keyword.map(|(_, range)| range),
            drawer,
            drawer_at,
        });
    }

    Ok(Outline { records, entries })
}

fn line_ending(line: &str) -> &str {
    if line.ends_with("\r\n") {
        "\r\n"
    } else if line.ends_with('\n') {
        "\n"
    } else {
        ""
    }
}

fn patch(text: &str, outline: &Outline, tasks: &[&Task]) -> String {
    let by_id: HashMap<&TaskId, &Task> = tasks.iter().map(|t| (&t.id, *t)).collect();
    let mut lines: Vec<String> = text.split_inclusive('\n').map(str::to_string).collect();
    let mut inserts: Vec<(usize, String)> = Vec::new();

    for entry in &outline.entries {
        let Some(task) = by_id.get(&entry.id) else {
            continue;
        };

        if let (Some(range), Some(state)) = (&entry.keyword, task.state) {
            let line = &mut lines[entry.line];
            if line[range.clone()].parse::<TaskState>().ok() != Some(state) {
                line.replace_range(range.clone(), state.keyword());
            }
        }

        let indent = entry.drawer.as_ref().map_or("", |d| d.indent.as_str());
        let mut missing = String::new();

        for (name, value) in task.properties.iter().filter(|(name, _)| !reserved(name)) {
            let existing = entry.drawer.as_ref().and_then(|d| {
                d.props
                    .iter()
                    .find(|(_, n, _)| n.eq_ignore_ascii_case(name))
            });

            match existing {
                Some((_, _, old)) if old == value => {}
                Some((idx, old_name, _)) => {
                    let line = &lines[*idx];
                    let line_indent: String = line.chars().take_while(|c| c.is_whitespace()).collect();
                    let ending = line_ending(line).to_string();
                    lines[*idx] = format!("{}:{}: {}{}", line_indent, old_name, value, ending);
                }
                None => {
                    let _ = writeln!(missing, "{}:{}: {}", indent, name, value);
                }
            }
        }

        if !missing.is_empty() {
            match &entry.drawer {
                Some(d) => inserts.push((d.end, missing)),
                None => inserts.push((entry.drawer_at, format!(":PROPERTIES:\n{}:END:\n", missing))),
            }
        }
    }

    inserts.sort_by(|a, b| b.0.cmp(&a.0));
    for (pos, block) in inserts {
        if pos == lines.len() {
            if let Some(last) = lines.last_mut().filter(|l| !l.ends_with('\n')) {
                last.push('\n');
            }
        }
        lines.insert(pos, block);
    }

    lines.concat()
}

/// Writes a fresh outline when there is no file to patch
fn render(tasks: &[&Task]) -> String {
    let known: HashSet<&TaskId> = tasks.iter().map(|t| &t.id).collect();
    let mut children: HashMap<&TaskId, Vec<&Task>> = HashMap::new();
    let mut roots = Vec::new();
    for task in tasks {
        match task.parent_id.as_ref().filter(|p| known.contains(p)) {
            Some(parent) => children.entry(parent).or_default().push(*task),
            None => roots.push(*task),
        }
    }

    let mut out = String::new();
    let mut stack: Vec<(usize, &Task)> = roots.into_iter().rev().map(|t| (1, t)).collect();
    while let Some((level, task)) = stack.pop() {
        render_task(&mut out, level, task);
        if let Some(kids) = children.get(&task.id) {
            stack.extend(kids.iter().rev().map(|t| (level + 1, *t)));
        }
    }
    out
}

fn render_task(out: &mut String, level: usize, task: &Task) {
    out.push_str(&"*".repeat(level));
    out.push(' ');
    if let Some(state) = task.state.filter(|_| !task.is_container()) {
        out.push_str(state.keyword());
        out.push(' ');
    }
    if let Some(priority) = task.priority {
        let _ = write!(out, "[#{}] ", priority);
    }
    out.push_str(&task.heading);
    if !task.tags.is_empty() {
        let tags: Vec<&str> = task.tags.iter().map(String::as_str).collect();
        let _ = write!(out, " :{}:", tags.join(":"));
    }
    out.push('\n');

    let indent = " ".repeat(level + 1);
    let _ = writeln!(out, "{}:PROPERTIES:", indent);
    let _ = writeln!(out, "{}:ID: {}", indent, task.id);
    if let Some(blocker) = &task.blocker {
        let _ = writeln!(out, "{}:BLOCKER: {}", indent, blocker);
    }
    if let Some(trigger) = &task.trigger {
        let _ = writeln!(out, "{}:TRIGGER: {}", indent, trigger);
    }
    for (name, value) in task.properties.iter().filter(|(name, _)| !reserved(name)) {
        let _ = writeln!(out, "{}:{}: {}", indent, name, value);
    }
    let _ = writeln!(out, "{}:END:", indent);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Engine;
    use std::fs;
    use tempfile::TempDir;

    const SAMPLE: &str = "#+TITLE: Plan

* Release
Some notes about the release.
** TODO [#A] Write tests                                  :qa:backend:
   :PROPERTIES:
   :ID:       TEST-1
   :TRIGGER:  ids(IMPL-1) todo!(NEXT)
   :END:
** TODO Implement
   SCHEDULED: <2024-05-01 Wed>
   :PROPERTIES:
   :ID:       IMPL-1
   :BLOCKER:  ids(TEST-1) todo?(DONE)
   :OWNER:    sam
   :END:
** IN-PROGRESS Docs
   :PROPERTIES:
   :ID:       DOCS
   :DEPENDS:  TEST-1 IMPL-1
   :END:
* NEXT Standalone
";

    fn id(s: &str) -> TaskId {
        s.parse().unwrap()
    }

    fn write_sample(dir: &TempDir) -> OrgSource {
        let path = dir.path().join("plan.org");
        fs::write(&path, SAMPLE).unwrap();
        OrgSource::new(path)
    }

    #[test]
    fn parses_headings() {
        let heading = parse_heading("** TODO [#B] Ship it   :a:b:").unwrap();
        assert_eq!(heading.level, 2);
        assert_eq!(heading.keyword.as_ref().map(|(s, r)| (*s, r.clone())), Some((TaskState::Todo, 3..7)));
        assert_eq!(heading.priority, Some("B".parse().unwrap()));
        assert_eq!(heading.title, "Ship it");
        assert_eq!(heading.tags, vec!["a", "b"]);

        let plain = parse_heading("* Project").unwrap();
        assert!(plain.keyword.is_none());
        assert_eq!(plain.title, "Project");

        assert!(parse_heading("*bold* text").is_none());
        assert!(parse_heading("no heading").is_none());
    }

    #[test]
    fn loads_outline() {
        let dir = TempDir::new().unwrap();
        let records = write_sample(&dir).load_tasks().unwrap();

        assert_eq!(records.len(), 5);

        let release = &records[0];
        assert!(release.container);
        assert_eq!(release.id, TaskId::derive("Release"));

        let tests = &records[1];
        assert_eq!(tests.id, id("TEST-1"));
        assert_eq!(tests.parent_id, Some(release.id.clone()));
        assert_eq!(tests.priority, Some("A".parse().unwrap()));
        assert_eq!(tests.tags, vec!["qa", "backend"]);
        assert_eq!(tests.trigger.as_deref(), Some("ids(IMPL-1) todo!(NEXT)"));

        let implement = &records[2];
        assert_eq!(implement.blocker.as_deref(), Some("ids(TEST-1) todo?(DONE)"));
        assert_eq!(implement.properties.get("OWNER").map(String::as_str), Some("sam"));
        assert!(!implement.properties.contains_key("ID"));

        let docs = &records[3];
        assert_eq!(docs.state, Some(TaskState::InProgress));
        assert_eq!(docs.blocker.as_deref(), Some("ids(TEST-1 IMPL-1) todo?(DONE)"));

        let standalone = &records[4];
        assert_eq!(standalone.parent_id, None);
        assert_eq!(standalone.state, Some(TaskState::Next));
    }

    #[test]
    fn unclosed_drawer_is_an_error() {
        let err = parse_outline("* TODO a\n:PROPERTIES:\n:ID: A\n* TODO b\n").err().unwrap();
        assert!(err.to_string().contains("never closed"));
    }

    #[test]
    fn save_patches_in_place() {
        let dir = TempDir::new().unwrap();
        let source = write_sample(&dir);

        let mut engine = Engine::new(source.load_tasks().unwrap()).unwrap();
        engine.apply_transition(&id("TEST-1"), TaskState::InProgress).unwrap();
        engine.apply_transition(&id("TEST-1"), TaskState::Done).unwrap();

        let tasks: Vec<&Task> = engine.store().all().collect();
        source.save_tasks(&tasks).unwrap();

        let text = fs::read_to_string(source.path()).unwrap();
        let expected = SAMPLE
            .replace("** TODO [#A] Write tests", "** DONE [#A] Write tests")
            .replace("** TODO Implement", "** NEXT Implement");
        assert_eq!(text, expected);
    }

    #[test]
    fn save_writes_new_properties() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("plan.org");
        fs::write(
            &path,
            "* TODO A\n  :PROPERTIES:\n  :ID: A\n  :TRIGGER: ids(B C) set-property!(STATUS go)\n  :END:\n* TODO B\n  :PROPERTIES:\n  :ID: B\n  :END:\n* TODO C",
        )
        .unwrap();
        let source = OrgSource::new(&path);

        let mut engine = Engine::new(source.load_tasks().unwrap()).unwrap();
        engine.apply_transition(&id("A"), TaskState::Next).unwrap();
        let tasks: Vec<&Task> = engine.store().all().collect();
        source.save_tasks(&tasks).unwrap();

        let text = fs::read_to_string(&path).unwrap();
        assert!(text.contains("* NEXT A\n"));
        assert!(text.contains("  :ID: B\n  :STATUS: go\n  :END:\n"));
        assert!(text.ends_with("* TODO C\n:PROPERTIES:\n:STATUS: go\n:END:\n"));

        let reloaded = source.load_tasks().unwrap();
        let c = reloaded.iter().find(|r| r.heading == "C").unwrap();
        assert_eq!(c.properties.get("STATUS").map(String::as_str), Some("go"));
    }

    #[test]
    fn renders_fresh_outline() {
        let dir = TempDir::new().unwrap();
        let source = OrgSource::new(dir.path().join("new.org"));

        let engine = Engine::new([
            TaskRecord::new(id("C"), "child").with_parent(id("P")),
            TaskRecord::container(id("P"), "parent"),
            TaskRecord::new(id("X"), "x").with_blocker("ids(C)"),
        ])
        .unwrap();
        let tasks: Vec<&Task> = engine.store().all().collect();
        source.save_tasks(&tasks).unwrap();

        let text = fs::read_to_string(source.path()).unwrap();
        assert!(text.starts_with("* parent\n"));
        assert!(text.contains("** TODO child\n"));

        let records = source.load_tasks().unwrap();
        let ids: Vec<_> = records.iter().map(|r| r.id.to_string()).collect();
        assert_eq!(ids, ["P", "C", "X"]);
        assert_eq!(records[1].parent_id, Some(id("P")));
        assert_eq!(records[2].blocker.as_deref(), Some("ids(C)"));
    }
}
