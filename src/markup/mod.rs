//! Chat markup: line-oriented scanner and printer.
//!
//! A header line `role:` opens a block message; `role: text` emits a
//! one-line message. Fenced blocks, `[[ ... ]]` brackets, `{{{ }}}` command
//! output and XML-like tags protect their content from header detection.

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;

use crate::types::{Content, Message, Role};

static HEADER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([a-z0-9_]+):(.*)$").expect("header regex must compile")
});
static CMD_OPEN_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^.*:-- (.*?) \{\{\{").expect("cmd open regex must compile")
});
static CMD_CLOSE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^.*:--.* \}\}\}").expect("cmd close regex must compile")
});
static XML_OPEN_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^<(\w+)(\s+[^>]*)?>").expect("xml open regex must compile")
});
static XML_CLOSE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"</(\w+)>").expect("xml close regex must compile")
});

/// Parse markup with the default scanner.
pub fn parse(text: &str, default_role: Role) -> Vec<Message> {
    MarkupScanner::default().parse(text, default_role)
}

/// Render messages back into markup with the default scanner.
///
/// Empty messages print as a bare header; `option`, `previous_response_id`,
/// `function_call` and `function_call_output` print on one line; anything
/// else prints as a block. Structured content is rendered as JSON.
pub fn print(messages: &[Message]) -> String {
    MarkupScanner::default().print(messages)
}

#[derive(Debug, Clone, PartialEq)]
enum Zone {
    Fence,
    Bracket,
    Cmd,
    Xml(Vec<String>),
}

/// Stateful line scanner.
///
/// Only lines naming a recognised role are headers; by default these are
/// the roles with a dedicated [`Role`] variant. Others can be added with
/// [`with_role`](Self::with_role). The trade-off: prose such as `note: ...`
/// or `code:` stays inside the surrounding message, but an unregistered tag
/// never opens a message of its own, so [`Role::Other`] only comes out of
/// the scanner for roles registered this way.
#[derive(Debug, Clone)]
pub struct MarkupScanner {
    roles: HashSet<String>,
}

impl Default for MarkupScanner {
    fn default() -> Self {
        Self {
            roles: Role::KNOWN.iter().map(|role| role.as_str().to_string()).collect(),
        }
    }
}

impl MarkupScanner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Treat `tag:` lines as headers too.
    pub fn with_role(mut self, tag: impl Into<String>) -> Self {
        self.roles.insert(tag.into());
        self
    }

    pub fn parse(&self, text: &str, default_role: Role) -> Vec<Message> {
        let mut scan = Scan::new(default_role);
        for line in text.lines() {
            self.scan_line(&mut scan, line);
        }
        scan.flush();
        scan.messages
    }

    /// Render messages so that parsing the output with this scanner yields
    /// them again. Content that would split or leak into the next message
    /// is wrapped in `[[ ]]`.
    pub fn print(&self, messages: &[Message]) -> String {
        let blocks: Vec<String> = messages
            .iter()
            .map(|message| {
                let text = match &message.content {
                    Content::Structured(value) if !value.is_string() => value.to_string(),
                    content => content.as_text().into_owned(),
                };
                self.render(&message.role, &text)
            })
            .collect();
        format!("\n{}", blocks.join("\n\n"))
    }

    fn render(&self, role: &Role, text: &str) -> String {
        let tag = role.as_str();
        if text.is_empty() {
            return format!("{tag}:");
        }
        if role.prints_inline() && !text.contains('\n') {
            let inline = format!("{tag}: {text}");
            if self.reads_back(&inline, role, text) {
                return inline;
            }
        }
        let block = format!("{tag}:\n\n{text}");
        if self.reads_back(&block, role, text) {
            block
        } else {
            format!("{tag}:\n\n[[\n{text}\n]]")
        }
    }

    /// Whether `rendered` parses back into exactly one `role` message with
    /// `text`, leaving a following header intact.
    fn reads_back(&self, rendered: &str, role: &Role, text: &str) -> bool {
        let followed = format!("{rendered}\n\n{}:", Role::Clear.as_str());
        match self.parse(&followed, Role::User).as_slice() {
            [only, next] => {
                &only.role == role
                    && only.text() == text.trim()
                    && next.role == Role::Clear
                    && next.text().is_empty()
            }
            _ => false,
        }
    }

    fn scan_line(&self, scan: &mut Scan, line: &str) {
        let trimmed = line.trim();

        match &mut scan.zone {
            Some(Zone::Fence) => {
                if is_fence(trimmed) {
                    scan.zone = None;
                }
                scan.append(line);
                return;
            }
            Some(Zone::Bracket) => {
                if trimmed.ends_with("]]") {
                    scan.zone = None;
                    scan.append_unless_blank(&line.replacen("]]", "", 1));
                } else {
                    scan.append(line);
                }
                return;
            }
            Some(Zone::Cmd) => {
                if CMD_CLOSE_RE.is_match(trimmed) {
                    scan.zone = None;
                    scan.append("</cmd_output>");
                } else {
                    scan.append(line);
                }
                return;
            }
            Some(Zone::Xml(stack)) => {
                track_xml(stack, trimmed);
                if stack.is_empty() {
                    scan.zone = None;
                }
                scan.append(line);
                return;
            }
            None => {}
        }

        if is_fence(trimmed) {
            scan.zone = Some(Zone::Fence);
            scan.append_unless_blank(line);
            return;
        }

        if trimmed.starts_with("[[") {
            let opened = line.replacen("[[", "", 1);
            if opened.trim_end().ends_with("]]") {
                scan.append_unless_blank(&opened.replacen("]]", "", 1));
            } else {
                scan.zone = Some(Zone::Bracket);
                scan.append_unless_blank(&opened);
            }
            return;
        }

        if let Some(caps) = CMD_OPEN_RE.captures(trimmed) {
            scan.zone = Some(Zone::Cmd);
            scan.append(&format!("<cmd_output cmd=\"{}\">", &caps[1]));
            return;
        }

        if let Some(caps) = XML_OPEN_RE.captures(trimmed) {
            let mut stack = vec![caps[1].to_string()];
            if !trimmed.ends_with("/>") {
                track_closing(&mut stack, &trimmed[caps[0].len()..]);
                if !stack.is_empty() {
                    scan.zone = Some(Zone::Xml(stack));
                }
            }
            scan.append(line);
            return;
        }

        if let Some(caps) = HEADER_RE.captures(line) {
            if self.roles.contains(&caps[1]) {
                let role = Role::from_tag(&caps[1]);
                let inline = caps[2].trim();
                scan.flush();
                if inline.is_empty() {
                    scan.open_block(role);
                } else {
                    let next = if role == Role::PreviousResponseId {
                        Some(Role::User)
                    } else {
                        None
                    };
                    scan.messages.push(Message::new(role, inline));
                    scan.continue_implicit(next);
                }
                return;
            }
        }

        scan.append(line);
    }
}

fn is_fence(trimmed: &str) -> bool {
    trimmed.starts_with("```") || trimmed.starts_with("---")
}

/// Update an XML tag stack with the tags found on a protected line.
fn track_xml(stack: &mut Vec<String>, trimmed: &str) {
    if let Some(caps) = XML_OPEN_RE.captures(trimmed) {
        let nested = stack.last().is_some_and(|top| top == &caps[1]);
        if nested && !trimmed.ends_with("/>") {
            let name = caps[1].to_string();
            let rest = &trimmed[caps[0].len()..];
            stack.push(name);
            track_closing(stack, rest);
            return;
        }
    }
    track_closing(stack, trimmed);
}

fn track_closing(stack: &mut Vec<String>, text: &str) {
    for caps in XML_CLOSE_RE.captures_iter(text) {
        if stack.last().is_some_and(|top| top == &caps[1]) {
            stack.pop();
        }
    }
}

struct Scan {
    messages: Vec<Message>,
    role: Role,
    content: String,
    /// The current block was opened by an explicit `role:` header, so it is
    /// kept even when empty (`clear:` markers rely on this).
    explicit: bool,
    zone: Option<Zone>,
}

impl Scan {
    fn new(default_role: Role) -> Self {
        Self {
            messages: Vec::new(),
            role: default_role,
            content: String::new(),
            explicit: false,
            zone: None,
        }
    }

    fn append(&mut self, line: &str) {
        if !self.content.is_empty() {
            self.content.push('\n');
        }
        self.content.push_str(line);
    }

    fn append_unless_blank(&mut self, line: &str) {
        if !line.trim().is_empty() {
            self.append(line);
        }
    }

    fn flush(&mut self) {
        let content = self.content.trim();
        if !content.is_empty() || self.explicit {
            self.messages.push(Message::new(self.role.clone(), content));
        }
        self.content.clear();
    }

    fn open_block(&mut self, role: Role) {
        self.role = role;
        self.explicit = true;
    }

    fn continue_implicit(&mut self, role: Option<Role>) {
        if let Some(role) = role {
            self.role = role;
        }
        self.explicit = false;
    }
}
