//! The anonymization script language (§6, "Anonymization script file"):
//! UTF-8 text, one statement per line, `//` comments, statements are
//! either assignments `(gggg,eeee) := <expr>` or bare function calls.
//! Built-ins: `hashUID`, `shiftDateTimeByIncrement`, `alterPixels`,
//! `blankValues`. Function-call syntax accepts either `name[args]`
//! (as written in the spec) or `name(args)`, since real-world scripts
//! in the wild use both.

use std::fmt;

use crate::error::{CoreError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TagRef {
    pub group: u16,
    pub element: u16,
}

impl fmt::Display for TagRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:04x},{:04x})", self.group, self.element)
    }
}

#[derive(Debug, Clone)]
pub enum Arg {
    Tag(TagRef),
    Str(String),
}

#[derive(Debug, Clone)]
pub enum Expr {
    Tag(TagRef),
    Str(String),
    Call { name: String, args: Vec<Arg> },
}

#[derive(Debug, Clone)]
pub enum Statement {
    Assign { target: TagRef, expr: Expr },
    Call { name: String, args: Vec<Arg> },
}

#[derive(Debug, Clone, Default)]
pub struct Script {
    pub statements: Vec<Statement>,
}

impl Script {
    pub fn parse(text: &str) -> Result<Self> {
        let mut statements = Vec::new();

        for (lineno, raw_line) in text.lines().enumerate() {
            let line = strip_comment(raw_line).trim();
            if line.is_empty() {
                continue;
            }

            let statement = parse_statement(line)
                .map_err(|e| CoreError::AnonymizationFailed(format!("line {}: {e}", lineno + 1)))?;
            statements.push(statement);
        }

        Ok(Self { statements })
    }

    /// Tags this script assigns to directly (used by the enhancer for
    /// its case-insensitive "don't duplicate" rule, and by the script
    /// merge/append operations).
    pub fn assigned_tags(&self) -> impl Iterator<Item = TagRef> + '_ {
        self.statements.iter().filter_map(|s| match s {
            Statement::Assign { target, .. } => Some(*target),
            Statement::Call { .. } => None,
        })
    }

    pub fn has_target(&self, tag: TagRef) -> bool {
        self.assigned_tags().any(|t| t == tag)
    }

    pub fn append(&mut self, other: Script) {
        for stmt in other.statements {
            self.statements.push(stmt);
        }
    }

    pub fn to_source(&self) -> String {
        let mut out = String::new();
        for stmt in &self.statements {
            out.push_str(&render_statement(stmt));
            out.push('\n');
        }
        out
    }
}

fn render_statement(stmt: &Statement) -> String {
    match stmt {
        Statement::Assign { target, expr } => format!("{target} := {}", render_expr(expr)),
        Statement::Call { name, args } => format!("{name}[{}]", render_args(args)),
    }
}

fn render_expr(expr: &Expr) -> String {
    match expr {
        Expr::Tag(t) => t.to_string(),
        Expr::Str(s) => format!("\"{s}\""),
        Expr::Call { name, args } => format!("{name}[{}]", render_args(args)),
    }
}

fn render_args(args: &[Arg]) -> String {
    args.iter()
        .map(|a| match a {
            Arg::Tag(t) => t.to_string(),
            Arg::Str(s) => format!("\"{s}\""),
        })
        .collect::<Vec<_>>()
        .join(", ")
}

fn strip_comment(line: &str) -> &str {
    match line.find("//") {
        Some(idx) => &line[..idx],
        None => line,
    }
}

fn parse_statement(line: &str) -> std::result::Result<Statement, String> {
    if let Some(idx) = find_assign_op(line) {
        let (target_str, expr_str) = (line[..idx].trim(), line[idx + 2..].trim());
        let target = parse_tag(target_str).ok_or_else(|| format!("invalid assignment target: {target_str}"))?;
        let expr = parse_expr(expr_str)?;
        Ok(Statement::Assign { target, expr })
    } else {
        let (name, args) = parse_call(line)?;
        Ok(Statement::Call { name, args })
    }
}

fn find_assign_op(line: &str) -> Option<usize> {
    line.find(":=")
}

fn parse_expr(s: &str) -> std::result::Result<Expr, String> {
    let s = s.trim();
    if let Some(tag) = parse_tag(s) {
        return Ok(Expr::Tag(tag));
    }
    if let Some(lit) = parse_string_literal(s) {
        return Ok(Expr::Str(lit));
    }
    let (name, args) = parse_call(s)?;
    Ok(Expr::Call { name, args })
}

fn parse_call(s: &str) -> std::result::Result<(String, Vec<Arg>), String> {
    let (open, close) = if let (Some(o), Some(c)) = (s.find('['), s.rfind(']')) {
        (o, c)
    } else if let (Some(o), Some(c)) = (s.find('('), s.rfind(')')) {
        (o, c)
    } else {
        return Err(format!("expected a function call, got: {s}"));
    };

    if close < open {
        return Err(format!("mismatched brackets in: {s}"));
    }

    let name = s[..open].trim().to_string();
    if name.is_empty() {
        return Err(format!("missing function name in: {s}"));
    }

    let inner = &s[open + 1..close];
    let args = split_args(inner)
        .into_iter()
        .map(|a| parse_arg(a.trim()))
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok((name, args))
}

fn parse_arg(s: &str) -> std::result::Result<Arg, String> {
    if let Some(tag) = parse_tag(s) {
        return Ok(Arg::Tag(tag));
    }
    if let Some(lit) = parse_string_literal(s) {
        return Ok(Arg::Str(lit));
    }
    // Bare words (e.g. unit names like `days`) are treated as string args.
    Ok(Arg::Str(s.trim_matches('"').to_string()))
}

fn split_args(s: &str) -> Vec<&str> {
    if s.trim().is_empty() {
        return Vec::new();
    }
    let mut parts = Vec::new();
    let mut depth = 0i32;
    let mut start = 0usize;
    for (i, c) in s.char_indices() {
        match c {
            '[' | '(' => depth += 1,
            ']' | ')' => depth -= 1,
            ',' if depth == 0 => {
                parts.push(&s[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    parts.push(&s[start..]);
    parts
}

fn parse_string_literal(s: &str) -> Option<String> {
    let s = s.trim();
    if s.len() >= 2 && s.starts_with('"') && s.ends_with('"') {
        Some(s[1..s.len() - 1].to_string())
    } else {
        None
    }
}

fn parse_tag(s: &str) -> Option<TagRef> {
    let s = s.trim();
    let s = s.strip_prefix('(')?.strip_suffix(')')?;
    let (g, e) = s.split_once(',')?;
    let group = u16::from_str_radix(g.trim(), 16).ok()?;
    let element = u16::from_str_radix(e.trim(), 16).ok()?;
    Some(TagRef { group, element })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_assignment_with_hash_uid() {
        let script = Script::parse("(0020,000D) := hashUID[(0020,000D)]\n").unwrap();
        assert_eq!(script.statements.len(), 1);
        match &script.statements[0] {
            Statement::Assign { target, expr } => {
                assert_eq!(*target, TagRef { group: 0x0020, element: 0x000D });
                match expr {
                    Expr::Call { name, args } => {
                        assert_eq!(name, "hashUID");
                        assert_eq!(args.len(), 1);
                    }
                    _ => panic!("expected call"),
                }
            }
            _ => panic!("expected assignment"),
        }
    }

    #[test]
    fn ignores_comments_and_blank_lines() {
        let script = Script::parse("// a comment\n\n(0008,0020) := \"19700101\"\n").unwrap();
        assert_eq!(script.statements.len(), 1);
    }

    #[test]
    fn parses_bare_call_with_mixed_args() {
        let script = Script::parse("shiftDateTimeByIncrement[(0008,0020), \"30\", \"days\"]").unwrap();
        match &script.statements[0] {
            Statement::Call { name, args } => {
                assert_eq!(name, "shiftDateTimeByIncrement");
                assert_eq!(args.len(), 3);
            }
            _ => panic!("expected call statement"),
        }
    }
}
