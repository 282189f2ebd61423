//! Output Sanitizer - deterministic repair of math/markdown in model output
//!
//! The answer is split into text, code and math runs ([`segments`]) and
//! rewritten by a fixed sequence of stages:
//!
//! 1. normalize special whitespace and `x__1` underscore artifacts
//! 2. protect `\\` and `<br>` markers behind private-use sentinels
//! 3. turn `\[..\]` / `\(..\)` into `$$..$$` / `$..$`
//! 4. wrap bare commands (`\frac{a}{b}`, `\alpha`) in `$..$`
//! 5. merge `math op math` chains into one block (bounded passes)
//! 6. strip delimiters nested inside math
//! 7. drop 1-3 stray delimiter characters trailing a block on its line
//! 8. restore the protected markers
//! 9. short inline code spans become bold
//! 10. `\frac{a}_{b}` becomes `\frac{a}{b}`
//! 11. `x1` inside math becomes `x_1`
//!
//! Code is never rewritten. Running the pipeline on its own output is a no-op.

pub mod segments;

use anyhow::{Context, Result};
use regex::{Captures, Regex};

use segments::{parse, render, Segment};

const BACKSLASH_SENTINEL: char = '\u{E001}';
const BREAK_SENTINEL: char = '\u{E002}';

const MAX_MERGE_PASSES: usize = 16;
const MAX_BOLD_SPAN: usize = 30;

/// Commands wrapped in `$..$` when they appear outside math
const BARE_COMMANDS: &[&str] = &[
    "frac", "dfrac", "tfrac", "sqrt", "sum", "prod", "int", "lim", "log", "ln", "exp", "sin",
    "cos", "tan", "max", "min", "alpha", "beta", "gamma", "delta", "epsilon", "theta", "lambda",
    "mu", "pi", "rho", "sigma", "tau", "phi", "omega", "Delta", "Sigma", "Omega", "Pi", "times",
    "cdot", "div", "pm", "leq", "geq", "neq", "le", "ge", "ne", "approx", "infty", "partial",
    "text", "mathrm", "mathbf", "overline", "hat", "bar",
];

/// Operators that may sit between two math runs as plain text
const TEXT_OPERATORS: &[&str] = &[
    "=", "+", "-", "−", "*", "/", "×", "·", "÷", "<", ">", "≤", "≥", "≠", "≈", "±",
];

/// Operators that may appear as a math run of their own
const MATH_OPERATORS: &[&str] = &[
    r"\times", r"\cdot", r"\div", r"\pm", r"\leq", r"\geq", r"\neq", r"\le", r"\ge", r"\ne",
    r"\approx",
];

const TRAILING_JUNK: &[char] = &['$', '}', ']', '\\'];

pub struct Sanitizer {
    frac_subscript: Regex,
    index_subscript: Regex,
}

impl Sanitizer {
    pub fn new() -> Result<Self> {
        Ok(Self {
            frac_subscript: Regex::new(r"\\frac\{([^{}]*)\}_\{")
                .context("Invalid fraction pattern")?,
            index_subscript: Regex::new(r"\b([A-Za-z])(\d+)\b")
                .context("Invalid subscript pattern")?,
        })
    }

    /// Run every stage, in order
    pub fn sanitize(&self, input: &str) -> String {
        let mut segs = parse(input);
        normalize_spacing(&mut segs);
        // removed characters can open or close delimiters
        let mut segs = tidy(parse(&render(&segs)));

        protect_markers(&mut segs);
        let segs = unify_delimiters(segs);
        let segs = wrap_bare_commands(segs);
        let mut segs = merge_operator_chains(segs);
        strip_nested_delimiters(&mut segs);
        // stripping can empty a run and expose a new operator chain
        segs = tidy(segs);
        drop_trailing_fragments(&mut segs);
        let mut segs = merge_operator_chains(segs);
        restore_markers(&mut segs);
        let mut segs = code_spans_to_bold(segs);
        self.fix_fractions(&mut segs);
        self.join_subscripts(&mut segs);

        render(&canonicalize(segs))
    }

    /// Stage 10
    pub fn fix_fractions(&self, segs: &mut [Segment]) {
        map_math(segs, |s| {
            self.frac_subscript
                .replace_all(s, |caps: &Captures| format!("\\frac{{{}}}{{", &caps[1]))
                .into_owned()
        });
    }

    /// Stage 11
    pub fn join_subscripts(&self, segs: &mut [Segment]) {
        map_math(segs, |s| {
            self.index_subscript
                .replace_all(s, |caps: &Captures| format!("{}_{}", &caps[1], &caps[2]))
                .into_owned()
        });
    }
}

// ============================================================================
// Segment helpers
// ============================================================================

fn map_math<F: Fn(&str) -> String>(segs: &mut [Segment], f: F) {
    for seg in segs.iter_mut() {
        match seg {
            Segment::InlineMath(s) | Segment::BlockMath(s) => *s = f(s),
            _ => {}
        }
    }
}

fn map_prose<F: Fn(&str) -> String>(segs: &mut [Segment], f: F) {
    for seg in segs.iter_mut() {
        match seg {
            Segment::Text(s) | Segment::InlineMath(s) | Segment::BlockMath(s) => *s = f(s),
            Segment::Code(_) => {}
        }
    }
}

/// Apply `f` to every text run, splicing in whatever segments it returns
fn flat_map_text<F: Fn(&str) -> Vec<Segment>>(segs: Vec<Segment>, f: F) -> Vec<Segment> {
    segs.into_iter()
        .flat_map(|seg| match seg {
            Segment::Text(s) => f(&s),
            other => vec![other],
        })
        .collect()
}

fn starts_with(chars: &[char], at: usize, pattern: &str) -> bool {
    pattern
        .chars()
        .enumerate()
        .all(|(k, p)| chars.get(at + k) == Some(&p))
}

fn find(chars: &[char], from: usize, pattern: &str) -> Option<usize> {
    (from..chars.len()).find(|&i| starts_with(chars, i, pattern))
}

// ============================================================================
// Stage 1: spacing
// ============================================================================

/// Special spaces become ASCII space, zero-width characters and stray
/// sentinels are removed, and underscore runs between alphanumerics collapse.
pub fn normalize_text(s: &str) -> String {
    let cleaned: String = s
        .chars()
        .filter_map(|c| match c {
            '\u{00A0}' | '\u{2000}'..='\u{200A}' | '\u{202F}' | '\u{205F}' | '\u{3000}' => Some(' '),
            '\u{200B}' | '\u{200C}' | '\u{200D}' | '\u{2060}' | '\u{FEFF}' => None,
            BACKSLASH_SENTINEL | BREAK_SENTINEL => None,
            c => Some(c),
        })
        .collect();

    let chars: Vec<char> = cleaned.chars().collect();
    let mut out = String::with_capacity(cleaned.len());
    let mut i = 0;
    while i < chars.len() {
        if chars[i] != '_' {
            out.push(chars[i]);
            i += 1;
            continue;
        }

        let run = chars[i..].iter().take_while(|&&c| c == '_').count();
        let between_words = i > 0
            && chars[i - 1].is_alphanumeric()
            && chars.get(i + run).map(|c| c.is_alphanumeric()).unwrap_or(false);
        if run >= 2 && between_words {
            out.push('_');
        } else {
            out.extend(std::iter::repeat('_').take(run));
        }
        i += run;
    }
    out
}

pub fn normalize_spacing(segs: &mut [Segment]) {
    map_prose(segs, normalize_text);
}

// ============================================================================
// Stage 2 / 8: marker protection
// ============================================================================

fn canonical_breaks(s: &str) -> String {
    s.replace("<br />", "<br>").replace("<br/>", "<br>")
}

pub fn protect_markers(segs: &mut [Segment]) {
    map_prose(segs, |s| {
        canonical_breaks(s)
            .replace("<br>", &BREAK_SENTINEL.to_string())
            .replace("\\\\", &BACKSLASH_SENTINEL.to_string())
    });
}

pub fn restore_markers(segs: &mut [Segment]) {
    map_prose(segs, |s| {
        s.replace(BACKSLASH_SENTINEL, "\\\\")
            .replace(BREAK_SENTINEL, "<br>")
    });
}

// ============================================================================
// Stage 3: delimiter unification
// ============================================================================

/// Remove unescaped `$` and trim
fn strip_dollars(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        match c {
            '\\' => {
                out.push(c);
                if let Some(next) = chars.next() {
                    out.push(next);
                }
            }
            '$' => {}
            c => out.push(c),
        }
    }
    out.trim().to_string()
}

fn split_alternate_delimiters(s: &str) -> Vec<Segment> {
    let chars: Vec<char> = s.chars().collect();
    let mut out = Vec::new();
    let mut text = String::new();
    let mut i = 0;

    while i < chars.len() {
        let close = if starts_with(&chars, i, "\\[") {
            Some("\\]")
        } else if starts_with(&chars, i, "\\(") {
            Some("\\)")
        } else {
            None
        };

        if let Some(close) = close {
            if let Some(j) = find(&chars, i + 2, close) {
                let inner: String = chars[i + 2..j].iter().collect();
                let inner = strip_dollars(&inner);
                if !inner.is_empty() {
                    if !text.is_empty() {
                        out.push(Segment::Text(std::mem::take(&mut text)));
                    }
                    if close == "\\]" || inner.contains('\n') {
                        out.push(Segment::BlockMath(inner));
                    } else {
                        out.push(Segment::InlineMath(inner));
                    }
                }
                i = j + 2;
                continue;
            }
        }

        text.push(chars[i]);
        i += 1;
    }

    if !text.is_empty() {
        out.push(Segment::Text(text));
    }
    out
}

pub fn unify_delimiters(segs: Vec<Segment>) -> Vec<Segment> {
    flat_map_text(segs, split_alternate_delimiters)
}

// ============================================================================
// Stage 4: bare commands
// ============================================================================

/// End of a `{..}` (or `[..]`) group starting at `open`; groups never span lines
fn group_end(chars: &[char], open: usize, left: char, right: char) -> Option<usize> {
    if chars.get(open) != Some(&left) {
        return None;
    }
    let mut depth = 0usize;
    for (j, &c) in chars.iter().enumerate().skip(open) {
        match c {
            '\n' => return None,
            c if c == left => depth += 1,
            c if c == right => {
                depth -= 1;
                if depth == 0 {
                    return Some(j + 1);
                }
            }
            _ => {}
        }
    }
    None
}

/// Length of the command plus its arguments and sub/superscripts
fn command_extent(chars: &[char], start: usize, name: &str) -> usize {
    let mut end = start + 1 + name.chars().count();

    if name == "sqrt" {
        if let Some(e) = group_end(chars, end, '[', ']') {
            end = e;
        }
    }

    loop {
        if let Some(e) = group_end(chars, end, '{', '}') {
            end = e;
            continue;
        }
        if matches!(chars.get(end), Some('_') | Some('^')) {
            if let Some(e) = group_end(chars, end + 1, '{', '}') {
                end = e;
                continue;
            }
            if chars.get(end + 1).map(|c| c.is_alphanumeric()).unwrap_or(false) {
                end += 2;
                continue;
            }
        }
        break;
    }
    end
}

fn wrap_commands_in(s: &str) -> Vec<Segment> {
    let chars: Vec<char> = s.chars().collect();
    let mut out = Vec::new();
    let mut text = String::new();
    let mut i = 0;

    while i < chars.len() {
        if chars[i] != '\\' {
            text.push(chars[i]);
            i += 1;
            continue;
        }

        let name: String = chars[i + 1..]
            .iter()
            .take_while(|c| c.is_ascii_alphabetic())
            .collect();

        if BARE_COMMANDS.contains(&name.as_str()) {
            let end = command_extent(&chars, i, &name);
            // an unclosed `$` right before the command was meant to open it
            if ends_with_open_dollar(&text) {
                text.pop();
            }
            if !text.is_empty() {
                out.push(Segment::Text(std::mem::take(&mut text)));
            }
            out.push(Segment::InlineMath(chars[i..end].iter().collect()));
            i = end;
        } else if name.is_empty() {
            // escape pair, e.g. \$
            text.push('\\');
            if let Some(&next) = chars.get(i + 1) {
                text.push(next);
            }
            i += 2;
        } else {
            text.push('\\');
            text.push_str(&name);
            i += 1 + name.chars().count();
        }
    }

    if !text.is_empty() {
        out.push(Segment::Text(text));
    }
    out
}

fn ends_with_open_dollar(text: &str) -> bool {
    match text.strip_suffix('$') {
        Some(rest) => !rest.ends_with('$') && trailing_backslashes(rest) % 2 == 0,
        None => false,
    }
}

pub fn wrap_bare_commands(segs: Vec<Segment>) -> Vec<Segment> {
    flat_map_text(segs, wrap_commands_in)
}

// ============================================================================
// Stage 5: operator chains
// ============================================================================

fn operand(seg: Option<&Segment>) -> Option<&str> {
    let content = seg?.math_content()?.trim();
    (!content.is_empty() && !content.contains('\n')).then_some(content)
}

fn is_blank(seg: Option<&Segment>) -> bool {
    match seg {
        Some(Segment::Text(t)) => !t.is_empty() && t.chars().all(|c| c == ' ' || c == '\t'),
        _ => false,
    }
}

fn text_operator(seg: Option<&Segment>) -> Option<&str> {
    match seg {
        Some(Segment::Text(t)) => {
            let op = t.trim_matches(|c| c == ' ' || c == '\t');
            TEXT_OPERATORS.contains(&op).then_some(op)
        }
        _ => None,
    }
}

fn math_operator(seg: Option<&Segment>) -> Option<&str> {
    let content = seg?.math_content()?.trim();
    (MATH_OPERATORS.contains(&content) || TEXT_OPERATORS.contains(&content)).then_some(content)
}

/// `(segments consumed, merged content)` for a chain starting at `i`
fn try_merge(segs: &[Segment], i: usize) -> Option<(usize, String)> {
    let left = operand(segs.get(i))?;

    if let Some(op) = text_operator(segs.get(i + 1)) {
        let right = operand(segs.get(i + 2))?;
        return Some((3, format!("{} {} {}", left, op, right)));
    }

    let mut j = i + 1;
    if is_blank(segs.get(j)) {
        j += 1;
    }
    let op = math_operator(segs.get(j))?;
    j += 1;
    if is_blank(segs.get(j)) {
        j += 1;
    }
    let right = operand(segs.get(j))?;
    Some((j + 1 - i, format!("{} {} {}", left, op, right)))
}

pub fn merge_operator_chains(mut segs: Vec<Segment>) -> Vec<Segment> {
    for _ in 0..MAX_MERGE_PASSES {
        let mut changed = false;
        let mut i = 0;
        while i < segs.len() {
            match try_merge(&segs, i) {
                Some((consumed, merged)) => {
                    segs.splice(i..i + consumed, [Segment::BlockMath(merged)]);
                    changed = true;
                }
                None => i += 1,
            }
        }
        if !changed {
            break;
        }
    }
    segs
}

// ============================================================================
// Stage 6: nested delimiters
// ============================================================================

fn strip_delimiters(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '\\' => match chars.peek() {
                Some('(') | Some(')') | Some('[') | Some(']') => {
                    chars.next();
                }
                Some(_) => {
                    out.push(c);
                    if let Some(next) = chars.next() {
                        out.push(next);
                    }
                }
                None => out.push(c),
            },
            '$' => {}
            c => out.push(c),
        }
    }
    out
}

pub fn strip_nested_delimiters(segs: &mut [Segment]) {
    map_math(segs, strip_delimiters);
}

// ============================================================================
// Stage 7: trailing fragments
// ============================================================================

/// Returns true when something was dropped
pub fn drop_trailing_fragments(segs: &mut Vec<Segment>) -> bool {
    let mut changed = false;
    let mut i = 0;

    while i + 1 < segs.len() {
        if !matches!(segs[i], Segment::BlockMath(_)) {
            i += 1;
            continue;
        }

        if let Segment::Text(t) = &segs[i + 1] {
            let line_end = t.find('\n').unwrap_or(t.len());
            let head = &t[..line_end];
            let junk: Vec<char> = head.chars().filter(|c| *c != ' ' && *c != '\t').collect();

            if (1..=3).contains(&junk.len()) && junk.iter().all(|c| TRAILING_JUNK.contains(c)) {
                let rest = t[line_end..].to_string();
                if rest.is_empty() {
                    segs.remove(i + 1);
                } else {
                    segs[i + 1] = Segment::Text(rest);
                }
                changed = true;
            }
        }
        i += 1;
    }
    changed
}

// ============================================================================
// Stage 9: code spans
// ============================================================================

fn bold_candidate(raw: &str) -> Option<&str> {
    if raw.starts_with("```") || raw.len() < 2 {
        return None;
    }
    let content = raw.strip_prefix('`')?.strip_suffix('`')?;
    let trimmed = content.trim();

    let full_math = trimmed.len() > 1 && trimmed.starts_with('$') && trimmed.ends_with('$');
    let plain = !trimmed.is_empty()
        && content.chars().count() <= MAX_BOLD_SPAN
        && !content.contains(['\n', '`', '*', '$', '\\']);

    (plain && !full_math).then_some(trimmed)
}

pub fn code_spans_to_bold(segs: Vec<Segment>) -> Vec<Segment> {
    segs.into_iter()
        .map(|seg| match seg {
            Segment::Code(raw) => {
                let bold = bold_candidate(&raw)
                    .map(|content| format!("**{}**", canonical_breaks(&normalize_text(content))));
                match bold {
                    Some(text) => Segment::Text(text),
                    None => Segment::Code(raw),
                }
            }
            other => other,
        })
        .collect()
}

// ============================================================================
// Final form
// ============================================================================

fn trailing_backslashes(s: &str) -> usize {
    s.chars().rev().take_while(|&c| c == '\\').count()
}

/// Escape every unescaped `$`
fn escape_dollars(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        match c {
            '\\' => {
                out.push(c);
                if let Some(next) = chars.next() {
                    out.push(next);
                }
            }
            '$' => out.push_str("\\$"),
            c => out.push(c),
        }
    }
    out
}

/// Final form: [`tidy`], then escape text dollars when the rendered answer
/// would not read back as the same runs
fn canonicalize(segs: Vec<Segment>) -> Vec<Segment> {
    let mut segs = tidy(segs);
    if parse(&render(&segs)) != segs {
        for seg in segs.iter_mut() {
            if let Segment::Text(s) = seg {
                *s = escape_dollars(s);
            }
        }
    }
    segs
}

/// Trim math, drop empty runs, promote inline runs that cannot be written
/// back as `$..$`, merge neighbouring text and space out adjacent math
fn tidy(segs: Vec<Segment>) -> Vec<Segment> {
    let mut out: Vec<Segment> = Vec::with_capacity(segs.len());

    for seg in segs {
        let seg = match seg {
            Segment::InlineMath(s) => {
                let s = s.trim().to_string();
                if s.is_empty() {
                    continue;
                }
                if s.contains('\n') || s.ends_with('\\') {
                    Segment::BlockMath(s)
                } else {
                    Segment::InlineMath(s)
                }
            }
            Segment::BlockMath(s) => Segment::BlockMath(s.trim().to_string()),
            other => other,
        };

        let seg = match seg {
            Segment::BlockMath(mut s) => {
                if trailing_backslashes(&s) % 2 == 1 {
                    s.pop();
                    s = s.trim_end().to_string();
                }
                if s.is_empty() {
                    continue;
                }
                Segment::BlockMath(s)
            }
            other => other,
        };

        if let Segment::Text(next) = &seg {
            if next.is_empty() {
                continue;
            }
            if let Some(Segment::Text(prev)) = out.last_mut() {
                prev.push_str(next);
                continue;
            }
        }
        if seg.is_math() && out.last().map(Segment::is_math).unwrap_or(false) {
            out.push(Segment::Text(" ".to_string()));
        }
        out.push(seg);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use Segment::*;

    fn sanitizer() -> Sanitizer {
        Sanitizer::new().unwrap()
    }

    #[test]
    fn test_normalize_text() {
        assert_eq!(normalize_text("a\u{00A0}b\u{200B}c"), "a bc");
        assert_eq!(normalize_text("x__1 and y___2"), "x_1 and y_2");
        assert_eq!(normalize_text("__bold__ _a_"), "__bold__ _a_");
    }

    #[test]
    fn test_protect_and_restore() {
        let mut segs = vec![Text("a<br/>b \\\\ c".into()), Code("`<br/>`".into())];
        protect_markers(&mut segs);
        assert_eq!(
            segs[0],
            Text(format!("a{}b {} c", BREAK_SENTINEL, BACKSLASH_SENTINEL))
        );
        restore_markers(&mut segs);
        assert_eq!(segs, vec![Text("a<br>b \\\\ c".into()), Code("`<br/>`".into())]);
    }

    #[test]
    fn test_unify_delimiters() {
        let segs = unify_delimiters(vec![Text(r"see \( x \) and \[ $y$ \] end".into())]);
        assert_eq!(
            segs,
            vec![
                Text("see ".into()),
                InlineMath("x".into()),
                Text(" and ".into()),
                BlockMath("y".into()),
                Text(" end".into()),
            ]
        );
        assert_eq!(
            unify_delimiters(vec![Text(r"open \( only".into())]),
            vec![Text(r"open \( only".into())]
        );
    }

    #[test]
    fn test_wrap_bare_commands() {
        let segs = wrap_bare_commands(vec![Text(r"ratio \frac{a}{b}_{c} is \alpha, not \foo".into())]);
        assert_eq!(
            segs,
            vec![
                Text("ratio ".into()),
                InlineMath(r"\frac{a}{b}_{c}".into()),
                Text(" is ".into()),
                InlineMath(r"\alpha".into()),
                Text(r", not \foo".into()),
            ]
        );
        assert_eq!(
            wrap_bare_commands(vec![Text(r"\sqrt[3]{x}^2".into())]),
            vec![InlineMath(r"\sqrt[3]{x}^2".into())]
        );
        assert_eq!(
            wrap_bare_commands(vec![Text(r"cost \$5".into())]),
            vec![Text(r"cost \$5".into())]
        );
    }

    #[test]
    fn test_merge_operator_chains() {
        let segs = merge_operator_chains(vec![
            InlineMath("A".into()),
            Text(" = ".into()),
            InlineMath("B".into()),
            Text(" + ".into()),
            InlineMath("C".into()),
        ]);
        assert_eq!(segs, vec![BlockMath("A = B + C".into())]);

        let segs = merge_operator_chains(vec![
            InlineMath("a".into()),
            Text(" ".into()),
            InlineMath(r"\times".into()),
            Text(" ".into()),
            InlineMath("b".into()),
        ]);
        assert_eq!(segs, vec![BlockMath(r"a \times b".into())]);

        let untouched = vec![InlineMath("a".into()), Text(" and ".into()), InlineMath("b".into())];
        assert_eq!(merge_operator_chains(untouched.clone()), untouched);
    }

    #[test]
    fn test_strip_nested_delimiters() {
        let mut segs = vec![BlockMath(r"\( a $b$ \) \$".into())];
        strip_nested_delimiters(&mut segs);
        assert_eq!(segs, vec![BlockMath(r" a b  \$".into())]);
    }

    #[test]
    fn test_drop_trailing_fragments() {
        let mut segs = vec![BlockMath("x".into()), Text(" }$\nnext".into())];
        assert!(drop_trailing_fragments(&mut segs));
        assert_eq!(segs, vec![BlockMath("x".into()), Text("\nnext".into())]);

        let mut kept = vec![BlockMath("x".into()), Text(" is the answer".into())];
        assert!(!drop_trailing_fragments(&mut kept));
    }

    #[test]
    fn test_code_spans_to_bold() {
        let segs = code_spans_to_bold(vec![
            Code("`FEE_AMT`".into()),
            Code("`$x$`".into()),
            Code("```sql\nSELECT 1\n```".into()),
            Code(format!("`{}`", "a".repeat(31))),
        ]);
        assert_eq!(segs[0], Text("**FEE_AMT**".into()));
        assert_eq!(segs[1], Code("`$x$`".into()));
        assert!(matches!(segs[2], Code(_)));
        assert!(matches!(segs[3], Code(_)));
    }

    #[test]
    fn test_fraction_and_subscript_fixes() {
        let s = sanitizer();
        let mut segs = vec![InlineMath(r"\frac{1}_{2} + x1".into()), Text("x1".into())];
        s.fix_fractions(&mut segs);
        s.join_subscripts(&mut segs);
        assert_eq!(segs, vec![InlineMath(r"\frac{1}{2} + x_1".into()), Text("x1".into())]);
    }

    #[test]
    fn test_pipeline_examples() {
        let s = sanitizer();
        assert_eq!(s.sanitize("$A$ = $B$ + $C$"), "$$A = B + C$$");
        assert!(s.sanitize(r"\frac{1}_{2}").contains(r"\frac{1}{2}"));
        assert_eq!(s.sanitize("plain answer"), "plain answer");
    }

    #[test]
    fn test_open_dollar_detection() {
        assert!(ends_with_open_dollar("rate is $"));
        assert!(ends_with_open_dollar(r"a \\$"));
        assert!(!ends_with_open_dollar(r"cost \$"));
        assert!(!ends_with_open_dollar("$$"));
        assert!(!ends_with_open_dollar("$5 "));
        assert_eq!(escape_dollars(r"$5 and \$6 $$"), r"\$5 and \$6 \$\$");
    }

    #[test]
    fn test_stray_dollar_next_to_command() {
        let s = sanitizer();
        for (input, expected) in [
            (r"rate is $\alpha per unit", r"rate is $\alpha$ per unit"),
            (r"$\frac{1}{2}", r"$\frac{1}{2}$"),
            (r"Price is $5 \times 3", r"Price is \$5 $\times$ 3"),
            (r"$\times ", r"$\times$ "),
        ] {
            let once = s.sanitize(input);
            assert_eq!(once, expected, "input: {:?}", input);
            assert_eq!(s.sanitize(&once), once);
        }
    }

    #[test]
    fn test_emptied_run_exposes_chain() {
        let s = sanitizer();
        let once = s.sanitize("$x$ = $$$$$x$");
        assert_eq!(once, "$$x = x$$");
        assert_eq!(s.sanitize(&once), once);
    }
}
