//! Lossless segmentation of model output into text, code and math runs.
//!
//! `render(parse(s)) == s` for every input: unclosed delimiters stay text,
//! code is kept raw, and math is stored without its `$`/`$$` fences.

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Text(String),
    /// Raw code including its backticks (fenced block or inline span)
    Code(String),
    InlineMath(String),
    BlockMath(String),
}

impl Segment {
    pub fn is_math(&self) -> bool {
        matches!(self, Segment::InlineMath(_) | Segment::BlockMath(_))
    }

    pub fn math_content(&self) -> Option<&str> {
        match self {
            Segment::InlineMath(s) | Segment::BlockMath(s) => Some(s),
            _ => None,
        }
    }
}

fn starts_with(chars: &[char], at: usize, pattern: &str) -> bool {
    let mut i = at;
    for p in pattern.chars() {
        if chars.get(i) != Some(&p) {
            return false;
        }
        i += 1;
    }
    true
}

fn find(chars: &[char], from: usize, pattern: &str) -> Option<usize> {
    (from..chars.len()).find(|&i| starts_with(chars, i, pattern))
}

/// Closing `$$`, skipping backslash-escaped characters
fn find_block_close(chars: &[char], from: usize) -> Option<usize> {
    let mut j = from;
    while j < chars.len() {
        if chars[j] == '\\' {
            j += 2;
            continue;
        }
        if starts_with(chars, j, "$$") {
            return Some(j);
        }
        j += 1;
    }
    None
}

/// Closing `$` of inline math: not preceded by whitespace or a backslash,
/// and no line break or `$$` in between
fn find_inline_close(chars: &[char], from: usize) -> Option<usize> {
    for j in from..chars.len() {
        match chars[j] {
            '\n' => return None,
            '$' if chars.get(j + 1) == Some(&'$') => return None,
            '$' if !chars[j - 1].is_whitespace() && chars[j - 1] != '\\' => return Some(j),
            _ => {}
        }
    }
    None
}

fn collect(chars: &[char]) -> String {
    chars.iter().collect()
}

pub fn parse(input: &str) -> Vec<Segment> {
    let chars: Vec<char> = input.chars().collect();
    let mut segments = Vec::new();
    let mut text = String::new();
    let mut i = 0;

    let flush = |text: &mut String, segments: &mut Vec<Segment>| {
        if !text.is_empty() {
            segments.push(Segment::Text(std::mem::take(text)));
        }
    };

    while i < chars.len() {
        let c = chars[i];

        if starts_with(&chars, i, "```") {
            let end = find(&chars, i + 3, "```").map(|j| j + 3).unwrap_or(chars.len());
            flush(&mut text, &mut segments);
            segments.push(Segment::Code(collect(&chars[i..end])));
            i = end;
            continue;
        }

        if c == '`' {
            if let Some(j) = find(&chars, i + 1, "`") {
                flush(&mut text, &mut segments);
                segments.push(Segment::Code(collect(&chars[i..=j])));
                i = j + 1;
                continue;
            }
            text.push(c);
            i += 1;
            continue;
        }

        if c == '\\' {
            text.push(c);
            if let Some(&next) = chars.get(i + 1) {
                text.push(next);
            }
            i += 2;
            continue;
        }

        if starts_with(&chars, i, "$$") {
            if let Some(j) = find_block_close(&chars, i + 2) {
                flush(&mut text, &mut segments);
                segments.push(Segment::BlockMath(collect(&chars[i + 2..j])));
                i = j + 2;
            } else {
                text.push_str("$$");
                i += 2;
            }
            continue;
        }

        if c == '$' {
            let opens = chars
                .get(i + 1)
                .map(|n| !n.is_whitespace() && *n != '$')
                .unwrap_or(false);
            if opens {
                if let Some(j) = find_inline_close(&chars, i + 1) {
                    flush(&mut text, &mut segments);
                    segments.push(Segment::InlineMath(collect(&chars[i + 1..j])));
                    i = j + 1;
                    continue;
                }
            }
            text.push(c);
            i += 1;
            continue;
        }

        text.push(c);
        i += 1;
    }

    flush(&mut text, &mut segments);
    segments
}

/// Inverse of [`parse`]. Adjacent math runs get a separating space so the
/// output reads back as two runs.
pub fn render(segments: &[Segment]) -> String {
    let mut out = String::new();
    let mut prev_math = false;

    for segment in segments {
        if prev_math && segment.is_math() {
            out.push(' ');
        }
        match segment {
            Segment::Text(s) | Segment::Code(s) => out.push_str(s),
            Segment::InlineMath(s) => {
                out.push('$');
                out.push_str(s);
                out.push('$');
            }
            Segment::BlockMath(s) => {
                out.push_str("$$");
                out.push_str(s);
                out.push_str("$$");
            }
        }
        prev_math = segment.is_math();
    }

    out
}
