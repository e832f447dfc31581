//! Small text templates with named `{placeholder}` slots.
//!
//! Used for the model prompts and for the HTML page. `{{` and `}}` produce
//! literal braces, everything else outside a placeholder is copied verbatim.

use std::collections::HashMap;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockContent {
    pub lineno: usize,
    pub colno: usize,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Block {
    Text(BlockContent),
    Placeholder(BlockContent),
}

#[derive(Default, Debug)]
pub struct ParseResults {
    pub blocks: Vec<Block>,
}

impl ParseResults {
    fn add_block(&mut self, block: Block) {
        self.blocks.push(block);
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TemplateError {
    #[error("unterminated placeholder opened at {line}:{col}")]
    Unterminated { line: usize, col: usize },
    #[error("invalid placeholder name {name:?} at {line}:{col}")]
    InvalidName {
        name: String,
        line: usize,
        col: usize,
    },
    #[error("unmatched '}}' at {line}:{col}")]
    StrayClose { line: usize, col: usize },
    #[error("template {template:?} has no value for placeholder {name:?}")]
    MissingValue { template: String, name: String },
}

pub struct Parser<'a> {
    content: &'a str,
    pos: usize,
    line: usize,
}

impl<'a> Parser<'a> {
    pub fn new(content: &'a str) -> Self {
        Self {
            content,
            pos: 0,
            line: 1,
        }
    }

    pub fn parse(&mut self) -> Result<ParseResults, TemplateError> {
        self.pos = 0;
        self.line = 1;

        let mut results = ParseResults::default();
        while self.pos < self.content.len() {
            if self.lookahead("{") && !self.lookahead("{{") {
                results.add_block(self.parse_placeholder()?);
            } else {
                results.add_block(self.parse_text_block()?);
            }
        }
        Ok(results)
    }

    pub fn set_content(&mut self, content: &'a str) {
        self.content = content;
        self.pos = 0;
        self.line = 1;
    }

    fn parse_text_block(&mut self) -> Result<Block, TemplateError> {
        let start_line = self.line;
        let start_col = self.column_at(self.pos);
        let mut buf = String::new();

        while self.pos < self.content.len() {
            if self.lookahead("{{") || self.lookahead("}}") {
                let c = self.consume();
                let _ = self.consume();
                buf.push(c);
                continue;
            }
            if self.lookahead("{") {
                break;
            }
            if self.lookahead("}") {
                return Err(TemplateError::StrayClose {
                    line: self.line,
                    col: self.column_at(self.pos),
                });
            }
            let c = self.consume();
            if c == '\n' {
                self.line += 1;
            }
            buf.push(c);
        }

        Ok(Block::Text(BlockContent {
            lineno: start_line,
            colno: start_col,
            content: buf,
        }))
    }

    fn parse_placeholder(&mut self) -> Result<Block, TemplateError> {
        let start_line = self.line;
        let tag_pos = self.pos;
        let start_col = self.column_at(tag_pos);
        let _ = self.consume(); // {

        let mut buf = String::new();
        while self.pos < self.content.len() && !self.lookahead("}") {
            let c = self.consume();
            if c == '\n' {
                self.line += 1;
            }
            buf.push(c);
        }

        if !self.lookahead("}") {
            return Err(TemplateError::Unterminated {
                line: start_line,
                col: start_col,
            });
        }
        let _ = self.consume(); // }

        let name = buf.trim();
        if !is_identifier(name) {
            return Err(TemplateError::InvalidName {
                name: buf,
                line: start_line,
                col: start_col,
            });
        }

        Ok(Block::Placeholder(BlockContent {
            lineno: start_line,
            // column of the name itself, after the brace
            colno: start_col + 1,
            content: name.to_string(),
        }))
    }

    fn lookahead(&self, pat: &str) -> bool {
        self.content.as_bytes()[self.pos..].starts_with(pat.as_bytes())
    }

    fn consume(&mut self) -> char {
        let ch = self.content[self.pos..].chars().next().unwrap_or('\0');
        self.pos += ch.len_utf8();
        ch
    }

    /// Compute the 1-based column number at the given byte position in `self.content`.
    /// Counts Unicode scalar values to avoid byte/char mismatches.
    fn column_at(&self, byte_pos: usize) -> usize {
        let prefix = &self.content[..byte_pos];
        match prefix.rfind('\n') {
            Some(nl_idx) => self.content[nl_idx + 1..byte_pos].chars().count() + 1,
            None => prefix.chars().count() + 1,
        }
    }
}

fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// A parsed template, ready to be rendered any number of times.
#[derive(Debug, Clone)]
pub struct Template {
    name: String,
    blocks: Vec<Block>,
}

impl Template {
    pub fn compile(name: impl Into<String>, source: &str) -> Result<Self, TemplateError> {
        let blocks = Parser::new(source).parse()?.blocks;
        Ok(Self {
            name: name.into(),
            blocks,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    /// Distinct placeholder names in order of first use.
    pub fn placeholders(&self) -> Vec<&str> {
        let mut names: Vec<&str> = Vec::new();
        for block in &self.blocks {
            if let Block::Placeholder(p) = block {
                if !names.contains(&p.content.as_str()) {
                    names.push(&p.content);
                }
            }
        }
        names
    }

    pub fn render(&self, values: &HashMap<&str, &str>) -> Result<String, TemplateError> {
        let mut out = String::new();
        for block in &self.blocks {
            match block {
                Block::Text(t) => out.push_str(&t.content),
                Block::Placeholder(p) => {
                    let value = values.get(p.content.as_str()).ok_or_else(|| {
                        TemplateError::MissingValue {
                            template: self.name.clone(),
                            name: p.content.clone(),
                        }
                    })?;
                    out.push_str(value);
                }
            }
        }
        Ok(out)
    }
}
