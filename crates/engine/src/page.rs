use serde_json::Value;
use sqlask_pipeline::{Outcome, ResultTable};
use sqlask_template::{Template, TemplateError};
use std::collections::HashMap;

pub const INDEX_TEMPLATE: &str = include_str!("../templates/index.html");

/// The single page: question form plus whatever the last ask produced.
#[derive(Debug, Clone)]
pub struct Page {
    template: Template,
}

impl Page {
    pub fn new(source: &str) -> Result<Self, TemplateError> {
        Ok(Self {
            template: Template::compile("index.html", source)?,
        })
    }

    pub fn builtin() -> Result<Self, TemplateError> {
        Self::new(INDEX_TEMPLATE)
    }

    pub fn render(&self, question: &str, outcome: &Outcome) -> Result<String, TemplateError> {
        let question = escape_html(question);
        let output = render_outcome(outcome);
        self.template.render(&HashMap::from([
            ("question", question.as_str()),
            ("output", output.as_str()),
        ]))
    }
}

pub fn render_outcome(outcome: &Outcome) -> String {
    let mut out = String::new();
    match outcome {
        Outcome::Idle => {}
        Outcome::Answered {
            sql,
            table,
            paraphrase,
        } => {
            out.push_str("<h2>The Response is</h2>\n");
            out.push_str(&format!("<pre><code>{}</code></pre>\n", escape_html(sql)));
            out.push_str(&render_table(table));
            out.push_str("<h2>Paraphrased Response</h2>\n");
            if let Some(text) = paraphrase {
                out.push_str(&paragraphs(text));
            }
        }
        Outcome::Degraded { answer, .. } => {
            if let Some(text) = answer {
                out.push_str(&paragraphs(text));
            }
        }
        Outcome::Failed { message } => {
            out.push_str(&format!("<p class=\"error\">{}</p>\n", escape_html(message)));
        }
    }
    out
}

fn render_table(table: &ResultTable) -> String {
    let mut out = String::from("<table>\n<thead><tr>");
    for col in &table.columns {
        out.push_str(&format!("<th>{}</th>", escape_html(col)));
    }
    out.push_str("</tr></thead>\n<tbody>\n");
    for row in &table.rows {
        out.push_str("<tr>");
        for cell in row {
            out.push_str(&format!("<td>{}</td>", escape_html(&cell_text(cell))));
        }
        out.push_str("</tr>\n");
    }
    out.push_str("</tbody>\n</table>\n");
    out
}

fn cell_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn paragraphs(text: &str) -> String {
    text.split("\n\n")
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(|p| format!("<p>{}</p>\n", escape_html(p).replace('\n', "<br>\n")))
        .collect()
}

pub fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}
