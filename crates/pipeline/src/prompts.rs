use sqlask_template::{Template, TemplateError};
use std::collections::HashMap;

pub const SQL_PROMPT: &str = r#"
You are an expert in converting English questions to SQL query!
The SQL database has the name players and has the following columns -
player_id (INTEGER PRIMARY KEY), first_name (TEXT), last_name (TEXT),
position (TEXT), team (TEXT), age (INTEGER), nationality (TEXT).

For example,
Example 1 - How many players are there?,
the SQL command will be something like this: SELECT COUNT(*) FROM players;
Example 2 - List all players in the team 'Barcelona',
the SQL command will be something like this: SELECT * FROM players WHERE team='Barcelona';

Guidelines:
1. Ensure the SQL code is syntactically correct and does not include delimiters like `;`.
2. Avoid SQL keywords or delimiters in the output.
3. Handle different variations of questions accurately.
4. The SQL code should be valid, executable, and not contain unnecessary delimiters.

Schema:
- Table: players
  Columns: player_id INTEGER PRIMARY KEY,
           first_name TEXT,
           last_name TEXT,
           position TEXT,
           team TEXT,
           age INTEGER,
           nationality TEXT
"#;

pub const PARAPHRASE_PROMPT: &str = r#"
You are an expert in paraphrasing responses.
Given the following question and its corresponding result, provide a well-formulated response that summarizes the information accurately.

Question: {question}
Result: {result}

Paraphrased Response:
"#;

/// The two prompt templates, parsed once.
#[derive(Debug, Clone)]
pub struct Prompts {
    sql: Template,
    paraphrase: Template,
}

impl Prompts {
    pub fn new(sql: &str, paraphrase: &str) -> Result<Self, TemplateError> {
        Ok(Self {
            sql: Template::compile("sql", sql)?,
            paraphrase: Template::compile("paraphrase", paraphrase)?,
        })
    }

    pub fn builtin() -> Result<Self, TemplateError> {
        Self::new(SQL_PROMPT, PARAPHRASE_PROMPT)
    }

    pub fn sql_instruction(&self, question: &str) -> Result<String, TemplateError> {
        self.sql.render(&HashMap::from([("question", question)]))
    }

    pub fn paraphrase_instruction(
        &self,
        question: &str,
        result: &str,
    ) -> Result<String, TemplateError> {
        self.paraphrase
            .render(&HashMap::from([("question", question), ("result", result)]))
    }
}
