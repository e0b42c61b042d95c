//! Prompt Templates
//!
//! The two fixed instruction templates and a small `{name}` substitution renderer.
//! Rendering is pure: the same template and variables always give the same prompt.

use crate::error::{AskError, Result};

/// Stop sequence that keeps the model from inventing a result section after the SQL
pub const SQL_STOP_SEQUENCE: &str = "\nSQL Result:";

/// Instruction template for SQL generation
pub const SQL_GENERATION: PromptTemplate = PromptTemplate::new(
    "sql_generation",
    "\nYou are a SQL expert. Using the schema below, write a SQL query to answer the question.\n\
     Do not add unnecessary WHERE clauses. Only generate the SQL query.\n\
     Schema:\n\
     {schema}\n\
     \n\
     Question: {question}\n\
     SQL Query:\n",
);

/// Instruction template for answer synthesis
pub const ANSWER_SYNTHESIS: PromptTemplate = PromptTemplate::new(
    "answer_synthesis",
    "\nBased on the table schema below, question, sql query, and sql response, write a natural language answer:\n\
     {schema}\n\
     \n\
     Question: {question}\n\
     SQL Query: {query}\n\
     SQL Response: {response}\n",
);

/// A named template with `{variable}` placeholders
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PromptTemplate {
    name: &'static str,
    text: &'static str,
}

impl PromptTemplate {
    #[must_use]
    pub const fn new(name: &'static str, text: &'static str) -> Self {
        Self { name, text }
    }

    /// Substitute every `{variable}` placeholder
    ///
    /// Placeholders are resolved in one left-to-right pass, so braces inside the
    /// substituted values (JSON rows, schema text) are never re-interpreted.
    /// A placeholder without a matching variable is an error.
    pub fn render(&self, vars: &[(&str, &str)]) -> Result<String> {
        let mut out = String::with_capacity(self.text.len());
        let mut rest = self.text;

        while let Some(open) = rest.find('{') {
            out.push_str(&rest[..open]);
            let after = &rest[open + 1..];

            let Some(close) = after.find('}') else {
                out.push_str(&rest[open..]);
                rest = "";
                break;
            };

            let name = &after[..close];
            let value = vars.iter().find(|(k, _)| *k == name).map(|(_, v)| *v).ok_or_else(|| {
                AskError::config_error(format!(
                    "Prompt template '{}' has no value for '{{{name}}}'",
                    self.name
                ))
            })?;
            out.push_str(value);
            rest = &after[close + 1..];
        }

        out.push_str(rest);
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_generation_prompt_embeds_schema_and_question() {
        let prompt = SQL_GENERATION
            .render(&[
                ("schema", "CREATE TABLE Customer (\n\tCountry VARCHAR(40)\n)"),
                ("question", "How many customers are from France?"),
            ])
            .unwrap();

        assert_eq!(
            prompt,
            "\nYou are a SQL expert. Using the schema below, write a SQL query to answer the question.\n\
             Do not add unnecessary WHERE clauses. Only generate the SQL query.\n\
             Schema:\n\
             CREATE TABLE Customer (\n\tCountry VARCHAR(40)\n)\n\
             \n\
             Question: How many customers are from France?\n\
             SQL Query:\n"
        );
    }

    #[test]
    fn test_values_with_braces_not_reinterpreted() {
        let prompt = ANSWER_SYNTHESIS
            .render(&[
                ("schema", "s"),
                ("question", "q {question}"),
                ("query", "SELECT 1"),
                ("response", r#"[{"n":5}]"#),
            ])
            .unwrap();
        assert!(prompt.contains(r#"SQL Response: [{"n":5}]"#));
        assert!(prompt.contains("Question: q {question}"));
    }

    #[test]
    fn test_missing_variable_is_error() {
        let err = SQL_GENERATION.render(&[("schema", "s")]).unwrap_err();
        assert!(err.message().contains("'{question}'"));
        assert!(err.message().contains("sql_generation"));
    }

    #[test]
    fn test_unclosed_brace_kept_literally() {
        let template = PromptTemplate::new("t", "value: {x} and {dangling");
        assert_eq!(template.render(&[("x", "1")]).unwrap(), "value: 1 and {dangling");
    }
}
