//! Recursive-descent parser producing [`Resource`] records.
//!
//! Parse errors are non-fatal and accumulate: on any failure inside a block
//! the parser records a diagnostic, resynchronises on the matching `}`, and
//! resumes at the top level. The outcome carries both the successfully
//! parsed resources and every diagnostic.

use std::collections::BTreeMap;

use crate::error::{Diagnostic, ParseFailure};

use super::lexer::Lexer;
use super::token::TokenKind;
use super::{Resource, Value};

/// Result of a parse run: the resources that parsed cleanly plus any
/// diagnostics recorded along the way.
#[derive(Debug)]
pub struct ParseOutcome {
    pub resources: Vec<Resource>,
    pub errors: Vec<Diagnostic>,
}

impl ParseOutcome {
    /// Convert into a hard result, surfacing the composite failure when any
    /// diagnostics were recorded.
    ///
    /// # Errors
    ///
    /// Returns [`ParseFailure`] when the run recorded one or more errors.
    pub fn into_result(self) -> Result<Vec<Resource>, ParseFailure> {
        if self.errors.is_empty() {
            Ok(self.resources)
        } else {
            Err(ParseFailure(self.errors))
        }
    }
}

/// Parses the DSL token stream into resource records.
#[derive(Debug)]
pub struct Parser<'a> {
    lexer: Lexer<'a>,
    errors: Vec<Diagnostic>,
}

impl<'a> Parser<'a> {
    #[must_use]
    pub fn new(input: &'a str) -> Self {
        Self {
            lexer: Lexer::new(input),
            errors: Vec::new(),
        }
    }

    /// Parse the entire configuration input.
    #[must_use]
    pub fn parse(mut self) -> ParseOutcome {
        let mut resources = Vec::new();

        while self.lexer.current().kind != TokenKind::Eof {
            let kind = match self.lexer.current().kind {
                TokenKind::Include => Some("include".to_string()),
                TokenKind::IncludePlatform => Some("include_platform".to_string()),
                TokenKind::Variable => Some("variable".to_string()),
                TokenKind::Template => Some("template".to_string()),
                TokenKind::Ident => Some(self.lexer.current().literal.clone()),
                _ => None,
            };

            match kind {
                Some(kind) => {
                    self.lexer.advance();
                    match self.parse_resource_block(&kind) {
                        Ok(resource) => resources.push(resource),
                        Err(message) => {
                            self.record_error(&format!("error parsing resource: {message}"));
                            self.skip_to_next_resource();
                        }
                    }
                }
                None => {
                    let literal = self.lexer.current().literal.clone();
                    self.record_error(&format!(
                        "expected resource type identifier, include, or variable statement, got {literal}"
                    ));
                    self.lexer.advance();
                }
            }
        }

        ParseOutcome {
            resources,
            errors: self.errors,
        }
    }

    /// Record a diagnostic at the current token's position.
    fn record_error(&mut self, message: &str) {
        let token = self.lexer.current();
        self.errors.push(Diagnostic {
            line: token.line,
            column: token.column,
            message: message.to_string(),
        });
    }

    /// Consume the current token if it has the expected kind, otherwise
    /// produce an error naming what was expected.
    fn expect(&mut self, kind: TokenKind, what: &str) -> Result<String, String> {
        if self.lexer.current().kind != kind {
            return Err(format!(
                "expected {what}, got {}",
                describe(&self.lexer.current().literal)
            ));
        }
        Ok(self.lexer.advance().literal)
    }

    fn parse_resource_block(&mut self, kind: &str) -> Result<Resource, String> {
        if kind == "include_platform" {
            return self.parse_include_platform();
        }

        let mut resource = Resource {
            kind: kind.to_string(),
            ..Resource::default()
        };

        resource.name = self.expect(TokenKind::Str, "resource name string")?;

        // Default attributes derived from the block header; a body attribute
        // of the same name overrides them.
        match kind {
            "file" | "include" => {
                resource
                    .attributes
                    .insert("path".to_string(), Value::Scalar(resource.name.clone()));
            }
            "variable" | "template" => {
                resource
                    .attributes
                    .insert("name".to_string(), Value::Scalar(resource.name.clone()));
            }
            _ => {}
        }

        self.expect(TokenKind::LBrace, "'{'")?;

        while !matches!(
            self.lexer.current().kind,
            TokenKind::RBrace | TokenKind::Eof
        ) {
            match self.lexer.current().kind {
                TokenKind::DependsOn => {
                    self.lexer.advance();
                    resource.depends_on = self.parse_depends_on()?;
                }
                TokenKind::When => {
                    self.lexer.advance();
                    self.expect(TokenKind::Assign, "'=' after when")?;
                    resource.conditions = self.parse_condition_block()?;
                }
                TokenKind::Ident => {
                    let attr = self.lexer.advance().literal;
                    self.expect(TokenKind::Assign, "'=' after attribute name")?;

                    let value = match self.lexer.current().kind {
                        TokenKind::Str => Value::Scalar(self.lexer.advance().literal),
                        TokenKind::Number => Value::Number(self.lexer.advance().literal),
                        TokenKind::LBracket => Value::List(self.parse_string_array()?),
                        TokenKind::LBrace => Value::Map(self.parse_block_map()?),
                        // String literals have no escapes, so template and
                        // file references are spelled as call forms and
                        // carried as their canonical text for the include
                        // processor to resolve.
                        TokenKind::Template => {
                            self.lexer.advance();
                            Value::Scalar(self.parse_reference("template")?)
                        }
                        TokenKind::Ident
                            if self.lexer.current().literal == "file"
                                && self.lexer.peek().kind == TokenKind::LParen =>
                        {
                            self.lexer.advance();
                            Value::Scalar(self.parse_reference("file")?)
                        }
                        _ => {
                            return Err(format!(
                                "unexpected value type for attribute {attr}: {}",
                                describe(&self.lexer.current().literal)
                            ))
                        }
                    };

                    resource.attributes.insert(attr, value);
                }
                _ => {
                    return Err(format!(
                        "unexpected token in resource block: {}",
                        describe(&self.lexer.current().literal)
                    ))
                }
            }
        }

        self.expect(TokenKind::RBrace, "'}'")?;
        Ok(resource)
    }

    /// Parse the distinguished `include_platform` body: a brace-delimited
    /// list of `platform = "pattern"` pairs with no quoted block name. The
    /// resource takes the synthetic name `platform`.
    fn parse_include_platform(&mut self) -> Result<Resource, String> {
        let mut resource = Resource {
            kind: "include_platform".to_string(),
            name: "platform".to_string(),
            ..Resource::default()
        };

        self.expect(TokenKind::LBrace, "'{'")?;

        while !matches!(
            self.lexer.current().kind,
            TokenKind::RBrace | TokenKind::Eof
        ) {
            let platform = self.expect(TokenKind::Ident, "platform identifier")?;
            self.expect(TokenKind::Assign, "'=' after platform identifier")?;
            let pattern = self.expect(TokenKind::Str, "path pattern string")?;
            resource.attributes.insert(platform, Value::Scalar(pattern));

            if self.lexer.current().kind == TokenKind::Comma {
                self.lexer.advance();
            }
        }

        self.expect(TokenKind::RBrace, "'}'")?;
        Ok(resource)
    }

    /// Parse the tail of a `template("NAME")` or `file("PATH")` value and
    /// return its canonical text.
    fn parse_reference(&mut self, function: &str) -> Result<String, String> {
        self.expect(TokenKind::LParen, &format!("'(' after {function}"))?;
        let target = self.expect(TokenKind::Str, &format!("{function} target string"))?;
        self.expect(TokenKind::RParen, &format!("')' after {function} target"))?;
        Ok(format!("{function}(\"{target}\")"))
    }

    /// Parse the dependency list: `[ type {"name"}, … ]`. There is no `=`
    /// after the `depends_on` header.
    fn parse_depends_on(&mut self) -> Result<Vec<String>, String> {
        let mut result = Vec::new();

        self.expect(TokenKind::LBracket, "'[' after depends_on")?;

        while !matches!(
            self.lexer.current().kind,
            TokenKind::RBracket | TokenKind::Eof
        ) {
            let kind = self.expect(TokenKind::Ident, "resource type")?;
            self.expect(TokenKind::LBrace, "'{' after resource type")?;
            let name = self.expect(TokenKind::Str, "resource name string")?;
            self.expect(TokenKind::RBrace, "'}' after resource name")?;

            result.push(format!("{kind}.{name}"));

            if self.lexer.current().kind == TokenKind::Comma {
                self.lexer.advance();
            } else if self.lexer.current().kind != TokenKind::RBracket {
                return Err(format!(
                    "expected ',' or ']', got {}",
                    describe(&self.lexer.current().literal)
                ));
            }
        }

        self.expect(TokenKind::RBracket, "']'")?;
        Ok(result)
    }

    /// Parse a string array: `["a", "b", "c"]`.
    fn parse_string_array(&mut self) -> Result<Vec<String>, String> {
        let mut result = Vec::new();

        self.expect(TokenKind::LBracket, "'['")?;

        while !matches!(
            self.lexer.current().kind,
            TokenKind::RBracket | TokenKind::Eof
        ) {
            result.push(self.expect(TokenKind::Str, "string in array")?);

            if self.lexer.current().kind == TokenKind::Comma {
                self.lexer.advance();
            } else if self.lexer.current().kind != TokenKind::RBracket {
                return Err(format!(
                    "expected ',' or ']', got {}",
                    describe(&self.lexer.current().literal)
                ));
            }
        }

        self.expect(TokenKind::RBracket, "']'")?;
        Ok(result)
    }

    /// Parse a block map: `{ key1 = "value1", key2 = "value2" }`.
    fn parse_block_map(&mut self) -> Result<BTreeMap<String, String>, String> {
        let mut result = BTreeMap::new();

        self.expect(TokenKind::LBrace, "'{'")?;

        while !matches!(
            self.lexer.current().kind,
            TokenKind::RBrace | TokenKind::Eof
        ) {
            let key = self.expect(TokenKind::Ident, "identifier in block map")?;
            self.expect(TokenKind::Assign, "'=' after key in block map")?;
            let value = self.expect(TokenKind::Str, "string value in block map")?;
            result.insert(key, value);

            if self.lexer.current().kind == TokenKind::Comma {
                self.lexer.advance();
            } else if self.lexer.current().kind != TokenKind::RBrace {
                return Err(format!(
                    "expected ',' or '}}', got {}",
                    describe(&self.lexer.current().literal)
                ));
            }
        }

        self.expect(TokenKind::RBrace, "'}'")?;
        Ok(result)
    }

    /// Parse a condition block: `{ platform = ["linux", "darwin"] }`.
    fn parse_condition_block(&mut self) -> Result<BTreeMap<String, Vec<String>>, String> {
        let mut conditions = BTreeMap::new();

        self.expect(TokenKind::LBrace, "'{'")?;

        while !matches!(
            self.lexer.current().kind,
            TokenKind::RBrace | TokenKind::Eof
        ) {
            let name = self.expect(TokenKind::Ident, "condition name")?;
            self.expect(TokenKind::Assign, "'=' after condition name")?;
            let values = self.parse_string_array()?;
            conditions.insert(name, values);
        }

        self.expect(TokenKind::RBrace, "'}'")?;
        Ok(conditions)
    }

    /// Consume tokens, tracking brace depth, until the end of the current
    /// resource block (a matching `}` at depth zero) or EOF.
    fn skip_to_next_resource(&mut self) {
        let mut depth = 0i32;

        while self.lexer.current().kind != TokenKind::Eof {
            match self.lexer.current().kind {
                TokenKind::LBrace => depth += 1,
                TokenKind::RBrace => {
                    depth -= 1;
                    if depth <= 0 {
                        self.lexer.advance();
                        return;
                    }
                }
                _ => {}
            }
            self.lexer.advance();
        }
    }
}

/// Render a token literal for an error message; EOF has no text.
fn describe(literal: &str) -> &str {
    if literal.is_empty() {
        "end of input"
    } else {
        literal
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;

    fn parse_ok(input: &str) -> Vec<Resource> {
        Parser::new(input).parse().into_result().unwrap()
    }

    #[test]
    fn basic_resource_block() {
        let resources = parse_ok("resource \"test\" {\n attr1 = \"value1\"\n attr2 = 123\n}");
        assert_eq!(resources.len(), 1);

        let res = &resources[0];
        assert_eq!(res.kind, "resource");
        assert_eq!(res.name, "test");
        assert_eq!(
            res.attributes.get("attr1"),
            Some(&Value::Scalar("value1".to_string()))
        );
        assert_eq!(
            res.attributes.get("attr2"),
            Some(&Value::Number("123".to_string()))
        );
    }

    #[test]
    fn special_resource_types_get_default_attributes() {
        let input = "file \"path/to/file\" {}\n\
                     include \"include_path\" {}\n\
                     variable \"var_name\" { value = \"var_value\" }\n\
                     template \"template_name\" { content = \"template_content\" }";
        let resources = parse_ok(input);
        assert_eq!(resources.len(), 4);

        assert_eq!(resources[0].kind, "file");
        assert_eq!(resources[0].name, "path/to/file");
        assert_eq!(
            resources[0].attributes.get("path").and_then(Value::as_str),
            Some("path/to/file")
        );

        assert_eq!(resources[1].kind, "include");
        assert_eq!(
            resources[1].attributes.get("path").and_then(Value::as_str),
            Some("include_path")
        );

        assert_eq!(resources[2].kind, "variable");
        assert_eq!(
            resources[2].attributes.get("name").and_then(Value::as_str),
            Some("var_name")
        );
        assert_eq!(
            resources[2].attributes.get("value").and_then(Value::as_str),
            Some("var_value")
        );

        assert_eq!(resources[3].kind, "template");
        assert_eq!(
            resources[3]
                .attributes
                .get("content")
                .and_then(Value::as_str),
            Some("template_content")
        );
    }

    #[test]
    fn file_name_is_preserved_verbatim_as_path() {
        let resources = parse_ok(r#"file "C:\conf\motd" {}"#);
        assert_eq!(
            resources[0].attributes.get("path").and_then(Value::as_str),
            Some(r"C:\conf\motd")
        );
    }

    #[test]
    fn depends_on_produces_composite_identifiers() {
        let input = "resource \"test\" {\n\
                     depends_on [\n\
                     resource {\"dep1\"},\n\
                     resource {\"dep2\"}\n\
                     ]\n\
                     }";
        let resources = parse_ok(input);
        assert_eq!(
            resources[0].depends_on,
            vec!["resource.dep1".to_string(), "resource.dep2".to_string()]
        );
    }

    #[test]
    fn when_condition_block() {
        let input = "resource \"test\" {\n\
                     when = {\n\
                     platform = [\"linux\", \"darwin\"]\n\
                     arch = [\"amd64\"]\n\
                     }\n\
                     }";
        let resources = parse_ok(input);
        let res = &resources[0];
        assert_eq!(res.conditions.len(), 2);
        assert_eq!(
            res.conditions.get("platform").unwrap(),
            &vec!["linux".to_string(), "darwin".to_string()]
        );
        assert_eq!(
            res.conditions.get("arch").unwrap(),
            &vec!["amd64".to_string()]
        );
    }

    #[test]
    fn string_array_attribute() {
        let resources = parse_ok("resource \"test\" { array = [\"a\", \"b\", \"c\"] }");
        assert_eq!(
            resources[0].attributes.get("array").and_then(Value::as_list),
            Some(&["a".to_string(), "b".to_string(), "c".to_string()][..])
        );
    }

    #[test]
    fn empty_string_array() {
        let resources = parse_ok("resource \"test\" { array = [] }");
        assert_eq!(
            resources[0].attributes.get("array").and_then(Value::as_list),
            Some(&[][..])
        );
    }

    #[test]
    fn block_map_attribute() {
        let resources =
            parse_ok("resource \"test\" { map = { key1 = \"value1\", key2 = \"value2\" } }");
        let map = resources[0].attributes.get("map").unwrap().as_map().unwrap();
        assert_eq!(map.len(), 2);
        assert_eq!(map.get("key1").map(String::as_str), Some("value1"));
        assert_eq!(map.get("key2").map(String::as_str), Some("value2"));
    }

    #[test]
    fn template_reference_value_is_canonical_text() {
        let resources = parse_ok("file \"out\" { content = template(\"motd\") }");
        assert_eq!(
            resources[0]
                .attributes
                .get("content")
                .and_then(Value::as_str),
            Some("template(\"motd\")")
        );
    }

    #[test]
    fn file_reference_value_is_canonical_text() {
        let resources = parse_ok("file \"out\" { content = file(\"payload.txt\") }");
        assert_eq!(
            resources[0]
                .attributes
                .get("content")
                .and_then(Value::as_str),
            Some("file(\"payload.txt\")")
        );
    }

    #[test]
    fn bare_identifier_value_is_still_rejected() {
        let outcome = Parser::new("file \"out\" { content = file }").parse();
        assert!(!outcome.errors.is_empty());
    }

    #[test]
    fn include_platform_block_has_synthetic_name() {
        let input = "include_platform {\n\
                     linux = \"linux/config.cfg\"\n\
                     darwin = \"darwin/config.cfg\"\n\
                     windows = \"windows/config.cfg\"\n\
                     }";
        let resources = parse_ok(input);
        assert_eq!(resources.len(), 1);

        let res = &resources[0];
        assert_eq!(res.kind, "include_platform");
        assert_eq!(res.name, "platform");
        assert_eq!(
            res.attributes.get("linux").and_then(Value::as_str),
            Some("linux/config.cfg")
        );
        assert_eq!(
            res.attributes.get("darwin").and_then(Value::as_str),
            Some("darwin/config.cfg")
        );
        assert_eq!(
            res.attributes.get("windows").and_then(Value::as_str),
            Some("windows/config.cfg")
        );
    }

    #[test]
    fn malformed_inputs_all_report_errors() {
        let cases = [
            ("missing resource name", "resource {"),
            ("missing opening brace", "resource \"name\""),
            ("invalid attribute value", "resource \"name\" { attr = }"),
            ("invalid depends_on syntax", "resource \"name\" { depends_on resource }"),
            ("invalid when syntax", "resource \"name\" { when = 123 }"),
            ("unexpected token", "resource \"name\" { @ }"),
        ];

        for (case, input) in cases {
            let outcome = Parser::new(input).parse();
            assert!(
                !outcome.errors.is_empty(),
                "expected errors for case: {case}"
            );
        }
    }

    #[test]
    fn error_recovery_keeps_following_siblings() {
        let input = "resource \"bad\" { @ }  // invalid token\n\
                     resource \"good\" {\n\
                     attr = \"value\"\n\
                     }";
        let outcome = Parser::new(input).parse();

        assert_eq!(outcome.errors.len(), 1);
        assert_eq!(outcome.errors[0].line, 1);
        assert_eq!(outcome.resources.len(), 1);
        assert_eq!(outcome.resources[0].name, "good");

        assert!(outcome.into_result().is_err());
    }

    #[test]
    fn stray_top_level_token_is_reported_and_skipped() {
        let outcome = Parser::new("= file \"a\" {}").parse();
        assert_eq!(outcome.errors.len(), 1);
        assert_eq!(outcome.resources.len(), 1);
        assert_eq!(outcome.resources[0].name, "a");
    }

    #[test]
    fn diagnostics_carry_positions() {
        let outcome = Parser::new("resource \"test\" {\n  attr = }\n}").parse();
        assert_eq!(outcome.errors.len(), 1);
        assert_eq!(outcome.errors[0].line, 2);
        assert!(outcome.errors[0].message.contains("attr"));
    }

    #[test]
    fn empty_input_yields_no_resources_and_no_errors() {
        let outcome = Parser::new("").parse();
        assert!(outcome.resources.is_empty());
        assert!(outcome.errors.is_empty());
    }

    #[test]
    fn parse_is_deterministic() {
        let input = "file \"a\" { mode = \"0644\" }\npackage \"git\" {}";
        let first = parse_ok(input);
        let second = parse_ok(input);
        assert_eq!(first, second);
    }
}
