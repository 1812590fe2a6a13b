//! Patch-language lexer.
//!
//! The surface syntax is context-sensitive: a header (`@@` or `@ name @`),
//! a metavariable section terminated by `@@`, and a body of physical lines
//! optionally prefixed with `+` or `-`. The lexer produces a flat token
//! stream; all structure recovery happens in the rewriter.

use crate::errors::LexError;

/// Source position of a token, 1-based line and column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Position {
    pub line: usize,
    pub column: usize,
    pub offset: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Rulename,
    MetavarType,
    MetavarIdentifier,
    WhenMatches,
    WhenAny,
    WhenExists,
    WhenNotEqual,
    Code,
    Addition,
    Deletion,
    Dots,
    OptDotsBegin,
    OptDotsEnd,
    DisjunctionBegin,
    DisjunctionContinue,
    DisjunctionEnd,
    Newline,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub text: String,
    pub pos: Position,
}

struct Lexer<'a> {
    input: &'a str,
    line_starts: Vec<usize>,
    tokens: Vec<Token>,
}

impl<'a> Lexer<'a> {
    fn new(input: &'a str) -> Self {
        let mut line_starts = vec![0];
        for (i, b) in input.bytes().enumerate() {
            if b == b'\n' {
                line_starts.push(i + 1);
            }
        }
        Self {
            input,
            line_starts,
            tokens: Vec::new(),
        }
    }

    fn position(&self, offset: usize) -> Position {
        let line = match self.line_starts.binary_search(&offset) {
            Ok(i) => i + 1,
            Err(i) => i,
        };
        Position {
            line,
            column: offset - self.line_starts[line - 1] + 1,
            offset,
        }
    }

    fn push(&mut self, kind: TokenKind, text: impl Into<String>, offset: usize) {
        self.tokens.push(Token {
            kind,
            text: text.into(),
            pos: self.position(offset),
        });
    }

    fn err(&self, expected: &str, offset: usize) -> LexError {
        LexError::unexpected(expected, offset, self.input)
    }
}

/// Tokenize a patch.
pub fn lex(input: &str) -> Result<Vec<Token>, LexError> {
    if input.trim().is_empty() {
        return Err(LexError::Empty);
    }
    let mut lx = Lexer::new(input);

    // Header: `@@` or `@ name @`.
    let start = input.len() - input.trim_start().len();
    if !input[start..].starts_with('@') {
        return Err(lx.err("rule header `@@` or `@ name @`", start));
    }
    let metavars_start = if input[start..].starts_with("@@") {
        start + 2
    } else {
        let name_start = start + 1;
        let rel = input[name_start..]
            .find('@')
            .ok_or_else(|| lx.err("closing `@` of the rule name", name_start))?;
        let name_end = name_start + rel;
        lx.push(
            TokenKind::Rulename,
            input[name_start..name_end].trim(),
            name_start,
        );
        name_end + 1
    };

    // Metavariable section, up to the terminating `@@`.
    let rel = input[metavars_start..]
        .find("@@")
        .ok_or_else(|| lx.err("`@@` terminating the metavariable section", metavars_start))?;
    let metavars_end = metavars_start + rel;
    lex_metavars(&mut lx, metavars_start, metavars_end)?;

    // Body starts on the line after the terminator.
    let mut body_start = metavars_end + 2;
    match input[body_start..].find('\n') {
        Some(nl) => body_start += nl + 1,
        None => body_start = input.len(),
    }
    lex_body(&mut lx, body_start)?;

    Ok(lx.tokens)
}

/// A word in the metavariable section: an identifier-ish chunk or a quoted
/// string (kept with its quotes).
struct Word {
    text: String,
    offset: usize,
    quoted: bool,
}

fn split_words(lx: &Lexer<'_>, start: usize, end: usize) -> Result<Vec<Word>, LexError> {
    let region = &lx.input[start..end];
    let mut words = Vec::new();
    let mut it = region.char_indices().peekable();
    while let Some(&(i, c)) = it.peek() {
        if c.is_whitespace() || c == ',' {
            it.next();
        } else if c == '"' {
            it.next();
            let mut last = None;
            for (j, d) in it.by_ref() {
                if d == '"' {
                    last = Some(j);
                    break;
                }
            }
            let close = last.ok_or_else(|| lx.err("closing `\"`", start + i))?;
            words.push(Word {
                text: region[i..=close].to_owned(),
                offset: start + i,
                quoted: true,
            });
        } else {
            let word_start = i;
            let mut word_end = end - start;
            while let Some(&(j, d)) = it.peek() {
                if d.is_whitespace() || d == ',' || d == '"' {
                    word_end = j;
                    break;
                }
                word_end = j + d.len_utf8();
                it.next();
            }
            words.push(Word {
                text: region[word_start..word_end].to_owned(),
                offset: start + word_start,
                quoted: false,
            });
        }
    }
    Ok(words)
}

fn lex_metavars(lx: &mut Lexer<'_>, start: usize, end: usize) -> Result<(), LexError> {
    let input = lx.input;
    let region = &input[start..end];
    let mut clause_start = 0;
    let clauses: Vec<(usize, usize)> = {
        let mut out = Vec::new();
        for (i, c) in region.char_indices() {
            if c == ';' {
                out.push((clause_start, i));
                clause_start = i + 1;
            }
        }
        out.push((clause_start, region.len()));
        out
    };

    for (cs, ce) in clauses {
        let words = split_words(lx, start + cs, start + ce)?;
        if words.is_empty() {
            continue;
        }
        if let Some(wi) = words
            .iter()
            .position(|w| !w.quoted && w.text == "when")
        {
            if words.len() != wi + 3 || words[wi + 1].text != "matches" || !words[wi + 2].quoted {
                return Err(lx.err("`matches \"<regex>\"` after `when`", words[wi].offset));
            }
            match wi {
                1 => {
                    lx.push(
                        TokenKind::MetavarIdentifier,
                        words[0].text.clone(),
                        words[0].offset,
                    );
                }
                2 => {
                    lx.push(
                        TokenKind::MetavarType,
                        words[0].text.clone(),
                        words[0].offset,
                    );
                    lx.push(
                        TokenKind::MetavarIdentifier,
                        words[1].text.clone(),
                        words[1].offset,
                    );
                }
                _ => {
                    return Err(lx.err(
                        "a single identifier before `when matches`",
                        words[0].offset,
                    ))
                }
            }
            lx.push(
                TokenKind::WhenMatches,
                words[wi + 2].text.clone(),
                words[wi + 2].offset,
            );
        } else {
            if words.len() < 2 {
                return Err(lx.err(
                    "metavariable declaration `<kind> name1, name2;`",
                    words[0].offset,
                ));
            }
            if words.iter().any(|w| w.quoted) {
                return Err(lx.err("identifiers in a metavariable declaration", words[0].offset));
            }
            lx.push(
                TokenKind::MetavarType,
                words[0].text.clone(),
                words[0].offset,
            );
            for w in &words[1..] {
                lx.push(TokenKind::MetavarIdentifier, w.text.clone(), w.offset);
            }
        }
    }
    Ok(())
}

fn lex_body(lx: &mut Lexer<'_>, body_start: usize) -> Result<(), LexError> {
    let input = lx.input;
    let body = &input[body_start..];
    let mut line_start = body_start;
    for line in body.split('\n') {
        lex_body_line(lx, line, line_start)?;
        line_start += line.len() + 1;
    }
    Ok(())
}

fn lex_body_line(lx: &mut Lexer<'_>, line: &str, line_start: usize) -> Result<(), LexError> {
    let trimmed_start = line.trim_start();
    let mut offset = line_start + (line.len() - trimmed_start.len());
    let content = if let Some(rest) = trimmed_start.strip_prefix('+') {
        lx.push(TokenKind::Addition, "+", offset);
        offset += 1;
        rest
    } else if let Some(rest) = trimmed_start.strip_prefix('-') {
        lx.push(TokenKind::Deletion, "-", offset);
        offset += 1;
        rest
    } else {
        trimmed_start
    };

    let c = content.trim();
    match c {
        "" => {}
        "<..." => lx.push(TokenKind::OptDotsBegin, c, offset),
        "...>" => lx.push(TokenKind::OptDotsEnd, c, offset),
        "(" => lx.push(TokenKind::DisjunctionBegin, c, offset),
        "|" => lx.push(TokenKind::DisjunctionContinue, c, offset),
        ")" => lx.push(TokenKind::DisjunctionEnd, c, offset),
        "when any" => lx.push(TokenKind::WhenAny, c, offset),
        "when exists" => lx.push(TokenKind::WhenExists, c, offset),
        _ if c.starts_with("when ") || c == "when" => {
            if let Some(arg) = c.strip_prefix("when !=") {
                lx.push(TokenKind::WhenNotEqual, arg.trim(), offset);
            } else {
                return Err(lx.err(
                    "`when any`, `when exists` or `when != <expr>` after dots",
                    offset,
                ));
            }
        }
        _ => {
            // Code, with `...` occurrences split out as dots tokens.
            let mut rest = content;
            let mut chunk_off = offset;
            loop {
                match rest.find("...") {
                    Some(i) => {
                        if !rest[..i].trim().is_empty() {
                            lx.push(TokenKind::Code, &rest[..i], chunk_off);
                        }
                        lx.push(TokenKind::Dots, "...", chunk_off + i);
                        rest = &rest[i + 3..];
                        chunk_off += i + 3;
                    }
                    None => {
                        if !rest.trim().is_empty() {
                            lx.push(TokenKind::Code, rest, chunk_off);
                        }
                        break;
                    }
                }
            }
        }
    }

    lx.push(TokenKind::Newline, "\n", line_start + line.len());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(tokens: &[Token]) -> Vec<TokenKind> {
        tokens.iter().map(|t| t.kind).collect()
    }

    #[test]
    fn empty_input_is_an_error() {
        assert!(matches!(lex(""), Err(LexError::Empty)));
        assert!(matches!(lex("  \n "), Err(LexError::Empty)));
    }

    #[test]
    fn anonymous_header_with_inline_metavars() {
        let tokens = lex("@@ identifier x; @@\n- foo(x);\n").unwrap();
        assert_eq!(
            kinds(&tokens),
            vec![
                TokenKind::MetavarType,
                TokenKind::MetavarIdentifier,
                TokenKind::Deletion,
                TokenKind::Code,
                TokenKind::Newline,
                TokenKind::Newline,
            ]
        );
        assert_eq!(tokens[0].text, "identifier");
        assert_eq!(tokens[1].text, "x");
        assert_eq!(tokens[3].text, " foo(x);");
    }

    #[test]
    fn named_rule_produces_rulename_token() {
        let tokens = lex("@ my_rule @\nidentifier x;\n@@\nfoo(x);\n").unwrap();
        assert_eq!(tokens[0].kind, TokenKind::Rulename);
        assert_eq!(tokens[0].text, "my_rule");
        assert_eq!(tokens[1].kind, TokenKind::MetavarType);
    }

    #[test]
    fn name_list_declares_each_identifier() {
        let tokens = lex("@@ identifier x, y, z; @@\nfoo(x);\n").unwrap();
        let idents: Vec<&str> = tokens
            .iter()
            .filter(|t| t.kind == TokenKind::MetavarIdentifier)
            .map(|t| t.text.as_str())
            .collect();
        assert_eq!(idents, vec!["x", "y", "z"]);
    }

    #[test]
    fn when_matches_clause_carries_the_quoted_regex() {
        let tokens = lex("@@ identifier x; x when matches \"^get.*\"; @@\nfoo(x);\n").unwrap();
        let wm = tokens
            .iter()
            .find(|t| t.kind == TokenKind::WhenMatches)
            .expect("when-matches token");
        assert_eq!(wm.text, "\"^get.*\"");
        // The re-referenced identifier precedes the constraint.
        let pos = tokens.iter().position(|t| t.kind == TokenKind::WhenMatches).unwrap();
        assert_eq!(tokens[pos - 1].kind, TokenKind::MetavarIdentifier);
        assert_eq!(tokens[pos - 1].text, "x");
    }

    #[test]
    fn body_markers_and_dots() {
        let tokens = lex("@@ @@\n  a();\n...\n+ b();\n  c();\n").unwrap();
        let significant: Vec<TokenKind> = kinds(&tokens)
            .into_iter()
            .filter(|k| *k != TokenKind::Newline)
            .collect();
        assert_eq!(
            significant,
            vec![
                TokenKind::Code,
                TokenKind::Dots,
                TokenKind::Addition,
                TokenKind::Code,
                TokenKind::Code,
            ]
        );
    }

    #[test]
    fn inline_dots_split_code_tokens() {
        let tokens = lex("@@ @@\nfoo(...);\n").unwrap();
        let significant: Vec<(TokenKind, &str)> = tokens
            .iter()
            .filter(|t| t.kind != TokenKind::Newline)
            .map(|t| (t.kind, t.text.as_str()))
            .collect();
        assert_eq!(
            significant,
            vec![
                (TokenKind::Code, "foo("),
                (TokenKind::Dots, "..."),
                (TokenKind::Code, ");"),
            ]
        );
    }

    #[test]
    fn dots_constraints_lex_as_when_tokens() {
        let tokens = lex("@@ @@\n...\nwhen != x\nwhen any\nwhen exists\n").unwrap();
        let significant: Vec<TokenKind> = kinds(&tokens)
            .into_iter()
            .filter(|k| *k != TokenKind::Newline)
            .collect();
        assert_eq!(
            significant,
            vec![
                TokenKind::Dots,
                TokenKind::WhenNotEqual,
                TokenKind::WhenAny,
                TokenKind::WhenExists,
            ]
        );
        let neq = tokens
            .iter()
            .find(|t| t.kind == TokenKind::WhenNotEqual)
            .unwrap();
        assert_eq!(neq.text, "x");
    }

    #[test]
    fn unknown_when_form_is_an_error() {
        assert!(lex("@@ @@\n...\nwhen sometimes\n").is_err());
    }

    #[test]
    fn optional_dots_and_disjunction_tokens_are_recognized() {
        let tokens = lex("@@ @@\n<...\nfoo();\n...>\n(\na();\n|\nb();\n)\n").unwrap();
        let ks = kinds(&tokens);
        assert!(ks.contains(&TokenKind::OptDotsBegin));
        assert!(ks.contains(&TokenKind::OptDotsEnd));
        assert!(ks.contains(&TokenKind::DisjunctionBegin));
        assert!(ks.contains(&TokenKind::DisjunctionContinue));
        assert!(ks.contains(&TokenKind::DisjunctionEnd));
    }

    #[test]
    fn missing_terminator_is_an_error() {
        assert!(lex("@@ identifier x;\nfoo(x);\n").is_err());
    }

    #[test]
    fn positions_are_line_and_column_accurate() {
        let tokens = lex("@@ @@\n- foo();\n").unwrap();
        let deletion = tokens
            .iter()
            .find(|t| t.kind == TokenKind::Deletion)
            .unwrap();
        assert_eq!(deletion.pos.line, 2);
        assert_eq!(deletion.pos.column, 1);
    }
}
