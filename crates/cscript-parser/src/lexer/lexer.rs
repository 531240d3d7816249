//! Tokenizer for cscript source.

use bumpalo::Bump;
use cscript_core::{LexError, Span};

use super::cursor::Cursor;
use super::token::{Token, TokenKind};

/// The cscript lexer.
///
/// Copies every lexeme into the arena so tokens outlive the source string.
pub struct Lexer<'src, 'ast> {
    cursor: Cursor<'src>,
    arena: &'ast Bump,
}

impl<'src, 'ast> Lexer<'src, 'ast> {
    /// Tokenize an entire source string.
    ///
    /// The returned token list always ends with an [`TokenKind::Eof`]
    /// token.
    pub fn tokenize(source: &'src str, arena: &'ast Bump) -> Result<Vec<Token<'ast>>, LexError> {
        let mut lexer = Lexer {
            cursor: Cursor::new(source),
            arena,
        };
        let mut tokens = Vec::new();
        loop {
            let token = lexer.next_token()?;
            let done = token.kind == TokenKind::Eof;
            tokens.push(token);
            if done {
                return Ok(tokens);
            }
        }
    }

    fn next_token(&mut self) -> Result<Token<'ast>, LexError> {
        self.skip_trivia()?;

        let line = self.cursor.line();
        let col = self.cursor.column();
        let start = self.cursor.offset();

        let Some(ch) = self.cursor.advance() else {
            return Ok(Token::new(TokenKind::Eof, "", Span::point(line, col)));
        };

        let kind = match ch {
            '(' => TokenKind::LParen,
            ')' => TokenKind::RParen,
            '{' => TokenKind::LBrace,
            '}' => TokenKind::RBrace,
            '[' => TokenKind::LBracket,
            ']' => TokenKind::RBracket,
            ';' => TokenKind::Semicolon,
            ',' => TokenKind::Comma,
            '$' => TokenKind::Dollar,
            '%' => TokenKind::Percent,
            '+' => {
                if self.cursor.eat('+') {
                    TokenKind::PlusPlus
                } else if self.cursor.eat('=') {
                    TokenKind::PlusAssign
                } else {
                    TokenKind::Plus
                }
            }
            '-' => {
                if self.cursor.eat('-') {
                    TokenKind::MinusMinus
                } else if self.cursor.eat('=') {
                    TokenKind::MinusAssign
                } else {
                    TokenKind::Minus
                }
            }
            '*' => {
                if self.cursor.eat('=') {
                    TokenKind::StarAssign
                } else {
                    TokenKind::Star
                }
            }
            '/' => {
                if self.cursor.eat('=') {
                    TokenKind::SlashAssign
                } else {
                    TokenKind::Slash
                }
            }
            '=' => {
                if self.cursor.eat('=') {
                    TokenKind::EqEq
                } else {
                    TokenKind::Assign
                }
            }
            '!' => {
                if self.cursor.eat('=') {
                    TokenKind::NotEq
                } else {
                    return Err(LexError::UnexpectedChar {
                        ch,
                        span: Span::point(line, col),
                    });
                }
            }
            '<' => {
                if self.cursor.eat('=') {
                    TokenKind::Le
                } else {
                    TokenKind::Lt
                }
            }
            '>' => {
                if self.cursor.eat('=') {
                    TokenKind::Ge
                } else {
                    TokenKind::Gt
                }
            }
            c if c.is_ascii_digit() => return self.number(start, line, col),
            c if c.is_ascii_alphabetic() || c == '_' => {
                self.cursor
                    .eat_while(|c| c.is_ascii_alphanumeric() || c == '_');
                let text = self.cursor.slice_from(start);
                let kind = TokenKind::keyword(text).unwrap_or(TokenKind::Identifier);
                return Ok(self.token(kind, start, line, col));
            }
            _ => {
                return Err(LexError::UnexpectedChar {
                    ch,
                    span: Span::point(line, col),
                });
            }
        };

        Ok(self.token(kind, start, line, col))
    }

    /// Lex an integer or float literal.
    fn number(&mut self, start: u32, line: u32, col: u32) -> Result<Token<'ast>, LexError> {
        self.cursor.eat_while(|c| c.is_ascii_digit());

        // A '.' followed by a digit makes this a float literal.
        let mut kind = TokenKind::IntLiteral;
        if self.cursor.peek() == Some('.') && self.cursor.peek_nth(1).is_some_and(|c| c.is_ascii_digit()) {
            self.cursor.advance();
            self.cursor.eat_while(|c| c.is_ascii_digit());
            kind = TokenKind::FloatLiteral;
        }

        let text = self.cursor.slice_from(start);
        let span = Span::new(line, col, text.len() as u32);
        let valid = match kind {
            TokenKind::IntLiteral => text.parse::<i64>().is_ok(),
            _ => text.parse::<f64>().is_ok(),
        };
        if !valid {
            return Err(LexError::InvalidNumber {
                text: text.to_string(),
                span,
            });
        }
        Ok(Token::new(kind, self.arena.alloc_str(text), span))
    }

    /// Skip whitespace and comments.
    fn skip_trivia(&mut self) -> Result<(), LexError> {
        loop {
            self.cursor.eat_while(|c| c.is_whitespace());
            if self.cursor.peek() == Some('/') && self.cursor.peek_nth(1) == Some('/') {
                self.cursor.eat_while(|c| c != '\n');
            } else if self.cursor.peek() == Some('/') && self.cursor.peek_nth(1) == Some('*') {
                let line = self.cursor.line();
                let col = self.cursor.column();
                self.cursor.advance();
                self.cursor.advance();
                loop {
                    if self.cursor.is_eof() {
                        return Err(LexError::UnterminatedComment {
                            span: Span::point(line, col),
                        });
                    }
                    if self.cursor.eat('*') && self.cursor.eat('/') {
                        break;
                    }
                    if !self.cursor.is_eof() && self.cursor.peek() != Some('*') {
                        self.cursor.advance();
                    }
                }
            } else {
                return Ok(());
            }
        }
    }

    fn token(&self, kind: TokenKind, start: u32, line: u32, col: u32) -> Token<'ast> {
        let text = self.cursor.slice_from(start);
        let span = Span::new(line, col, text.len() as u32);
        Token::new(kind, self.arena.alloc_str(text), span)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<TokenKind> {
        let arena = Bump::new();
        Lexer::tokenize(source, &arena)
            .unwrap()
            .iter()
            .map(|t| t.kind)
            .collect()
    }

    #[test]
    fn lexes_declaration() {
        assert_eq!(
            kinds("int x = 5;"),
            vec![
                TokenKind::Int,
                TokenKind::Identifier,
                TokenKind::Assign,
                TokenKind::IntLiteral,
                TokenKind::Semicolon,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn distinguishes_compound_operators() {
        assert_eq!(
            kinds("+= ++ + == = <= <"),
            vec![
                TokenKind::PlusAssign,
                TokenKind::PlusPlus,
                TokenKind::Plus,
                TokenKind::EqEq,
                TokenKind::Assign,
                TokenKind::Le,
                TokenKind::Lt,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn lexes_float_and_int_literals() {
        let arena = Bump::new();
        let tokens = Lexer::tokenize("3.14 42", &arena).unwrap();
        assert_eq!(tokens[0].kind, TokenKind::FloatLiteral);
        assert_eq!(tokens[0].lexeme, "3.14");
        assert_eq!(tokens[1].kind, TokenKind::IntLiteral);
        assert_eq!(tokens[1].lexeme, "42");
    }

    #[test]
    fn globals_lex_as_dollar_then_identifier() {
        assert_eq!(
            kinds("$total"),
            vec![TokenKind::Dollar, TokenKind::Identifier, TokenKind::Eof]
        );
    }

    #[test]
    fn skips_comments() {
        assert_eq!(
            kinds("1 // line\n/* block\n */ 2"),
            vec![TokenKind::IntLiteral, TokenKind::IntLiteral, TokenKind::Eof]
        );
    }

    #[test]
    fn unterminated_comment_errors() {
        let arena = Bump::new();
        let err = Lexer::tokenize("/* oops", &arena).unwrap_err();
        assert!(matches!(err, LexError::UnterminatedComment { .. }));
    }

    #[test]
    fn tracks_spans_across_lines() {
        let arena = Bump::new();
        let tokens = Lexer::tokenize("1\n  x", &arena).unwrap();
        assert_eq!(tokens[1].span.line, 2);
        assert_eq!(tokens[1].span.col, 3);
    }
}
