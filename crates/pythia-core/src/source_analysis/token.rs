// Copyright 2026 James Casey
// SPDX-License-Identifier: Apache-2.0

//! Token types for Python lexical analysis.
//!
//! The lexer produces a flat stream of [`Token`]s. Indentation has already
//! been resolved into explicit [`TokenKind::Indent`]/[`TokenKind::Dedent`]
//! markers by the time the parser sees the stream, and logical line breaks
//! appear as [`TokenKind::NewLine`] (suppressed inside brackets).
//!
//! Tokens are cheap to clone: string payloads use [`EcoString`].

use ecow::EcoString;

use super::Span;

/// The kind of token, including any literal payload.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TokenKind {
    // === Literals ===
    /// An identifier: `foo`, `_x`, `Klass`
    Ident(EcoString),
    /// An integer literal: `42`, `0x1f`, `0o17`, `0b101`
    Int(EcoString),
    /// A long integer literal: `42L`
    Long(EcoString),
    /// A floating-point literal: `3.14`, `1e-5`
    Float(EcoString),
    /// An imaginary literal: `2j`
    Imag(EcoString),
    /// A string literal, with prefix and quotes included: `r"x"`, `'''y'''`
    Str(EcoString),

    // === Keywords ===
    And,
    As,
    Assert,
    Async,
    Await,
    Break,
    Class,
    Continue,
    Def,
    Del,
    Elif,
    Else,
    Except,
    Finally,
    For,
    From,
    Global,
    If,
    Import,
    In,
    Is,
    Lambda,
    NonLocal,
    Not,
    Or,
    Pass,
    Raise,
    Return,
    Try,
    While,
    With,
    Yield,

    // === Operators ===
    Add,
    Sub,
    Mul,
    Pow,
    Div,
    Truediv,
    Pct,
    BitAnd,
    BitOr,
    BitXor,
    BitNot,
    BitLshift,
    BitRshift,
    Assign,
    AddAssign,
    SubAssign,
    MulAssign,
    DivAssign,
    TruedivAssign,
    PctAssign,
    PowAssign,
    BitAndAssign,
    BitOrAssign,
    BitXorAssign,
    BitLshiftAssign,
    BitRshiftAssign,
    Eq,
    Ne,
    /// Python 2 inequality: `<>`
    Lg,
    Lt,
    Le,
    Gt,
    Ge,

    // === Delimiters ===
    Lparen,
    Rparen,
    Lbrack,
    Rbrack,
    Lbrace,
    Rbrace,
    Comma,
    Period,
    Semicolon,
    Colon,
    At,
    Backtick,
    Arrow,

    // === Layout ===
    /// A logical line break (consecutive physical newlines collapse to one)
    NewLine,
    /// Indentation increased relative to the previous logical line
    Indent,
    /// Indentation decreased; one token per level popped
    Dedent,

    // === Special ===
    /// A comment, `#` through end of line (emitted only when requested)
    Comment(EcoString),
    /// An IPython magic line, `%foo ...` (treated like a comment)
    Magic(EcoString),
    /// A virtual token injected at the caller's edit-cursor offset
    Cursor,
    /// A character the scanner could not classify
    Illegal(EcoString),
    /// End of file
    Eof,
}

impl TokenKind {
    /// Looks up an identifier, returning the keyword kind if it is one.
    ///
    /// `print` and `exec` stay identifiers so Python 3 code can use them as
    /// names; the parser special-cases their statement forms.
    #[must_use]
    pub fn lookup_ident(ident: &str) -> Self {
        match ident {
            "and" => Self::And,
            "as" => Self::As,
            "assert" => Self::Assert,
            "async" => Self::Async,
            "await" => Self::Await,
            "break" => Self::Break,
            "class" => Self::Class,
            "continue" => Self::Continue,
            "def" => Self::Def,
            "del" => Self::Del,
            "elif" => Self::Elif,
            "else" => Self::Else,
            "except" => Self::Except,
            "finally" => Self::Finally,
            "for" => Self::For,
            "from" => Self::From,
            "global" => Self::Global,
            "if" => Self::If,
            "import" => Self::Import,
            "in" => Self::In,
            "is" => Self::Is,
            "lambda" => Self::Lambda,
            "nonlocal" => Self::NonLocal,
            "not" => Self::Not,
            "or" => Self::Or,
            "pass" => Self::Pass,
            "raise" => Self::Raise,
            "return" => Self::Return,
            "try" => Self::Try,
            "while" => Self::While,
            "with" => Self::With,
            "yield" => Self::Yield,
            _ => Self::Ident(ident.into()),
        }
    }

    /// Returns `true` if this token is a literal value.
    #[must_use]
    pub const fn is_literal(&self) -> bool {
        matches!(
            self,
            Self::Int(_)
                | Self::Long(_)
                | Self::Float(_)
                | Self::Imag(_)
                | Self::Str(_)
        )
    }

    /// Returns `true` if this token is a numeric literal.
    #[must_use]
    pub const fn is_number(&self) -> bool {
        matches!(
            self,
            Self::Int(_) | Self::Long(_) | Self::Float(_) | Self::Imag(_)
        )
    }

    /// Returns `true` if this token is a keyword.
    #[must_use]
    pub const fn is_keyword(&self) -> bool {
        matches!(
            self,
            Self::And
                | Self::As
                | Self::Assert
                | Self::Async
                | Self::Await
                | Self::Break
                | Self::Class
                | Self::Continue
                | Self::Def
                | Self::Del
                | Self::Elif
                | Self::Else
                | Self::Except
                | Self::Finally
                | Self::For
                | Self::From
                | Self::Global
                | Self::If
                | Self::Import
                | Self::In
                | Self::Is
                | Self::Lambda
                | Self::NonLocal
                | Self::Not
                | Self::Or
                | Self::Pass
                | Self::Raise
                | Self::Return
                | Self::Try
                | Self::While
                | Self::With
                | Self::Yield
        )
    }

    /// Returns `true` if this token can legally begin a statement.
    ///
    /// This is the resynchronization set for error recovery: after a syntax
    /// error the parser skips forward to the next token in this set.
    #[must_use]
    pub const fn begins_stmt(&self) -> bool {
        matches!(
            self,
            Self::Break
                | Self::Continue
                | Self::Return
                | Self::Raise
                | Self::Yield
                | Self::While
                | Self::Try
                | Self::With
                | Self::Def
                | Self::Class
                | Self::At
                | Self::Del
                | Self::Pass
                | Self::Import
                | Self::From
                | Self::Global
                | Self::Assert
                | Self::NonLocal
                | Self::Async
                | Self::Dedent
                | Self::Eof
        )
    }

    /// Returns `true` if this is trivia the parser skips entirely.
    #[must_use]
    pub const fn is_trivia(&self) -> bool {
        matches!(self, Self::Comment(_) | Self::Magic(_) | Self::Illegal(_))
    }

    /// Returns `true` if this is an augmented-assignment operator.
    #[must_use]
    pub const fn is_aug_assign(&self) -> bool {
        matches!(
            self,
            Self::AddAssign
                | Self::SubAssign
                | Self::MulAssign
                | Self::DivAssign
                | Self::TruedivAssign
                | Self::PctAssign
                | Self::PowAssign
                | Self::BitAndAssign
                | Self::BitOrAssign
                | Self::BitXorAssign
                | Self::BitLshiftAssign
                | Self::BitRshiftAssign
        )
    }

    /// Returns `true` if this is the end-of-file marker.
    #[must_use]
    pub const fn is_eof(&self) -> bool {
        matches!(self, Self::Eof)
    }

    /// Returns the string content if this token carries one.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Ident(s)
            | Self::Int(s)
            | Self::Long(s)
            | Self::Float(s)
            | Self::Imag(s)
            | Self::Str(s)
            | Self::Comment(s)
            | Self::Magic(s)
            | Self::Illegal(s) => Some(s),
            _ => None,
        }
    }
}

impl std::fmt::Display for TokenKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let fixed = match self {
            Self::Ident(s)
            | Self::Int(s)
            | Self::Long(s)
            | Self::Float(s)
            | Self::Imag(s)
            | Self::Str(s)
            | Self::Comment(s)
            | Self::Magic(s) => return write!(f, "{s}"),
            Self::Illegal(s) => return write!(f, "<illegal: {s}>"),
            Self::And => "and",
            Self::As => "as",
            Self::Assert => "assert",
            Self::Async => "async",
            Self::Await => "await",
            Self::Break => "break",
            Self::Class => "class",
            Self::Continue => "continue",
            Self::Def => "def",
            Self::Del => "del",
            Self::Elif => "elif",
            Self::Else => "else",
            Self::Except => "except",
            Self::Finally => "finally",
            Self::For => "for",
            Self::From => "from",
            Self::Global => "global",
            Self::If => "if",
            Self::Import => "import",
            Self::In => "in",
            Self::Is => "is",
            Self::Lambda => "lambda",
            Self::NonLocal => "nonlocal",
            Self::Not => "not",
            Self::Or => "or",
            Self::Pass => "pass",
            Self::Raise => "raise",
            Self::Return => "return",
            Self::Try => "try",
            Self::While => "while",
            Self::With => "with",
            Self::Yield => "yield",
            Self::Add => "+",
            Self::Sub => "-",
            Self::Mul => "*",
            Self::Pow => "**",
            Self::Div => "/",
            Self::Truediv => "//",
            Self::Pct => "%",
            Self::BitAnd => "&",
            Self::BitOr => "|",
            Self::BitXor => "^",
            Self::BitNot => "~",
            Self::BitLshift => "<<",
            Self::BitRshift => ">>",
            Self::Assign => "=",
            Self::AddAssign => "+=",
            Self::SubAssign => "-=",
            Self::MulAssign => "*=",
            Self::DivAssign => "/=",
            Self::TruedivAssign => "//=",
            Self::PctAssign => "%=",
            Self::PowAssign => "**=",
            Self::BitAndAssign => "&=",
            Self::BitOrAssign => "|=",
            Self::BitXorAssign => "^=",
            Self::BitLshiftAssign => "<<=",
            Self::BitRshiftAssign => ">>=",
            Self::Eq => "==",
            Self::Ne => "!=",
            Self::Lg => "<>",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Gt => ">",
            Self::Ge => ">=",
            Self::Lparen => "(",
            Self::Rparen => ")",
            Self::Lbrack => "[",
            Self::Rbrack => "]",
            Self::Lbrace => "{",
            Self::Rbrace => "}",
            Self::Comma => ",",
            Self::Period => ".",
            Self::Semicolon => ";",
            Self::Colon => ":",
            Self::At => "@",
            Self::Backtick => "`",
            Self::Arrow => "->",
            Self::NewLine => "<newline>",
            Self::Indent => "<indent>",
            Self::Dedent => "<dedent>",
            Self::Cursor => "<cursor>",
            Self::Eof => "<eof>",
        };
        write!(f, "{fixed}")
    }
}

/// A token with its source location.
///
/// # Examples
///
/// ```
/// use pythia_core::source_analysis::{Span, Token, TokenKind};
///
/// let token = Token::new(TokenKind::Ident("foo".into()), Span::new(0, 3));
/// assert!(matches!(token.kind(), TokenKind::Ident(_)));
/// assert_eq!(token.span().len(), 3);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    kind: TokenKind,
    span: Span,
}

impl Token {
    /// Creates a new token.
    #[must_use]
    pub fn new(kind: TokenKind, span: Span) -> Self {
        Self { kind, span }
    }

    /// Returns the kind of this token.
    #[must_use]
    pub fn kind(&self) -> &TokenKind {
        &self.kind
    }

    /// Consumes the token and returns its kind.
    #[must_use]
    pub fn into_kind(self) -> TokenKind {
        self.kind
    }

    /// Returns the source span of this token.
    #[must_use]
    pub fn span(&self) -> Span {
        self.span
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keyword_lookup() {
        assert_eq!(TokenKind::lookup_ident("def"), TokenKind::Def);
        assert_eq!(TokenKind::lookup_ident("nonlocal"), TokenKind::NonLocal);
        assert_eq!(
            TokenKind::lookup_ident("defer"),
            TokenKind::Ident("defer".into())
        );
    }

    #[test]
    fn token_kind_display() {
        assert_eq!(TokenKind::Ident("foo".into()).to_string(), "foo");
        assert_eq!(TokenKind::Truediv.to_string(), "//");
        assert_eq!(TokenKind::Lg.to_string(), "<>");
        assert_eq!(TokenKind::Arrow.to_string(), "->");
        assert_eq!(TokenKind::Dedent.to_string(), "<dedent>");
        assert_eq!(TokenKind::Eof.to_string(), "<eof>");
    }

    #[test]
    fn token_kind_predicates() {
        assert!(TokenKind::Int("1".into()).is_literal());
        assert!(TokenKind::Str("'x'".into()).is_literal());
        assert!(!TokenKind::Ident("x".into()).is_literal());

        assert!(TokenKind::Long("3L".into()).is_number());
        assert!(!TokenKind::Str("'x'".into()).is_number());

        assert!(TokenKind::Lambda.is_keyword());
        assert!(!TokenKind::Colon.is_keyword());

        assert!(TokenKind::PowAssign.is_aug_assign());
        assert!(!TokenKind::Assign.is_aug_assign());

        assert!(TokenKind::Eof.is_eof());
        assert!(TokenKind::Comment("# hi".into()).is_trivia());
    }

    #[test]
    fn statement_boundary_set() {
        assert!(TokenKind::Def.begins_stmt());
        assert!(TokenKind::At.begins_stmt());
        assert!(TokenKind::Dedent.begins_stmt());
        assert!(TokenKind::Eof.begins_stmt());
        // `if` and `for` are deliberately absent: they also appear inside
        // expressions (conditional expressions, comprehensions), so they make
        // poor resynchronization points.
        assert!(!TokenKind::If.begins_stmt());
        assert!(!TokenKind::For.begins_stmt());
        assert!(!TokenKind::Ident("x".into()).begins_stmt());
    }

    #[test]
    fn token_accessors() {
        let token = Token::new(TokenKind::Int("42".into()), Span::new(4, 6));
        assert_eq!(token.span().start(), 4);
        assert!(matches!(token.kind(), TokenKind::Int(s) if s == "42"));
        assert!(matches!(token.into_kind(), TokenKind::Int(_)));
    }
}
