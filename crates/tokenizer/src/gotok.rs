//! Lexical scanner for Go source code.
//!
//! Token ids follow the numbering of Go's `go/token` package, extended with
//! three whitespace kinds (`SPACE`, `NEWLINE`, `TAB`) placed right after
//! `TILDE`. Whitespace between tokens is reported explicitly so that the
//! concatenation of all token literals reproduces the input, minus carriage
//! returns.

use serde::Serialize;

macro_rules! token_kinds {
    ($($variant:ident = $id:literal => $name:literal,)*) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
        pub enum TokenKind {
            $($variant = $id,)*
        }

        impl TokenKind {
            pub const ALL: &'static [TokenKind] = &[$(TokenKind::$variant,)*];

            /// Name as printed by Go's `token.Token.String()`.
            pub fn name(self) -> &'static str {
                match self {
                    $(TokenKind::$variant => $name,)*
                }
            }
        }
    };
}

token_kinds! {
    Illegal = 0 => "ILLEGAL",
    Eof = 1 => "EOF",
    Comment = 2 => "COMMENT",
    Ident = 4 => "IDENT",
    Int = 5 => "INT",
    Float = 6 => "FLOAT",
    Imag = 7 => "IMAG",
    Char = 8 => "CHAR",
    String = 9 => "STRING",
    Add = 12 => "+",
    Sub = 13 => "-",
    Mul = 14 => "*",
    Quo = 15 => "/",
    Rem = 16 => "%",
    And = 17 => "&",
    Or = 18 => "|",
    Xor = 19 => "^",
    Shl = 20 => "<<",
    Shr = 21 => ">>",
    AndNot = 22 => "&^",
    AddAssign = 23 => "+=",
    SubAssign = 24 => "-=",
    MulAssign = 25 => "*=",
    QuoAssign = 26 => "/=",
    RemAssign = 27 => "%=",
    AndAssign = 28 => "&=",
    OrAssign = 29 => "|=",
    XorAssign = 30 => "^=",
    ShlAssign = 31 => "<<=",
    ShrAssign = 32 => ">>=",
    AndNotAssign = 33 => "&^=",
    LAnd = 34 => "&&",
    LOr = 35 => "||",
    Arrow = 36 => "<-",
    Inc = 37 => "++",
    Dec = 38 => "--",
    Eql = 39 => "==",
    Lss = 40 => "<",
    Gtr = 41 => ">",
    Assign = 42 => "=",
    Not = 43 => "!",
    Neq = 44 => "!=",
    Leq = 45 => "<=",
    Geq = 46 => ">=",
    Define = 47 => ":=",
    Ellipsis = 48 => "...",
    LParen = 49 => "(",
    LBrack = 50 => "[",
    LBrace = 51 => "{",
    Comma = 52 => ",",
    Period = 53 => ".",
    RParen = 54 => ")",
    RBrack = 55 => "]",
    RBrace = 56 => "}",
    Semicolon = 57 => ";",
    Colon = 58 => ":",
    Break = 61 => "break",
    Case = 62 => "case",
    Chan = 63 => "chan",
    Const = 64 => "const",
    Continue = 65 => "continue",
    Default = 66 => "default",
    Defer = 67 => "defer",
    Else = 68 => "else",
    Fallthrough = 69 => "fallthrough",
    For = 70 => "for",
    Func = 71 => "func",
    Go = 72 => "go",
    Goto = 73 => "goto",
    If = 74 => "if",
    Import = 75 => "import",
    Interface = 76 => "interface",
    Map = 77 => "map",
    Package = 78 => "package",
    Range = 79 => "range",
    Return = 80 => "return",
    Select = 81 => "select",
    Struct = 82 => "struct",
    Switch = 83 => "switch",
    Type = 84 => "type",
    Var = 85 => "var",
    Tilde = 88 => "~",
    Space = 89 => "SPACE",
    Newline = 90 => "NEWLINE",
    Tab = 91 => "TAB",
}

/// Operators ordered so that longer spellings are tried first.
const OPERATORS: &[(&str, TokenKind)] = &[
    ("&^=", TokenKind::AndNotAssign),
    ("<<=", TokenKind::ShlAssign),
    (">>=", TokenKind::ShrAssign),
    ("...", TokenKind::Ellipsis),
    ("+=", TokenKind::AddAssign),
    ("-=", TokenKind::SubAssign),
    ("*=", TokenKind::MulAssign),
    ("/=", TokenKind::QuoAssign),
    ("%=", TokenKind::RemAssign),
    ("&=", TokenKind::AndAssign),
    ("|=", TokenKind::OrAssign),
    ("^=", TokenKind::XorAssign),
    ("&^", TokenKind::AndNot),
    ("<<", TokenKind::Shl),
    (">>", TokenKind::Shr),
    ("&&", TokenKind::LAnd),
    ("||", TokenKind::LOr),
    ("<-", TokenKind::Arrow),
    ("++", TokenKind::Inc),
    ("--", TokenKind::Dec),
    ("==", TokenKind::Eql),
    ("!=", TokenKind::Neq),
    ("<=", TokenKind::Leq),
    (">=", TokenKind::Geq),
    (":=", TokenKind::Define),
    ("+", TokenKind::Add),
    ("-", TokenKind::Sub),
    ("*", TokenKind::Mul),
    ("/", TokenKind::Quo),
    ("%", TokenKind::Rem),
    ("&", TokenKind::And),
    ("|", TokenKind::Or),
    ("^", TokenKind::Xor),
    ("<", TokenKind::Lss),
    (">", TokenKind::Gtr),
    ("=", TokenKind::Assign),
    ("!", TokenKind::Not),
    ("(", TokenKind::LParen),
    ("[", TokenKind::LBrack),
    ("{", TokenKind::LBrace),
    (",", TokenKind::Comma),
    (".", TokenKind::Period),
    (")", TokenKind::RParen),
    ("]", TokenKind::RBrack),
    ("}", TokenKind::RBrace),
    (";", TokenKind::Semicolon),
    (":", TokenKind::Colon),
    ("~", TokenKind::Tilde),
];

impl TokenKind {
    pub fn id(self) -> u32 {
        self as u32
    }

    /// Kinds whose text varies from one occurrence to the next.
    pub fn has_variable_text(self) -> bool {
        matches!(
            self,
            TokenKind::Illegal
                | TokenKind::Comment
                | TokenKind::Ident
                | TokenKind::Int
                | TokenKind::Float
                | TokenKind::Imag
                | TokenKind::Char
                | TokenKind::String
        )
    }

    /// The only text a fixed-text kind can have.
    pub fn fixed_text(self) -> Option<&'static str> {
        match self {
            TokenKind::Space => Some(" "),
            TokenKind::Newline => Some("\n"),
            TokenKind::Tab => Some("\t"),
            TokenKind::Eof => None,
            k if k.has_variable_text() => None,
            k => Some(k.name()),
        }
    }

    fn keyword(ident: &str) -> Option<TokenKind> {
        let kind = match ident {
            "break" => TokenKind::Break,
            "case" => TokenKind::Case,
            "chan" => TokenKind::Chan,
            "const" => TokenKind::Const,
            "continue" => TokenKind::Continue,
            "default" => TokenKind::Default,
            "defer" => TokenKind::Defer,
            "else" => TokenKind::Else,
            "fallthrough" => TokenKind::Fallthrough,
            "for" => TokenKind::For,
            "func" => TokenKind::Func,
            "go" => TokenKind::Go,
            "goto" => TokenKind::Goto,
            "if" => TokenKind::If,
            "import" => TokenKind::Import,
            "interface" => TokenKind::Interface,
            "map" => TokenKind::Map,
            "package" => TokenKind::Package,
            "range" => TokenKind::Range,
            "return" => TokenKind::Return,
            "select" => TokenKind::Select,
            "struct" => TokenKind::Struct,
            "switch" => TokenKind::Switch,
            "type" => TokenKind::Type,
            "var" => TokenKind::Var,
            _ => return None,
        };
        Some(kind)
    }

    /// Whether a newline directly after this token ends the statement.
    fn inserts_semicolon(self) -> bool {
        matches!(
            self,
            TokenKind::Ident
                | TokenKind::Int
                | TokenKind::Float
                | TokenKind::Imag
                | TokenKind::Char
                | TokenKind::String
                | TokenKind::Break
                | TokenKind::Continue
                | TokenKind::Fallthrough
                | TokenKind::Return
                | TokenKind::Inc
                | TokenKind::Dec
                | TokenKind::RParen
                | TokenKind::RBrack
                | TokenKind::RBrace
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScannedToken {
    pub kind: TokenKind,
    /// Byte range `[start, end)` of the token in the source.
    pub offset: (usize, usize),
    pub literal: String,
}

impl ScannedToken {
    /// True for the semicolon Go inserts in place of a line break.
    pub fn is_implicit_semicolon(&self) -> bool {
        self.kind == TokenKind::Semicolon && self.literal == "\n"
    }
}

struct Scanner<'a> {
    src: &'a str,
    pos: usize,
    insert_semi: bool,
    tokens: Vec<ScannedToken>,
}

impl<'a> Scanner<'a> {
    fn peek(&self) -> Option<char> {
        self.src[self.pos..].chars().next()
    }

    fn peek_at(&self, n: usize) -> Option<char> {
        self.src[self.pos..].chars().nth(n)
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += c.len_utf8();
        Some(c)
    }

    fn bump_while(&mut self, pred: impl Fn(char) -> bool) {
        while let Some(c) = self.peek() {
            if !pred(c) {
                break;
            }
            self.pos += c.len_utf8();
        }
    }

    fn push(&mut self, kind: TokenKind, start: usize) {
        self.tokens.push(ScannedToken {
            kind,
            offset: (start, self.pos),
            literal: self.src[start..self.pos].to_string(),
        });
    }

    fn run(mut self) -> Vec<ScannedToken> {
        while let Some(c) = self.peek() {
            let start = self.pos;
            match c {
                '\r' => {
                    self.bump();
                }
                '\n' => {
                    self.bump();
                    let kind = if self.insert_semi {
                        TokenKind::Semicolon
                    } else {
                        TokenKind::Newline
                    };
                    self.insert_semi = false;
                    self.tokens.push(ScannedToken {
                        kind,
                        offset: (start, self.pos),
                        literal: "\n".to_string(),
                    });
                }
                ' ' => {
                    self.bump();
                    self.push(TokenKind::Space, start);
                }
                '\t' => {
                    self.bump();
                    self.push(TokenKind::Tab, start);
                }
                // Comments keep the pending semicolon: the line break after a
                // trailing comment still terminates the statement.
                '/' if self.peek_at(1) == Some('/') => {
                    self.bump_while(|c| c != '\n');
                    self.push(TokenKind::Comment, start);
                }
                '/' if self.peek_at(1) == Some('*') => {
                    self.pos += 2;
                    match self.src[self.pos..].find("*/") {
                        Some(end) => self.pos += end + 2,
                        None => self.pos = self.src.len(),
                    }
                    self.push(TokenKind::Comment, start);
                }
                c if is_letter(c) => {
                    self.bump_while(|c| is_letter(c) || c.is_ascii_digit() || c.is_numeric());
                    let kind = TokenKind::keyword(&self.src[start..self.pos]).unwrap_or(TokenKind::Ident);
                    self.emit(kind, start);
                }
                c if c.is_ascii_digit()
                    || (c == '.' && self.peek_at(1).map_or(false, |n| n.is_ascii_digit())) =>
                {
                    let kind = self.number();
                    self.emit(kind, start);
                }
                '"' => {
                    self.bump();
                    self.quoted('"');
                    self.emit(TokenKind::String, start);
                }
                '\'' => {
                    self.bump();
                    self.quoted('\'');
                    self.emit(TokenKind::Char, start);
                }
                '`' => {
                    self.bump();
                    match self.src[self.pos..].find('`') {
                        Some(end) => self.pos += end + 1,
                        None => self.pos = self.src.len(),
                    }
                    self.emit(TokenKind::String, start);
                }
                _ => {
                    let rest = &self.src[self.pos..];
                    match OPERATORS.iter().find(|(op, _)| rest.starts_with(op)) {
                        Some((op, kind)) => {
                            self.pos += op.len();
                            self.emit(*kind, start);
                        }
                        None => {
                            self.bump();
                            self.emit(TokenKind::Illegal, start);
                        }
                    }
                }
            }
        }
        self.tokens
    }

    fn emit(&mut self, kind: TokenKind, start: usize) {
        self.insert_semi = kind.inserts_semicolon();
        self.push(kind, start);
    }

    /// Interpreted string or rune body; stops at the closing quote or, for
    /// malformed input, at the end of the line.
    fn quoted(&mut self, quote: char) {
        while let Some(c) = self.peek() {
            match c {
                '\n' => return,
                '\\' => {
                    self.bump();
                    if self.peek().map_or(false, |c| c != '\n') {
                        self.bump();
                    }
                }
                c if c == quote => {
                    self.bump();
                    return;
                }
                _ => {
                    self.bump();
                }
            }
        }
    }

    fn number(&mut self) -> TokenKind {
        let mut kind = TokenKind::Int;
        let prefix = match (self.peek(), self.peek_at(1)) {
            (Some('0'), Some(p)) if "xXbBoO".contains(p) => Some(p.to_ascii_lowercase()),
            _ => None,
        };

        if let Some(prefix) = prefix {
            self.pos += 2;
            let hex = prefix == 'x';
            self.bump_while(|c| c.is_ascii_hexdigit() || c == '_');
            if hex {
                if self.peek() == Some('.') {
                    kind = TokenKind::Float;
                    self.bump();
                    self.bump_while(|c| c.is_ascii_hexdigit() || c == '_');
                }
                if matches!(self.peek(), Some('p' | 'P')) {
                    kind = TokenKind::Float;
                    self.exponent();
                }
            }
        } else {
            self.bump_while(|c| c.is_ascii_digit() || c == '_');
            if self.peek() == Some('.') {
                kind = TokenKind::Float;
                self.bump();
                self.bump_while(|c| c.is_ascii_digit() || c == '_');
            }
            if matches!(self.peek(), Some('e' | 'E')) {
                kind = TokenKind::Float;
                self.exponent();
            }
        }

        if self.peek() == Some('i') {
            self.bump();
            kind = TokenKind::Imag;
        }
        kind
    }

    fn exponent(&mut self) {
        self.bump();
        if matches!(self.peek(), Some('+' | '-')) {
            self.bump();
        }
        self.bump_while(|c| c.is_ascii_digit() || c == '_');
    }
}

fn is_letter(c: char) -> bool {
    c == '_' || c.is_alphabetic()
}

/// Splits Go source into tokens, whitespace included.
pub fn scan(src: &str) -> Vec<ScannedToken> {
    Scanner {
        src,
        pos: 0,
        insert_semi: false,
        tokens: Vec::new(),
    }
    .run()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(src: &str) -> Vec<TokenKind> {
        scan(src).into_iter().map(|t| t.kind).collect()
    }

    #[test]
    fn test_ids_follow_go_token_numbering() {
        assert_eq!(TokenKind::Ident.id(), 4);
        assert_eq!(TokenKind::Func.id(), 71);
        assert_eq!(TokenKind::Tilde.id(), 88);
        assert_eq!(TokenKind::Space.id(), 89);
        assert_eq!(TokenKind::Newline.id(), 90);
        assert_eq!(TokenKind::Tab.id(), 91);
        assert_eq!(TokenKind::Define.id(), 47);
    }

    #[test]
    fn test_simple_statement() {
        use TokenKind::*;
        assert_eq!(
            kinds("x := a[1] + 2.5"),
            vec![Ident, Space, Define, Space, Ident, LBrack, Int, RBrack, Space, Add, Space, Float]
        );
    }

    #[test]
    fn test_implicit_semicolons() {
        let tokens = scan("func main() {\n\treturn\n}\n");
        let semis = tokens.iter().filter(|t| t.is_implicit_semicolon()).count();
        // after `return` and after the closing brace
        assert_eq!(semis, 2);
        // the newline after `{` is plain whitespace
        assert!(tokens.iter().any(|t| t.kind == TokenKind::Newline));
        assert!(tokens.iter().any(|t| t.kind == TokenKind::Tab));
    }

    #[test]
    fn test_literals_round_trip() {
        let src = concat!(
            "package main\n",
            "\n",
            "import \"fmt\"\n",
            "\n",
            "// greet prints a greeting.\n",
            "func greet(name string) {\n",
            "\ts := `raw\nstring`\n",
            "\tr := '\\''\n",
            "\tn := 0x1F + 1e3 + 3i + 0b1010 + .5\n",
            "\t/* block */ fmt.Println(\"hi, \\\"\" + name, s, r, n)\n",
            "\tch <- n\n",
            "\tx &^= 1\n",
            "}\n",
        );
        let tokens = scan(src);
        let rebuilt: String = tokens.iter().map(|t| t.literal.as_str()).collect();
        assert_eq!(rebuilt, src);

        let find = |kind| tokens.iter().filter(move |t| t.kind == kind).map(|t| t.literal.as_str());
        assert!(find(TokenKind::String).any(|l| l == "`raw\nstring`"));
        assert!(find(TokenKind::String).any(|l| l == r#""hi, \"""#));
        assert!(find(TokenKind::Char).any(|l| l == r"'\''"));
        assert!(find(TokenKind::Imag).any(|l| l == "3i"));
        assert!(find(TokenKind::Float).any(|l| l == "1e3"));
        assert!(find(TokenKind::Float).any(|l| l == ".5"));
        assert!(find(TokenKind::Int).any(|l| l == "0x1F"));
        assert!(find(TokenKind::Comment).any(|l| l == "/* block */"));
        assert!(find(TokenKind::Comment).any(|l| l == "// greet prints a greeting."));
        assert_eq!(find(TokenKind::Arrow).count(), 1);
        assert_eq!(find(TokenKind::AndNotAssign).count(), 1);
    }

    #[test]
    fn test_carriage_returns_are_dropped() {
        let tokens = scan("a\r\nb");
        let rebuilt: String = tokens.iter().map(|t| t.literal.as_str()).collect();
        assert_eq!(rebuilt, "a\nb");
    }

    #[test]
    fn test_unknown_character_is_illegal() {
        let tokens = scan("a @ b");
        assert_eq!(tokens[2].kind, TokenKind::Illegal);
        assert_eq!(tokens[2].literal, "@");
    }

    #[test]
    fn test_fixed_text() {
        assert_eq!(TokenKind::Func.fixed_text(), Some("func"));
        assert_eq!(TokenKind::ShlAssign.fixed_text(), Some("<<="));
        assert_eq!(TokenKind::Tab.fixed_text(), Some("\t"));
        assert_eq!(TokenKind::Ident.fixed_text(), None);
    }
}
