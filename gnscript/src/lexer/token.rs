//! Token definitions

use logos::Logos;

/// GN Script token
#[derive(Logos, Debug, Clone, PartialEq)]
#[logos(skip r"[ \t\n\r]+")]
#[logos(skip r"//[^\n]*")]
pub enum Token {
    // Statements
    #[token("print")]
    Print,
    #[token("printInline")]
    PrintInline,
    #[token("if")]
    If,
    #[token("else")]
    Else,
    #[token("function")]
    Function,
    #[token("return")]
    Return,
    #[token("while")]
    While,
    #[token("for")]
    For,
    #[token("end")]
    End,
    #[token("input")]
    Input,
    #[token("void")]
    #[token("wuwei")]
    Void,
    #[token("throw")]
    Throw,
    #[token("import")]
    Import,
    #[token("extension")]
    Extension,

    // refbox object system
    #[token("refbox")]
    RefBox,
    #[token("create")]
    Create,
    #[token("exposed")]
    Exposed,
    #[token("guarded")]
    Guarded,
    #[token("abstract")]
    Abstract,
    #[token("const")]
    Const,

    // File primitives
    #[token("readFile")]
    ReadFile,
    #[token("readWholeFile")]
    ReadWholeFile,
    #[token("fileExists")]
    FileExists,

    // Literals
    #[regex(r"[0-9]+", |lex| lex.slice().parse::<i64>().ok())]
    IntLit(i64),
    #[regex(r#""([^"\\]|\\.)*""#, |lex| unescape(lex.slice()))]
    StringLit(String),
    #[regex(r"[A-Za-z_][A-Za-z0-9_]*", |lex| lex.slice().to_string())]
    Ident(String),

    // Operators
    #[token("+")]
    Plus,
    #[token("-")]
    Minus,
    #[token("**")]
    StarStar,
    #[token("*")]
    Star,
    #[token("/")]
    Slash,
    #[token("%")]
    Percent,
    #[token("==")]
    EqEq,
    #[token("<>")]
    NotEq,
    #[token("<=")]
    LtEq,
    #[token(">=")]
    GtEq,
    #[token("<")]
    Lt,
    #[token(">")]
    Gt,
    #[token("&&")]
    AndAnd,
    #[token("||")]
    OrOr,
    #[token("=")]
    Eq,

    // Punctuation
    #[token("(")]
    LParen,
    #[token(")")]
    RParen,
    #[token("[")]
    LBracket,
    #[token("]")]
    RBracket,
    #[token(",")]
    Comma,
    #[token(";")]
    Semi,
    #[token(":")]
    Colon,
    #[token(".")]
    Dot,
}

/// Strip the surrounding quotes and process escape sequences
fn unescape(literal: &str) -> String {
    let inner = &literal[1..literal.len() - 1];
    let mut result = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            result.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => result.push('\n'),
            Some('t') => result.push('\t'),
            Some('r') => result.push('\r'),
            Some('\\') => result.push('\\'),
            Some('"') => result.push('"'),
            Some(other) => {
                result.push('\\');
                result.push(other);
            }
            None => result.push('\\'),
        }
    }
    result
}

impl std::fmt::Display for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Token::Print => write!(f, "print"),
            Token::PrintInline => write!(f, "printInline"),
            Token::If => write!(f, "if"),
            Token::Else => write!(f, "else"),
            Token::Function => write!(f, "function"),
            Token::Return => write!(f, "return"),
            Token::While => write!(f, "while"),
            Token::For => write!(f, "for"),
            Token::End => write!(f, "end"),
            Token::Input => write!(f, "input"),
            Token::Void => write!(f, "void"),
            Token::Throw => write!(f, "throw"),
            Token::Import => write!(f, "import"),
            Token::Extension => write!(f, "extension"),
            Token::RefBox => write!(f, "refbox"),
            Token::Create => write!(f, "create"),
            Token::Exposed => write!(f, "exposed"),
            Token::Guarded => write!(f, "guarded"),
            Token::Abstract => write!(f, "abstract"),
            Token::Const => write!(f, "const"),
            Token::ReadFile => write!(f, "readFile"),
            Token::ReadWholeFile => write!(f, "readWholeFile"),
            Token::FileExists => write!(f, "fileExists"),
            Token::IntLit(n) => write!(f, "{n}"),
            Token::StringLit(s) => write!(f, "\"{s}\""),
            Token::Ident(s) => write!(f, "{s}"),
            Token::Plus => write!(f, "+"),
            Token::Minus => write!(f, "-"),
            Token::StarStar => write!(f, "**"),
            Token::Star => write!(f, "*"),
            Token::Slash => write!(f, "/"),
            Token::Percent => write!(f, "%"),
            Token::EqEq => write!(f, "=="),
            Token::NotEq => write!(f, "<>"),
            Token::LtEq => write!(f, "<="),
            Token::GtEq => write!(f, ">="),
            Token::Lt => write!(f, "<"),
            Token::Gt => write!(f, ">"),
            Token::AndAnd => write!(f, "&&"),
            Token::OrOr => write!(f, "||"),
            Token::Eq => write!(f, "="),
            Token::LParen => write!(f, "("),
            Token::RParen => write!(f, ")"),
            Token::LBracket => write!(f, "["),
            Token::RBracket => write!(f, "]"),
            Token::Comma => write!(f, ","),
            Token::Semi => write!(f, ";"),
            Token::Colon => write!(f, ":"),
            Token::Dot => write!(f, "."),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unescape() {
        assert_eq!(unescape(r#""a\nb""#), "a\nb");
        assert_eq!(unescape(r#""say \"hi\"""#), "say \"hi\"");
        assert_eq!(unescape(r#""back\\slash""#), "back\\slash");
        assert_eq!(unescape(r#""keep \q""#), "keep \\q");
    }

    #[test]
    fn test_display_keywords() {
        assert_eq!(format!("{}", Token::PrintInline), "printInline");
        assert_eq!(format!("{}", Token::RefBox), "refbox");
        assert_eq!(format!("{}", Token::Void), "void");
    }

    #[test]
    fn test_display_operators() {
        assert_eq!(format!("{}", Token::NotEq), "<>");
        assert_eq!(format!("{}", Token::StarStar), "**");
        assert_eq!(format!("{}", Token::StringLit("x".to_string())), "\"x\"");
    }
}
