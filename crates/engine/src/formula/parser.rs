// Formula parser - converts formula text into an AST and back
// Supports: numbers (1, 1.5, .5, 2e3), cell refs (A1), + - * /, unary + -, parentheses

use cellgraph_core::Position;

/// Formula expression tree.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Number(f64),
    /// Cell reference. May be out of range (renders as `#REF!`).
    CellRef(Position),
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    BinaryOp {
        op: Op,
        left: Box<Expr>,
        right: Box<Expr>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    Add,
    Sub,
    Mul,
    Div,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Plus,
    Minus,
}

/// Longest accepted formula, in tokens. Bounds the height of operator chains
/// such as `1+1+...+1`, which every tree walk recurses through.
pub const MAX_TOKENS: usize = 4096;

/// Deepest accepted nesting of parentheses and unary signs.
pub const MAX_NESTING: usize = 128;

/// Parse formula text (without the leading '=') into an AST.
pub fn parse(formula: &str) -> Result<Expr, String> {
    let tokens = tokenize(formula)?;
    if tokens.is_empty() {
        return Err("Empty formula".to_string());
    }
    if tokens.len() > MAX_TOKENS {
        return Err(format!("Formula too long: more than {} tokens", MAX_TOKENS));
    }

    let (expr, pos) = parse_add_sub(&tokens, 0, 0)?;
    if pos < tokens.len() {
        return Err(format!("Unexpected token at position {}", pos));
    }
    Ok(expr)
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(f64),
    CellRef(Position),
    Plus,
    Minus,
    Star,
    Slash,
    LParen,
    RParen,
}

fn tokenize(input: &str) -> Result<Vec<Token>, String> {
    let mut tokens = Vec::new();
    let mut chars = input.chars().peekable();

    while let Some(&c) = chars.peek() {
        match c {
            ' ' | '\t' => { chars.next(); }
            '+' => { tokens.push(Token::Plus); chars.next(); }
            '-' => { tokens.push(Token::Minus); chars.next(); }
            '*' => { tokens.push(Token::Star); chars.next(); }
            '/' => { tokens.push(Token::Slash); chars.next(); }
            '(' => { tokens.push(Token::LParen); chars.next(); }
            ')' => { tokens.push(Token::RParen); chars.next(); }
            '0'..='9' | '.' => {
                let mut literal = String::new();
                while let Some(&ch) = chars.peek() {
                    if ch.is_ascii_digit() || ch == '.' {
                        literal.push(ch);
                        chars.next();
                    } else {
                        break;
                    }
                }

                // Exponent: only consumed when digits follow, so "2E" is not swallowed
                if matches!(chars.peek(), Some('e') | Some('E')) {
                    let mut lookahead = chars.clone();
                    lookahead.next();
                    let sign = match lookahead.peek() {
                        Some(&s) if s == '+' || s == '-' => {
                            lookahead.next();
                            Some(s)
                        }
                        _ => None,
                    };
                    if lookahead.peek().is_some_and(|ch| ch.is_ascii_digit()) {
                        literal.push('e');
                        chars.next();
                        if let Some(s) = sign {
                            literal.push(s);
                            chars.next();
                        }
                        while let Some(&ch) = chars.peek() {
                            if ch.is_ascii_digit() {
                                literal.push(ch);
                                chars.next();
                            } else {
                                break;
                            }
                        }
                    }
                }

                let n: f64 = literal
                    .parse()
                    .map_err(|_| format!("Invalid number: {}", literal))?;
                if !n.is_finite() {
                    return Err(format!("Number out of range: {}", literal));
                }
                tokens.push(Token::Number(n));
            }
            'A'..='Z' => {
                let mut ident = String::new();
                while let Some(&ch) = chars.peek() {
                    if ch.is_ascii_uppercase() {
                        ident.push(ch);
                        chars.next();
                    } else {
                        break;
                    }
                }
                let letters = ident.len();
                while let Some(&ch) = chars.peek() {
                    if ch.is_ascii_digit() {
                        ident.push(ch);
                        chars.next();
                    } else {
                        break;
                    }
                }
                if ident.len() == letters {
                    return Err(format!("Unknown identifier: {}", ident));
                }
                // Lexically a reference; from_a1 yields NONE when it is out of range
                tokens.push(Token::CellRef(Position::from_a1(&ident)));
            }
            _ => return Err(format!("Unexpected character: {}", c)),
        }
    }

    Ok(tokens)
}

fn parse_add_sub(tokens: &[Token], pos: usize, depth: usize) -> Result<(Expr, usize), String> {
    let (mut left, mut pos) = parse_mul_div(tokens, pos, depth)?;

    while pos < tokens.len() {
        let op = match &tokens[pos] {
            Token::Plus => Op::Add,
            Token::Minus => Op::Sub,
            _ => break,
        };
        let (right, new_pos) = parse_mul_div(tokens, pos + 1, depth)?;
        left = Expr::BinaryOp {
            op,
            left: Box::new(left),
            right: Box::new(right),
        };
        pos = new_pos;
    }

    Ok((left, pos))
}

fn parse_mul_div(tokens: &[Token], pos: usize, depth: usize) -> Result<(Expr, usize), String> {
    let (mut left, mut pos) = parse_unary(tokens, pos, depth)?;

    while pos < tokens.len() {
        let op = match &tokens[pos] {
            Token::Star => Op::Mul,
            Token::Slash => Op::Div,
            _ => break,
        };
        let (right, new_pos) = parse_unary(tokens, pos + 1, depth)?;
        left = Expr::BinaryOp {
            op,
            left: Box::new(left),
            right: Box::new(right),
        };
        pos = new_pos;
    }

    Ok((left, pos))
}

fn parse_unary(tokens: &[Token], pos: usize, depth: usize) -> Result<(Expr, usize), String> {
    if depth > MAX_NESTING {
        return Err(format!("Formula nested too deeply: more than {} levels", MAX_NESTING));
    }

    let op = match tokens.get(pos) {
        Some(Token::Plus) => UnaryOp::Plus,
        Some(Token::Minus) => UnaryOp::Minus,
        _ => return parse_primary(tokens, pos, depth),
    };
    let (operand, pos) = parse_unary(tokens, pos + 1, depth + 1)?;
    Ok((
        Expr::Unary {
            op,
            operand: Box::new(operand),
        },
        pos,
    ))
}

fn parse_primary(tokens: &[Token], pos: usize, depth: usize) -> Result<(Expr, usize), String> {
    if pos >= tokens.len() {
        return Err("Unexpected end of expression".to_string());
    }

    match &tokens[pos] {
        Token::Number(n) => Ok((Expr::Number(*n), pos + 1)),
        Token::CellRef(cell) => Ok((Expr::CellRef(*cell), pos + 1)),
        Token::LParen => {
            let (expr, pos) = parse_add_sub(tokens, pos + 1, depth + 1)?;
            match tokens.get(pos) {
                Some(Token::RParen) => Ok((expr, pos + 1)),
                Some(_) => Err("Expected closing parenthesis".to_string()),
                None => Err("Missing closing parenthesis".to_string()),
            }
        }
        _ => Err(format!("Unexpected token at position {}", pos)),
    }
}

// =============================================================================
// Formula Printing - Convert Expr back to canonical text
// =============================================================================

/// Binding strength used to decide where parentheses are required.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Precedence {
    Add,
    Sub,
    Mul,
    Div,
    Unary,
    Atom,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Side {
    Left,
    Right,
}

fn precedence(expr: &Expr) -> Precedence {
    match expr {
        Expr::Number(_) | Expr::CellRef(_) => Precedence::Atom,
        Expr::Unary { .. } => Precedence::Unary,
        Expr::BinaryOp { op, .. } => match op {
            Op::Add => Precedence::Add,
            Op::Sub => Precedence::Sub,
            Op::Mul => Precedence::Mul,
            Op::Div => Precedence::Div,
        },
    }
}

fn needs_parens(parent: Precedence, child: Precedence, side: Side) -> bool {
    use Precedence::*;
    let additive = matches!(child, Add | Sub);
    match parent {
        Sub => side == Side::Right && additive,
        Mul | Unary => additive,
        Div => additive || (side == Side::Right && matches!(child, Mul | Div)),
        Add | Atom => false,
    }
}

/// Format an expression without the leading '='.
pub fn format_expr(expr: &Expr) -> String {
    let mut out = String::new();
    write_expr(expr, &mut out);
    out
}

fn write_expr(expr: &Expr, out: &mut String) {
    match expr {
        Expr::Number(n) => out.push_str(&n.to_string()),
        Expr::CellRef(cell) => {
            if cell.is_valid() {
                out.push_str(&cell.to_string());
            } else {
                out.push_str("#REF!");
            }
        }
        Expr::Unary { op, operand } => {
            out.push(match op {
                UnaryOp::Plus => '+',
                UnaryOp::Minus => '-',
            });
            write_operand(Precedence::Unary, operand, Side::Right, out);
        }
        Expr::BinaryOp { op, left, right } => {
            let parent = precedence(expr);
            write_operand(parent, left, Side::Left, out);
            out.push(match op {
                Op::Add => '+',
                Op::Sub => '-',
                Op::Mul => '*',
                Op::Div => '/',
            });
            write_operand(parent, right, Side::Right, out);
        }
    }
}

fn write_operand(parent: Precedence, child: &Expr, side: Side, out: &mut String) {
    if needs_parens(parent, precedence(child), side) {
        out.push('(');
        write_expr(child, out);
        out.push(')');
    } else {
        write_expr(child, out);
    }
}

// =============================================================================
// Cell Reference Extraction
// =============================================================================

/// Extract all cell references from an expression, duplicates and invalid
/// positions included.
pub fn extract_cell_refs(expr: &Expr) -> Vec<Position> {
    let mut refs = Vec::new();
    collect_cell_refs(expr, &mut refs);
    refs
}

fn collect_cell_refs(expr: &Expr, refs: &mut Vec<Position>) {
    match expr {
        Expr::Number(_) => {}
        Expr::CellRef(cell) => refs.push(*cell),
        Expr::Unary { operand, .. } => collect_cell_refs(operand, refs),
        Expr::BinaryOp { left, right, .. } => {
            collect_cell_refs(left, refs);
            collect_cell_refs(right, refs);
        }
    }
}
