//! Named-parameter rewriting for the TDS wire protocol.
//!
//! Callers write `@name` placeholders against a [`BindSet`]; tiberius binds
//! positionally as `@P1..@PN`. A lightweight state machine rewrites the SQL,
//! skipping string literals, comments, and bracketed identifiers. Placeholder
//! tokens with no matching bind are left untouched and surface as a server
//! error, since this layer does not validate SQL.

use crate::binds::BindSet;
use crate::types::RowValues;

#[derive(Clone)]
enum State {
    Normal,
    SingleQuoted,
    DoubleQuoted,
    Bracketed,
    LineComment,
    BlockComment(u32),
}

fn scan_identifier(bytes: &[u8], start: usize) -> Option<(usize, &str)> {
    let mut idx = start;
    while idx < bytes.len() && (bytes[idx].is_ascii_alphanumeric() || bytes[idx] == b'_') {
        idx += 1;
    }
    if idx == start {
        None
    } else {
        std::str::from_utf8(&bytes[start..idx])
            .ok()
            .map(|name| (idx, name))
    }
}

fn is_line_comment_start(bytes: &[u8], idx: usize) -> bool {
    bytes[idx] == b'-' && bytes.get(idx + 1) == Some(&b'-')
}

fn is_block_comment_start(bytes: &[u8], idx: usize) -> bool {
    bytes[idx] == b'/' && bytes.get(idx + 1) == Some(&b'*')
}

fn is_block_comment_end(bytes: &[u8], idx: usize) -> bool {
    bytes[idx] == b'*' && bytes.get(idx + 1) == Some(&b'/')
}

/// Rewrite `@name` placeholders to positional `@PN` tokens and collect the
/// bind values in positional order. Each distinct name is bound once, in
/// order of first appearance.
pub fn positionalize(sql: &str, binds: &BindSet) -> (String, Vec<RowValues>) {
    let bytes = sql.as_bytes();
    let mut out = String::with_capacity(sql.len());
    let mut ordered: Vec<(String, RowValues)> = Vec::new();
    let mut state = State::Normal;
    let mut idx = 0;

    while idx < bytes.len() {
        let b = bytes[idx];
        let mut consumed = false;
        match state {
            State::Normal => match b {
                b'\'' => state = State::SingleQuoted,
                b'"' => state = State::DoubleQuoted,
                b'[' => state = State::Bracketed,
                _ if is_line_comment_start(bytes, idx) => state = State::LineComment,
                _ if is_block_comment_start(bytes, idx) => state = State::BlockComment(1),
                b'@' => {
                    // @@ROWCOUNT and friends are system functions, not binds.
                    if bytes.get(idx + 1) == Some(&b'@') {
                        out.push_str("@@");
                        idx += 2;
                        consumed = true;
                    } else if let Some((end, name)) = scan_identifier(bytes, idx + 1) {
                        if let Some(value) = binds.get(name) {
                            let position = match ordered.iter().position(|(n, _)| n == name) {
                                Some(pos) => pos,
                                None => {
                                    ordered.push((name.to_string(), value.clone()));
                                    ordered.len() - 1
                                }
                            };
                            out.push_str(&format!("@P{}", position + 1));
                        } else {
                            out.push('@');
                            out.push_str(name);
                        }
                        idx = end;
                        consumed = true;
                    }
                }
                _ => {}
            },
            State::SingleQuoted => {
                if b == b'\'' {
                    if bytes.get(idx + 1) == Some(&b'\'') {
                        out.push('\'');
                        idx += 1;
                    } else {
                        state = State::Normal;
                    }
                }
            }
            State::DoubleQuoted => {
                if b == b'"' {
                    state = State::Normal;
                }
            }
            State::Bracketed => {
                if b == b']' {
                    state = State::Normal;
                }
            }
            State::LineComment => {
                if b == b'\n' {
                    state = State::Normal;
                }
            }
            State::BlockComment(depth) => {
                if is_block_comment_start(bytes, idx) {
                    state = State::BlockComment(depth + 1);
                } else if is_block_comment_end(bytes, idx) {
                    state = if depth == 1 {
                        State::Normal
                    } else {
                        State::BlockComment(depth - 1)
                    };
                    out.push_str("*/");
                    idx += 2;
                    consumed = true;
                }
            }
        }

        if !consumed {
            out.push(b as char);
            idx += 1;
        }
    }

    let params = ordered.into_iter().map(|(_, v)| v).collect();
    (out, params)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rewrites_named_binds_in_first_appearance_order() {
        let binds = BindSet::new().with("newname", "a").with("existing", "b");
        let (sql, params) = positionalize(
            "UPDATE test SET name=@newname WHERE name=@existing",
            &binds,
        );
        assert_eq!(sql, "UPDATE test SET name=@P1 WHERE name=@P2");
        assert_eq!(params.len(), 2);
        assert_eq!(params[0].as_text(), Some("a"));
        assert_eq!(params[1].as_text(), Some("b"));
    }

    #[test]
    fn repeated_name_binds_once() {
        let binds = BindSet::new().with("name", "x");
        let (sql, params) = positionalize(
            "SELECT * FROM t WHERE a=@name OR b=@name",
            &binds,
        );
        assert_eq!(sql, "SELECT * FROM t WHERE a=@P1 OR b=@P1");
        assert_eq!(params.len(), 1);
    }

    #[test]
    fn numeric_in_clause_names_rewrite() {
        let mut binds = BindSet::new();
        let list = binds.in_clause(vec!["a".into(), "b".into()]);
        let (sql, params) = positionalize(
            &format!("SELECT * FROM t WHERE name IN ({list})"),
            &binds,
        );
        assert_eq!(sql, "SELECT * FROM t WHERE name IN (@P1,@P2)");
        assert_eq!(params.len(), 2);
    }

    #[test]
    fn skips_literals_comments_and_system_variables() {
        let binds = BindSet::new().with("name", "x");
        let (sql, params) = positionalize(
            "SELECT '@name', [@name], @@ROWCOUNT -- @name\n/* @name */ FROM t WHERE n=@name",
            &binds,
        );
        assert_eq!(
            sql,
            "SELECT '@name', [@name], @@ROWCOUNT -- @name\n/* @name */ FROM t WHERE n=@P1"
        );
        assert_eq!(params.len(), 1);
    }

    #[test]
    fn unbound_placeholder_left_for_the_server() {
        let binds = BindSet::new();
        let (sql, params) = positionalize("SELECT * FROM t WHERE n=@missing", &binds);
        assert_eq!(sql, "SELECT * FROM t WHERE n=@missing");
        assert!(params.is_empty());
    }
}
