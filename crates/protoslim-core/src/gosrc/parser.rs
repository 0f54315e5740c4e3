//! Declaration-level reader over the tree-sitter Go grammar.
//!
//! Two entry points mirror the two modes the projector needs:
//!
//! - [`parse_imports`] reads the package clause and import declarations and
//!   stops at the first top-level node that is not part of them, so errors
//!   further down the file are not looked at
//! - [`parse_file`] rejects any syntax error in the file and splits it into
//!   top-level declaration groups
//!
//! Declaration bodies are never inspected beyond the shape of type specs.

use super::{Decl, DeclKind, ParseError, SourceFile, TypeShape, TypeSpec};
use tracing::trace;
use tree_sitter::{Node, Parser, Tree};

type Result<T> = std::result::Result<T, ParseError>;

/// Parses the package clause and import block only.
///
/// Returns the offset one past the last import declaration, or past the
/// package clause when there are no imports.
pub fn parse_imports(src: &str) -> Result<usize> {
    let tree = parse_tree(src)?;
    let mut end = None;

    for node in top_level(&tree) {
        match (node.kind(), end) {
            ("comment", _) => continue,
            ("package_clause", None) | ("import_declaration", Some(_)) => {
                if let Some(bad) = first_error(node) {
                    return Err(syntax_error(src, bad));
                }
                end = Some(node.end_byte());
            }
            (_, Some(_)) => break,
            (_, None) => return Err(expected_package(src, node)),
        }
    }

    let end = end.ok_or_else(|| ParseError::at(src, src.len(), "expected 'package' clause"))?;
    trace!("imports end at offset {}", end);
    Ok(end)
}

/// Parses a complete file into its top-level declarations.
pub fn parse_file(src: &str) -> Result<SourceFile> {
    let tree = parse_tree(src)?;
    if let Some(bad) = first_error(tree.root_node()) {
        return Err(syntax_error(src, bad));
    }

    let nodes = top_level(&tree);
    let mut seen_package = false;
    let mut decls = Vec::new();

    for (i, node) in nodes.iter().enumerate() {
        let kind = match node.kind() {
            "comment" => continue,
            "package_clause" if !seen_package => {
                seen_package = true;
                continue;
            }
            _ if !seen_package => return Err(expected_package(src, *node)),
            "import_declaration" if decls.is_empty() => continue,
            "import_declaration" => {
                return Err(ParseError::at(
                    src,
                    node.start_byte(),
                    "imports must appear before other declarations",
                ))
            }
            "const_declaration" => DeclKind::Const,
            "var_declaration" => DeclKind::Var,
            "type_declaration" => DeclKind::Type,
            "function_declaration" | "method_declaration" => DeclKind::Func,
            other => {
                return Err(ParseError::at(
                    src,
                    node.start_byte(),
                    format!("expected declaration, found {other}"),
                ))
            }
        };

        let specs = if kind == DeclKind::Type {
            type_specs(src, *node)
        } else {
            Vec::new()
        };
        let decl = Decl {
            kind,
            start: node.start_byte(),
            end: node.end_byte(),
            doc_start: doc_start(&nodes, i),
            specs,
        };
        trace!("{:?} declaration at {}..{}", decl.kind, decl.start, decl.end);
        decls.push(decl);
    }

    if !seen_package {
        return Err(ParseError::at(src, src.len(), "expected 'package' clause"));
    }
    trace!("parsed {} top-level declarations", decls.len());
    Ok(SourceFile { decls })
}

fn parse_tree(src: &str) -> Result<Tree> {
    let mut parser = Parser::new();
    parser
        .set_language(&tree_sitter_go::LANGUAGE.into())
        .map_err(|e| ParseError::new(0, 1, 1, format!("failed to load Go grammar: {e}")))?;
    parser
        .parse(src, None)
        .ok_or_else(|| ParseError::new(0, 1, 1, "parser produced no tree"))
}

fn top_level(tree: &Tree) -> Vec<Node<'_>> {
    let root = tree.root_node();
    let mut cursor = root.walk();
    let nodes = root.named_children(&mut cursor).collect();
    nodes
}

/// First error or missing node under `node`, in document order
fn first_error(node: Node<'_>) -> Option<Node<'_>> {
    if node.is_error() || node.is_missing() {
        return Some(node);
    }
    if !node.has_error() {
        return None;
    }
    let mut cursor = node.walk();
    let found = node.children(&mut cursor).find_map(first_error);
    found
}

fn syntax_error(src: &str, node: Node<'_>) -> ParseError {
    let message = if node.is_missing() {
        format!("missing '{}'", node.kind())
    } else {
        let text = src[node.byte_range()].lines().next().unwrap_or_default().trim();
        if text.is_empty() {
            "syntax error".to_string()
        } else {
            let near: String = text.chars().take(24).collect();
            format!("syntax error near '{near}'")
        }
    };
    ParseError::at(src, node.start_byte(), message)
}

fn expected_package(src: &str, node: Node<'_>) -> ParseError {
    match first_error(node) {
        Some(bad) => syntax_error(src, bad),
        None => ParseError::at(src, node.start_byte(), "expected 'package' clause"),
    }
}

fn type_specs(src: &str, decl: Node<'_>) -> Vec<TypeSpec> {
    let mut cursor = decl.walk();
    let specs = decl
        .named_children(&mut cursor)
        .filter(|n| matches!(n.kind(), "type_spec" | "type_alias"))
        .map(|spec| TypeSpec {
            name: spec
                .child_by_field_name("name")
                .map(|n| src[n.byte_range()].to_string())
                .unwrap_or_default(),
            shape: spec
                .child_by_field_name("type")
                .map_or(TypeShape::Other, shape_of),
        })
        .collect();
    specs
}

fn shape_of(node: Node<'_>) -> TypeShape {
    match node.kind() {
        "struct_type" => TypeShape::Struct,
        "interface_type" => TypeShape::Interface,
        "parenthesized_type" => {
            let mut cursor = node.walk();
            let inner = node.named_children(&mut cursor).next();
            inner.map_or(TypeShape::Other, shape_of)
        }
        _ => TypeShape::Other,
    }
}

/// Start of the comment group attached to `nodes[index]`.
///
/// A comment belongs to the group if it ends on the line directly above the
/// next member and does not trail code on its own first line.
fn doc_start(nodes: &[Node<'_>], index: usize) -> Option<usize> {
    let mut next_row = nodes[index].start_position().row;
    let mut start = None;

    for j in (0..index).rev() {
        let node = nodes[j];
        if node.kind() != "comment" || node.end_position().row + 1 != next_row {
            break;
        }
        if j > 0 && nodes[j - 1].end_position().row == node.start_position().row {
            break;
        }
        start = Some(node.start_byte());
        next_row = node.start_position().row;
    }

    start
}
