// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Python syntax validation tool handler.
//!
//! Parses source text with tree-sitter and reports the first syntax problem.
//! The grammar is more permissive than CPython (it still accepts Python 2
//! statements, for one), so a clean parse is followed by a walk that rejects
//! constructs the compiler refuses. The code is never executed and nothing on
//! disk is touched.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tree_sitter::{Node, Parser};

#[cfg(feature = "telemetry")]
use tracing::{debug, instrument};

use crate::error::ToolError;
use crate::tools::registry::{ToolHandler, ToolOutput};
use crate::tools::{parse_arguments, VALIDATE_PYTHON_SYNTAX};
use crate::types::{InputSchema, ToolDefinition};

/// Outcome of a syntax check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyntaxCheck {
    pub valid: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_detail: Option<String>,
}

impl SyntaxCheck {
    fn valid() -> Self {
        Self { valid: true, error_detail: None }
    }

    fn invalid(detail: String) -> Self {
        Self { valid: false, error_detail: Some(detail) }
    }

    /// Human readable summary.
    pub fn summary(&self) -> String {
        match &self.error_detail {
            None => "Syntax is valid".to_string(),
            Some(detail) => detail.clone(),
        }
    }
}

/// Depth-first search for the first ERROR or MISSING node.
fn first_problem(node: Node<'_>) -> Option<Node<'_>> {
    if node.is_error() || node.is_missing() {
        return Some(node);
    }
    if !node.has_error() {
        return None;
    }
    let mut cursor = node.walk();
    let children: Vec<Node<'_>> = node.children(&mut cursor).collect();
    children.into_iter().find_map(first_problem)
}

fn named_children(node: Node<'_>) -> Vec<Node<'_>> {
    let mut cursor = node.walk();
    let children = node
        .named_children(&mut cursor)
        .filter(|child| child.kind() != "comment")
        .collect();
    children
}

/// First node, in source order, that parses but does not compile.
fn first_rejected(root: Node<'_>) -> Option<(Node<'_>, String)> {
    let mut stack = vec![root];
    while let Some(node) = stack.pop() {
        if let Some(reason) = rejection(node) {
            return Some((node, reason));
        }
        stack.extend(named_children(node).into_iter().rev());
    }
    None
}

fn rejection(node: Node<'_>) -> Option<String> {
    let reason = match node.kind() {
        // `print >>f, x` is a shift inside a tuple to Python 3.
        "print_statement" if named_children(node).iter().any(|c| c.kind() == "chevron") => {
            return None
        }
        "print_statement" => "Missing parentheses in call to 'print'".to_string(),
        "exec_statement" => "Missing parentheses in call to 'exec'".to_string(),
        "named_expression" => match node.parent().map(|p| p.kind()) {
            Some("expression_statement" | "assignment" | "augmented_assignment") => {
                "assignment expression must be parenthesized".to_string()
            }
            _ => return None,
        },
        "delete_statement" => {
            let target = named_children(node).into_iter().find_map(undeletable)?;
            format!("cannot delete {}", describe(target))
        }
        "for_in_clause" => {
            let mut cursor = node.walk();
            if node.children_by_field_name("right", &mut cursor).count() < 2 {
                return None;
            }
            "comprehension iterable must be parenthesized".to_string()
        }
        "argument_list" => argument_order(node)?.to_string(),
        "parameters" | "lambda_parameters" => parameter_order(node)?.to_string(),
        "return_statement" => match enclosing_function(node) {
            Some(f) if f.kind() == "function_definition" => return None,
            _ => "'return' outside function".to_string(),
        },
        "yield" => match enclosing_function(node) {
            Some(_) => return None,
            None => "'yield' outside function".to_string(),
        },
        "await" => match enclosing_function(node) {
            Some(f) if is_async(f) => return None,
            Some(_) => "'await' outside async function".to_string(),
            None => "'await' outside function".to_string(),
        },
        "break_statement" if !inside_loop(node) => "'break' outside loop".to_string(),
        "continue_statement" if !inside_loop(node) => "'continue' not properly in loop".to_string(),
        _ => return None,
    };
    Some(reason)
}

/// First target under a `del` that is not a name, attribute or subscript.
fn undeletable(target: Node<'_>) -> Option<Node<'_>> {
    match target.kind() {
        "identifier" | "attribute" | "subscript" => None,
        "expression_list" | "tuple" | "list" | "parenthesized_expression" => {
            named_children(target).into_iter().find_map(undeletable)
        }
        _ => Some(target),
    }
}

fn describe(node: Node<'_>) -> &'static str {
    match node.kind() {
        "call" => "function call",
        "integer" | "float" | "string" | "concatenated_string" | "true" | "false" | "none" => {
            "literal"
        }
        _ => "expression",
    }
}

fn argument_order(args: Node<'_>) -> Option<&'static str> {
    let mut keyword = false;
    let mut mapping = false;
    for arg in named_children(args) {
        match arg.kind() {
            "keyword_argument" => keyword = true,
            "dictionary_splat" => mapping = true,
            "list_splat" if mapping => {
                return Some("iterable argument unpacking follows keyword argument unpacking")
            }
            "list_splat" => {}
            _ if mapping => return Some("positional argument follows keyword argument unpacking"),
            _ if keyword => return Some("positional argument follows keyword argument"),
            _ => {}
        }
    }
    None
}

fn parameter_order(params: Node<'_>) -> Option<&'static str> {
    let mut defaulted = false;
    for param in named_children(params) {
        match param.kind() {
            "default_parameter" | "typed_default_parameter" => defaulted = true,
            // Everything after a star is keyword-only.
            "list_splat_pattern" | "dictionary_splat_pattern" | "keyword_separator" => return None,
            "typed_parameter"
                if named_children(param)
                    .first()
                    .is_some_and(|p| p.kind().ends_with("splat_pattern")) =>
            {
                return None
            }
            "identifier" | "typed_parameter" if defaulted => {
                return Some("parameter without a default follows parameter with a default")
            }
            _ => {}
        }
    }
    None
}

/// Innermost function or lambda scope, stopping at a class body.
fn enclosing_function(node: Node<'_>) -> Option<Node<'_>> {
    let mut current = node.parent();
    while let Some(scope) = current {
        match scope.kind() {
            "function_definition" | "lambda" => return Some(scope),
            "class_definition" => return None,
            _ => current = scope.parent(),
        }
    }
    None
}

fn is_async(function: Node<'_>) -> bool {
    function.kind() == "function_definition" && function.child(0).is_some_and(|c| c.kind() == "async")
}

/// Whether `node` sits in the body of a loop, not its `else` clause.
fn inside_loop(node: Node<'_>) -> bool {
    let mut child = node;
    let mut current = node.parent();
    while let Some(parent) = current {
        match parent.kind() {
            "for_statement" | "while_statement"
                if parent.child_by_field_name("body") == Some(child) =>
            {
                return true
            }
            "function_definition" | "class_definition" | "lambda" => return false,
            _ => {}
        }
        child = parent;
        current = parent.parent();
    }
    false
}

/// Check Python source for syntax errors.
pub fn check_python_syntax(source: &str) -> Result<SyntaxCheck, ToolError> {
    let mut parser = Parser::new();
    parser
        .set_language(&tree_sitter_python::LANGUAGE.into())
        .map_err(|e| ToolError::Filesystem(format!("Failed to load Python grammar: {e}")))?;

    let tree = parser
        .parse(source, None)
        .ok_or_else(|| ToolError::InvalidInput("Parser produced no tree".to_string()))?;
    let root = tree.root_node();
    if !root.has_error() {
        return Ok(match first_rejected(root) {
            Some((node, reason)) => SyntaxCheck::invalid(format!(
                "Syntax error at line {}: {reason}",
                node.start_position().row + 1
            )),
            None => SyntaxCheck::valid(),
        });
    }

    let detail = match first_problem(root) {
        Some(node) if node.is_missing() => format!(
            "Syntax error at line {}: missing '{}'",
            node.start_position().row + 1,
            node.kind()
        ),
        Some(node) => {
            let snippet: String = source
                .get(node.start_byte()..node.end_byte())
                .unwrap_or_default()
                .lines()
                .next()
                .unwrap_or_default()
                .chars()
                .take(40)
                .collect();
            format!(
                "Syntax error at line {}: invalid syntax near '{}'",
                node.start_position().row + 1,
                snippet.trim()
            )
        }
        None => "Syntax error: invalid syntax".to_string(),
    };

    Ok(SyntaxCheck::invalid(detail))
}

/// Handler for the `validate_python_syntax` tool.
pub struct ValidatePythonHandler;

#[derive(Debug, Deserialize)]
struct ValidatePythonArgs {
    /// Python source text.
    code: String,
}

#[async_trait]
impl ToolHandler for ValidatePythonHandler {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition::new(
            VALIDATE_PYTHON_SYNTAX,
            "Check Python source code for syntax errors without executing it",
        )
        .with_schema(
            InputSchema::new()
                .with_property("code", serde_json::json!({
                    "type": "string",
                    "description": "Python source code to check"
                }))
                .with_required(vec!["code".to_string()]),
        )
    }

    #[cfg_attr(feature = "telemetry", instrument(skip(self, input), fields(valid)))]
    async fn execute(&self, input: serde_json::Value) -> Result<ToolOutput, ToolError> {
        let args: ValidatePythonArgs = parse_arguments(&input)?;
        let check = check_python_syntax(&args.code)?;

        #[cfg(feature = "telemetry")]
        {
            tracing::Span::current().record("valid", check.valid);
            debug!(valid = check.valid, "Syntax check complete");
        }

        let data = serde_json::to_value(&check)
            .map_err(|e| ToolError::Protocol(format!("Failed to encode result: {e}")))?;
        Ok(ToolOutput::structured(check.summary(), data))
    }
}
