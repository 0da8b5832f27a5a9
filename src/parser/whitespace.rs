//! Whitespace control.
//!
//! Two mechanisms remove whitespace from content nodes next to a tag:
//!
//! * explicit `~` markers (`{{~foo~}}`) remove all whitespace on that side,
//! * standalone tags (blocks, inverses, partials and comments alone on their
//!   line) remove the indentation in front of them and the line break after.
//!
//! Only [`NodeKind::Content`] nodes are ever touched, and only their `string`.
use super::ast::{Node, NodeKind, Strip};

/// `LEFT`/`RIGHT` as requested by the `~` markers of an open and close tag
pub fn strip_flags(open: &str, close: &str) -> Strip {
    let mut strip = Strip::empty();
    strip.set(Strip::LEFT, open.as_bytes().get(2) == Some(&b'~'));
    strip.set(Strip::RIGHT, close.ends_with("~}}"));
    strip
}

/// The text of a comment without its delimiters
pub fn strip_comment(comment: &str) -> String {
    let body = comment.strip_prefix("{{").unwrap_or(comment);
    let body = body.strip_prefix('~').unwrap_or(body);
    let body = body.strip_prefix('!').unwrap_or(body);
    let body = body.strip_prefix('-').unwrap_or(body);
    let body = body.strip_prefix('-').unwrap_or(body);

    let body = body.strip_suffix("}}").unwrap_or(body);
    let body = body.strip_suffix('~').unwrap_or(body);
    let body = body.strip_suffix('-').unwrap_or(body);
    let body = body.strip_suffix('-').unwrap_or(body);
    body.to_string()
}

fn original_of(node: &Node) -> Option<&str> {
    match &node.kind {
        NodeKind::Content { original, .. } => Some(original),
        _ => None,
    }
}

/// Does the node before `idx` (or the end of the program) end its line?
fn is_prev_whitespace(statements: &[Node], idx: Option<usize>, is_root: bool) -> bool {
    let idx = idx.unwrap_or(statements.len());
    let Some(prev) = idx.checked_sub(1).and_then(|prev| statements.get(prev)) else {
        return is_root;
    };
    let has_sibling = idx >= 2;
    let Some(original) = original_of(prev) else {
        return false;
    };

    let tail = &original[original.trim_end().len()..];
    tail.contains('\n') || (!has_sibling && is_root && tail.len() == original.len())
}

/// Does the node after `idx` (or the start of the program) begin a new line?
fn is_next_whitespace(statements: &[Node], idx: Option<usize>, is_root: bool) -> bool {
    let next_idx = idx.map_or(0, |idx| idx + 1);
    let Some(next) = statements.get(next_idx) else {
        return is_root;
    };
    let has_sibling = statements.len() > next_idx + 1;
    let Some(original) = original_of(next) else {
        return false;
    };

    let head = &original[..original.len() - original.trim_start().len()];
    head.contains('\n') || (!has_sibling && is_root && head.len() == original.len())
}

/// Strip the start of the content node after `idx` (or the first one).
///
/// With `multiple` all leading whitespace goes, otherwise only the rest of the
/// current line, and only if that was not done before.
fn omit_right(statements: &mut [Node], idx: Option<usize>, multiple: bool) {
    let target = idx.map_or(0, |idx| idx + 1);
    let Some(current) = statements.get_mut(target) else {
        return;
    };
    let already = current.strip.contains(Strip::RIGHT_STRIPPED);
    let NodeKind::Content { string, .. } = &mut current.kind else {
        return;
    };
    if !multiple && already {
        return;
    }

    let stripped = if multiple {
        string.trim_start()
    } else {
        let rest = string.trim_start_matches([' ', '\t']);
        let rest = rest.strip_prefix('\r').unwrap_or(rest);
        rest.strip_prefix('\n').unwrap_or(rest)
    };
    let changed = stripped.len() != string.len();
    *string = stripped.to_string();
    current.strip.set(Strip::RIGHT_STRIPPED, changed);
}

/// Strip the end of the content node before `idx` (or the last one),
/// returning if anything was removed.
fn omit_left(statements: &mut [Node], idx: Option<usize>, multiple: bool) -> bool {
    let target = match idx {
        Some(idx) => idx.checked_sub(1),
        None => statements.len().checked_sub(1),
    };
    let Some(current) = target.and_then(|target| statements.get_mut(target)) else {
        return false;
    };
    let already = current.strip.contains(Strip::LEFT_STRIPPED);
    let NodeKind::Content { string, .. } = &mut current.kind else {
        return false;
    };
    if !multiple && already {
        return false;
    }

    let stripped = if multiple {
        string.trim_end()
    } else {
        string.trim_end_matches([' ', '\t'])
    };
    let changed = stripped.len() != string.len();
    *string = stripped.to_string();
    current.strip.set(Strip::LEFT_STRIPPED, changed);
    changed
}

fn statements_mut(program: Option<&mut Node>) -> &mut [Node] {
    match program.and_then(Node::statements_mut) {
        Some(statements) => statements,
        None => &mut [],
    }
}

/// The body right after the opening tag of a block, and the one right before
/// its closing tag.
fn block_bodies(block: &mut Node) -> (Option<&mut Node>, Option<&mut Node>) {
    let NodeKind::Block {
        program,
        inverse,
        inverted,
        ..
    } = &mut block.kind
    else {
        return (None, None);
    };
    if *inverted {
        (inverse.as_deref_mut(), program.as_deref_mut())
    } else {
        (program.as_deref_mut(), inverse.as_deref_mut())
    }
}

/// Apply whitespace control to the statements of one program.
///
/// Every program is processed once when it is built, and the outermost one a
/// second time with `is_root` set, where the template boundaries count as
/// line boundaries.
pub fn prepare_program(statements: &mut [Node], is_root: bool) {
    for idx in 0..statements.len() {
        let current = &statements[idx];
        if matches!(current.kind, NodeKind::Content { .. }) {
            continue;
        }
        let strip = current.strip;
        let is_partial = matches!(current.kind, NodeKind::Partial { .. });

        let prev_whitespace = is_prev_whitespace(statements, Some(idx), is_root);
        let next_whitespace = is_next_whitespace(statements, Some(idx), is_root);

        let open_standalone = strip.contains(Strip::OPEN_STANDALONE) && prev_whitespace;
        let close_standalone = strip.contains(Strip::CLOSE_STANDALONE) && next_whitespace;
        let inline_standalone =
            strip.contains(Strip::INLINE_STANDALONE) && prev_whitespace && next_whitespace;

        if strip.contains(Strip::RIGHT) {
            omit_right(statements, Some(idx), true);
        }
        if strip.contains(Strip::LEFT) {
            omit_left(statements, Some(idx), true);
        }

        if inline_standalone {
            omit_right(statements, Some(idx), false);
            if omit_left(statements, Some(idx), false) && is_partial {
                let indent = original_of(&statements[idx - 1])
                    .map(|original| {
                        let trimmed = original.trim_end_matches([' ', '\t']);
                        original[trimmed.len()..].to_string()
                    })
                    .unwrap_or_default();
                if let NodeKind::Partial { indent: slot, .. } = &mut statements[idx].kind {
                    *slot = indent;
                }
            }
        }

        if open_standalone {
            let (first, second) = block_bodies(&mut statements[idx]);
            omit_right(statements_mut(first.or(second)), None, false);
            omit_left(statements, Some(idx), false);
        }

        if close_standalone {
            omit_right(statements, Some(idx), false);
            let (first, second) = block_bodies(&mut statements[idx]);
            omit_left(statements_mut(second.or(first)), None, false);
        }
    }
}

/// Whitespace control inside a freshly assembled block, returning the block's
/// own strip flags.
///
/// `program` is the body after the opening tag and `inverse` the section after
/// an `{{else}}`, regardless of whether the block is inverted.
pub fn prepare_block(
    program: &mut Node,
    inverse: Option<&mut Node>,
    open: Strip,
    inverse_strip: Strip,
    close: Strip,
) -> Strip {
    let program = statements_mut(Some(program));

    let mut strip = Strip::empty();
    strip.set(Strip::LEFT, open.contains(Strip::LEFT));
    strip.set(Strip::RIGHT, close.contains(Strip::RIGHT));
    strip.set(Strip::OPEN_STANDALONE, is_next_whitespace(program, None, false));

    if open.contains(Strip::RIGHT) {
        omit_right(program, None, true);
    }

    match inverse {
        Some(inverse) => {
            let inverse = statements_mut(Some(inverse));
            strip.set(Strip::CLOSE_STANDALONE, is_prev_whitespace(inverse, None, false));

            if inverse_strip.contains(Strip::LEFT) {
                omit_left(program, None, true);
            }
            if inverse_strip.contains(Strip::RIGHT) {
                omit_right(inverse, None, true);
            }
            if close.contains(Strip::LEFT) {
                omit_left(inverse, None, true);
            }

            // standalone {{else}}
            if is_prev_whitespace(program, None, false) && is_next_whitespace(inverse, None, false)
            {
                omit_left(program, None, false);
                omit_right(inverse, None, false);
            }
        }
        None => {
            strip.set(Strip::CLOSE_STANDALONE, is_prev_whitespace(program, None, false));
            if close.contains(Strip::LEFT) {
                omit_left(program, None, true);
            }
        }
    }

    strip
}

#[cfg(test)]
mod tests {
    use super::{omit_left, omit_right, prepare_program, strip_comment, strip_flags};
    use crate::parser::ast::{Node, NodeKind, Strip};
    use assert2::check;

    fn content(text: &str) -> Node {
        Node::content(text, 0..text.len())
    }

    fn string_of(node: &Node) -> &str {
        match &node.kind {
            NodeKind::Content { string, .. } => string,
            _ => "<not content>",
        }
    }

    fn comment() -> Node {
        Node::new(NodeKind::Comment { value: "c".into() }, 0..0)
            .with_strip(Strip::INLINE_STANDALONE)
    }

    #[test]
    fn tilde_flags() {
        check!(strip_flags("{{~", "~}}") == Strip::LEFT | Strip::RIGHT);
        check!(strip_flags("{{", "}}") == Strip::empty());
        check!(strip_flags("{{~#", "}}") == Strip::LEFT);
        check!(strip_flags("{{{", "}~}}") == Strip::RIGHT);
        check!(strip_flags("{{~^~}}", "{{~^~}}") == Strip::LEFT | Strip::RIGHT);
    }

    #[test]
    fn comment_bodies() {
        check!(strip_comment("{{! hello }}") == " hello ");
        check!(strip_comment("{{!-- hello --}}") == " hello ");
        check!(strip_comment("{{~!-- hello --~}}") == " hello ");
        check!(strip_comment("{{!--}}") == "");
    }

    #[test]
    fn omitting() {
        let mut statements = vec![content("a  \n  "), comment(), content("  \n  b")];
        check!(omit_left(&mut statements, Some(1), false));
        check!(string_of(&statements[0]) == "a  \n");
        check!(statements[0].strip.contains(Strip::LEFT_STRIPPED));
        // a second single omit is a no-op once stripped
        check!(!omit_left(&mut statements, Some(1), false));

        omit_right(&mut statements, Some(1), false);
        check!(string_of(&statements[2]) == "  b");
        omit_right(&mut statements, Some(1), true);
        check!(string_of(&statements[2]) == "b");
    }

    #[test]
    fn standalone_comment() {
        let mut statements = vec![content("a\n  "), comment(), content("\nb")];
        prepare_program(&mut statements, false);
        check!(string_of(&statements[0]) == "a\n");
        check!(string_of(&statements[2]) == "b");
    }

    #[test]
    fn inline_comment_is_not_standalone() {
        let mut statements = vec![content("a "), comment(), content(" b")];
        prepare_program(&mut statements, true);
        check!(string_of(&statements[0]) == "a ");
        check!(string_of(&statements[2]) == " b");
    }

    #[test]
    fn root_boundaries_count_as_lines() {
        let mut statements = vec![content("  "), comment(), content("\n")];
        prepare_program(&mut statements, false);
        check!(string_of(&statements[0]) == "  ");

        prepare_program(&mut statements, true);
        check!(string_of(&statements[0]) == "");
        check!(string_of(&statements[2]) == "");
    }
}
