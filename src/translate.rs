//! Kernel function parsing and body translation.
//!
//! A kernel is written as a function, `fn name(a, b) { ... }`, whose body
//! reads its parameters by index and returns one value per output element.
//! The [`BodyTranslator`] turns that body into WGSL. Whatever it produces is
//! pasted into the fragment program after the preamble, so it can use:
//!
//! - `thread_id` (`vec3<f32>`, the output coordinate) and `thread_index`
//! - `user_<p>` for a scalar parameter `p`
//! - `user_<p>_1(x)`, `user_<p>_2(y, x)`, `user_<p>_3(z, y, x)` for an array
//!   or tensor parameter `p`, plus `user_<p>_dim` and `user_<p>_size`
//! - `constants_<name>` for each named constant
//! - `color3(..)`, `color4(..)`, `LOOP_MAX`
//!
//! and for the root kernel must define `fn kernel()` which stores its result
//! in `kernel_result`.

use crate::args::{ArgKind, ParamDescriptor};
use crate::error::{KernelError, KernelResult};

/// A parsed `fn name(params) { body }`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KernelFunction {
    pub name: String,
    pub params: Vec<String>,
    /// Text between the outer braces.
    pub body: String,
}

impl KernelFunction {
    /// Parses kernel source, failing with [`KernelError::InvalidKernelSpec`]
    /// unless it is a single function with a parenthesised parameter list and
    /// a braced body.
    pub fn parse(source: &str) -> KernelResult<Self> {
        let invalid = |reason: &str| KernelError::InvalidKernelSpec(reason.to_owned());

        let rest = source.trim();
        let rest = rest
            .strip_prefix("fn")
            .filter(|rest| rest.starts_with(char::is_whitespace))
            .ok_or_else(|| invalid("kernel source must start with `fn`"))?
            .trim_start();

        let open = rest.find('(').ok_or_else(|| invalid("missing parameter list"))?;
        let name = rest[..open].trim();
        if !is_identifier(name) {
            return Err(invalid("function name is not an identifier"));
        }

        let close = rest[open..]
            .find(')')
            .map(|offset| open + offset)
            .ok_or_else(|| invalid("unterminated parameter list"))?;

        let mut params = Vec::new();
        for param in rest[open + 1..close].split(',') {
            // tolerate `a: f32` annotations
            let param = param.split(':').next().unwrap_or_default().trim();
            if param.is_empty() {
                continue;
            }
            if !is_identifier(param) {
                return Err(KernelError::InvalidKernelSpec(format!(
                    "parameter `{param}` is not an identifier"
                )));
            }
            if params.iter().any(|seen| seen == param) {
                return Err(KernelError::InvalidKernelSpec(format!(
                    "parameter `{param}` is declared twice"
                )));
            }
            params.push(param.to_owned());
        }

        let after = &rest[close + 1..];
        let body_open = after.find('{').ok_or_else(|| invalid("missing function body"))?;
        if !after.ends_with('}') {
            return Err(invalid("function body must end the source"));
        }
        let body_close = matching_brace(after, body_open)
            .ok_or_else(|| invalid("unbalanced braces in function body"))?;
        if body_close != after.len() - 1 {
            return Err(invalid("unexpected text after function body"));
        }

        Ok(Self {
            name: name.to_owned(),
            params,
            body: after[body_open + 1..body_close].to_owned(),
        })
    }
}

fn matching_brace(text: &str, open: usize) -> Option<usize> {
    let mut depth = 0usize;
    for (offset, c) in text[open..].char_indices() {
        match c {
            '{' => depth += 1,
            '}' => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(open + offset);
                }
            }
            _ => {}
        }
    }
    None
}

pub(crate) fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        && !name.starts_with("__")
}

/// Converts a kernel function into WGSL.
///
/// `params` describes the root kernel's parameters for the current call
/// signature; it is empty for helper functions. `root` selects between the
/// kernel itself (emitted as `fn kernel()`) and a helper.
pub trait BodyTranslator {
    fn translate(
        &self,
        function: &KernelFunction,
        params: &[ParamDescriptor],
        root: bool,
    ) -> KernelResult<String>;
}

/// Token-level rewriter for kernel bodies already written in WGSL syntax.
///
/// Array reads `a[x]`, `a[y][x]` and `a[z][y][x]` become accessor calls,
/// `constants.n` becomes `constants_n`, `color(..)` picks `color3`/`color4`
/// by arity, and in the root kernel `return e;` stores `e` as the result.
/// Helper functions take and return `f32`.
#[derive(Debug, Clone, Copy, Default)]
pub struct WgslTranslator;

impl BodyTranslator for WgslTranslator {
    fn translate(
        &self,
        function: &KernelFunction,
        params: &[ParamDescriptor],
        root: bool,
    ) -> KernelResult<String> {
        let rewriter = Rewriter { params, root };
        let body = rewriter.rewrite(&function.body)?;
        if root {
            return Ok(format!("fn kernel() {{{body}}}\n"));
        }

        let signature = function
            .params
            .iter()
            .map(|param| format!("{param}: f32"))
            .collect::<Vec<_>>()
            .join(", ");
        Ok(format!("fn {}({signature}) -> f32 {{{body}}}\n", function.name))
    }
}

struct Rewriter<'a> {
    params: &'a [ParamDescriptor],
    root: bool,
}

impl Rewriter<'_> {
    fn rewrite(&self, source: &str) -> KernelResult<String> {
        let chars: Vec<char> = source.chars().collect();
        let mut out = String::with_capacity(source.len());
        let mut i = 0;

        while i < chars.len() {
            let c = chars[i];
            if c == '/' && chars.get(i + 1) == Some(&'/') {
                let end = chars[i..]
                    .iter()
                    .position(|&c| c == '\n')
                    .map_or(chars.len(), |offset| i + offset);
                out.extend(&chars[i..end]);
                i = end;
            } else if c == '/' && chars.get(i + 1) == Some(&'*') {
                let end = (i + 2..chars.len().saturating_sub(1))
                    .find(|&j| chars[j] == '*' && chars[j + 1] == '/')
                    .map_or(chars.len(), |j| j + 2);
                out.extend(&chars[i..end]);
                i = end;
            } else if c.is_ascii_digit() {
                let end = scan(&chars, i, |c| c.is_ascii_alphanumeric() || c == '.' || c == '_');
                out.extend(&chars[i..end]);
                i = end;
            } else if c.is_ascii_alphabetic() || c == '_' {
                let end = scan(&chars, i, |c| c.is_ascii_alphanumeric() || c == '_');
                let ident: String = chars[i..end].iter().collect();
                if previous_non_space(&chars, i) == Some('.') {
                    out.push_str(&ident);
                    i = end;
                } else {
                    i = self.rewrite_identifier(&ident, &chars, end, &mut out)?;
                }
            } else {
                out.push(c);
                i += 1;
            }
        }

        Ok(out)
    }

    /// Emits the replacement for `ident` and returns where scanning resumes.
    fn rewrite_identifier(
        &self,
        ident: &str,
        chars: &[char],
        end: usize,
        out: &mut String,
    ) -> KernelResult<usize> {
        let next = skip_spaces(chars, end);

        if ident == "constants" && chars.get(next) == Some(&'.') {
            let start = skip_spaces(chars, next + 1);
            let stop = scan(chars, start, |c| c.is_ascii_alphanumeric() || c == '_');
            let name: String = chars[start..stop].iter().collect();
            if name.is_empty() {
                return Err(KernelError::InvalidKernelSpec(
                    "`constants.` must be followed by a name".into(),
                ));
            }
            out.push_str("constants_");
            out.push_str(&name);
            return Ok(stop);
        }

        if ident == "color" && chars.get(next) == Some(&'(') {
            let close = matching(chars, next)?;
            let args = split_arguments(&chars[next + 1..close]);
            let name = match args.len() {
                3 => "color3",
                4 => "color4",
                n => {
                    return Err(KernelError::InvalidKernelSpec(format!(
                        "color() takes 3 or 4 arguments, got {n}"
                    )));
                }
            };
            let args = args
                .iter()
                .map(|arg| self.rewrite(arg))
                .collect::<KernelResult<Vec<_>>>()?;
            out.push_str(&format!("{name}({})", args.join(", ")));
            return Ok(close + 1);
        }

        if ident == "return" && self.root {
            let semicolon = statement_end(chars, end)?;
            let expression: String = chars[end..semicolon].iter().collect();
            if expression.trim().is_empty() {
                out.push_str("return");
                return Ok(end);
            }
            let expression = self.rewrite(expression.trim())?;
            out.push_str(&format!("{{ kernel_result = f32({expression}); return; }}"));
            return Ok(semicolon + 1);
        }

        if self.root {
            if let Some(param) = self.params.iter().find(|param| param.name == ident) {
                return self.rewrite_parameter(param, chars, end, out);
            }
        }

        out.push_str(ident);
        Ok(end)
    }

    fn rewrite_parameter(
        &self,
        param: &ParamDescriptor,
        chars: &[char],
        end: usize,
        out: &mut String,
    ) -> KernelResult<usize> {
        if param.kind == ArgKind::Scalar {
            out.push_str(&format!("user_{}", param.name));
            return Ok(end);
        }

        let mut indices = Vec::new();
        let mut resume = end;
        loop {
            let open = skip_spaces(chars, resume);
            if chars.get(open) != Some(&'[') {
                break;
            }
            if indices.len() == 3 {
                return Err(KernelError::InvalidKernelSpec(format!(
                    "`{}` is indexed with more than 3 subscripts",
                    param.name
                )));
            }
            let close = matching(chars, open)?;
            let inner: String = chars[open + 1..close].iter().collect();
            indices.push(self.rewrite(inner.trim())?);
            resume = close + 1;
        }

        if indices.is_empty() {
            out.push_str(&format!("user_{}", param.name));
        } else {
            out.push_str(&format!(
                "user_{}_{}({})",
                param.name,
                indices.len(),
                indices.join(", ")
            ));
        }
        Ok(resume)
    }
}

fn scan(chars: &[char], start: usize, accept: impl Fn(char) -> bool) -> usize {
    chars[start..]
        .iter()
        .position(|&c| !accept(c))
        .map_or(chars.len(), |offset| start + offset)
}

fn skip_spaces(chars: &[char], start: usize) -> usize {
    scan(chars, start, char::is_whitespace)
}

fn previous_non_space(chars: &[char], before: usize) -> Option<char> {
    chars[..before].iter().rev().copied().find(|c| !c.is_whitespace())
}

/// Index of the bracket closing the one at `open`.
fn matching(chars: &[char], open: usize) -> KernelResult<usize> {
    let mut depth = 0usize;
    for (j, &c) in chars.iter().enumerate().skip(open) {
        match c {
            '(' | '[' | '{' => depth += 1,
            ')' | ']' | '}' => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return Ok(j);
                }
            }
            _ => {}
        }
    }
    Err(KernelError::InvalidKernelSpec(format!(
        "unbalanced `{}` in kernel body",
        chars[open]
    )))
}

/// Index of the `;` ending the statement that starts at `start`.
fn statement_end(chars: &[char], start: usize) -> KernelResult<usize> {
    let mut depth = 0usize;
    for (j, &c) in chars.iter().enumerate().skip(start) {
        match c {
            '(' | '[' | '{' => depth += 1,
            ')' | ']' | '}' => depth = depth.saturating_sub(1),
            ';' if depth == 0 => return Ok(j),
            _ => {}
        }
    }
    Err(KernelError::InvalidKernelSpec(
        "`return` statement is missing its `;`".into(),
    ))
}

/// Splits a call's argument text on top-level commas.
fn split_arguments(chars: &[char]) -> Vec<String> {
    let mut args = Vec::new();
    let mut depth = 0usize;
    let mut current = String::new();
    for &c in chars {
        match c {
            '(' | '[' | '{' => depth += 1,
            ')' | ']' | '}' => depth = depth.saturating_sub(1),
            ',' if depth == 0 => {
                args.push(current.trim().to_owned());
                current.clear();
                continue;
            }
            _ => {}
        }
        current.push(c);
    }
    if !current.trim().is_empty() {
        args.push(current.trim().to_owned());
    }
    args
}
