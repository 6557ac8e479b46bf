// crates/filtergraph-core/src/options.rs
//
// Options / init pipeline. Three layers, in the order they run:
//
//   1. Legacy-compatibility shims, keyed by filter name — rewrite the raw
//      argument string before anything else sees it.
//   2. `process_options` — the shorthand/positional-then-named parser that
//      sets values on the private state through the option schema.
//   3. Init dispatch — `init_opaque`, then `init`, then `init_dict`, with a
//      leftover-key check after a successful `init_dict`.
//
// "Child-object" and "fake-object" key resolution (the option schema
// runtime collaborator) is modeled as the
// `OptionRuntime` trait below rather than hard-coded — the default runtime
// has no child objects, so any key the static schema doesn't recognize is a
// hard parse failure, matching this crate's built-in filters.

use std::any::Any;

use crate::error::{GraphError, GraphResult};
use crate::graph::Graph;
use crate::ids::FilterId;
use crate::kind::{FilterKind, OptionSchema};

pub type OptionDict = serde_json::Map<String, serde_json::Value>;

/// Collaborator hook for option keys the static schema can't resolve
/// directly (AVOption's `AV_OPT_SEARCH_CHILDREN | AV_OPT_SEARCH_FAKE_OBJ`).
/// Keys it accepts are mirrored into the dict for `init_dict` to consume;
/// keys neither the schema nor this runtime recognize fail the parse.
pub trait OptionRuntime {
    fn resolves(&self, key: &str) -> bool {
        let _ = key;
        false
    }
}

pub struct NoChildObjects;
impl OptionRuntime for NoChildObjects {}

// ── Legacy syntax shims ───────────────────────────────────────────────────────

/// Returns the (possibly rewritten) argument string and whether a rewrite
/// that should be logged as deprecated occurred.
pub fn apply_legacy_shims(filter_name: &str, args: &str) -> (String, bool) {
    match filter_name {
        "scale" => scale_shim(args),
        "format" | "noformat" | "frei0r" | "frei0r_src" | "ocv" | "pp" | "aevalsrc" => {
            colon_pipe_shim(filter_name, args)
        }
        "mp" => (mp_shim(args), false),
        _ => (args.to_string(), false),
    }
}

/// `scale`'s `<w>:<h>:flags=<flags>` legacy form. The original splits the
/// string at the last `:` and parses the two halves separately, but the
/// result is observationally identical to just handing the whole string to
/// `process_options` (which already treats `:`-separated tokens as
/// positional until the first `key=value` token appears) — so this shim
/// only needs to detect the legacy form to emit the deprecation warning.
fn scale_shim(args: &str) -> (String, bool) {
    let colon = find_unescaped(args, ':');
    let eq = find_unescaped(args, '=');
    let legacy = match (colon, eq) {
        (Some(c), Some(e)) => c < e,
        (Some(_), None) => true,
        _ => false,
    };
    (args.to_string(), legacy)
}

fn leading_colon_skip(name: &str) -> usize {
    match name {
        "frei0r" | "ocv" => 1,
        "frei0r_src" => 3,
        _ => 0,
    }
}

fn colon_pipe_shim(name: &str, args: &str) -> (String, bool) {
    let skip = leading_colon_skip(name);
    let chars: Vec<char> = args.chars().collect();

    let mut idx = 0;
    let mut remaining_skips = skip;
    while remaining_skips > 0 {
        match chars[idx..].iter().position(|&c| c == ':') {
            Some(rel) => idx += rel + 1,
            None => {
                idx = chars.len();
                break;
            }
        }
        remaining_skips -= 1;
    }

    let (head, tail) = (&chars[..idx], &chars[idx..]);

    if name == "aevalsrc" {
        aevalsrc_shim(head, tail)
    } else {
        let mut deprecated = false;
        let mut out: Vec<char> = head.to_vec();
        for &c in tail {
            if c == ':' {
                out.push('|');
                deprecated = true;
            } else {
                out.push(c);
            }
        }
        (out.into_iter().collect(), deprecated)
    }
}

/// `aevalsrc`'s bespoke scan: tokens containing `=` are options and
/// left untouched, tokens without `=` are channel expressions and get their
/// separating `:` rewritten to `|`; a double `::` collapses to a single `|`.
fn aevalsrc_shim(head: &[char], tail: &[char]) -> (String, bool) {
    let mut out: Vec<char> = head.to_vec();
    let mut deprecated = false;
    let mut i = 0;
    while i < tail.len() {
        if tail[i] == ':' {
            if i + 1 < tail.len() && tail[i + 1] == ':' {
                // double separator: collapse to one '|'
                out.push('|');
                deprecated = true;
                i += 2;
                continue;
            }
            let rest = &tail[i + 1..];
            let epos = rest.iter().position(|&c| c == '=');
            let spos = rest.iter().position(|&c| c == ':');
            let next_token_is_opt = match (epos, spos) {
                (Some(e), Some(s)) => e < s,
                (Some(_), None) => true,
                _ => false,
            };
            if next_token_is_opt {
                out.push(':');
                i += 1;
                out.extend_from_slice(&tail[i..]);
                break;
            }
            out.push('|');
            deprecated = true;
            i += 1;
        } else {
            out.push(tail[i]);
            i += 1;
        }
    }
    (out.into_iter().collect(), deprecated)
}

fn mp_shim(args: &str) -> String {
    let stripped = args.strip_prefix("filter=").unwrap_or(args);
    let mut out = String::with_capacity(stripped.len());
    for c in stripped.chars() {
        if c == ':' || c == '=' {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

// ── Escape-aware tokenizing ───────────────────────────────────────────────────

fn find_unescaped(s: &str, target: char) -> Option<usize> {
    let bytes = s.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'\\' && i + 1 < bytes.len() {
            i += 2;
            continue;
        }
        if bytes[i] == target as u8 {
            return Some(i);
        }
        i += 1;
    }
    None
}

fn tokenize_colon(s: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut cur = String::new();
    let mut chars = s.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '\\' {
            if let Some(&n) = chars.peek() {
                cur.push('\\');
                cur.push(n);
                chars.next();
                continue;
            }
            cur.push(c);
        } else if c == ':' {
            tokens.push(std::mem::take(&mut cur));
        } else {
            cur.push(c);
        }
    }
    tokens.push(cur);
    tokens
}

fn unescape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            if let Some(n) = chars.next() {
                out.push(n);
                continue;
            }
        }
        out.push(c);
    }
    out
}

// ── Core parser ───────────────────────────────────────────────────────────────

/// Parses `args` (already through any legacy shim) against `schema`,
/// applying each resolved key to `priv_state` and mirroring every
/// successfully-resolved-but-undispatched key into the returned dict for the
/// init hook to finish consuming.
pub fn process_options(
    schema: &OptionSchema,
    shorthand: Option<&[&'static str]>,
    opt_runtime: &dyn OptionRuntime,
    priv_state: &mut dyn Any,
    args: &str,
) -> GraphResult<OptionDict> {
    let mut dict = OptionDict::new();
    if args.is_empty() {
        return Ok(dict);
    }

    let mut seen_named = false;
    let mut positional_idx = 0usize;

    for raw_token in tokenize_colon(args) {
        if let Some(eq) = find_unescaped(&raw_token, '=') {
            seen_named = true;
            let key = unescape(&raw_token[..eq]);
            let value = unescape(&raw_token[eq + 1..]);
            apply_one(schema, opt_runtime, priv_state, &mut dict, &key, &value)?;
        } else {
            if seen_named {
                return Err(GraphError::InvalidArgument(format!(
                    "positional value '{raw_token}' after a named option"
                )));
            }
            let shorthand = shorthand.ok_or_else(|| {
                GraphError::InvalidArgument(format!("no shorthand keys declared for '{raw_token}'"))
            })?;
            let key = *shorthand.get(positional_idx).ok_or_else(|| {
                GraphError::InvalidArgument(format!(
                    "no more positional options to assign '{raw_token}' to"
                ))
            })?;
            positional_idx += 1;
            let value = unescape(&raw_token);
            apply_one(schema, opt_runtime, priv_state, &mut dict, key, &value)?;
        }
    }

    Ok(dict)
}

/// A key the static schema recognizes is applied directly and consumed right
/// away (the `av_opt_set` + later `av_opt_set_dict` removal collapsed into
/// one step); a key only the child-object runtime recognizes is mirrored
/// into the dict for the init hook to consume; anything else is a hard
/// parse failure.
fn apply_one(
    schema: &OptionSchema,
    opt_runtime: &dyn OptionRuntime,
    priv_state: &mut dyn Any,
    dict: &mut OptionDict,
    key: &str,
    value: &str,
) -> GraphResult<()> {
    if let Some(spec) = schema.find(key) {
        (spec.set)(priv_state, value)?;
        Ok(())
    } else if opt_runtime.resolves(key) {
        dict.insert(key.to_string(), serde_json::Value::String(value.to_string()));
        Ok(())
    } else {
        Err(GraphError::OptionNotFound(key.to_string()))
    }
}

// ── Init dispatch ─────────────────────────────────────────────────────────────

/// A small set of filters that bypass the modern options pipeline and call
/// `init(ctx, args)` with the raw string unchanged, e.g. `abuffer`, `pan`.
pub fn uses_legacy_raw_init(kind: &FilterKind) -> bool {
    kind.legacy_raw_init
}

pub fn init_with_args(graph: &mut Graph, filter_id: FilterId, args: Option<&str>) -> GraphResult<()> {
    let kind = graph.instance(filter_id)?.kind.clone();

    if uses_legacy_raw_init(&kind) {
        let init = kind.init.ok_or(GraphError::OperationNotSupported)?;
        return init(graph, filter_id, args);
    }

    let raw = args.unwrap_or("");
    let mut dict = OptionDict::new();

    if !raw.is_empty() {
        if kind.priv_class.is_none() {
            return Err(GraphError::InvalidArgument(format!(
                "filter '{}' does not take any options, but options were provided: {raw}",
                kind.name
            )));
        }
        let (rewritten, warned) = apply_legacy_shims(kind.name, raw);
        if warned {
            eprintln!("[filtergraph] '{}': deprecated option syntax, args='{rewritten}'", kind.name);
        }
        let schema = kind.priv_class.as_ref().unwrap();
        let runtime = NoChildObjects;
        let inst = graph.instance_mut(filter_id)?;
        dict = process_options(schema, kind.shorthand.as_deref(), &runtime, &mut *inst.priv_state, &rewritten)?;
    }

    dispatch_init(graph, filter_id, args, &mut dict)?;

    if !dict.is_empty() {
        let leftover: Vec<_> = dict.keys().cloned().collect();
        return Err(GraphError::OptionNotFound(leftover.join(", ")));
    }
    Ok(())
}

/// Public-surface `init_with_dict`: an embedder that already has a parsed
/// key/value map (rather than a raw argument string) can hand it straight to
/// the filter, skipping string parsing entirely.
pub fn init_with_dict(graph: &mut Graph, filter_id: FilterId, mut opts: OptionDict) -> GraphResult<()> {
    let kind = graph.instance(filter_id)?.kind.clone();
    if uses_legacy_raw_init(&kind) {
        let init = kind.init.ok_or(GraphError::OperationNotSupported)?;
        return init(graph, filter_id, None);
    }

    if let Some(schema) = kind.priv_class.as_ref() {
        let inst = graph.instance_mut(filter_id)?;
        let runtime = NoChildObjects;
        let mut remaining = OptionDict::new();
        for (key, value) in opts.iter() {
            let value_str = match value {
                serde_json::Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            if let Some(spec) = schema.find(key) {
                (spec.set)(&mut *inst.priv_state, &value_str)?;
            } else if runtime.resolves(key) {
                remaining.insert(key.clone(), value.clone());
            } else {
                return Err(GraphError::OptionNotFound(key.clone()));
            }
        }
        opts = remaining;
    }

    dispatch_init(graph, filter_id, None, &mut opts)?;

    if !opts.is_empty() {
        let leftover: Vec<_> = opts.keys().cloned().collect();
        return Err(GraphError::OptionNotFound(leftover.join(", ")));
    }
    Ok(())
}

fn dispatch_init(
    graph: &mut Graph,
    filter_id: FilterId,
    args: Option<&str>,
    dict: &mut OptionDict,
) -> GraphResult<()> {
    let kind = graph.instance(filter_id)?.kind.clone();
    if let Some(init_opaque) = kind.init_opaque {
        init_opaque(graph, filter_id, args, None)
    } else if let Some(init) = kind.init {
        init(graph, filter_id, args)
    } else if let Some(init_dict) = kind.init_dict {
        init_dict(graph, filter_id, dict)
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::any::Any;

    #[derive(Default)]
    struct ScaleOpts {
        w: i64,
        h: i64,
        flags: String,
    }

    fn schema() -> OptionSchema {
        OptionSchema {
            options: vec![
                crate::kind::OptionSpec {
                    name: "w",
                    set: |p, v| {
                        p.downcast_mut::<ScaleOpts>().unwrap().w = v.parse().map_err(|_| {
                            GraphError::InvalidArgument(format!("bad int '{v}'"))
                        })?;
                        Ok(())
                    },
                },
                crate::kind::OptionSpec {
                    name: "h",
                    set: |p, v| {
                        p.downcast_mut::<ScaleOpts>().unwrap().h = v.parse().map_err(|_| {
                            GraphError::InvalidArgument(format!("bad int '{v}'"))
                        })?;
                        Ok(())
                    },
                },
                crate::kind::OptionSpec {
                    name: "flags",
                    set: |p, v| {
                        p.downcast_mut::<ScaleOpts>().unwrap().flags = v.to_string();
                        Ok(())
                    },
                },
            ],
        }
    }

    const SHORTHAND: &[&str] = &["w", "h", "flags"];

    #[test]
    fn shorthand_matches_named_form() {
        let schema = schema();
        let runtime = NoChildObjects;

        let mut a: Box<dyn Any> = Box::new(ScaleOpts::default());
        process_options(&schema, Some(SHORTHAND), &runtime, &mut *a, "640:480:bilinear").unwrap();

        let mut b: Box<dyn Any> = Box::new(ScaleOpts::default());
        process_options(&schema, Some(SHORTHAND), &runtime, &mut *b, "w=640:h=480:flags=bilinear").unwrap();

        let a = a.downcast_ref::<ScaleOpts>().unwrap();
        let b = b.downcast_ref::<ScaleOpts>().unwrap();
        assert_eq!((a.w, a.h, a.flags.as_str()), (b.w, b.h, b.flags.as_str()));
        assert_eq!((a.w, a.h, a.flags.as_str()), (640, 480, "bilinear"));
    }

    #[test]
    fn positional_after_named_fails() {
        let schema = schema();
        let runtime = NoChildObjects;
        let mut p: Box<dyn Any> = Box::new(ScaleOpts::default());
        let err = process_options(&schema, Some(SHORTHAND), &runtime, &mut *p, "640:h=480:bilinear").unwrap_err();
        assert!(matches!(err, GraphError::InvalidArgument(_)));
    }

    #[test]
    fn unknown_key_fails() {
        let schema = schema();
        let runtime = NoChildObjects;
        let mut p: Box<dyn Any> = Box::new(ScaleOpts::default());
        let err = process_options(&schema, Some(SHORTHAND), &runtime, &mut *p, "bogus=1").unwrap_err();
        assert!(matches!(err, GraphError::OptionNotFound(_)));
    }

    #[test]
    fn scale_legacy_form_is_detected() {
        let (rewritten, warned) = scale_shim("640:480:flags=bilinear");
        assert!(warned);
        assert_eq!(rewritten, "640:480:flags=bilinear");
        let (_, warned_modern) = scale_shim("w=640:h=480:flags=bilinear");
        assert!(!warned_modern);
    }

    #[test]
    fn format_shim_rewrites_colons_to_pipes() {
        let (rewritten, warned) = colon_pipe_shim("format", "yuv420p:yuv422p");
        assert!(warned);
        assert_eq!(rewritten, "yuv420p|yuv422p");
    }

    #[test]
    fn frei0r_shim_preserves_one_leading_colon() {
        let (rewritten, warned) = colon_pipe_shim("frei0r", "distort0r:0.2:0.2");
        assert!(warned);
        assert_eq!(rewritten, "distort0r:0.2|0.2");
    }

    #[test]
    fn mp_shim_escapes_and_strips_filter_prefix() {
        let rewritten = mp_shim("filter=eq2=1.0:1.0");
        assert_eq!(rewritten, "eq2\\=1.0\\:1.0");
    }
}
