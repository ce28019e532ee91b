// SPDX-License-Identifier: MIT

//! The `$(fn args…)` function table (spec §4.A).
//!
//! Every function here receives its arguments *unexpanded* (as raw text)
//! and decides for itself which arguments to expand and when — this is
//! required for `foreach`, whose body must be expanded once per loop
//! iteration rather than once up front, but is applied uniformly for
//! simplicity and symmetry with the source's behavior.

use crate::expand::VarScope;

const KNOWN_FUNCTIONS: &[&str] = &[
    "patsubst",
    "subst",
    "strip",
    "findstring",
    "filter",
    "filter-out",
    "sort",
    "word",
    "wordlist",
    "words",
    "firstword",
    "lastword",
    "dir",
    "notdir",
    "suffix",
    "basename",
    "addsuffix",
    "addprefix",
    "join",
    "wildcard",
    "shell",
    "foreach",
];

pub fn is_known_function(name: &str) -> bool {
    KNOWN_FUNCTIONS.contains(&name)
}

/// Split `rest` on top-level commas (commas nested inside `$(...)`/`${...}`
/// don't split).
fn split_args(rest: &str) -> Vec<&str> {
    let mut args = Vec::new();
    let mut depth = 0i32;
    let mut start = 0usize;
    let bytes = rest.as_bytes();
    let mut i = 0usize;
    while i < bytes.len() {
        match bytes[i] {
            b'(' | b'{' => depth += 1,
            b')' | b'}' => depth -= 1,
            b',' if depth == 0 => {
                args.push(&rest[start..i]);
                start = i + 1;
            }
            _ => {}
        }
        i += 1;
    }
    args.push(&rest[start..]);
    args
}

fn words(s: &str) -> Vec<&str> {
    s.split_whitespace().collect()
}

/// Call a known function. `expand_fn` is the expander's own recursive
/// entry point (bumping depth), used to expand sub-arguments on demand.
pub fn call(
    name: &str,
    rest: &str,
    scope: &dyn VarScope,
    depth: u32,
    expand_fn: &dyn Fn(&str, u32) -> String,
) -> String {
    let exp = |s: &str| expand_fn(s, depth + 1);

    match name {
        "foreach" => {
            let args = split_args(rest);
            if args.len() < 3 {
                return String::new();
            }
            let var_name = exp(args[0]).trim().to_string();
            let list = exp(args[1]);
            let body = args[2];
            let mut out = String::new();
            for word in words(&list) {
                let overlay = OverlayScope {
                    base: scope,
                    name: &var_name,
                    value: word,
                };
                out.push_str(&expand_fn_with_scope(body, &overlay, depth + 1));
            }
            out
        }
        "shell" => scope.run_shell(&exp(rest)),
        "wildcard" => {
            let pattern = exp(rest);
            let mut matches: Vec<String> = pattern
                .split_whitespace()
                .flat_map(|p| glob::glob(p).into_iter().flatten())
                .filter_map(|r| r.ok())
                .map(|p| p.to_string_lossy().into_owned())
                .collect();
            matches.sort();
            matches.join(" ")
        }
        "strip" => exp(rest).split_whitespace().collect::<Vec<_>>().join(" "),
        "words" => words(&exp(rest)).len().to_string(),
        "firstword" => words(&exp(rest)).first().map(|s| s.to_string()).unwrap_or_default(),
        "lastword" => words(&exp(rest)).last().map(|s| s.to_string()).unwrap_or_default(),
        "dir" => words(&exp(rest))
            .iter()
            .map(|name| match name.rfind('/') {
                Some(idx) => name[..=idx].to_string(),
                None => "./".to_string(),
            })
            .collect::<Vec<_>>()
            .join(" "),
        "notdir" => words(&exp(rest))
            .iter()
            .map(|name| match name.rfind('/') {
                Some(idx) => name[idx + 1..].to_string(),
                None => name.to_string(),
            })
            .collect::<Vec<_>>()
            .join(" "),
        "suffix" => words(&exp(rest))
            .iter()
            .filter_map(|name| {
                let base = name.rsplit('/').next().unwrap_or(name);
                base.rfind('.').map(|idx| name[name.len() - (base.len() - idx)..].to_string())
            })
            .collect::<Vec<_>>()
            .join(" "),
        "basename" => words(&exp(rest))
            .iter()
            .map(|name| {
                let base = name.rsplit('/').next().unwrap_or(name);
                match base.rfind('.') {
                    Some(idx) => name[..name.len() - (base.len() - idx)].to_string(),
                    None => name.to_string(),
                }
            })
            .collect::<Vec<_>>()
            .join(" "),
        "sort" => {
            let mut list: Vec<String> = words(&exp(rest)).into_iter().map(String::from).collect();
            list.sort();
            list.dedup();
            list.join(" ")
        }
        "subst" | "patsubst" | "findstring" | "filter" | "filter-out" | "word" | "wordlist"
        | "addsuffix" | "addprefix" | "join" => {
            let args: Vec<String> = split_args(rest).into_iter().map(exp).collect();
            call_multi_arg(name, &args)
        }
        _ => format!("$({name} {rest})"),
    }
}

fn call_multi_arg(name: &str, args: &[String]) -> String {
    match (name, args) {
        ("subst", [from, to, text]) => text.replace(from.as_str(), to.as_str()),
        ("patsubst", [pattern, replacement, text]) => words(text)
            .iter()
            .map(|w| patsubst_one(pattern, replacement, w))
            .collect::<Vec<_>>()
            .join(" "),
        ("findstring", [find, haystack]) => {
            if haystack.contains(find.as_str()) {
                find.clone()
            } else {
                String::new()
            }
        }
        ("filter", [patterns, text]) => words(text)
            .into_iter()
            .filter(|w| words(patterns).iter().any(|p| glob_match(p, w)))
            .collect::<Vec<_>>()
            .join(" "),
        ("filter-out", [patterns, text]) => words(text)
            .into_iter()
            .filter(|w| !words(patterns).iter().any(|p| glob_match(p, w)))
            .collect::<Vec<_>>()
            .join(" "),
        ("word", [n, text]) => {
            let idx: usize = n.trim().parse().unwrap_or(0);
            if idx == 0 {
                String::new()
            } else {
                words(text).get(idx - 1).map(|s| s.to_string()).unwrap_or_default()
            }
        }
        ("wordlist", [s, e, text]) => {
            let s: usize = s.trim().parse().unwrap_or(1);
            let e: usize = e.trim().parse().unwrap_or(0);
            if s == 0 || e < s {
                return String::new();
            }
            words(text)
                .into_iter()
                .skip(s - 1)
                .take(e - s + 1)
                .collect::<Vec<_>>()
                .join(" ")
        }
        ("addsuffix", [suffix, text]) => words(text)
            .iter()
            .map(|w| format!("{w}{suffix}"))
            .collect::<Vec<_>>()
            .join(" "),
        ("addprefix", [prefix, text]) => words(text)
            .iter()
            .map(|w| format!("{prefix}{w}"))
            .collect::<Vec<_>>()
            .join(" "),
        ("join", [a, b]) => {
            let wa = words(a);
            let wb = words(b);
            let len = wa.len().max(wb.len());
            (0..len)
                .map(|i| format!("{}{}", wa.get(i).unwrap_or(&""), wb.get(i).unwrap_or(&"")))
                .collect::<Vec<_>>()
                .join(" ")
        }
        _ => String::new(),
    }
}

/// `%`-pattern match used by `patsubst`/`filter`/`filter-out`: `%` matches
/// any (possibly empty) run of characters.
fn glob_match(pattern: &str, text: &str) -> bool {
    match pattern.find('%') {
        None => pattern == text,
        Some(idx) => {
            let (prefix, suffix) = (&pattern[..idx], &pattern[idx + 1..]);
            text.starts_with(prefix) && text.ends_with(suffix) && text.len() >= prefix.len() + suffix.len()
        }
    }
}

fn patsubst_one(pattern: &str, replacement: &str, word: &str) -> String {
    match pattern.find('%') {
        None => {
            if word == pattern {
                replacement.to_string()
            } else {
                word.to_string()
            }
        }
        Some(p_idx) => {
            let (prefix, suffix) = (&pattern[..p_idx], &pattern[p_idx + 1..]);
            if word.starts_with(prefix) && word.ends_with(suffix) && word.len() >= prefix.len() + suffix.len() {
                let stem = &word[prefix.len()..word.len() - suffix.len()];
                match replacement.find('%') {
                    Some(r_idx) => format!("{}{}{}", &replacement[..r_idx], stem, &replacement[r_idx + 1..]),
                    None => replacement.to_string(),
                }
            } else {
                word.to_string()
            }
        }
    }
}

struct OverlayScope<'a> {
    base: &'a dyn VarScope,
    name: &'a str,
    value: &'a str,
}

impl VarScope for OverlayScope<'_> {
    fn lookup(&self, name: &str) -> Option<String> {
        if name == self.name {
            Some(self.value.to_string())
        } else {
            self.base.lookup(name)
        }
    }

    fn run_shell(&self, command: &str) -> String {
        self.base.run_shell(command)
    }
}

/// `foreach`'s body must be expanded against the *overlay* scope (with the
/// loop variable bound), not the outer scope `expand_fn` closes over — so
/// it calls back into the expander's depth-tracked entry point directly
/// rather than reusing the closure captured in `call`.
fn expand_fn_with_scope(text: &str, scope: &dyn VarScope, depth: u32) -> String {
    crate::expand::expand_depth(text, scope, depth)
}

#[cfg(test)]
#[path = "functions_tests.rs"]
mod tests;
