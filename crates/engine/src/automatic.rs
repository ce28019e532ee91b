// SPDX-License-Identifier: MIT

//! Automatic-variable substitution and recipe-line joining (spec §4.A
//! "Automatic variables... resolved by the orchestrator after it selects
//! the target and prerequisite list", spec §4.F step 7).

use smak_core::RecipeLine;

/// The resolved values of `$@ $< $^ $*` for one task, known only once the
/// job master has picked a target and matched it against a rule.
#[derive(Debug, Clone, Default)]
pub struct AutomaticVars {
    /// `$@` — the target name.
    pub target: String,
    /// `$<` — the first prerequisite.
    pub first_prereq: String,
    /// `$^` — all prerequisites, space-joined, duplicates removed in the
    /// order they first appear (gmake behavior for `$^`).
    pub all_prereqs: String,
    /// `$*` — the `%` pattern's matched stem, empty for non-pattern rules.
    pub stem: String,
}

impl AutomaticVars {
    pub fn new(target: &str, prereqs: &[String], stem: Option<&str>) -> Self {
        let mut seen = std::collections::HashSet::new();
        let deduped: Vec<&str> = prereqs
            .iter()
            .map(String::as_str)
            .filter(|p| seen.insert(*p))
            .collect();
        Self {
            target: target.to_string(),
            first_prereq: prereqs.first().cloned().unwrap_or_default(),
            all_prereqs: deduped.join(" "),
            stem: stem.unwrap_or_default().to_string(),
        }
    }

    /// Substitute `$@ $< $^ $*` into an already variable-expanded command
    /// string. Must run after [`smak_recipe::expand`], which leaves these
    /// four references untouched.
    pub fn substitute(&self, command: &str) -> String {
        let mut out = String::with_capacity(command.len());
        let chars: Vec<char> = command.chars().collect();
        let mut i = 0;
        while i < chars.len() {
            if chars[i] == '$' && i + 1 < chars.len() {
                match chars[i + 1] {
                    '@' => {
                        out.push_str(&self.target);
                        i += 2;
                        continue;
                    }
                    '<' => {
                        out.push_str(&self.first_prereq);
                        i += 2;
                        continue;
                    }
                    '^' => {
                        out.push_str(&self.all_prereqs);
                        i += 2;
                        continue;
                    }
                    '*' => {
                        out.push_str(&self.stem);
                        i += 2;
                        continue;
                    }
                    _ => {}
                }
            }
            out.push(chars[i]);
            i += 1;
        }
        out
    }
}

/// Build the single shell command string a worker will execute for a
/// recipe, joining every recipe line with `&&` (spec §4.F step 7:
/// "multi-line recipes joined with `&&`"). A line marked `ignore_error`
/// must not abort the chain on nonzero exit, so it's wrapped in a
/// subshell that always reports success to the `&&` chain while still
/// letting its own stderr/exit code surface to the worker's output capture
/// via the wrapped command itself.
///
/// Returns the joined command plus the list of lines that should be echoed
/// to observers before the task runs (everything except `@`-silenced
/// lines) — a presentation concern the worker itself doesn't need to know
/// about.
pub fn build_command(recipe: &[RecipeLine], vars: &AutomaticVars) -> (String, Vec<String>) {
    let mut parts = Vec::with_capacity(recipe.len());
    let mut echoed = Vec::new();

    for line in recipe {
        let substituted = vars.substitute(&line.command);
        if !line.silent {
            echoed.push(substituted.clone());
        }
        if line.ignore_error {
            parts.push(format!("{{ {substituted}; }} || true", substituted = substituted));
        } else {
            parts.push(substituted);
        }
    }

    (parts.join(" && "), echoed)
}

#[cfg(test)]
#[path = "automatic_tests.rs"]
mod tests;
