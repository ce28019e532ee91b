// SPDX-License-Identifier: MIT

//! Recursive dependency queuing (spec §4.F, the job master's 8-step
//! algorithm run once per `submit_job` and once per discovered
//! prerequisite).

use super::{Master, MasterAction};
use smak_core::{ClientId, CompositeEntry, RecipeLine, Rule, TargetId, TargetStatus, Task};
use std::collections::HashSet;
use tracing::warn;

impl Master {
    /// `TASK_RETURN task-id reason` (spec §4.E step 5): the worker refused
    /// the task outright (e.g. its environment hadn't arrived yet). The
    /// task already cleared the dispatch-readiness check once, so its
    /// prerequisites cannot have regressed (spec §3 "target progression" is
    /// monotonic) — re-issuing the identical command as a fresh queued task
    /// is always safe. This doesn't count against the auto-retry cap (spec
    /// §4.F step 3) because the recipe itself never ran.
    pub fn task_return(&mut self, task_id: smak_core::TaskId, reason: &str) -> Vec<MasterAction> {
        let Some(target) = self.task_target.remove(&task_id) else {
            warn!(?task_id, "TASK_RETURN for an unknown task, ignoring");
            return Vec::new();
        };
        let Some(dispatched) = self.task_dispatch.remove(&task_id) else {
            warn!(?task_id, "TASK_RETURN for a task with no dispatch record, ignoring");
            return Vec::new();
        };
        warn!(
            target = %self.db.interner.resolve_target(target).unwrap_or_default(),
            %reason,
            "worker returned its task, re-queuing"
        );
        let new_id = self.task_ids.next();
        let task = Task {
            id: new_id,
            target,
            dir: dispatched.dir,
            command: dispatched.command,
            output: smak_core::OutputBuffer::new(),
            retry_count: dispatched.retry_count,
        };
        self.task_echo.insert(new_id, dispatched.echo_lines);
        self.queue.push_back(task);
        self.in_progress.insert(target, TargetStatus::Queued);
        Vec::new()
    }

    /// `TASK_DECOMPOSE task-id subtargets…` (spec §4.E step 5): the worker
    /// says this target is better expressed as a set of subtargets, which
    /// the master re-queues in its place. The abandoned task's target
    /// becomes a composite awaiting those subtargets — pre-registered
    /// before recursing, exactly like the composite pre-registration in
    /// [`queue_target`] step 5, so a subtarget that fails synchronously
    /// still signals back into it.
    pub fn task_decompose(&mut self, task_id: smak_core::TaskId, subtargets: Vec<String>) -> Vec<MasterAction> {
        let Some(target) = self.task_target.remove(&task_id) else {
            warn!(?task_id, "TASK_DECOMPOSE for an unknown task, ignoring");
            return Vec::new();
        };
        self.task_dispatch.remove(&task_id);

        let mut actions = Vec::new();
        if subtargets.is_empty() {
            warn!(
                target = %self.db.interner.resolve_target(target).unwrap_or_default(),
                "worker decomposed a task into zero subtargets, treating as a failure"
            );
            actions.extend(self.fail_target(target, 1));
            return actions;
        }

        let sub_ids: Vec<TargetId> = subtargets.iter().map(|s| self.db.interner.intern_target(s)).collect();
        let remaining: HashSet<TargetId> = sub_ids.iter().copied().collect();
        self.composite_pending
            .insert(target, CompositeEntry::new(remaining, ClientId::new("internal")));
        self.in_progress.insert(target, TargetStatus::Pending);

        let mut chain = Vec::new();
        for &sub in &sub_ids {
            queue_target(self, sub, &mut chain, &mut actions);
        }

        if let Some(entry) = self.composite_pending.get(&target) {
            if entry.is_satisfied() {
                self.composite_pending.remove(&target);
                self.complete_target(target);
                actions.extend(self.emit_job_complete(target, 0));
                actions.extend(self.resolve_composites_on_success(target));
            }
        }
        actions
    }

    /// `SUBMIT_JOB target` (spec §4.H): queue `target` and everything it
    /// transitively depends on. Returns the side effects already resolvable
    /// synchronously — a target that was already completed/failed, or an
    /// empty composite, resolves immediately without ever touching a worker.
    pub fn submit_job(&mut self, target_name: &str, client: ClientId) -> Vec<MasterAction> {
        self.jobs_received = true;
        let target = self.db.interner.intern_target(target_name);
        self.submit_origin.entry(target).or_default().push(client);

        let mut actions = Vec::new();
        if self.completed.contains(&target) {
            actions.extend(self.emit_job_complete(target, 0));
            return actions;
        }
        if let Some(&code) = self.failed.get(&target) {
            actions.extend(self.emit_job_complete(target, code));
            return actions;
        }

        let mut chain = Vec::new();
        queue_target(self, target, &mut chain, &mut actions);
        actions
    }
}

fn queue_target(master: &mut Master, target: TargetId, chain: &mut Vec<TargetId>, actions: &mut Vec<MasterAction>) {
    // Step 1: a target already tracked (queued, dispatched, pending,
    // done, or failed) is never re-queued.
    if master.in_progress.contains_key(&target) {
        return;
    }

    // Step 2: `assume`d targets are marked complete without ever being
    // looked up.
    if master.assumed.contains(&target) {
        master.complete_target(target);
        actions.extend(master.emit_job_complete(target, 0));
        actions.extend(master.resolve_composites_on_success(target));
        return;
    }

    if chain.len() as u32 >= master.max_depth {
        let trace: Vec<String> = chain.iter().filter_map(|&t| master.db.interner.resolve_target(t)).collect();
        warn!(chain = ?trace, "recursion depth exceeded while queuing, abandoning this branch");
        actions.extend(master.fail_target(target, 1));
        return;
    }
    chain.push(target);

    // Step 3: rule lookup, fixed/pseudo first, then pattern matching with
    // a derived stem.
    let resolved = lookup_rule_for(master, target);

    let Some((rule, stem)) = resolved else {
        // No rule at all: a plain source file. If it exists on disk, it's
        // already satisfied; otherwise this branch can never complete.
        let name = master.db.interner.resolve_target(target).unwrap_or_default();
        let path = crate::staleness::resolve_vpath(&name, &master.cwd, &master.db, &master.ignore);
        if path.exists() {
            master.complete_target(target);
            actions.extend(master.emit_job_complete(target, 0));
            actions.extend(master.resolve_composites_on_success(target));
        } else {
            actions.extend(master.fail_target(target, 1));
        }
        chain.pop();
        return;
    };

    // Step 4: resolve and filter prerequisites (stem substitution, drop
    // inactive/source-control patterns).
    let prereqs: Vec<TargetId> = resolve_prerequisites(master, &rule, stem.as_deref())
        .into_iter()
        .filter(|&p| !is_inactive(master, p))
        .collect();

    // Step 5: a composite target (prerequisites, no recipe) is
    // pre-registered before recursing, so a prerequisite that completes
    // synchronously during this same recursion still satisfies it.
    let is_composite = rule.recipe.is_empty() && !prereqs.is_empty();
    if is_composite {
        let remaining: HashSet<TargetId> = prereqs.iter().copied().collect();
        master
            .composite_pending
            .insert(target, CompositeEntry::new(remaining, ClientId::new("internal")));
        master.in_progress.insert(target, TargetStatus::Pending);
    }

    // Step 6: recurse into every prerequisite.
    for &prereq in &prereqs {
        queue_target(master, prereq, chain, actions);
    }

    if prereqs.iter().any(|p| master.failed.contains_key(p)) {
        master.composite_pending.remove(&target);
        actions.extend(master.fail_target(target, 1));
        chain.pop();
        return;
    }

    if is_composite {
        if let Some(entry) = master.composite_pending.get(&target) {
            if entry.is_satisfied() {
                master.composite_pending.remove(&target);
                master.complete_target(target);
                actions.extend(master.emit_job_complete(target, 0));
                actions.extend(master.resolve_composites_on_success(target));
            }
        }
        chain.pop();
        return;
    }

    // Step 7: a real recipe — decide whether it needs to run.
    if crate::staleness::needs_rebuild(target, &master.cwd, &master.db, &master.dirty, &master.ignore) {
        enqueue_task(master, target, &rule, &prereqs, stem.as_deref());
    } else {
        master.complete_target(target);
        actions.extend(master.emit_job_complete(target, 0));
        actions.extend(master.resolve_composites_on_success(target));
    }

    chain.pop();
}

fn enqueue_task(master: &mut Master, target: TargetId, rule: &Rule, prereqs: &[TargetId], stem: Option<&str>) {
    let task_id = master.task_ids.next();

    let expanded_recipe: Vec<RecipeLine> = rule
        .recipe
        .iter()
        .map(|line| RecipeLine {
            command: master.variables.expand(&line.command),
            silent: line.silent,
            ignore_error: line.ignore_error,
        })
        .collect();
    let vars = master.automatic_vars_for(target, prereqs, stem);
    let (command, echo) = crate::automatic::build_command(&expanded_recipe, &vars);

    let task = Task::new(task_id, target, master.cwd.clone(), command);
    master.queue.push_back(task);
    master.task_prereqs.insert(task_id, prereqs.to_vec());
    master.task_stems.insert(task_id, stem.map(str::to_string));
    master.task_echo.insert(task_id, echo);
    master.in_progress.insert(target, TargetStatus::Queued);
}

fn lookup_rule_for(master: &Master, target: TargetId) -> Option<(Rule, Option<String>)> {
    if let Some(rule) = master.db.lookup(master.recipe_file, target) {
        return Some((rule.clone(), None));
    }
    match_pattern_rule(master, target)
}

fn match_pattern_rule(master: &Master, target: TargetId) -> Option<(Rule, Option<String>)> {
    let name = master.db.interner.resolve_target(target)?;
    for rule in master.db.pattern_rules() {
        if master.db.inactive_patterns.contains(&rule.target) {
            continue;
        }
        let Some(pattern) = master.db.interner.resolve_target(rule.target) else {
            continue;
        };
        if let Some(stem) = match_stem(&pattern, &name) {
            return Some((rule.clone(), Some(stem)));
        }
    }
    None
}

/// Match a single-`%` pattern against a concrete name, returning the
/// matched stem.
fn match_stem(pattern: &str, name: &str) -> Option<String> {
    let idx = pattern.find('%')?;
    let (prefix, suffix) = (&pattern[..idx], &pattern[idx + 1..]);
    if name.len() < prefix.len() + suffix.len() {
        return None;
    }
    if !name.starts_with(prefix) || !name.ends_with(suffix) {
        return None;
    }
    Some(name[prefix.len()..name.len() - suffix.len()].to_string())
}

fn resolve_prerequisites(master: &Master, rule: &Rule, stem: Option<&str>) -> Vec<TargetId> {
    rule.prerequisites
        .iter()
        .map(|&p| {
            let name = master.db.interner.resolve_target(p).unwrap_or_default();
            match stem {
                Some(s) if name.contains('%') => master.db.interner.intern_target(&name.replace('%', s)),
                _ => p,
            }
        })
        .collect()
}

fn is_inactive(master: &Master, target: TargetId) -> bool {
    let Some(name) = master.db.interner.resolve_target(target) else {
        return false;
    };
    master.db.inactive_patterns.iter().any(|&pat| {
        master
            .db
            .interner
            .resolve_target(pat)
            .is_some_and(|pattern| match_stem(&pattern, &name).is_some())
    })
}

#[cfg(test)]
#[path = "queue_tests.rs"]
mod tests;
