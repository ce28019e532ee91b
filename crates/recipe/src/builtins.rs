// SPDX-License-Identifier: MIT

//! Built-in variables seeded into every recipe file's variable table before
//! parsing begins (spec §4.A, "implicit bindings").
//!
//! These mirror the handful of variables POSIX make and GNU make both
//! define implicitly, so that recipes written against either can run
//! unmodified. Values here are the *defaults*; an explicit assignment in
//! the recipe file (or on the command line, which always wins per
//! [`smak_core::Scope`] ordering) overrides them.

use smak_core::{AssignOp, Scope, VarBinding};

pub fn seed() -> Vec<(&'static str, VarBinding)> {
    let deferred = |value: &str| VarBinding::new(AssignOp::Deferred, value.to_string(), Scope::RecipeFile);

    vec![
        ("MAKE", deferred("smak")),
        ("SHELL", deferred("/bin/sh")),
        ("CC", deferred("cc")),
        ("CXX", deferred("c++")),
        ("CFLAGS", deferred("")),
        ("CXXFLAGS", deferred("")),
        ("LDFLAGS", deferred("")),
        ("RM", deferred("rm -f")),
        ("AR", deferred("ar")),
        ("ARFLAGS", deferred("rv")),
        ("MAKEFLAGS", deferred("")),
    ]
}

#[cfg(test)]
#[path = "builtins_tests.rs"]
mod tests;
