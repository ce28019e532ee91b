// SPDX-License-Identifier: MIT

use super::*;

#[test]
fn interning_same_string_twice_returns_same_id() {
    let interner = StringInterner::new();
    let a = interner.intern_target("foo.o");
    let b = interner.intern_target("foo.o");
    assert_eq!(a, b);
}

#[test]
fn files_and_targets_are_independent_namespaces() {
    let interner = StringInterner::new();
    let file = interner.intern_file("Makefile");
    let target = interner.intern_target("Makefile");
    assert_eq!(interner.resolve_file(file).as_deref(), Some("Makefile"));
    assert_eq!(interner.resolve_target(target).as_deref(), Some("Makefile"));
}

#[test]
fn resolve_unknown_id_is_none() {
    let interner = StringInterner::new();
    let bogus = interner.intern_target("a");
    let interner2 = StringInterner::new();
    // bogus id minted from a different interner resolves to whatever index 0
    // holds there, or None if nothing has been interned yet.
    assert_eq!(interner2.resolve_target(bogus), None);
}
