// SPDX-License-Identifier: MIT

use super::*;

#[test]
fn seeds_the_expected_builtin_names() {
    let seeded = seed();
    let names: Vec<&str> = seeded.iter().map(|(name, _)| *name).collect();
    for expected in ["MAKE", "SHELL", "CC", "CXX", "RM", "AR"] {
        assert!(names.contains(&expected), "missing builtin {expected}");
    }
}

#[test]
fn builtins_are_recipe_file_scoped_so_command_line_overrides_win() {
    for (_, binding) in seed() {
        assert_eq!(binding.scope, Scope::RecipeFile);
    }
}
