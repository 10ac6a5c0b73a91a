// Compile tests for #[derive(QueryEncode)].
// Only macro input diagnostics and the generated impl are checked here.

#[test]
fn trybuild_tests() {
    let t = trybuild::TestCases::new();

    t.pass("tests/ui/pass_field_options.rs");
    t.compile_fail("tests/ui/fail_unknown_option.rs");
    t.compile_fail("tests/ui/fail_duplicate_option.rs");
    t.compile_fail("tests/ui/fail_rename_not_string.rs");
}
