mod common;

use std::path::PathBuf;

use acb_rust::deps::{DepKind, DependencySpec, RegistryReader, ScanResult, Scanner};
use common::{setup_workspace, write_file};

struct EmptyRegistry;

impl RegistryReader for EmptyRegistry {
    fn read_value(&self, _key: &str, _value: &str) -> Option<String> {
        None
    }

    fn value_names(&self, _key: &str) -> Vec<String> {
        Vec::new()
    }
}

fn cmake_spec(common_path: PathBuf) -> DependencySpec {
    let mut spec = DependencySpec::new("CMake", DepKind::CMake);
    spec.exe_name = "cmake.exe".into();
    spec.common_paths = vec![common_path];
    spec
}

#[test]
fn nothing_found_anywhere_is_a_clean_negative() {
    let scanner = Scanner::new(Box::new(EmptyRegistry))
        .with_path_var("/usr/local/bin")
        .without_version_checks();
    let spec = cmake_spec(PathBuf::from(r"C:\nonexistent\cmake.exe"));

    assert_eq!(scanner.scan(&spec), ScanResult::not_found());
}

#[test]
fn common_path_wins_over_path_variable() {
    let (tmp, _ws) = setup_workspace();
    let installed = tmp.path().join("Program Files/CMake/bin/cmake.exe");
    let on_path = tmp.path().join("tools/cmake-portable/cmake.exe");
    write_file(&installed, "");
    write_file(&on_path, "");

    let scanner = Scanner::new(Box::new(EmptyRegistry))
        .with_path_var(on_path.parent().unwrap().as_os_str())
        .without_version_checks();
    let result = scanner.scan(&cmake_spec(installed.clone()));

    assert!(result.detected);
    assert_eq!(result.path, installed.to_string_lossy());
}

#[test]
fn path_directories_named_after_the_tool_are_probed() {
    let (tmp, _ws) = setup_workspace();
    let on_path = tmp.path().join("tools/CMake-3.31/cmake.exe");
    write_file(&on_path, "");

    let scanner = Scanner::new(Box::new(EmptyRegistry))
        .with_path_var(on_path.parent().unwrap().as_os_str())
        .without_version_checks();
    let result = scanner.scan(&cmake_spec(tmp.path().join("missing/cmake.exe")));

    assert!(result.detected);
    assert!(result.path.ends_with("cmake.exe"));
}
