use std::path::{Path, PathBuf};
use std::process::Command;

const MAX_LINES: usize = 750;

const SOURCE_DIR: &str = "src";

fn main() {
    println!("cargo:rerun-if-changed=.git/HEAD");
    println!("cargo:rerun-if-changed=.git/refs/heads/main");
    println!("cargo:rerun-if-changed=.git/packed-refs");
    println!("cargo:rerun-if-changed={}", SOURCE_DIR);

    let sha = Command::new("git")
        .args(["rev-parse", "--short", "HEAD"])
        .output()
        .ok()
        .and_then(|output| {
            if output.status.success() {
                String::from_utf8(output.stdout)
                    .ok()
                    .map(|s| s.trim().to_string())
            } else {
                None
            }
        })
        .unwrap_or_else(|| "unknown".to_string());

    println!("cargo:rustc-env=TERMD_GIT_SHA={}", sha);

    let manifest_dir = std::env::var("CARGO_MANIFEST_DIR").expect("CARGO_MANIFEST_DIR must be set");
    let root = PathBuf::from(&manifest_dir);
    let mut sources = Vec::new();
    walk_directory(&root.join(SOURCE_DIR), &mut sources);
    sources.sort();

    for file in &sources {
        println!("cargo:rerun-if-changed={}", file.display());
    }

    enforce_line_limits(&root, &sources);
    enforce_no_dead_code_allows(&root, &sources);
    enforce_serial_for_env_mutations(&root, &sources);
}

fn walk_directory(dir: &Path, files: &mut Vec<PathBuf>) {
    let entries = match std::fs::read_dir(dir) {
        Ok(e) => e,
        Err(_) => return,
    };

    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            walk_directory(&path, files);
        } else if path.extension().and_then(|e| e.to_str()) == Some("rs") {
            files.push(path);
        }
    }
}

fn count_non_empty_lines(content: &str) -> usize {
    content
        .lines()
        .filter(|line| !line.trim().is_empty())
        .count()
}

/// Prints a violation report and fails the build.
fn fail(title: &str, violations: &[(PathBuf, usize, String)], advice: &[&str]) -> ! {
    eprintln!("\n========================================");
    eprintln!("{}", title);
    eprintln!("========================================");
    eprintln!();
    for (path, line, detail) in violations {
        eprintln!("  {}:{}", path.display(), line);
        eprintln!("    {}", detail.trim());
        eprintln!();
    }
    eprintln!("========================================");
    for line in advice {
        eprintln!("{}", line);
    }
    eprintln!("========================================\n");
    panic!("Build failed: {} ({} occurrence(s))", title, violations.len());
}

fn relative(root: &Path, file: &Path) -> PathBuf {
    file.strip_prefix(root).unwrap_or(file).to_path_buf()
}

fn enforce_line_limits(root: &Path, sources: &[PathBuf]) {
    let mut violations = Vec::new();
    for file in sources {
        match std::fs::read_to_string(file) {
            Ok(content) => {
                let count = count_non_empty_lines(&content);
                if count > MAX_LINES {
                    violations.push((
                        relative(root, file),
                        count,
                        format!("{} non-empty lines (exceeds by {})", count, count - MAX_LINES),
                    ));
                }
            }
            Err(e) => println!(
                "cargo:warning=Could not read file {}: {}",
                relative(root, file).display(),
                e
            ),
        }
    }

    if !violations.is_empty() {
        fail(
            &format!("FILE LINE LIMIT EXCEEDED (max {} lines)", MAX_LINES),
            &violations,
            &["Please split these files into smaller modules."],
        );
    }
}

fn enforce_no_dead_code_allows(root: &Path, sources: &[PathBuf]) {
    let mut violations = Vec::new();
    for file in sources {
        let Ok(content) = std::fs::read_to_string(file) else {
            continue;
        };
        for (line_num, line) in content.lines().enumerate() {
            let trimmed = line.trim();
            if (trimmed.starts_with("#[allow(") || trimmed.starts_with("#![allow("))
                && trimmed.contains("dead_code")
            {
                violations.push((relative(root, file), line_num + 1, line.to_string()));
            }
        }
    }

    if !violations.is_empty() {
        fail(
            "#[allow(dead_code)] IS NOT ALLOWED",
            &violations,
            &[
                "Delete unused code instead of silencing the warning.",
                "Test-only helpers belong behind #[cfg(test)].",
            ],
        );
    }
}

/// Requires #[serial] on tests that mutate environment variables.
fn enforce_serial_for_env_mutations(root: &Path, sources: &[PathBuf]) {
    let mut violations = Vec::new();

    for file in sources {
        let Ok(content) = std::fs::read_to_string(file) else {
            continue;
        };
        let lines: Vec<&str> = content.lines().collect();

        let mut in_test_fn = false;
        let mut test_fn_start = 0;
        let mut has_serial = false;
        let mut brace_depth = 0i32;

        for (i, line) in lines.iter().enumerate() {
            let trimmed = line.trim();

            if trimmed == "#[serial]" || trimmed == "#[serial_test::serial]" {
                has_serial = true;
            }

            if trimmed == "#[test]" || trimmed.starts_with("#[tokio::test") {
                test_fn_start = i + 1;
                in_test_fn = true;
                brace_depth = 0;
                continue;
            }

            if !in_test_fn {
                continue;
            }

            for c in line.chars() {
                match c {
                    '{' => brace_depth += 1,
                    '}' => brace_depth -= 1,
                    _ => {}
                }
            }

            let mutates = !trimmed.starts_with("//")
                && (trimmed.contains("env::set_var") || trimmed.contains("env::remove_var"));
            if mutates && !has_serial {
                violations.push((
                    relative(root, file),
                    test_fn_start,
                    "test mutates the environment without #[serial]".to_string(),
                ));
                in_test_fn = false;
                has_serial = false;
                continue;
            }

            if brace_depth == 0 && trimmed.ends_with('}') {
                in_test_fn = false;
                has_serial = false;
            }
        }
    }

    if !violations.is_empty() {
        fail(
            "ENV MUTATIONS REQUIRE #[serial]",
            &violations,
            &[
                "Environment variables are process-wide state.",
                "Add `use serial_test::serial;` and mark the test #[serial].",
            ],
        );
    }
}
