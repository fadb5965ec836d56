use std::path::{Path, PathBuf};

use anyhow::Context;
use regex_lite::Regex;
use serde::Deserialize;

fn main() -> anyhow::Result<()> {
    let mut args = std::env::args().skip(1);
    match args.next().as_deref() {
        Some("arch-check") => arch_check(),
        Some(cmd) => anyhow::bail!("Unknown xtask command: {cmd}"),
        None => anyhow::bail!("Usage: cargo xtask <command>\n\nCommands:\n  arch-check"),
    }
}

/// Crates each workspace member may depend on (normal dependencies only).
const ALLOWED_INTERNAL: &[(&str, &[&str])] = &[
    ("tavern-domain", &[]),
    ("tavern-shared", &["tavern-domain"]),
    ("tavern-engine", &["tavern-domain", "tavern-shared"]),
    ("tavern-player", &["tavern-domain", "tavern-shared"]),
];

/// Runtime and I/O crates the pure crates must not pull in.
const PURE_CRATES: &[&str] = &["tavern-domain", "tavern-shared"];
const IO_CRATES: &[&str] = &[
    "tokio",
    "axum",
    "sqlx",
    "reqwest",
    "tokio-tungstenite",
    "dashmap",
];

#[derive(Debug, Deserialize)]
struct Metadata {
    packages: Vec<Package>,
}

#[derive(Debug, Deserialize)]
struct Package {
    name: String,
    manifest_path: PathBuf,
    dependencies: Vec<Dependency>,
}

#[derive(Debug, Deserialize)]
struct Dependency {
    name: String,
    #[serde(default)]
    kind: Option<String>,
}

fn arch_check() -> anyhow::Result<()> {
    let output = std::process::Command::new("cargo")
        .args(["metadata", "--format-version", "1", "--no-deps"])
        .output()
        .context("running cargo metadata")?;

    if !output.status.success() {
        anyhow::bail!("cargo metadata failed")
    }

    let metadata: Metadata =
        serde_json::from_slice(&output.stdout).context("parsing cargo metadata")?;

    let mut violations = Vec::new();
    for package in &metadata.packages {
        violations.extend(check_dependencies(package));
        if let Some(src) = package.manifest_path.parent().map(|dir| dir.join("src")) {
            violations.extend(check_imports(&package.name, &src)?);
        }
    }

    if violations.is_empty() {
        println!("arch-check: ok ({} crates)", metadata.packages.len());
        return Ok(());
    }
    for violation in &violations {
        eprintln!("arch-check: {violation}");
    }
    anyhow::bail!("{} architecture violation(s)", violations.len())
}

fn check_dependencies(package: &Package) -> Vec<String> {
    let Some((_, allowed)) = ALLOWED_INTERNAL
        .iter()
        .find(|(name, _)| *name == package.name)
    else {
        return Vec::new();
    };

    let normal = package
        .dependencies
        .iter()
        .filter(|dep| dep.kind.is_none());

    let mut violations = Vec::new();
    for dep in normal {
        if dep.name.starts_with("tavern-") && !allowed.contains(&dep.name.as_str()) {
            violations.push(format!("{} must not depend on {}", package.name, dep.name));
        }
        if PURE_CRATES.contains(&package.name.as_str()) && IO_CRATES.contains(&dep.name.as_str())
        {
            violations.push(format!(
                "{} is I/O-free and must not depend on {}",
                package.name, dep.name
            ));
        }
    }
    violations
}

/// `use tavern_x` lines that name a crate the package may not reach.
fn check_imports(package: &str, src: &Path) -> anyhow::Result<Vec<String>> {
    let Some((_, allowed)) = ALLOWED_INTERNAL.iter().find(|(name, _)| *name == package) else {
        return Ok(Vec::new());
    };
    let import = Regex::new(r"^\s*(?:pub\s+)?use\s+(tavern_[a-z]+)")?;

    let mut violations = Vec::new();
    for file in rust_files(src)? {
        if is_test_file(&file) {
            continue;
        }
        let text = std::fs::read_to_string(&file)
            .with_context(|| format!("reading {}", file.display()))?;
        // Test modules may reach further (the engine's e2e tests use the player).
        let production = text.split("#[cfg(test)]").next().unwrap_or_default();
        for (line_no, line) in production.lines().enumerate() {
            let Some(found) = import.captures(line).and_then(|c| c.get(1)) else {
                continue;
            };
            let crate_name = found.as_str().replace('_', "-");
            if crate_name != package && !allowed.contains(&crate_name.as_str()) {
                violations.push(format!(
                    "{}:{} imports {}",
                    file.display(),
                    line_no + 1,
                    found.as_str()
                ));
            }
        }
    }
    Ok(violations)
}

fn is_test_file(path: &Path) -> bool {
    path.file_stem()
        .and_then(|stem| stem.to_str())
        .is_some_and(|stem| stem.ends_with("tests"))
}

fn rust_files(dir: &Path) -> anyhow::Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    if !dir.is_dir() {
        return Ok(files);
    }
    for entry in std::fs::read_dir(dir).with_context(|| format!("listing {}", dir.display()))? {
        let path = entry?.path();
        if path.is_dir() {
            files.extend(rust_files(&path)?);
        } else if path.extension().is_some_and(|ext| ext == "rs") {
            files.push(path);
        }
    }
    Ok(files)
}
