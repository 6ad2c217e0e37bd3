//! incprof command-line tests.

use crate::common::*;

use incprof_protocol::snapshot::{list_snapshots, list_staged};

#[test]
fn test_help_lists_subcommands() {
    let dir = tempfile::tempdir().unwrap();
    let output = run_incprof(dir.path(), &["--help"]);

    assert!(output.status.success());
    let text = combined(&output);
    assert!(text.contains("run"), "{}", text);
    assert!(text.contains("find-offset"), "{}", text);
}

#[test]
fn test_run_requires_program() {
    let dir = tempfile::tempdir().unwrap();
    let output = run_incprof(dir.path(), &["run"]);
    assert!(!output.status.success());
}

#[test]
fn test_run_rejects_bad_numbers() {
    let dir = tempfile::tempdir().unwrap();

    let output = run_incprof(dir.path(), &["run", "--useconds", "soon", "--", "true"]);
    assert!(!output.status.success());
    assert!(combined(&output).contains("soon"));

    let output = run_incprof(dir.path(), &["run", "--seconds", "-1", "--", "true"]);
    assert!(!output.status.success());
}

#[test]
fn test_run_exports_negative_hex_offset() {
    let dir = tempfile::tempdir().unwrap();
    let agent = inert_agent(dir.path());
    let output = run_incprof_with_agent(
        dir.path(),
        &agent,
        &[
            "-v",
            "run",
            "--app-name",
            "incprof-no-match",
            "--offset",
            "-0x530",
            "--",
            "true",
        ],
    );

    let text = combined(&output);
    assert!(output.status.success(), "{}", text);
    assert!(text.contains("IPR_GMONOFFSET=-1328"), "{}", text);
    assert!(text.contains("IPR_APPNAME=incprof-no-match"), "{}", text);
}

#[test]
fn test_run_mirrors_child_exit_status() {
    let dir = tempfile::tempdir().unwrap();
    let agent = inert_agent(dir.path());
    let output = run_incprof_with_agent(
        dir.path(),
        &agent,
        &["run", "--offset", "-1328", "--", "sh", "-c", "exit 7"],
    );

    assert_eq!(output.status.code(), Some(7), "{}", combined(&output));
}

#[test]
fn test_run_with_missing_agent_library_env() {
    let dir = tempfile::tempdir().unwrap();
    let output = run_incprof_with_agent(
        dir.path(),
        &dir.path().join("missing.so"),
        &["run", "--app-name", "incprof-no-match", "--", "true"],
    );

    let text = combined(&output);
    assert!(text.contains("INCPROF_AGENT_LIB points to missing file"), "{}", text);
}

#[test]
fn test_run_numbers_leftover_staged_files() {
    let dir = tempfile::tempdir().unwrap();
    let agent = inert_agent(dir.path());
    let out = dir.path().join("out");
    let out_str = out.to_str().unwrap();
    // Stands in for a host whose exit dump collides with a periodic snapshot.
    let script = r#"touch "$1/gmon-0.out" && echo final > "$1/gmon-0.4321""#;

    let output = run_incprof_with_agent(
        dir.path(),
        &agent,
        &[
            "run", "--offset", "-1328", "-d", out_str, "--", "sh", "-c", script, "sh", out_str,
        ],
    );

    let text = combined(&output);
    assert!(output.status.success(), "{}", text);
    assert!(text.contains("2 snapshots"), "{}", text);
    assert_eq!(std::fs::read_to_string(out.join("gmon-1.out")).unwrap(), "final\n");
    assert!(list_staged(&out).unwrap().is_empty());
}

const BUSY_HOST: &str = r#"
#include <time.h>

static volatile unsigned long sink;

static void __attribute__((noinline)) spin(void)
{
    for (int i = 0; i < 1000; i++)
        sink += i;
}

int main(void)
{
    clock_t end = clock() + CLOCKS_PER_SEC;
    while (clock() < end)
        spin();
    return 0;
}
"#;

#[test]
fn test_run_profiled_host_end_to_end() {
    let Some(agent) = agent_library() else {
        eprintln!("SKIPPED: agent library not built");
        return;
    };
    let dir = tempfile::tempdir().unwrap();
    let Some(host) = compile_profiled(dir.path(), "host", BUSY_HOST) else {
        eprintln!("SKIPPED: no working cc -pg");
        return;
    };
    let out = dir.path().join("out");

    // No --offset: the launcher derives it from the C library it maps.
    let output = run_incprof_with_agent(
        dir.path(),
        &agent,
        &[
            "run",
            "-d",
            out.to_str().unwrap(),
            "--useconds",
            "200000",
            "--",
            host.to_str().unwrap(),
        ],
    );

    let text = combined(&output);
    assert!(output.status.success(), "{}", text);

    let snapshots = list_snapshots(&out).unwrap();
    let indices: Vec<u64> = snapshots.iter().map(|(i, _)| *i).collect();
    assert!(indices.len() >= 3, "{:?}\n{}", indices, text);
    assert_eq!(indices, (0..indices.len() as u64).collect::<Vec<_>>());
    for (_, path) in &snapshots {
        assert!(std::fs::metadata(path).unwrap().len() > 0, "{}", path.display());
    }
    assert!(list_staged(&out).unwrap().is_empty());
    assert!(!dir.path().join("gmon.out").exists());
    assert!(text.contains(&format!("{} snapshots", indices.len())), "{}", text);
}

#[test]
fn test_find_offset_missing_file() {
    let dir = tempfile::tempdir().unwrap();
    let output = run_incprof(dir.path(), &["find-offset", "no-such-libc.so"]);

    assert!(!output.status.success());
    assert!(combined(&output).contains("Failed to read"));
}

#[test]
fn test_find_offset_rejects_non_elf() {
    let dir = tempfile::tempdir().unwrap();
    let bogus = dir.path().join("libc.so.6");
    std::fs::write(&bogus, b"#!/bin/sh\necho not a library\n").unwrap();

    let output = run_incprof(dir.path(), &["find-offset", bogus.to_str().unwrap()]);

    assert!(!output.status.success());
    assert!(combined(&output).contains("Not a recognized object file"));
}

#[test]
fn test_find_offset_unknown_anchor() {
    let Some(libc) = system_libc() else {
        eprintln!("SKIPPED: no system C library found");
        return;
    };
    let dir = tempfile::tempdir().unwrap();
    let output = run_incprof(
        dir.path(),
        &[
            "find-offset",
            libc.to_str().unwrap(),
            "--anchor",
            "incprof_no_such_symbol",
        ],
    );

    assert!(!output.status.success());
    assert!(combined(&output).contains("incprof_no_such_symbol not found"));
}

#[test]
fn test_find_offset_on_system_libc() {
    let Some(libc) = system_libc() else {
        eprintln!("SKIPPED: no system C library found");
        return;
    };
    let dir = tempfile::tempdir().unwrap();
    let output = run_incprof(dir.path(), &["find-offset", libc.to_str().unwrap()]);

    // Without .symtab only the x86 prologue scan can answer.
    if !output.status.success() && !cfg!(any(target_arch = "x86_64", target_arch = "x86")) {
        eprintln!("SKIPPED: stripped C library on a target without a prologue scanner");
        return;
    }
    assert!(output.status.success(), "{}", combined(&output));

    let stdout = String::from_utf8_lossy(&output.stdout);
    let line = stdout
        .lines()
        .find_map(|l| l.strip_prefix("export IPR_GMONOFFSET="))
        .expect("missing export line");
    let offset: i64 = line.parse().unwrap();
    assert!(offset < 0, "{}", stdout);
}
