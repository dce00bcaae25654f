use std::fs;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::{Parser, ValueEnum};
use color_print::ceprintln;
use sprout_core::span::{FileId, SourceFile};
use sprout_core::{CoreError, Diagnostic, Options, Severity, dump_ast, dump_tokens, transpile};
use walkdir::WalkDir;

/// Transpile Sprout sources to C++.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Cli {
    /// Source file, or a directory whose `.spr` files are all transpiled
    #[arg(short, long, value_name = "PATH")]
    input: Option<PathBuf>,

    /// Output file (defaults to the input with a new extension, or stdout)
    #[arg(short, long, value_name = "PATH")]
    output: Option<PathBuf>,

    #[arg(long, value_enum, default_value_t = Emit::Cpp)]
    emit: Emit,

    /// Header included at the top of generated C++
    #[arg(long, value_name = "NAME", default_value = "sprout_runtime.hpp")]
    runtime_header: String,

    /// Treat warnings as errors
    #[arg(long)]
    deny_warnings: bool,

    /// Suppress warnings
    #[arg(short, long)]
    quiet: bool,

    /// Print stage summaries
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum Emit {
    Cpp,
    Tokens,
    Ast,
}

impl Emit {
    fn extension(self) -> &'static str {
        match self {
            Emit::Cpp => "cpp",
            Emit::Tokens => "tokens",
            Emit::Ast => "ast",
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    execute(cli)
}

fn execute(cli: Cli) -> Result<()> {
    let options = Options {
        runtime_header: cli.runtime_header.clone(),
        deny_warnings: cli.deny_warnings,
        ..Options::default()
    };

    match &cli.input {
        None => {
            let mut source = String::new();
            io::stdin()
                .read_to_string(&mut source)
                .context("failed to read source from stdin")?;
            let text = process(&cli, &options, "<stdin>", &source)?;
            match &cli.output {
                Some(path) => write_output(path, &text)?,
                None => io::stdout()
                    .write_all(text.as_bytes())
                    .context("failed to write to stdout")?,
            }
        }
        Some(dir) if dir.is_dir() => {
            if cli.output.is_some() {
                bail!("--output cannot be used with a directory input");
            }
            let mut outputs = Vec::new();
            let mut failed = 0usize;
            for path in sources_under(dir)? {
                let source = fs::read_to_string(&path)
                    .with_context(|| format!("failed to read input file {}", path.display()))?;
                match process(&cli, &options, &path.display().to_string(), &source) {
                    Ok(text) => outputs.push((path.with_extension(cli.emit.extension()), text)),
                    Err(_) => failed += 1,
                }
            }
            if failed > 0 {
                bail!("{failed} file(s) failed to transpile; nothing was written");
            }
            for (path, text) in outputs {
                write_output(&path, &text)?;
            }
        }
        Some(path) => {
            let source = fs::read_to_string(path)
                .with_context(|| format!("failed to read input file {}", path.display()))?;
            let text = process(&cli, &options, &path.display().to_string(), &source)?;
            let output = cli
                .output
                .clone()
                .unwrap_or_else(|| path.with_extension(cli.emit.extension()));
            write_output(&output, &text)?;
        }
    }

    Ok(())
}

/// Every `.spr` file below `root`, in a stable order.
fn sources_under(root: &Path) -> Result<Vec<PathBuf>> {
    let mut paths = Vec::new();
    for entry in WalkDir::new(root).sort_by_file_name() {
        let entry = entry.with_context(|| format!("failed to walk {}", root.display()))?;
        let path = entry.path();
        if entry.file_type().is_file() && path.extension().is_some_and(|ext| ext == "spr") {
            paths.push(path.to_path_buf());
        }
    }
    Ok(paths)
}

/// Runs the requested stage on one source, reporting diagnostics on stderr.
fn process(cli: &Cli, options: &Options, name: &str, source: &str) -> Result<String> {
    let result = match cli.emit {
        Emit::Cpp => transpile(source, name, options).map(|artifact| {
            report(cli, name, source, &artifact.diagnostics);
            artifact.code
        }),
        Emit::Tokens => dump_tokens(source, name),
        Emit::Ast => dump_ast(source, name),
    };
    result.map_err(|err| {
        render_error(&err);
        anyhow::anyhow!("failed to transpile {name}")
    })
}

fn report(cli: &Cli, name: &str, source: &str, diagnostics: &[Diagnostic]) {
    let file = SourceFile::new(FileId(0), name, source);
    for diagnostic in diagnostics {
        let code = diagnostic.code.unwrap_or("");
        match diagnostic.severity {
            Severity::Info if cli.verbose => ceprintln!("<cyan,bold>info</>[{}]: {}", code, diagnostic.message),
            Severity::Warning if !cli.quiet => {
                ceprintln!("<yellow,bold>warning</>[{}]: {}", code, diagnostic.message)
            }
            Severity::Error => ceprintln!("<red,bold>error</>: {}", diagnostic.message),
            _ => continue,
        }
        if let Some(location) = diagnostic.location {
            ceprintln!("  <blue>--></> <underline>{}</>", file.describe(location));
            for line in file.highlight(location, 1).lines() {
                ceprintln!("  <blue>{}</>", line);
            }
        }
    }
}

fn render_error(err: &CoreError) {
    ceprintln!("<red,bold>error</>: {}", err);
}

fn write_output(path: &Path, text: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create directory {parent:?}"))?;
        }
    }
    fs::write(path, text).with_context(|| format!("failed to write output file {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_cmd::Command;
    use predicates::prelude::*;
    use tempfile::tempdir;

    const PROGRAM: &str = "main {\n    var total: i64 = 0\n    for var i = 1; 10 {\n        total += i\n    }\n    println(\"{}\", total)\n}\n";

    fn sprout() -> Command {
        Command::cargo_bin("sprout-cli").expect("binary exists")
    }

    #[test]
    fn transpiles_file_to_explicit_output() {
        let dir = tempdir().expect("tempdir");
        let input_path = dir.path().join("sum.spr");
        fs::write(&input_path, PROGRAM).expect("write input");
        let output_path = dir.path().join("out/sum.cpp");

        sprout()
            .arg("--input")
            .arg(&input_path)
            .arg("--output")
            .arg(&output_path)
            .assert()
            .success();

        let cpp = fs::read_to_string(&output_path).expect("read output");
        assert!(cpp.starts_with("#include \"sprout_runtime.hpp\""));
        assert!(cpp.contains("RT_FOR(int32_t, i, 1, 10, 1) {"));
        assert!(cpp.contains("total += i;"));
    }

    #[test]
    fn defaults_output_next_to_input() {
        let dir = tempdir().expect("tempdir");
        let input_path = dir.path().join("sum.spr");
        fs::write(&input_path, PROGRAM).expect("write input");

        sprout().arg("-i").arg(&input_path).assert().success();

        assert!(dir.path().join("sum.cpp").exists(), "cpp output was not created");
    }

    #[test]
    fn reads_stdin_and_writes_stdout() {
        sprout()
            .arg("--runtime-header")
            .arg("custom.hpp")
            .write_stdin("main {\n    println(\"hi\")\n}\n")
            .assert()
            .success()
            .stdout(predicate::str::starts_with("#include \"custom.hpp\""))
            .stdout(predicate::str::contains("rt::println(std::string(\"hi\"));"));
    }

    #[test]
    fn semantic_errors_fail_without_output() {
        let dir = tempdir().expect("tempdir");
        let input_path = dir.path().join("bad.spr");
        fs::write(&input_path, "main {\n    break\n}\n").expect("write input");
        let output_path = dir.path().join("bad.cpp");

        sprout()
            .arg("--input")
            .arg(&input_path)
            .assert()
            .failure()
            .stderr(predicate::str::contains("cannot use break outside a loop"))
            .stderr(predicate::str::contains("in `break`"));

        assert!(!output_path.exists(), "output must not be written on failure");
    }

    #[test]
    fn warnings_are_reported_and_can_be_denied() {
        let source = "main {\n    var d: f64 = 1.5\n    var f: f32 = d\n}\n";

        sprout()
            .write_stdin(source)
            .assert()
            .success()
            .stderr(predicate::str::contains("W0001"));

        sprout()
            .arg("-q")
            .write_stdin(source)
            .assert()
            .success()
            .stderr(predicate::str::contains("W0001").not());

        sprout()
            .arg("--deny-warnings")
            .write_stdin(source)
            .assert()
            .failure()
            .stderr(predicate::str::contains("warnings are denied"));
    }

    #[test]
    fn verbose_prints_stage_summaries() {
        sprout()
            .arg("-v")
            .write_stdin("main {\n}\n")
            .assert()
            .success()
            .stderr(predicate::str::contains("I0001"));
    }

    #[test]
    fn emits_tokens_and_ast() {
        sprout()
            .arg("--emit")
            .arg("tokens")
            .write_stdin("var x = 1")
            .assert()
            .success()
            .stdout(predicate::str::contains("Identifier\tx"));

        sprout()
            .arg("--emit")
            .arg("ast")
            .write_stdin("main {\n    var x = -1 + 2\n}\n")
            .assert()
            .success()
            .stdout(predicate::str::contains("(+ (- 1) 2)"));
    }

    #[test]
    fn transpiles_every_source_in_a_directory() {
        let dir = tempdir().expect("tempdir");
        let nested = dir.path().join("nested");
        fs::create_dir_all(&nested).expect("create nested");
        fs::write(dir.path().join("a.spr"), PROGRAM).expect("write a");
        fs::write(nested.join("b.spr"), "main {\n}\n").expect("write b");
        fs::write(dir.path().join("notes.txt"), "not sprout").expect("write notes");

        sprout().arg("--input").arg(dir.path()).assert().success();

        assert!(dir.path().join("a.cpp").exists());
        assert!(nested.join("b.cpp").exists());
        assert!(!dir.path().join("notes.cpp").exists());
    }

    #[test]
    fn directory_with_a_bad_source_writes_nothing() {
        let dir = tempdir().expect("tempdir");
        fs::write(dir.path().join("a.spr"), PROGRAM).expect("write a");
        fs::write(dir.path().join("b.spr"), "main {\n    x = 1\n}\n").expect("write b");

        sprout()
            .arg("--input")
            .arg(dir.path())
            .assert()
            .failure()
            .stderr(predicate::str::contains("unknown identifier 'x'"));

        assert!(!dir.path().join("a.cpp").exists());
    }

    #[test]
    fn directory_input_rejects_output_flag() {
        let dir = tempdir().expect("tempdir");
        sprout()
            .arg("--input")
            .arg(dir.path())
            .arg("--output")
            .arg(dir.path().join("x.cpp"))
            .assert()
            .failure()
            .stderr(predicate::str::contains("--output cannot be used"));
    }
}
