//! Code execution: language registry, temp-file scaffolding, runner delegation.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{ApiError, Result};
use crate::runner::{self, RunOutcome, RunRequest};

struct LangSpec {
    ext: &'static str,
    kind: LangKind,
}

enum LangKind {
    /// `<interpreter> <source>`
    Interpreter(&'static str),
    /// `rustc <source> -o <scratch>/bin && <scratch>/bin`
    CompileAndRun,
}

fn lang_spec(language: &str) -> Option<LangSpec> {
    let spec = match language.to_ascii_lowercase().as_str() {
        "python" => LangSpec { ext: ".py", kind: LangKind::Interpreter("python3") },
        "javascript" => LangSpec { ext: ".js", kind: LangKind::Interpreter("node") },
        "typescript" => LangSpec { ext: ".ts", kind: LangKind::Interpreter("npx tsx") },
        "go" => LangSpec { ext: ".go", kind: LangKind::Interpreter("go run") },
        "rust" => LangSpec { ext: ".rs", kind: LangKind::CompileAndRun },
        "bash" => LangSpec { ext: ".sh", kind: LangKind::Interpreter("bash") },
        _ => return None,
    };
    Some(spec)
}

impl LangSpec {
    fn command(&self, source: &Path, scratch: &Path) -> String {
        match self.kind {
            LangKind::Interpreter(interpreter) => {
                format!("{} {}", interpreter, source.display())
            }
            LangKind::CompileAndRun => {
                let bin = scratch.join("bin");
                format!("rustc {} -o {bin} && {bin}", source.display(), bin = bin.display())
            }
        }
    }
}

/// Write `source` to an ephemeral file and run it with the registered
/// interpreter inside `workspace`.
///
/// The scratch directory owning the source (and any build artifact) is
/// removed when this function returns, on every path: success, runner
/// error, or timeout.
pub async fn execute(
    language: &str,
    source: &str,
    timeout: Duration,
    workspace: PathBuf,
) -> Result<RunOutcome> {
    let spec = lang_spec(language)
        .ok_or_else(|| ApiError::InvalidLanguage(language.to_string()))?;

    let scratch = tempfile::Builder::new()
        .prefix("sandboxd-code-")
        .tempdir()?;
    let source_path = scratch.path().join(format!("source{}", spec.ext));
    tokio::fs::write(&source_path, source).await?;

    let outcome = runner::run(RunRequest {
        command: spec.command(&source_path, scratch.path()),
        cwd: workspace,
        timeout,
        env: HashMap::new(),
    })
    .await;

    // `scratch` drops here; the runner has already reaped the child (even on
    // timeout), so nothing can still be writing into the directory.
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unknown_language_fails_before_spawning() {
        let err = execute("cobol", "DISPLAY 'hi'.", Duration::from_secs(5), std::env::temp_dir())
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::InvalidLanguage(_)), "got {err:?}");
    }

    #[tokio::test]
    async fn language_lookup_is_case_insensitive() {
        assert!(lang_spec("Python").is_some());
        assert!(lang_spec("BASH").is_some());
        assert!(lang_spec("cobol").is_none());
    }

    #[tokio::test]
    async fn bash_round_trip() {
        let outcome = execute("bash", "echo $((2 + 2))", Duration::from_secs(10), std::env::temp_dir())
            .await
            .unwrap();
        assert_eq!(outcome.exit_code, 0);
        assert!(outcome.stdout.contains('4'));
    }

    #[tokio::test]
    async fn nonzero_exit_is_reported_not_raised() {
        let outcome = execute("bash", "exit 7", Duration::from_secs(10), std::env::temp_dir())
            .await
            .unwrap();
        assert_eq!(outcome.exit_code, 7);
    }

    #[tokio::test]
    async fn temp_artifacts_are_removed_on_every_path() {
        let before = scratch_dirs();

        let _ = execute("bash", "echo ok", Duration::from_secs(10), std::env::temp_dir()).await;
        let _ = execute("bash", "exit 1", Duration::from_secs(10), std::env::temp_dir()).await;
        let _ = execute("bash", "sleep 30", Duration::from_secs(1), std::env::temp_dir()).await;

        assert_eq!(scratch_dirs(), before, "scratch directories leaked");
    }

    fn scratch_dirs() -> usize {
        std::fs::read_dir(std::env::temp_dir())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| {
                e.file_name()
                    .to_string_lossy()
                    .starts_with("sandboxd-code-")
            })
            .count()
    }
}
